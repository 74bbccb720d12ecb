// Copyright 2022 Riad S. Wahby <r@cubist.dev> and the Cubist developers
//
// This file is part of hookproxy-core.
//
// See LICENSE for licensing terms. This file may not be copied,
// modified, or distributed except according to those terms.

/*! Library-wide error types
 *
 *  Each stage of the proxy pipeline has a corresponding error type:
 *
 *  - [`EndpointError`] covers parsing `proto://addr` endpoint strings.
 *  - [`PatchError`] covers decoding and applying a webhook's JSON patch.
 *  - [`WebhookError`] covers a single webhook RPC (transport, status, decode).
 *  - [`ListenError`] covers bringing up the listen socket.
 *  - [`ProxyError`] is the top-level error a request handler can produce; it
 *    wraps the others and carries the HTTP status that should be sent to the
 *    client.
 *
 *  `WebhookError` does not automatically convert into `ProxyError` via
 *  `From`, because whether it is fatal depends on the owning webhook's
 *  failure policy, which only the caller (the interception handler) knows.
 *  Conversion is always explicit: `chain.run(..).await.map_err(|e| e.into_proxy_error(policy))`.
 */

use hyper::StatusCode;
use thiserror::Error;

/// Failure parsing or validating a `proto://addr` endpoint string.
#[derive(Clone, Debug, Error)]
pub enum EndpointError {
    /// No `://` separator found.
    #[error("malformed endpoint {0:?}: missing scheme separator")]
    MalformedEndpoint(String),

    /// Scheme present but not one this caller accepts.
    #[error("endpoint {0:?} has unsupported scheme {1:?}, expected {2:?}")]
    UnsupportedScheme(String, String, &'static str),

    /// A `unix://` path longer than `sockaddr_un.sun_path` can hold.
    #[error("unix socket path {0:?} is {1} bytes, longer than the {2}-byte limit")]
    AddressTooLong(String, usize, usize),
}

/// Failure applying a webhook's [`crate::patch::PatchData`] to a buffer.
#[derive(Debug, Error)]
pub enum PatchError {
    /// `patchType` was neither the JSON Patch nor Merge Patch media type.
    #[error("unknown patch type {0:?}")]
    UnknownPatchType(String),

    /// `patchData` did not decode (base64, or the patch document itself).
    #[error("failed to decode patch: {0}")]
    Decode(String),

    /// Applying a JSON Patch operation, or merging a Merge Patch, failed.
    #[error("failed to apply patch: {0}")]
    Apply(String),
}

/// Failure invoking a single webhook over its connector.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The underlying HTTP call failed (connect, I/O, or timeout).
    #[error("webhook {0:?} transport error: {1}")]
    Transport(String, #[source] hyper::Error),

    /// The webhook timed out before responding.
    #[error("webhook {0:?} timed out")]
    Timeout(String),

    /// The webhook responded with neither 200 nor 201.
    #[error("webhook {0:?} returned non-2xx status {1}")]
    Non2xx(String, StatusCode),

    /// The webhook's response body did not decode into a `PatchData`.
    #[error("webhook {0:?} returned an undecodable response: {1}")]
    Decode(String, String),

    /// The patch the webhook returned could not be applied.
    #[error(transparent)]
    Patch(#[from] PatchError),
}

impl WebhookError {
    /// Name of the webhook this error originated from, for logging.
    pub fn webhook_name(&self) -> Option<&str> {
        match self {
            Self::Transport(n, _) | Self::Timeout(n) | Self::Non2xx(n, _) | Self::Decode(n, _) => {
                Some(n.as_str())
            }
            Self::Patch(_) => None,
        }
    }
}

/// Failure bringing up the listen socket.
#[derive(Debug, Error)]
pub enum ListenError {
    /// `ListenAddress` used an abstract-namespace unix path (`@...`).
    #[error("abstract unix sockets are not supported for the listen address")]
    AbstractUnixUnsupported,

    /// `bind(2)` (or the tokio equivalent) failed.
    #[error("failed to bind listen address: {0}")]
    BindFailure(#[source] std::io::Error),

    /// The configured endpoint string itself didn't parse.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

/// The error a request-handling task can produce. Always carries the status
/// code that should be written to the client, since by the time a request
/// fails we may already be mid-response.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Reading the incoming request body failed.
    #[error("failed to read request body: {0}")]
    ReadBody(#[source] hyper::Error),

    /// A `Fail`-policy webhook failed, or a patch itself was malformed.
    #[error("hook chain failed: {0}")]
    Hook(#[source] WebhookError),

    /// The upstream call itself failed (connection refused, reset, etc).
    #[error("upstream request failed: {0}")]
    Upstream(#[source] hyper::Error),
}

impl ProxyError {
    /// Status code to write back to the client for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ReadBody(_) => StatusCode::BAD_REQUEST,
            Self::Hook(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
