//! The interception handler: the hot path that runs a route's pre-chain,
//! forwards to upstream, and runs its post-chain, per request.

use hyper::{Body, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::FailurePolicy;
use crate::error::{PatchError, ProxyError, WebhookError};
use crate::patch::{self, PatchData};
use crate::proxy::UpstreamProxy;
use crate::route::Route;

/// The envelope a post-hook chain sees in place of the raw response: the
/// upstream's status code and body, round-tripped through each post-hook.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PostHookData {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: serde_json::Value,
}

/// Run a single connector's chain entry, converting the error into a
/// `ProxyError` if the webhook's failure policy doesn't already swallow it.
/// `WebhookConnector::invoke` already applies `Ignore`, so any `Err` reaching
/// here came from a `Fail`-policy webhook or a patch application failure.
///
/// `timeout` bounds the whole chain, not each connector individually: the
/// deadline is computed once, before the first connector runs, and each
/// iteration waits only for whatever budget remains.
async fn run_chain(
    chain: &[std::sync::Arc<crate::connector::WebhookConnector>],
    stage: &'static str,
    method: &str,
    path: &str,
    timeout: std::time::Duration,
    mut body: Vec<u8>,
) -> Result<Vec<u8>, ProxyError> {
    let deadline = tokio::time::Instant::now() + timeout;
    for connector in chain {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let invoked = tokio::time::timeout(
            remaining,
            connector.invoke(stage, method, path, body.clone()),
        )
        .await;

        let patch: PatchData = match invoked {
            Ok(Ok(patch)) => patch,
            Ok(Err(e)) => return Err(ProxyError::Hook(e)),
            Err(_) if connector.failure_policy() == FailurePolicy::Ignore => {
                tracing::warn!(webhook = %connector.name(), "webhook timed out, ignoring per failure policy");
                PatchData::default()
            }
            Err(_) => {
                return Err(ProxyError::Hook(WebhookError::Timeout(
                    connector.name().to_owned(),
                )))
            }
        };

        if !patch.is_empty() {
            body = patch::apply_to_bytes(&patch, &body)
                .map_err(|e: PatchError| ProxyError::Hook(WebhookError::Patch(e)))?;
        }
    }
    Ok(body)
}

/// Run the matched `route` against `req`, forwarding to `upstream` between
/// the pre- and post-chains, and return the final client response.
#[tracing::instrument(skip(route, upstream, timeout, req), fields(method = %req.method(), path = %req.uri().path()))]
pub async fn handle(
    route: &Route,
    upstream: &UpstreamProxy,
    timeout: std::time::Duration,
    req: Request<Body>,
) -> Response<Body> {
    match handle_inner(route, upstream, timeout, req).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(error = %e, "request failed");
            Response::builder()
                .status(e.status())
                .body(Body::from(e.to_string()))
                .expect("error response should be valid")
        }
    }
}

async fn handle_inner(
    route: &Route,
    upstream: &UpstreamProxy,
    timeout: std::time::Duration,
    req: Request<Body>,
) -> Result<Response<Body>, ProxyError> {
    let (parts, body) = req.into_parts();
    let method = parts.method.to_string();
    let path = parts.uri.path().to_owned();

    let original_body = hyper::body::to_bytes(body)
        .await
        .map_err(ProxyError::ReadBody)?
        .to_vec();

    let pre_result = run_chain(
        &route.pre_chain,
        "pre",
        &method,
        &path,
        timeout,
        original_body,
    )
    .await?;

    let mut req = Request::from_parts(parts, Body::from(pre_result.clone()));
    req.headers_mut().insert(
        hyper::header::CONTENT_LENGTH,
        pre_result.len().to_string().parse().unwrap(),
    );

    let upstream_response = upstream.forward(req).await.map_err(ProxyError::Upstream)?;

    if route.post_chain.is_empty() {
        return Ok(upstream_response);
    }

    let (resp_parts, resp_body) = upstream_response.into_parts();
    let resp_bytes = hyper::body::to_bytes(resp_body)
        .await
        .map_err(ProxyError::Upstream)?;

    let envelope = PostHookData {
        status_code: resp_parts.status.as_u16(),
        body: serde_json::from_slice(&resp_bytes).unwrap_or(serde_json::Value::Null),
    };
    let envelope_bytes =
        serde_json::to_vec(&envelope).expect("PostHookData should always serialize");

    let patched_envelope_bytes = run_chain(
        &route.post_chain,
        "post",
        &method,
        &path,
        timeout,
        envelope_bytes,
    )
    .await?;

    let envelope: PostHookData = serde_json::from_slice(&patched_envelope_bytes)
        .map_err(|e| ProxyError::Hook(WebhookError::Patch(PatchError::Decode(e.to_string()))))?;

    let final_body =
        serde_json::to_vec(&envelope.body).expect("JSON value should always serialize");
    let status =
        StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = Response::builder().status(status);
    for (name, value) in resp_parts.headers.iter() {
        if name == hyper::header::CONTENT_LENGTH || name == hyper::header::TRANSFER_ENCODING {
            continue;
        }
        response = response.header(name, value);
    }
    Ok(response
        .header(hyper::header::CONTENT_LENGTH, final_body.len())
        .body(Body::from(final_body))
        .expect("patched response should be valid"))
}
