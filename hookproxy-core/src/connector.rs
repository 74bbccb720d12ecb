//! Webhook connectors: one per configured webhook, each bound to a single
//! `unix://` socket and responsible for invoking that webhook's pre-hook or
//! post-hook stage and decoding the patch it returns.

use hyper::{client::HttpConnector, Body, Client, Method, Request, StatusCode};
use hyperlocal::{UnixClientExt, UnixConnector, Uri as UnixUri};

use crate::config::{FailurePolicy, HookConfigurationItem};
use crate::error::WebhookError;
use crate::patch::PatchData;

/// Transport bound to a single webhook endpoint. Only `unix://` endpoints
/// are accepted; validating that is the job of [`crate::endpoint::Endpoint`],
/// performed once at construction by the owning [`crate::route::RouteTable`].
enum Transport {
    Unix { client: Client<UnixConnector>, path: String },
    /// present for forward-compatibility with a future tcp webhook transport;
    /// `hookproxy-config` validation never produces this variant today.
    #[allow(dead_code)]
    Tcp { client: Client<HttpConnector>, authority: String },
}

/// A single configured webhook: its name (for logging and chain ordering),
/// its failure policy, and the transport used to reach it.
pub struct WebhookConnector {
    name: String,
    failure_policy: FailurePolicy,
    transport: Transport,
}

impl WebhookConnector {
    pub fn new(item: &HookConfigurationItem) -> Self {
        let endpoint =
            crate::endpoint::Endpoint::parse_unix(&item.endpoint, true).unwrap_or_else(|e| {
                panic!("webhook {:?} has an invalid endpoint: {e}", item.name)
            });
        Self {
            name: item.name.clone(),
            failure_policy: item.failure_policy,
            transport: Transport::Unix {
                client: Client::unix(),
                path: endpoint.addr,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Invoke this webhook's `{stage}` phase for `(method, path)` with the
    /// current buffer `body`, returning the patch it replied with.
    ///
    /// Per the failure policy, an `Ignore` webhook turns any error into an
    /// empty (no-op) patch rather than propagating it; the caller therefore
    /// never sees an error from an `Ignore`-policy webhook.
    pub async fn invoke(
        &self,
        stage: &'static str,
        method: &str,
        path: &str,
        body: Vec<u8>,
    ) -> Result<PatchData, WebhookError> {
        match self.invoke_raw(stage, method, path, body).await {
            Ok(patch) => Ok(patch),
            Err(e) if self.failure_policy == FailurePolicy::Ignore => {
                tracing::warn!(webhook = %self.name, error = %e, "webhook failed, ignoring per failure policy");
                Ok(PatchData::default())
            }
            Err(e) => Err(e),
        }
    }

    async fn invoke_raw(
        &self,
        stage: &'static str,
        method: &str,
        path: &str,
        body: Vec<u8>,
    ) -> Result<PatchData, WebhookError> {
        let hook_path = format!("/{stage}{path}").to_lowercase();
        let _ = method; // the webhook contract's own method is always POST; the
                        // original request's method is conveyed only via the path.

        let response = match &self.transport {
            Transport::Unix { client, path: sock } => {
                let uri: hyper::Uri = UnixUri::new(sock, &hook_path).into();
                let req = Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .body(Body::from(body))
                    .expect("constructed request should be valid");
                client
                    .request(req)
                    .await
                    .map_err(|e| WebhookError::Transport(self.name.clone(), e))?
            }
            Transport::Tcp { client, authority } => {
                let uri: hyper::Uri = format!("http://{authority}{hook_path}")
                    .parse()
                    .expect("authority + path should form a valid URI");
                let req = Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .body(Body::from(body))
                    .expect("constructed request should be valid");
                client
                    .request(req)
                    .await
                    .map_err(|e| WebhookError::Transport(self.name.clone(), e))?
            }
        };

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(WebhookError::Non2xx(self.name.clone(), status));
        }

        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| WebhookError::Transport(self.name.clone(), e))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| WebhookError::Decode(self.name.clone(), e.to_string()))
    }
}
