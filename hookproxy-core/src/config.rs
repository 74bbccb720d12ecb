//! The configuration record the core consumes. Building one of these from
//! disk/env is the job of `hookproxy-config`; the core only ever reads it.

use serde::{Deserialize, Serialize};

fn default_timeout_secs() -> u64 {
    5
}

fn default_remote_endpoint() -> String {
    "unix:///var/run/docker.sock".to_owned()
}

fn default_failure_policy() -> FailurePolicy {
    FailurePolicy::Fail
}

fn default_method() -> String {
    "POST".to_owned()
}

/// Top-level configuration for a running proxy instance.
#[derive(Clone, Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct HookConfiguration {
    /// Deadline, in seconds, for the pre-chain and (independently) the
    /// post-chain of a single request.
    #[serde(default = "default_timeout_secs", rename = "timeout")]
    pub timeout_secs: u64,

    /// `proto://addr` to listen on. Only `tcp` and `unix` are supported.
    #[serde(rename = "listenAddress")]
    pub listen_address: String,

    /// `proto://addr` of the upstream server requests are forwarded to.
    #[serde(default = "default_remote_endpoint", rename = "remoteEndpoint")]
    pub remote_endpoint: String,

    /// Webhooks, in the order their stages should run within a route's chain.
    #[serde(default, rename = "webHooks")]
    pub web_hooks: Vec<HookConfigurationItem>,
}

impl HookConfiguration {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// One configured webhook: where to reach it, how to treat its failures,
/// and which `(method, pattern)` stages it participates in.
#[derive(Clone, Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct HookConfigurationItem {
    pub name: String,

    /// Must be `unix://...`; the webhook side may use an abstract path.
    pub endpoint: String,

    #[serde(default = "default_failure_policy", rename = "failurePolicy")]
    pub failure_policy: FailurePolicy,

    pub stages: Vec<HookStage>,
}

/// What to do when this webhook's invocation fails (transport error,
/// non-2xx, or an undecodable response).
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
pub enum FailurePolicy {
    /// Abort the request with a 500 and stop running the chain.
    Fail,
    /// Treat the failure as an empty patch and continue the chain.
    Ignore,
}

/// A single `(method, pattern, pre|post)` participation of a webhook in a route.
#[derive(Clone, Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct HookStage {
    #[serde(default = "default_method")]
    pub method: String,

    #[serde(rename = "urlPattern")]
    pub url_pattern: String,

    #[serde(rename = "type")]
    pub stage_type: HookStageType,
}

/// Which half of the request lifecycle a stage hooks into.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum HookStageType {
    Pre,
    Post,
}
