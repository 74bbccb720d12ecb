#![warn(missing_docs)]

//! Configuration loading for the hook proxy.
//!
//! [`HookConfiguration`] itself (and its nested types) live in
//! `hookproxy-core`, since the core needs to describe the record it
//! consumes without depending on how that record gets built. This crate is
//! the "how": it layers a config file (JSON or TOML, auto-detected by
//! extension) under environment variable overrides using [`figment`], fills
//! in defaults, and validates the result before handing it to the core.
//!
//! Example JSON file:
//! ```
//! # use serde_json::json;
//! # let cfg_json = json!(
//! {
//!    "schema_version": 1,
//!    "listenAddress": "unix:///run/hookproxy.sock",
//!    "remoteEndpoint": "unix:///var/run/docker.sock",
//!    "timeout": 5,
//!    "webHooks": [
//!      {
//!        "name": "rewrite-image",
//!        "endpoint": "unix:///run/hooks/rewrite-image.sock",
//!        "failurePolicy": "Fail",
//!        "stages": [
//!          { "method": "POST", "urlPattern": "/container/{id}/create", "type": "pre" }
//!        ]
//!      }
//!    ]
//! }
//! # );
//! ```
//!
//! Environment overrides use the `HOOKPROXY_` prefix, e.g.
//! `HOOKPROXY_LISTENADDRESS` or `HOOKPROXY_TIMEOUT`.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Json, Toml};
use figment::Figment;
use hookproxy_core::config::HookConfiguration;
use hookproxy_core::endpoint::Endpoint;
use hookproxy_core::route::try_compile_pattern;
use serde::Deserialize;
use thiserror::Error;

/// Small generic utilities shared across this crate.
pub mod util;

/// Default configuration filename, used when neither `--config` nor
/// `HOOKPROXY_CONFIG` is given.
pub const DEFAULT_FILENAME: &str = "hookproxy.toml";

/// The only `schema_version` this binary currently writes or accepts. A
/// config that omits `schema_version` is treated as version 1.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `figment` failed to merge or deserialize the layered sources.
    #[error("failed to load configuration from {0}: {1}")]
    Load(PathBuf, #[source] Box<figment::Error>),

    /// The on-disk file declared a `schema_version` this binary doesn't
    /// know how to read. There is, as yet, no converter for any version
    /// but the current one; this error is the hook a future conversion
    /// step would replace.
    #[error("{0} declares schema_version {1}, but this binary only supports version {CURRENT_SCHEMA_VERSION}")]
    UnsupportedSchemaVersion(PathBuf, u32),

    /// The materialized configuration failed a semantic check (a bad
    /// endpoint, an uncompilable route pattern, etc).
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Result with error type defaulting to [`ConfigError`].
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[derive(Deserialize)]
struct SchemaVersionProbe {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
}

fn default_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

/// Load a [`HookConfiguration`] from `path` (TOML if the extension is
/// `.toml`, JSON otherwise), layered under `HOOKPROXY_*` environment
/// variable overrides, and validate it.
pub fn load(path: impl AsRef<Path>) -> Result<HookConfiguration> {
    let path = path.as_ref();
    let figment = file_provider(path).merge(Env::prefixed("HOOKPROXY_"));

    let probe: SchemaVersionProbe = figment
        .extract()
        .map_err(|e| ConfigError::Load(path.to_owned(), Box::new(e)))?;
    if probe.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(ConfigError::UnsupportedSchemaVersion(
            path.to_owned(),
            probe.schema_version,
        ));
    }

    let config: HookConfiguration = figment
        .extract()
        .map_err(|e| ConfigError::Load(path.to_owned(), Box::new(e)))?;
    validate(&config)?;
    tracing::debug!(path = %path.display(), webhooks = config.web_hooks.len(), "loaded configuration");
    Ok(config)
}

fn file_provider(path: &Path) -> Figment {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Figment::new().merge(Toml::file(path)),
        _ => Figment::new().merge(Json::file(path)),
    }
}

/// Check that every endpoint parses and every route pattern compiles. This
/// runs once, at startup, so a malformed config never reaches the core.
fn validate(config: &HookConfiguration) -> Result<()> {
    Endpoint::parse(&config.listen_address)
        .map_err(|e| ConfigError::Validation(format!("listenAddress: {e}")))?;
    Endpoint::parse(&config.remote_endpoint)
        .map_err(|e| ConfigError::Validation(format!("remoteEndpoint: {e}")))?;

    for item in &config.web_hooks {
        Endpoint::parse_unix(&item.endpoint, true).map_err(|e| {
            ConfigError::Validation(format!("webHooks[{:?}].endpoint: {e}", item.name))
        })?;
        for stage in &item.stages {
            try_compile_pattern(&stage.url_pattern).map_err(|e| {
                ConfigError::Validation(format!(
                    "webHooks[{:?}].stages: invalid urlPattern {:?}: {e}",
                    item.name, stage.url_pattern
                ))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn good_json() -> serde_json::Value {
        serde_json::json!({
            "schema_version": 1,
            "listenAddress": "unix:///tmp/hookproxy.sock",
            "webHooks": [
                {
                    "name": "example",
                    "endpoint": "unix:///tmp/hook.sock",
                    "stages": [
                        {"urlPattern": "/container/{id}/create", "type": "pre"}
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_load_json_applies_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hookproxy.json");
        fs::write(&path, good_json().to_string()).unwrap();

        let cfg = load(&path).unwrap();
        assert_eq!(cfg.timeout_secs, 5);
        assert_eq!(cfg.remote_endpoint, "unix:///var/run/docker.sock");
        assert_eq!(cfg.web_hooks[0].stages[0].method, "POST");
    }

    #[test]
    fn test_load_rejects_unsupported_schema_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hookproxy.json");
        let mut json = good_json();
        json["schema_version"] = serde_json::json!(99);
        fs::write(&path, json.to_string()).unwrap();

        match load(&path) {
            Err(ConfigError::UnsupportedSchemaVersion(_, 99)) => {}
            other => panic!("expected UnsupportedSchemaVersion, got {other:?}"),
        }
    }

    #[test]
    fn test_load_rejects_bad_url_pattern() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hookproxy.json");
        let mut json = good_json();
        json["webHooks"][0]["stages"][0]["urlPattern"] = serde_json::json!("/container/{id:(}");
        fs::write(&path, json.to_string()).unwrap();

        assert!(matches!(load(&path), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_rejects_non_unix_webhook_endpoint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hookproxy.json");
        let mut json = good_json();
        json["webHooks"][0]["endpoint"] = serde_json::json!("tcp://127.0.0.1:8080");
        fs::write(&path, json.to_string()).unwrap();

        assert!(matches!(load(&path), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_env_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hookproxy.json");
        fs::write(&path, good_json().to_string()).unwrap();

        std::env::set_var("HOOKPROXY_LISTENADDRESS", "tcp://127.0.0.1:9000");
        let cfg = load(&path);
        std::env::remove_var("HOOKPROXY_LISTENADDRESS");
        assert_eq!(cfg.unwrap().listen_address, "tcp://127.0.0.1:9000");
    }
}
