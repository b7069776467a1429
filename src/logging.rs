// src/logging.rs
//! tracing subscriber setup for the `locprobe` binary

use crate::error::{LocationError, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_DIRECTIVE: &str = "info";

/// Pick the filter: an explicit directive wins, then `RUST_LOG`, then `info`.
pub fn env_filter(directive: Option<&str>) -> Result<EnvFilter> {
    match directive {
        Some(directive) => EnvFilter::try_new(directive).map_err(|e| {
            LocationError::invalid(format!("Bad log directive '{}': {}", directive, e))
        }),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))),
    }
}

/// Install the global fmt subscriber. Fails if one is already installed.
pub fn init_logging(directive: Option<&str>) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(directive)?)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| LocationError::invalid(format!("Logging already initialised: {}", e)))
}
