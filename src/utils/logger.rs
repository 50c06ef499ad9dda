// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use tracing_subscriber::{EnvFilter, prelude::*};

use crate::config::LogConfig;

/// Installs a stderr logger filtered by `RUST_LOG`, or by `config` when the
/// variable is not set.
pub fn setup_logger(config: &LogConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::Layer::new()
                .with_writer(std::io::stderr)
                .with_filter(get_env_filter(default_env_filter(config))),
        )
        .init();
}

/// Returns an [`EnvFilter`] according to the `RUST_LOG` environment variable, or `def`.
fn get_env_filter(def: EnvFilter) -> EnvFilter {
    use std::env::{
        self,
        VarError::{NotPresent, NotUnicode},
    };
    match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(s) => EnvFilter::new(s),
        Err(NotPresent) => def,
        Err(NotUnicode(_)) => EnvFilter::default(),
    }
}

fn default_env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_new(config.to_filter_string()).unwrap_or_else(|e| {
        eprintln!("invalid log filters in configuration ({e}), falling back to `info`");
        EnvFilter::new("info")
    })
}
