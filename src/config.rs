// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::defaults;
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;
use tracing::warn;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub debug: bool,
    pub metrics_port: u16,
    /// Namespace holding the source secrets
    pub namespace: String,
    /// Namespaces carrying this label key never receive replicas; empty disables the check
    pub exclude_namespace_label: String,
    pub sync_interval: Duration,
    pub secret_sync_debounce: Duration,
    /// Write operations per second shared by every sync path
    pub secret_sync_rate_limit: u32,
    /// When false only the periodic reconciler keeps replicas in sync
    pub enable_secret_watcher: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Out-of-range and unparsable numbers fall back to their defaults with a
    /// warning. Only a missing source namespace is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let namespace = get("NAMESPACE")
            .context("NAMESPACE environment variable not set, the source namespace is required")?;

        let metrics_port = bounded(
            "METRICS_PORT",
            parse_int(get("METRICS_PORT"), "METRICS_PORT", defaults::METRICS_PORT.into()),
            (1, 65535),
            defaults::METRICS_PORT.into(),
        );
        let sync_interval = bounded(
            "SYNC_INTERVAL",
            parse_int(
                get("SYNC_INTERVAL"),
                "SYNC_INTERVAL",
                defaults::SYNC_INTERVAL_MINUTES as i64,
            ),
            defaults::SYNC_INTERVAL_RANGE,
            defaults::SYNC_INTERVAL_MINUTES as i64,
        );
        let debounce = bounded(
            "SECRET_SYNC_DEBOUNCE_SECONDS",
            parse_int(
                get("SECRET_SYNC_DEBOUNCE_SECONDS"),
                "SECRET_SYNC_DEBOUNCE_SECONDS",
                defaults::DEBOUNCE_SECONDS as i64,
            ),
            defaults::DEBOUNCE_RANGE,
            defaults::DEBOUNCE_SECONDS as i64,
        );
        let rate_limit = bounded(
            "SECRET_SYNC_RATE_LIMIT",
            parse_int(
                get("SECRET_SYNC_RATE_LIMIT"),
                "SECRET_SYNC_RATE_LIMIT",
                defaults::RATE_LIMIT.into(),
            ),
            defaults::RATE_LIMIT_RANGE,
            defaults::RATE_LIMIT.into(),
        );

        // All values are within their ranges at this point, so the narrowing casts are lossless
        Ok(Config {
            debug: get("DEBUG").is_some_and(|v| v == "true"),
            metrics_port: metrics_port as u16,
            namespace,
            exclude_namespace_label: get("EXCLUDE_NAMESPACE_LABEL").unwrap_or_default(),
            sync_interval: Duration::from_secs(sync_interval as u64 * 60),
            secret_sync_debounce: Duration::from_secs(debounce as u64),
            secret_sync_rate_limit: rate_limit as u32,
            enable_secret_watcher: get("ENABLE_SECRET_WATCHER").map_or(true, |v| v == "true"),
        })
    }
}

fn parse_int(value: Option<String>, key: &str, default: i64) -> i64 {
    let Some(value) = value else {
        return default;
    };
    match value.parse::<i64>() {
        Ok(v) => v,
        Err(e) => {
            warn!(
                "Failed to parse environment variable {}: {}. Using default value: {}",
                key, e, default
            );
            default
        }
    }
}

fn bounded(key: &str, value: i64, (min, max): (i64, i64), default: i64) -> i64 {
    if (min..=max).contains(&value) {
        value
    } else {
        warn!(
            "{} value {} is out of valid range ({}-{}). Using default value: {}",
            key, value, min, max, default
        );
        default
    }
}
