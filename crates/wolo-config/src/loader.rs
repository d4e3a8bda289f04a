// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use wolo_error::WoloError;

use crate::{Config, EndpointConfig};

/// Ordered list of config file locations searched from lowest to highest
/// priority.  Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/wolo/config.yaml"));
        paths.push(home.join(".config/wolo/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("wolo/config.yaml"));
        paths.push(cfg.join("wolo/config.yml"));
    }
    paths
}

/// Load configuration by merging all discovered YAML files.
/// `extra` may provide an explicit path (e.g. a `--config` CLI flag).
pub fn load(extra: Option<&Path>) -> Result<Config, WoloError> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            merge_file(&mut merged, &path)?;
        }
    }
    if let Some(p) = extra {
        if !p.is_file() {
            return Err(
                WoloError::config(format!("config file not found: {}", p.display()))
                    .with_context("path", p.display().to_string()),
            );
        }
        merge_file(&mut merged, p)?;
    }

    let config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
        Config::default()
    } else {
        serde_yaml::from_value(merged)
            .map_err(|e| WoloError::config(format!("malformed config: {e}")))?
    };
    Ok(config)
}

fn merge_file(merged: &mut serde_yaml::Value, path: &Path) -> Result<(), WoloError> {
    debug!(path = %path.display(), "loading config layer");
    let text = std::fs::read_to_string(path).map_err(|e| {
        WoloError::config(format!("reading {}: {e}", path.display()))
            .with_context("path", path.display().to_string())
    })?;
    let layer: serde_yaml::Value = serde_yaml::from_str(&text).map_err(|e| {
        WoloError::config(format!("parsing {}: {e}", path.display()))
            .with_context("path", path.display().to_string())
    })?;
    merge_yaml(merged, layer);
    Ok(())
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

/// A fully resolved endpoint, ready to construct the chat client.
#[derive(Debug, Clone)]
pub struct ResolvedEndpoint {
    pub name: String,
    pub model: String,
    pub api_base: String,
    pub api_key: String,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub context_window: Option<u32>,
}

/// Overrides sourced from the CLI and the environment.
///
/// Precedence for every field: explicit CLI flag > environment variable >
/// config file.  A key read from the config file is accepted but warned
/// about, since config files tend to end up in version control.
#[derive(Debug, Clone, Default)]
pub struct EndpointOverrides {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

/// Environment variables consulted during resolution.
pub mod env_keys {
    pub const API_KEY: &str = "WOLO_API_KEY";
    pub const MODEL: &str = "WOLO_MODEL";
    pub const BASE_URL: &str = "WOLO_BASE_URL";
    pub const THINK: &str = "WOLO_THINK";
    pub const HOME: &str = "WOLO_HOME";
}

/// Pick and resolve the endpoint to use for this run.
pub fn resolve_endpoint(
    config: &Config,
    overrides: &EndpointOverrides,
) -> Result<ResolvedEndpoint, WoloError> {
    let entry = select_endpoint(config, overrides.endpoint.as_deref())?;

    let model = overrides
        .model
        .clone()
        .or_else(|| std::env::var(env_keys::MODEL).ok())
        .unwrap_or_else(|| entry.model.clone());
    let api_base = std::env::var(env_keys::BASE_URL)
        .ok()
        .unwrap_or_else(|| entry.api_base.clone());

    let api_key = match &overrides.api_key {
        Some(k) => k.clone(),
        None => match std::env::var(env_keys::API_KEY) {
            Ok(k) if !k.is_empty() => k,
            _ => match &entry.api_key {
                Some(k) => {
                    warn!(
                        endpoint = %entry.name,
                        "reading API key from config file; prefer the WOLO_API_KEY environment variable"
                    );
                    k.clone()
                }
                None => {
                    return Err(WoloError::config(format!(
                        "no API key for endpoint '{}'",
                        entry.name
                    ))
                    .with_context("endpoint", entry.name.clone())
                    .with_context("model", model));
                }
            },
        },
    };

    Ok(ResolvedEndpoint {
        name: entry.name.clone(),
        model,
        api_base,
        api_key,
        temperature: entry.temperature,
        top_p: entry.top_p,
        max_tokens: entry.max_tokens,
        context_window: entry.context_window,
    })
}

fn select_endpoint<'a>(
    config: &'a Config,
    requested: Option<&str>,
) -> Result<&'a EndpointConfig, WoloError> {
    let name = requested
        .map(str::to_string)
        .or_else(|| config.default_endpoint.clone());
    match name {
        Some(name) => config
            .endpoints
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| {
                WoloError::config(format!("unknown endpoint '{name}'"))
                    .with_context("endpoint", name)
            }),
        None => config
            .endpoints
            .first()
            .ok_or_else(|| WoloError::config("no endpoints configured")),
    }
}

/// Root directory holding per-user wolo state (`sessions/`, `memory.md`).
///
/// `WOLO_HOME` overrides; otherwise `~/.local/share/wolo` (XDG data dir).
pub fn data_dir() -> PathBuf {
    if let Ok(home) = std::env::var(env_keys::HOME) {
        if !home.is_empty() {
            return PathBuf::from(shellexpand::tilde(&home).into_owned());
        }
    }
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("wolo")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
