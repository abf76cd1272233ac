// elfwatch/src/config.rs
//
// Runtime settings assembled from the CLI and the process environment.
// The only secret is the insight provider's API key, read from
// OPENAI_API_KEY (after .env is loaded) and only when a client is built.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use serde::Serialize;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// When the data directory is (re)read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReloadPolicy {
    /// Re-read every file on every request; on-disk edits show up at once.
    #[default]
    PerRequest,
    /// Load once at startup; refresh only through an explicit reload.
    Startup,
}

impl std::fmt::Display for ReloadPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PerRequest => write!(f, "per-request"),
            Self::Startup => write!(f, "startup"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InsightSettings {
    pub enabled:     bool,
    pub model:       String,
    pub api_base:    String,
    pub timeout:     Duration,
    pub temperature: f32,
    pub max_tokens:  u32,
}

impl Default for InsightSettings {
    fn default() -> Self {
        Self {
            enabled:     false,
            model:       DEFAULT_MODEL.to_string(),
            api_base:    DEFAULT_API_BASE.to_string(),
            timeout:     Duration::from_secs(10),
            temperature: 0.7,
            max_tokens:  500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir:     PathBuf,
    pub template_dir: PathBuf,
    pub bind:         SocketAddr,
    pub reload:       ReloadPolicy,
    pub insight:      InsightSettings,
}

impl Settings {
    pub fn new(data_dir: impl Into<PathBuf>, template_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir:     data_dir.into(),
            template_dir: template_dir.into(),
            bind:         SocketAddr::from(([127, 0, 0, 1], 5000)),
            reload:       ReloadPolicy::default(),
            insight:      InsightSettings::default(),
        }
    }
}

/// Read the API key, treating an empty value as absent.
pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty())
}
