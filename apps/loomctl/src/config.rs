use std::{fs, path::Path, time::Duration};

use anyhow::{ensure, Result};
use client_core::{ClientOptions, DEFAULT_BASE_URL, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT};
use tracing::warn;

pub const CONFIG_FILE: &str = "loomctl.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub loom_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            loom_url: DEFAULT_BASE_URL.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl Settings {
    /// Command line flags win over everything else.
    pub fn with_overrides(
        mut self,
        loom_url: Option<String>,
        poll_interval_ms: Option<u64>,
        request_timeout_ms: Option<u64>,
    ) -> Self {
        if let Some(v) = loom_url {
            self.loom_url = v;
        }
        if let Some(v) = poll_interval_ms {
            self.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = request_timeout_ms {
            self.request_timeout = Duration::from_millis(v);
        }
        self
    }

    pub fn client_options(&self) -> Result<ClientOptions> {
        ensure!(
            !self.poll_interval.is_zero(),
            "poll interval must be greater than zero"
        );
        ensure!(
            !self.request_timeout.is_zero(),
            "request timeout must be greater than zero"
        );
        Ok(ClientOptions::new(&self.loom_url)?
            .with_poll_interval(self.poll_interval)
            .with_request_timeout(self.request_timeout))
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(CONFIG_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the config file at `path`, then environment variables.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<toml::Table>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, &file_cfg),
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring unreadable config file"),
        }
    }

    if let Some(v) = env("LOOM_URL") {
        settings.loom_url = v;
    }
    if let Some(v) = env("APP__LOOM_URL") {
        settings.loom_url = v;
    }

    if let Some(ms) = env("APP__POLL_INTERVAL_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
        settings.poll_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = env("APP__REQUEST_TIMEOUT_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
        settings.request_timeout = Duration::from_millis(ms);
    }

    settings
}

fn apply_file(settings: &mut Settings, file_cfg: &toml::Table) {
    if let Some(v) = file_cfg.get("loom_url").and_then(toml::Value::as_str) {
        settings.loom_url = v.to_string();
    }
    if let Some(ms) = file_cfg.get("poll_interval_ms").and_then(millis) {
        settings.poll_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = file_cfg.get("request_timeout_ms").and_then(millis) {
        settings.request_timeout = Duration::from_millis(ms);
    }
}

/// Accepts `250` as well as `"250"`.
fn millis(value: &toml::Value) -> Option<u64> {
    match value {
        toml::Value::Integer(v) => u64::try_from(*v).ok(),
        toml::Value::String(v) => v.trim().parse().ok(),
        _ => None,
    }
}
