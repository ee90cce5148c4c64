use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use url::Url;

pub mod api;
pub mod controller;
pub mod error;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{HttpLoomApi, LoomApi, LoomCommand};
pub use controller::{CommandAvailability, ControlPanelController, PanelEvent, PanelView};
pub use error::{ControlError, ControlResult, ErrorKind};
pub use session::{LoomSession, SessionEvent};
pub use store::LiftplanStore;

pub const DEFAULT_BASE_URL: &str = "http://loom.local";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Where the loom lives and how the client talks to it.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: Url,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

impl ClientOptions {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url.trim())
            .with_context(|| format!("invalid loom url '{base_url}'"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "loom url must start with http:// or https://, got '{base_url}'"
            ));
        }
        Ok(Self {
            base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
