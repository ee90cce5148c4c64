//! JSON bodies exchanged with the loom's `/api/v1` endpoints.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{LiftplanName, LoomInfo, LoomState, StartCommand, WifiInfo},
    error::ValidationError,
};

pub const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiInfoPayload {
    pub hostname: String,
    #[serde(rename = "SSID")]
    pub ssid: String,
    /// Base64 of the plain text password.
    pub password: String,
}

impl From<&WifiInfo> for WifiInfoPayload {
    fn from(value: &WifiInfo) -> Self {
        Self {
            hostname: value.hostname.clone(),
            ssid: value.ssid.clone(),
            password: STANDARD.encode(value.password.as_bytes()),
        }
    }
}

impl TryFrom<WifiInfoPayload> for WifiInfo {
    type Error = ValidationError;

    fn try_from(value: WifiInfoPayload) -> Result<Self, Self::Error> {
        let raw = STANDARD
            .decode(value.password.trim())
            .map_err(|e| ValidationError::InvalidPassword(e.to_string()))?;
        let password =
            String::from_utf8(raw).map_err(|e| ValidationError::InvalidPassword(e.to_string()))?;
        Ok(WifiInfo {
            hostname: value.hostname,
            ssid: value.ssid,
            password,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoomStatusResponse {
    pub loom_state: LoomState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_liftplan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liftplan_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liftplan_length: Option<u32>,
}

impl From<LoomStatusResponse> for LoomInfo {
    fn from(value: LoomStatusResponse) -> Self {
        // The firmware sends an empty string when nothing is loaded.
        let active_liftplan = value
            .active_liftplan
            .and_then(|name| LiftplanName::new(name).ok());
        Self {
            state: value.loom_state,
            active_liftplan,
            index: value.liftplan_index.unwrap_or(0),
            liftplan_length: value.liftplan_length,
        }
    }
}

pub type StartRequest = StartCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiftplanIndexResponse {
    pub index: u32,
}

/// A row index observed by polling the loom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSample {
    pub liftplan: Option<LiftplanName>,
    pub index: u32,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wifi_payload_uses_wire_names_and_base64_password() {
        let info = WifiInfo {
            hostname: "loom".into(),
            ssid: "workshop".into(),
            password: "p@ss word".into(),
        };
        let json = serde_json::to_value(WifiInfoPayload::from(&info)).expect("serialize");
        assert_eq!(json["SSID"], "workshop");
        assert_eq!(json["password"], "cEBzcyB3b3Jk");

        let payload: WifiInfoPayload = serde_json::from_value(json).expect("parse");
        assert_eq!(WifiInfo::try_from(payload).expect("decode"), info);
    }

    #[test]
    fn wifi_payload_rejects_non_base64_password() {
        let payload = WifiInfoPayload {
            hostname: "loom".into(),
            ssid: "workshop".into(),
            password: "***".into(),
        };
        assert!(matches!(
            WifiInfo::try_from(payload),
            Err(ValidationError::InvalidPassword(_))
        ));
    }

    #[test]
    fn loom_status_maps_to_info() {
        let response: LoomStatusResponse = serde_json::from_str(
            r#"{"loom_state":"running","active_liftplan":"twill.json","liftplan_index":3,"liftplan_length":12}"#,
        )
        .expect("parse");
        let info = LoomInfo::from(response);
        assert_eq!(info.state, LoomState::Running);
        assert_eq!(info.active_liftplan.as_ref().map(|n| n.as_str()), Some("twill.json"));
        assert_eq!(info.index, 3);
        assert_eq!(info.liftplan_length, Some(12));
    }

    #[test]
    fn idle_status_without_liftplan_fields() {
        let response: LoomStatusResponse =
            serde_json::from_str(r#"{"loom_state":"idle","active_liftplan":""}"#).expect("parse");
        let info = LoomInfo::from(response);
        assert_eq!(info, LoomInfo::idle());
    }

    #[test]
    fn start_request_wire_shape() {
        let request = StartRequest {
            liftplan: LiftplanName::new("twill.json").expect("name"),
            start_position: 4,
        };
        assert_eq!(
            serde_json::to_string(&request).expect("serialize"),
            r#"{"liftplan":"twill.json","start_position":4}"#
        );
    }
}
