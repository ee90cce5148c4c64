//! Transport seam: every REST endpoint the loom exposes, behind one trait.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{LiftplanName, LoomCommandKind, StartCommand, WifiInfo},
    protocol::{
        CommandResponse, LiftplanIndexResponse, LoomStatusResponse, WifiInfoPayload, API_PREFIX,
    },
};
use tracing::debug;

use crate::{
    error::{ControlError, ControlResult},
    ClientOptions,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoomCommand {
    Start(StartCommand),
    Pause,
    Continue,
    Stop,
}

impl LoomCommand {
    pub fn kind(&self) -> LoomCommandKind {
        match self {
            LoomCommand::Start(_) => LoomCommandKind::Start,
            LoomCommand::Pause => LoomCommandKind::Pause,
            LoomCommand::Continue => LoomCommandKind::Continue,
            LoomCommand::Stop => LoomCommandKind::Stop,
        }
    }
}

#[async_trait]
pub trait LoomApi: Send + Sync {
    async fn get_wifi(&self) -> ControlResult<WifiInfo>;
    async fn set_wifi(&self, info: &WifiInfo) -> ControlResult<()>;
    async fn list_liftplans(&self) -> ControlResult<Vec<String>>;
    async fn get_liftplan(&self, name: &LiftplanName) -> ControlResult<Vec<String>>;
    async fn save_liftplan(&self, file_name: &str, rows: &[String]) -> ControlResult<()>;
    async fn delete_liftplan(&self, name: &LiftplanName) -> ControlResult<()>;
    async fn loom_status(&self) -> ControlResult<LoomStatusResponse>;
    async fn send_command(&self, command: &LoomCommand) -> ControlResult<CommandResponse>;
    async fn liftplan_index(&self) -> ControlResult<u32>;
}

pub struct HttpLoomApi {
    http: Client,
    base_url: String,
}

impl HttpLoomApi {
    pub fn new(options: &ClientOptions) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(options.request_timeout)
            .build()
            .context("failed to build loom HTTP client")?;
        Ok(Self {
            http,
            base_url: options.base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url)
    }
}

fn endpoint(path: &str) -> String {
    format!("{API_PREFIX}{path}")
}

async fn dispatch(path: &str, request: RequestBuilder) -> ControlResult<Response> {
    let response = request.send().await.map_err(|e| ControlError::Network {
        endpoint: endpoint(path),
        message: e.to_string(),
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(ControlError::Remote {
            endpoint: endpoint(path),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

async fn read_json<T: DeserializeOwned>(path: &str, response: Response) -> ControlResult<T> {
    response.json::<T>().await.map_err(|e| {
        if e.is_decode() {
            ControlError::MalformedResponse {
                endpoint: endpoint(path),
                message: e.to_string(),
            }
        } else {
            ControlError::Network {
                endpoint: endpoint(path),
                message: e.to_string(),
            }
        }
    })
}

#[async_trait]
impl LoomApi for HttpLoomApi {
    async fn get_wifi(&self) -> ControlResult<WifiInfo> {
        let path = "/wifi";
        let response = dispatch(path, self.http.get(self.url(path))).await?;
        let payload: WifiInfoPayload = read_json(path, response).await?;
        Ok(WifiInfo::try_from(payload)?)
    }

    async fn set_wifi(&self, info: &WifiInfo) -> ControlResult<()> {
        let path = "/wifi";
        dispatch(
            path,
            self.http
                .post(self.url(path))
                .json(&WifiInfoPayload::from(info)),
        )
        .await?;
        Ok(())
    }

    async fn list_liftplans(&self) -> ControlResult<Vec<String>> {
        let path = "/liftplan";
        let response = dispatch(path, self.http.get(self.url(path))).await?;
        read_json(path, response).await
    }

    async fn get_liftplan(&self, name: &LiftplanName) -> ControlResult<Vec<String>> {
        let path = "/liftplan";
        let request = self
            .http
            .get(self.url(path))
            .query(&[("name", name.as_str())]);
        let response = match dispatch(path, request).await {
            Ok(response) => response,
            Err(ControlError::Remote { status, .. }) => {
                debug!(liftplan = %name, status, "loom has no such liftplan");
                return Err(ControlError::NotFound { name: name.clone() });
            }
            Err(err) => return Err(err),
        };
        read_json(path, response).await
    }

    async fn save_liftplan(&self, file_name: &str, rows: &[String]) -> ControlResult<()> {
        let path = "/liftplan";
        let body = serde_json::to_string_pretty(rows).map_err(|e| ControlError::Network {
            endpoint: endpoint(path),
            message: format!("failed to encode liftplan body: {e}"),
        })?;
        dispatch(
            path,
            self.http
                .post(self.url(path))
                .query(&[("name", file_name)])
                .header(CONTENT_TYPE, "application/json")
                .body(body),
        )
        .await?;
        Ok(())
    }

    async fn delete_liftplan(&self, name: &LiftplanName) -> ControlResult<()> {
        let path = "/liftplan";
        dispatch(
            path,
            self.http
                .delete(self.url(path))
                .query(&[("name", name.as_str())]),
        )
        .await?;
        Ok(())
    }

    async fn loom_status(&self) -> ControlResult<LoomStatusResponse> {
        let path = "/loom";
        let response = dispatch(path, self.http.get(self.url(path))).await?;
        read_json(path, response).await
    }

    async fn send_command(&self, command: &LoomCommand) -> ControlResult<CommandResponse> {
        let path = format!("/loom/{}", command.kind().as_str());
        let request = match command {
            LoomCommand::Start(start) => self.http.post(self.url(&path)).json(start),
            _ => self.http.post(self.url(&path)),
        };
        let response = dispatch(&path, request).await?;
        read_json(&path, response).await
    }

    async fn liftplan_index(&self) -> ControlResult<u32> {
        let path = "/loom/liftplan_index";
        let response = dispatch(path, self.http.get(self.url(path))).await?;
        let body: LiftplanIndexResponse = read_json(path, response).await?;
        Ok(body.index)
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
