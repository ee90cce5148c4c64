//! In-memory loom used by the session, store and controller tests.

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use async_trait::async_trait;
use shared::{
    domain::{LiftplanName, LoomState, WifiInfo},
    protocol::{CommandResponse, LoomStatusResponse},
};
use tokio::sync::Mutex;

use crate::{
    api::{LoomApi, LoomCommand},
    error::{ControlError, ControlResult},
};

pub(crate) struct FakeLoomState {
    pub loom_state: LoomState,
    pub active_liftplan: Option<String>,
    pub index: u32,
    pub plans: BTreeMap<String, Vec<String>>,
    pub wifi: WifiInfo,
    pub reject_commands: bool,
    pub fail_status: Option<u16>,
    /// Per-endpoint failures, keyed like `calls`.
    pub failing_calls: HashMap<String, u16>,
    pub index_delay: Duration,
    pub plan_delays: HashMap<String, Duration>,
    pub calls: Vec<String>,
}

pub(crate) struct FakeLoom {
    pub state: Mutex<FakeLoomState>,
}

impl FakeLoom {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeLoomState {
                loom_state: LoomState::Idle,
                active_liftplan: None,
                index: 0,
                plans: BTreeMap::new(),
                wifi: WifiInfo {
                    hostname: "loom".into(),
                    ssid: "workshop".into(),
                    password: "secret".into(),
                },
                reject_commands: false,
                fail_status: None,
                failing_calls: HashMap::new(),
                index_delay: Duration::ZERO,
                plan_delays: HashMap::new(),
                calls: Vec::new(),
            }),
        }
    }

    pub fn with_plan(self, name: &str, rows: &[&str]) -> Self {
        self.state
            .try_lock()
            .expect("fresh fake")
            .plans
            .insert(name.to_string(), rows.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn running(self, liftplan: &str, index: u32) -> Self {
        {
            let mut state = self.state.try_lock().expect("fresh fake");
            state.loom_state = LoomState::Running;
            state.active_liftplan = Some(liftplan.to_string());
            state.index = index;
        }
        self
    }

    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn call_count(&self, endpoint: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| call.as_str() == endpoint)
            .count()
    }

    async fn record(&self, endpoint: &str) -> ControlResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(endpoint.to_string());
        match state
            .fail_status
            .or_else(|| state.failing_calls.get(endpoint).copied())
        {
            Some(status) => Err(ControlError::Remote {
                endpoint: endpoint.to_string(),
                status,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LoomApi for FakeLoom {
    async fn get_wifi(&self) -> ControlResult<WifiInfo> {
        self.record("GET /wifi").await?;
        Ok(self.state.lock().await.wifi.clone())
    }

    async fn set_wifi(&self, info: &WifiInfo) -> ControlResult<()> {
        self.record("POST /wifi").await?;
        self.state.lock().await.wifi = info.clone();
        Ok(())
    }

    async fn list_liftplans(&self) -> ControlResult<Vec<String>> {
        self.record("GET /liftplan").await?;
        Ok(self.state.lock().await.plans.keys().cloned().collect())
    }

    async fn get_liftplan(&self, name: &LiftplanName) -> ControlResult<Vec<String>> {
        self.record("GET /liftplan?name").await?;
        let delay = self
            .state
            .lock()
            .await
            .plan_delays
            .get(name.as_str())
            .copied()
            .unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.state
            .lock()
            .await
            .plans
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| ControlError::NotFound { name: name.clone() })
    }

    async fn save_liftplan(&self, file_name: &str, rows: &[String]) -> ControlResult<()> {
        self.record("POST /liftplan").await?;
        self.state
            .lock()
            .await
            .plans
            .insert(file_name.to_string(), rows.to_vec());
        Ok(())
    }

    async fn delete_liftplan(&self, name: &LiftplanName) -> ControlResult<()> {
        self.record("DELETE /liftplan").await?;
        match self.state.lock().await.plans.remove(name.as_str()) {
            Some(_) => Ok(()),
            None => Err(ControlError::Remote {
                endpoint: "/api/v1/liftplan".into(),
                status: 500,
            }),
        }
    }

    async fn loom_status(&self) -> ControlResult<LoomStatusResponse> {
        self.record("GET /loom").await?;
        let state = self.state.lock().await;
        Ok(LoomStatusResponse {
            loom_state: state.loom_state,
            active_liftplan: state.active_liftplan.clone(),
            liftplan_index: Some(state.index),
            liftplan_length: None,
        })
    }

    async fn send_command(&self, command: &LoomCommand) -> ControlResult<CommandResponse> {
        self.record(&format!("POST /loom/{}", command.kind())).await?;
        let mut state = self.state.lock().await;
        if state.reject_commands {
            return Ok(CommandResponse { status: false });
        }
        match command {
            LoomCommand::Start(start) => {
                state.loom_state = LoomState::Running;
                state.active_liftplan = Some(start.liftplan.to_string());
                state.index = start.start_position;
            }
            LoomCommand::Pause => state.loom_state = LoomState::Paused,
            LoomCommand::Continue => state.loom_state = LoomState::Running,
            LoomCommand::Stop => {
                state.loom_state = LoomState::Idle;
                state.active_liftplan = None;
                state.index = 0;
            }
        }
        Ok(CommandResponse { status: true })
    }

    /// Returns the current row and advances one row, like a weaving loom.
    async fn liftplan_index(&self) -> ControlResult<u32> {
        self.record("GET /loom/liftplan_index").await?;
        let delay = self.state.lock().await.index_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().await;
        let index = state.index;
        state.index += 1;
        Ok(index)
    }
}
