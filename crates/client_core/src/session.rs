//! Loom state machine and the liftplan index poller.
//!
//! The session owns the cached [`LoomInfo`] and the single polling task.
//! Commands are the only way the cached state changes: a command is checked
//! against the transition table, sent to the loom, and applied only after
//! the loom acknowledged it.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::Utc;
use shared::{
    domain::{LiftPlan, LiftplanName, LoomCommandKind, LoomInfo, LoomState, StartCommand},
    error::ValidationError,
    protocol::ProgressSample,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    api::{LoomApi, LoomCommand},
    error::{ControlError, ControlResult},
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(LoomInfo),
    Progress(ProgressSample),
    PollFailed(String),
}

struct Poller {
    generation: u64,
    task: JoinHandle<()>,
}

struct SessionState {
    info: LoomInfo,
    poller: Option<Poller>,
    /// Bumped whenever a poller starts or is cancelled; a poll result is
    /// published only if its generation is still current.
    poll_generation: u64,
    #[cfg(test)]
    pollers_started: u64,
}

pub struct LoomSession {
    api: Arc<dyn LoomApi>,
    poll_interval: Duration,
    inner: Arc<Mutex<SessionState>>,
    command_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl LoomSession {
    /// Reads the current loom status and starts polling if the loom is
    /// already running or paused.
    pub async fn connect(api: Arc<dyn LoomApi>, poll_interval: Duration) -> ControlResult<Self> {
        let info = LoomInfo::from(api.loom_status().await.inspect_err(|err| {
            warn!(error = %err, "failed to read loom status");
        })?);
        info!(state = %info.state, liftplan = ?info.active_liftplan, "loom session connected");

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let session = Self {
            api,
            poll_interval,
            inner: Arc::new(Mutex::new(SessionState {
                info,
                poller: None,
                poll_generation: 0,
                #[cfg(test)]
                pollers_started: 0,
            })),
            command_lock: Mutex::new(()),
            events,
        };
        {
            let mut guard = session.inner.lock().await;
            if guard.info.state.is_active() {
                session.ensure_polling(&mut guard);
            }
        }
        Ok(session)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub async fn info(&self) -> LoomInfo {
        self.inner.lock().await.info.clone()
    }

    pub async fn state(&self) -> LoomState {
        self.inner.lock().await.info.state
    }

    pub async fn is_polling(&self) -> bool {
        let guard = self.inner.lock().await;
        guard
            .poller
            .as_ref()
            .is_some_and(|poller| !poller.task.is_finished())
    }

    pub async fn start(
        &self,
        name: &LiftplanName,
        plan: &LiftPlan,
        start_position: u32,
    ) -> ControlResult<LoomInfo> {
        let _command = self.command_lock.lock().await;
        let next = self.check_transition(LoomCommandKind::Start).await?;
        let position = usize::try_from(start_position).unwrap_or(usize::MAX);
        if position >= plan.len() {
            return Err(ValidationError::StartPositionOutOfRange {
                position: start_position,
                len: plan.len(),
            }
            .into());
        }
        let length = u32::try_from(plan.len()).ok();
        let command = LoomCommand::Start(StartCommand {
            liftplan: name.clone(),
            start_position,
        });
        self.dispatch(command, next, |info| info.liftplan_length = length)
            .await
    }

    pub async fn pause(&self) -> ControlResult<LoomInfo> {
        self.simple_command(LoomCommand::Pause).await
    }

    /// Sends the loom's `continue` command.
    pub async fn resume(&self) -> ControlResult<LoomInfo> {
        self.simple_command(LoomCommand::Continue).await
    }

    pub async fn stop(&self) -> ControlResult<LoomInfo> {
        self.simple_command(LoomCommand::Stop).await
    }

    /// Re-reads the loom status and brings the poller in line with it.
    pub async fn refresh(&self) -> ControlResult<LoomInfo> {
        let _command = self.command_lock.lock().await;
        let info = LoomInfo::from(self.api.loom_status().await.inspect_err(|err| {
            warn!(error = %err, "failed to refresh loom status");
        })?);

        let changed = {
            let mut guard = self.inner.lock().await;
            let changed = guard.info.state != info.state
                || guard.info.active_liftplan != info.active_liftplan;
            guard.info = info.clone();
            if info.state.is_active() {
                self.ensure_polling(&mut guard);
            } else {
                cancel_polling(&mut guard);
            }
            if changed {
                let _ = self.events.send(SessionEvent::StateChanged(info.clone()));
            }
            changed
        };
        if changed {
            info!(state = %info.state, liftplan = ?info.active_liftplan, "loom status changed remotely");
        }
        Ok(info)
    }

    /// Cancels polling. The cached state is kept.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        cancel_polling(&mut guard);
    }

    async fn simple_command(&self, command: LoomCommand) -> ControlResult<LoomInfo> {
        let _command = self.command_lock.lock().await;
        let next = self.check_transition(command.kind()).await?;
        self.dispatch(command, next, |_| {}).await
    }

    async fn check_transition(&self, command: LoomCommandKind) -> ControlResult<LoomState> {
        let state = self.state().await;
        state.transition(command).ok_or_else(|| {
            debug!(%state, %command, "rejecting illegal loom command");
            ControlError::InvalidTransition { state, command }
        })
    }

    async fn dispatch(
        &self,
        command: LoomCommand,
        next: LoomState,
        apply: impl FnOnce(&mut LoomInfo),
    ) -> ControlResult<LoomInfo> {
        let kind = command.kind();
        let response = self.api.send_command(&command).await.inspect_err(|err| {
            warn!(command = %kind, error = %err, "loom command failed");
        })?;
        if !response.status {
            warn!(command = %kind, "loom refused command");
            return Err(ControlError::CommandRejected { command: kind });
        }

        let mut guard = self.inner.lock().await;
        guard.info.state = next;
        match &command {
            LoomCommand::Start(start) => {
                guard.info.active_liftplan = Some(start.liftplan.clone());
                guard.info.index = start.start_position;
            }
            LoomCommand::Stop => {
                guard.info.active_liftplan = None;
                guard.info.index = 0;
                guard.info.liftplan_length = None;
            }
            LoomCommand::Pause | LoomCommand::Continue => {}
        }
        apply(&mut guard.info);

        if next.is_active() {
            self.ensure_polling(&mut guard);
        } else {
            cancel_polling(&mut guard);
        }
        let info = guard.info.clone();
        let _ = self.events.send(SessionEvent::StateChanged(info.clone()));
        drop(guard);

        info!(command = %kind, state = %info.state, liftplan = ?info.active_liftplan, "loom transition applied");
        Ok(info)
    }

    /// Starts the poller unless one is already running.
    fn ensure_polling(&self, guard: &mut SessionState) {
        if guard
            .poller
            .as_ref()
            .is_some_and(|poller| !poller.task.is_finished())
        {
            return;
        }
        guard.poll_generation += 1;
        #[cfg(test)]
        {
            guard.pollers_started += 1;
        }
        let generation = guard.poll_generation;
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.api),
            Arc::downgrade(&self.inner),
            self.events.clone(),
            self.poll_interval,
            generation,
        ));
        guard.poller = Some(Poller { generation, task });
        debug!(generation, "liftplan index polling started");
    }
}

impl Drop for LoomSession {
    fn drop(&mut self) {
        // The poller only holds a weak reference and exits on its next tick
        // when the lock is contended here.
        if let Ok(mut guard) = self.inner.try_lock() {
            cancel_polling(&mut guard);
        }
    }
}

fn cancel_polling(guard: &mut SessionState) {
    guard.poll_generation += 1;
    if let Some(poller) = guard.poller.take() {
        poller.task.abort();
        debug!(generation = poller.generation, "liftplan index polling stopped");
    }
}

async fn poll_loop(
    api: Arc<dyn LoomApi>,
    inner: Weak<Mutex<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
    period: Duration,
    generation: u64,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let result = api.liftplan_index().await;

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut guard = inner.lock().await;
        if guard.poll_generation != generation || !guard.info.state.is_active() {
            debug!(generation, "discarding liftplan index from cancelled poller");
            return;
        }
        match result {
            Ok(index) => {
                guard.info.index = index;
                let sample = ProgressSample {
                    liftplan: guard.info.active_liftplan.clone(),
                    index,
                    observed_at: Utc::now(),
                };
                debug!(index, "polled liftplan index");
                let _ = events.send(SessionEvent::Progress(sample));
            }
            Err(err) => {
                warn!(error = %err, "failed to poll liftplan index");
                let _ = events.send(SessionEvent::PollFailed(err.user_message()));
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
