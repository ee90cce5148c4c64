//! Read model for the control panel and the actions behind its buttons.

use std::sync::{Arc, Weak};

use shared::{
    domain::{LiftPlan, LiftplanName, LoomCommandKind, LoomInfo, LoomState, WifiInfo},
    error::ValidationError,
};
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    api::LoomApi,
    error::{ControlError, ControlResult},
    session::{LoomSession, SessionEvent},
    store::{match_listed, LiftplanStore},
};

const EVENT_CAPACITY: usize = 256;

/// Which loom buttons the panel shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandAvailability {
    pub start: bool,
    pub pause: bool,
    pub resume: bool,
    pub stop: bool,
}

impl CommandAvailability {
    pub fn for_state(state: LoomState) -> Self {
        let allowed = |command| state.transition(command).is_some();
        Self {
            start: allowed(LoomCommandKind::Start),
            pause: allowed(LoomCommandKind::Pause),
            resume: allowed(LoomCommandKind::Continue),
            stop: allowed(LoomCommandKind::Stop),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelView {
    pub liftplans: Vec<LiftplanName>,
    pub selected: Option<LiftplanName>,
    pub selected_plan: Option<LiftPlan>,
    pub loom: LoomInfo,
    /// Row the loom is executing, when it falls inside the selected plan.
    pub highlighted_row: Option<usize>,
    pub editing_enabled: bool,
    pub delete_visible: bool,
    pub commands: CommandAvailability,
    pub status_message: Option<String>,
}

impl PanelView {
    fn apply_loom(&mut self, info: &LoomInfo) {
        self.loom = info.clone();
        self.editing_enabled = !info.state.is_active();
        self.commands = CommandAvailability::for_state(info.state);
        self.highlighted_row = if info.state.is_active() {
            self.row_in_plan(info.index)
        } else {
            None
        };
    }

    fn row_in_plan(&self, index: u32) -> Option<usize> {
        let row = usize::try_from(index).ok()?;
        let len = self.selected_plan.as_ref()?.len();
        (row < len).then_some(row)
    }

    fn set_liftplans(&mut self, names: Vec<LiftplanName>) {
        self.delete_visible = !names.is_empty();
        self.liftplans = names;
    }
}

#[derive(Debug, Clone)]
pub enum PanelEvent {
    ViewUpdated(PanelView),
}

struct PanelState {
    view: PanelView,
    /// Latest selection request; replies for older requests are dropped.
    selection_seq: u64,
}

pub struct ControlPanelController {
    api: Arc<dyn LoomApi>,
    store: LiftplanStore,
    session: Arc<LoomSession>,
    state: Mutex<PanelState>,
    events: broadcast::Sender<PanelEvent>,
}

impl ControlPanelController {
    pub fn new(api: Arc<dyn LoomApi>, session: Arc<LoomSession>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            store: LiftplanStore::new(Arc::clone(&api)),
            api,
            session,
            state: Mutex::new(PanelState {
                view: PanelView {
                    editing_enabled: true,
                    commands: CommandAvailability::for_state(LoomState::Idle),
                    ..PanelView::default()
                },
                selection_seq: 0,
            }),
            events,
        })
    }

    pub fn store(&self) -> &LiftplanStore {
        &self.store
    }

    pub fn session(&self) -> &Arc<LoomSession> {
        &self.session
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PanelEvent> {
        self.events.subscribe()
    }

    pub async fn view(&self) -> PanelView {
        self.state.lock().await.view.clone()
    }

    /// Feeds session events into the read model until the session goes away.
    pub fn spawn_event_pump(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.session.subscribe_events();
        let controller: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "panel fell behind loom session events");
                        let Some(controller) = controller.upgrade() else {
                            return;
                        };
                        let info = controller.session.info().await;
                        SessionEvent::StateChanged(info)
                    }
                    Err(RecvError::Closed) => return,
                };
                let Some(controller) = controller.upgrade() else {
                    return;
                };
                controller.apply_session_event(event).await;
            }
        })
    }

    pub async fn apply_session_event(&self, event: SessionEvent) {
        let mut guard = self.state.lock().await;
        match event {
            SessionEvent::StateChanged(info) => guard.view.apply_loom(&info),
            // Samples queued before a stop arrive after it; they must not
            // bring the highlight back.
            SessionEvent::Progress(sample) if guard.view.loom.state.is_active() => {
                guard.view.loom.index = sample.index;
                guard.view.highlighted_row = guard.view.row_in_plan(sample.index);
            }
            SessionEvent::Progress(_) => return,
            SessionEvent::PollFailed(message) => guard.view.status_message = Some(message),
        }
        self.publish(&guard.view);
    }

    /// Loads loom status and the liftplan list, then selects the active
    /// liftplan (while the loom runs it) or the first listed one.
    pub async fn enter_dashboard(&self) -> ControlResult<PanelView> {
        let (info, names) = match futures::try_join!(self.session.refresh(), self.store.list()) {
            Ok(loaded) => loaded,
            Err(err) => return Err(self.report("load dashboard", err).await),
        };

        let active = info
            .active_liftplan
            .as_ref()
            .filter(|_| info.state.is_active())
            .and_then(|active| names.iter().find(|name| name.same_file(active)).cloned());
        let selection = active.or_else(|| names.first().cloned());

        let seq = {
            let mut guard = self.state.lock().await;
            guard.view.set_liftplans(names);
            guard.view.selected = selection.clone();
            guard.view.selected_plan = None;
            guard.view.apply_loom(&info);
            guard.view.status_message = None;
            guard.selection_seq += 1;
            self.publish(&guard.view);
            guard.selection_seq
        };
        debug!(selected = ?selection, state = %info.state, "dashboard loaded");

        if let Some(name) = selection {
            self.load_selection(name, seq).await?;
        }
        Ok(self.view().await)
    }

    /// Shows another liftplan. Only a read; refused while the loom is busy.
    pub async fn select(&self, name: &LiftplanName) -> ControlResult<()> {
        self.ensure_idle("change the selected liftplan").await?;
        let name = self.resolve(name, "select liftplan").await?;
        let seq = {
            let mut guard = self.state.lock().await;
            guard.selection_seq += 1;
            guard.view.selected = Some(name.clone());
            guard.selection_seq
        };
        self.load_selection(name, seq).await
    }

    /// Re-lists liftplans and keeps the selection if it still exists.
    pub async fn refresh_liftplans(&self) -> ControlResult<Vec<LiftplanName>> {
        let names = match self.store.list().await {
            Ok(names) => names,
            Err(err) => return Err(self.report("list liftplans", err).await),
        };
        let reselect = {
            let mut guard = self.state.lock().await;
            guard.view.set_liftplans(names.clone());
            let still_listed = guard
                .view
                .selected
                .as_ref()
                .is_some_and(|selected| names.contains(selected));
            let reselect = if still_listed {
                None
            } else {
                guard.view.selected = names.first().cloned();
                guard.view.selected_plan = None;
                guard.view.highlighted_row = None;
                guard.selection_seq += 1;
                Some((guard.view.selected.clone(), guard.selection_seq))
            };
            self.publish(&guard.view);
            reselect
        };
        if let Some((Some(name), seq)) = reselect {
            self.load_selection(name, seq).await?;
        }
        Ok(names)
    }

    /// An empty plan for the editor.
    pub async fn new_plan(&self) -> ControlResult<LiftPlan> {
        self.ensure_idle("create a liftplan").await?;
        Ok(LiftPlan::blank())
    }

    pub async fn save(&self, name: &str, plan: &LiftPlan) -> ControlResult<LiftplanName> {
        self.ensure_idle("save a liftplan").await?;
        let saved = match self.store.save(name, plan).await {
            Ok(saved) => saved,
            Err(err) => return Err(self.report("save liftplan", err).await),
        };
        info!(liftplan = %saved, rows = plan.len(), "liftplan saved");
        self.set_status(format!("Saved {}", saved.display_name()))
            .await;
        // A failed re-list is already on the status line; the save itself went through.
        let _ = self.refresh_liftplans().await;
        Ok(saved)
    }

    pub async fn delete(&self, name: &LiftplanName) -> ControlResult<()> {
        self.ensure_idle("delete a liftplan").await?;
        let name = self.resolve(name, "delete liftplan").await?;
        if let Err(err) = self.store.delete(&name).await {
            return Err(self.report("delete liftplan", err).await);
        }
        info!(liftplan = %name, "liftplan deleted");
        self.set_status(format!("Deleted {}", name.display_name()))
            .await;
        // The delete went through; a failed re-list is already on the status line.
        let _ = self.refresh_liftplans().await;
        Ok(())
    }

    /// Starts the selected liftplan at `start_position`.
    pub async fn start(&self, start_position: u32) -> ControlResult<LoomInfo> {
        let selected = {
            let guard = self.state.lock().await;
            guard
                .view
                .selected
                .clone()
                .zip(guard.view.selected_plan.clone())
        };
        let Some((name, plan)) = selected else {
            return Err(self
                .report("start loom", ValidationError::NoSelection.into())
                .await);
        };
        let result = self.session.start(&name, &plan, start_position).await;
        self.after_command("start loom", result).await
    }

    pub async fn pause(&self) -> ControlResult<LoomInfo> {
        let result = self.session.pause().await;
        self.after_command("pause loom", result).await
    }

    pub async fn resume(&self) -> ControlResult<LoomInfo> {
        let result = self.session.resume().await;
        self.after_command("continue loom", result).await
    }

    /// Stops the loom and reloads the selected liftplan without highlight.
    pub async fn stop(&self) -> ControlResult<LoomInfo> {
        let result = self.session.stop().await;
        let info = self.after_command("stop loom", result).await?;
        let reload = {
            let mut guard = self.state.lock().await;
            guard.selection_seq += 1;
            guard
                .view
                .selected
                .clone()
                .map(|name| (name, guard.selection_seq))
        };
        if let Some((name, seq)) = reload {
            // The loom is already idle; a failed reload only lands on the status line.
            let _ = self.load_selection(name, seq).await;
        }
        Ok(info)
    }

    pub async fn load_wifi(&self) -> ControlResult<WifiInfo> {
        match self.api.get_wifi().await {
            Ok(info) => Ok(info),
            Err(err) => Err(self.report("read network settings", err).await),
        }
    }

    /// The loom restarts its network stack after accepting new settings.
    pub async fn save_wifi(&self, wifi: &WifiInfo) -> ControlResult<()> {
        self.ensure_idle("change network settings").await?;
        if let Err(err) = wifi.validate() {
            return Err(self.report("save network settings", err.into()).await);
        }
        if let Err(err) = self.api.set_wifi(wifi).await {
            return Err(self.report("save network settings", err).await);
        }
        info!(hostname = %wifi.hostname, ssid = %wifi.ssid, "network settings saved");
        self.set_status("Restarting...".to_string()).await;
        Ok(())
    }

    async fn after_command(
        &self,
        action: &'static str,
        result: ControlResult<LoomInfo>,
    ) -> ControlResult<LoomInfo> {
        match result {
            Ok(info) => {
                let mut guard = self.state.lock().await;
                guard.view.apply_loom(&info);
                guard.view.status_message = None;
                self.publish(&guard.view);
                Ok(info)
            }
            Err(err) => Err(self.report(action, err).await),
        }
    }

    /// Listed spelling of `name`, checked against the cached list before
    /// asking the loom.
    async fn resolve(&self, name: &LiftplanName, action: &str) -> ControlResult<LiftplanName> {
        let cached = {
            let guard = self.state.lock().await;
            match_listed(&guard.view.liftplans, name).cloned()
        };
        if let Some(found) = cached {
            return Ok(found);
        }
        match self.store.resolve(name).await {
            Ok(found) => Ok(found),
            Err(err) => Err(self.report(action, err).await),
        }
    }

    async fn load_selection(&self, name: LiftplanName, seq: u64) -> ControlResult<()> {
        let result = self.store.get(&name).await;
        let mut guard = self.state.lock().await;
        if guard.selection_seq != seq {
            debug!(liftplan = %name, "discarding reply for superseded selection");
            return Ok(());
        }
        match result {
            Ok(plan) => {
                guard.view.selected_plan = Some(plan);
                guard.view.highlighted_row = if guard.view.loom.state.is_active() {
                    guard.view.row_in_plan(guard.view.loom.index)
                } else {
                    None
                };
                self.publish(&guard.view);
                Ok(())
            }
            Err(err) => {
                guard.view.selected_plan = None;
                guard.view.highlighted_row = None;
                drop(guard);
                Err(self.report("load liftplan", err).await)
            }
        }
    }

    async fn ensure_idle(&self, action: &'static str) -> ControlResult<()> {
        let state = self.session.state().await;
        if state.is_active() {
            let err = ControlError::LoomBusy { state, action };
            return Err(self.report(action, err).await);
        }
        Ok(())
    }

    /// Logs `err`, puts it on the status line and hands it back.
    async fn report(&self, action: &str, err: ControlError) -> ControlError {
        if err.is_local() {
            debug!(action, error = %err, "refused panel action");
        } else {
            warn!(action, error = %err, "panel action failed");
        }
        self.set_status(err.user_message()).await;
        err
    }

    async fn set_status(&self, message: String) {
        let mut guard = self.state.lock().await;
        guard.view.status_message = Some(message);
        self.publish(&guard.view);
    }

    fn publish(&self, view: &PanelView) {
        let _ = self.events.send(PanelEvent::ViewUpdated(view.clone()));
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
