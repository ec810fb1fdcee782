//! Display-side session manager.
//!
//! `SessionManager` is the single owner of the [`Registry`], the per-session
//! emulators and the view state. It is synchronous: host-bound messages go out
//! on an unbounded sender and host events are fed in through
//! [`SessionManager::handle_event`]. The runtime actor in [`crate::runtime`]
//! drives it from one task.
//!
//! Every public operation that changes visible state publishes exactly one
//! [`StateSnapshot`] to subscribers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use wraith_ipc::{HostEvent, HostRequest, IpcError, RequestId, SessionId};

use crate::emulator::{Emulator, EmulatorFactory};
use crate::error::{Result, SessionError};
use crate::registry::{Registry, DEFAULT_MAX_SESSIONS};
use crate::session::{Dimensions, LifecycleState, Session};
use crate::view::{plan_panes, GridLayout, ViewMode, Viewport};

/// Configuration for the session manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Maximum number of concurrent sessions, pending creates included.
    pub max_sessions: usize,

    /// Size new emulators start with, before the first fit.
    pub default_size: Dimensions,

    /// Initial grid shape.
    pub grid_layout: GridLayout,

    /// Initial viewport.
    pub viewport: Viewport,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            default_size: Dimensions::default(),
            grid_layout: GridLayout::default(),
            viewport: Viewport::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// `None` lets the host pick its default directory.
    pub working_directory: Option<PathBuf>,
}

/// Published after every visible state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    /// Increases by one per notification.
    pub revision: u64,
    /// Sessions in creation order.
    pub sessions: Vec<Session>,
    pub active: Option<SessionId>,
    pub view_mode: ViewMode,
    pub grid_layout: GridLayout,
    pub viewport: Viewport,
}

/// The resolution of a create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    pub request_id: RequestId,
    pub result: Result<SessionId>,
}

#[derive(Debug)]
struct PendingCreate {
    requested_at: Instant,
    working_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    /// Closed from the display; the host must be told.
    User,
    /// The host already knows (shell exited or link lost).
    Host,
}

pub struct SessionManager<F: EmulatorFactory> {
    config: ManagerConfig,
    factory: F,
    host: mpsc::UnboundedSender<HostRequest>,
    host_alive: bool,
    registry: Registry,
    emulators: HashMap<SessionId, F::Emulator>,
    pending: HashMap<RequestId, PendingCreate>,
    next_request_id: RequestId,
    /// Logical clock for `created_at`.
    clock: u64,
    /// Last creation sequence number handed out as a default name.
    sequence: u64,
    view_mode: ViewMode,
    grid_layout: GridLayout,
    viewport: Viewport,
    revision: u64,
    subscribers: Vec<mpsc::UnboundedSender<Arc<StateSnapshot>>>,
}

impl<F: EmulatorFactory> SessionManager<F> {
    pub fn new(config: ManagerConfig, factory: F, host: mpsc::UnboundedSender<HostRequest>) -> Self {
        Self {
            registry: Registry::new(config.max_sessions),
            grid_layout: config.grid_layout,
            viewport: config.viewport,
            view_mode: ViewMode::default(),
            config,
            factory,
            host,
            host_alive: true,
            emulators: HashMap::new(),
            pending: HashMap::new(),
            next_request_id: 1,
            clock: 0,
            sequence: 0,
            revision: 0,
            subscribers: Vec::new(),
        }
    }

    /// Ask the host for a new session.
    ///
    /// Nothing is added to the registry until the host answers; the answer
    /// comes back through [`SessionManager::handle_event`] as a
    /// [`CreateOutcome`] carrying the returned request id.
    pub fn begin_create(&mut self, options: CreateOptions) -> Result<RequestId> {
        if !self.host_alive {
            return Err(SessionError::HostUnavailable("host connection closed".into()));
        }
        if self.registry.len() + self.pending.len() >= self.config.max_sessions {
            return Err(SessionError::CapacityExceeded {
                max: self.config.max_sessions,
            });
        }

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.send(HostRequest::CreateSession {
            request_id,
            working_directory: options.working_directory.clone(),
        })
        .map_err(|e| SessionError::HostUnavailable(e.to_string()))?;

        self.pending.insert(
            request_id,
            PendingCreate {
                requested_at: Instant::now(),
                working_directory: options.working_directory,
            },
        );
        log::debug!("Create request {request_id} sent");
        Ok(request_id)
    }

    /// Apply one event from the host. Returns the outcome when the event
    /// resolved a pending create.
    pub fn handle_event(&mut self, event: HostEvent) -> Option<CreateOutcome> {
        match event {
            HostEvent::SessionCreated {
                request_id,
                id,
                working_directory,
                success,
                error,
            } => {
                let Some(pending) = self.pending.remove(&request_id) else {
                    if let (true, Some(id)) = (success, id) {
                        log::warn!("Session {id} created for unknown request {request_id}, destroying it");
                        if let Err(e) = self.send(HostRequest::DestroySession { id }) {
                            log::warn!("Failed to destroy orphan session {id}: {e}");
                        }
                    }
                    return None;
                };

                let result = match (success, id) {
                    (true, Some(id)) => {
                        let cwd = working_directory
                            .or(pending.working_directory)
                            .unwrap_or_default();
                        self.finish_create(id, cwd)
                    }
                    (true, None) => Err(SessionError::SpawnFailure(
                        "host reported success without a session id".into(),
                    )),
                    (false, _) => {
                        let detail = error.unwrap_or_else(|| "unknown error".into());
                        log::warn!("Create request {request_id} failed: {detail}");
                        Err(SessionError::SpawnFailure(detail))
                    }
                };
                Some(CreateOutcome { request_id, result })
            }
            HostEvent::SessionDestroyed { id, exit_code } => {
                if self.teardown(id, Teardown::Host) {
                    log::info!("Session {id} exited with {exit_code:?}");
                    self.refresh_layout(false);
                    self.notify();
                } else {
                    log::debug!("Exit for unknown session {id} ignored");
                }
                None
            }
            HostEvent::Output { id, data } => {
                let Some(emulator) = self.emulators.get_mut(&id) else {
                    log::debug!("Output for unknown session {id} dropped");
                    return None;
                };
                emulator.write(&data);
                let reply = emulator.take_input();
                if !reply.is_empty() {
                    if let Err(e) = self.send(HostRequest::Input { id, data: reply }) {
                        log::warn!("Failed to answer terminal query for session {id}: {e}");
                    }
                }
                None
            }
        }
    }

    /// Close a session from the display side. Closing an id that is not
    /// registered is a no-op and returns `false`.
    pub fn close_session(&mut self, id: SessionId) -> bool {
        if !self.teardown(id, Teardown::User) {
            return false;
        }
        self.refresh_layout(false);
        self.notify();
        true
    }

    pub fn set_active_session(&mut self, id: SessionId) -> Result<()> {
        self.registry.set_active(id)?;
        self.refresh_layout(false);
        self.notify();
        Ok(())
    }

    /// Rename a session. A blank name restores the default.
    pub fn rename_session(&mut self, id: SessionId, name: &str) -> Result<()> {
        let session = self
            .registry
            .get_mut(id)
            .ok_or(SessionError::NotFound(id))?;
        let name = name.trim();
        session.display_name = if name.is_empty() {
            session.default_name()
        } else {
            name.to_string()
        };
        self.notify();
        Ok(())
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
        self.refresh_layout(false);
        self.notify();
    }

    pub fn set_grid_layout(&mut self, layout: GridLayout) {
        self.grid_layout = layout;
        self.refresh_layout(false);
        self.notify();
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.refresh_layout(false);
        self.notify();
    }

    /// Fit every mounted emulator and resize the PTYs whose size changed.
    /// Returns the number of `Resize` messages sent.
    pub fn resize_visible(&mut self) -> usize {
        let sent = self.resize_mounted(false);
        self.notify();
        sent
    }

    /// Send one `Resize` per mounted session, changed or not.
    pub fn resize_all(&mut self) -> usize {
        let sent = self.resize_mounted(true);
        self.notify();
        sent
    }

    /// Forward keyboard input to a session's shell.
    pub fn send_input(&mut self, id: SessionId, data: Vec<u8>) -> Result<()> {
        if !self.registry.contains(id) {
            return Err(SessionError::NotFound(id));
        }
        if let Err(e) = self.send(HostRequest::Input { id, data }) {
            log::warn!("Input for session {id} could not be delivered: {e}");
            self.teardown(id, Teardown::Host);
            self.refresh_layout(false);
            self.notify();
            return Err(SessionError::HostUnavailable(e.to_string()));
        }
        Ok(())
    }

    /// The host link is gone: drop every session locally and return the
    /// pending create requests that will never be answered.
    pub fn host_lost(&mut self) -> Vec<RequestId> {
        log::warn!("Host connection lost, closing {} session(s)", self.registry.len());
        self.host_alive = false;
        for id in self.registry.ordered_ids() {
            self.teardown(id, Teardown::Host);
        }
        let failed: Vec<RequestId> = self.pending.drain().map(|(request_id, _)| request_id).collect();
        self.refresh_layout(false);
        self.notify();
        failed
    }

    /// Give up on create requests older than `timeout`.
    pub fn expire_pending(&mut self, now: Instant, timeout: Duration) -> Vec<RequestId> {
        let expired: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.requested_at) >= timeout)
            .map(|(&request_id, _)| request_id)
            .collect();
        for request_id in &expired {
            self.pending.remove(request_id);
            log::warn!("Create request {request_id} timed out");
        }
        expired
    }

    /// Receive a snapshot after every change, starting with the current one.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Arc<StateSnapshot>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Arc::new(self.snapshot()));
        self.subscribers.push(tx);
        rx
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            revision: self.revision,
            sessions: self
                .registry
                .list_ordered_by_creation()
                .into_iter()
                .cloned()
                .collect(),
            active: self.registry.active(),
            view_mode: self.view_mode,
            grid_layout: self.grid_layout,
            viewport: self.viewport,
        }
    }

    /// Plain-text dump of a session's screen.
    pub fn screen_text(&self, id: SessionId) -> Option<String> {
        self.emulators.get(&id).map(|e| e.screen_text())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn emulator(&self, id: SessionId) -> Option<&F::Emulator> {
        self.emulators.get(&id)
    }

    pub fn pending_creates(&self) -> usize {
        self.pending.len()
    }

    pub fn is_host_alive(&self) -> bool {
        self.host_alive
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn grid_layout(&self) -> GridLayout {
        self.grid_layout
    }

    fn finish_create(&mut self, id: SessionId, working_directory: PathBuf) -> Result<SessionId> {
        self.clock += 1;
        let sequence = self.sequence + 1;
        let session = Session::new(
            id,
            sequence,
            working_directory,
            self.clock,
            self.config.default_size,
        );
        if let Err(e) = self.registry.add(session) {
            log::warn!("Rejecting session {id} from host: {e}");
            if let Err(send_err) = self.send(HostRequest::DestroySession { id }) {
                log::warn!("Failed to destroy rejected session {id}: {send_err}");
            }
            return Err(e);
        }
        self.sequence = sequence;

        let emulator = self.factory.create(id, self.config.default_size);
        self.emulators.insert(id, emulator);
        if self.registry.active().is_none() {
            self.registry.set_active(id)?;
        }
        log::info!("Session {id} live");

        self.refresh_layout(false);
        self.notify();
        Ok(id)
    }

    /// Run the close path for one session. Returns `false` when it was not
    /// registered.
    fn teardown(&mut self, id: SessionId, reason: Teardown) -> bool {
        let Some(session) = self.registry.get_mut(id) else {
            return false;
        };
        session.lifecycle = LifecycleState::Closing;

        if let Some(mut emulator) = self.emulators.remove(&id) {
            emulator.dispose();
        }
        if let Err(e) = self.registry.remove(id) {
            log::warn!("Session {id} vanished during teardown: {e}");
        }

        if reason == Teardown::User {
            if let Err(e) = self.send(HostRequest::DestroySession { id }) {
                log::warn!("Failed to notify host about closing session {id}: {e}");
            }
        }
        log::debug!("Session {id} closed ({reason:?})");
        true
    }

    /// Mount visible emulators, detach hidden ones, move focus to the active
    /// one and resize what changed (or everything when `force`).
    fn refresh_layout(&mut self, force: bool) -> usize {
        let active = self.registry.active();
        let panes = plan_panes(
            &self.registry.ordered_ids(),
            active,
            self.view_mode,
            self.grid_layout,
            self.viewport,
        );

        for (id, emulator) in self.emulators.iter_mut() {
            match panes.iter().find(|p| p.id == *id) {
                Some(pane) => emulator.open(pane.container),
                None if emulator.is_mounted() => emulator.detach(),
                None => {}
            }
            if active == Some(*id) {
                emulator.focus();
            } else {
                emulator.blur();
            }
        }

        self.resize_mounted(force)
    }

    fn resize_mounted(&mut self, force: bool) -> usize {
        let mut sent = 0;
        for id in self.registry.ordered_ids() {
            let Some(emulator) = self.emulators.get_mut(&id) else {
                continue;
            };
            if !emulator.is_mounted() {
                continue;
            }
            let Some(dims) = emulator.fit() else {
                continue;
            };
            let Some(session) = self.registry.get_mut(id) else {
                continue;
            };
            if !force && session.dimensions == dims {
                continue;
            }
            session.dimensions = dims;

            let request = HostRequest::Resize {
                id,
                cols: dims.cols,
                rows: dims.rows,
            };
            match self.send(request) {
                Ok(()) => sent += 1,
                Err(e) => log::warn!("Failed to resize session {id}: {e}"),
            }
        }
        sent
    }

    fn send(&mut self, request: HostRequest) -> std::result::Result<(), IpcError> {
        if !self.host_alive {
            return Err(IpcError::Closed);
        }
        let result = wraith_ipc::channel::send(&self.host, request);
        if result.is_err() {
            self.host_alive = false;
        }
        result
    }

    fn notify(&mut self) {
        self.revision += 1;
        if self.subscribers.is_empty() {
            return;
        }
        let snapshot = Arc::new(self.snapshot());
        self.subscribers
            .retain(|tx| tx.send(Arc::clone(&snapshot)).is_ok());
    }
}
