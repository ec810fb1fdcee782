//! Display runtime: the task that owns the [`SessionManager`].
//!
//! UI callers talk to it through a cloneable [`ManagerHandle`]. The task
//! selects over UI commands, host events and a periodic tick that expires
//! unanswered create requests, so every manager operation runs on one logical
//! thread.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use wraith_ipc::{HostEvent, RequestId, SessionId};

use crate::emulator::EmulatorFactory;
use crate::error::{Result, SessionError};
use crate::manager::{CreateOptions, SessionManager, StateSnapshot};
use crate::view::{GridLayout, ViewMode, Viewport};

/// How often pending creates are checked for expiry.
const EXPIRY_TICK: Duration = Duration::from_millis(100);

enum Command {
    Create {
        options: CreateOptions,
        reply: oneshot::Sender<Result<SessionId>>,
    },
    Close {
        id: SessionId,
        reply: oneshot::Sender<bool>,
    },
    SetActive {
        id: SessionId,
        reply: oneshot::Sender<Result<()>>,
    },
    Rename {
        id: SessionId,
        name: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SetViewMode {
        mode: ViewMode,
        reply: oneshot::Sender<()>,
    },
    SetGridLayout {
        layout: GridLayout,
        reply: oneshot::Sender<()>,
    },
    SetViewport {
        viewport: Viewport,
        reply: oneshot::Sender<()>,
    },
    ResizeVisible {
        reply: oneshot::Sender<usize>,
    },
    ResizeAll {
        reply: oneshot::Sender<usize>,
    },
    SendInput {
        id: SessionId,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        reply: oneshot::Sender<mpsc::UnboundedReceiver<Arc<StateSnapshot>>>,
    },
    Snapshot {
        reply: oneshot::Sender<StateSnapshot>,
    },
    ScreenText {
        id: SessionId,
        reply: oneshot::Sender<Option<String>>,
    },
}

/// Async front for the display runtime.
#[derive(Clone)]
pub struct ManagerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ManagerHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| SessionError::ManagerStopped)?;
        rx.await.map_err(|_| SessionError::ManagerStopped)
    }

    /// Create a session and wait for the host's answer.
    pub async fn create_session(&self, options: CreateOptions) -> Result<SessionId> {
        self.call(|reply| Command::Create { options, reply }).await?
    }

    /// Close a session. `Ok(false)` when it was not open.
    pub async fn close_session(&self, id: SessionId) -> Result<bool> {
        self.call(|reply| Command::Close { id, reply }).await
    }

    pub async fn set_active_session(&self, id: SessionId) -> Result<()> {
        self.call(|reply| Command::SetActive { id, reply }).await?
    }

    pub async fn rename_session(&self, id: SessionId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.call(|reply| Command::Rename { id, name, reply }).await?
    }

    pub async fn set_view_mode(&self, mode: ViewMode) -> Result<()> {
        self.call(|reply| Command::SetViewMode { mode, reply }).await
    }

    pub async fn set_grid_layout(&self, layout: GridLayout) -> Result<()> {
        self.call(|reply| Command::SetGridLayout { layout, reply }).await
    }

    pub async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.call(|reply| Command::SetViewport { viewport, reply }).await
    }

    pub async fn resize_visible(&self) -> Result<usize> {
        self.call(|reply| Command::ResizeVisible { reply }).await
    }

    pub async fn resize_all(&self) -> Result<usize> {
        self.call(|reply| Command::ResizeAll { reply }).await
    }

    pub async fn send_input(&self, id: SessionId, data: impl Into<Vec<u8>>) -> Result<()> {
        let data = data.into();
        self.call(|reply| Command::SendInput { id, data, reply }).await?
    }

    /// Receive a snapshot after every state change, starting with the
    /// current state.
    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Arc<StateSnapshot>>> {
        self.call(|reply| Command::Subscribe { reply }).await
    }

    pub async fn snapshot(&self) -> Result<StateSnapshot> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    pub async fn screen_text(&self, id: SessionId) -> Result<Option<String>> {
        self.call(|reply| Command::ScreenText { id, reply }).await
    }
}

/// Start the display runtime on the current tokio runtime.
///
/// The task stops once every [`ManagerHandle`] is dropped. Dropping the
/// manager closes the request channel, which makes the host kill its shells.
pub fn spawn_display<F>(
    manager: SessionManager<F>,
    events: mpsc::UnboundedReceiver<HostEvent>,
    create_timeout: Duration,
) -> ManagerHandle
where
    F: EmulatorFactory + Send + 'static,
    F::Emulator: Send,
{
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_display(manager, rx, events, create_timeout));
    ManagerHandle { tx }
}

type Waiting = HashMap<RequestId, oneshot::Sender<Result<SessionId>>>;

async fn run_display<F: EmulatorFactory>(
    mut manager: SessionManager<F>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: mpsc::UnboundedReceiver<HostEvent>,
    create_timeout: Duration,
) {
    let mut waiting = Waiting::new();
    let mut host_open = true;
    let mut tick = tokio::time::interval(EXPIRY_TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => dispatch(&mut manager, &mut waiting, command),
                None => break,
            },
            event = events.recv(), if host_open => match event {
                Some(event) => {
                    if let Some(outcome) = manager.handle_event(event) {
                        if let Some(reply) = waiting.remove(&outcome.request_id) {
                            let _ = reply.send(outcome.result);
                        }
                    }
                }
                None => {
                    host_open = false;
                    for request_id in manager.host_lost() {
                        fail(&mut waiting, request_id, "host connection closed");
                    }
                }
            },
            _ = tick.tick() => {
                for request_id in manager.expire_pending(Instant::now(), create_timeout) {
                    fail(&mut waiting, request_id, "create request timed out");
                }
            }
        }
    }

    log::debug!("Display runtime stopped");
}

fn fail(waiting: &mut Waiting, request_id: RequestId, reason: &str) {
    if let Some(reply) = waiting.remove(&request_id) {
        let _ = reply.send(Err(SessionError::HostUnavailable(reason.to_string())));
    }
}

fn dispatch<F: EmulatorFactory>(manager: &mut SessionManager<F>, waiting: &mut Waiting, command: Command) {
    // A dropped reply receiver only means the caller stopped waiting.
    match command {
        Command::Create { options, reply } => match manager.begin_create(options) {
            Ok(request_id) => {
                waiting.insert(request_id, reply);
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        },
        Command::Close { id, reply } => {
            let _ = reply.send(manager.close_session(id));
        }
        Command::SetActive { id, reply } => {
            let _ = reply.send(manager.set_active_session(id));
        }
        Command::Rename { id, name, reply } => {
            let _ = reply.send(manager.rename_session(id, &name));
        }
        Command::SetViewMode { mode, reply } => {
            manager.set_view_mode(mode);
            let _ = reply.send(());
        }
        Command::SetGridLayout { layout, reply } => {
            manager.set_grid_layout(layout);
            let _ = reply.send(());
        }
        Command::SetViewport { viewport, reply } => {
            manager.set_viewport(viewport);
            let _ = reply.send(());
        }
        Command::ResizeVisible { reply } => {
            let _ = reply.send(manager.resize_visible());
        }
        Command::ResizeAll { reply } => {
            let _ = reply.send(manager.resize_all());
        }
        Command::SendInput { id, data, reply } => {
            let _ = reply.send(manager.send_input(id, data));
        }
        Command::Subscribe { reply } => {
            let _ = reply.send(manager.subscribe());
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(manager.snapshot());
        }
        Command::ScreenText { id, reply } => {
            let _ = reply.send(manager.screen_text(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::{CellMetrics, VtEmulatorFactory};
    use crate::manager::ManagerConfig;
    use std::path::PathBuf;
    use wraith_ipc::{pair, HostEnd, HostRequest};

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn start() -> (ManagerHandle, HostEnd) {
        let (display, host) = pair();
        let manager = SessionManager::new(
            ManagerConfig::default(),
            VtEmulatorFactory::new(CellMetrics::default()),
            display.requests,
        );
        (spawn_display(manager, display.events, TIMEOUT), host)
    }

    /// A host that accepts every create and records the other requests.
    fn spawn_fake_host(mut host: HostEnd) -> mpsc::UnboundedReceiver<HostRequest> {
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut next_id = 1;
            while let Some(request) = host.requests.recv().await {
                if let HostRequest::CreateSession { request_id, .. } = &request {
                    let _ = host
                        .events
                        .send(HostEvent::created(*request_id, next_id, PathBuf::from("/srv")));
                    next_id += 1;
                } else {
                    let _ = seen_tx.send(request);
                }
            }
        });
        seen_rx
    }

    #[tokio::test]
    async fn test_create_resolves_with_host_id() {
        let (handle, host) = start();
        let _seen = spawn_fake_host(host);

        let first = handle.create_session(CreateOptions::default()).await.unwrap();
        let second = handle.create_session(CreateOptions::default()).await.unwrap();

        assert_eq!((first, second), (1, 2));
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.active, Some(1));
        assert_eq!(snapshot.sessions.len(), 2);
        assert_eq!(snapshot.sessions[0].working_directory, PathBuf::from("/srv"));
    }

    #[tokio::test]
    async fn test_create_failure_is_reported() {
        let (handle, mut host) = start();
        tokio::spawn(async move {
            while let Some(HostRequest::CreateSession { request_id, .. }) = host.requests.recv().await {
                let _ = host
                    .events
                    .send(HostEvent::create_failed(request_id, "shell not found"));
            }
        });

        let err = handle.create_session(CreateOptions::default()).await.unwrap_err();
        assert_eq!(err, SessionError::SpawnFailure("shell not found".into()));
        assert!(handle.snapshot().await.unwrap().sessions.is_empty());
    }

    #[tokio::test]
    async fn test_input_and_close_reach_the_host() {
        let (handle, host) = start();
        let mut seen = spawn_fake_host(host);
        let id = handle.create_session(CreateOptions::default()).await.unwrap();

        handle.send_input(id, b"ls\r".to_vec()).await.unwrap();
        assert!(handle.close_session(id).await.unwrap());
        assert!(!handle.close_session(id).await.unwrap());

        let mut requests = Vec::new();
        while requests.len() < 2 {
            match seen.recv().await.unwrap() {
                HostRequest::Resize { .. } => {}
                other => requests.push(other),
            }
        }
        assert_eq!(
            requests,
            vec![
                HostRequest::Input {
                    id,
                    data: b"ls\r".to_vec()
                },
                HostRequest::DestroySession { id },
            ]
        );
    }

    #[tokio::test]
    async fn test_host_exit_updates_subscribers() {
        let (handle, mut host) = start();
        let mut updates = handle.subscribe().await.unwrap();
        assert!(updates.recv().await.unwrap().sessions.is_empty());

        let create = tokio::spawn({
            let handle = handle.clone();
            async move { handle.create_session(CreateOptions::default()).await }
        });
        let Some(HostRequest::CreateSession { request_id, .. }) = host.requests.recv().await else {
            panic!("expected a create request");
        };
        host.events
            .send(HostEvent::created(request_id, 4, PathBuf::from("/")))
            .unwrap();
        assert_eq!(create.await.unwrap(), Ok(4));
        assert_eq!(updates.recv().await.unwrap().active, Some(4));

        host.events
            .send(HostEvent::SessionDestroyed {
                id: 4,
                exit_code: Some(0),
            })
            .unwrap();
        let after = updates.recv().await.unwrap();
        assert!(after.sessions.is_empty());
        assert_eq!(after.active, None);
    }

    #[tokio::test]
    async fn test_host_loss_fails_pending_create() {
        let (handle, mut host) = start();

        let create = tokio::spawn({
            let handle = handle.clone();
            async move { handle.create_session(CreateOptions::default()).await }
        });
        assert!(matches!(
            host.requests.recv().await,
            Some(HostRequest::CreateSession { .. })
        ));
        drop(host);

        assert!(matches!(
            create.await.unwrap(),
            Err(SessionError::HostUnavailable(_))
        ));
        assert!(matches!(
            handle.create_session(CreateOptions::default()).await,
            Err(SessionError::HostUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_create_times_out() {
        let (handle, _host) = start();

        let err = handle.create_session(CreateOptions::default()).await.unwrap_err();

        assert_eq!(
            err,
            SessionError::HostUnavailable("create request timed out".into())
        );
    }

    #[tokio::test]
    async fn test_stopped_runtime_reports_manager_stopped() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = ManagerHandle { tx };

        assert_eq!(
            handle.snapshot().await.unwrap_err(),
            SessionError::ManagerStopped
        );
    }
}
