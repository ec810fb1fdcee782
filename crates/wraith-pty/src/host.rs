use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::mpsc;
use wraith_ipc::{HostEvent, HostRequest, IpcError, RequestId, SessionId};

use crate::io_thread::{start_io_thread, PtyNotice};
use crate::pty::{PtyControl, PtyError, PtySpawner, SpawnRequest};
use crate::shell::default_shell;

/// Configuration for the PTY host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Host-side cap on live sessions. The display side enforces its own
    /// bound before asking; this one protects the host from a misbehaving peer.
    pub max_sessions: usize,
    /// Explicit shell binary; `None` applies the platform policy.
    pub shell: Option<String>,
    /// PTY size used until the display reports a fitted size.
    pub default_cols: u16,
    pub default_rows: u16,
    /// Directory used when a create request names none.
    pub default_directory: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_sessions: 9,
            shell: None,
            default_cols: 80,
            default_rows: 24,
            default_directory: None,
        }
    }
}

/// Per-session lifecycle on the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PtyLifecycle {
    Requested,
    Spawning,
    Running,
    Exited(Option<u32>),
    Killed,
}

struct HostSession {
    control: Box<dyn PtyControl>,
    state: PtyLifecycle,
}

/// The privileged-side controller: one PTY + shell per session id.
///
/// The host loop is the only code that touches the process table. I/O
/// threads report back through [`PtyNotice`]s and the display side talks to
/// it only through [`HostRequest`]s.
pub struct PtyHost<S: PtySpawner> {
    spawner: S,
    config: HostConfig,
    shell: String,
    sessions: HashMap<SessionId, HostSession>,
    next_id: SessionId,
    events: mpsc::UnboundedSender<HostEvent>,
    notices_tx: mpsc::UnboundedSender<PtyNotice>,
    notices_rx: mpsc::UnboundedReceiver<PtyNotice>,
}

impl<S: PtySpawner> PtyHost<S> {
    /// Create a host that reports to `events`.
    pub fn new(spawner: S, config: HostConfig, events: mpsc::UnboundedSender<HostEvent>) -> Self {
        let shell = default_shell(config.shell.as_deref());
        log::info!("PTY host using shell {shell}");
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        Self {
            spawner,
            config,
            shell,
            sessions: HashMap::new(),
            next_id: 1,
            events,
            notices_tx,
            notices_rx,
        }
    }

    /// Run the host loop until the display side goes away.
    ///
    /// Every remaining child is killed on the way out.
    pub async fn run(mut self, mut requests: mpsc::UnboundedReceiver<HostRequest>) {
        loop {
            let outcome = tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
                Some(notice) = self.notices_rx.recv() => self.handle_notice(notice),
            };
            if outcome.is_err() {
                log::info!("Display side disconnected; stopping PTY host");
                break;
            }
        }
        self.shutdown();
    }

    fn handle_request(&mut self, request: HostRequest) -> Result<(), IpcError> {
        match request {
            HostRequest::CreateSession {
                request_id,
                working_directory,
            } => self.create_session(request_id, working_directory),
            HostRequest::DestroySession { id } => {
                self.destroy_session(id);
                Ok(())
            }
            HostRequest::Input { id, data } => {
                self.write_input(id, &data);
                Ok(())
            }
            HostRequest::Resize { id, cols, rows } => {
                self.resize(id, cols, rows);
                Ok(())
            }
        }
    }

    fn handle_notice(&mut self, notice: PtyNotice) -> Result<(), IpcError> {
        match notice {
            PtyNotice::Output { id, data } => {
                // Killed sessions are already out of the table, so late
                // output for them is dropped here.
                match self.sessions.get(&id) {
                    Some(session) if session.state == PtyLifecycle::Running => {
                        self.emit(HostEvent::Output { id, data })
                    }
                    _ => Ok(()),
                }
            }
            PtyNotice::Exited { id, exit_code } => {
                let Some(mut session) = self.sessions.remove(&id) else {
                    return Ok(());
                };
                transition(id, &mut session.state, PtyLifecycle::Exited(exit_code));
                self.emit(HostEvent::SessionDestroyed { id, exit_code })
            }
        }
    }

    fn create_session(
        &mut self,
        request_id: RequestId,
        working_directory: Option<PathBuf>,
    ) -> Result<(), IpcError> {
        let mut state = PtyLifecycle::Requested;

        if self.sessions.len() >= self.config.max_sessions {
            log::warn!(
                "Rejecting create request {request_id}: host limit of {} sessions reached",
                self.config.max_sessions
            );
            return self.emit(HostEvent::create_failed(
                request_id,
                format!("host session limit reached (max: {})", self.config.max_sessions),
            ));
        }

        let cwd = match self.resolve_directory(working_directory) {
            Ok(cwd) => cwd,
            Err(e) => return self.emit(HostEvent::create_failed(request_id, e.to_string())),
        };

        let id = self.next_id;
        transition(id, &mut state, PtyLifecycle::Spawning);
        let request = SpawnRequest {
            shell: self.shell.clone(),
            cwd: cwd.clone(),
            cols: self.config.default_cols,
            rows: self.config.default_rows,
        };

        let spawned = match self.spawner.spawn(&request) {
            Ok(spawned) => spawned,
            Err(e) => {
                log::warn!("Create request {request_id} failed: {e}");
                return self.emit(HostEvent::create_failed(request_id, e.to_string()));
            }
        };

        let mut control = spawned.control;
        if let Err(e) = start_io_thread(id, spawned.reader, spawned.waiter, self.notices_tx.clone()) {
            let _ = control.kill();
            log::warn!("Create request {request_id} failed: {e}");
            return self.emit(HostEvent::create_failed(request_id, e.to_string()));
        }

        // Ids are only consumed by successful spawns and never reused.
        self.next_id += 1;
        transition(id, &mut state, PtyLifecycle::Running);
        self.sessions.insert(id, HostSession { control, state });
        log::info!("Session {id} running {} in {}", self.shell, cwd.display());

        self.emit(HostEvent::created(request_id, id, cwd))
    }

    fn destroy_session(&mut self, id: SessionId) {
        let Some(mut session) = self.sessions.remove(&id) else {
            log::debug!("Destroy for unknown session {id} ignored");
            return;
        };
        if let Err(e) = session.control.kill() {
            log::warn!("Session {id}: {e}");
        }
        transition(id, &mut session.state, PtyLifecycle::Killed);
    }

    fn write_input(&mut self, id: SessionId, data: &[u8]) {
        let Some(session) = self.sessions.get_mut(&id) else {
            log::debug!("Input for unknown session {id} dropped");
            return;
        };
        if let Err(e) = session.control.write(data) {
            log::warn!("Session {id}: input write failed: {e}");
        }
    }

    fn resize(&mut self, id: SessionId, cols: u16, rows: u16) {
        if cols == 0 || rows == 0 {
            log::debug!("Session {id}: ignoring empty resize {cols}x{rows}");
            return;
        }
        // A resize racing with a close is expected.
        let Some(session) = self.sessions.get_mut(&id) else {
            log::debug!("Resize for unknown session {id} ignored");
            return;
        };
        if let Err(e) = session.control.resize(cols, rows) {
            log::warn!("Session {id}: {e}");
        }
    }

    fn resolve_directory(&self, requested: Option<PathBuf>) -> Result<PathBuf, PtyError> {
        let dir = requested
            .or_else(|| self.config.default_directory.clone())
            .or_else(home_dir)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));
        if !dir.is_absolute() || !dir.is_dir() {
            return Err(PtyError::InvalidWorkingDirectory(dir));
        }
        Ok(dir)
    }

    fn emit(&self, event: HostEvent) -> Result<(), IpcError> {
        self.events.send(event).map_err(|_| IpcError::Closed)
    }

    fn shutdown(&mut self) {
        for (id, mut session) in self.sessions.drain() {
            if let Err(e) = session.control.kill() {
                log::debug!("Session {id}: {e}");
            }
            transition(id, &mut session.state, PtyLifecycle::Killed);
        }
    }
}

fn transition(id: SessionId, state: &mut PtyLifecycle, next: PtyLifecycle) {
    log::debug!("Session {id}: {state:?} -> {next:?}");
    *state = next;
}

/// Get the user's home directory.
fn home_dir() -> Option<PathBuf> {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    std::env::var_os(var).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pty::{ExitWaiter, SpawnedPty};
    use std::io::Read;
    use std::sync::{mpsc as std_mpsc, Arc, Mutex};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Records what the host did to a fake PTY.
    #[derive(Default)]
    struct FakeLog {
        spawned: Vec<SpawnRequest>,
        writes: Vec<(usize, Vec<u8>)>,
        resizes: Vec<(usize, u16, u16)>,
        kills: Vec<usize>,
    }

    /// Handles the test keeps to drive a fake session's output.
    struct FakeOutput {
        tx: Option<std_mpsc::Sender<Vec<u8>>>,
    }

    struct FakeSpawner {
        log: Arc<Mutex<FakeLog>>,
        outputs: Arc<Mutex<Vec<FakeOutput>>>,
        fail_with: Option<String>,
    }

    impl FakeSpawner {
        fn new() -> Self {
            Self {
                log: Arc::default(),
                outputs: Arc::default(),
                fail_with: None,
            }
        }
    }

    struct ChannelReader {
        rx: std_mpsc::Receiver<Vec<u8>>,
        pending: Vec<u8>,
    }

    impl Read for ChannelReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pending.is_empty() {
                match self.rx.recv() {
                    Ok(data) => self.pending = data,
                    Err(_) => return Ok(0),
                }
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    struct FakeControl {
        index: usize,
        log: Arc<Mutex<FakeLog>>,
    }

    impl PtyControl for FakeControl {
        fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
            self.log.lock().unwrap().writes.push((self.index, data.to_vec()));
            Ok(())
        }

        fn resize(&mut self, cols: u16, rows: u16) -> Result<(), PtyError> {
            self.log.lock().unwrap().resizes.push((self.index, cols, rows));
            Ok(())
        }

        fn kill(&mut self) -> Result<(), PtyError> {
            self.log.lock().unwrap().kills.push(self.index);
            Ok(())
        }
    }

    struct FakeWaiter;

    impl ExitWaiter for FakeWaiter {
        fn wait(self: Box<Self>) -> Option<u32> {
            Some(0)
        }
    }

    impl PtySpawner for FakeSpawner {
        fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedPty, PtyError> {
            if let Some(msg) = &self.fail_with {
                return Err(PtyError::SpawnFailed(msg.clone()));
            }
            let mut log = self.log.lock().unwrap();
            let index = log.spawned.len();
            log.spawned.push(request.clone());

            let (tx, rx) = std_mpsc::channel();
            self.outputs.lock().unwrap().push(FakeOutput { tx: Some(tx) });

            Ok(SpawnedPty {
                control: Box::new(FakeControl {
                    index,
                    log: Arc::clone(&self.log),
                }),
                reader: Box::new(ChannelReader {
                    rx,
                    pending: Vec::new(),
                }),
                waiter: Box::new(FakeWaiter),
            })
        }
    }

    struct Harness {
        requests: mpsc::UnboundedSender<HostRequest>,
        events: mpsc::UnboundedReceiver<HostEvent>,
        log: Arc<Mutex<FakeLog>>,
        outputs: Arc<Mutex<Vec<FakeOutput>>>,
    }

    impl Harness {
        fn start(spawner: FakeSpawner, config: HostConfig) -> Self {
            let log = Arc::clone(&spawner.log);
            let outputs = Arc::clone(&spawner.outputs);
            let (req_tx, req_rx) = mpsc::unbounded_channel();
            let (evt_tx, evt_rx) = mpsc::unbounded_channel();
            let host = PtyHost::new(spawner, config, evt_tx);
            tokio::spawn(host.run(req_rx));
            Self {
                requests: req_tx,
                events: evt_rx,
                log,
                outputs,
            }
        }

        fn send(&self, request: HostRequest) {
            self.requests.send(request).unwrap();
        }

        async fn next(&mut self) -> HostEvent {
            timeout(Duration::from_secs(2), self.events.recv())
                .await
                .expect("timed out waiting for host event")
                .expect("host event channel closed")
        }

        async fn assert_quiet(&mut self) {
            assert!(
                timeout(Duration::from_millis(200), self.events.recv()).await.is_err(),
                "expected no further host events"
            );
        }

        async fn create(&mut self, request_id: RequestId) -> SessionId {
            self.send(HostRequest::CreateSession {
                request_id,
                working_directory: Some(std::env::temp_dir()),
            });
            match self.next().await {
                HostEvent::SessionCreated {
                    request_id: got,
                    id: Some(id),
                    success: true,
                    ..
                } if got == request_id => id,
                other => panic!("unexpected reply: {other:?}"),
            }
        }

        fn emit_output(&self, index: usize, data: &[u8]) {
            let outputs = self.outputs.lock().unwrap();
            outputs[index].tx.as_ref().unwrap().send(data.to_vec()).unwrap();
        }

        fn end_output(&self, index: usize) {
            self.outputs.lock().unwrap()[index].tx = None;
        }
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let mut h = Harness::start(FakeSpawner::new(), HostConfig::default());

        let a = h.create(1).await;
        let b = h.create(2).await;

        assert_eq!((a, b), (1, 2));
        let log = h.log.lock().unwrap();
        assert_eq!(log.spawned.len(), 2);
        assert_eq!((log.spawned[0].cols, log.spawned[0].rows), (80, 24));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported_in_reply() {
        let mut spawner = FakeSpawner::new();
        spawner.fail_with = Some("no such shell".to_string());
        let mut h = Harness::start(spawner, HostConfig::default());

        h.send(HostRequest::CreateSession {
            request_id: 5,
            working_directory: Some(std::env::temp_dir()),
        });

        match h.next().await {
            HostEvent::SessionCreated {
                request_id,
                id,
                success,
                error,
                ..
            } => {
                assert_eq!(request_id, 5);
                assert_eq!(id, None);
                assert!(!success);
                assert!(error.unwrap().contains("no such shell"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_directory_fails_create() {
        let mut h = Harness::start(FakeSpawner::new(), HostConfig::default());

        h.send(HostRequest::CreateSession {
            request_id: 1,
            working_directory: Some(PathBuf::from("relative/dir")),
        });

        assert!(matches!(
            h.next().await,
            HostEvent::SessionCreated { success: false, .. }
        ));
        assert!(h.log.lock().unwrap().spawned.is_empty());
    }

    #[tokio::test]
    async fn test_host_cap_rejects_extra_sessions() {
        let config = HostConfig {
            max_sessions: 1,
            ..HostConfig::default()
        };
        let mut h = Harness::start(FakeSpawner::new(), config);

        h.create(1).await;
        h.send(HostRequest::CreateSession {
            request_id: 2,
            working_directory: None,
        });

        match h.next().await {
            HostEvent::SessionCreated { success, error, .. } => {
                assert!(!success);
                assert!(error.unwrap().contains("limit"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert_eq!(h.log.lock().unwrap().spawned.len(), 1);
    }

    #[tokio::test]
    async fn test_output_is_forwarded_in_order_per_session() {
        let mut h = Harness::start(FakeSpawner::new(), HostConfig::default());
        let a = h.create(1).await;
        let b = h.create(2).await;

        h.emit_output(0, b"a1");
        h.emit_output(1, b"b1");
        h.emit_output(0, b"a2");
        h.emit_output(1, b"b2");

        let mut per_session: HashMap<SessionId, Vec<u8>> = HashMap::new();
        for _ in 0..4 {
            match h.next().await {
                HostEvent::Output { id, data } => per_session.entry(id).or_default().extend(data),
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(per_session[&a], b"a1a2");
        assert_eq!(per_session[&b], b"b1b2");
    }

    #[tokio::test]
    async fn test_input_and_resize_reach_the_pty() {
        let mut h = Harness::start(FakeSpawner::new(), HostConfig::default());
        let id = h.create(1).await;

        h.send(HostRequest::Input {
            id,
            data: b"ls\r".to_vec(),
        });
        h.send(HostRequest::Resize {
            id,
            cols: 100,
            rows: 30,
        });
        h.send(HostRequest::Resize {
            id,
            cols: 0,
            rows: 30,
        });
        // Unknown ids are ignored without a reply.
        h.send(HostRequest::Resize {
            id: 99,
            cols: 10,
            rows: 10,
        });
        h.send(HostRequest::Input {
            id: 99,
            data: b"x".to_vec(),
        });
        h.assert_quiet().await;

        let log = h.log.lock().unwrap();
        assert_eq!(log.writes, vec![(0, b"ls\r".to_vec())]);
        assert_eq!(log.resizes, vec![(0, 100, 30)]);
    }

    #[tokio::test]
    async fn test_natural_exit_is_reported_once() {
        let mut h = Harness::start(FakeSpawner::new(), HostConfig::default());
        let id = h.create(1).await;

        h.emit_output(0, b"bye");
        h.end_output(0);

        assert_eq!(
            h.next().await,
            HostEvent::Output {
                id,
                data: b"bye".to_vec()
            }
        );
        assert_eq!(
            h.next().await,
            HostEvent::SessionDestroyed {
                id,
                exit_code: Some(0)
            }
        );
        h.assert_quiet().await;
    }

    #[tokio::test]
    async fn test_destroy_kills_and_suppresses_later_output() {
        let mut h = Harness::start(FakeSpawner::new(), HostConfig::default());
        let id = h.create(1).await;

        h.send(HostRequest::DestroySession { id });
        // Give the host loop a chance to process the destroy first.
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.emit_output(0, b"late");
        h.end_output(0);

        h.assert_quiet().await;
        assert_eq!(h.log.lock().unwrap().kills, vec![0]);

        // Destroying again is harmless.
        h.send(HostRequest::DestroySession { id });
        h.assert_quiet().await;
        assert_eq!(h.log.lock().unwrap().kills, vec![0]);
    }

    #[tokio::test]
    async fn test_closing_request_channel_kills_everything() {
        let mut h = Harness::start(FakeSpawner::new(), HostConfig::default());
        h.create(1).await;
        h.create(2).await;

        let Harness {
            requests,
            mut events,
            log,
            ..
        } = h;
        drop(requests);

        let closed = timeout(Duration::from_secs(2), events.recv()).await.unwrap();
        assert_eq!(closed, None);

        let mut kills = log.lock().unwrap().kills.clone();
        kills.sort();
        assert_eq!(kills, vec![0, 1]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_shell_round_trip() {
        use crate::pty::NativeSpawner;

        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig {
            shell: Some("/bin/sh".to_string()),
            ..HostConfig::default()
        };
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
        tokio::spawn(PtyHost::new(NativeSpawner, config, evt_tx).run(req_rx));

        req_tx
            .send(HostRequest::CreateSession {
                request_id: 1,
                working_directory: Some(dir.path().to_path_buf()),
            })
            .unwrap();
        let id = match timeout(Duration::from_secs(3), evt_rx.recv()).await.unwrap() {
            Some(HostEvent::SessionCreated {
                id: Some(id),
                success: true,
                ..
            }) => id,
            other => panic!("unexpected reply: {other:?}"),
        };

        req_tx
            .send(HostRequest::Input {
                id,
                data: b"echo WRAITH_HOST_OK; exit 0\n".to_vec(),
            })
            .unwrap();

        let mut output = Vec::new();
        let mut exit = None;
        while exit.is_none() {
            match timeout(Duration::from_secs(5), evt_rx.recv()).await.unwrap() {
                Some(HostEvent::Output { id: got, data }) if got == id => output.extend(data),
                Some(HostEvent::SessionDestroyed { id: got, exit_code }) if got == id => {
                    exit = Some(exit_code)
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("WRAITH_HOST_OK"), "output was: {text}");
        assert_eq!(exit, Some(Some(0)));
    }
}
