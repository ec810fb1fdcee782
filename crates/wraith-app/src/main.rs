mod config;
mod console;

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use config::AppConfig;
use env_logger::Env;
use tokio::io::BufReader;
use tokio::process::Command;
use wraith_ipc::{pair, stdio, DisplayEnd};
use wraith_pty::{NativeSpawner, PtyHost};
use wraith_session::{spawn_display, CreateOptions, SessionManager, VtEmulatorFactory};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// How the display side reaches the PTY host.
enum HostLink {
    /// `wraith host` as a child process over stdin/stdout.
    ChildProcess,
    /// The host loop as a task in this process.
    InProcess,
}

fn main() {
    // Logs go to stderr; in `host` mode stdout carries the protocol.
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("fatal: failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    let arg = std::env::args().nth(1);
    let result = runtime.block_on(async {
        match arg.as_deref() {
            Some("host") => run_host().await,
            Some("--in-process") => run_display(HostLink::InProcess).await,
            None => run_display(HostLink::ChildProcess).await,
            Some(other) => Err(format!("unknown argument {other:?} (expected `host` or `--in-process`)").into()),
        }
    });
    // Console stdin is read on a blocking thread that may never return.
    runtime.shutdown_timeout(Duration::from_secs(1));

    if let Err(e) = result {
        eprintln!("fatal: {e}");
        std::process::exit(1);
    }
}

/// Open (or create) the database under `$WRAITH_HOME` or `~/.wraith` and
/// load the settings.
fn load_config() -> AppResult<AppConfig> {
    let wraith_home = match std::env::var_os("WRAITH_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => home_dir()
            .ok_or("could not determine home directory")?
            .join(".wraith"),
    };
    std::fs::create_dir_all(&wraith_home)
        .map_err(|e| format!("failed to create {}: {e}", wraith_home.display()))?;

    let db = wraith_db::open(&wraith_home.join("wraith.db"))?;
    Ok(AppConfig::load(&db)?)
}

/// The privileged side: shells on PTYs, protocol on stdin/stdout.
async fn run_host() -> AppResult<()> {
    let config = load_config()?;
    let end = stdio::host_end(tokio::io::stdin(), tokio::io::stdout());
    let host = PtyHost::new(NativeSpawner, config.host_config(), end.events);
    host.run(end.requests).await;
    Ok(())
}

async fn run_display(link: HostLink) -> AppResult<()> {
    let config = load_config()?;

    let (display, mut child) = match link {
        HostLink::InProcess => {
            let (display, host_end) = pair();
            let host = PtyHost::new(NativeSpawner, config.host_config(), host_end.events);
            tokio::spawn(host.run(host_end.requests));
            (display, None)
        }
        HostLink::ChildProcess => {
            let (display, child) = spawn_host_process()?;
            (display, Some(child))
        }
    };

    let manager = SessionManager::new(
        config.manager_config(),
        VtEmulatorFactory::new(config.cell_metrics()),
        display.requests,
    );
    let handle = spawn_display(manager, display.events, config.create_timeout());

    let options = CreateOptions {
        working_directory: std::env::current_dir().ok(),
    };
    match handle.create_session(options).await {
        Ok(id) => println!("opened session {id} (:help for commands)"),
        Err(e) => println!("error: {e}"),
    }

    console::run(handle, BufReader::new(tokio::io::stdin())).await?;

    // Dropping the last handle stopped the manager, which closes the request
    // channel; the host then kills every shell and exits.
    if let Some(child) = child.as_mut() {
        match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
            Ok(Ok(status)) => log::debug!("Host process exited with {status}"),
            Ok(Err(e)) => log::warn!("Failed to wait for host process: {e}"),
            Err(_) => {
                log::warn!("Host process did not exit, killing it");
                child.kill().await?;
            }
        }
    }
    Ok(())
}

fn spawn_host_process() -> AppResult<(DisplayEnd, tokio::process::Child)> {
    let exe = std::env::current_exe()?;
    let mut child = Command::new(exe)
        .arg("host")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to start host process: {e}"))?;

    let stdin = child.stdin.take().ok_or("host process has no stdin")?;
    let stdout = child.stdout.take().ok_or("host process has no stdout")?;
    log::info!("Started host process {:?}", child.id());
    Ok((stdio::display_end(stdout, stdin), child))
}

/// Get the user's home directory.
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
