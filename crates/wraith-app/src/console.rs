//! Line-oriented front end.
//!
//! Lines starting with `:` are commands; anything else is typed into the
//! active session followed by a carriage return. Frames from the view
//! coordinator are printed as a one-line summary whenever state changes.

use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use wraith_ipc::SessionId;
use wraith_session::{
    CreateOptions, Frame, GridLayout, ManagerHandle, SessionError, Tab, ViewCoordinator, ViewMode,
    Viewport,
};

pub const HELP: &str = "\
commands:
  :new [dir]            open a session (in dir, or the default directory)
  :close [id]           close a session (the active one by default)
  :tab <id>             make a session active
  :rename <id> <name>   rename a session (empty name restores the default)
  :tabs                 switch to the tabbed view
  :grid RxC             switch to the grid view with R rows and C columns
  :size WxH             set the viewport size in pixels
  :show                 print the active session's screen
  :quit                 close everything and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    New(Option<PathBuf>),
    Close(Option<SessionId>),
    Tab(SessionId),
    Rename(SessionId, String),
    Tabs,
    Grid(GridLayout),
    Size(Viewport),
    Show,
    Help,
    Quit,
    /// Raw bytes for the active session.
    Input(Vec<u8>),
}

/// Parse one input line.
pub fn parse_line(line: &str) -> Result<ConsoleCommand, String> {
    let Some(command) = line.strip_prefix(':') else {
        let mut data = line.as_bytes().to_vec();
        data.push(b'\r');
        return Ok(ConsoleCommand::Input(data));
    };

    let command = command.trim();
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match name {
        "new" if rest.is_empty() => Ok(ConsoleCommand::New(None)),
        "new" => Ok(ConsoleCommand::New(Some(PathBuf::from(rest)))),
        "close" if rest.is_empty() => Ok(ConsoleCommand::Close(None)),
        "close" => parse_id(rest).map(|id| ConsoleCommand::Close(Some(id))),
        "tab" => parse_id(rest).map(ConsoleCommand::Tab),
        "rename" => {
            let (id, name) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            parse_id(id).map(|id| ConsoleCommand::Rename(id, name.trim().to_string()))
        }
        "tabs" => Ok(ConsoleCommand::Tabs),
        "grid" => rest
            .parse::<GridLayout>()
            .map(ConsoleCommand::Grid)
            .map_err(|e| e.to_string()),
        "size" => parse_size(rest).map(ConsoleCommand::Size),
        "show" => Ok(ConsoleCommand::Show),
        "help" => Ok(ConsoleCommand::Help),
        "quit" | "q" => Ok(ConsoleCommand::Quit),
        other => Err(format!("unknown command :{other} (try :help)")),
    }
}

fn parse_id(s: &str) -> Result<SessionId, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("expected a session id, got {s:?}"))
}

fn parse_size(s: &str) -> Result<Viewport, String> {
    let invalid = || format!("expected WxH in pixels, got {s:?}");
    let (width, height) = s.split_once(['x', 'X']).ok_or_else(invalid)?;
    let width: u32 = width.trim().parse().map_err(|_| invalid())?;
    let height: u32 = height.trim().parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok(Viewport { width, height })
}

/// One-line summary of a frame.
pub fn format_frame(frame: &Frame) -> String {
    match frame {
        Frame::Empty { .. } => "[no sessions]".to_string(),
        Frame::Tabbed { tabs, .. } => format!("[tabs] {}", format_tabs(tabs)),
        Frame::Grid {
            tabs,
            layout,
            panes,
            ..
        } => {
            let visible: Vec<String> = panes.iter().map(|p| p.id.to_string()).collect();
            format!(
                "[grid {layout}] {} (showing {})",
                format_tabs(tabs),
                visible.join(",")
            )
        }
    }
}

fn format_tabs(tabs: &[Tab]) -> String {
    tabs.iter()
        .map(|tab| {
            if tab.active {
                format!("*{}:{}*", tab.id, tab.label)
            } else {
                format!("{}:{}", tab.id, tab.label)
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Read lines until `:quit` or end of input.
///
/// Only a stopped manager ends the loop with an error; every other failure
/// is printed and the loop continues.
pub async fn run<R>(handle: ManagerHandle, input: R) -> Result<(), SessionError>
where
    R: AsyncBufRead + Unpin,
{
    let updates = handle.subscribe().await?;
    let printer = tokio::spawn(ViewCoordinator::new().run(updates, |frame| {
        println!("{}", format_frame(&frame));
    }));

    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::warn!("Console input failed: {e}");
                break;
            }
        };
        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        if command == ConsoleCommand::Quit {
            break;
        }
        match execute(&handle, command).await {
            Ok(()) => {}
            Err(SessionError::ManagerStopped) => return Err(SessionError::ManagerStopped),
            Err(e) => println!("error: {e}"),
        }
    }

    printer.abort();
    Ok(())
}

async fn execute(handle: &ManagerHandle, command: ConsoleCommand) -> Result<(), SessionError> {
    match command {
        ConsoleCommand::New(working_directory) => {
            let id = handle
                .create_session(CreateOptions { working_directory })
                .await?;
            println!("opened session {id}");
        }
        ConsoleCommand::Close(id) => {
            let Some(id) = id.or(active(handle).await?) else {
                println!("no session is open");
                return Ok(());
            };
            if !handle.close_session(id).await? {
                return Err(SessionError::NotFound(id));
            }
        }
        ConsoleCommand::Tab(id) => handle.set_active_session(id).await?,
        ConsoleCommand::Rename(id, name) => handle.rename_session(id, name).await?,
        ConsoleCommand::Tabs => handle.set_view_mode(ViewMode::Tabbed).await?,
        ConsoleCommand::Grid(layout) => {
            handle.set_grid_layout(layout).await?;
            handle.set_view_mode(ViewMode::Grid).await?;
        }
        ConsoleCommand::Size(viewport) => handle.set_viewport(viewport).await?,
        ConsoleCommand::Show => {
            let Some(id) = active(handle).await? else {
                println!("no session is open");
                return Ok(());
            };
            println!("{}", handle.screen_text(id).await?.unwrap_or_default());
        }
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => {}
        ConsoleCommand::Input(data) => {
            let Some(id) = active(handle).await? else {
                println!("no session is open (:new opens one)");
                return Ok(());
            };
            handle.send_input(id, data).await?;
        }
    }
    Ok(())
}

async fn active(handle: &ManagerHandle) -> Result<Option<SessionId>, SessionError> {
    Ok(handle.snapshot().await?.active)
}
