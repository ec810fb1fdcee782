//! JSON-lines transport for running the host in a separate process.
//!
//! Each message is one line of JSON. The host process reads requests from its
//! stdin and writes events to its stdout; the display process does the
//! reverse through the child's pipes. A line that fails to decode is logged
//! and skipped so one bad message cannot take the link down.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::channel::{DisplayEnd, HostEnd};
use crate::error::IpcError;

/// Encode a message as a single JSON line (including the trailing newline).
pub fn encode_line<T: Serialize>(msg: &T) -> Result<String, IpcError> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

/// Decode one JSON line.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, IpcError> {
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Read messages from `reader` until EOF and forward them to `tx`.
///
/// Returns when the reader hits EOF or the receiving side is dropped.
pub async fn pump_reader<R, T>(reader: R, tx: mpsc::UnboundedSender<T>) -> Result<(), IpcError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let msg = match decode_line::<T>(&line) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("Skipping malformed message: {e}");
                continue;
            }
        };
        if tx.send(msg).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

/// Write every message received on `rx` to `writer`, one line each.
///
/// Returns once all senders are dropped, or with an error if the pipe breaks.
pub async fn pump_writer<W, T>(mut writer: W, mut rx: mpsc::UnboundedReceiver<T>) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    while let Some(msg) = rx.recv().await {
        let line = encode_line(&msg)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Build a [`HostEnd`] whose requests come from `reader` and whose events go
/// to `writer`. Spawns the two pump tasks on the current runtime.
pub fn host_end<R, W>(reader: R, writer: W) -> HostEnd
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel();
    tokio::spawn(report("request reader", pump_reader(reader, req_tx)));
    tokio::spawn(report("event writer", pump_writer(writer, evt_rx)));
    HostEnd {
        requests: req_rx,
        events: evt_tx,
    }
}

/// Build a [`DisplayEnd`] whose events come from `reader` and whose requests
/// go to `writer`. Spawns the two pump tasks on the current runtime.
pub fn display_end<R, W>(reader: R, writer: W) -> DisplayEnd
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel();
    tokio::spawn(report("event reader", pump_reader(reader, evt_tx)));
    tokio::spawn(report("request writer", pump_writer(writer, req_rx)));
    DisplayEnd {
        requests: req_tx,
        events: evt_rx,
    }
}

async fn report(name: &'static str, pump: impl std::future::Future<Output = Result<(), IpcError>>) {
    match pump.await {
        Ok(()) => log::debug!("{name} finished"),
        Err(e) => log::warn!("{name} stopped: {e}"),
    }
}
