//! NDJSON host surface: one inbound message per line in, one update per line out.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::orchestrator::{EngineUpdate, InboundMessage, LiveEngine, OutboundResult};

const MEETING_QUEUE_CAPACITY: usize = 32;
const OUTPUT_QUEUE_CAPACITY: usize = 256;

/// Pumps `reader` into the engine until EOF and writes every reply and
/// asynchronous update to `writer`. Each meeting keeps a single worker for
/// the whole run, so its messages are handled strictly in arrival order.
pub async fn run<R, W>(
    engine: LiveEngine,
    updates: mpsc::Receiver<EngineUpdate>,
    reader: R,
    writer: W,
) -> Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::channel::<EngineUpdate>(OUTPUT_QUEUE_CAPACITY);
    let output = tokio::spawn(write_updates(out_rx, writer));
    let forwarder = tokio::spawn(forward_updates(updates, out_tx.clone()));

    let mut workers: HashMap<String, mpsc::Sender<InboundMessage>> = HashMap::new();
    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message = match serde_json::from_str::<InboundMessage>(line) {
            Ok(message) => message,
            Err(err) => {
                warn!(target: "bridge", %err, "rejecting malformed input line");
                let update = EngineUpdate::new(
                    meeting_id_hint(line),
                    OutboundResult::error(format!("malformed message: {err}")),
                );
                if out_tx.send(update).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let meeting_id = message.meeting_id().to_string();
        let sender = workers.entry(meeting_id.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(MEETING_QUEUE_CAPACITY);
            handles.push(tokio::spawn(meeting_worker(
                engine.clone(),
                rx,
                out_tx.clone(),
            )));
            debug!(target: "bridge", meeting_id = %meeting_id, "spawned meeting worker");
            tx
        });

        if sender.send(message).await.is_err() {
            warn!(target: "bridge", meeting_id = %meeting_id, "meeting worker exited; message dropped");
            workers.remove(&meeting_id);
        }
    }

    info!(target: "bridge", "input closed; draining meeting workers");
    drop(workers);
    for handle in handles {
        if let Err(err) = handle.await {
            warn!(target: "bridge", %err, "meeting worker panicked");
        }
    }

    // The update channel closes once the engine and every in-flight
    // synthesis have released their senders.
    drop(engine);
    if let Err(err) = forwarder.await {
        warn!(target: "bridge", %err, "update forwarder panicked");
    }
    drop(out_tx);

    output.await.context("output writer task failed")?
}

async fn meeting_worker(
    engine: LiveEngine,
    mut rx: mpsc::Receiver<InboundMessage>,
    out_tx: mpsc::Sender<EngineUpdate>,
) {
    while let Some(message) = rx.recv().await {
        for update in engine.handle(message).await {
            if out_tx.send(update).await.is_err() {
                return;
            }
        }
    }
}

async fn forward_updates(mut updates: mpsc::Receiver<EngineUpdate>, out_tx: mpsc::Sender<EngineUpdate>) {
    while let Some(update) = updates.recv().await {
        if out_tx.send(update).await.is_err() {
            break;
        }
    }
}

async fn write_updates<W>(mut rx: mpsc::Receiver<EngineUpdate>, mut writer: W) -> Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(update) = rx.recv().await {
        let mut line = match serde_json::to_vec(&update) {
            Ok(line) => line,
            Err(err) => {
                warn!(target: "bridge", %err, "failed to encode update");
                continue;
            }
        };
        line.push(b'\n');
        writer
            .write_all(&line)
            .await
            .context("failed to write update")?;
        writer.flush().await.context("failed to flush update")?;
    }
    Ok(writer)
}

fn meeting_id_hint(line: &str) -> String {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|value| {
            value
                .get("meeting_id")
                .and_then(|id| id.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default()
}
