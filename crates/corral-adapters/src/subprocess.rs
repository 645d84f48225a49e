// SPDX-License-Identifier: Apache-2.0
//! Generic subprocess-driving shim shared by the line-delimited-JSON
//! families (Claude, Codex, Acp): one long-lived driver task owns a spawned
//! subprocess's stdio, reading its stdout line by line and forwarding lines
//! to the adapter's parser.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use corral_core::process::FrameStream;

use crate::error::AdapterError;

/// What a parsed stdout line produces. `WriteBack` covers protocol-driven
/// families (ACP) that must reply on the subprocess's stdin out-of-band from
/// the normalized frame stream — e.g. auto-declining a permission request.
pub enum LineOutcome {
    Frame(corral_core::model::StreamFrame),
    WriteBack(String),
    Ignore,
}

/// Spawns `program` with `args` in `cwd`, wires its stdin to the returned
/// `input_tx` (one line per queued user message or protocol write-back) and
/// turns each stdout line into a [`LineOutcome`] via `parse_line`. The
/// returned `abort_tx` is handed to `Process::spawn`; firing it kills the
/// child subprocess.
pub fn spawn_line_driven_subprocess(
    program: &str,
    args: &[String],
    cwd: PathBuf,
    parse_line: impl Fn(&str) -> LineOutcome + Send + Sync + 'static,
) -> Result<(FrameStream, mpsc::UnboundedSender<String>, oneshot::Sender<()>), AdapterError> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(&cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(AdapterError::Spawn)?;

    let mut stdin = child.stdin.take().expect("stdin piped");
    let stdout = child.stdout.take().expect("stdout piped");

    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    let (abort_tx, mut abort_rx) = oneshot::channel::<()>();
    let (frame_tx, frame_rx) = mpsc::channel(64);
    let write_back_tx = input_tx.clone();

    tokio::spawn(async move {
        while let Some(line) = input_rx.recv().await {
            if stdin.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if stdin.write_all(b"\n").await.is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = &mut abort_rx => break,
                line = lines.next_line() => {
                    match line {
                        Ok(Some(raw)) => match parse_line(&raw) {
                            LineOutcome::Frame(frame) => {
                                if frame_tx.send(Ok(frame)).await.is_err() {
                                    break;
                                }
                            }
                            LineOutcome::WriteBack(reply) => {
                                let _ = write_back_tx.send(reply);
                            }
                            LineOutcome::Ignore => {}
                        },
                        Ok(None) => break,
                        Err(err) => {
                            warn!(%err, "adapter subprocess stdout read failed");
                            let _ = frame_tx.send(Err(err.to_string())).await;
                            break;
                        }
                    }
                }
            }
        }
        let _ = child.kill().await;
    });

    let stream: FrameStream = Box::pin(tokio_stream::wrappers::ReceiverStream::new(frame_rx));
    Ok((stream, input_tx, abort_tx))
}
