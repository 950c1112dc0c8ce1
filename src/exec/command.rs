// src/exec/command.rs

//! Building and observing task action processes.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Shell command running `action` from `workdir`.
///
/// Output is piped so it can be forwarded to the log, and the process is
/// killed if its handle is dropped.
pub fn shell_command(action: &str, workdir: &Path) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(action);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(action);
        c
    };

    cmd.current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Drain a child stream line by line into debug logs, so pipe buffers
/// never fill up.
pub fn forward_lines<R>(task: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(task = %task, stream, "{}", line);
        }
    });
}
