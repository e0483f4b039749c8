// src/exec/shell.rs

//! Running collaborator commands through the platform shell.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::debug;

/// Build a shell command appropriate for the platform.
fn shell_command(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

fn spawn(cmd: &str, envs: &[(&str, &str)]) -> Result<Child> {
    let mut command = shell_command(cmd);
    command
        .envs(envs.iter().copied())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    command
        .spawn()
        .with_context(|| format!("spawning `{cmd}`"))
}

/// Write `input` to the child's stdin in the background, then close it.
fn feed_stdin(child: &mut Child, input: &str) {
    if let Some(mut stdin) = child.stdin.take() {
        let input = input.to_string();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                // The command may legitimately ignore its stdin.
                debug!(error = %e, "command did not consume stdin");
            }
        });
    }
}

/// Run `cmd` with `input` on stdin and return its stdout.
///
/// A non-zero exit, a timeout or non-UTF-8 output is an error. On timeout
/// the child is killed.
pub async fn run_capture(
    cmd: &str,
    input: &str,
    envs: &[(&str, &str)],
    timeout: Option<Duration>,
) -> Result<String> {
    debug!(cmd = %cmd, "running command");

    let mut child = spawn(cmd, envs)?;
    feed_stdin(&mut child, input);

    let wait = child.wait_with_output();
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, wait)
            .await
            .map_err(|_| anyhow!("`{cmd}` timed out after {limit:?}"))?,
        None => wait.await,
    }
    .with_context(|| format!("waiting for `{cmd}`"))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines() {
        debug!(cmd = %cmd, "stderr: {}", line);
    }

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        match stderr.lines().last() {
            Some(last) => bail!("`{cmd}` exited with status {code}: {last}"),
            None => bail!("`{cmd}` exited with status {code}"),
        }
    }

    String::from_utf8(output.stdout).with_context(|| format!("stdout of `{cmd}` is not UTF-8"))
}

/// Run `cmd` and hand each stdout line to `on_line` as soon as it arrives.
///
/// Returns the full stdout (lines joined with `\n`, trailing newline kept).
pub async fn run_streaming(
    cmd: &str,
    input: &str,
    envs: &[(&str, &str)],
    timeout: Option<Duration>,
    on_line: &mut (dyn FnMut(String) + Send),
) -> Result<String> {
    debug!(cmd = %cmd, "running streaming command");

    let mut child = spawn(cmd, envs)?;
    feed_stdin(&mut child, input);

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout of `{cmd}` was not captured"))?;

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let cmd_name = cmd.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(cmd = %cmd_name, "stderr: {}", line);
            }
        });
    }

    let work = async {
        let mut lines = BufReader::new(stdout).lines();
        let mut collected = String::new();

        while let Some(line) = lines.next_line().await? {
            collected.push_str(&line);
            collected.push('\n');
            on_line(line);
        }

        let status = child.wait().await?;
        Ok::<_, anyhow::Error>((status, collected))
    };

    let (status, collected) = match timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| anyhow!("`{cmd}` timed out after {limit:?}"))??,
        None => work.await?,
    };

    if !status.success() {
        bail!(
            "`{cmd}` exited with status {}",
            status.code().unwrap_or(-1)
        );
    }

    Ok(collected)
}
