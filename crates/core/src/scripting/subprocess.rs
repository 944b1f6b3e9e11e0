//! Shared subprocess management utilities.
//!
//! [`run_captured`] buffers a child's output (used for git), while
//! [`run_streaming`] hands every line to a callback as soon as it is read
//! (used for notebooks). Both apply the settings from [`ScriptInput`] and
//! enforce its timeout.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::executor::{ScriptError, ScriptInput, ScriptOutput, StreamKind, StreamLine, StreamOutcome};

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Number of trailing stderr lines kept for error messages.
pub const STDERR_TAIL_LINES: usize = 20;

/// How long output is still read after the child has exited.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(500);

fn program_name(cmd: &Command) -> String {
    cmd.as_std().get_program().to_string_lossy().into_owned()
}

fn configure(cmd: &mut Command, input: &ScriptInput) {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in &input.env_vars {
        cmd.env(key, value);
    }

    if let Some(dir) = &input.working_directory {
        cmd.current_dir(dir);
    }
}

/// Spawn `cmd`, capture stdout/stderr in full, and enforce the timeout.
///
/// A non-zero exit is *not* an error here; callers inspect
/// [`ScriptOutput::exit_code`].
pub async fn run_captured(
    cmd: &mut Command,
    input: &ScriptInput,
) -> Result<ScriptOutput, ScriptError> {
    configure(cmd, input);
    let program = program_name(cmd);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| ScriptError::Spawn {
        program: program.clone(),
        source,
    })?;

    // Read the pipes in spawned tasks so `child.wait()` can borrow `child`.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    match tokio::time::timeout(input.timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let stdout_bytes = collect_output(stdout_task).await;
            let stderr_bytes = collect_output(stderr_task).await;
            Ok(ScriptOutput {
                stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
                exit_code: status.code().unwrap_or(-1),
                duration_ms: start.elapsed().as_millis() as u64,
            })
        }
        Ok(Err(e)) => Err(ScriptError::IoError(e)),
        // `child` is dropped on return, which kills it (`kill_on_drop`).
        Err(_elapsed) => Err(ScriptError::Timeout {
            program,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }),
    }
}

/// Spawn `cmd` and deliver each output line to `on_line` as it arrives.
///
/// Stdout and stderr are read concurrently so neither pipe can fill up
/// and stall the child. The returned outcome keeps the last
/// [`STDERR_TAIL_LINES`] stderr lines for diagnostics.
pub async fn run_streaming<F>(
    cmd: &mut Command,
    input: &ScriptInput,
    mut on_line: F,
) -> Result<StreamOutcome, ScriptError>
where
    F: FnMut(StreamLine) + Send,
{
    configure(cmd, input);
    let program = program_name(cmd);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| ScriptError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    let pump = async {
        let mut out = stdout.map(|s| BufReader::new(s).split(b'\n'));
        let mut err = stderr.map(|s| BufReader::new(s).split(b'\n'));

        // The child's exit ends the run, not EOF: a background process it
        // left behind may hold the pipes open indefinitely.
        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                segment = next_segment(&mut out), if out.is_some() => match segment? {
                    Some(text) => deliver(StreamKind::Stdout, text, &mut stderr_tail, &mut on_line),
                    None => out = None,
                },
                segment = next_segment(&mut err), if err.is_some() => match segment? {
                    Some(text) => deliver(StreamKind::Stderr, text, &mut stderr_tail, &mut on_line),
                    None => err = None,
                },
            }
        };

        let drain = async {
            while out.is_some() || err.is_some() {
                tokio::select! {
                    segment = next_segment(&mut out), if out.is_some() => match segment? {
                        Some(text) => deliver(StreamKind::Stdout, text, &mut stderr_tail, &mut on_line),
                        None => out = None,
                    },
                    segment = next_segment(&mut err), if err.is_some() => match segment? {
                        Some(text) => deliver(StreamKind::Stderr, text, &mut stderr_tail, &mut on_line),
                        None => err = None,
                    },
                }
            }
            Ok::<_, std::io::Error>(())
        };
        match tokio::time::timeout(EXIT_DRAIN_GRACE, drain).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(program = %program, error = %e, "Failed to drain output after exit");
            }
            Err(_elapsed) => tracing::debug!(
                program = %program,
                "Output still open after exit; detaching from remaining readers",
            ),
        }

        Ok::<_, std::io::Error>(status)
    };

    let result = tokio::time::timeout(input.timeout, pump).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(status)) => Ok(StreamOutcome {
            exit_code: status.code().unwrap_or(-1),
            duration_ms: elapsed_ms,
            stderr_tail: stderr_tail.into_iter().collect(),
        }),
        Ok(Err(e)) => Err(ScriptError::IoError(e)),
        Err(_elapsed) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            Err(ScriptError::Timeout {
                program,
                elapsed_ms,
            })
        }
    }
}

/// Hand one line to `on_line`, remembering stderr lines in the bounded tail.
fn deliver<F>(kind: StreamKind, text: String, tail: &mut VecDeque<String>, on_line: &mut F)
where
    F: FnMut(StreamLine),
{
    if kind == StreamKind::Stderr {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(text.clone());
    }
    on_line(StreamLine { kind, text });
}

/// Read the next newline-terminated segment, decoding it lossily.
///
/// Returns `Ok(None)` at end of stream.
async fn next_segment<R>(
    reader: &mut Option<tokio::io::Split<BufReader<R>>>,
) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let Some(split) = reader.as_mut() else {
        return Ok(None);
    };
    Ok(split.next_segment().await?.map(|bytes| {
        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        if text.ends_with('\r') {
            text.pop();
        }
        text
    }))
}

/// Wait for a reader task, giving up after [`EXIT_DRAIN_GRACE`] once the
/// child has exited.
async fn collect_output(mut task: tokio::task::JoinHandle<Vec<u8>>) -> Vec<u8> {
    match tokio::time::timeout(EXIT_DRAIN_GRACE, &mut task).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_elapsed) => {
            task.abort();
            Vec::new()
        }
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
