//! External command execution with streamed output and exit-code mapping.
//!
//! Analysis pipelines are long-running shell scripts. The runner streams
//! every stdout/stderr chunk to a caller-supplied callback (the mechanism
//! by which live progress reaches the job log), captures stdout, and
//! translates non-zero exit codes through a caller-supplied map into
//! domain failures or benign soft-successes.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::ProcessingError;

/// Exit code used to model a wall-clock timeout, matching the convention
/// of GNU `timeout`. Flows through the error-code map like any other
/// non-zero exit.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// How a mapped exit code should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    /// Translate to a [`ProcessingError`] with this message.
    Fail(&'static str),
    /// Benign: treat the run as a soft success.
    Ignore,
}

/// Exit code to action translation table.
pub type ErrorCodeMap = HashMap<i32, ExitAction>;

/// Raw failure from a command run, before error-map translation.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command exited with code {code}")]
    Exit { code: i32, stdout: String },

    #[error("command terminated by a signal")]
    Signalled { stdout: String },

    #[error("I/O error while streaming command output: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-zero exit after error-map translation.
#[derive(Debug)]
pub enum MappedFailure {
    /// The exit code was explicitly marked benign; execution continues as
    /// if successful.
    Ignored { code: i32, stdout: String },
    /// A domain failure carrying the mapped (or generic) message.
    Fatal(ProcessingError),
}

/// Run an external command, streaming every output chunk to `on_chunk`
/// and returning the captured stdout.
///
/// `argv` is the full command vector (`argv[0]` is the program). When
/// `timeout` is set, the process is forcibly terminated at expiry and the
/// run fails with [`TIMEOUT_EXIT_CODE`]. Fails with [`CommandError::Exit`]
/// on any non-zero termination.
pub async fn run(
    argv: &[String],
    cwd: Option<&Path>,
    timeout: Option<Duration>,
    mut on_chunk: impl FnMut(&str),
) -> Result<String, CommandError> {
    let (program, args) = argv.split_first().ok_or_else(|| CommandError::Spawn {
        program: String::new(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command vector"),
    })?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|source| CommandError::Spawn {
        program: program.clone(),
        source,
    })?;

    // The pipes are always present because both streams are piped above.
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
    let mut captured = String::new();
    let mut stdout_buf = [0u8; 4096];
    let mut stderr_buf = [0u8; 4096];
    let mut timed_out = false;

    // Drain both pipes until EOF, invoking the callback synchronously for
    // every chunk. Stdout chunks are also captured for the caller.
    while stdout_pipe.is_some() || stderr_pipe.is_some() {
        tokio::select! {
            read = read_some(&mut stdout_pipe, &mut stdout_buf) => {
                if let Some(n) = read? {
                    let chunk = String::from_utf8_lossy(&stdout_buf[..n]);
                    captured.push_str(&chunk);
                    on_chunk(&chunk);
                }
            }
            read = read_some(&mut stderr_pipe, &mut stderr_buf) => {
                if let Some(n) = read? {
                    let chunk = String::from_utf8_lossy(&stderr_buf[..n]);
                    on_chunk(&chunk);
                }
            }
            _ = sleep_until_deadline(deadline), if deadline.is_some() && !timed_out => {
                timed_out = true;
                let _ = child.start_kill();
            }
        }
    }

    let status = child.wait().await?;

    if timed_out {
        return Err(CommandError::Exit {
            code: TIMEOUT_EXIT_CODE,
            stdout: captured,
        });
    }
    match status.code() {
        Some(0) => Ok(captured),
        Some(code) => Err(CommandError::Exit {
            code,
            stdout: captured,
        }),
        None => Err(CommandError::Signalled { stdout: captured }),
    }
}

/// Read a chunk from an optional pipe, clearing it on EOF. Returns the
/// number of bytes read, or `None` when the pipe just reached EOF.
async fn read_some<R>(
    pipe: &mut Option<R>,
    buf: &mut [u8],
) -> Result<Option<usize>, std::io::Error>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match pipe {
        Some(reader) => {
            let n = reader.read(buf).await?;
            if n == 0 {
                *pipe = None;
                Ok(None)
            } else {
                Ok(Some(n))
            }
        }
        // Completed pipes never resolve again; the other select arms win.
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(instant) => tokio::time::sleep_until(instant).await,
        None => std::future::pending().await,
    }
}

/// Translate a raw command failure through an error-code map.
///
/// A mapped code becomes a [`ProcessingError`] with the mapped message; a
/// code marked [`ExitAction::Ignore`] is a soft success; an unmapped code
/// falls back to a generic message carrying the raw exit code.
pub fn translate(err: CommandError, map: &ErrorCodeMap) -> MappedFailure {
    match err {
        CommandError::Exit { code, stdout } => match map.get(&code) {
            Some(ExitAction::Ignore) => MappedFailure::Ignored { code, stdout },
            Some(ExitAction::Fail(message)) => {
                MappedFailure::Fatal(ProcessingError::with_code(*message, code))
            }
            None => MappedFailure::Fatal(ProcessingError::with_code(
                format!("Command failed with exit code {code}."),
                code,
            )),
        },
        CommandError::Signalled { .. } => {
            MappedFailure::Fatal(ProcessingError::new("Command terminated by a signal."))
        }
        err @ CommandError::Spawn { .. } => MappedFailure::Fatal(ProcessingError::wrap(err)),
        CommandError::Io(err) => MappedFailure::Fatal(ProcessingError::wrap(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn captures_stdout() {
        let out = run(&sh("printf hello"), None, None, |_| {}).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn streams_chunks_from_both_pipes() {
        let mut seen = String::new();
        run(&sh("printf out; printf err 1>&2"), None, None, |chunk| {
            seen.push_str(chunk);
        })
        .await
        .unwrap();
        assert!(seen.contains("out"));
        assert!(seen.contains("err"));
    }

    #[tokio::test]
    async fn respects_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = run(&sh("pwd"), Some(dir.path()), None, |_| {})
            .await
            .unwrap();
        let reported = std::path::Path::new(out.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_code() {
        let err = run(&sh("exit 106"), None, None, |_| {}).await.unwrap_err();
        match err {
            CommandError::Exit { code, .. } => assert_eq!(code, 106),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_kills_and_reports_conventional_code() {
        let err = run(
            &sh("sleep 10"),
            None,
            Some(Duration::from_millis(100)),
            |_| {},
        )
        .await
        .unwrap_err();
        match err {
            CommandError::Exit { code, .. } => assert_eq!(code, TIMEOUT_EXIT_CODE),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_failure() {
        let argv = vec!["oncoflow-no-such-binary".to_string()];
        let err = run(&argv, None, None, |_| {}).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    // -----------------------------------------------------------------------
    // Error-map translation
    // -----------------------------------------------------------------------

    fn map_106() -> ErrorCodeMap {
        HashMap::from([(106, ExitAction::Fail("Unable to call variants"))])
    }

    #[tokio::test]
    async fn mapped_code_yields_mapped_message() {
        let err = run(&sh("exit 106"), None, None, |_| {}).await.unwrap_err();
        match translate(err, &map_106()) {
            MappedFailure::Fatal(e) => {
                assert_eq!(e.message(), "Unable to call variants");
                assert_eq!(e.code(), Some(106));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unmapped_code_yields_generic_message_with_code() {
        let err = run(&sh("exit 255"), None, None, |_| {}).await.unwrap_err();
        match translate(err, &map_106()) {
            MappedFailure::Fatal(e) => {
                assert!(e.message().contains("255"));
                assert_eq!(e.code(), Some(255));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ignored_code_is_a_soft_success() {
        let map = HashMap::from([(3, ExitAction::Ignore)]);
        let err = run(&sh("printf partial; exit 3"), None, None, |_| {})
            .await
            .unwrap_err();
        match translate(err, &map) {
            MappedFailure::Ignored { code, stdout } => {
                assert_eq!(code, 3);
                assert_eq!(stdout, "partial");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_flows_through_the_map() {
        let map = HashMap::from([(TIMEOUT_EXIT_CODE, ExitAction::Fail("Pipeline timed out"))]);
        let err = run(
            &sh("sleep 10"),
            None,
            Some(Duration::from_millis(100)),
            |_| {},
        )
        .await
        .unwrap_err();
        match translate(err, &map) {
            MappedFailure::Fatal(e) => assert_eq!(e.message(), "Pipeline timed out"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
