// Child process helpers for extraction backends

use std::io::ErrorKind;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::errors::ExtractionError;

/// Exit status plus collected stderr of a streamed run
#[derive(Debug)]
pub struct StreamedRun {
    pub status: ExitStatus,
    pub stderr: String,
}

fn spawn(program: &str, args: &[String]) -> Result<Child, ExtractionError> {
    TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => ExtractionError::ToolNotFound(format!("{}: {}", program, e)),
            _ => ExtractionError::ExecutionError(format!("Failed to start {}: {}", program, e)),
        })
}

fn collect<R>(mut pipe: R) -> JoinHandle<std::io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf).await?;
        Ok(buf)
    })
}

async fn join_pipe(
    task: JoinHandle<std::io::Result<Vec<u8>>>,
    name: &str,
) -> Result<Vec<u8>, ExtractionError> {
    task.await
        .map_err(|e| ExtractionError::ExecutionError(format!("{} task failed: {}", name, e)))?
        .map_err(|e| ExtractionError::ExecutionError(format!("Failed to read {}: {}", name, e)))
}

fn wait_failed(program: &str, err: std::io::Error) -> ExtractionError {
    ExtractionError::ExecutionError(format!("Failed to wait for {}: {}", program, err))
}

fn missing_pipe(program: &str, name: &str) -> ExtractionError {
    ExtractionError::ExecutionError(format!("Failed to capture {} from {}", name, program))
}

/// Run a command to completion and collect its output.
///
/// `deadline` of `None` waits as long as the process runs.
pub async fn run_output(
    program: &str,
    args: &[String],
    deadline: Option<Duration>,
) -> Result<Output, ExtractionError> {
    let mut child = spawn(program, args)?;

    let stdout_task = collect(
        child
            .stdout
            .take()
            .ok_or_else(|| missing_pipe(program, "stdout"))?,
    );
    let stderr_task = collect(
        child
            .stderr
            .take()
            .ok_or_else(|| missing_pipe(program, "stderr"))?,
    );

    let waited = match deadline {
        Some(limit) => timeout(limit, child.wait()).await.ok(),
        None => Some(child.wait().await),
    };

    let Some(status) = waited else {
        let _ = child.kill().await;
        stdout_task.abort();
        stderr_task.abort();
        return Err(ExtractionError::Timeout(deadline.unwrap_or_default().as_secs()));
    };

    let status = status
        .map_err(|e| wait_failed(program, e))?;
    let stdout = join_pipe(stdout_task, "stdout").await?;
    let stderr = join_pipe(stderr_task, "stderr").await?;

    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

/// Run a command, handing each stdout line to `on_line` as it arrives
pub async fn run_streaming<F>(
    program: &str,
    args: &[String],
    deadline: Option<Duration>,
    mut on_line: F,
) -> Result<StreamedRun, ExtractionError>
where
    F: FnMut(&str) + Send,
{
    let mut child = spawn(program, args)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| missing_pipe(program, "stdout"))?;
    let stderr_task = collect(
        child
            .stderr
            .take()
            .ok_or_else(|| missing_pipe(program, "stderr"))?,
    );

    let drive = async {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ExtractionError::ExecutionError(format!("Failed to read stdout: {}", e)))?
        {
            on_line(&line);
        }
        child
            .wait()
            .await
            .map_err(|e| wait_failed(program, e))
    };

    let waited = match deadline {
        Some(limit) => timeout(limit, drive).await.ok(),
        None => Some(drive.await),
    };

    let Some(status) = waited else {
        let _ = child.kill().await;
        stderr_task.abort();
        return Err(ExtractionError::Timeout(deadline.unwrap_or_default().as_secs()));
    };

    let status = status?;
    let stderr = join_pipe(stderr_task, "stderr").await?;

    Ok(StreamedRun {
        status,
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_run_output_collects_both_pipes() {
        let output = run_output("sh", &sh("echo out; echo err >&2"), None)
            .await
            .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "err");
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_not_found() {
        let err = run_output("definitely-not-a-real-binary-qdl", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_deadline_kills_process() {
        let err = run_output("sh", &sh("sleep 5"), Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_streaming_delivers_lines_in_order() {
        let mut seen = Vec::new();
        let script = sh("echo one; echo two; echo bad >&2; exit 3");
        let run = run_streaming("sh", &script, None, |line| seen.push(line.to_string()))
            .await
            .unwrap();

        assert_eq!(seen, vec!["one", "two"]);
        assert_eq!(run.status.code(), Some(3));
        assert_eq!(run.stderr.trim(), "bad");
    }
}
