//! Unit tests for the execution backends and lifecycle helpers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::rstest;

use super::*;
use crate::logging::LogLevel;
use crate::test_support::RecordingSink;

fn utf8_temp_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("temp dir should be UTF-8")
}

async fn shell_request(dir: &tempfile::TempDir, body: &str) -> ExecutionRequest {
    let root = utf8_temp_dir(dir);
    let script = root.join("script.sh");
    tokio::fs::write(&script, body)
        .await
        .expect("script should write");
    ExecutionRequest {
        script,
        working_directory: root,
        environment: BTreeMap::new(),
        timeout: None,
    }
}

#[tokio::test]
async fn subprocess_zero_exit_succeeds() {
    let dir = tempfile::tempdir().expect("temp dir should create");
    let request = shell_request(&dir, "echo done\n").await;
    let sink = Arc::new(RecordingSink::new());

    let result = SubprocessExecutor::with_interpreter("sh")
        .execute(&request, sink)
        .await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.output_tail.as_deref(), Some("done"));
    assert!(result.error_detail.is_none());
}

#[tokio::test]
async fn subprocess_nonzero_exit_fails_with_code() {
    let dir = tempfile::tempdir().expect("temp dir should create");
    let request = shell_request(&dir, "exit 3\n").await;
    let sink = Arc::new(RecordingSink::new());

    let result = SubprocessExecutor::with_interpreter("sh")
        .execute(&request, sink)
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.exit_code, Some(3));
}

#[tokio::test]
async fn subprocess_relays_streams_at_matching_levels() {
    let dir = tempfile::tempdir().expect("temp dir should create");
    let request = shell_request(
        &dir,
        "echo first\necho second\necho oops >&2\necho third\n",
    )
    .await;
    let sink = Arc::new(RecordingSink::new());

    let result = SubprocessExecutor::with_interpreter("sh")
        .execute(&request, Arc::clone(&sink) as Arc<dyn crate::logging::LogSink>)
        .await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(
        sink.messages_at(LogLevel::Info),
        vec!["first", "second", "third"]
    );
    assert_eq!(sink.messages_at(LogLevel::Error), vec!["oops"]);
}

#[tokio::test]
async fn subprocess_timeout_kills_and_reports() {
    let dir = tempfile::tempdir().expect("temp dir should create");
    let mut request = shell_request(&dir, "echo started\nsleep 30\necho unreached\n").await;
    request.timeout = Some(Duration::from_millis(300));
    let sink = Arc::new(RecordingSink::new());

    let result = SubprocessExecutor::with_interpreter("sh")
        .execute(&request, Arc::clone(&sink) as Arc<dyn crate::logging::LogSink>)
        .await;

    assert_eq!(result.status, ExecutionStatus::TimedOut);
    assert!(result.exit_code.is_none());
    assert!(
        result
            .error_detail
            .as_deref()
            .is_some_and(|detail| detail.contains("timed out")),
        "detail should mention the timeout: {:?}",
        result.error_detail
    );
    assert!(result.duration < Duration::from_secs(5));
    let relayed = sink.messages_at(LogLevel::Info);
    assert!(!relayed.contains(&String::from("unreached")));
}

#[tokio::test]
async fn subprocess_missing_interpreter_errors() {
    let dir = tempfile::tempdir().expect("temp dir should create");
    let request = shell_request(&dir, "echo never\n").await;
    let sink = Arc::new(RecordingSink::new());

    let result = SubprocessExecutor::with_interpreter("definitely-not-an-interpreter")
        .execute(&request, sink)
        .await;

    assert_eq!(result.status, ExecutionStatus::Errored);
    assert!(
        result
            .error_detail
            .as_deref()
            .is_some_and(|detail| detail.contains("failed to start"))
    );
}

#[tokio::test]
async fn in_process_maps_return_values_to_statuses() {
    let dir = tempfile::tempdir().expect("temp dir should create");
    let request = shell_request(&dir, "unused\n").await;
    let sink = Arc::new(RecordingSink::new());

    let ok = InProcessExecutor::new(Arc::new(|_, _| Ok(0)))
        .execute(&request, Arc::clone(&sink) as Arc<dyn crate::logging::LogSink>)
        .await;
    assert_eq!(ok.status, ExecutionStatus::Succeeded);
    assert_eq!(ok.exit_code, Some(0));

    let failed = InProcessExecutor::new(Arc::new(|_, _| Ok(7)))
        .execute(&request, Arc::clone(&sink) as Arc<dyn crate::logging::LogSink>)
        .await;
    assert_eq!(failed.status, ExecutionStatus::Failed);
    assert_eq!(failed.exit_code, Some(7));

    let faulted = InProcessExecutor::new(Arc::new(|_, _| Err(String::from("boom"))))
        .execute(&request, sink)
        .await;
    assert_eq!(faulted.status, ExecutionStatus::Failed);
    assert_eq!(faulted.error_detail.as_deref(), Some("boom"));
}

#[tokio::test]
async fn in_process_timeout_abandons_the_call() {
    let dir = tempfile::tempdir().expect("temp dir should create");
    let mut request = shell_request(&dir, "unused\n").await;
    request.timeout = Some(Duration::from_millis(100));
    let sink = Arc::new(RecordingSink::new());

    let result = InProcessExecutor::new(Arc::new(|_, _| {
        std::thread::sleep(Duration::from_secs(10));
        Ok(0)
    }))
    .execute(&request, sink)
    .await;

    assert_eq!(result.status, ExecutionStatus::TimedOut);
}

#[tokio::test]
async fn in_process_sees_request_environment() {
    let dir = tempfile::tempdir().expect("temp dir should create");
    let mut request = shell_request(&dir, "unused\n").await;
    request
        .environment
        .insert(String::from("JOB_NAME"), String::from("demo"));
    let sink = Arc::new(RecordingSink::new());

    let result = InProcessExecutor::new(Arc::new(|request, _| {
        if request.environment.get("JOB_NAME").map(String::as_str) == Some("demo") {
            Ok(0)
        } else {
            Ok(1)
        }
    }))
    .execute(&request, sink)
    .await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
}

#[rstest]
fn lifecycle_finishes_exactly_once_by_construction() {
    let mut lifecycle = Lifecycle::new();
    assert!(!lifecycle.is_running());
    lifecycle.start();
    assert!(lifecycle.is_running());

    let result = lifecycle.finish(ExecutionStatus::Succeeded, Some(0), None, None);
    assert_eq!(result.status, ExecutionStatus::Succeeded);
    // `finish` consumes the lifecycle, so a second terminal transition does
    // not compile.
}

#[rstest]
fn tail_buffer_keeps_only_the_newest_lines() {
    let mut tail = TailBuffer::new(3);
    for line in ["one", "two", "three", "four"] {
        tail.push(line);
    }
    assert_eq!(tail.into_tail().as_deref(), Some("two\nthree\nfour"));
}

#[rstest]
fn tail_buffer_empty_yields_none() {
    let tail = TailBuffer::new(3);
    assert!(tail.into_tail().is_none());
}

#[rstest]
fn tail_buffer_zero_limit_retains_nothing() {
    let mut tail = TailBuffer::new(0);
    for line in ["one", "two", "three"] {
        tail.push(line);
    }
    assert!(tail.into_tail().is_none());
}

struct FailingReader;

impl tokio::io::AsyncRead for FailingReader {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        _buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe)))
    }
}

#[tokio::test]
async fn stream_read_error_is_treated_as_end_of_stream() {
    use tokio::io::AsyncBufReadExt;

    let mut lines = tokio::io::BufReader::new(FailingReader).lines();
    assert!(subprocess::next(&mut lines).await.is_none());
}
