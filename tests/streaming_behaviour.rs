//! Behavioural coverage for the streaming run mode and its agreement with
//! the blocking mode.

#[path = "common/job_fixtures.rs"]
mod job_fixtures;

use stagehand::{
    ExecutionStatus, JobConfig, JobEvent, LogLevel,
};

use job_fixtures::{shell_orchestrator, utf8_temp_dir, write_script};

async fn drain(
    mut stream: stagehand::JobEventStream,
) -> (Vec<stagehand::LogRecord>, stagehand::ExecutionResult) {
    let mut records = Vec::new();
    let mut completion = None;
    while let Some(event) = stream.next().await {
        match event {
            JobEvent::Log(record) => records.push(record),
            JobEvent::Completed(result) => completion = Some(result),
        }
    }
    (
        records,
        completion.expect("stream should end with a completion"),
    )
}

#[tokio::test]
async fn stream_relays_levels_and_terminates_with_completion() {
    let sources = tempfile::tempdir().expect("source dir should create");
    let source_root = utf8_temp_dir(&sources);
    let script = write_script(
        &source_root,
        "mixed.sh",
        "echo progress\necho warning-ish >&2\necho done\n",
    );

    let (orchestrator, _sink) = shell_orchestrator();
    let config = JobConfig::builder()
        .script(script)
        .build()
        .expect("config should build");

    let stream = orchestrator
        .run_streaming(config)
        .expect("stream should start");
    let (records, result) = drain(stream).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    let stdout_lines: Vec<_> = records
        .iter()
        .filter(|record| record.level == LogLevel::Info)
        .map(|record| record.message.as_str())
        .collect();
    assert_eq!(stdout_lines, vec!["progress", "done"]);
    let stderr_lines: Vec<_> = records
        .iter()
        .filter(|record| record.level == LogLevel::Error)
        .map(|record| record.message.as_str())
        .collect();
    assert_eq!(stderr_lines, vec!["warning-ish"]);
}

#[tokio::test]
async fn streaming_and_blocking_report_the_same_outcome() {
    let sources = tempfile::tempdir().expect("source dir should create");
    let source_root = utf8_temp_dir(&sources);
    let script = write_script(&source_root, "fail.sh", "echo attempt\nexit 5\n");

    let (orchestrator, _sink) = shell_orchestrator();
    let config = JobConfig::builder()
        .script(script)
        .build()
        .expect("config should build");

    let blocking = orchestrator
        .run(config.clone())
        .await
        .expect("run should start");
    let stream = orchestrator
        .run_streaming(config)
        .expect("stream should start");
    let (_, streamed) = drain(stream).await;

    assert_eq!(blocking.status, ExecutionStatus::Failed);
    assert_eq!(streamed.status, blocking.status);
    assert_eq!(streamed.exit_code, blocking.exit_code);
}

#[tokio::test]
async fn lifecycle_records_reach_the_sink_but_not_the_stream() {
    let sources = tempfile::tempdir().expect("source dir should create");
    let source_root = utf8_temp_dir(&sources);
    let script = write_script(&source_root, "three.sh", "echo one\necho two\necho three\n");

    let (orchestrator, sink) = shell_orchestrator();
    let config = JobConfig::builder()
        .script(script)
        .build()
        .expect("config should build");

    let stream = orchestrator
        .run_streaming(config)
        .expect("stream should start");
    let (records, result) = drain(stream).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    let streamed: Vec<_> = records
        .iter()
        .map(|record| record.message.as_str())
        .collect();
    assert_eq!(
        streamed,
        vec!["one", "two", "three"],
        "the stream carries relayed script output only"
    );

    let lifecycle: Vec<_> = sink
        .records()
        .into_iter()
        .filter(|record| record.metadata.is_some())
        .map(|record| record.message)
        .collect();
    assert!(
        lifecycle.first().is_some_and(|m| m.starts_with("job started")),
        "first lifecycle record should announce the start: {lifecycle:?}"
    );
    assert!(
        lifecycle.last().is_some_and(|m| m.starts_with("job finished")),
        "last lifecycle record should announce the finish: {lifecycle:?}"
    );
}
