//! Shared fixtures for the behavioural suites.
//!
//! Integration tests are compiled as separate crates (one per top-level file
//! in `tests/`). Placing shared helpers under `tests/common/` avoids creating
//! an additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/job_fixtures.rs"]
//! mod job_fixtures;
//! ```

use std::sync::Arc;

use camino::Utf8PathBuf;
use stagehand::test_support::RecordingSink;
use stagehand::{
    FileStagingCoordinator, JobOrchestrator, LogSink, ProviderRouter, SubprocessExecutor,
};

/// Converts a temporary directory handle into a UTF-8 path.
pub fn utf8_temp_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("temp dir should be UTF-8")
}

/// Writes a shell script into `root` and returns its path.
pub fn write_script(root: &Utf8PathBuf, name: &str, body: &str) -> Utf8PathBuf {
    let path = root.join(name);
    std::fs::write(&path, body).expect("script should write");
    path
}

/// Builds an orchestrator running scripts under `sh`, recording every log
/// record for later assertion.
pub fn shell_orchestrator() -> (JobOrchestrator<SubprocessExecutor>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let orchestrator = JobOrchestrator::new(
        SubprocessExecutor::with_interpreter("sh"),
        FileStagingCoordinator::new(ProviderRouter::with_defaults()),
        Arc::clone(&sink) as Arc<dyn LogSink>,
    );
    (orchestrator, sink)
}
