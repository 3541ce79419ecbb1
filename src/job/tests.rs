//! Unit tests for job configuration validation.

use super::*;
use rstest::rstest;

fn minimal_builder() -> JobConfigBuilder {
    JobConfig::builder().script("echo.py")
}

#[rstest]
fn build_rejects_blank_script() {
    let error = JobConfig::builder()
        .script("   ")
        .build()
        .expect_err("blank script should fail");
    assert_eq!(error, ConfigError::Validation(String::from("script")));
}

#[rstest]
fn build_accepts_minimal_config() {
    let config = minimal_builder().build().expect("config should build");
    assert_eq!(config.script, Utf8PathBuf::from("echo.py"));
    assert!(config.working_directory.is_none());
    assert!(config.timeout.is_none());
    assert!(config.file_requirements.is_empty());
    assert!(config.file_outputs.is_empty());
}

#[rstest]
fn requirements_default_to_required() {
    let requirement = FileRequirement::new("/tmp/a.txt", "a.txt");
    assert!(requirement.required);
    assert!(!requirement.optional().required);

    let output = FileOutput::new("out.csv", "/tmp/out.csv");
    assert!(output.required);
    assert!(!output.optional().required);
}

#[rstest]
fn build_rejects_duplicate_destinations() {
    let error = minimal_builder()
        .requirement(FileRequirement::new("/tmp/a.txt", "data/input.txt"))
        .requirement(FileRequirement::new("s3://bucket/b.txt", "data/input.txt"))
        .build()
        .expect_err("duplicate destinations should fail");
    assert_eq!(
        error,
        ConfigError::DuplicateDestination {
            destination: Utf8PathBuf::from("data/input.txt"),
        }
    );
}

#[rstest]
fn build_rejects_absolute_requirement_destination() {
    let error = minimal_builder()
        .requirement(FileRequirement::new("/tmp/a.txt", "/abs/a.txt"))
        .build()
        .expect_err("absolute destination should fail");
    assert_eq!(
        error,
        ConfigError::AbsoluteDestination {
            destination: Utf8PathBuf::from("/abs/a.txt"),
        }
    );
}

#[rstest]
fn build_rejects_absolute_output_source() {
    let error = minimal_builder()
        .output(FileOutput::new("/abs/out.csv", "/tmp/out.csv"))
        .build()
        .expect_err("absolute output source should fail");
    assert_eq!(
        error,
        ConfigError::AbsoluteDestination {
            destination: Utf8PathBuf::from("/abs/out.csv"),
        }
    );
}

#[rstest]
#[case::requirement_source("requirement source", "  ", "a.txt")]
#[case::requirement_destination("requirement destination", "/tmp/a.txt", "  ")]
fn build_rejects_blank_requirement_fields(
    #[case] expected_field: &str,
    #[case] source: &str,
    #[case] destination: &str,
) {
    let error = minimal_builder()
        .requirement(FileRequirement::new(source, destination))
        .build()
        .expect_err("blank field should fail");
    assert_eq!(error, ConfigError::Validation(expected_field.to_owned()));
}

#[rstest]
fn builder_collects_environment_and_metadata() {
    let config = minimal_builder()
        .env("MODE", "test")
        .env("RETRIES", "3")
        .metadata("job_name", serde_json::json!("nightly"))
        .build()
        .expect("config should build");
    assert_eq!(
        config.environment.get("MODE").map(String::as_str),
        Some("test")
    );
    assert_eq!(config.environment.len(), 2);
    assert_eq!(
        config.metadata.get("job_name"),
        Some(&serde_json::json!("nightly"))
    );
}

#[rstest]
fn errored_result_carries_detail() {
    let result = ExecutionResult::errored("required file missing: a.txt", Duration::ZERO);
    assert_eq!(result.status, ExecutionStatus::Errored);
    assert!(!result.is_success());
    assert_eq!(
        result.error_detail.as_deref(),
        Some("required file missing: a.txt")
    );
}

#[rstest]
fn status_serialises_snake_case() {
    let json = serde_json::to_string(&ExecutionStatus::TimedOut).expect("status should serialise");
    assert_eq!(json, "\"timed_out\"");
    assert_eq!(ExecutionStatus::TimedOut.to_string(), "timed_out");
}
