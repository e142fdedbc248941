use std::sync::Arc;

use datasquad_core::fakes::{ScriptStep, ScriptedModelClient};
use datasquad_core::{
    read_run_record, write_rejected_candidate, write_run_artifacts, Agent, BudgetConfig,
    ModelError, OrchestrationError, Orchestrator, PipelineOutcome, PipelineSpec, RetryConfig,
    RuleSet, SquadError, TargetPlatform, ValidationGate,
};
use tempfile::tempdir;

const COMPLIANT: &str = "Here is the script.\n```python
schema = StructType([StructField('event_timestamp', TimestampType(), True)])
df = spark.read.schema(schema).json(src)
df = df.withColumn('event_date', to_date(col('event_timestamp')))
df.write.partitionBy('event_date').parquet(dst)
```";

async fn outcome_with_one_failed_target() -> PipelineOutcome {
    let architect = Arc::new(ScriptedModelClient::replies([COMPLIANT]));
    let glue = Arc::new(ScriptedModelClient::replies(["resource \"aws_glue_job\" {}"]));
    let azure = Arc::new(ScriptedModelClient::always(ScriptStep::Fail(
        ModelError::Rejected("400".into()),
    )));

    Orchestrator::new(
        Agent::architect(architect),
        ValidationGate::new(RuleSet::standard().unwrap()),
        BudgetConfig::default(),
    )
    .with_retry(RetryConfig::fast())
    .with_translator(TargetPlatform::AwsGlue, Agent::cloud_architect(glue))
    .with_translator(TargetPlatform::AzureDatabricks, Agent::cloud_architect(azure))
    .run_pipeline_request(&PipelineSpec::new("shipping logs"), 2)
    .await
    .unwrap()
}

#[tokio::test]
async fn run_artifacts_are_written_and_verified() {
    let outcome = outcome_with_one_failed_target().await;
    let dir = tempdir().unwrap();

    let run_dir = write_run_artifacts(&outcome, dir.path()).unwrap();
    assert_eq!(run_dir, dir.path().join(&outcome.request_id));

    let pipeline = std::fs::read_to_string(run_dir.join("pipeline.py")).unwrap();
    assert!(pipeline.starts_with("# Review status: APPROVED"));
    assert!(pipeline.contains("partitionBy('event_date')"));
    assert!(!pipeline.contains("```"), "fences are stripped");

    assert!(run_dir.join("infra_aws_glue.txt").exists());
    assert!(!run_dir.join("infra_azure_databricks.txt").exists());

    let transcript = std::fs::read_to_string(run_dir.join("transcript.txt")).unwrap();
    assert!(transcript.contains("#1 architect"));
    assert!(transcript.contains("#2 cloud_architect"));

    let record = read_run_record(&outcome.request_id, dir.path()).unwrap();
    assert_eq!(record.request_id, outcome.request_id);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.logic_artifact_id, outcome.logic.artifact().id);
    assert_eq!(record.targets.len(), 2);
    assert!(record.targets[0].succeeded);
    assert!(!record.targets[1].succeeded);
    assert!(record.targets[1].failure.is_some());
}

#[tokio::test]
async fn tampered_run_record_is_rejected() {
    let outcome = outcome_with_one_failed_target().await;
    let dir = tempdir().unwrap();
    let run_dir = write_run_artifacts(&outcome, dir.path()).unwrap();

    let path = run_dir.join("run.json");
    let tampered = std::fs::read_to_string(&path)
        .unwrap()
        .replace("\"attempts\": 1", "\"attempts\": 9");
    std::fs::write(&path, tampered).unwrap();

    let err = read_run_record(&outcome.request_id, dir.path()).unwrap_err();
    assert!(matches!(err, SquadError::DigestMismatch { .. }));
}

#[tokio::test]
async fn exhausted_candidate_can_be_saved_for_review() {
    let architect = Arc::new(ScriptedModelClient::always(ScriptStep::Reply(
        "df = spark.read.json(src)\ndf.write.parquet(dst)".to_string(),
    )));
    let err = Orchestrator::new(
        Agent::architect(architect),
        ValidationGate::new(RuleSet::standard().unwrap()),
        BudgetConfig::default(),
    )
    .run_pipeline_request(&PipelineSpec::new("t"), 1)
    .await
    .unwrap_err();

    let OrchestrationError::ValidationExhausted {
        last_verdict,
        last_candidate,
        ..
    } = err
    else {
        panic!("expected ValidationExhausted");
    };

    let dir = tempdir().unwrap();
    let path = write_rejected_candidate("req-review", &last_candidate, &last_verdict, dir.path())
        .unwrap();
    let text = std::fs::read_to_string(path).unwrap();
    assert!(text.contains("REJECTED"));
    assert!(text.contains("[partitioning_present]"));
    assert!(text.contains("spark.read.json(src)"));
}
