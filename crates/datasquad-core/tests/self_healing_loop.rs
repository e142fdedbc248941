//! End-to-end request lifecycle against scripted model backends.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use datasquad_core::fakes::{ScriptStep, ScriptedModelClient};
use datasquad_core::{
    Agent, ArtifactKind, AuditEvent, BudgetConfig, CancellationHandle, ModelError,
    OrchestrationError, Orchestrator, PipelineSpec, RequestStage, RetryConfig, RuleId, RuleSet,
    SquadConfig, TargetPlatform, TurnRole, UsageMeter, ValidationGate,
};

const COMPLIANT: &str = "```python
from pyspark.sql.types import StructType, StructField, StringType, TimestampType
schema = StructType([StructField(\"event_timestamp\", TimestampType(), True)])
df = spark.read.schema(schema).json(src)
df = df.withColumn(\"event_date\", to_date(col(\"event_timestamp\")))
df.write.partitionBy(\"event_date\").parquet(dst)
```";

const MISSING_SCHEMA: &str = "```python
df = spark.read.json(src)
df = df.withColumn(\"event_date\", to_date(col(\"event_timestamp\")))
df.write.partitionBy(\"event_date\").parquet(dst)
```";

const GLUE_TF: &str = "resource \"aws_glue_job\" \"pipeline\" { worker_type = \"G.2X\" }";
const AZURE_YAML: &str = "trigger:\n  - main\njobs:\n  - job: deploy";

fn spec() -> PipelineSpec {
    PipelineSpec::new("Process shipping logs into a partitioned parquet table")
        .with_field("shipment_id", "string")
        .with_field("event_timestamp", "timestamp")
}

fn orchestrator(architect: Arc<ScriptedModelClient>) -> Orchestrator {
    Orchestrator::new(
        Agent::architect(architect),
        ValidationGate::new(RuleSet::standard().unwrap()),
        BudgetConfig::default(),
    )
    .with_retry(RetryConfig::fast())
}

#[tokio::test(start_paused = true)]
async fn schema_violation_is_fixed_on_second_attempt() {
    let architect = Arc::new(ScriptedModelClient::replies([MISSING_SCHEMA, COMPLIANT]));
    let glue = Arc::new(ScriptedModelClient::replies([GLUE_TF]));
    let azure = Arc::new(ScriptedModelClient::replies([AZURE_YAML]));

    let orch = orchestrator(architect.clone())
        .with_translator(TargetPlatform::AwsGlue, Agent::cloud_architect(glue))
        .with_translator(TargetPlatform::AzureDatabricks, Agent::cloud_architect(azure));

    let outcome = orch.run_pipeline_request(&spec(), 3).await.unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.verdicts.len(), 2);
    assert_eq!(
        outcome.verdicts[0].violated_rules,
        BTreeSet::from([RuleId::ExplicitSchema])
    );
    assert!(outcome.verdicts[1].passed);
    assert!(outcome.logic.artifact().content.contains("StructType"));

    // The second generation saw the rejection.
    let requests = architect.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1]
        .context
        .iter()
        .any(|t| t.role() == TurnRole::Validator && t.content().contains("[explicit_schema]")));
    assert!(requests[1].task.contains("Fix these specific issues"));

    let roles: Vec<TurnRole> = outcome.transcript.iter().map(|t| t.role()).collect();
    assert_eq!(
        roles,
        vec![
            TurnRole::Architect,
            TurnRole::Validator,
            TurnRole::Architect,
            TurnRole::CloudArchitect,
            TurnRole::CloudArchitect,
        ]
    );

    let artifacts: Vec<_> = outcome.artifacts().collect();
    assert_eq!(artifacts.len(), 2);
    assert!(artifacts.iter().all(|a| a.kind == ArtifactKind::CloudIac));
    assert_eq!(
        outcome
            .translation_for(TargetPlatform::AwsGlue)
            .and_then(|t| t.artifact())
            .map(|a| a.content.as_str()),
        Some(GLUE_TF)
    );
    assert_eq!(outcome.audit.gate_evaluations(), 2);
}

#[tokio::test(start_paused = true)]
async fn persistent_violation_exhausts_after_max_attempts() {
    let architect = Arc::new(ScriptedModelClient::always(ScriptStep::Reply(
        MISSING_SCHEMA.to_string(),
    )));
    let cloud = Arc::new(ScriptedModelClient::replies([GLUE_TF]));
    let orch = orchestrator(architect.clone())
        .with_translator(TargetPlatform::AwsGlue, Agent::cloud_architect(cloud.clone()));

    let err = orch.run_pipeline_request(&spec(), 3).await.unwrap_err();

    match err {
        OrchestrationError::ValidationExhausted {
            attempts,
            last_verdict,
            last_candidate,
            audit,
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(
                last_verdict.violated_rules,
                BTreeSet::from([RuleId::ExplicitSchema])
            );
            assert_eq!(last_candidate.kind, ArtifactKind::PipelineLogic);
            assert_eq!(audit.gate_evaluations(), 3);
        }
        other => panic!("expected ValidationExhausted, got {other:?}"),
    }
    assert_eq!(architect.calls(), 3);
    assert_eq!(cloud.calls(), 0, "no translation without approval");
}

#[tokio::test(start_paused = true)]
async fn one_unavailable_target_does_not_sink_the_other() {
    let architect = Arc::new(ScriptedModelClient::replies([COMPLIANT]));
    let glue = Arc::new(ScriptedModelClient::replies([GLUE_TF]));
    let azure = Arc::new(ScriptedModelClient::always(ScriptStep::Fail(
        ModelError::Unavailable("503 service unavailable".into()),
    )));

    let orch = orchestrator(architect)
        .with_translator(TargetPlatform::AwsGlue, Agent::cloud_architect(glue))
        .with_translator(TargetPlatform::AzureDatabricks, Agent::cloud_architect(azure.clone()));

    let outcome = orch.run_pipeline_request(&spec(), 3).await.unwrap();

    assert_eq!(outcome.artifacts().count(), 1);
    let failures: Vec<_> = outcome.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].target, TargetPlatform::AzureDatabricks);
    assert_eq!(failures[0].attempts, RetryConfig::fast().max_retries + 1);
    assert_eq!(azure.calls() as u32, RetryConfig::fast().max_retries + 1);
    assert!(outcome
        .audit
        .entries()
        .iter()
        .any(|e| matches!(e.event, AuditEvent::TranslationFailed { target: TargetPlatform::AzureDatabricks, .. })));
}

#[tokio::test(start_paused = true)]
async fn every_target_failing_returns_the_approved_logic() {
    let architect = Arc::new(ScriptedModelClient::replies([COMPLIANT]));
    let down = Arc::new(ScriptedModelClient::always(ScriptStep::Fail(
        ModelError::Rejected("400 bad request".into()),
    )));
    let orch = orchestrator(architect)
        .with_translator(TargetPlatform::AwsGlue, Agent::cloud_architect(down.clone()))
        .with_translator(TargetPlatform::AzureDatabricks, Agent::cloud_architect(down));

    match orch.run_pipeline_request(&spec(), 3).await.unwrap_err() {
        OrchestrationError::TranslationFailed {
            failures, logic, ..
        } => {
            let targets: Vec<_> = failures.iter().map(|f| f.target).collect();
            assert_eq!(targets, TargetPlatform::all());
            assert!(logic.content.contains("partitionBy"));
        }
        other => panic!("expected TranslationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn exhausted_daily_budget_refuses_without_model_calls() {
    let architect = Arc::new(ScriptedModelClient::replies([COMPLIANT]));
    let meter = UsageMeter::new();
    meter.charge(1_000);

    let orch = Orchestrator::new(
        Agent::architect(architect.clone()),
        ValidationGate::new(RuleSet::standard().unwrap()),
        BudgetConfig {
            daily_token_limit: 1_000,
            ..BudgetConfig::default()
        },
    )
    .with_meter(meter);

    let err = orch.run_pipeline_request(&spec(), 3).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::BudgetExceeded {
            used: 1_000,
            limit: 1_000,
            attempts: 0,
            last_verdict: None,
            ..
        }
    ));
    assert_eq!(architect.calls(), 0);
}

#[tokio::test]
async fn budget_takes_precedence_over_remaining_attempts() {
    let architect = Arc::new(ScriptedModelClient::always(ScriptStep::ReplyWithTokens(
        MISSING_SCHEMA.to_string(),
        500,
    )));
    let orch = Orchestrator::new(
        Agent::architect(architect.clone()),
        ValidationGate::new(RuleSet::standard().unwrap()),
        BudgetConfig {
            daily_token_limit: 400,
            ..BudgetConfig::default()
        },
    );

    let err = orch.run_pipeline_request(&spec(), 5).await.unwrap_err();
    assert_eq!(err.attempts(), Some(1));
    match err {
        OrchestrationError::BudgetExceeded {
            limit,
            last_verdict,
            last_candidate,
            audit,
            ..
        } => {
            assert_eq!(limit, 400);
            let verdict = last_verdict.expect("rejected attempt is kept");
            assert_eq!(verdict.violated_rules, BTreeSet::from([RuleId::ExplicitSchema]));
            assert!(last_candidate.is_some_and(|c| c.content.contains("spark.read.json")));
            assert_eq!(audit.gate_evaluations(), 1);
            assert!(audit
                .entries()
                .iter()
                .any(|e| matches!(e.event, AuditEvent::BudgetRefused { limit: 400, .. })));
        }
        other => panic!("expected BudgetExceeded, got {other:?}"),
    }
    assert_eq!(architect.calls(), 1);
    assert!(orch.daily_usage() >= 500);
}

#[tokio::test]
async fn budget_crossed_by_approval_fails_each_translation() {
    let architect = Arc::new(ScriptedModelClient::new([ScriptStep::ReplyWithTokens(
        COMPLIANT.to_string(),
        500,
    )]));
    let cloud = Arc::new(ScriptedModelClient::always(ScriptStep::Reply(
        GLUE_TF.to_string(),
    )));
    let orch = Orchestrator::new(
        Agent::architect(architect),
        ValidationGate::new(RuleSet::standard().unwrap()),
        BudgetConfig {
            daily_token_limit: 400,
            ..BudgetConfig::default()
        },
    )
    .with_translator(TargetPlatform::AwsGlue, Agent::cloud_architect(cloud.clone()))
    .with_translator(TargetPlatform::AzureDatabricks, Agent::cloud_architect(cloud.clone()));

    match orch.run_pipeline_request(&spec(), 3).await.unwrap_err() {
        OrchestrationError::TranslationFailed {
            failures,
            attempts,
            audit,
            ..
        } => {
            assert_eq!(attempts, 1);
            assert_eq!(failures.len(), 2);
            for failure in &failures {
                assert!(
                    failure.reason.starts_with("daily token budget exhausted"),
                    "unexpected reason: {}",
                    failure.reason
                );
                assert_eq!(failure.attempts, 0);
            }
            let refusals = audit
                .entries()
                .iter()
                .filter(|e| matches!(e.event, AuditEvent::BudgetRefused { .. }))
                .count();
            assert_eq!(refusals, 2);
        }
        other => panic!("expected TranslationFailed, got {other:?}"),
    }
    assert_eq!(cloud.calls(), 0);
}

#[tokio::test]
async fn blank_reply_is_regenerated_like_a_rejection() {
    let architect = Arc::new(ScriptedModelClient::replies(["", COMPLIANT]));
    let orch = orchestrator(architect.clone());

    let outcome = orch.run_pipeline_request(&spec(), 3).await.unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(architect.calls(), 2);
    assert!(!outcome.verdicts[0].passed);
    assert_eq!(outcome.verdicts[0].violated_rules.len(), 3);
    assert!(outcome.verdicts[1].passed);
    assert!(architect.requests()[1]
        .task
        .contains("empty reply, output the full script"));
}

#[tokio::test]
async fn blank_replies_exhaust_attempts() {
    let architect = Arc::new(ScriptedModelClient::always(ScriptStep::Reply(
        "   ".to_string(),
    )));

    let err = orchestrator(architect.clone())
        .run_pipeline_request(&spec(), 2)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestrationError::ValidationExhausted { attempts: 2, .. }
    ));
    assert_eq!(architect.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_architect_failures_are_retried_then_surface() {
    let architect = Arc::new(ScriptedModelClient::always(ScriptStep::Fail(
        ModelError::RateLimited("429 quota".into()),
    )));
    let err = orchestrator(architect.clone())
        .run_pipeline_request(&spec(), 3)
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    match err {
        OrchestrationError::GenerationUnavailable {
            attempts,
            calls,
            reason,
            ..
        } => {
            assert_eq!(attempts, 0);
            assert_eq!(calls, RetryConfig::fast().max_retries + 1);
            assert_eq!(reason, ModelError::RateLimited("429 quota".into()));
        }
        other => panic!("expected GenerationUnavailable, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_generation_in_flight() {
    let architect = Arc::new(ScriptedModelClient::always(ScriptStep::Hang));
    let orch = orchestrator(architect).with_retry(RetryConfig::default());
    let cancel = CancellationHandle::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = orch
        .run_pipeline_request_with_cancel(&spec(), 3, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::Cancelled {
            stage: RequestStage::Generation,
            attempts: 0
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_translation_yields_no_outcome() {
    let architect = Arc::new(ScriptedModelClient::replies([COMPLIANT]));
    let hanging = Arc::new(ScriptedModelClient::always(ScriptStep::Hang));
    let orch = orchestrator(architect)
        .with_retry(RetryConfig::default())
        .with_translator(TargetPlatform::AwsGlue, Agent::cloud_architect(hanging));
    let cancel = CancellationHandle::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = orch
        .run_pipeline_request_with_cancel(&spec(), 3, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::Cancelled {
            stage: RequestStage::Translation,
            attempts: 1
        }
    ));
}

#[tokio::test]
async fn concurrent_requests_share_only_the_meter() {
    let architect = Arc::new(ScriptedModelClient::always(ScriptStep::ReplyWithTokens(
        COMPLIANT.to_string(),
        40,
    )));
    let meter = UsageMeter::new();
    let orch = orchestrator(architect).with_meter(meter.clone());

    let first_spec = spec();
    let second_spec = PipelineSpec::new("Aggregate clickstream sessions");
    let (a, b) = tokio::join!(
        orch.run_pipeline_request(&first_spec, 2),
        orch.run_pipeline_request(&second_spec, 2),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.request_id, b.request_id);
    assert_eq!(a.transcript.len(), 1);
    assert_eq!(b.transcript.len(), 1);
    assert_eq!(meter.used(), a.tokens_charged + b.tokens_charged);
}

#[tokio::test]
async fn orchestrator_builds_from_config() {
    let config = SquadConfig::from_toml_str(
        r#"
targets = ["azure_databricks"]

[budget]
max_validation_attempts = 2
"#,
    )
    .unwrap();
    let architect = Arc::new(ScriptedModelClient::replies([COMPLIANT]));
    let cloud = Arc::new(ScriptedModelClient::replies([AZURE_YAML]));

    let orch = Orchestrator::from_config(&config, architect, cloud).unwrap();
    assert_eq!(orch.targets(), vec![TargetPlatform::AzureDatabricks]);

    let outcome = orch.run(&spec()).await.unwrap();
    assert_eq!(outcome.translations.len(), 1);
    assert_eq!(
        outcome.translations[0].artifact().map(|a| a.target),
        Some(Some(TargetPlatform::AzureDatabricks))
    );
}
