use crate::expander::types::FlatStep;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of running one step, attached by the execution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub passed: bool,
    #[serde(default)]
    pub reason_phrase: String,
    #[serde(default)]
    pub duration_ms: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionOutcome {
    pub fn passed(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> Self {
        Self::new(true, "Passed", started_at, completed_at)
    }

    pub fn failed(reason: &str, started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> Self {
        Self::new(false, reason, started_at, completed_at)
    }

    fn new(
        passed: bool,
        reason: &str,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let duration_ms = (completed_at - started_at).num_microseconds().unwrap_or(0) as f64 / 1000.0;
        Self {
            passed,
            reason_phrase: reason.to_string(),
            duration_ms,
            started_at,
            completed_at,
        }
    }
}

/// A flat step together with its outcome, if it ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedStep {
    #[serde(flatten)]
    pub step: FlatStep,
    #[serde(default)]
    pub outcome: Option<ExecutionOutcome>,
}

impl ExecutedStep {
    pub fn new(step: FlatStep, outcome: Option<ExecutionOutcome>) -> Self {
        Self { step, outcome }
    }
}

/// Shared-step group a header row stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupModel {
    pub group_id: u32,
    pub revision: u32,
}

/// One reported entry of an iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
    pub action_path: String,
    pub step_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ExecutionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_model: Option<GroupModel>,
}

impl ResultRow {
    pub fn is_header(&self) -> bool {
        self.group_model.is_some()
    }
}

/// Payload handed to the ALM result submission for one iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationReport {
    pub session_id: String,
    pub test_case_id: String,
    pub passed: bool,
    pub rows: Vec<ResultRow>,
    pub generated_at: String,
}

impl IterationReport {
    pub fn new(test_case_id: &str, rows: Vec<ResultRow>) -> Self {
        let passed = rows
            .iter()
            .filter_map(|r| r.outcome.as_ref())
            .all(|o| o.passed);
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            test_case_id: test_case_id.to_string(),
            passed,
            rows,
            generated_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Executed steps of one test case, as produced by the execution engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedCase {
    pub test_case_id: String,
    pub steps: Vec<ExecutedStep>,
}
