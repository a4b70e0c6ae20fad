pub mod json;
pub mod projector;
pub mod types;
pub mod yaml;

use anyhow::Result;
use std::path::Path;

pub use projector::{materialize, project, repair};
pub use types::*;

/// Build the iteration report for an executed test case
pub fn build_report(case: &ExecutedCase) -> IterationReport {
    let rows = project(&case.steps);
    log::debug!(
        "Projected {} executed steps of test case {} into {} rows",
        case.steps.len(),
        case.test_case_id,
        rows.len()
    );
    IterationReport::new(&case.test_case_id, rows)
}

/// Generate report from executed steps
pub async fn generate_report(
    results_path: &Path,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    let results = tokio::fs::read_to_string(results_path).await?;
    let case: ExecutedCase = serde_json::from_str(&results)?;
    let report = build_report(&case);

    match format {
        "json" => json::generate(&report, output).await,
        "yaml" => yaml::generate(&report, output).await,
        _ => anyhow::bail!("Unknown format: {}", format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::types::FlatStep;
    use chrono::Utc;

    #[test]
    fn test_build_report_marks_failures() {
        let now = Utc::now();
        let case = ExecutedCase {
            test_case_id: "42".to_string(),
            steps: vec![
                ExecutedStep::new(
                    FlatStep {
                        action_path: "00000001".to_string(),
                        step_identifier: "1".to_string(),
                        action: "Open".to_string(),
                        expected_results: vec![],
                        group_context: None,
                    },
                    Some(ExecutionOutcome::failed("Timeout", now, now)),
                ),
            ],
        };

        let report = build_report(&case);
        assert_eq!(report.test_case_id, "42");
        assert!(!report.passed);
        assert_eq!(report.rows.len(), 1);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains(r#""actionPath":"00000001""#));
        assert!(json.contains(r#""stepIdentifier":"1""#));
        assert!(!json.contains("groupModel"));
    }

    #[test]
    fn test_executed_case_reads_flattened_steps() {
        let json = r#"{
            "testCaseId": "7",
            "steps": [
                {
                    "actionPath": "000000020000000a",
                    "stepIdentifier": "2;a",
                    "action": "Login",
                    "groupContext": {
                        "groupId": 500,
                        "groupRevision": 3,
                        "groupPlacementId": 2,
                        "groupPathPrefix": "00000002"
                    },
                    "outcome": {
                        "passed": true,
                        "reasonPhrase": "Passed",
                        "durationMs": 12.5,
                        "startedAt": "2024-05-01T12:00:00Z",
                        "completedAt": "2024-05-01T12:00:00.0125Z"
                    }
                },
                { "actionPath": "00000003", "stepIdentifier": "3", "action": "Skipped" }
            ]
        }"#;

        let case: ExecutedCase = serde_json::from_str(json).unwrap();
        assert_eq!(case.steps.len(), 2);
        assert!(case.steps[1].outcome.is_none());

        let report = build_report(&case);
        let paths: Vec<&str> = report.rows.iter().map(|r| r.action_path.as_str()).collect();
        assert_eq!(paths, vec!["00000002", "000000020000000a"]);
        assert_eq!(
            report.rows[0].group_model,
            Some(GroupModel {
                group_id: 500,
                revision: 3
            })
        );
    }

    #[tokio::test]
    async fn test_pull_then_push_round_trip() {
        use crate::expander::{FnResolver, StepExpander, TestCaseSource};
        use crate::expander::types::SharedGroup;
        use crate::utils::config::Config;
        use std::sync::Arc;

        let resolver = FnResolver::new(|_| {
            Ok(SharedGroup {
                markup: r#"<steps><step id="10"/><step id="11"/></steps>"#.to_string(),
                revision: 9,
            })
        });
        let expander = StepExpander::new(Arc::new(resolver), Config::default());
        let case = expander
            .pull(&TestCaseSource {
                id: "1001".to_string(),
                title: "Checkout".to_string(),
                markup: r#"<steps><step id="1"/><compref id="2" ref="500"/></steps>"#.to_string(),
            })
            .await
            .unwrap();

        let now = Utc::now();
        let executed = ExecutedCase {
            test_case_id: case.id.clone(),
            steps: case
                .steps
                .into_iter()
                .map(|s| ExecutedStep::new(s, Some(ExecutionOutcome::passed(now, now))))
                .collect(),
        };
        let report = build_report(&executed);

        let rows: Vec<(&str, &str)> = report
            .rows
            .iter()
            .map(|r| (r.action_path.as_str(), r.step_identifier.as_str()))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("00000001", "1"),
                ("00000002", "2"),
                ("000000020000000a", "2;a"),
                ("000000020000000b", "2;b"),
            ]
        );
        assert_eq!(
            report.rows[1].group_model,
            Some(GroupModel {
                group_id: 500,
                revision: 9
            })
        );
        assert!(report.passed);
    }
}
