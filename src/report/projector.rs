//! Projection of executed flat steps into grouped result rows.
//!
//! The step tree is gone by the time results are pushed, so grouping is
//! recovered from the path conventions alone: a 16-char path belongs to the
//! group placement named by its first 8 chars.

use super::types::{ExecutedStep, ExecutionOutcome, GroupModel, ResultRow};
use crate::codec::action_path::{group_prefix_of, identifier_head, is_member_path, LEAF_PATH_LEN};
use std::collections::{HashMap, HashSet};

/// Project executed steps into result rows: one detail row per executed
/// step plus one header row per group placement with executed members.
pub fn project(steps: &[ExecutedStep]) -> Vec<ResultRow> {
    repair(materialize(steps))
}

/// First pass: detail rows, with an unrepaired header in front of the first
/// executed member of each group placement.
pub fn materialize(steps: &[ExecutedStep]) -> Vec<ResultRow> {
    let mut rows = Vec::with_capacity(steps.len());
    let mut seen: HashSet<(u32, &str)> = HashSet::new();

    for executed in steps {
        let Some(outcome) = &executed.outcome else {
            continue;
        };
        let step = &executed.step;

        if let Some(ctx) = &step.group_context {
            if seen.insert((ctx.group_id, ctx.group_path_prefix.as_str())) {
                rows.push(ResultRow {
                    action_path: step.action_path.clone(),
                    step_identifier: step.step_identifier.clone(),
                    outcome: Some(outcome.clone()),
                    group_model: Some(GroupModel {
                        group_id: ctx.group_id,
                        revision: ctx.group_revision,
                    }),
                });
            }
        }

        rows.push(ResultRow {
            action_path: step.action_path.clone(),
            step_identifier: step.step_identifier.clone(),
            outcome: Some(outcome.clone()),
            group_model: None,
        });
    }

    rows
}

/// Second pass: collapse every header to its placement and emit it ahead
/// of its members. Idempotent on already repaired rows.
pub fn repair(rows: Vec<ResultRow>) -> Vec<ResultRow> {
    if !rows.iter().any(ResultRow::is_header) {
        return rows;
    }

    // Prefix -> index of the header row
    let mut headers: HashMap<String, usize> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        if row.is_header() {
            if let Some(prefix) = group_prefix_of(&row.action_path) {
                headers.entry(prefix.to_string()).or_insert(i);
            }
        }
    }

    // Prefix -> member row indices in original order
    let mut members: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut grouped: Vec<Option<&str>> = vec![None; rows.len()];
    for (i, row) in rows.iter().enumerate() {
        let Some(prefix) = group_prefix_of(&row.action_path) else {
            continue;
        };
        let Some((key, &header)) = headers.get_key_value(prefix) else {
            continue;
        };
        if i == header {
            grouped[i] = Some(key.as_str());
        } else if is_member_path(&row.action_path) {
            grouped[i] = Some(key.as_str());
            members.entry(key.as_str()).or_default().push(i);
        }
    }

    let len = rows.len();
    let mut slots: Vec<Option<ResultRow>> = rows.into_iter().map(Some).collect();
    let mut output = Vec::with_capacity(len);
    let mut emitted: HashSet<&str> = HashSet::new();

    for i in 0..len {
        let Some(prefix) = grouped[i] else {
            if let Some(row) = slots[i].take() {
                output.push(row);
            }
            continue;
        };
        if !emitted.insert(prefix) {
            continue;
        }

        let member_indices = members.get(prefix).map(Vec::as_slice).unwrap_or(&[]);
        let aggregated = aggregate(
            member_indices
                .iter()
                .filter_map(|&m| slots[m].as_ref().and_then(|row| row.outcome.as_ref())),
        );
        if let Some(mut header) = slots[headers[prefix]].take() {
            header.action_path.truncate(LEAF_PATH_LEN);
            header.step_identifier = identifier_head(&header.step_identifier).to_string();
            if aggregated.is_some() {
                header.outcome = aggregated;
            }
            output.push(header);
        }
        for &m in member_indices {
            if let Some(row) = slots[m].take() {
                output.push(row);
            }
        }
    }

    output
}

/// Combine member outcomes into the outcome of their group header
fn aggregate<'a>(outcomes: impl Iterator<Item = &'a ExecutionOutcome>) -> Option<ExecutionOutcome> {
    outcomes.fold(None, |acc: Option<ExecutionOutcome>, o| {
        Some(match acc {
            None => o.clone(),
            Some(mut total) => {
                if total.passed && !o.passed {
                    total.reason_phrase = o.reason_phrase.clone();
                }
                total.passed &= o.passed;
                total.duration_ms += o.duration_ms;
                total.started_at = total.started_at.min(o.started_at);
                total.completed_at = total.completed_at.max(o.completed_at);
                total
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::types::{FlatStep, GroupContext};
    use chrono::{Duration, TimeZone, Utc};

    fn outcome(passed: bool, offset_s: i64) -> ExecutionOutcome {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(offset_s);
        let end = start + Duration::seconds(1);
        if passed {
            ExecutionOutcome::passed(start, end)
        } else {
            ExecutionOutcome::failed("Element not found", start, end)
        }
    }

    fn leaf(id: u32) -> FlatStep {
        FlatStep {
            action_path: format!("{:08x}", id),
            step_identifier: id.to_string(),
            action: String::new(),
            expected_results: vec![],
            group_context: None,
        }
    }

    fn member(placement: u32, group_id: u32, id: u32) -> FlatStep {
        let prefix = format!("{:08x}", placement);
        FlatStep {
            action_path: format!("{}{:08x}", prefix, id),
            step_identifier: format!("{:x};{:x}", placement, id),
            action: String::new(),
            expected_results: vec![],
            group_context: Some(GroupContext {
                group_id,
                group_revision: 4,
                group_placement_id: placement,
                group_path_prefix: prefix,
            }),
        }
    }

    fn executed(steps: Vec<FlatStep>) -> Vec<ExecutedStep> {
        steps
            .into_iter()
            .enumerate()
            .map(|(i, s)| ExecutedStep::new(s, Some(outcome(true, i as i64))))
            .collect()
    }

    fn paths(rows: &[ResultRow]) -> Vec<&str> {
        rows.iter().map(|r| r.action_path.as_str()).collect()
    }

    #[test]
    fn test_project_collapses_group_header() {
        let steps = executed(vec![leaf(1), member(2, 500, 10), member(2, 500, 11)]);
        let rows = project(&steps);

        assert_eq!(
            paths(&rows),
            vec!["00000001", "00000002", "000000020000000a", "000000020000000b"]
        );
        assert_eq!(rows[0].step_identifier, "1");
        assert!(rows[0].group_model.is_none());

        let header = &rows[1];
        assert_eq!(header.step_identifier, "2");
        assert_eq!(
            header.group_model,
            Some(GroupModel {
                group_id: 500,
                revision: 4
            })
        );

        assert_eq!(rows[2].step_identifier, "2;a");
        assert_eq!(rows[3].step_identifier, "2;b");
        assert!(rows[2].group_model.is_none() && rows[3].group_model.is_none());
    }

    #[test]
    fn test_row_count_is_steps_plus_groups() {
        let steps = executed(vec![
            member(1, 500, 1),
            leaf(2),
            member(3, 600, 1),
            member(3, 600, 2),
            member(4, 500, 1),
        ]);
        let rows = project(&steps);

        assert_eq!(rows.len(), steps.len() + 3);
        assert_eq!(
            paths(&rows),
            vec![
                "00000001",
                "0000000100000001",
                "00000002",
                "00000003",
                "0000000300000001",
                "0000000300000002",
                "00000004",
                "0000000400000001",
            ]
        );
    }

    #[test]
    fn test_header_aggregates_member_outcomes() {
        let mut steps = executed(vec![member(2, 500, 10), member(2, 500, 11)]);
        steps[1].outcome = Some(outcome(false, 5));
        let rows = project(&steps);

        let header = rows[0].outcome.as_ref().unwrap();
        assert!(!header.passed);
        assert_eq!(header.reason_phrase, "Element not found");
        assert_eq!(header.duration_ms, 2000.0);
        assert_eq!(header.started_at, steps[0].outcome.as_ref().unwrap().started_at);
        assert_eq!(header.completed_at, steps[1].outcome.as_ref().unwrap().completed_at);
    }

    #[test]
    fn test_steps_without_outcome_are_skipped() {
        let steps = vec![
            ExecutedStep::new(leaf(1), Some(outcome(true, 0))),
            ExecutedStep::new(member(2, 500, 10), None),
            ExecutedStep::new(leaf(3), None),
        ];
        let rows = project(&steps);
        assert_eq!(paths(&rows), vec!["00000001"]);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let steps = executed(vec![leaf(1), member(2, 500, 10), member(2, 500, 11), leaf(3)]);
        let once = project(&steps);
        let twice = repair(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_repair_without_groups_is_unchanged() {
        let rows = materialize(&executed(vec![leaf(3), leaf(1)]));
        assert_eq!(repair(rows.clone()), rows);
    }
}
