pub mod resolver;
pub mod types;

use crate::codec::action_path::encode_group_prefix;
use crate::error::{PullError, ResolveError};
use crate::parser::markup::StepParser;
use crate::parser::types::{StepKind, StepNode};
use crate::utils::config::Config;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub use resolver::{FileResolver, FnResolver, GroupResolver};
pub use types::*;

/// What became of one referenced shared-step group
enum GroupState {
    Resolved { revision: u32, members: Vec<StepNode> },
    /// The fetch failed
    Unresolved,
    /// The fetch succeeded but the group markup did not parse
    Malformed,
}

/// Sibling nodes still to be emitted, with the group they belong to
struct Frame<'a> {
    nodes: std::slice::Iter<'a, StepNode>,
    context: Option<GroupContext>,
}

/// Flattens step documents into ordered [`FlatStep`]s.
///
/// Every group referenced by a document is fetched concurrently. Fetches for
/// all test cases pulled through one expander share a pool of
/// `max_parallel_fetches` permits. Results are keyed by group id, and the
/// steps are then emitted by an ordered walk, so completion order never
/// affects step order.
///
/// Paths have room for one level of grouping only. A shared reference found
/// inside a group's members is skipped and reported as unresolved.
pub struct StepExpander {
    resolver: Arc<dyn GroupResolver>,
    parser: StepParser,
    permits: Arc<Semaphore>,
    config: Config,
}

impl StepExpander {
    pub fn new(resolver: Arc<dyn GroupResolver>, config: Config) -> Self {
        Self {
            resolver,
            parser: StepParser::new(&config),
            permits: Arc::new(Semaphore::new(config.max_parallel_fetches.max(1))),
            config,
        }
    }

    /// Pull a single test case: parse its markup and expand it.
    ///
    /// Cancelled pulls return an error and never a partial step list.
    pub async fn pull(&self, source: &TestCaseSource) -> Result<TestCase, PullError> {
        log::debug!("Pulling test case {}", source.id);

        let (nodes, markup_malformed) = match self.parser.try_parse(&source.markup) {
            Ok(nodes) => (nodes, false),
            Err(e) => {
                log::warn!("Test case {} has malformed step markup: {}", source.id, e);
                (Vec::new(), true)
            }
        };

        let timeout = Duration::from_millis(self.config.pull_timeout_ms);
        let expansion = tokio::time::timeout(timeout, self.expand(&nodes))
            .await
            .map_err(|_| PullError::Cancelled {
                case_id: source.id.clone(),
                timeout_ms: self.config.pull_timeout_ms,
            })?;

        let case = TestCase {
            id: source.id.clone(),
            title: source.title.clone(),
            steps: expansion.steps,
            unresolved_groups: expansion.unresolved_groups,
            malformed_groups: expansion.malformed_groups,
            markup_malformed,
        };

        if case.is_valid() {
            log::info!("Test case {}: {} steps", case.id, case.steps.len());
        } else {
            log::warn!(
                "Test case {} is invalid (unresolved {:?}, malformed {:?}, markup malformed: {}), {} steps kept",
                case.id,
                case.unresolved_groups,
                case.malformed_groups,
                case.markup_malformed,
                case.steps.len()
            );
        }

        Ok(case)
    }

    /// Pull several test cases concurrently. Results keep the input order
    /// and a failed case does not affect the others.
    pub async fn pull_batch(&self, sources: &[TestCaseSource]) -> Vec<Result<TestCase, PullError>> {
        let results = join_all(sources.iter().map(|source| self.pull(source))).await;

        for result in &results {
            if let Err(e) = result {
                log::warn!("{}", e);
            }
        }

        results
    }

    /// Expand top-level nodes into flat steps in document order.
    pub async fn expand(&self, top_level: &[StepNode]) -> Expansion {
        let groups = self.resolve_groups(top_level).await;

        let mut expansion = Expansion::default();
        let mut stack = vec![Frame {
            nodes: top_level.iter(),
            context: None,
        }];

        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            let Some(node) = frame.nodes.next() else {
                stack.pop();
                continue;
            };
            let ref_id = match node.kind {
                StepKind::Leaf => {
                    let step = FlatStep::from_node(node, frame.context.as_ref());
                    expansion.steps.push(step);
                    continue;
                }
                StepKind::SharedReference { ref_id } => ref_id,
            };

            if let Some(outer) = &frame.context {
                log::warn!(
                    "Skipping shared step {} nested in shared step {}: groups do not nest",
                    ref_id,
                    outer.group_id
                );
                push_unique(&mut expansion.unresolved_groups, ref_id);
                continue;
            }

            match groups.get(&ref_id) {
                Some(GroupState::Resolved { revision, members }) => {
                    let context = GroupContext {
                        group_id: ref_id,
                        group_revision: *revision,
                        group_placement_id: node.placement_id,
                        group_path_prefix: encode_group_prefix(node.placement_id),
                    };
                    // Members come first, then any inline children.
                    stack.push(Frame {
                        nodes: node.inline_children.iter(),
                        context: None,
                    });
                    stack.push(Frame {
                        nodes: members.iter(),
                        context: Some(context),
                    });
                }
                Some(GroupState::Malformed) => {
                    log::warn!(
                        "Skipping shared step {} at placement {}: malformed markup",
                        ref_id,
                        node.placement_id
                    );
                    push_unique(&mut expansion.malformed_groups, ref_id);
                }
                Some(GroupState::Unresolved) | None => {
                    log::warn!(
                        "Skipping shared step {} at placement {}: group not resolved",
                        ref_id,
                        node.placement_id
                    );
                    push_unique(&mut expansion.unresolved_groups, ref_id);
                }
            }
        }

        expansion
    }

    /// Fetch every group referenced by `top_level`, each at most once.
    async fn resolve_groups(&self, top_level: &[StepNode]) -> HashMap<u32, GroupState> {
        let mut refs = BTreeSet::new();
        collect_refs(top_level, &mut refs);

        let fetched = join_all(refs.iter().map(|&id| self.fetch(id))).await;

        fetched
            .into_iter()
            .map(|(id, result)| {
                let state = match result {
                    Ok(group) => match self.parser.try_parse(&group.markup) {
                        Ok(members) => {
                            log::debug!(
                                "Resolved shared step {} rev {} with {} steps",
                                id,
                                group.revision,
                                members.len()
                            );
                            GroupState::Resolved {
                                revision: group.revision,
                                members,
                            }
                        }
                        Err(e) => {
                            log::warn!("Shared step {} has malformed markup: {}", id, e);
                            GroupState::Malformed
                        }
                    },
                    Err(e) => {
                        log::warn!("Failed to fetch shared step {}: {}", id, e);
                        GroupState::Unresolved
                    }
                };
                (id, state)
            })
            .collect()
    }

    async fn fetch(&self, group_id: u32) -> (u32, Result<types::SharedGroup, ResolveError>) {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return (
                    group_id,
                    Err(ResolveError::Transport {
                        group_id,
                        message: "fetch pool closed".to_string(),
                    }),
                )
            }
        };
        (group_id, self.resolver.fetch_group(group_id).await)
    }
}

fn collect_refs(nodes: &[StepNode], out: &mut BTreeSet<u32>) {
    for node in nodes {
        if let Some(ref_id) = node.ref_id() {
            out.insert(ref_id);
        }
        collect_refs(&node.inline_children, out);
    }
}

fn push_unique(ids: &mut Vec<u32>, id: u32) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}
