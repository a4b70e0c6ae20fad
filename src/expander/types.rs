use crate::codec::action_path::{
    encode_leaf, encode_member_identifier, encode_member_path, LEAF_PATH_LEN,
};
use crate::parser::types::StepNode;
use serde::{Deserialize, Serialize};

/// Where a step sits when it was expanded from a shared-step group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupContext {
    pub group_id: u32,
    pub group_revision: u32,
    /// Declared id of the reference that placed the group
    pub group_placement_id: u32,
    /// 8-char hex prefix of the group placement
    pub group_path_prefix: String,
}

/// A step of the flattened test model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatStep {
    pub action_path: String,
    pub step_identifier: String,
    pub action: String,
    #[serde(default)]
    pub expected_results: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_context: Option<GroupContext>,
}

impl FlatStep {
    /// Build the flat step for a leaf, addressed inside `context` when given.
    pub fn from_node(node: &StepNode, context: Option<&GroupContext>) -> Self {
        let (action_path, step_identifier) = match context {
            Some(ctx) => (
                encode_member_path(&ctx.group_path_prefix, node.placement_id),
                encode_member_identifier(ctx.group_placement_id, node.placement_id),
            ),
            None => (encode_leaf(node.placement_id), node.placement_id.to_string()),
        };

        Self {
            action_path,
            step_identifier,
            action: node.action.clone(),
            expected_results: node.expected_results.clone(),
            group_context: context.cloned(),
        }
    }

    /// Path prefix of the owning group placement, if any
    pub fn group_prefix(&self) -> Option<&str> {
        self.group_context
            .as_ref()
            .and_then(|_| self.action_path.get(..LEAF_PATH_LEN))
    }
}

/// Content of a shared-step group as served by the ALM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedGroup {
    pub markup: String,
    #[serde(default)]
    pub revision: u32,
}

/// Raw test case as pulled from the ALM
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseSource {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub markup: String,
}

/// Result of expanding one step document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    pub steps: Vec<FlatStep>,
    /// Groups whose fetch failed, or that were referenced from inside a
    /// group; their subtrees contribute no steps
    pub unresolved_groups: Vec<u32>,
    /// Groups fetched with markup that did not parse
    pub malformed_groups: Vec<u32>,
}

/// Test case handed to the execution engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub title: String,
    pub steps: Vec<FlatStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_groups: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub malformed_groups: Vec<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub markup_malformed: bool,
}

impl TestCase {
    /// A case is valid when its markup parsed and every shared step it
    /// references was resolved and parsed
    pub fn is_valid(&self) -> bool {
        !self.markup_malformed && self.unresolved_groups.is_empty() && self.malformed_groups.is_empty()
    }
}
