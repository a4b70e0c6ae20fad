use serde::{Deserialize, Serialize};

/// What a parsed node stands for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StepKind {
    /// A single step
    Leaf,
    /// A placement of an external shared-step group
    #[serde(rename_all = "camelCase")]
    SharedReference { ref_id: u32 },
}

/// A node of the step markup tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepNode {
    pub kind: StepKind,

    /// The node's own declared id. For shared references this seeds the
    /// group's path prefix.
    pub placement_id: u32,

    #[serde(default)]
    pub action: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_results: Vec<String>,

    /// Steps declared inside a shared reference element (mixed content)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inline_children: Vec<StepNode>,
}

impl StepNode {
    pub fn leaf(placement_id: u32, action: &str) -> Self {
        Self {
            kind: StepKind::Leaf,
            placement_id,
            action: action.to_string(),
            expected_results: Vec::new(),
            inline_children: Vec::new(),
        }
    }

    pub fn shared_reference(placement_id: u32, ref_id: u32) -> Self {
        Self {
            kind: StepKind::SharedReference { ref_id },
            placement_id,
            action: String::new(),
            expected_results: Vec::new(),
            inline_children: Vec::new(),
        }
    }

    pub fn with_expected(mut self, expected: &[&str]) -> Self {
        self.expected_results = expected.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_children(mut self, children: Vec<StepNode>) -> Self {
        self.inline_children = children;
        self
    }

    /// Group id for shared references
    pub fn ref_id(&self) -> Option<u32> {
        match self.kind {
            StepKind::SharedReference { ref_id } => Some(ref_id),
            StepKind::Leaf => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, StepKind::Leaf)
    }
}
