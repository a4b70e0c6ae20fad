use super::types::SharedGroup;
use crate::error::ResolveError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

/// Source of shared-step group documents.
///
/// Fetches are read-only and idempotent, so the expander may call this
/// concurrently for different groups.
#[async_trait]
pub trait GroupResolver: Send + Sync {
    async fn fetch_group(&self, group_id: u32) -> Result<SharedGroup, ResolveError>;
}

/// Resolver backed by a plain function
pub struct FnResolver<F> {
    fetch: F,
}

impl<F> FnResolver<F>
where
    F: Fn(u32) -> Result<SharedGroup, ResolveError> + Send + Sync,
{
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

#[async_trait]
impl<F> GroupResolver for FnResolver<F>
where
    F: Fn(u32) -> Result<SharedGroup, ResolveError> + Send + Sync,
{
    async fn fetch_group(&self, group_id: u32) -> Result<SharedGroup, ResolveError> {
        (self.fetch)(group_id)
    }
}

/// Resolver serving groups from a JSON or YAML fixture keyed by group id:
///
/// ```yaml
/// 500:
///   revision: 3
///   markup: <steps><step id="10" /></steps>
/// ```
pub struct FileResolver {
    groups: HashMap<u32, SharedGroup>,
}

impl FileResolver {
    pub fn new(groups: HashMap<u32, SharedGroup>) -> Self {
        Self { groups }
    }

    pub fn load(path: &Path) -> Result<Self, ResolveError> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path.extension().map_or(false, |ext| ext == "json");
        let groups = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(Self::new(groups))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[async_trait]
impl GroupResolver for FileResolver {
    async fn fetch_group(&self, group_id: u32) -> Result<SharedGroup, ResolveError> {
        self.groups
            .get(&group_id)
            .cloned()
            .ok_or(ResolveError::NotFound(group_id))
    }
}
