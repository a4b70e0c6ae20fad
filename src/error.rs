use thiserror::Error;

/// Failure to fetch a shared-step group from the ALM side
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("shared step group not found: {0}")]
    NotFound(u32),

    #[error("transport error while fetching group {group_id}: {message}")]
    Transport { group_id: u32, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Step markup that could not be parsed
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML error at position {position}: {message}")]
    Malformed { position: usize, message: String },

    #[error("unexpected end of markup inside an open step")]
    Truncated,
}

/// Failure of a whole test-case pull
#[derive(Debug, Error)]
pub enum PullError {
    #[error("pull for test case '{case_id}' cancelled after {timeout_ms}ms")]
    Cancelled { case_id: String, timeout_ms: u64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}
