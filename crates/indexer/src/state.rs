use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle of the per-workspace index. Exactly one instance per workspace,
/// mutated only by the orchestrator; external callers read it through the
/// orchestrator's watch channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IndexingState {
    Standby,
    Indexing,
    Stopping,
    Indexed,
    Error,
}

impl IndexingState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standby => "standby",
            Self::Indexing => "indexing",
            Self::Stopping => "stopping",
            Self::Indexed => "indexed",
            Self::Error => "error",
        }
    }

    /// States that may legally receive a repeated `start_indexing` call.
    #[must_use]
    pub const fn accepts_start(self) -> bool {
        matches!(self, Self::Standby | Self::Error | Self::Indexed)
    }
}

/// Progress counters published while a scan is running.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct IndexProgress {
    pub processed_files: u64,
    pub total_files: u64,
    pub blocks_indexed: u64,
    pub blocks_found: u64,
}

/// Snapshot of the orchestrator's observable state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct IndexStatus {
    pub state: IndexingState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<IndexProgress>,
}

impl IndexStatus {
    #[must_use]
    pub fn standby(message: impl Into<String>) -> Self {
        Self {
            state: IndexingState::Standby,
            message: message.into(),
            progress: None,
        }
    }

    #[must_use]
    pub fn indexing(message: impl Into<String>, progress: IndexProgress) -> Self {
        Self {
            state: IndexingState::Indexing,
            message: message.into(),
            progress: Some(progress),
        }
    }

    #[must_use]
    pub fn indexed(message: impl Into<String>) -> Self {
        Self {
            state: IndexingState::Indexed,
            message: message.into(),
            progress: None,
        }
    }

    #[must_use]
    pub fn stopping() -> Self {
        Self {
            state: IndexingState::Stopping,
            message: "Stopping indexing".to_string(),
            progress: None,
        }
    }

    /// The error message always carries the underlying cause text.
    #[must_use]
    pub fn error(cause: impl std::fmt::Display) -> Self {
        Self {
            state: IndexingState::Error,
            message: format!("Indexing failed: {cause}"),
            progress: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn standby_error_and_indexed_accept_start() {
        assert!(IndexingState::Standby.accepts_start());
        assert!(IndexingState::Error.accepts_start());
        assert!(IndexingState::Indexed.accepts_start());
    }

    #[test]
    fn transient_states_reject_start() {
        assert!(!IndexingState::Indexing.accepts_start());
        assert!(!IndexingState::Stopping.accepts_start());
    }

    #[test]
    fn error_status_includes_cause_text() {
        let status = IndexStatus::error("connection refused");
        assert_eq!(status.state, IndexingState::Error);
        assert_eq!(status.message, "Indexing failed: connection refused");
    }
}
