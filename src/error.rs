use crate::types::{ApprovalStatus, FlowId, RecordId};

/// Errors returned by an [`ApprovalRepository`](crate::store::ApprovalRepository) backend.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// The record was written by someone else since it was read.
    #[error("concurrent conflict on approval record {record_id}: expected version {expected_version}")]
    ConcurrentConflict {
        record_id: RecordId,
        expected_version: u64,
    },
    #[error("approval flow not found: {0}")]
    FlowNotFound(FlowId),
    #[error("approval record not found: {0}")]
    RecordNotFound(RecordId),
    #[error("business type `{business_type}` already has enabled flow {existing}")]
    DuplicateEnabledFlow {
        business_type: String,
        existing: FlowId,
    },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for StorageError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        StorageError::Codec(value.to_string())
    }
}

impl From<minicbor::decode::Error> for StorageError {
    fn from(value: minicbor::decode::Error) -> Self {
        StorageError::Codec(value.to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ApprovalError {
    #[error("no enabled approval flow is configured for business type `{0}`")]
    FlowNotConfigured(String),
    #[error("approval flow {0} has no steps configured")]
    FlowHasNoSteps(FlowId),
    #[error("approval flow {0} does not exist")]
    FlowNotFound(FlowId),
    #[error("business type `{business_type}` already has enabled flow {existing}")]
    DuplicateEnabledFlow {
        business_type: String,
        existing: FlowId,
    },
    #[error("approval record {0} does not exist")]
    RecordNotFound(RecordId),
    #[error("approval record {record_id} has already been {status}")]
    RecordAlreadyClosed {
        record_id: RecordId,
        status: ApprovalStatus,
    },
    #[error("invalid flow definition: {0}")]
    InvalidFlow(String),
    #[error("invalid approver selector: {0}")]
    InvalidSelector(String),
    #[error("unsupported approval action `{0}`")]
    InvalidAction(String),
    #[error("approval record {record_id} is being modified concurrently, gave up after {attempts} attempts")]
    Contention { record_id: RecordId, attempts: u32 },
    #[error(transparent)]
    Storage(StorageError),
}

impl ApprovalError {
    /// Stable machine-readable code surfaced to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FlowNotConfigured(_) => "FLOW_NOT_CONFIGURED",
            Self::FlowHasNoSteps(_) => "FLOW_HAS_NO_STEPS",
            Self::FlowNotFound(_) => "FLOW_NOT_FOUND",
            Self::DuplicateEnabledFlow { .. } => "DUPLICATE_ENABLED_FLOW",
            Self::RecordNotFound(_) => "RECORD_NOT_FOUND",
            Self::RecordAlreadyClosed { .. } => "RECORD_ALREADY_CLOSED",
            Self::InvalidFlow(_) => "INVALID_FLOW",
            Self::InvalidSelector(_) => "INVALID_SELECTOR",
            Self::InvalidAction(_) => "INVALID_ACTION",
            Self::Contention { .. } => "CONTENTION",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<StorageError> for ApprovalError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::FlowNotFound(id) => ApprovalError::FlowNotFound(id),
            StorageError::RecordNotFound(id) => ApprovalError::RecordNotFound(id),
            StorageError::DuplicateEnabledFlow {
                business_type,
                existing,
            } => ApprovalError::DuplicateEnabledFlow {
                business_type,
                existing,
            },
            other => ApprovalError::Storage(other),
        }
    }
}

pub type Result<T, E = ApprovalError> = std::result::Result<T, E>;
