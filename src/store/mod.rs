//! Persistence contract for flows, nodes, records and logs.
//!
//! [`ApprovalRepository`] is the only shared mutable state the engine touches.
//! One implementation is provided:
//!
//! - [`SledRepository`] - embedded `sled` trees with CBOR rows
//!
//! ## Atomicity
//!
//! Every method that writes more than one row does so in a single transaction:
//! a flow and its node list are written together, a record and the log entry
//! describing the change are written together. A failure leaves nothing behind.
//!
//! ## Optimistic concurrency
//!
//! [`ApprovalRepository::update_record`] is a compare-and-swap on
//! [`ApprovalRecord::version`](crate::record::ApprovalRecord::version). When the
//! stored version differs from `expected_version` nothing is written and
//! [`StorageError::ConcurrentConflict`] is returned.

mod sled_repo;

pub use sled_repo::SledRepository;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::flow::{ApprovalNode, FlowDefinition, FlowDraft, NodeDraft};
use crate::record::{ApprovalLog, ApprovalRecord};
use crate::types::{ApprovalStatus, FlowId, RecordId, UserId};

/// Explicit record query. Nothing is filtered implicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub status: Option<ApprovalStatus>,
    pub initiator_id: Option<UserId>,
    pub business_type: Option<String>,
}

impl RecordFilter {
    pub fn pending() -> Self {
        Self {
            status: Some(ApprovalStatus::Pending),
            ..Self::default()
        }
    }
    pub fn initiated_by(user_id: UserId) -> Self {
        Self {
            initiator_id: Some(user_id),
            ..Self::default()
        }
    }
    pub fn matches(&self, record: &ApprovalRecord) -> bool {
        self.status.is_none_or(|s| s == record.status)
            && self.initiator_id.is_none_or(|id| id == record.initiator_id)
            && self
                .business_type
                .as_deref()
                .is_none_or(|t| t == record.business_type)
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub current: u64,
    pub size: u64,
}

impl PageRequest {
    pub fn new(current: u64, size: u64) -> Self {
        Self {
            current: current.max(1),
            size: size.max(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total: u64,
    pub size: u64,
    pub current: u64,
}

impl<T> Page<T> {
    /// Cuts one page out of an already ordered result set.
    pub fn slice(items: Vec<T>, req: PageRequest) -> Self {
        let total = items.len() as u64;
        let skip = (req.current - 1).saturating_mul(req.size);
        let records = items
            .into_iter()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(usize::try_from(req.size).unwrap_or(usize::MAX))
            .collect();
        Self {
            records,
            total,
            size: req.size,
            current: req.current,
        }
    }
}

pub trait ApprovalRepository: Send + Sync + 'static {
    /// Inserts a flow and its nodes, numbered 1..=n in list order.
    ///
    /// Fails with `DuplicateEnabledFlow` if the draft is enabled and another
    /// enabled flow already owns its business type.
    fn insert_flow(
        &self,
        draft: FlowDraft,
        nodes: Vec<NodeDraft>,
    ) -> Result<(FlowDefinition, Vec<ApprovalNode>), StorageError>;

    /// Overwrites the flow fields and replaces the whole node list.
    ///
    /// Old nodes are dropped, the new ones get fresh ids and orders 1..=n.
    /// A draft that leaves `enabled` unset keeps the stored flag.
    fn replace_flow(
        &self,
        flow_id: FlowId,
        draft: FlowDraft,
        nodes: Vec<NodeDraft>,
    ) -> Result<(FlowDefinition, Vec<ApprovalNode>), StorageError>;

    fn set_flow_enabled(&self, flow_id: FlowId, enabled: bool)
    -> Result<FlowDefinition, StorageError>;

    /// Logical delete. Node rows survive for in-flight records.
    fn delete_flow(&self, flow_id: FlowId) -> Result<(), StorageError>;

    /// Returns `None` for unknown or deleted flows.
    fn get_flow(&self, flow_id: FlowId) -> Result<Option<FlowDefinition>, StorageError>;

    /// Non-deleted flows, id ascending.
    fn list_flows(&self) -> Result<Vec<FlowDefinition>, StorageError>;

    /// Nodes ordered by ascending `order`. Empty for unknown flows.
    fn flow_nodes(&self, flow_id: FlowId) -> Result<Vec<ApprovalNode>, StorageError>;

    fn enabled_flow(&self, business_type: &str) -> Result<Option<FlowDefinition>, StorageError>;

    /// A fresh, never reused id for a record or log row.
    fn next_id(&self) -> Result<u64, StorageError>;

    /// Inserts a new record together with its submission log entry.
    fn insert_record(&self, record: &ApprovalRecord, submit: &ApprovalLog)
    -> Result<(), StorageError>;

    fn get_record(&self, record_id: RecordId) -> Result<Option<ApprovalRecord>, StorageError>;

    /// Writes `record` if the stored version still equals `expected_version`,
    /// appending `log` in the same transaction. Returns the new version.
    fn update_record(
        &self,
        record: &ApprovalRecord,
        expected_version: u64,
        log: Option<&ApprovalLog>,
    ) -> Result<u64, StorageError>;

    /// Matching records, newest first.
    fn find_records(&self, filter: &RecordFilter) -> Result<Vec<ApprovalRecord>, StorageError>;

    /// The record's audit trail, oldest first.
    fn record_logs(&self, record_id: RecordId) -> Result<Vec<ApprovalLog>, StorageError>;
}
