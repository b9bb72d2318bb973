//! Approval instances, their audit log, and the state machine that moves them
use serde::{Deserialize, Serialize};

use crate::error::ApprovalError;
use crate::flow::{self, ApprovalNode, FlowDefinition};
use crate::types::{
    Actor, ApprovalAction, ApprovalStatus, FlowId, LogId, NodeId, RecordId, ReviewAction,
    TimeStamp, UserId,
};

/// One submission of a business document through a flow.
#[derive(minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRecord {
    #[n(0)]
    pub id: RecordId,
    #[n(1)]
    pub flow_id: FlowId,
    #[n(2)]
    pub business_type: String,
    #[n(3)]
    pub business_id: u64,
    #[n(4)]
    pub business_no: String, // human readable, e.g. WT20240101001
    #[n(5)]
    pub current_node_id: Option<NodeId>,
    #[n(6)]
    pub current_node_order: Option<u32>,
    #[n(7)]
    pub status: ApprovalStatus,
    #[n(8)]
    pub initiator_id: UserId,
    #[n(9)]
    pub initiator_name: String,
    #[n(10)]
    pub version: u64,
    #[n(11)]
    pub created_at: TimeStamp,
    #[n(12)]
    pub updated_at: TimeStamp,
}

/// Write-once audit entry. Submissions are logged too.
#[derive(minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ApprovalLog {
    #[n(0)]
    pub id: LogId,
    #[n(1)]
    pub record_id: RecordId,
    #[n(2)]
    pub node_id: Option<NodeId>,
    #[n(3)]
    pub node_name: Option<String>,
    #[n(4)]
    pub approver_id: UserId,
    #[n(5)]
    pub approver_name: String,
    #[n(6)]
    pub action: ApprovalAction,
    #[n(7)]
    pub comment: Option<String>,
    #[n(8)]
    pub created_at: TimeStamp,
}

/// Outcome of applying a review action to a pending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advanced { node_id: NodeId, order: u32 },
    Closed(ApprovalStatus),
    // the reserved `transfer` action
    Unchanged,
}

impl ApprovalRecord {
    pub fn open(
        id: RecordId,
        flow: &FlowDefinition,
        first: &ApprovalNode,
        business_id: u64,
        business_no: String,
        initiator: &Actor,
        now: TimeStamp,
    ) -> Self {
        Self {
            id,
            flow_id: flow.id,
            business_type: flow.business_type.clone(),
            business_id,
            business_no,
            current_node_id: Some(first.id),
            current_node_order: Some(first.order),
            status: ApprovalStatus::Pending,
            initiator_id: initiator.id,
            initiator_name: initiator.name.clone(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    pub fn ensure_pending(&self) -> Result<(), ApprovalError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(ApprovalError::RecordAlreadyClosed {
                record_id: self.id,
                status: self.status,
            })
        }
    }

    pub fn current_node<'a>(&self, nodes: &'a [ApprovalNode]) -> Option<&'a ApprovalNode> {
        let id = self.current_node_id?;
        nodes.iter().find(|n| n.id == id)
    }

    /// Applies `action` against the flow's current node list.
    pub fn apply(
        &mut self,
        action: ReviewAction,
        nodes: &[ApprovalNode],
        now: TimeStamp,
    ) -> Result<Transition, ApprovalError> {
        self.ensure_pending()?;

        let transition = match action {
            ReviewAction::Reject => {
                self.close(ApprovalStatus::Rejected, now);
                Transition::Closed(ApprovalStatus::Rejected)
            }
            ReviewAction::Approve => {
                let order = self.current_node_order.unwrap_or(0);
                match flow::next_node(nodes, order) {
                    Some(next) => {
                        self.current_node_id = Some(next.id);
                        self.current_node_order = Some(next.order);
                        self.updated_at = now;
                        Transition::Advanced {
                            node_id: next.id,
                            order: next.order,
                        }
                    }
                    None => {
                        self.close(ApprovalStatus::Approved, now);
                        Transition::Closed(ApprovalStatus::Approved)
                    }
                }
            }
            ReviewAction::Transfer => Transition::Unchanged,
        };

        Ok(transition)
    }

    /// Returns false, and changes nothing, when the record is already closed.
    pub fn cancel(&mut self, now: TimeStamp) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.close(ApprovalStatus::Cancelled, now);
        true
    }

    fn close(&mut self, status: ApprovalStatus, now: TimeStamp) {
        self.status = status;
        self.current_node_id = None;
        self.current_node_order = None;
        self.updated_at = now;
    }
}

impl ApprovalLog {
    pub fn new(id: LogId, record_id: RecordId, actor: &Actor, action: ApprovalAction) -> Self {
        Self {
            id,
            record_id,
            node_id: None,
            node_name: None,
            approver_id: actor.id,
            approver_name: actor.name.clone(),
            action,
            comment: None,
            created_at: TimeStamp::new(),
        }
    }
    pub fn at_node(mut self, node_id: Option<NodeId>, node_name: Option<String>) -> Self {
        self.node_id = node_id;
        self.node_name = node_name;
        self
    }
    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment.filter(|c| !c.trim().is_empty());
        self
    }
    pub fn created(mut self, at: TimeStamp) -> Self {
        self.created_at = at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApproverSelector;

    fn flow() -> FlowDefinition {
        FlowDefinition {
            id: 1,
            name: "entrustment-approval".into(),
            code: "ENT".into(),
            business_type: "entrustment".into(),
            description: None,
            enabled: true,
            deleted: false,
            created_at: TimeStamp::new(),
            updated_at: TimeStamp::new(),
        }
    }

    fn nodes() -> Vec<ApprovalNode> {
        [(10, "Dept Head", 1), (11, "QA Manager", 2)]
            .into_iter()
            .map(|(id, name, order)| ApprovalNode {
                id,
                flow_id: 1,
                name: name.into(),
                order,
                selector: ApproverSelector::Role { ids: vec![1] },
                created_at: TimeStamp::new(),
            })
            .collect()
    }

    fn open() -> ApprovalRecord {
        let nodes = nodes();
        ApprovalRecord::open(
            5,
            &flow(),
            &nodes[0],
            42,
            "WT20240101001".into(),
            &Actor::new(7, "Alice"),
            TimeStamp::new(),
        )
    }

    #[test]
    fn approvals_walk_every_node_then_close() {
        let nodes = nodes();
        let mut record = open();
        assert_eq!(record.current_node(&nodes).map(|n| n.name.as_str()), Some("Dept Head"));

        let t = record.apply(ReviewAction::Approve, &nodes, TimeStamp::new()).unwrap();
        assert_eq!(t, Transition::Advanced { node_id: 11, order: 2 });
        assert!(record.is_pending());

        let t = record.apply(ReviewAction::Approve, &nodes, TimeStamp::new()).unwrap();
        assert_eq!(t, Transition::Closed(ApprovalStatus::Approved));
        assert_eq!(record.status, ApprovalStatus::Approved);
        assert_eq!(record.current_node_id, None);
        assert_eq!(record.current_node_order, None);

        let err = record
            .apply(ReviewAction::Reject, &nodes, TimeStamp::new())
            .unwrap_err();
        assert!(matches!(err, ApprovalError::RecordAlreadyClosed { record_id: 5, .. }));
    }

    #[test]
    fn reject_closes_from_any_step() {
        let nodes = nodes();
        let mut record = open();
        record.apply(ReviewAction::Approve, &nodes, TimeStamp::new()).unwrap();

        let t = record.apply(ReviewAction::Reject, &nodes, TimeStamp::new()).unwrap();
        assert_eq!(t, Transition::Closed(ApprovalStatus::Rejected));
        assert!(!record.cancel(TimeStamp::new()));
        assert_eq!(record.status, ApprovalStatus::Rejected);
    }

    #[test]
    fn transfer_leaves_record_untouched() {
        let nodes = nodes();
        let mut record = open();
        let before = record.clone();

        let t = record.apply(ReviewAction::Transfer, &nodes, TimeStamp::new()).unwrap();
        assert_eq!(t, Transition::Unchanged);
        assert_eq!(record, before);
    }

    #[test]
    fn cancel_only_from_pending() {
        let mut record = open();
        assert!(record.cancel(TimeStamp::new()));
        assert_eq!(record.status, ApprovalStatus::Cancelled);
        assert!(!record.cancel(TimeStamp::new()));
        assert_eq!(record.status, ApprovalStatus::Cancelled);
    }

    #[test]
    fn blank_comments_are_dropped() {
        let actor = Actor::new(9, "Bob");
        let log = ApprovalLog::new(1, 5, &actor, ApprovalAction::Approve).with_comment(Some("  ".into()));
        assert_eq!(log.comment, None);
        let log = log.with_comment(Some("ok".into()));
        assert_eq!(log.comment.as_deref(), Some("ok"));
    }

    #[test]
    fn record_cbor_encoding() {
        let original = open();
        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: ApprovalRecord = minicbor::decode(&encoding).unwrap();
        assert_eq!(original, decode);
    }
}
