//! Flow templates and their ordered approval steps
use serde::{Deserialize, Serialize};

use crate::error::ApprovalError;
use crate::types::{ApproverSelector, FlowId, NodeId, TimeStamp};

/// A named approval template bound to exactly one business type.
#[derive(minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FlowDefinition {
    #[n(0)]
    pub id: FlowId,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub code: String,
    #[n(3)]
    pub business_type: String, // e.g. "entrustment", "contract"
    #[n(4)]
    pub description: Option<String>,
    #[n(5)]
    pub enabled: bool,
    #[n(6)]
    #[serde(skip)]
    pub deleted: bool,
    #[n(7)]
    pub created_at: TimeStamp,
    #[n(8)]
    pub updated_at: TimeStamp,
}

/// One step of a flow. `order` is 1-based and unique within the flow.
#[derive(minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ApprovalNode {
    #[n(0)]
    pub id: NodeId,
    #[n(1)]
    pub flow_id: FlowId,
    #[n(2)]
    pub name: String,
    #[n(3)]
    pub order: u32,
    #[n(4)]
    #[serde(flatten)]
    pub selector: ApproverSelector,
    #[n(5)]
    pub created_at: TimeStamp,
}

/// Caller-supplied flow fields for create and update.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FlowDraft {
    pub name: String,
    pub code: String,
    pub business_type: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `None` keeps the stored flag on update and means enabled on create.
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Caller-supplied step. Its position in the submitted list decides its order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeDraft {
    pub name: String,
    #[serde(flatten)]
    pub selector: ApproverSelector,
}

impl FlowDraft {
    pub fn new(name: &str, code: &str, business_type: &str) -> Self {
        Self {
            name: name.to_string(),
            code: code.to_string(),
            business_type: business_type.to_string(),
            description: None,
            enabled: None,
        }
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn set_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    // node lists may be empty; that only fails later, at submission
    pub fn validate(&self, nodes: &[NodeDraft]) -> Result<(), ApprovalError> {
        if self.name.trim().is_empty() {
            return Err(ApprovalError::InvalidFlow("flow name is blank".into()));
        }
        if self.code.trim().is_empty() {
            return Err(ApprovalError::InvalidFlow("flow code is blank".into()));
        }
        if self.business_type.trim().is_empty() {
            return Err(ApprovalError::InvalidFlow("business type is blank".into()));
        }
        if let Some(pos) = nodes.iter().position(|n| n.name.trim().is_empty()) {
            return Err(ApprovalError::InvalidFlow(format!(
                "node {} has a blank name",
                pos + 1
            )));
        }
        Ok(())
    }

    /// Materialises the stored row. `enabled` applies only when the draft leaves
    /// the flag unset.
    pub fn into_definition(
        self,
        id: FlowId,
        created_at: TimeStamp,
        enabled: bool,
        now: TimeStamp,
    ) -> FlowDefinition {
        FlowDefinition {
            id,
            name: self.name.trim().to_string(),
            code: self.code.trim().to_string(),
            business_type: self.business_type.trim().to_string(),
            description: self.description,
            enabled: self.enabled.unwrap_or(enabled),
            deleted: false,
            created_at,
            updated_at: now,
        }
    }
}

impl NodeDraft {
    pub fn new(name: &str, selector: ApproverSelector) -> Self {
        Self {
            name: name.to_string(),
            selector,
        }
    }
}

/// Numbers drafts 1..=n in list order. `ids` must be at least as long as `drafts`.
pub fn number_nodes(
    flow_id: FlowId,
    drafts: Vec<NodeDraft>,
    ids: &[NodeId],
    now: TimeStamp,
) -> Vec<ApprovalNode> {
    drafts
        .into_iter()
        .zip(ids)
        .enumerate()
        .map(|(i, (draft, id))| ApprovalNode {
            id: *id,
            flow_id,
            name: draft.name.trim().to_string(),
            order: i as u32 + 1,
            selector: draft.selector,
            created_at: now,
        })
        .collect()
}

/// First node strictly after `order`. Gaps in the sequence are fine.
pub fn next_node(nodes: &[ApprovalNode], order: u32) -> Option<&ApprovalNode> {
    nodes
        .iter()
        .filter(|n| n.order > order)
        .min_by_key(|n| n.order)
}

pub fn first_node(nodes: &[ApprovalNode]) -> Option<&ApprovalNode> {
    nodes.iter().min_by_key(|n| n.order)
}
