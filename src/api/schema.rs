use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ApprovalError;
use crate::flow::{FlowDraft, NodeDraft};
use crate::types::ApproverSelector;

/// Envelope shared by every response, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: String,
    pub message: String,
    pub data: Option<T>,
    pub timestamp: i64,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            code: "OK".to_string(),
            message: message.into(),
            data: Some(data),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

impl ApiResponse<()> {
    pub fn ok_empty(message: impl Into<String>) -> Self {
        Self {
            code: "OK".to_string(),
            message: message.into(),
            data: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            data: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Approver ids arrive either as the legacy `"1,2,3"` string or a JSON list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ApproverIds {
    Delimited(String),
    List(Vec<u64>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInput {
    #[serde(alias = "nodeName")]
    pub name: String,
    #[serde(alias = "approverType")]
    pub approver_type: String,
    #[serde(alias = "approverIds", default = "no_ids")]
    pub approver_ids: ApproverIds,
}

fn no_ids() -> ApproverIds {
    ApproverIds::List(vec![])
}

impl TryFrom<NodeInput> for NodeDraft {
    type Error = ApprovalError;

    fn try_from(input: NodeInput) -> Result<Self, Self::Error> {
        let selector = match input.approver_ids {
            ApproverIds::Delimited(ids) => ApproverSelector::parse(&input.approver_type, &ids)?,
            ApproverIds::List(ids) => {
                let joined = ids.iter().map(u64::to_string).collect::<Vec<_>>().join(",");
                ApproverSelector::parse(&input.approver_type, &joined)?
            }
        };
        Ok(NodeDraft::new(&input.name, selector))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRequest {
    pub flow: FlowDraft,
    #[serde(default)]
    pub nodes: Vec<NodeInput>,
}

impl FlowRequest {
    pub fn into_parts(self) -> Result<(FlowDraft, Vec<NodeDraft>), ApprovalError> {
        let nodes = self
            .nodes
            .into_iter()
            .map(NodeDraft::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((self.flow, nodes))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStatusQuery {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartApprovalRequest {
    #[serde(alias = "businessType")]
    pub business_type: String,
    #[serde(alias = "businessId")]
    pub business_id: u64,
    #[serde(alias = "businessNo")]
    pub business_no: String,
    #[serde(alias = "initiatorId", default)]
    pub initiator_id: Option<u64>,
    #[serde(alias = "initiatorName", default)]
    pub initiator_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoApprovalRequest {
    #[serde(alias = "recordId")]
    pub record_id: u64,
    #[serde(alias = "approverId", default)]
    pub approver_id: Option<u64>,
    #[serde(alias = "approverName", default)]
    pub approver_name: Option<String>,
    pub action: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub current: Option<u64>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(alias = "userId", default)]
    pub user_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub env: String,
}
