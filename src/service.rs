//! Service layer API for approval workflow operations
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ApprovalError, Result, StorageError};
use crate::flow::{self, ApprovalNode, FlowDefinition, FlowDraft, NodeDraft};
use crate::record::{ApprovalLog, ApprovalRecord, Transition};
use crate::store::{ApprovalRepository, Page, PageRequest, RecordFilter};
use crate::types::{
    Actor, ApprovalAction, FlowId, RecordId, ReviewAction, TimeStamp, UserId,
};

/// Which pending records count as "mine".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingScope {
    /// Every pending record, whoever may act on it.
    #[default]
    All,
    /// Only records whose current node's selector matches the actor.
    Eligible,
}

impl FromStr for PendingScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "eligible" => Ok(Self::Eligible),
            other => Err(format!("unknown pending scope `{other}`")),
        }
    }
}

impl fmt::Display for PendingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "all",
            Self::Eligible => "eligible",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Extra attempts after a version conflict before giving up.
    pub max_conflict_retries: u32,
    pub pending_scope: PendingScope,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_conflict_retries: 8,
            pending_scope: PendingScope::All,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlowDetail {
    pub flow: FlowDefinition,
    pub nodes: Vec<ApprovalNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordDetail {
    pub record: ApprovalRecord,
    pub logs: Vec<ApprovalLog>,
}

pub struct ApprovalEngine<R> {
    repo: Arc<R>,
    settings: EngineSettings,
}

impl<R: ApprovalRepository> ApprovalEngine<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self::with_settings(repo, EngineSettings::default())
    }

    pub fn with_settings(repo: Arc<R>, settings: EngineSettings) -> Self {
        Self { repo, settings }
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn create_flow(&self, draft: FlowDraft, nodes: Vec<NodeDraft>) -> Result<FlowDetail> {
        draft.validate(&nodes)?;
        let (flow, nodes) = self.repo.insert_flow(draft, nodes)?;
        info!(flow_id = flow.id, business_type = %flow.business_type, nodes = nodes.len(), "approval flow created");
        Ok(FlowDetail { flow, nodes })
    }

    /// Persists the flow fields and replaces its whole node list.
    pub fn update_flow(
        &self,
        flow_id: FlowId,
        draft: FlowDraft,
        nodes: Vec<NodeDraft>,
    ) -> Result<FlowDetail> {
        draft.validate(&nodes)?;
        let (flow, nodes) = self.repo.replace_flow(flow_id, draft, nodes)?;
        info!(flow_id, business_type = %flow.business_type, nodes = nodes.len(), "approval flow replaced");
        Ok(FlowDetail { flow, nodes })
    }

    pub fn set_flow_enabled(&self, flow_id: FlowId, enabled: bool) -> Result<FlowDefinition> {
        let flow = self.repo.set_flow_enabled(flow_id, enabled)?;
        info!(flow_id, enabled, "approval flow status changed");
        Ok(flow)
    }

    pub fn delete_flow(&self, flow_id: FlowId) -> Result<()> {
        self.repo.delete_flow(flow_id)?;
        info!(flow_id, "approval flow deleted");
        Ok(())
    }

    pub fn list_flows(&self) -> Result<Vec<FlowDefinition>> {
        Ok(self.repo.list_flows()?)
    }

    pub fn get_flow(&self, flow_id: FlowId) -> Result<FlowDetail> {
        let flow = self
            .repo
            .get_flow(flow_id)?
            .ok_or(ApprovalError::FlowNotFound(flow_id))?;
        let nodes = self.repo.flow_nodes(flow_id)?;
        Ok(FlowDetail { flow, nodes })
    }

    pub fn get_flow_nodes(&self, flow_id: FlowId) -> Result<Vec<ApprovalNode>> {
        Ok(self.repo.flow_nodes(flow_id)?)
    }

    pub fn flow_for_business_type(&self, business_type: &str) -> Result<Option<FlowDefinition>> {
        Ok(self.repo.enabled_flow(business_type)?)
    }

    /// Submit a business document for approval. The only way a record is created.
    pub fn start_approval(
        &self,
        business_type: &str,
        business_id: u64,
        business_no: &str,
        initiator: &Actor,
    ) -> Result<ApprovalRecord> {
        let flow = self
            .repo
            .enabled_flow(business_type)?
            .ok_or_else(|| ApprovalError::FlowNotConfigured(business_type.to_string()))?;

        let nodes = self.repo.flow_nodes(flow.id)?;
        let first = flow::first_node(&nodes).ok_or(ApprovalError::FlowHasNoSteps(flow.id))?;

        let now = TimeStamp::new();
        let record = ApprovalRecord::open(
            self.repo.next_id()?,
            &flow,
            first,
            business_id,
            business_no.to_string(),
            initiator,
            now,
        );
        let submit = ApprovalLog::new(self.repo.next_id()?, record.id, initiator, ApprovalAction::Submit)
            .at_node(Some(first.id), Some(first.name.clone()))
            .with_comment(Some("approval submitted".to_string()))
            .created(now);

        self.repo.insert_record(&record, &submit)?;

        info!(
            record_id = record.id,
            flow_id = flow.id,
            business_type,
            business_no,
            actor_id = initiator.id,
            "approval started"
        );
        Ok(record)
    }

    /// Approve, reject or transfer the record's current step.
    ///
    /// The log entry and the state change commit together. A concurrent writer
    /// causes the whole decision to be re-read and retried.
    pub fn do_approval(
        &self,
        record_id: RecordId,
        approver: &Actor,
        action: ReviewAction,
        comment: Option<String>,
    ) -> Result<ApprovalRecord> {
        let attempts = self.settings.max_conflict_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let mut record = self
                .repo
                .get_record(record_id)?
                .ok_or(ApprovalError::RecordNotFound(record_id))?;
            record.ensure_pending()?;

            let nodes = self.repo.flow_nodes(record.flow_id)?;
            let now = TimeStamp::new();
            // the node may be gone if the flow was edited mid-flight
            let node_name = record.current_node(&nodes).map(|n| n.name.clone());
            let log = ApprovalLog::new(self.repo.next_id()?, record.id, approver, action.into())
                .at_node(record.current_node_id, node_name)
                .with_comment(comment.clone())
                .created(now);

            let expected = record.version;
            let transition = record.apply(action, &nodes, now)?;

            match self.repo.update_record(&record, expected, Some(&log)) {
                Ok(version) => {
                    record.version = version;
                    trace_transition(&record, approver, action, transition);
                    return Ok(record);
                }
                Err(StorageError::ConcurrentConflict { .. }) => {
                    warn!(record_id, attempt, "approval record changed concurrently, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ApprovalError::Contention {
            record_id,
            attempts,
        })
    }

    /// Cancels a pending record. Closed records are returned unchanged.
    pub fn cancel_approval(&self, record_id: RecordId) -> Result<ApprovalRecord> {
        let attempts = self.settings.max_conflict_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let mut record = self
                .repo
                .get_record(record_id)?
                .ok_or(ApprovalError::RecordNotFound(record_id))?;

            let expected = record.version;
            if !record.cancel(TimeStamp::new()) {
                debug!(record_id, status = %record.status, "cancel ignored, record already closed");
                return Ok(record);
            }

            match self.repo.update_record(&record, expected, None) {
                Ok(version) => {
                    record.version = version;
                    info!(record_id, "approval cancelled");
                    return Ok(record);
                }
                Err(StorageError::ConcurrentConflict { .. }) => {
                    warn!(record_id, attempt, "approval record changed concurrently, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ApprovalError::Contention {
            record_id,
            attempts,
        })
    }

    /// Pending records for `actor`, narrowed by the configured [`PendingScope`].
    pub fn my_pending_approvals(&self, actor: &Actor, page: PageRequest) -> Result<Page<ApprovalRecord>> {
        let pending = self.repo.find_records(&RecordFilter::pending())?;

        let records = match self.settings.pending_scope {
            PendingScope::All => pending,
            PendingScope::Eligible => {
                let mut nodes_by_flow: HashMap<FlowId, Vec<ApprovalNode>> = HashMap::new();
                let mut eligible = Vec::new();
                for record in pending {
                    if !nodes_by_flow.contains_key(&record.flow_id) {
                        let nodes = self.repo.flow_nodes(record.flow_id)?;
                        nodes_by_flow.insert(record.flow_id, nodes);
                    }
                    let allowed = nodes_by_flow
                        .get(&record.flow_id)
                        .and_then(|nodes| record.current_node(nodes))
                        .is_some_and(|node| node.selector.matches(actor));
                    if allowed {
                        eligible.push(record);
                    }
                }
                eligible
            }
        };

        Ok(Page::slice(records, page))
    }

    pub fn my_initiated_approvals(&self, user_id: UserId, page: PageRequest) -> Result<Page<ApprovalRecord>> {
        let records = self.repo.find_records(&RecordFilter::initiated_by(user_id))?;
        Ok(Page::slice(records, page))
    }

    pub fn get_record_detail(&self, record_id: RecordId) -> Result<RecordDetail> {
        let record = self
            .repo
            .get_record(record_id)?
            .ok_or(ApprovalError::RecordNotFound(record_id))?;
        let logs = self.repo.record_logs(record_id)?;
        Ok(RecordDetail { record, logs })
    }
}

fn trace_transition(record: &ApprovalRecord, approver: &Actor, action: ReviewAction, transition: Transition) {
    match transition {
        Transition::Advanced { node_id, order } => info!(
            record_id = record.id,
            actor_id = approver.id,
            node_id,
            order,
            "approval advanced"
        ),
        Transition::Closed(status) => info!(
            record_id = record.id,
            actor_id = approver.id,
            status = %status,
            "approval closed"
        ),
        Transition::Unchanged => info!(
            record_id = record.id,
            actor_id = approver.id,
            action = %ApprovalAction::from(action),
            "approval action logged"
        ),
    }
}
