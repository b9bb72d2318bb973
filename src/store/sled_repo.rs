use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionResult, TransactionalTree,
};
use sled::{Transactional, Tree};
use std::path::Path;

use super::{ApprovalRepository, RecordFilter};
use crate::error::StorageError;
use crate::flow::{self, ApprovalNode, FlowDefinition, FlowDraft, NodeDraft};
use crate::record::{ApprovalLog, ApprovalRecord};
use crate::types::{FlowId, LogId, RecordId, TimeStamp};

const FLOWS: &str = "flows";
const FLOW_NODES: &str = "flow_nodes";
const ENABLED_FLOWS: &str = "enabled_flows";
const RECORDS: &str = "records";
const LOGS: &str = "logs";

/// Keys are big-endian ids so tree iteration follows id order.
///
/// - `flows`: flow id -> [`FlowDefinition`]
/// - `flow_nodes`: flow id -> ordered `Vec<ApprovalNode>`, written as one value
/// - `enabled_flows`: business type -> flow id
/// - `records`: record id -> [`ApprovalRecord`]
/// - `logs`: record id ++ log id -> [`ApprovalLog`]
#[derive(Clone)]
pub struct SledRepository {
    instance: sled::Db,
    flows: Tree,
    flow_nodes: Tree,
    enabled_flows: Tree,
    records: Tree,
    logs: Tree,
}

impl SledRepository {
    pub fn new(instance: sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            flows: instance.open_tree(FLOWS)?,
            flow_nodes: instance.open_tree(FLOW_NODES)?,
            enabled_flows: instance.open_tree(ENABLED_FLOWS)?,
            records: instance.open_tree(RECORDS)?,
            logs: instance.open_tree(LOGS)?,
            instance,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::new(sled::open(path)?)
    }

    /// An in-memory database removed on drop.
    pub fn temporary() -> Result<Self, StorageError> {
        Self::new(sled::Config::new().temporary(true).open()?)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.instance.flush()?;
        Ok(())
    }

    fn fresh_ids(&self, n: usize) -> Result<Vec<u64>, StorageError> {
        (0..n).map(|_| self.next_id()).collect()
    }
}

impl ApprovalRepository for SledRepository {
    fn insert_flow(
        &self,
        draft: FlowDraft,
        nodes: Vec<NodeDraft>,
    ) -> Result<(FlowDefinition, Vec<ApprovalNode>), StorageError> {
        let now = TimeStamp::new();
        let flow_id = self.next_id()?;
        let node_ids = self.fresh_ids(nodes.len())?;

        let flow = draft.into_definition(flow_id, now, true, now);
        let nodes = flow::number_nodes(flow_id, nodes, &node_ids, now);
        let flow_cbor = encode(&flow)?;
        let nodes_cbor = encode(&nodes)?;

        settle(
            (&self.flows, &self.flow_nodes, &self.enabled_flows).transaction(
                |(flows, flow_nodes, enabled)| {
                    if flow.enabled {
                        claim_business_type(enabled, &flow.business_type, flow.id)?;
                    }
                    flows.insert(&id_key(flow.id)[..], flow_cbor.as_slice())?;
                    flow_nodes.insert(&id_key(flow.id)[..], nodes_cbor.as_slice())?;
                    Ok(())
                },
            ),
        )?;

        Ok((flow, nodes))
    }

    fn replace_flow(
        &self,
        flow_id: FlowId,
        draft: FlowDraft,
        nodes: Vec<NodeDraft>,
    ) -> Result<(FlowDefinition, Vec<ApprovalNode>), StorageError> {
        if self.get_flow(flow_id)?.is_none() {
            return Err(StorageError::FlowNotFound(flow_id));
        }

        let now = TimeStamp::new();
        let node_ids = self.fresh_ids(nodes.len())?;
        let nodes = flow::number_nodes(flow_id, nodes, &node_ids, now);
        let nodes_cbor = encode(&nodes)?;

        let flow = settle(
            (&self.flows, &self.flow_nodes, &self.enabled_flows).transaction(
                |(flows, flow_nodes, enabled)| {
                    let stored = load_live_flow(flows, flow_id)?;
                    // an unset flag keeps whatever the stored flow has
                    let flow = draft
                        .clone()
                        .into_definition(flow_id, stored.created_at, stored.enabled, now);
                    release_business_type(enabled, &stored.business_type, flow_id)?;
                    if flow.enabled {
                        claim_business_type(enabled, &flow.business_type, flow_id)?;
                    }
                    flows.insert(&id_key(flow_id)[..], encode(&flow).map_err(abort)?)?;
                    // one value holds the whole list, so this drops every old node
                    flow_nodes.insert(&id_key(flow_id)[..], nodes_cbor.as_slice())?;
                    Ok(flow)
                },
            ),
        )?;

        Ok((flow, nodes))
    }

    fn set_flow_enabled(
        &self,
        flow_id: FlowId,
        enabled: bool,
    ) -> Result<FlowDefinition, StorageError> {
        settle(
            (&self.flows, &self.enabled_flows).transaction(|(flows, index)| {
                let mut stored = load_live_flow(flows, flow_id)?;
                if enabled {
                    claim_business_type(index, &stored.business_type, flow_id)?;
                } else {
                    release_business_type(index, &stored.business_type, flow_id)?;
                }
                stored.enabled = enabled;
                stored.updated_at = TimeStamp::new();
                flows.insert(&id_key(flow_id)[..], encode(&stored).map_err(abort)?)?;
                Ok(stored)
            }),
        )
    }

    fn delete_flow(&self, flow_id: FlowId) -> Result<(), StorageError> {
        settle(
            (&self.flows, &self.enabled_flows).transaction(|(flows, index)| {
                let mut stored = load_live_flow(flows, flow_id)?;
                release_business_type(index, &stored.business_type, flow_id)?;
                stored.enabled = false;
                stored.deleted = true;
                stored.updated_at = TimeStamp::new();
                flows.insert(&id_key(flow_id)[..], encode(&stored).map_err(abort)?)?;
                Ok(())
            }),
        )
    }

    fn get_flow(&self, flow_id: FlowId) -> Result<Option<FlowDefinition>, StorageError> {
        match self.flows.get(id_key(flow_id))? {
            Some(bytes) => {
                let flow: FlowDefinition = decode(&bytes)?;
                Ok((!flow.deleted).then_some(flow))
            }
            None => Ok(None),
        }
    }

    fn list_flows(&self) -> Result<Vec<FlowDefinition>, StorageError> {
        let mut flows = Vec::new();
        for entry in self.flows.iter() {
            let (_, bytes) = entry?;
            let flow: FlowDefinition = decode(&bytes)?;
            if !flow.deleted {
                flows.push(flow);
            }
        }
        Ok(flows)
    }

    fn flow_nodes(&self, flow_id: FlowId) -> Result<Vec<ApprovalNode>, StorageError> {
        let mut nodes: Vec<ApprovalNode> = match self.flow_nodes.get(id_key(flow_id))? {
            Some(bytes) => decode(&bytes)?,
            None => vec![],
        };
        nodes.sort_by_key(|n| n.order);
        Ok(nodes)
    }

    fn enabled_flow(&self, business_type: &str) -> Result<Option<FlowDefinition>, StorageError> {
        match self.enabled_flows.get(business_type.as_bytes())? {
            Some(bytes) => self.get_flow(read_id(&bytes)?),
            None => Ok(None),
        }
    }

    fn next_id(&self) -> Result<u64, StorageError> {
        // sled starts at 0; keep ids 1-based
        Ok(self.instance.generate_id()? + 1)
    }

    fn insert_record(
        &self,
        record: &ApprovalRecord,
        submit: &ApprovalLog,
    ) -> Result<(), StorageError> {
        let record_cbor = encode(record)?;
        let log_cbor = encode(submit)?;

        settle((&self.records, &self.logs).transaction(|(records, logs)| {
            logs.insert(&log_key(record.id, submit.id)[..], log_cbor.as_slice())?;
            records.insert(&id_key(record.id)[..], record_cbor.as_slice())?;
            Ok(())
        }))
    }

    fn get_record(&self, record_id: RecordId) -> Result<Option<ApprovalRecord>, StorageError> {
        self.records
            .get(id_key(record_id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn update_record(
        &self,
        record: &ApprovalRecord,
        expected_version: u64,
        log: Option<&ApprovalLog>,
    ) -> Result<u64, StorageError> {
        let mut next = record.clone();
        next.version = expected_version + 1;
        let record_cbor = encode(&next)?;
        let log_entry = match log {
            Some(log) => Some((log_key(log.record_id, log.id), encode(log)?)),
            None => None,
        };

        settle((&self.records, &self.logs).transaction(|(records, logs)| {
            let stored: ApprovalRecord = match records.get(id_key(record.id))? {
                Some(bytes) => decode(&bytes).map_err(abort)?,
                None => return Err(abort(StorageError::RecordNotFound(record.id))),
            };
            if stored.version != expected_version {
                return Err(abort(StorageError::ConcurrentConflict {
                    record_id: record.id,
                    expected_version,
                }));
            }
            // log first, then the state it describes
            if let Some((key, cbor)) = &log_entry {
                logs.insert(&key[..], cbor.as_slice())?;
            }
            records.insert(&id_key(record.id)[..], record_cbor.as_slice())?;
            Ok(next.version)
        }))
    }

    fn find_records(&self, filter: &RecordFilter) -> Result<Vec<ApprovalRecord>, StorageError> {
        let mut found = Vec::new();
        for entry in self.records.iter() {
            let (_, bytes) = entry?;
            let record: ApprovalRecord = decode(&bytes)?;
            if filter.matches(&record) {
                found.push(record);
            }
        }
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    fn record_logs(&self, record_id: RecordId) -> Result<Vec<ApprovalLog>, StorageError> {
        let mut logs = Vec::new();
        for entry in self.logs.scan_prefix(id_key(record_id)) {
            let (_, bytes) = entry?;
            logs.push(decode::<ApprovalLog>(&bytes)?);
        }
        logs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(logs)
    }
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn log_key(record_id: RecordId, log_id: LogId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&record_id.to_be_bytes());
    key[8..].copy_from_slice(&log_id.to_be_bytes());
    key
}

fn read_id(bytes: &[u8]) -> Result<u64, StorageError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::Codec(format!("expected an 8 byte id, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, StorageError> {
    Ok(minicbor::to_vec(value)?)
}

fn decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(minicbor::decode(bytes)?)
}

fn abort(err: StorageError) -> ConflictableTransactionError<StorageError> {
    ConflictableTransactionError::Abort(err)
}

fn settle<T>(result: TransactionResult<T, StorageError>) -> Result<T, StorageError> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(err.into()),
    }
}

fn load_live_flow(
    flows: &TransactionalTree,
    flow_id: FlowId,
) -> ConflictableTransactionResult<FlowDefinition, StorageError> {
    let flow: FlowDefinition = match flows.get(id_key(flow_id))? {
        Some(bytes) => decode(&bytes).map_err(abort)?,
        None => return Err(abort(StorageError::FlowNotFound(flow_id))),
    };
    if flow.deleted {
        return Err(abort(StorageError::FlowNotFound(flow_id)));
    }
    Ok(flow)
}

fn claim_business_type(
    index: &TransactionalTree,
    business_type: &str,
    flow_id: FlowId,
) -> ConflictableTransactionResult<(), StorageError> {
    if let Some(bytes) = index.get(business_type.as_bytes())? {
        let existing = read_id(&bytes).map_err(abort)?;
        if existing != flow_id {
            return Err(abort(StorageError::DuplicateEnabledFlow {
                business_type: business_type.to_string(),
                existing,
            }));
        }
    }
    index.insert(business_type.as_bytes(), &id_key(flow_id)[..])?;
    Ok(())
}

// only drops the entry when it still points at this flow
fn release_business_type(
    index: &TransactionalTree,
    business_type: &str,
    flow_id: FlowId,
) -> ConflictableTransactionResult<(), StorageError> {
    if let Some(bytes) = index.get(business_type.as_bytes())? {
        if read_id(&bytes).map_err(abort)? == flow_id {
            index.remove(business_type.as_bytes())?;
        }
    }
    Ok(())
}
