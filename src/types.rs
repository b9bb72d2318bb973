//! Shared identifiers, timestamps and the small enums every approval row carries
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApprovalError;

pub type FlowId = u64;
pub type NodeId = u64;
pub type RecordId = u64;
pub type LogId = u64;
pub type UserId = u64;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Lifecycle of an approval record. Everything except `Pending` is terminal.
#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
#[cbor(index_only)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Cancelled,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an audit log entry records.
#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
#[cbor(index_only)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalAction {
    #[n(0)]
    Submit,
    #[n(1)]
    Approve,
    #[n(2)]
    Reject,
    // reserved: logged but never moves a record
    #[n(3)]
    Transfer,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Transfer => "transfer",
        }
    }
}

impl fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subset of actions a reviewer may take on a pending record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
    Transfer,
}

impl From<ReviewAction> for ApprovalAction {
    fn from(value: ReviewAction) -> Self {
        match value {
            ReviewAction::Approve => ApprovalAction::Approve,
            ReviewAction::Reject => ApprovalAction::Reject,
            ReviewAction::Transfer => ApprovalAction::Transfer,
        }
    }
}

impl FromStr for ReviewAction {
    type Err = ApprovalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "transfer" => Ok(Self::Transfer),
            other => Err(ApprovalError::InvalidAction(other.to_string())),
        }
    }
}

/// Who may act on a node.
#[derive(minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "approver_type", rename_all = "lowercase")]
pub enum ApproverSelector {
    #[n(0)]
    Role {
        #[n(0)]
        #[serde(rename = "approver_ids")]
        ids: Vec<u64>,
    },
    #[n(1)]
    User {
        #[n(0)]
        #[serde(rename = "approver_ids")]
        ids: Vec<u64>,
    },
    #[n(2)]
    Dept {
        #[n(0)]
        #[serde(rename = "approver_ids")]
        ids: Vec<u64>,
    },
}

impl ApproverSelector {
    /// Parses the legacy `(approver_type, "1,2,3")` pair.
    pub fn parse(kind: &str, ids: &str) -> Result<Self, ApprovalError> {
        let ids = ids
            .split([',', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u64>()
                    .map_err(|_| ApprovalError::InvalidSelector(format!("invalid approver id `{s}`")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        match kind.trim().to_ascii_lowercase().as_str() {
            "role" => Ok(Self::Role { ids }),
            "user" => Ok(Self::User { ids }),
            "dept" => Ok(Self::Dept { ids }),
            other => Err(ApprovalError::InvalidSelector(format!(
                "unknown approver type `{other}`"
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Role { .. } => "role",
            Self::User { .. } => "user",
            Self::Dept { .. } => "dept",
        }
    }

    pub fn ids(&self) -> &[u64] {
        match self {
            Self::Role { ids } | Self::User { ids } | Self::Dept { ids } => ids,
        }
    }

    /// Comma-delimited form of the target ids.
    pub fn encoded_ids(&self) -> String {
        self.ids()
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn matches(&self, actor: &Actor) -> bool {
        match self {
            Self::User { ids } => ids.contains(&actor.id),
            Self::Role { ids } => actor.role_ids.iter().any(|r| ids.contains(r)),
            Self::Dept { ids } => actor.dept_id.is_some_and(|d| ids.contains(&d)),
        }
    }
}

/// An already-authenticated caller. The engine never resolves this itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub role_ids: Vec<u64>,
    #[serde(default)]
    pub dept_id: Option<u64>,
}

impl Actor {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            role_ids: vec![],
            dept_id: None,
        }
    }
    pub fn with_roles(mut self, role_ids: Vec<u64>) -> Self {
        self.role_ids = role_ids;
        self
    }
    pub fn with_dept(mut self, dept_id: u64) -> Self {
        self.dept_id = Some(dept_id);
        self
    }
}
