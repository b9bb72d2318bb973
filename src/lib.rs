//! Multi-step approval workflows for LIMS business documents.
//!
//! A business type (entrustment, sample intake, report issue, ...) is bound to
//! at most one enabled [`flow::FlowDefinition`]. Submitting a document opens an
//! [`record::ApprovalRecord`] at the flow's first node; each approval moves it
//! along the ordered nodes until it is approved, rejected or cancelled. Every
//! action lands in an append-only audit trail of [`record::ApprovalLog`] rows.

pub mod api;
pub mod config;
pub mod error;
pub mod flow;
pub mod record;
pub mod service;
pub mod store;
pub mod types;

pub use error::{ApprovalError, StorageError};
pub use service::{ApprovalEngine, EngineSettings, PendingScope};
pub use store::{ApprovalRepository, SledRepository};
