//! Multi-tenancy support for the Campus platform
//!
//! This crate provides the tenant lifecycle subsystem:
//! - Organization registry with slug management and status lifecycle
//! - Tenant context binding one organization to one unit of work
//! - Tenant-scoped data access that cannot cross the tenant boundary
//! - Per-tier resource quotas enforced under concurrent mutation
//! - Append-only usage snapshots for reporting
//! - Token-based membership invitations
//! - Multi-step provisioning and deprovisioning

pub mod context;
pub mod invitation;
pub mod member;
pub mod organization;
pub mod provision;
pub mod quota;
pub mod registry;
pub mod scoped;
pub mod store;
pub mod usage_log;

pub use context::*;
pub use invitation::*;
pub use member::*;
pub use organization::*;
pub use provision::*;
pub use quota::*;
pub use registry::*;
pub use scoped::*;
pub use store::*;
pub use usage_log::*;

use campus_core::{CoreError, OrgId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Multi-tenancy errors
#[derive(Error, Debug)]
pub enum TenantError {
    /// Missing or out-of-tenant entity; the two cases are indistinguishable
    /// on purpose so record existence never leaks across the boundary.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A slug is already taken. Resolved internally by the registry's
    /// suffix loop; callers of `create` never see this.
    #[error("Duplicate slug: {0}")]
    DuplicateSlug(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: organization::OrgStatus,
        to: organization::OrgStatus,
    },

    #[error("Quota exceeded for {kind}: {current} + {requested} > {limit}")]
    QuotaExceeded {
        kind: quota::ResourceKind,
        current: u64,
        requested: u64,
        limit: u64,
    },

    #[error("Invalid invitation token")]
    InvalidToken,

    #[error("Invitation expired at {0}")]
    ExpiredInvitation(DateTime<Utc>),

    #[error("Invitation already {0}")]
    AlreadyResolved(&'static str),

    /// Programmer error: an operation reached a tenant other than the one
    /// its context is bound to. Raised immediately, never normalized.
    #[error("Tenant isolation violation: context bound to {bound}, attempted {attempted}")]
    IsolationViolation { bound: OrgId, attempted: OrgId },

    #[error("Organization is not operational: {0}")]
    NotOperational(OrgId),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Notification error: {0}")]
    Notification(String),
}

impl From<CoreError> for TenantError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Notification(msg) => Self::Notification(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TenantError>;
