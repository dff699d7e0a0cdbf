//! Request header attached to every submission.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role the calling organisation acts in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationRole {
    /// Management company, homeowners' association or housing cooperative.
    #[default]
    ManagementCompany,
    /// Resource supplier.
    ResourceSupplier,
    /// Settlement centre.
    SettlementCenter,
}

impl OrganizationRole {
    /// Suppliers and settlement centres sign as operators.
    #[must_use]
    pub fn signs_as_operator(self) -> bool {
        matches!(self, Self::ResourceSupplier | Self::SettlementCenter)
    }
}

/// Who the client acts for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// Registry identifier of the calling organisation.
    pub org_ppa_guid: Uuid,
    pub role: OrganizationRole,
}

/// Header fields sent with one submission. Built fresh for every submission
/// so each carries its own message id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub org_ppa_guid: Uuid,
    /// Unique per submission.
    pub message_id: Uuid,
    /// Creation time, milliseconds since the Unix epoch.
    pub date_ms: u64,
    pub is_operator_signature: bool,
}

impl RequestHeader {
    #[must_use]
    pub fn new(identity: &ClientIdentity, now_ms: u64) -> Self {
        Self {
            org_ppa_guid: identity.org_ppa_guid,
            message_id: Uuid::new_v4(),
            date_ms: now_ms,
            is_operator_signature: identity.role.signs_as_operator(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
