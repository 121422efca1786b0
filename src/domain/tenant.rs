//! Tenant — the isolation boundary every entity in the system hangs off.
//!
//! A single deployment serves many operators; every station, transaction,
//! id tag and consumption record belongs to exactly one tenant, and lookups
//! are always scoped by `(tenant_id, ...)` rather than by a bare identifier.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub uuid::Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TenantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }
}

/// A tenant record. Persistence of the full tenant profile (billing contact,
/// branding, EULA state) lives outside this crate; only the fields the core
/// needs to make protocol decisions are modeled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// Thresholds handed to the inactivity classifier collaborator.
    pub inactivity_threshold_secs: Option<i64>,
}

impl Tenant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TenantId::new(),
            name: name.into(),
            inactivity_threshold_secs: None,
        }
    }
}
