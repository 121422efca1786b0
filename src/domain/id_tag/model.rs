//! Id tag (RFID/token) and the user it authenticates, as consumed by the
//! Transaction Engine's authorization resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;

/// The OCPP wire limit on an idTag: 20 bytes.
pub const ID_TAG_MAX_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdTagAuthStatus {
    Accepted,
    Invalid,
    Blocked,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    Active,
    Blocked,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub tenant_id: TenantId,
    pub id: String,
    pub status: UserStatus,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Last car the user selected; cleared unconditionally at transaction
    /// start per the source system's (unclear, preserved) behavior — see
    /// the open question recorded for this in the design ledger.
    pub default_car_id: Option<String>,
}

/// A local idTag record: who it belongs to and whether it's currently
/// usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTag {
    pub tenant_id: TenantId,
    pub tag_id: String,
    pub user_id: String,
    pub active: bool,
    pub blocked: bool,
    pub expiration_date: Option<DateTime<Utc>>,
    /// Roaming tags carry an authorization id from the external network;
    /// `None` for a purely local tag.
    pub roaming_authorization_id: Option<String>,
    /// Whether this tag is permitted to start a transaction on the given
    /// station — delegated upstream (site-area assignment rules); the core
    /// only consumes the boolean predicate.
    pub can_start_on_station: bool,
}

impl IdTag {
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        if self.blocked || !self.active {
            return false;
        }
        if let Some(expires) = self.expiration_date {
            if expires <= now {
                return false;
            }
        }
        true
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> IdTagAuthStatus {
        if self.blocked {
            return IdTagAuthStatus::Blocked;
        }
        if let Some(expires) = self.expiration_date {
            if expires <= now {
                return IdTagAuthStatus::Expired;
            }
        }
        if self.active {
            IdTagAuthStatus::Accepted
        } else {
            IdTagAuthStatus::Invalid
        }
    }
}

/// Validate tag length/emptiness against the boundary rule: 20 bytes
/// accepted, 21 rejected, empty/null rejected. Numeric tags are accepted
/// in both integer and string form — since both arrive as `&str` here,
/// that just means no extra parsing is required.
pub fn validate_tag_shape(tag: &str) -> Result<(), IdTagAuthStatus> {
    if tag.is_empty() || tag.len() > ID_TAG_MAX_LEN {
        return Err(IdTagAuthStatus::Invalid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_length_boundary() {
        assert!(validate_tag_shape(&"A".repeat(20)).is_ok());
        assert_eq!(validate_tag_shape(&"A".repeat(21)), Err(IdTagAuthStatus::Invalid));
        assert_eq!(validate_tag_shape(""), Err(IdTagAuthStatus::Invalid));
    }
}
