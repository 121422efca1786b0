//! Registration token — the opaque string a brand-new station must present
//! during its first BootNotification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationToken {
    pub tenant_id: TenantId,
    pub token: String,
    pub expiration_date: Option<DateTime<Utc>>,
    pub revocation_date: Option<DateTime<Utc>>,
    pub site_area_id: Option<String>,
}

impl RegistrationToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(revoked) = self.revocation_date {
            if revoked <= now {
                return false;
            }
        }
        if let Some(expires) = self.expiration_date {
            if expires <= now {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> RegistrationToken {
        RegistrationToken {
            tenant_id: TenantId::new(),
            token: "abc123".to_string(),
            expiration_date: None,
            revocation_date: None,
            site_area_id: None,
        }
    }

    #[test]
    fn valid_with_no_bounds() {
        assert!(token().is_valid_at(Utc::now()));
    }

    #[test]
    fn invalid_once_revoked() {
        let mut t = token();
        t.revocation_date = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(!t.is_valid_at(Utc::now()));
    }

    #[test]
    fn invalid_once_expired() {
        let mut t = token();
        t.expiration_date = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(!t.is_valid_at(Utc::now()));
    }
}
