//! Consumption — one interval of energy use within a transaction, as
//! produced by the Consumption Builder.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;

/// Limit metadata carried through from the most recent charging-profile
/// context, if any was active when the interval was built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitContext {
    pub source: String,
    pub limit_amps: f64,
}

/// Pricing snapshot attached by the pricing collaborator, inline;
/// `None` until priced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub price: Decimal,
    pub rounded_price: Decimal,
    pub price_unit: String,
    pub pricing_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumption {
    pub tenant_id: TenantId,
    pub transaction_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub consumption_wh: f64,
    pub instant_watts: f64,
    pub instant_amps: f64,
    pub cumulated_consumption_wh: f64,
    pub state_of_charge: Option<u8>,
    pub limit: Option<LimitContext>,
    pub pricing: Option<PricingSnapshot>,
}

impl Consumption {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: TenantId,
        transaction_id: i64,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        consumption_wh: f64,
        instant_watts: f64,
        instant_amps: f64,
        cumulated_consumption_wh: f64,
    ) -> Self {
        Self {
            tenant_id,
            transaction_id,
            started_at,
            ended_at,
            consumption_wh,
            instant_watts,
            instant_amps,
            cumulated_consumption_wh,
            state_of_charge: None,
            limit: None,
            pricing: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.consumption_wh <= 0.0
    }

    pub fn interval_secs(&self) -> i64 {
        (self.ended_at - self.started_at).num_seconds()
    }
}
