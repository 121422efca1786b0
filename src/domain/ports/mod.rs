pub mod outbound;

pub use outbound::{
    Billing, InactivityClass, InactivityClassifier, LockHandle, Locks, Notifications, Pricing,
    PricingAction, Roaming, RoamingAction, RoamingProtocol, SmartCharging, TemplateApplicationResult,
    TemplateCatalog,
};
