use serde::{Deserialize, Serialize};

/// Per-tenant switches for the billing dispatcher, passed into every billing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSettings {
    pub auto_billing_enabled: bool,
    pub auto_progress_enabled: bool,
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            auto_billing_enabled: true,
            auto_progress_enabled: true,
        }
    }
}
