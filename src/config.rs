use crate::domain::policy::{DeadlinePolicy, FeePolicy, RidePolicy};
use crate::error::{OrderError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Every tunable policy constant. Keys missing from a config file keep
/// their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub fees: FeePolicy,
    pub deadlines: DeadlinePolicy,
    pub rides: RidePolicy,
    /// How often the auto-completion sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            fees: FeePolicy::default(),
            deadlines: DeadlinePolicy::default(),
            rides: RidePolicy::default(),
            sweep_interval_secs: 300,
        }
    }
}

impl PolicyConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fees.admin_fee_threshold == 0 {
            return Err(OrderError::Config(
                "fees.admin_fee_threshold must be positive".to_string(),
            ));
        }
        if self.fees.low_admin_fee > self.fees.high_admin_fee {
            return Err(OrderError::Config(
                "fees.low_admin_fee must not exceed fees.high_admin_fee".to_string(),
            ));
        }
        if self.rides.offer_window_secs == 0 {
            return Err(OrderError::Config(
                "rides.offer_window_secs must be positive".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(OrderError::Config(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
