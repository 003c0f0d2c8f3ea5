//! Genesis ledger builder

use ppos_ledger::Ledger;
use std::path::Path;
use tracing::info;

use crate::{GenesisConfig, GenesisError};

/// Builds a ready [`Ledger`] from a [`GenesisConfig`]
#[derive(Debug)]
pub struct GenesisBuilder {
    config: GenesisConfig,
}

impl GenesisBuilder {
    /// Create a new genesis builder
    pub const fn new(config: GenesisConfig) -> Self {
        Self { config }
    }

    /// Create a devnet genesis builder
    pub fn devnet() -> Self {
        Self::new(GenesisConfig::devnet())
    }

    /// Load the config from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GenesisError> {
        Ok(Self::new(GenesisConfig::load(path)?))
    }

    /// The config being built
    pub const fn config(&self) -> &GenesisConfig {
        &self.config
    }

    /// Apply allocations, restricting plans and genesis stake, then elect the
    /// first validator set.
    pub fn build(&self) -> Result<Ledger, GenesisError> {
        self.config.validate()?;
        let mut ledger = Ledger::new(self.config.economic())
            .map_err(|e| GenesisError::InvalidConfig(e.to_string()))?;

        for allocation in &self.config.allocations {
            ledger.allocate(allocation.address, allocation.balance);
        }
        for plan in &self.config.restricting_plans {
            ledger
                .create_restricting_plan(plan.from, plan.account, &plan.plans)
                .map_err(GenesisError::rejected("restricting plan"))?;
        }
        for validator in &self.config.validators {
            ledger
                .create_staking(validator.clone())
                .map_err(GenesisError::rejected("staking"))?;
        }

        let elected = ledger.complete_genesis().len();
        ledger.check_invariants().map_err(GenesisError::InvalidConfig)?;

        info!(
            target: "ppos::genesis",
            network = ?self.config.network,
            allocated = %self.config.total_allocated(),
            plans = self.config.restricting_plans.len(),
            elected,
            "Genesis ledger built"
        );
        Ok(ledger)
    }

    /// Write the config to a JSON file
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), GenesisError> {
        self.config.save(path)
    }

    /// Config as a JSON string
    pub fn to_json(&self) -> Result<String, GenesisError> {
        Ok(serde_json::to_string_pretty(&self.config)?)
    }
}
