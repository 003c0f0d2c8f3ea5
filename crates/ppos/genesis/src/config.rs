//! Genesis configuration types

use alloy_primitives::{Address, U256};
use ppos_ledger::{constants::is_system_account, CreateStakingRequest, EconomicConfig, ReleaseInput};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, path::Path};

use crate::GenesisError;

/// Network preset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Production mainnet
    Mainnet,
    /// Public testnet
    Testnet,
    /// Local development
    #[default]
    Devnet,
}

impl NetworkType {
    /// Economic parameters of the preset
    pub fn economic(&self) -> EconomicConfig {
        match self {
            Self::Mainnet => EconomicConfig::mainnet(),
            Self::Testnet => EconomicConfig::testnet(),
            Self::Devnet => EconomicConfig::devnet(),
        }
    }
}

impl std::str::FromStr for NetworkType {
    type Err = GenesisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "devnet" => Ok(Self::Devnet),
            other => Err(GenesisError::InvalidConfig(format!("unknown network {other}"))),
        }
    }
}

/// A free balance credited in genesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Account address
    pub address: Address,
    /// Initial balance in von
    pub balance: U256,
    /// Purpose
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Allocation {
    /// Create a new allocation
    pub fn new(address: Address, balance: U256, description: impl Into<String>) -> Self {
        Self { address, balance, description: description.into() }
    }
}

/// A vesting plan created at genesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisRestrictingPlan {
    /// Account the plan is funded from
    pub from: Address,
    /// Beneficiary
    pub account: Address,
    /// Release schedule, epochs relative to genesis
    pub plans: Vec<ReleaseInput>,
}

/// Genesis configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisConfig {
    /// Network preset
    pub network: NetworkType,
    /// Economic parameters; the network preset when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economic: Option<EconomicConfig>,
    /// Free balances
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    /// Vesting plans, applied after allocations
    #[serde(default)]
    pub restricting_plans: Vec<GenesisRestrictingPlan>,
    /// Candidates staked at genesis, applied after plans
    #[serde(default)]
    pub validators: Vec<CreateStakingRequest>,
}

impl GenesisConfig {
    /// Empty config for `network`
    pub fn new(network: NetworkType) -> Self {
        Self { network, ..Default::default() }
    }

    /// Empty devnet config
    pub fn devnet() -> Self {
        Self::new(NetworkType::Devnet)
    }

    /// Add a free balance.
    pub fn with_allocation(mut self, allocation: Allocation) -> Self {
        self.allocations.push(allocation);
        self
    }

    /// Add a vesting plan.
    pub fn with_restricting_plan(mut self, plan: GenesisRestrictingPlan) -> Self {
        self.restricting_plans.push(plan);
        self
    }

    /// Add a genesis candidate.
    pub fn with_validator(mut self, request: CreateStakingRequest) -> Self {
        self.validators.push(request);
        self
    }

    /// Effective economic parameters
    pub fn economic(&self) -> EconomicConfig {
        self.economic.clone().unwrap_or_else(|| self.network.economic())
    }

    /// Sum of all allocations
    pub fn total_allocated(&self) -> U256 {
        self.allocations.iter().map(|a| a.balance).fold(U256::ZERO, |acc, b| acc + b)
    }

    /// Check the config before building.
    ///
    /// Ledger-level rules (thresholds, schedules, checksums) are enforced
    /// while building; this only rejects what the ledger would silently
    /// accept.
    pub fn validate(&self) -> Result<(), GenesisError> {
        self.economic().validate().map_err(|e| GenesisError::InvalidConfig(e.to_string()))?;

        let mut seen = BTreeSet::new();
        for allocation in &self.allocations {
            if !seen.insert(allocation.address) {
                return Err(GenesisError::InvalidConfig(format!(
                    "duplicate allocation for {}",
                    allocation.address
                )));
            }
            if is_system_account(&allocation.address) {
                return Err(GenesisError::InvalidConfig(format!(
                    "allocation to system account {}",
                    allocation.address
                )));
            }
            if allocation.balance.is_zero() {
                return Err(GenesisError::InvalidConfig(format!(
                    "zero allocation for {}",
                    allocation.address
                )));
            }
        }

        let mut nodes = BTreeSet::new();
        for validator in &self.validators {
            if !nodes.insert(validator.node_id) {
                return Err(GenesisError::InvalidConfig(format!(
                    "duplicate genesis validator {}",
                    validator.node_id
                )));
            }
        }
        Ok(())
    }

    /// Read a config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GenesisError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), GenesisError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppos_ledger::constants::{lat, STAKING_POOL};

    #[test]
    fn test_network_presets() {
        assert_eq!(NetworkType::Mainnet.economic(), EconomicConfig::mainnet());
        assert_eq!(NetworkType::Devnet.economic(), EconomicConfig::devnet());
        assert_eq!("testnet".parse::<NetworkType>().unwrap(), NetworkType::Testnet);
        assert!("moonnet".parse::<NetworkType>().is_err());
    }

    #[test]
    fn test_economic_override() {
        let mut config = GenesisConfig::new(NetworkType::Mainnet);
        assert_eq!(config.economic(), EconomicConfig::mainnet());
        config.economic = Some(EconomicConfig::devnet());
        assert_eq!(config.economic(), EconomicConfig::devnet());
    }

    #[test]
    fn test_validation() {
        let addr = Address::repeat_byte(1);
        let config = GenesisConfig::devnet()
            .with_allocation(Allocation::new(addr, U256::from(100), "Test 1"))
            .with_allocation(Allocation::new(addr, U256::from(200), "Test 2"));
        assert!(config.validate().is_err());

        let config =
            GenesisConfig::devnet().with_allocation(Allocation::new(STAKING_POOL, lat(1), ""));
        assert!(config.validate().is_err());

        let config = GenesisConfig::devnet()
            .with_allocation(Allocation::new(addr, U256::ZERO, ""));
        assert!(config.validate().is_err());

        let config = GenesisConfig::devnet()
            .with_allocation(Allocation::new(addr, lat(5), ""))
            .with_allocation(Allocation::new(Address::repeat_byte(2), lat(7), ""));
        config.validate().unwrap();
        assert_eq!(config.total_allocated(), lat(12));
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{"network":"testnet","allocations":[{"address":"0x0101010101010101010101010101010101010101","balance":"1000"}]}"#;
        let config: GenesisConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.network, NetworkType::Testnet);
        assert_eq!(config.economic(), EconomicConfig::testnet());
        assert_eq!(config.allocations[0].balance, U256::from(1_000));
        assert!(config.validators.is_empty());
    }
}
