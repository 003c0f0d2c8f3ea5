//! Economic configuration of the ledger
//!
//! Every tunable the ledger consults lives here, grouped the same way the
//! genesis file groups them. All sections deserialize with defaults, so a
//! genesis file only needs to name the values it changes.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{lat, MAX_RESTRICTING_RELEASES},
    error::{LedgerError, LedgerResult},
};

/// Block-height periods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EpochConfig {
    /// Blocks per consensus round
    pub consensus_round_blocks: u64,
    /// Blocks per settlement period (epoch)
    pub settlement_period_blocks: u64,
    /// Blocks per reward year
    pub blocks_per_year: u64,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            consensus_round_blocks: 250,
            settlement_period_blocks: 10_750,
            blocks_per_year: 31_536_000,
        }
    }
}

/// Candidate and delegation thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StakingConfig {
    /// Minimum amount to create a candidate
    pub min_staking: U256,
    /// Minimum amount per `increaseStaking`
    pub min_increase: U256,
    /// Minimum amount per delegation and per partial undelegation
    pub min_delegation: U256,
    /// Size of the elected validator set
    pub max_validators: usize,
    /// Settlement periods matured stake stays locked after a withdrawal
    pub unstake_freeze_epochs: u64,
    /// Settlement periods matured delegations stay locked after undelegating
    pub undelegate_freeze_epochs: u64,
    /// Settlement periods an exited record stays queryable
    pub exited_retention_epochs: u64,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            min_staking: lat(100_000),
            min_increase: lat(10),
            min_delegation: lat(10),
            max_validators: 101,
            unstake_freeze_epochs: 2,
            undelegate_freeze_epochs: 1,
            exited_retention_epochs: 1,
        }
    }
}

/// Restricting plan limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RestrictingConfig {
    /// Maximum release entries per plan call
    pub max_releases: usize,
}

impl Default for RestrictingConfig {
    fn default() -> Self {
        Self { max_releases: MAX_RESTRICTING_RELEASES }
    }
}

/// Penalty parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SlashingConfig {
    /// Downtime penalty expressed in block rewards
    pub slash_blocks_multiplier: u64,
    /// Cumulative missed blocks that freeze a candidate (0 disables freezing)
    pub freeze_missed_blocks: u64,
    /// Settlement periods a freeze lasts beyond the current one
    pub freeze_epochs: u64,
    /// Share of matured stake burned on duplicate signing, per mille
    pub duplicate_sign_slash_permille: u64,
    /// Share of the duplicate-sign penalty paid to the reporter, percent
    pub duplicate_sign_report_reward_percent: u64,
}

impl Default for SlashingConfig {
    fn default() -> Self {
        Self {
            slash_blocks_multiplier: 250,
            freeze_missed_blocks: 500,
            freeze_epochs: 1,
            duplicate_sign_slash_permille: 10,
            duplicate_sign_report_reward_percent: 50,
        }
    }
}

/// Reward curve parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RewardConfig {
    /// Reward per produced block in year one
    pub initial_block_reward: U256,
    /// Staking reward pool per settlement period in year one
    pub initial_staking_reward: U256,
    /// Yearly reduction of both amounts, basis points
    pub yearly_reduction_bps: u64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            initial_block_reward: lat(1),
            initial_staking_reward: lat(20_000),
            yearly_reduction_bps: 0,
        }
    }
}

/// Complete economic configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomicConfig {
    /// Epoch lengths
    pub epoch: EpochConfig,
    /// Staking thresholds
    pub staking: StakingConfig,
    /// Restricting limits
    pub restricting: RestrictingConfig,
    /// Penalty parameters
    pub slashing: SlashingConfig,
    /// Reward curve
    pub reward: RewardConfig,
}

impl EconomicConfig {
    /// Production parameters
    pub fn mainnet() -> Self {
        Self::default()
    }

    /// Public test network: shorter periods, lower thresholds
    pub fn testnet() -> Self {
        Self {
            epoch: EpochConfig {
                consensus_round_blocks: 250,
                settlement_period_blocks: 1_000,
                blocks_per_year: 3_153_600,
            },
            staking: StakingConfig { min_staking: lat(10_000), ..Default::default() },
            ..Default::default()
        }
    }

    /// Local development: tiny periods so every transition is reachable quickly
    pub fn devnet() -> Self {
        Self {
            epoch: EpochConfig {
                consensus_round_blocks: 10,
                settlement_period_blocks: 40,
                blocks_per_year: 1_600,
            },
            staking: StakingConfig {
                min_staking: lat(1_000),
                max_validators: 25,
                ..Default::default()
            },
            slashing: SlashingConfig {
                slash_blocks_multiplier: 10,
                freeze_missed_blocks: 20,
                ..Default::default()
            },
            reward: RewardConfig {
                initial_block_reward: lat(1),
                initial_staking_reward: lat(1_000),
                yearly_reduction_bps: 2_500,
            },
            ..Default::default()
        }
    }

    /// Reject configurations the ledger cannot run with.
    pub fn validate(&self) -> LedgerResult<()> {
        let epoch = &self.epoch;
        if epoch.consensus_round_blocks == 0 || epoch.settlement_period_blocks == 0 {
            return Err(LedgerError::InvalidConfig("period lengths must be non-zero".into()));
        }
        if epoch.settlement_period_blocks % epoch.consensus_round_blocks != 0 {
            return Err(LedgerError::InvalidConfig(format!(
                "settlement period {} is not a multiple of consensus round {}",
                epoch.settlement_period_blocks, epoch.consensus_round_blocks
            )));
        }
        if epoch.blocks_per_year == 0 {
            return Err(LedgerError::InvalidConfig("blocksPerYear must be non-zero".into()));
        }
        if self.restricting.max_releases == 0 {
            return Err(LedgerError::InvalidConfig("maxReleases must be non-zero".into()));
        }
        if self.staking.max_validators == 0 {
            return Err(LedgerError::InvalidConfig("maxValidators must be non-zero".into()));
        }
        if self.staking.min_staking.is_zero() || self.staking.min_delegation.is_zero() {
            return Err(LedgerError::InvalidConfig("minimum amounts must be non-zero".into()));
        }
        if self.slashing.duplicate_sign_slash_permille > 1_000 {
            return Err(LedgerError::InvalidConfig("slash permille exceeds 1000".into()));
        }
        if self.slashing.duplicate_sign_report_reward_percent > 100 {
            return Err(LedgerError::InvalidConfig("report reward percent exceeds 100".into()));
        }
        if self.reward.yearly_reduction_bps > 10_000 {
            return Err(LedgerError::InvalidConfig("yearly reduction exceeds 10000 bps".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(EconomicConfig::mainnet().validate().is_ok());
        assert!(EconomicConfig::testnet().validate().is_ok());
        assert!(EconomicConfig::devnet().validate().is_ok());
    }

    #[test]
    fn test_period_must_align_with_round() {
        let mut config = EconomicConfig::devnet();
        config.epoch.settlement_period_blocks = 45;
        assert!(matches!(config.validate(), Err(LedgerError::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EconomicConfig =
            serde_json::from_str(r#"{"epoch":{"settlementPeriodBlocks":500}}"#).unwrap();
        assert_eq!(config.epoch.settlement_period_blocks, 500);
        assert_eq!(config.epoch.consensus_round_blocks, 250);
        assert_eq!(config.restricting.max_releases, 36);
    }

    #[test]
    fn test_amounts_accept_decimal_strings() {
        let config: EconomicConfig =
            serde_json::from_str(r#"{"staking":{"minStaking":"1000"}}"#).unwrap();
        assert_eq!(config.staking.min_staking, U256::from(1000));
    }
}
