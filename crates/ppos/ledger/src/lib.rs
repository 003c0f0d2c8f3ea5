//! PPOS staking ledger
//!
//! The accounting layer consensus drives at block and settlement-period
//! boundaries:
//!
//! - [`restricting`]: vesting plans, pledges and debt
//! - [`staking`]: candidate stake with hesitation / matured sub-balances
//! - [`delegation`]: delegations keyed by candidate staking block
//! - [`epoch`]: block height, epoch, round and year arithmetic
//! - [`reward`]: minted block and staking rewards
//! - [`slashing`]: downtime penalties, freezes and duplicate-sign evidence
//! - [`ledger`]: the facade tying them together and running boundary batches
//! - [`call`]: `{code, ret}` dispatch for the transport
//! - [`shared`]: a cloneable handle serializing concurrent callers

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod accounts;
pub mod call;
pub mod config;
pub mod constants;
pub mod delegation;
pub mod epoch;
pub mod error;
pub mod ledger;
pub mod restricting;
pub mod reward;
pub mod shared;
pub mod slashing;
pub mod staking;

pub use accounts::Accounts;
pub use call::{Call, Response};
pub use config::EconomicConfig;
pub use delegation::{DelegationKey, DelegationLedger};
pub use epoch::EpochClock;
pub use error::{LedgerError, LedgerResult};
pub use ledger::{BlockOutcome, Ledger, Settlement};
pub use restricting::{ReleaseInput, RestrictingInfo, RestrictingLedger};
pub use reward::{FixedRewardCurve, PeriodReward, RewardCurve, ScheduledRewardCurve};
pub use shared::LedgerHandle;
pub use slashing::PenaltyEngine;
pub use staking::{
    CandidateInfo, CandidateStatus, CreateStakingRequest, Description, FundsKind, StakeLedger,
};

/// 64-byte node public key
pub type NodeId = alloy_primitives::B512;

#[cfg(test)]
pub(crate) mod test_utils {
    use alloy_primitives::{Address, U256};

    use crate::{
        config::{
            EconomicConfig, EpochConfig, RestrictingConfig, RewardConfig, SlashingConfig,
            StakingConfig,
        },
        NodeId,
    };

    /// 40-block epochs, 10-block rounds and small thresholds
    pub(crate) fn test_config() -> EconomicConfig {
        EconomicConfig {
            epoch: EpochConfig {
                consensus_round_blocks: 10,
                settlement_period_blocks: 40,
                blocks_per_year: 1_600,
            },
            staking: StakingConfig {
                min_staking: U256::from(100),
                min_increase: U256::from(10),
                min_delegation: U256::from(10),
                max_validators: 4,
                unstake_freeze_epochs: 2,
                undelegate_freeze_epochs: 1,
                exited_retention_epochs: 1,
            },
            restricting: RestrictingConfig { max_releases: 36 },
            slashing: SlashingConfig {
                slash_blocks_multiplier: 10,
                freeze_missed_blocks: 30,
                freeze_epochs: 1,
                duplicate_sign_slash_permille: 100,
                duplicate_sign_report_reward_percent: 50,
            },
            reward: RewardConfig {
                initial_block_reward: U256::from(10),
                initial_staking_reward: U256::from(1_000),
                yearly_reduction_bps: 0,
            },
        }
    }

    pub(crate) fn node(n: u8) -> NodeId {
        NodeId::repeat_byte(n)
    }

    pub(crate) fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }
}
