//! Settlement-period rewards
//!
//! Rewards are minted: a validator of the period receives
//! `blocks_produced * block_reward` plus its pro-rata share (by `shares`) of
//! the period's staking reward, credited to its benefit address.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::{debug, info};

use crate::{
    accounts::Accounts, config::RewardConfig, slashing::ProductionReport, staking::StakeLedger,
    NodeId,
};

/// Reward amounts in force for one year
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodReward {
    /// Paid per produced block
    pub block_reward: U256,
    /// Split among the period's validators by shares
    pub staking_reward: U256,
}

/// Source of reward amounts
pub trait RewardCurve: Debug + Send + Sync {
    /// Amounts for reward year `year` (1-based)
    fn reward_for(&self, year: u64) -> PeriodReward;
}

/// Initial amounts reduced by a fixed number of basis points each year
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRewardCurve {
    initial: PeriodReward,
    yearly_reduction_bps: u64,
}

impl ScheduledRewardCurve {
    /// Curve from the reward section of the economic config
    pub const fn new(config: &RewardConfig) -> Self {
        Self {
            initial: PeriodReward {
                block_reward: config.initial_block_reward,
                staking_reward: config.initial_staking_reward,
            },
            yearly_reduction_bps: config.yearly_reduction_bps,
        }
    }
}

impl RewardCurve for ScheduledRewardCurve {
    fn reward_for(&self, year: u64) -> PeriodReward {
        let keep = U256::from(10_000 - self.yearly_reduction_bps.min(10_000));
        let bps = U256::from(10_000);
        let mut reward = self.initial;
        for _ in 1..year {
            if reward.block_reward.is_zero() && reward.staking_reward.is_zero() {
                break;
            }
            reward.block_reward = reward.block_reward * keep / bps;
            reward.staking_reward = reward.staking_reward * keep / bps;
        }
        reward
    }
}

/// Fixed amounts regardless of year
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRewardCurve(pub PeriodReward);

impl RewardCurve for FixedRewardCurve {
    fn reward_for(&self, _year: u64) -> PeriodReward {
        self.0
    }
}

/// One validator's payout for a period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardPayout {
    /// Validator
    pub node_id: NodeId,
    /// Credited address
    pub benefit_address: Address,
    /// Blocks the validator produced
    pub blocks_produced: u64,
    /// `blocks_produced * block_reward`
    pub block_reward: U256,
    /// Pro-rata staking reward
    pub staking_reward: U256,
}

impl RewardPayout {
    /// Amount credited
    pub fn total(&self) -> U256 {
        self.block_reward + self.staking_reward
    }
}

/// Computes and mints period rewards
#[derive(Debug)]
pub struct RewardDistributor {
    curve: Box<dyn RewardCurve>,
}

impl RewardDistributor {
    /// Distributor over `curve`
    pub fn new(curve: impl RewardCurve + 'static) -> Self {
        Self { curve: Box::new(curve) }
    }

    /// Amounts in force for `year`
    pub fn reward_for(&self, year: u64) -> PeriodReward {
        self.curve.reward_for(year)
    }

    /// Mint rewards for the validators that served the period.
    ///
    /// Validators whose record has disappeared are skipped; their share of
    /// the staking reward is not redistributed.
    pub fn distribute(
        &self,
        accounts: &mut Accounts,
        staking: &StakeLedger,
        validators: &[NodeId],
        production: &ProductionReport,
        reward: PeriodReward,
    ) -> Vec<RewardPayout> {
        let total_shares = validators
            .iter()
            .filter_map(|id| staking.get(id))
            .fold(U256::ZERO, |acc, c| acc + c.shares());

        let mut payouts = Vec::with_capacity(validators.len());
        for node_id in validators {
            let Some(candidate) = staking.get(node_id) else { continue };
            let blocks_produced = production.produced(node_id);
            let staking_reward = if total_shares.is_zero() {
                U256::ZERO
            } else {
                reward.staking_reward * candidate.shares() / total_shares
            };
            let payout = RewardPayout {
                node_id: *node_id,
                benefit_address: candidate.benefit_address,
                blocks_produced,
                block_reward: reward.block_reward * U256::from(blocks_produced),
                staking_reward,
            };
            accounts.mint(payout.benefit_address, payout.total());
            debug!(
                target: "ppos::reward",
                %node_id,
                benefit = %payout.benefit_address,
                blocks = blocks_produced,
                amount = %payout.total(),
                "Reward paid"
            );
            payouts.push(payout);
        }
        let minted = payouts.iter().fold(U256::ZERO, |acc, p| acc + p.total());
        info!(target: "ppos::reward", validators = payouts.len(), %minted, "Distributed period rewards");
        payouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        restricting::RestrictingLedger,
        staking::{CreateStakingRequest, Description, FundsKind},
        test_utils::{addr, node, test_config},
        EpochClock,
    };

    #[test]
    fn test_scheduled_curve_reduces_yearly() {
        let curve = ScheduledRewardCurve::new(&RewardConfig {
            initial_block_reward: U256::from(1000),
            initial_staking_reward: U256::from(8000),
            yearly_reduction_bps: 2_500,
        });
        assert_eq!(curve.reward_for(1).block_reward, U256::from(1000));
        assert_eq!(curve.reward_for(2).block_reward, U256::from(750));
        assert_eq!(curve.reward_for(3).staking_reward, U256::from(4500));
    }

    #[test]
    fn test_distribution_exact() {
        let config = test_config();
        let clock = EpochClock::new(&config.epoch);
        let mut accounts = Accounts::new();
        let mut restricting = RestrictingLedger::new(36);
        let mut staking = StakeLedger::new(config.staking);
        for (n, amount) in [(1u8, 1000u64), (2, 3000)] {
            accounts.allocate(addr(n), U256::from(amount));
            let request = CreateStakingRequest {
                node_id: node(n),
                staking_address: addr(n),
                funds_kind: FundsKind::Free,
                benefit_address: addr(n + 100).to_string(),
                amount: U256::from(amount),
                description: Description::default(),
            };
            staking.create(&mut accounts, &mut restricting, &clock, request).unwrap();
        }

        let mut production = ProductionReport::default();
        for _ in 0..3 {
            production.record_block(node(1));
        }
        let reward = PeriodReward { block_reward: U256::from(10), staking_reward: U256::from(1001) };
        let distributor = RewardDistributor::new(FixedRewardCurve(reward));
        let payouts = distributor.distribute(
            &mut accounts,
            &staking,
            &[node(1), node(2)],
            &production,
            reward,
        );

        assert_eq!(payouts.len(), 2);
        // 3 * 10 + 1001 * 1000 / 4000
        assert_eq!(accounts.balance(&addr(101)), U256::from(30 + 250));
        // 0 * 10 + 1001 * 3000 / 4000
        assert_eq!(accounts.balance(&addr(102)), U256::from(750));
        assert_eq!(accounts.total_issued(), U256::from(1030));
    }
}
