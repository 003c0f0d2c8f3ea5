//! The ledger facade
//!
//! [`Ledger`] owns every component and is the only type that mutates more
//! than one of them at a time. Client operations validate completely before
//! touching state, so a rejected call leaves the ledger unchanged.
//! [`Ledger::advance_block`] finishes the executing block; when it closes a
//! settlement period the whole boundary batch runs inside that one call.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    accounts::Accounts,
    config::EconomicConfig,
    constants::{RESTRICTING_POOL, STAKING_POOL},
    delegation::{DelegationInfo, DelegationKey, DelegationLedger, UndelegateOutcome},
    epoch::{BlockTick, EpochClock},
    error::LedgerResult,
    restricting::{ReleaseInput, RestrictingInfo, RestrictingLedger},
    reward::{PeriodReward, RewardCurve, RewardDistributor, RewardPayout, ScheduledRewardCurve},
    slashing::{PenaltyEngine, SlashRecord},
    staking::{
        CandidateInfo, CreateStakingRequest, Description, FundsKind, StakeLedger, WithdrawOutcome,
    },
    NodeId,
};

/// Work done at a settlement boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    /// Epoch that ended
    pub epoch: u64,
    /// Reward year of the boundary block
    pub year: u64,
    /// Amounts used for the period
    pub reward: PeriodReward,
    /// Minted rewards
    pub payouts: Vec<RewardPayout>,
    /// Downtime penalties and freezes
    pub penalties: Vec<SlashRecord>,
    /// Candidates whose locked stake was refunded
    pub unstaked: Vec<NodeId>,
    /// Undelegated coins returned
    pub undelegated: U256,
    /// Exited records deleted
    pub pruned: Vec<NodeId>,
    /// Freezes lifted
    pub unfrozen: Vec<NodeId>,
    /// Validator set for the next epoch
    pub validators: Vec<NodeId>,
}

/// Result of finishing one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockOutcome {
    /// Finished block
    #[serde(flatten)]
    pub tick: BlockTick,
    /// Restricting releases paid out
    pub matured: U256,
    /// Boundary work, when the block closed a settlement period
    pub settlement: Option<Settlement>,
}

/// Staking, restricting and slashing state of a chain
#[derive(Debug)]
pub struct Ledger {
    config: EconomicConfig,
    clock: EpochClock,
    accounts: Accounts,
    restricting: RestrictingLedger,
    staking: StakeLedger,
    delegations: DelegationLedger,
    penalties: PenaltyEngine,
    rewards: RewardDistributor,
    /// Validators serving the current epoch
    validators: Vec<NodeId>,
}

impl Ledger {
    /// Empty ledger positioned at block 1
    pub fn new(config: EconomicConfig) -> LedgerResult<Self> {
        config.validate()?;
        Ok(Self {
            clock: EpochClock::new(&config.epoch),
            accounts: Accounts::new(),
            restricting: RestrictingLedger::new(config.restricting.max_releases),
            staking: StakeLedger::new(config.staking.clone()),
            delegations: DelegationLedger::new(),
            penalties: PenaltyEngine::new(config.slashing.clone()),
            rewards: RewardDistributor::new(ScheduledRewardCurve::new(&config.reward)),
            validators: Vec::new(),
            config,
        })
    }

    /// Replace the configured reward curve
    pub fn with_reward_curve(mut self, curve: impl RewardCurve + 'static) -> Self {
        self.rewards = RewardDistributor::new(curve);
        self
    }

    /// Economic configuration
    pub const fn config(&self) -> &EconomicConfig {
        &self.config
    }

    /// Block and period position
    pub const fn clock(&self) -> &EpochClock {
        &self.clock
    }

    /// Free balances
    pub const fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    /// Restricting plans
    pub const fn restricting(&self) -> &RestrictingLedger {
        &self.restricting
    }

    /// Candidate records
    pub const fn staking(&self) -> &StakeLedger {
        &self.staking
    }

    /// Delegation records
    pub const fn delegations(&self) -> &DelegationLedger {
        &self.delegations
    }

    /// Penalty state
    pub const fn penalties(&self) -> &PenaltyEngine {
        &self.penalties
    }

    /// Free balance of `address`
    pub fn balance(&self, address: &Address) -> U256 {
        self.accounts.balance(address)
    }

    /// Block currently executing
    pub const fn block_number(&self) -> u64 {
        self.clock.height()
    }

    /// Epoch of the executing block
    pub const fn current_epoch(&self) -> u64 {
        self.clock.current_epoch()
    }

    /// Validators serving the current epoch
    pub fn validators(&self) -> &[NodeId] {
        &self.validators
    }

    /// Credit a genesis allocation.
    pub fn allocate(&mut self, address: Address, amount: U256) {
        self.accounts.allocate(address, amount);
    }

    /// Lock funds of `funder` for `beneficiary`.
    pub fn create_restricting_plan(
        &mut self,
        funder: Address,
        beneficiary: Address,
        releases: &[ReleaseInput],
    ) -> LedgerResult<()> {
        self.restricting.create_plan(&mut self.accounts, &self.clock, funder, beneficiary, releases)
    }

    /// Register a candidate.
    pub fn create_staking(&mut self, request: CreateStakingRequest) -> LedgerResult<()> {
        self.staking.create(&mut self.accounts, &mut self.restricting, &self.clock, request)
    }

    /// Add stake to a candidate.
    pub fn increase_staking(
        &mut self,
        node_id: NodeId,
        kind: FundsKind,
        amount: U256,
    ) -> LedgerResult<()> {
        self.staking.increase(
            &mut self.accounts,
            &mut self.restricting,
            &self.clock,
            node_id,
            kind,
            amount,
        )
    }

    /// Update benefit address and/or description.
    pub fn edit_candidate(
        &mut self,
        node_id: NodeId,
        benefit_address: Option<&str>,
        description: Option<Description>,
    ) -> LedgerResult<()> {
        self.staking.edit(&self.clock, node_id, benefit_address, description)
    }

    /// Start a full withdrawal.
    pub fn withdrew_staking(&mut self, node_id: NodeId) -> LedgerResult<WithdrawOutcome> {
        self.staking.withdraw(&mut self.accounts, &mut self.restricting, &self.clock, node_id)
    }

    /// Delegate to a candidate.
    pub fn delegate(
        &mut self,
        delegator: Address,
        node_id: NodeId,
        kind: FundsKind,
        amount: U256,
    ) -> LedgerResult<DelegationKey> {
        self.delegations.delegate(
            &mut self.accounts,
            &mut self.restricting,
            &mut self.staking,
            &self.clock,
            delegator,
            node_id,
            kind,
            amount,
        )
    }

    /// Withdraw (part of) a delegation.
    pub fn withdrew_delegate(
        &mut self,
        delegator: Address,
        node_id: NodeId,
        staking_block_num: u64,
        amount: U256,
    ) -> LedgerResult<UndelegateOutcome> {
        self.delegations.withdraw(
            &mut self.accounts,
            &mut self.restricting,
            &mut self.staking,
            &self.clock,
            DelegationKey { delegator, node_id, staking_block_num },
            amount,
        )
    }

    /// Punish duplicate signing reported by `reporter`.
    pub fn report_duplicate_sign(
        &mut self,
        reporter: Address,
        node_id: NodeId,
        evidence_block: u64,
    ) -> LedgerResult<SlashRecord> {
        self.penalties.report_duplicate_sign(
            &mut self.accounts,
            &mut self.restricting,
            &mut self.staking,
            &self.clock,
            node_id,
            evidence_block,
            reporter,
        )
    }

    /// Candidate query
    pub fn candidate_info(&self, node_id: &NodeId) -> LedgerResult<CandidateInfo> {
        self.staking.query(node_id)
    }

    /// Restricting plan query
    pub fn restricting_info(&self, account: &Address) -> LedgerResult<RestrictingInfo> {
        self.restricting.query(&self.clock, account)
    }

    /// Delegation query
    pub fn delegation_info(
        &self,
        delegator: Address,
        node_id: NodeId,
        staking_block_num: u64,
    ) -> LedgerResult<DelegationInfo> {
        self.delegations.query(&DelegationKey { delegator, node_id, staking_block_num })
    }

    /// Query view of the current validators
    pub fn validator_list(&self) -> Vec<CandidateInfo> {
        self.validators.iter().filter_map(|id| self.staking.query(id).ok()).collect()
    }

    /// Query view of every candidate record
    pub fn candidate_list(&self) -> Vec<CandidateInfo> {
        self.staking.iter().filter_map(|c| self.staking.query(&c.node_id).ok()).collect()
    }

    /// Set the slots consensus assigned to `node_id` this period.
    pub fn assign_slots(&mut self, node_id: NodeId, slots: u64) {
        self.penalties.report_mut().assign_slots(node_id, slots);
    }

    /// Producer of `height` under the default schedule: each validator owns
    /// an equal contiguous run of the period's blocks.
    pub fn scheduled_producer(&self, height: u64) -> Option<NodeId> {
        if self.validators.is_empty() {
            return None;
        }
        let period = self.clock.settlement_period();
        let slots = (period / self.validators.len() as u64).max(1);
        let offset = (height.saturating_sub(1) % period) / slots;
        let index = (offset as usize).min(self.validators.len() - 1);
        Some(self.validators[index])
    }

    /// Mature the genesis stake and elect the first validator set.
    pub fn complete_genesis(&mut self) -> &[NodeId] {
        self.staking.migrate_hesitation();
        self.delegations.migrate_hesitation();
        let epoch = self.clock.current_epoch();
        self.validators = self.staking.elect(epoch, self.config.staking.max_validators);
        info!(target: "ppos::epoch", epoch, validators = self.validators.len(), "Genesis validators elected");
        &self.validators
    }

    /// Finish the executing block.
    ///
    /// `producer` is the node that sealed the block, if consensus reports
    /// one. Releases due at this height are paid; at a settlement boundary
    /// the boundary batch runs before the clock moves on.
    pub fn advance_block(&mut self, producer: Option<NodeId>) -> BlockOutcome {
        if let Some(producer) = producer {
            self.penalties.report_mut().record_block(producer);
        }
        let height = self.clock.height();
        let matured = self.restricting.mature(&mut self.accounts, height);
        let settlement = if self.clock.is_settlement_boundary(height) {
            Some(self.settle(height))
        } else {
            None
        };
        let tick = self.clock.advance();
        debug!(target: "ppos::epoch", height, epoch = tick.epoch, %matured, "Block finished");
        BlockOutcome { tick, matured, settlement }
    }

    fn settle(&mut self, height: u64) -> Settlement {
        let epoch = self.clock.epoch_of(height);
        let year = self.clock.year_of(height);

        let candidates = self.staking.migrate_hesitation();
        let delegations = self.delegations.migrate_hesitation();
        debug!(target: "ppos::epoch", epoch, candidates, delegations, "Hesitation migrated");

        let reward = self.rewards.reward_for(year);
        let payouts = self.rewards.distribute(
            &mut self.accounts,
            &self.staking,
            &self.validators,
            self.penalties.report(),
            reward,
        );

        let penalties = self.penalties.evaluate(
            &mut self.accounts,
            &mut self.restricting,
            &mut self.staking,
            &self.validators,
            reward.block_reward,
            epoch,
            self.clock.settlement_period(),
            height,
        );

        let unstaked = self.staking.finalize_unstakes(&mut self.accounts, &mut self.restricting, epoch);
        let undelegated = self.delegations.finalize(&mut self.accounts, &mut self.restricting, epoch);
        let pruned = self.staking.prune_exited(epoch);
        let unfrozen = self.staking.unfreeze(epoch);

        self.validators = self.staking.elect(epoch + 1, self.config.staking.max_validators);
        self.penalties.reset_period();

        info!(
            target: "ppos::epoch",
            epoch,
            year,
            payouts = payouts.len(),
            penalties = penalties.len(),
            unstaked = unstaked.len(),
            pruned = pruned.len(),
            validators = self.validators.len(),
            "Settlement period closed"
        );
        Settlement {
            epoch,
            year,
            reward,
            payouts,
            penalties,
            unstaked,
            undelegated,
            pruned,
            unfrozen,
            validators: self.validators.clone(),
        }
    }

    /// Check value conservation and escrow coverage.
    pub fn check_invariants(&self) -> Result<(), String> {
        let supply = self.accounts.total_supply();
        let held = self.accounts.sum_balances();
        if held != supply {
            return Err(format!("balances {held} != supply {supply}"));
        }
        let staked = self.staking.total_shares() + self.delegations.escrowed();
        let staking_pool = self.accounts.balance(&STAKING_POOL);
        if staking_pool != staked {
            return Err(format!("staking pool {staking_pool} != staked {staked}"));
        }
        let escrowed = self.restricting.escrowed();
        let restricting_pool = self.accounts.balance(&RESTRICTING_POOL);
        if restricting_pool != escrowed {
            return Err(format!("restricting pool {restricting_pool} != escrowed {escrowed}"));
        }
        self.restricting.consistency_error().map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::REWARD_POOL,
        reward::FixedRewardCurve,
        staking::CandidateStatus,
        test_utils::{addr, node, test_config},
    };
    use proptest::prelude::*;

    const LEN: u64 = 40;

    fn ledger() -> Ledger {
        let mut ledger = Ledger::new(test_config()).unwrap();
        for n in 1..=9u8 {
            ledger.allocate(addr(n), U256::from(1_000_000));
        }
        ledger
    }

    fn request(n: u8, kind: FundsKind, amount: u64) -> CreateStakingRequest {
        CreateStakingRequest {
            node_id: node(n),
            staking_address: addr(n),
            funds_kind: kind,
            benefit_address: addr(n + 100).to_string(),
            amount: U256::from(amount),
            description: Description::default(),
        }
    }

    /// Finish blocks until the executing block is the first of `epoch`,
    /// every validator producing its scheduled blocks.
    fn run_to_epoch(ledger: &mut Ledger, epoch: u64) -> Vec<Settlement> {
        let mut settlements = Vec::new();
        while ledger.current_epoch() < epoch {
            let producer = ledger.scheduled_producer(ledger.block_number());
            settlements.extend(ledger.advance_block(producer).settlement);
        }
        settlements
    }

    #[test]
    fn test_restricting_plan_scenario() {
        let mut ledger = ledger();
        let b = addr(20);
        ledger.create_restricting_plan(addr(1), b, &[ReleaseInput::new(1, 1000)]).unwrap();

        let info = ledger.restricting_info(&b).unwrap();
        assert_eq!(info.balance, U256::from(1000));
        assert_eq!(info.pledge_amount, U256::ZERO);
        assert_eq!(info.debt, U256::ZERO);
        assert_eq!(info.releases.len(), 1);
        assert_eq!(info.releases[0].epoch, 1);
        assert_eq!(info.releases[0].amount, U256::from(1000));
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_invalid_amount_leaves_state() {
        let mut ledger = ledger();
        let b = addr(20);
        for amount in [None, Some(String::new())] {
            let err = ledger
                .create_restricting_plan(addr(1), b, &[ReleaseInput { epoch: 1, amount }])
                .unwrap_err();
            assert_eq!(err.code(), 304011);
        }
        assert_eq!(ledger.restricting_info(&b).unwrap_err().code(), 304005);
        assert_eq!(ledger.balance(&addr(1)), U256::from(1_000_000));
    }

    #[test]
    fn test_stake_from_restricting_then_penalty_scenario() {
        let mut ledger = ledger();
        let b = addr(20);
        ledger.create_restricting_plan(addr(1), b, &[ReleaseInput::new(1, 1000)]).unwrap();
        let mut req = request(20, FundsKind::Restricting, 1000);
        req.staking_address = b;
        ledger.create_staking(req).unwrap();

        let plan = ledger.restricting_info(&b).unwrap();
        assert_eq!((plan.balance, plan.pledge_amount), (U256::from(1000), U256::from(1000)));
        assert_eq!(
            ledger.candidate_info(&node(20)).unwrap().candidate.restricting_plan_hes,
            U256::from(1000)
        );

        run_to_epoch(&mut ledger, 2);
        let outcome = ledger.staking.apply_penalty(
            &mut ledger.accounts,
            &mut ledger.restricting,
            node(20),
            U256::from(1200),
            ledger.clock.height(),
        );
        assert_eq!(outcome.uncovered, U256::from(200));
        assert!(ledger.candidate_info(&node(20)).unwrap().shares.is_zero());
        assert_eq!(ledger.restricting_info(&b).unwrap().debt, U256::from(200));
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_debt_tracks_recovery() {
        let mut ledger = ledger();
        let b = addr(20);
        ledger.create_restricting_plan(addr(1), b, &[ReleaseInput::new(1, 1000)]).unwrap();
        let mut req = request(20, FundsKind::Restricting, 1000);
        req.staking_address = b;
        ledger.create_staking(req).unwrap();

        // Release unlocks at the end of epoch 2 while fully pledged.
        run_to_epoch(&mut ledger, 3);
        assert_eq!(ledger.restricting_info(&b).unwrap().debt, U256::from(1000));
        assert!(ledger.balance(&b).is_zero());

        let mut recovered = 0u64;
        let mut last = U256::from(1000);
        for top_up in [250u64, 250, 100] {
            ledger.create_restricting_plan(addr(1), b, &[ReleaseInput::new(4, top_up)]).unwrap();
            recovered += top_up;
            let debt = ledger.restricting_info(&b).unwrap().debt;
            assert_eq!(debt, U256::from(1000 - recovered));
            assert!(debt <= last);
            last = debt;
        }
        assert_eq!(ledger.balance(&b), U256::from(recovered));
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_withdraw_same_period_returns_everything() {
        let mut ledger = ledger();
        ledger.create_staking(request(1, FundsKind::Free, 5000)).unwrap();
        let outcome = ledger.withdrew_staking(node(1)).unwrap();

        assert_eq!(outcome.refunded, U256::from(5000));
        assert_eq!(ledger.balance(&addr(1)), U256::from(1_000_000));
        assert_eq!(ledger.candidate_info(&node(1)).unwrap().candidate.status, CandidateStatus::Exited);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_withdraw_lock_and_pruning_through_boundaries() {
        let mut ledger = ledger();
        ledger.create_staking(request(1, FundsKind::Free, 5000)).unwrap();
        ledger.create_staking(request(2, FundsKind::Free, 5000)).unwrap();
        ledger.complete_genesis();
        ledger.withdrew_staking(node(1)).unwrap();
        assert_eq!(ledger.candidate_info(&node(1)).unwrap().candidate.status, CandidateStatus::Locked);

        let settlements = run_to_epoch(&mut ledger, 3);
        assert_eq!(settlements.len(), 2);
        assert!(settlements.iter().all(|s| s.unstaked.is_empty()));
        assert_eq!(ledger.candidate_info(&node(1)).unwrap().candidate.status, CandidateStatus::Locked);
        assert_eq!(ledger.validators(), &[node(2)]);

        let settlements = run_to_epoch(&mut ledger, 4);
        assert_eq!(settlements[0].unstaked, vec![node(1)]);
        let info = ledger.candidate_info(&node(1)).unwrap();
        assert_eq!(info.candidate.status, CandidateStatus::Exited);
        assert!(info.shares.is_zero());

        let settlements = run_to_epoch(&mut ledger, 5);
        assert_eq!(settlements[0].pruned, vec![node(1)]);
        assert_eq!(ledger.candidate_info(&node(1)).unwrap_err().code(), 301204);
        assert_eq!(ledger.staking().status(&node(1)), CandidateStatus::NotExist);

        // The node may stake again under a new staking block.
        ledger.create_staking(request(1, FundsKind::Free, 5000)).unwrap();
        assert_eq!(ledger.candidate_info(&node(1)).unwrap().candidate.staking_block_num, 4 * LEN + 1);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_reward_equality() {
        let reward = PeriodReward { block_reward: U256::from(7), staking_reward: U256::from(10_000) };
        let mut ledger = ledger().with_reward_curve(FixedRewardCurve(reward));
        ledger.create_staking(request(1, FundsKind::Free, 1000)).unwrap();
        ledger.create_staking(request(2, FundsKind::Free, 3000)).unwrap();
        ledger.complete_genesis();

        let before = [ledger.balance(&addr(101)), ledger.balance(&addr(102))];
        let settlement = run_to_epoch(&mut ledger, 2).remove(0);
        let after = [ledger.balance(&addr(101)), ledger.balance(&addr(102))];

        assert!(settlement.penalties.is_empty());
        for (i, (shares, produced)) in [(1000u64, 20u64), (3000, 20)].into_iter().enumerate() {
            let expected = before[i]
                + U256::from(produced) * reward.block_reward
                + reward.staking_reward * U256::from(shares) / U256::from(4000);
            assert_eq!(after[i], expected);
            assert_eq!(settlement.payouts[i].blocks_produced, produced);
        }
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_downtime_freezes_and_recovers() {
        let mut ledger = ledger();
        ledger.create_staking(request(1, FundsKind::Free, 5000)).unwrap();
        ledger.create_staking(request(2, FundsKind::Free, 5000)).unwrap();
        ledger.complete_genesis();

        // node 2 never produces.
        for epoch_end in [LEN, 2 * LEN] {
            while ledger.block_number() <= epoch_end {
                ledger.advance_block(Some(node(1)));
            }
        }
        let candidate = ledger.candidate_info(&node(2)).unwrap().candidate;
        assert_eq!(candidate.frozen_until_epoch, 3);
        assert_eq!(ledger.validators(), &[node(1)]);
        assert_eq!(ledger.increase_staking(node(2), FundsKind::Free, U256::from(100)).unwrap_err().code(), 301103);
        assert_eq!(ledger.edit_candidate(node(2), None, None).unwrap_err().code(), 301103);
        assert!(ledger.balance(&REWARD_POOL) > U256::ZERO);

        let settlements = run_to_epoch(&mut ledger, 4);
        assert_eq!(settlements[0].unfrozen, vec![node(2)]);
        assert!(ledger.validators().contains(&node(2)));
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_delegation_lifecycle() {
        let mut ledger = ledger();
        ledger.create_staking(request(1, FundsKind::Free, 5000)).unwrap();
        ledger.complete_genesis();
        let key = ledger.delegate(addr(7), node(1), FundsKind::Free, U256::from(800)).unwrap();
        run_to_epoch(&mut ledger, 2);

        let info = ledger.delegation_info(addr(7), node(1), key.staking_block_num).unwrap();
        assert_eq!(info.delegation.released, U256::from(800));
        assert!(info.delegation.released_hes.is_zero());

        let outcome = ledger.withdrew_delegate(addr(7), node(1), key.staking_block_num, U256::from(800)).unwrap();
        assert_eq!(outcome.unlock_epoch, Some(3));
        assert_eq!(ledger.balance(&addr(7)), U256::from(1_000_000 - 800));
        run_to_epoch(&mut ledger, 4);
        assert_eq!(ledger.balance(&addr(7)), U256::from(1_000_000));
        assert_eq!(
            ledger.delegation_info(addr(7), node(1), key.staking_block_num).unwrap_err().code(),
            301205
        );
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_scheduled_producer_covers_period() {
        let mut ledger = ledger();
        for n in 1..=3u8 {
            ledger.create_staking(request(n, FundsKind::Free, 5000)).unwrap();
        }
        ledger.complete_genesis();
        let produced: Vec<_> = (1..=LEN).filter_map(|h| ledger.scheduled_producer(h)).collect();
        assert_eq!(produced.len() as u64, LEN);
        for id in ledger.validators() {
            assert!(produced.iter().filter(|p| *p == id).count() >= (LEN / 3) as usize);
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Plan { funder: u8, beneficiary: u8, epoch: i64, amount: u64 },
        Stake { n: u8, restricting: bool, amount: u64 },
        Increase { n: u8, restricting: bool, amount: u64 },
        Withdraw { n: u8 },
        Delegate { who: u8, n: u8, restricting: bool, amount: u64 },
        Undelegate { who: u8, n: u8, amount: u64 },
        DuplicateSign { n: u8, block: u64 },
        Blocks { count: u64, skip: u8 },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1..=6u8, 1..=6u8, 1..=4i64, 1..5_000u64)
                .prop_map(|(funder, beneficiary, epoch, amount)| Op::Plan { funder, beneficiary, epoch, amount }),
            (1..=4u8, any::<bool>(), 50..5_000u64)
                .prop_map(|(n, restricting, amount)| Op::Stake { n, restricting, amount }),
            (1..=4u8, any::<bool>(), 1..2_000u64)
                .prop_map(|(n, restricting, amount)| Op::Increase { n, restricting, amount }),
            (1..=4u8).prop_map(|n| Op::Withdraw { n }),
            (5..=6u8, 1..=4u8, any::<bool>(), 1..2_000u64)
                .prop_map(|(who, n, restricting, amount)| Op::Delegate { who, n, restricting, amount }),
            (5..=6u8, 1..=4u8, 1..2_000u64).prop_map(|(who, n, amount)| Op::Undelegate { who, n, amount }),
            (1..=4u8, 0..3u64).prop_map(|(n, block)| Op::DuplicateSign { n, block }),
            (1..60u64, 0..=4u8).prop_map(|(count, skip)| Op::Blocks { count, skip }),
        ]
    }

    fn kind(restricting: bool) -> FundsKind {
        if restricting { FundsKind::Restricting } else { FundsKind::Free }
    }

    fn apply(ledger: &mut Ledger, op: Op) {
        // Rejections are fine; they must simply leave the invariants intact.
        let _ = match op {
            Op::Plan { funder, beneficiary, epoch, amount } => ledger
                .create_restricting_plan(addr(funder), addr(beneficiary), &[ReleaseInput::new(epoch, amount)])
                .map(drop),
            Op::Stake { n, restricting, amount } => {
                ledger.create_staking(request(n, kind(restricting), amount))
            }
            Op::Increase { n, restricting, amount } => {
                ledger.increase_staking(node(n), kind(restricting), U256::from(amount))
            }
            Op::Withdraw { n } => ledger.withdrew_staking(node(n)).map(drop),
            Op::Delegate { who, n, restricting, amount } => ledger
                .delegate(addr(who), node(n), kind(restricting), U256::from(amount))
                .map(drop),
            Op::Undelegate { who, n, amount } => {
                let block = ledger.staking().get(&node(n)).map_or(0, |c| c.staking_block_num);
                ledger.withdrew_delegate(addr(who), node(n), block, U256::from(amount)).map(drop)
            }
            Op::DuplicateSign { n, block } => {
                ledger.report_duplicate_sign(addr(9), node(n), block).map(drop)
            }
            Op::Blocks { count, skip } => {
                for _ in 0..count {
                    let producer = ledger
                        .scheduled_producer(ledger.block_number())
                        .filter(|p| *p != node(skip));
                    ledger.advance_block(producer);
                }
                Ok(())
            }
        };
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn proptest_value_is_conserved(ops in proptest::collection::vec(op(), 1..60)) {
            let mut ledger = ledger();
            for op in ops {
                apply(&mut ledger, op);
                prop_assert_eq!(ledger.check_invariants(), Ok(()));
            }
        }
    }
}
