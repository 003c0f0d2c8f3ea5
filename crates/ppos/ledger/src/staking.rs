//! Candidate stake
//!
//! Stake is split by funding source (free balance vs. restricting plan) and
//! by maturity: `*_hes` balances belong to the current hesitation period and
//! migrate into the matured balances at the next settlement boundary.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    mem,
    str::FromStr,
};
use tracing::{debug, info, warn};

use crate::{
    accounts::Accounts,
    config::StakingConfig,
    constants::{
        MAX_DETAILS_LEN, MAX_EXTERNAL_ID_LEN, MAX_NODE_NAME_LEN, MAX_WEBSITE_LEN, REWARD_POOL,
        STAKING_POOL,
    },
    epoch::EpochClock,
    error::{LedgerError, LedgerResult},
    restricting::{move_escrow, RestrictingLedger},
    NodeId,
};

/// Source of staked or delegated coins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundsKind {
    /// Free balance of the funding address
    #[default]
    Free,
    /// Unpledged restricting balance of the funding address
    Restricting,
}

/// Lifecycle state of a candidate record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CandidateStatus {
    /// Staking normally
    Valid,
    /// Removed by duplicate-sign evidence; stake locked like a withdrawal
    Invalid,
    /// Withdrawal requested; matured stake waiting out the lock
    Locked,
    /// All stake refunded; kept for queries until pruned
    Exited,
    /// No record
    NotExist,
}

/// Free-text candidate metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Description {
    /// External identity (e.g. a keybase id)
    pub external_id: String,
    /// Display name
    pub node_name: String,
    /// Operator website
    pub website: String,
    /// Free-form details
    pub details: String,
}

impl Description {
    /// Enforce the per-field byte limits.
    pub fn validate(&self) -> LedgerResult<()> {
        check_len("externalId", &self.external_id, MAX_EXTERNAL_ID_LEN)?;
        check_len("nodeName", &self.node_name, MAX_NODE_NAME_LEN)?;
        check_len("website", &self.website, MAX_WEBSITE_LEN)?;
        check_len("details", &self.details, MAX_DETAILS_LEN)
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> LedgerResult<()> {
    if value.len() > max {
        return Err(LedgerError::FieldTooLong { field, len: value.len(), max });
    }
    Ok(())
}

/// Parse a benefit address, enforcing the EIP-55 checksum on mixed-case input.
pub fn parse_benefit_address(raw: &str) -> LedgerResult<Address> {
    let address =
        Address::from_str(raw).map_err(|_| LedgerError::InvalidAddress(raw.to_string()))?;
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    let has_upper = digits.bytes().any(|b| b.is_ascii_uppercase());
    let has_lower = digits.bytes().any(|b| b.is_ascii_lowercase());
    if has_upper && has_lower && address.to_checksum(None) != format!("0x{digits}") {
        return Err(LedgerError::InvalidAddress(raw.to_string()));
    }
    Ok(address)
}

/// A staking candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Node identity
    pub node_id: NodeId,
    /// Address that funded the stake and receives refunds
    pub staking_address: Address,
    /// Address credited with rewards
    pub benefit_address: Address,
    /// Block at which the stake was created; joins delegations to this record
    pub staking_block_num: u64,
    /// Epoch at which the stake was created
    pub staking_epoch: u64,
    /// Lifecycle state
    pub status: CandidateStatus,
    /// Matured free-funds stake
    pub released: U256,
    /// Pending free-funds stake
    pub released_hes: U256,
    /// Matured restricting-funds stake
    pub restricting_plan: U256,
    /// Pending restricting-funds stake
    pub restricting_plan_hes: U256,
    /// Delegations currently pointing at this record
    pub delegated: U256,
    /// Metadata
    pub description: Description,
    /// Last epoch of an active freeze, 0 when not frozen
    pub frozen_until_epoch: u64,
    /// Epoch the withdrawal (or invalidation) started
    pub withdrawn_epoch: u64,
    /// Epoch the record became `Exited`
    pub exited_epoch: u64,
}

impl Candidate {
    /// Total effective stake
    pub fn shares(&self) -> U256 {
        self.matured() + self.hesitation()
    }

    /// Stake that has survived a settlement boundary
    pub fn matured(&self) -> U256 {
        self.released + self.restricting_plan
    }

    /// Stake added during the current period
    pub fn hesitation(&self) -> U256 {
        self.released_hes + self.restricting_plan_hes
    }

    /// Election weight
    pub fn weight(&self) -> U256 {
        self.shares() + self.delegated
    }

    /// Frozen during `epoch`
    pub const fn is_frozen(&self, epoch: u64) -> bool {
        self.frozen_until_epoch >= epoch
    }
}

/// Query view of a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateInfo {
    /// Stored record
    #[serde(flatten)]
    pub candidate: Candidate,
    /// Total effective stake
    pub shares: U256,
}

/// Parameters of `createStaking`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStakingRequest {
    /// Node identity
    pub node_id: NodeId,
    /// Funding (and refund) address
    pub staking_address: Address,
    /// Funding source
    pub funds_kind: FundsKind,
    /// Reward address, checksum-validated
    pub benefit_address: String,
    /// Initial stake
    pub amount: U256,
    /// Metadata
    #[serde(default)]
    pub description: Description,
}

/// Result of a withdrawal or invalidation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawOutcome {
    /// Hesitation stake refunded immediately
    pub refunded: U256,
    /// Matured stake held until the lock ends
    pub locked: U256,
    /// Epoch whose boundary releases the locked stake
    pub unlock_epoch: Option<u64>,
}

/// Split of an applied penalty
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyOutcome {
    /// Taken from matured free-funds stake
    pub slashed_free: U256,
    /// Taken from matured restricting-funds stake
    pub slashed_vesting: U256,
    /// Penalty exceeding the matured stake
    pub uncovered: U256,
}

impl PenaltyOutcome {
    /// Coins actually removed from stake
    pub fn slashed(&self) -> U256 {
        self.slashed_free + self.slashed_vesting
    }
}

/// All candidates and the pending unstake queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeLedger {
    config: StakingConfig,
    candidates: BTreeMap<NodeId, Candidate>,
    /// Epoch whose boundary finalizes the unstake -> nodes
    unstakes: BTreeMap<u64, BTreeSet<NodeId>>,
}

impl StakeLedger {
    /// Empty ledger with the given thresholds
    pub fn new(config: StakingConfig) -> Self {
        Self { config, ..Default::default() }
    }

    /// Thresholds in use
    pub const fn config(&self) -> &StakingConfig {
        &self.config
    }

    /// Candidate record, including exited ones not yet pruned
    pub fn get(&self, node_id: &NodeId) -> Option<&Candidate> {
        self.candidates.get(node_id)
    }

    pub(crate) fn get_mut(&mut self, node_id: &NodeId) -> Option<&mut Candidate> {
        self.candidates.get_mut(node_id)
    }

    /// All records in node id order
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.values()
    }

    /// Status of `node_id`, `NotExist` when absent
    pub fn status(&self, node_id: &NodeId) -> CandidateStatus {
        self.candidates.get(node_id).map_or(CandidateStatus::NotExist, |c| c.status)
    }

    /// `address` staked one of the live records
    pub fn is_staking_address(&self, address: &Address) -> bool {
        self.candidates
            .values()
            .any(|c| c.staking_address == *address && c.status != CandidateStatus::Exited)
    }

    /// Sum of all candidate shares
    pub fn total_shares(&self) -> U256 {
        self.candidates.values().fold(U256::ZERO, |acc, c| acc + c.shares())
    }

    /// Candidate accepting stake changes during `epoch`.
    fn active(&self, node_id: &NodeId, epoch: u64) -> LedgerResult<&Candidate> {
        match self.candidates.get(node_id) {
            None => Err(LedgerError::CandidateNotFound(*node_id)),
            Some(c) if c.status == CandidateStatus::Exited => {
                Err(LedgerError::CandidateNotFound(*node_id))
            }
            Some(c) if c.status != CandidateStatus::Valid || c.is_frozen(epoch) => {
                Err(LedgerError::CandidateStatusInvalid(*node_id))
            }
            Some(c) => Ok(c),
        }
    }

    /// Register a new candidate. The stake lands in the hesitation balance.
    pub fn create(
        &mut self,
        accounts: &mut Accounts,
        restricting: &mut RestrictingLedger,
        clock: &EpochClock,
        request: CreateStakingRequest,
    ) -> LedgerResult<()> {
        if self.candidates.contains_key(&request.node_id) {
            return Err(LedgerError::AlreadyStaking(request.node_id));
        }
        let benefit_address = parse_benefit_address(&request.benefit_address)?;
        request.description.validate()?;
        check_restricting_amount(request.funds_kind, request.amount)?;
        if request.amount < self.config.min_staking {
            return Err(LedgerError::BelowMinimumStake {
                amount: request.amount,
                minimum: self.config.min_staking,
            });
        }
        ensure_fundable(accounts, restricting, request.staking_address, request.funds_kind, request.amount)?;
        fund(accounts, restricting, request.staking_address, request.funds_kind, request.amount)?;

        let (released_hes, restricting_plan_hes) = split(request.funds_kind, request.amount);
        let candidate = Candidate {
            node_id: request.node_id,
            staking_address: request.staking_address,
            benefit_address,
            staking_block_num: clock.height(),
            staking_epoch: clock.current_epoch(),
            status: CandidateStatus::Valid,
            released: U256::ZERO,
            released_hes,
            restricting_plan: U256::ZERO,
            restricting_plan_hes,
            delegated: U256::ZERO,
            description: request.description,
            frozen_until_epoch: 0,
            withdrawn_epoch: 0,
            exited_epoch: 0,
        };
        info!(
            target: "ppos::staking",
            node_id = %candidate.node_id,
            staker = %candidate.staking_address,
            amount = %request.amount,
            kind = ?request.funds_kind,
            block = candidate.staking_block_num,
            "Created staking"
        );
        self.candidates.insert(request.node_id, candidate);
        Ok(())
    }

    /// Add stake from the candidate's staking address.
    pub fn increase(
        &mut self,
        accounts: &mut Accounts,
        restricting: &mut RestrictingLedger,
        clock: &EpochClock,
        node_id: NodeId,
        kind: FundsKind,
        amount: U256,
    ) -> LedgerResult<()> {
        let staker = self.active(&node_id, clock.current_epoch())?.staking_address;
        check_restricting_amount(kind, amount)?;
        if amount < self.config.min_increase {
            return Err(LedgerError::BelowMinimumIncrease {
                amount,
                minimum: self.config.min_increase,
            });
        }
        ensure_fundable(accounts, restricting, staker, kind, amount)?;
        fund(accounts, restricting, staker, kind, amount)?;

        let Some(candidate) = self.candidates.get_mut(&node_id) else {
            return Err(LedgerError::CandidateNotFound(node_id));
        };
        match kind {
            FundsKind::Free => candidate.released_hes += amount,
            FundsKind::Restricting => candidate.restricting_plan_hes += amount,
        }
        info!(target: "ppos::staking", %node_id, %amount, ?kind, shares = %candidate.shares(), "Increased staking");
        Ok(())
    }

    /// Replace the benefit address and/or description.
    pub fn edit(
        &mut self,
        clock: &EpochClock,
        node_id: NodeId,
        benefit_address: Option<&str>,
        description: Option<Description>,
    ) -> LedgerResult<()> {
        self.active(&node_id, clock.current_epoch())?;
        let benefit = benefit_address.map(parse_benefit_address).transpose()?;
        if let Some(description) = &description {
            description.validate()?;
        }

        let Some(candidate) = self.candidates.get_mut(&node_id) else {
            return Err(LedgerError::CandidateNotFound(node_id));
        };
        if let Some(benefit) = benefit {
            candidate.benefit_address = benefit;
        }
        if let Some(description) = description {
            candidate.description = description;
        }
        info!(target: "ppos::staking", %node_id, benefit = %candidate.benefit_address, "Edited candidate");
        Ok(())
    }

    /// Start a full withdrawal.
    ///
    /// Hesitation stake is refunded at once. Matured stake stays locked until
    /// the boundary ending epoch `current + unstake_freeze_epochs`; without
    /// matured stake the candidate exits immediately.
    pub fn withdraw(
        &mut self,
        accounts: &mut Accounts,
        restricting: &mut RestrictingLedger,
        clock: &EpochClock,
        node_id: NodeId,
    ) -> LedgerResult<WithdrawOutcome> {
        match self.candidates.get(&node_id).map(|c| c.status) {
            None | Some(CandidateStatus::Exited | CandidateStatus::NotExist) => {
                return Err(LedgerError::CandidateNotFound(node_id));
            }
            Some(CandidateStatus::Locked | CandidateStatus::Invalid) => {
                return Err(LedgerError::CandidateStatusInvalid(node_id));
            }
            Some(CandidateStatus::Valid) => {}
        }
        let outcome = self.begin_exit(
            accounts,
            restricting,
            node_id,
            CandidateStatus::Locked,
            clock.current_epoch(),
        );
        info!(
            target: "ppos::staking",
            %node_id,
            refunded = %outcome.refunded,
            locked = %outcome.locked,
            unlock_epoch = ?outcome.unlock_epoch,
            "Withdrew staking"
        );
        Ok(outcome)
    }

    /// Force a candidate out as `Invalid`, locking its stake like a withdrawal.
    pub(crate) fn invalidate(
        &mut self,
        accounts: &mut Accounts,
        restricting: &mut RestrictingLedger,
        node_id: NodeId,
        epoch: u64,
    ) -> WithdrawOutcome {
        self.begin_exit(accounts, restricting, node_id, CandidateStatus::Invalid, epoch)
    }

    fn begin_exit(
        &mut self,
        accounts: &mut Accounts,
        restricting: &mut RestrictingLedger,
        node_id: NodeId,
        status: CandidateStatus,
        epoch: u64,
    ) -> WithdrawOutcome {
        let Some(candidate) = self.candidates.get_mut(&node_id) else {
            return WithdrawOutcome::default();
        };
        let staker = candidate.staking_address;
        let free = mem::take(&mut candidate.released_hes);
        let vesting = mem::take(&mut candidate.restricting_plan_hes);
        move_escrow(accounts, STAKING_POOL, staker, free);
        restricting.settle_refund(accounts, staker, vesting);

        let locked = candidate.matured();
        candidate.withdrawn_epoch = epoch;
        let unlock_epoch = if locked.is_zero() {
            candidate.status = CandidateStatus::Exited;
            candidate.exited_epoch = epoch;
            None
        } else {
            candidate.status = status;
            let due = epoch + self.config.unstake_freeze_epochs;
            self.unstakes.entry(due).or_default().insert(node_id);
            Some(due)
        };
        WithdrawOutcome { refunded: free + vesting, locked, unlock_epoch }
    }

    /// Slash matured stake: free funds first, then restricting funds.
    ///
    /// Never fails. Hesitation balances are untouched and whatever the
    /// matured stake cannot cover is reported as `uncovered` and charged to
    /// the staker's restricting plan when one exists.
    pub fn apply_penalty(
        &mut self,
        accounts: &mut Accounts,
        restricting: &mut RestrictingLedger,
        node_id: NodeId,
        amount: U256,
        height: u64,
    ) -> PenaltyOutcome {
        let Some(candidate) = self.candidates.get_mut(&node_id) else {
            return PenaltyOutcome::default();
        };
        let slashed_free = amount.min(candidate.released);
        candidate.released -= slashed_free;
        let remaining = amount - slashed_free;
        let slashed_vesting = remaining.min(candidate.restricting_plan);
        candidate.restricting_plan -= slashed_vesting;
        let outcome = PenaltyOutcome {
            slashed_free,
            slashed_vesting,
            uncovered: remaining - slashed_vesting,
        };

        move_escrow(accounts, STAKING_POOL, REWARD_POOL, outcome.slashed());
        let staker = candidate.staking_address;
        if !outcome.slashed_vesting.is_zero()
            || (!outcome.uncovered.is_zero() && restricting.contains(&staker))
        {
            restricting.settle_slash(staker, outcome.slashed_vesting, outcome.uncovered, height);
        }
        warn!(
            target: "ppos::slashing",
            %node_id,
            penalty = %amount,
            slashed_free = %outcome.slashed_free,
            slashed_vesting = %outcome.slashed_vesting,
            uncovered = %outcome.uncovered,
            shares = %candidate.shares(),
            "Applied penalty"
        );
        outcome
    }

    /// Freeze `node_id` through `until_epoch`.
    pub fn freeze(&mut self, node_id: &NodeId, until_epoch: u64) {
        if let Some(candidate) = self.candidates.get_mut(node_id) {
            candidate.frozen_until_epoch = candidate.frozen_until_epoch.max(until_epoch);
            warn!(target: "ppos::slashing", %node_id, until_epoch, "Candidate frozen");
        }
    }

    /// Move every hesitation balance into its matured counterpart.
    pub fn migrate_hesitation(&mut self) -> usize {
        let mut migrated = 0;
        for candidate in self.candidates.values_mut() {
            if candidate.hesitation().is_zero() {
                continue;
            }
            candidate.released += mem::take(&mut candidate.released_hes);
            candidate.restricting_plan += mem::take(&mut candidate.restricting_plan_hes);
            migrated += 1;
        }
        migrated
    }

    /// Refund locked stake whose unstake is due at the boundary ending `epoch`.
    pub fn finalize_unstakes(
        &mut self,
        accounts: &mut Accounts,
        restricting: &mut RestrictingLedger,
        epoch: u64,
    ) -> Vec<NodeId> {
        let due: Vec<u64> = self.unstakes.range(..=epoch).map(|(e, _)| *e).collect();
        let mut finished = Vec::new();
        for due_epoch in due {
            let Some(nodes) = self.unstakes.remove(&due_epoch) else { continue };
            for node_id in nodes {
                let Some(candidate) = self.candidates.get_mut(&node_id) else { continue };
                if !matches!(candidate.status, CandidateStatus::Locked | CandidateStatus::Invalid) {
                    continue;
                }
                let staker = candidate.staking_address;
                let free = mem::take(&mut candidate.released);
                let vesting = mem::take(&mut candidate.restricting_plan);
                move_escrow(accounts, STAKING_POOL, staker, free);
                restricting.settle_refund(accounts, staker, vesting);
                candidate.status = CandidateStatus::Exited;
                candidate.exited_epoch = epoch;
                info!(target: "ppos::staking", %node_id, %free, %vesting, epoch, "Unstake finalized");
                finished.push(node_id);
            }
        }
        finished
    }

    /// Delete exited records whose retention ended with `epoch`.
    pub fn prune_exited(&mut self, epoch: u64) -> Vec<NodeId> {
        let retention = self.config.exited_retention_epochs;
        let expired: Vec<NodeId> = self
            .candidates
            .values()
            .filter(|c| c.status == CandidateStatus::Exited && c.exited_epoch + retention <= epoch)
            .map(|c| c.node_id)
            .collect();
        for node_id in &expired {
            self.candidates.remove(node_id);
            debug!(target: "ppos::staking", %node_id, epoch, "Pruned exited candidate");
        }
        expired
    }

    /// Lift freezes that ended with `epoch`.
    pub fn unfreeze(&mut self, epoch: u64) -> Vec<NodeId> {
        let mut lifted = Vec::new();
        for candidate in self.candidates.values_mut() {
            if candidate.frozen_until_epoch != 0 && candidate.frozen_until_epoch <= epoch {
                candidate.frozen_until_epoch = 0;
                info!(target: "ppos::staking", node_id = %candidate.node_id, epoch, "Candidate unfrozen");
                lifted.push(candidate.node_id);
            }
        }
        lifted
    }

    /// Top `max` eligible candidates for `epoch`, heaviest first.
    ///
    /// Ties go to the earlier staking block, then the lower node id.
    pub fn elect(&self, epoch: u64, max: usize) -> Vec<NodeId> {
        let mut eligible: Vec<&Candidate> = self
            .candidates
            .values()
            .filter(|c| {
                c.status == CandidateStatus::Valid && !c.is_frozen(epoch) && !c.matured().is_zero()
            })
            .collect();
        eligible.sort_by(|a, b| {
            b.weight()
                .cmp(&a.weight())
                .then(a.staking_block_num.cmp(&b.staking_block_num))
                .then(a.node_id.cmp(&b.node_id))
        });
        eligible.into_iter().take(max).map(|c| c.node_id).collect()
    }

    /// Query view of `node_id`
    pub fn query(&self, node_id: &NodeId) -> LedgerResult<CandidateInfo> {
        let candidate =
            self.candidates.get(node_id).ok_or(LedgerError::QueryCandidateNotFound(*node_id))?;
        Ok(CandidateInfo { shares: candidate.shares(), candidate: candidate.clone() })
    }
}

const fn split(kind: FundsKind, amount: U256) -> (U256, U256) {
    match kind {
        FundsKind::Free => (amount, U256::ZERO),
        FundsKind::Restricting => (U256::ZERO, amount),
    }
}

/// Reject a zero amount drawn from a restricting plan.
pub(crate) fn check_restricting_amount(kind: FundsKind, amount: U256) -> LedgerResult<()> {
    if kind == FundsKind::Restricting && amount.is_zero() {
        return Err(LedgerError::ZeroRestrictingAmount);
    }
    Ok(())
}

/// Fail unless `from` can supply `amount` of `kind` funds.
pub(crate) fn ensure_fundable(
    accounts: &Accounts,
    restricting: &RestrictingLedger,
    from: Address,
    kind: FundsKind,
    amount: U256,
) -> LedgerResult<()> {
    match kind {
        FundsKind::Free => {
            let available = accounts.balance(&from);
            if available < amount {
                return Err(LedgerError::InsufficientFreeBalance {
                    address: from,
                    available,
                    required: amount,
                });
            }
            Ok(())
        }
        FundsKind::Restricting => restricting.ensure_drawable(&from, amount),
    }
}

/// Move `amount` of `kind` funds from `from` into the staking pool.
pub(crate) fn fund(
    accounts: &mut Accounts,
    restricting: &mut RestrictingLedger,
    from: Address,
    kind: FundsKind,
    amount: U256,
) -> LedgerResult<()> {
    match kind {
        FundsKind::Free => accounts.transfer(from, STAKING_POOL, amount),
        FundsKind::Restricting => restricting.draw_for_stake(accounts, from, amount),
    }
}

/// Return `amount` of `kind` funds from the staking pool to `to`.
pub(crate) fn refund(
    accounts: &mut Accounts,
    restricting: &mut RestrictingLedger,
    to: Address,
    kind: FundsKind,
    amount: U256,
) {
    match kind {
        FundsKind::Free => move_escrow(accounts, STAKING_POOL, to, amount),
        FundsKind::Restricting => restricting.settle_refund(accounts, to, amount),
    }
}
