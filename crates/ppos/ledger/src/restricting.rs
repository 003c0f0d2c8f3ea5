//! Restricting (vesting) plans
//!
//! Locked coins sit in [`RESTRICTING_POOL`] until a release matures or a
//! beneficiary pledges them to staking, at which point they move to
//! [`STAKING_POOL`]. Per beneficiary the ledger keeps:
//!
//! - `releases`: pending releases keyed by absolute unlock block
//! - `balance`: pending releases plus overdue debt
//! - `pledge`: portion of `balance` currently backing stake or delegations
//! - `debts`: oldest-first list of overdue and penalty entries
//!
//! A release that matures while its coins are pledged is paid only up to the
//! unpledged balance; the rest turns into overdue debt and is paid out as
//! soon as pledged coins come back or a new plan tops the account up.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    str::FromStr,
};
use tracing::{debug, error, info};

use crate::{
    accounts::Accounts,
    constants::{RESTRICTING_POOL, REWARD_POOL, STAKING_POOL},
    epoch::EpochClock,
    error::{LedgerError, LedgerResult},
};

/// One release entry as submitted by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInput {
    /// Settlement periods after the next boundary
    pub epoch: i64,
    /// Raw decimal (or `0x` hex) amount
    #[serde(default, deserialize_with = "deserialize_raw_amount")]
    pub amount: Option<String>,
}

impl ReleaseInput {
    /// Release of `amount` after `epoch` periods
    pub fn new(epoch: i64, amount: impl ToString) -> Self {
        Self { epoch, amount: Some(amount.to_string()) }
    }
}

/// Accepts JSON strings and numbers; anything else is kept verbatim and
/// rejected later by [`parse_amount`].
fn deserialize_raw_amount<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Parse a client-supplied release amount.
///
/// Missing, empty, non-numeric, negative and zero amounts are all
/// [`LedgerError::InvalidAmount`].
pub fn parse_amount(raw: Option<&str>) -> LedgerResult<U256> {
    let Some(raw) = raw else {
        return Err(LedgerError::InvalidAmount("missing".into()));
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return Err(LedgerError::InvalidAmount(raw.to_string()));
    }
    let amount =
        U256::from_str(trimmed).map_err(|_| LedgerError::InvalidAmount(raw.to_string()))?;
    if amount.is_zero() {
        return Err(LedgerError::InvalidAmount(raw.to_string()));
    }
    Ok(amount)
}

/// Origin of a debt entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebtKind {
    /// Release matured while its coins were pledged; owed to the beneficiary
    Overdue,
    /// Penalty exceeded the slashed stake; owed to the reward pool
    Penalty,
}

/// Outstanding debt of a beneficiary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtEntry {
    /// Origin
    pub kind: DebtKind,
    /// Unpaid amount
    pub amount: U256,
    /// Block at which the entry was recorded
    pub since_block: u64,
}

/// Per-beneficiary plan state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictingAccount {
    releases: BTreeMap<u64, U256>,
    balance: U256,
    pledge: U256,
    debts: VecDeque<DebtEntry>,
}

impl RestrictingAccount {
    /// Locked balance (pending releases plus overdue debt)
    pub const fn balance(&self) -> U256 {
        self.balance
    }

    /// Portion of the balance backing stake or delegations
    pub const fn pledge(&self) -> U256 {
        self.pledge
    }

    /// Balance that may still be pledged
    pub fn unpledged(&self) -> U256 {
        self.balance.saturating_sub(self.pledge)
    }

    /// Sum of all debt entries
    pub fn debt(&self) -> U256 {
        self.debts.iter().fold(U256::ZERO, |acc, d| acc + d.amount)
    }

    /// Sum of overdue entries
    pub fn overdue(&self) -> U256 {
        self.debts
            .iter()
            .filter(|d| d.kind == DebtKind::Overdue)
            .fold(U256::ZERO, |acc, d| acc + d.amount)
    }

    /// Sum of pending releases
    pub fn pending_releases(&self) -> U256 {
        self.releases.values().fold(U256::ZERO, |acc, a| acc + *a)
    }

    /// Debt entries, oldest first
    pub fn debts(&self) -> impl Iterator<Item = &DebtEntry> {
        self.debts.iter()
    }

    fn is_settled(&self) -> bool {
        self.balance.is_zero()
            && self.pledge.is_zero()
            && self.debts.is_empty()
            && self.releases.is_empty()
    }

    fn consistency_error(&self) -> Option<String> {
        if self.balance != self.pending_releases() + self.overdue() {
            return Some(format!(
                "balance {} != releases {} + overdue {}",
                self.balance,
                self.pending_releases(),
                self.overdue()
            ));
        }
        if self.balance < self.pledge {
            return Some(format!("balance {} below pledge {}", self.balance, self.pledge));
        }
        if !self.overdue().is_zero() && self.balance != self.pledge {
            return Some("overdue debt while unpledged balance remains".into());
        }
        None
    }

    /// Pay overdue entries out of the unpledged balance, oldest first.
    fn repay_overdue(&mut self, accounts: &mut Accounts, beneficiary: Address) -> U256 {
        let mut repaid = U256::ZERO;
        for entry in self.debts.iter_mut().filter(|d| d.kind == DebtKind::Overdue) {
            let available = self.balance.saturating_sub(self.pledge);
            if available.is_zero() {
                break;
            }
            let pay = entry.amount.min(available);
            move_escrow(accounts, RESTRICTING_POOL, beneficiary, pay);
            entry.amount -= pay;
            self.balance -= pay;
            repaid += pay;
        }
        self.debts.retain(|d| !d.amount.is_zero());
        repaid
    }

    /// Remove `amount` from overdue entries, then from the latest releases.
    fn forfeit(&mut self, mut amount: U256) {
        for entry in self.debts.iter_mut().filter(|d| d.kind == DebtKind::Overdue) {
            if amount.is_zero() {
                break;
            }
            let take = entry.amount.min(amount);
            entry.amount -= take;
            amount -= take;
        }
        self.debts.retain(|d| !d.amount.is_zero());

        while !amount.is_zero() {
            let Some(mut last) = self.releases.last_entry() else { break };
            let take = (*last.get()).min(amount);
            *last.get_mut() -= take;
            amount -= take;
            if last.get().is_zero() {
                last.remove();
            }
        }
    }
}

/// Query view of one release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    /// Settlement periods remaining until unlock
    pub epoch: u64,
    /// Unlock block
    pub block_number: u64,
    /// Amount released
    pub amount: U256,
}

/// Query view of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictingInfo {
    /// Locked balance
    pub balance: U256,
    /// Amount pledged to staking or delegation
    pub pledge_amount: U256,
    /// Outstanding debt
    pub debt: U256,
    /// Pending releases, earliest unlock first
    pub releases: Vec<ReleaseInfo>,
}

/// All restricting plans
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictingLedger {
    max_releases: usize,
    plans: BTreeMap<Address, RestrictingAccount>,
    /// Unlock block -> beneficiaries with a release there. Entries may be stale.
    schedule: BTreeMap<u64, BTreeSet<Address>>,
}

impl RestrictingLedger {
    /// Empty ledger accepting at most `max_releases` entries per plan call
    pub fn new(max_releases: usize) -> Self {
        Self { max_releases, ..Default::default() }
    }

    /// Plan of `beneficiary`, if any
    pub fn get(&self, beneficiary: &Address) -> Option<&RestrictingAccount> {
        self.plans.get(beneficiary)
    }

    /// True when `beneficiary` has a plan
    pub fn contains(&self, beneficiary: &Address) -> bool {
        self.plans.contains_key(beneficiary)
    }

    /// Number of live plans
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// No live plans
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Lock `releases` for `beneficiary`, funded from `funder`'s free balance.
    ///
    /// Releases sharing an unlock block merge. Incoming funds first clear
    /// outstanding debt oldest-first.
    pub fn create_plan(
        &mut self,
        accounts: &mut Accounts,
        clock: &EpochClock,
        funder: Address,
        beneficiary: Address,
        releases: &[ReleaseInput],
    ) -> LedgerResult<()> {
        if releases.is_empty() || releases.len() > self.max_releases {
            return Err(LedgerError::InvalidEpochCount {
                count: releases.len(),
                max: self.max_releases,
            });
        }
        if let Some(bad) = releases.iter().find(|r| r.epoch < 1) {
            return Err(LedgerError::InvalidEpoch(bad.epoch));
        }

        let mut incoming = BTreeMap::<u64, U256>::new();
        let mut total = U256::ZERO;
        for release in releases {
            let amount = parse_amount(release.amount.as_deref())?;
            total = total
                .checked_add(amount)
                .ok_or_else(|| LedgerError::InvalidAmount("total overflows".into()))?;
            let unlock = clock
                .unlock_block(release.epoch.unsigned_abs())
                .ok_or(LedgerError::InvalidEpoch(release.epoch))?;
            *incoming.entry(unlock).or_default() += amount;
        }

        accounts.transfer(funder, RESTRICTING_POOL, total)?;

        let height = clock.height();
        let plan = self.plans.entry(beneficiary).or_default();
        let mut budget = total;
        for entry in plan.debts.iter_mut() {
            if budget.is_zero() {
                break;
            }
            let pay = entry.amount.min(budget);
            match entry.kind {
                DebtKind::Overdue => {
                    move_escrow(accounts, RESTRICTING_POOL, beneficiary, pay);
                    plan.balance -= pay;
                }
                DebtKind::Penalty => {
                    move_escrow(accounts, RESTRICTING_POOL, REWARD_POOL, pay);
                    deduct_earliest(&mut incoming, pay);
                }
            }
            entry.amount -= pay;
            budget -= pay;
        }
        plan.debts.retain(|d| !d.amount.is_zero());

        let mut locked = U256::ZERO;
        for (unlock, amount) in incoming {
            if amount.is_zero() {
                continue;
            }
            *plan.releases.entry(unlock).or_default() += amount;
            plan.balance += amount;
            locked += amount;
            self.schedule.entry(unlock).or_default().insert(beneficiary);
        }

        info!(
            target: "ppos::restricting",
            %funder,
            %beneficiary,
            %total,
            %locked,
            block = height,
            "Created restricting plan"
        );
        self.prune(&beneficiary);
        Ok(())
    }

    /// Fail unless `beneficiary` has a plan that can pledge `amount` more.
    pub fn ensure_drawable(&self, beneficiary: &Address, amount: U256) -> LedgerResult<()> {
        let plan =
            self.plans.get(beneficiary).ok_or(LedgerError::RestrictingPlanNotFound(*beneficiary))?;
        let available = plan.unpledged();
        if available < amount {
            return Err(LedgerError::InsufficientLockedBalance {
                address: *beneficiary,
                available,
                required: amount,
            });
        }
        Ok(())
    }

    /// Pledge `amount` of `beneficiary`'s locked balance to staking.
    pub fn draw_for_stake(
        &mut self,
        accounts: &mut Accounts,
        beneficiary: Address,
        amount: U256,
    ) -> LedgerResult<()> {
        self.ensure_drawable(&beneficiary, amount)?;
        let Some(plan) = self.plans.get_mut(&beneficiary) else {
            return Err(LedgerError::RestrictingPlanNotFound(beneficiary));
        };
        accounts.transfer(RESTRICTING_POOL, STAKING_POOL, amount)?;
        plan.pledge += amount;
        debug!(target: "ppos::restricting", %beneficiary, %amount, pledge = %plan.pledge, "Pledged restricting funds");
        Ok(())
    }

    /// Pay out every release unlocking at or before `height`.
    pub fn mature(&mut self, accounts: &mut Accounts, height: u64) -> U256 {
        let due: Vec<u64> = self.schedule.range(..=height).map(|(block, _)| *block).collect();
        let mut paid_total = U256::ZERO;
        for block in due {
            let Some(beneficiaries) = self.schedule.remove(&block) else { continue };
            for beneficiary in beneficiaries {
                let Some(plan) = self.plans.get_mut(&beneficiary) else { continue };
                let Some(amount) = plan.releases.remove(&block) else { continue };

                let paid = amount.min(plan.unpledged());
                move_escrow(accounts, RESTRICTING_POOL, beneficiary, paid);
                plan.balance -= paid;
                paid_total += paid;

                let overdue = amount - paid;
                if !overdue.is_zero() {
                    plan.debts.push_back(DebtEntry {
                        kind: DebtKind::Overdue,
                        amount: overdue,
                        since_block: height,
                    });
                }
                debug!(
                    target: "ppos::restricting",
                    %beneficiary,
                    unlock = block,
                    %paid,
                    %overdue,
                    "Release matured"
                );
                self.prune(&beneficiary);
            }
        }
        paid_total
    }

    /// Return `amount` of pledged coins from the staking pool.
    ///
    /// Overdue debt is paid from the returned coins before they become
    /// pledgeable again.
    pub fn settle_refund(&mut self, accounts: &mut Accounts, beneficiary: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }
        let Some(plan) = self.plans.get_mut(&beneficiary) else {
            error!(target: "ppos::restricting", %beneficiary, %amount, "Refund for missing plan, crediting free balance");
            move_escrow(accounts, STAKING_POOL, beneficiary, amount);
            return;
        };
        move_escrow(accounts, STAKING_POOL, RESTRICTING_POOL, amount);
        plan.pledge = plan.pledge.saturating_sub(amount);
        let repaid = plan.repay_overdue(accounts, beneficiary);
        debug!(target: "ppos::restricting", %beneficiary, %amount, %repaid, "Pledge refunded");
        self.prune(&beneficiary);
    }

    /// Record a penalty against pledged coins.
    ///
    /// `slashed` coins have already left the staking pool; they are removed
    /// from both `pledge` and `balance`. `uncovered` is the part of the
    /// penalty the stake could not cover and becomes penalty debt.
    pub fn settle_slash(
        &mut self,
        beneficiary: Address,
        slashed: U256,
        uncovered: U256,
        height: u64,
    ) {
        let Some(plan) = self.plans.get_mut(&beneficiary) else { return };
        let slashed = slashed.min(plan.pledge);
        plan.pledge -= slashed;
        plan.balance -= slashed;
        plan.forfeit(slashed);
        if !uncovered.is_zero() {
            plan.debts.push_back(DebtEntry {
                kind: DebtKind::Penalty,
                amount: uncovered,
                since_block: height,
            });
        }
        info!(target: "ppos::restricting", %beneficiary, %slashed, %uncovered, debt = %plan.debt(), "Pledge slashed");
        self.prune(&beneficiary);
    }

    /// Query view of `beneficiary`'s plan
    pub fn query(&self, clock: &EpochClock, beneficiary: &Address) -> LedgerResult<RestrictingInfo> {
        let plan = self
            .plans
            .get(beneficiary)
            .ok_or(LedgerError::RestrictingPlanNotFound(*beneficiary))?;
        Ok(RestrictingInfo {
            balance: plan.balance,
            pledge_amount: plan.pledge,
            debt: plan.debt(),
            releases: plan
                .releases
                .iter()
                .map(|(block, amount)| ReleaseInfo {
                    epoch: clock.epochs_until(*block),
                    block_number: *block,
                    amount: *amount,
                })
                .collect(),
        })
    }

    /// Coins that must sit in the restricting pool
    pub fn escrowed(&self) -> U256 {
        self.plans.values().fold(U256::ZERO, |acc, p| acc + p.unpledged())
    }

    /// Coins pledged to the staking pool
    pub fn pledged(&self) -> U256 {
        self.plans.values().fold(U256::ZERO, |acc, p| acc + p.pledge)
    }

    /// Describe the first plan violating the accounting invariants.
    pub fn consistency_error(&self) -> Option<String> {
        self.plans
            .iter()
            .find_map(|(addr, plan)| plan.consistency_error().map(|e| format!("{addr}: {e}")))
    }

    fn prune(&mut self, beneficiary: &Address) {
        if self.plans.get(beneficiary).is_some_and(RestrictingAccount::is_settled) {
            self.plans.remove(beneficiary);
            debug!(target: "ppos::restricting", %beneficiary, "Plan settled and removed");
        }
    }
}

fn deduct_earliest(releases: &mut BTreeMap<u64, U256>, mut amount: U256) {
    for value in releases.values_mut() {
        if amount.is_zero() {
            break;
        }
        let take = (*value).min(amount);
        *value -= take;
        amount -= take;
    }
}

/// Transfer between escrow and user accounts. A shortfall means the pool
/// accounting is corrupt: it is logged, and debug builds panic.
pub(crate) fn move_escrow(accounts: &mut Accounts, from: Address, to: Address, amount: U256) {
    let result = accounts.transfer(from, to, amount);
    if let Err(err) = &result {
        error!(target: "ppos::restricting", %from, %to, %amount, %err, "Escrow transfer failed");
    }
    debug_assert!(result.is_ok(), "escrow transfer of {amount} from {from} failed");
}
