//! Delegations to candidates
//!
//! A delegation is keyed by `(delegator, node_id, staking_block_num)`: if a
//! candidate exits and the node stakes again, old delegations keep pointing
//! at the old record and are refunded in full on withdrawal.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, mem};
use tracing::{debug, info};

use crate::{
    accounts::Accounts,
    epoch::EpochClock,
    error::{LedgerError, LedgerResult},
    restricting::RestrictingLedger,
    staking::{
        check_restricting_amount, ensure_fundable, fund, refund, CandidateStatus, FundsKind,
        StakeLedger,
    },
    NodeId,
};

/// Identity of a delegation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationKey {
    /// Delegating account
    pub delegator: Address,
    /// Candidate node
    pub node_id: NodeId,
    /// Staking block of the candidate record delegated to
    pub staking_block_num: u64,
}

/// Delegated amounts, split like candidate stake
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegation {
    /// Matured free funds
    pub released: U256,
    /// Pending free funds
    pub released_hes: U256,
    /// Matured restricting funds
    pub restricting_plan: U256,
    /// Pending restricting funds
    pub restricting_plan_hes: U256,
    /// Epoch of the most recent delegation
    pub delegate_epoch: u64,
}

impl Delegation {
    /// Everything still delegated
    pub fn total(&self) -> U256 {
        self.released + self.released_hes + self.restricting_plan + self.restricting_plan_hes
    }

    /// Drain up to `amount` in the order hesitation-free, hesitation-restricting,
    /// matured-free, matured-restricting.
    fn drain(&mut self, amount: U256) -> Drained {
        let mut left = amount;
        let mut take = |slot: &mut U256| {
            let taken = (*slot).min(left);
            *slot -= taken;
            left -= taken;
            taken
        };
        Drained {
            hes_free: take(&mut self.released_hes),
            hes_vesting: take(&mut self.restricting_plan_hes),
            free: take(&mut self.released),
            vesting: take(&mut self.restricting_plan),
        }
    }
}

#[derive(Debug, Default)]
struct Drained {
    hes_free: U256,
    hes_vesting: U256,
    free: U256,
    vesting: U256,
}

/// Query view of a delegation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationInfo {
    /// Record key
    #[serde(flatten)]
    pub key: DelegationKey,
    /// Amounts
    #[serde(flatten)]
    pub delegation: Delegation,
    /// Amount pending undelegation for this key
    pub locked: U256,
}

/// Result of `withdrewDelegate`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndelegateOutcome {
    /// Returned at once
    pub refunded: U256,
    /// Held until `unlock_epoch`
    pub locked: U256,
    /// Epoch whose boundary returns the locked part
    pub unlock_epoch: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingUndelegation {
    key: DelegationKey,
    free: U256,
    vesting: U256,
}

/// All delegations and pending undelegations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationLedger {
    delegations: BTreeMap<DelegationKey, Delegation>,
    /// Epoch whose boundary returns the funds -> pending entries
    pending: BTreeMap<u64, Vec<PendingUndelegation>>,
}

impl DelegationLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for `key`
    pub fn get(&self, key: &DelegationKey) -> Option<&Delegation> {
        self.delegations.get(key)
    }

    /// All records of `delegator`
    pub fn of_delegator(&self, delegator: Address) -> impl Iterator<Item = (&DelegationKey, &Delegation)> {
        self.delegations.iter().filter(move |(k, _)| k.delegator == delegator)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.delegations.len()
    }

    /// No records
    pub fn is_empty(&self) -> bool {
        self.delegations.is_empty()
    }

    /// Delegate `amount` of `kind` funds to `node_id`.
    #[allow(clippy::too_many_arguments)]
    pub fn delegate(
        &mut self,
        accounts: &mut Accounts,
        restricting: &mut RestrictingLedger,
        staking: &mut StakeLedger,
        clock: &EpochClock,
        delegator: Address,
        node_id: NodeId,
        kind: FundsKind,
        amount: U256,
    ) -> LedgerResult<DelegationKey> {
        let epoch = clock.current_epoch();
        let candidate = match staking.get(&node_id) {
            Some(c) if c.status != CandidateStatus::Exited => c,
            _ => return Err(LedgerError::CandidateNotFound(node_id)),
        };
        if candidate.status != CandidateStatus::Valid || candidate.is_frozen(epoch) {
            return Err(LedgerError::CandidateNotDelegatable(node_id));
        }
        if staking.is_staking_address(&delegator) {
            return Err(LedgerError::DelegatorIsCandidate(delegator));
        }
        check_restricting_amount(kind, amount)?;
        let minimum = staking.config().min_delegation;
        if amount < minimum {
            return Err(LedgerError::BelowMinimumDelegation { amount, minimum });
        }
        ensure_fundable(accounts, restricting, delegator, kind, amount)?;

        let key = DelegationKey { delegator, node_id, staking_block_num: candidate.staking_block_num };
        fund(accounts, restricting, delegator, kind, amount)?;

        let delegation = self.delegations.entry(key).or_default();
        match kind {
            FundsKind::Free => delegation.released_hes += amount,
            FundsKind::Restricting => delegation.restricting_plan_hes += amount,
        }
        delegation.delegate_epoch = epoch;
        if let Some(candidate) = staking.get_mut(&node_id) {
            candidate.delegated += amount;
        }
        info!(
            target: "ppos::delegation",
            %delegator,
            %node_id,
            %amount,
            ?kind,
            staking_block = key.staking_block_num,
            "Delegated"
        );
        Ok(key)
    }

    /// Withdraw `amount` from the delegation at `key`.
    ///
    /// Hesitation funds return at once. Matured funds wait
    /// `undelegate_freeze_epochs` periods unless the candidate record is gone,
    /// replaced or no longer `Valid`, in which case they return at once too.
    /// A remainder below the minimum delegation is withdrawn with it.
    pub fn withdraw(
        &mut self,
        accounts: &mut Accounts,
        restricting: &mut RestrictingLedger,
        staking: &mut StakeLedger,
        clock: &EpochClock,
        key: DelegationKey,
        amount: U256,
    ) -> LedgerResult<UndelegateOutcome> {
        if let Some(candidate) = staking.get(&key.node_id) {
            if key.staking_block_num > candidate.staking_block_num {
                return Err(LedgerError::WrongStakingBlockNum {
                    given: key.staking_block_num,
                    current: candidate.staking_block_num,
                });
            }
        }
        let Some(delegation) = self.delegations.get(&key) else {
            return Err(LedgerError::DelegationNotFound {
                delegator: key.delegator,
                node_id: key.node_id,
                staking_block_num: key.staking_block_num,
            });
        };
        let total = delegation.total();
        if amount > total {
            return Err(LedgerError::DelegationInsufficient { available: total, requested: amount });
        }
        let minimum = staking.config().min_delegation;
        if amount < minimum && amount != total {
            return Err(LedgerError::BelowMinimumDelegation { amount, minimum });
        }
        let amount = if total - amount < minimum { total } else { amount };

        let candidate_active = staking.get(&key.node_id).is_some_and(|c| {
            c.staking_block_num == key.staking_block_num && c.status == CandidateStatus::Valid
        });
        let Some(delegation) = self.delegations.get_mut(&key) else {
            return Err(LedgerError::QueryDelegationNotFound);
        };
        let drained = delegation.drain(amount);
        let emptied = delegation.total().is_zero();

        refund(accounts, restricting, key.delegator, FundsKind::Free, drained.hes_free);
        refund(accounts, restricting, key.delegator, FundsKind::Restricting, drained.hes_vesting);
        let mut outcome = UndelegateOutcome {
            refunded: drained.hes_free + drained.hes_vesting,
            ..Default::default()
        };
        let matured = drained.free + drained.vesting;
        if candidate_active && !matured.is_zero() {
            let due = clock.current_epoch() + staking.config().undelegate_freeze_epochs;
            self.pending.entry(due).or_default().push(PendingUndelegation {
                key,
                free: drained.free,
                vesting: drained.vesting,
            });
            outcome.locked = matured;
            outcome.unlock_epoch = Some(due);
        } else {
            refund(accounts, restricting, key.delegator, FundsKind::Free, drained.free);
            refund(accounts, restricting, key.delegator, FundsKind::Restricting, drained.vesting);
            outcome.refunded += matured;
        }

        if emptied {
            self.delegations.remove(&key);
        }
        if let Some(candidate) = staking.get_mut(&key.node_id) {
            if candidate.staking_block_num == key.staking_block_num {
                candidate.delegated = candidate.delegated.saturating_sub(amount);
            }
        }
        info!(
            target: "ppos::delegation",
            delegator = %key.delegator,
            node_id = %key.node_id,
            %amount,
            refunded = %outcome.refunded,
            locked = %outcome.locked,
            "Withdrew delegation"
        );
        Ok(outcome)
    }

    /// Move every hesitation balance into its matured counterpart.
    pub fn migrate_hesitation(&mut self) -> usize {
        let mut migrated = 0;
        for delegation in self.delegations.values_mut() {
            if delegation.released_hes.is_zero() && delegation.restricting_plan_hes.is_zero() {
                continue;
            }
            delegation.released += mem::take(&mut delegation.released_hes);
            delegation.restricting_plan += mem::take(&mut delegation.restricting_plan_hes);
            migrated += 1;
        }
        migrated
    }

    /// Return undelegations due at the boundary ending `epoch`.
    pub fn finalize(
        &mut self,
        accounts: &mut Accounts,
        restricting: &mut RestrictingLedger,
        epoch: u64,
    ) -> U256 {
        let due: Vec<u64> = self.pending.range(..=epoch).map(|(e, _)| *e).collect();
        let mut returned = U256::ZERO;
        for due_epoch in due {
            for entry in self.pending.remove(&due_epoch).unwrap_or_default() {
                refund(accounts, restricting, entry.key.delegator, FundsKind::Free, entry.free);
                refund(accounts, restricting, entry.key.delegator, FundsKind::Restricting, entry.vesting);
                returned += entry.free + entry.vesting;
                debug!(
                    target: "ppos::delegation",
                    delegator = %entry.key.delegator,
                    node_id = %entry.key.node_id,
                    amount = %(entry.free + entry.vesting),
                    "Undelegation returned"
                );
            }
        }
        returned
    }

    /// Query view of `key`
    pub fn query(&self, key: &DelegationKey) -> LedgerResult<DelegationInfo> {
        let delegation = self.delegations.get(key).ok_or(LedgerError::QueryDelegationNotFound)?;
        Ok(DelegationInfo {
            key: *key,
            delegation: delegation.clone(),
            locked: self.locked_for(key),
        })
    }

    fn locked_for(&self, key: &DelegationKey) -> U256 {
        self.pending
            .values()
            .flatten()
            .filter(|p| p.key == *key)
            .fold(U256::ZERO, |acc, p| acc + p.free + p.vesting)
    }

    /// Coins held by delegations and pending undelegations
    pub fn escrowed(&self) -> U256 {
        let active = self.delegations.values().fold(U256::ZERO, |acc, d| acc + d.total());
        self.pending.values().flatten().fold(active, |acc, p| acc + p.free + p.vesting)
    }
}
