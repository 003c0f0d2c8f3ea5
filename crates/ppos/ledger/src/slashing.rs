//! Penalties: downtime, freezes and duplicate signing

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use crate::{
    accounts::Accounts,
    config::SlashingConfig,
    constants::REWARD_POOL,
    epoch::EpochClock,
    error::{LedgerError, LedgerResult},
    restricting::{move_escrow, RestrictingLedger},
    staking::{CandidateStatus, PenaltyOutcome, StakeLedger},
    NodeId,
};

/// Blocks produced and slots assigned during the current period
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionReport {
    produced: BTreeMap<NodeId, u64>,
    assigned: BTreeMap<NodeId, u64>,
}

impl ProductionReport {
    /// Count one block for `producer`
    pub fn record_block(&mut self, producer: NodeId) {
        *self.produced.entry(producer).or_default() += 1;
    }

    /// Set the number of slots consensus assigned to `node_id`
    pub fn assign_slots(&mut self, node_id: NodeId, slots: u64) {
        self.assigned.insert(node_id, slots);
    }

    /// Blocks `node_id` produced
    pub fn produced(&self, node_id: &NodeId) -> u64 {
        self.produced.get(node_id).copied().unwrap_or_default()
    }

    /// Slots assigned to `node_id`, or `default` when consensus named none
    pub fn expected(&self, node_id: &NodeId, default: u64) -> u64 {
        self.assigned.get(node_id).copied().unwrap_or(default)
    }

    /// Forget the period
    pub fn clear(&mut self) {
        self.produced.clear();
        self.assigned.clear();
    }
}

/// Cause of a penalty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlashReason {
    /// No block in the assigned slots
    Downtime,
    /// Signed two conflicting blocks
    DuplicateSign,
}

/// One applied penalty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlashRecord {
    /// Penalized node
    pub node_id: NodeId,
    /// Cause
    pub reason: SlashReason,
    /// Penalty computed before clamping
    pub penalty: U256,
    /// How the penalty was covered
    pub outcome: PenaltyOutcome,
    /// Freeze imposed, last frozen epoch
    pub frozen_until: Option<u64>,
    /// Paid to the evidence reporter
    pub report_reward: U256,
}

/// Evaluates downtime at period end and processes duplicate-sign evidence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyEngine {
    config: SlashingConfig,
    report: ProductionReport,
    /// Missed blocks carried across periods until a freeze resets them
    missed: BTreeMap<NodeId, u64>,
    /// Punished `(node, evidence block)` pairs
    evidence: BTreeSet<(NodeId, u64)>,
}

impl PenaltyEngine {
    /// Engine with the given parameters
    pub fn new(config: SlashingConfig) -> Self {
        Self { config, ..Default::default() }
    }

    /// Current period's production
    pub const fn report(&self) -> &ProductionReport {
        &self.report
    }

    /// Mutable access for consensus hooks
    pub const fn report_mut(&mut self) -> &mut ProductionReport {
        &mut self.report
    }

    /// Cumulative missed blocks of `node_id`
    pub fn missed(&self, node_id: &NodeId) -> u64 {
        self.missed.get(node_id).copied().unwrap_or_default()
    }

    /// Penalize validators of the period ending with `epoch`.
    ///
    /// A validator that produced nothing in its assigned slots loses
    /// `block_reward * slash_blocks_multiplier`. Missed blocks accumulate;
    /// reaching `freeze_missed_blocks` freezes the candidate through
    /// `epoch + freeze_epochs` and resets the count.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &mut self,
        accounts: &mut Accounts,
        restricting: &mut RestrictingLedger,
        staking: &mut StakeLedger,
        validators: &[NodeId],
        block_reward: U256,
        epoch: u64,
        period_blocks: u64,
        height: u64,
    ) -> Vec<SlashRecord> {
        if validators.is_empty() {
            return Vec::new();
        }
        let default_slots = period_blocks / validators.len() as u64;
        let mut records = Vec::new();
        for node_id in validators {
            if staking.get(node_id).is_none() {
                continue;
            }
            let expected = self.report.expected(node_id, default_slots);
            let produced = self.report.produced(node_id);
            if expected == 0 {
                continue;
            }

            let mut record = None;
            if produced == 0 {
                let penalty = block_reward * U256::from(self.config.slash_blocks_multiplier);
                let outcome = staking.apply_penalty(accounts, restricting, *node_id, penalty, height);
                record = Some(SlashRecord {
                    node_id: *node_id,
                    reason: SlashReason::Downtime,
                    penalty,
                    outcome,
                    frozen_until: None,
                    report_reward: U256::ZERO,
                });
            }

            let missed = self.missed.entry(*node_id).or_default();
            *missed += expected.saturating_sub(produced);
            let threshold = self.config.freeze_missed_blocks;
            if threshold > 0 && *missed >= threshold {
                let until = epoch + self.config.freeze_epochs;
                staking.freeze(node_id, until);
                *missed = 0;
                record
                    .get_or_insert_with(|| SlashRecord {
                        node_id: *node_id,
                        reason: SlashReason::Downtime,
                        penalty: U256::ZERO,
                        outcome: PenaltyOutcome::default(),
                        frozen_until: None,
                        report_reward: U256::ZERO,
                    })
                    .frozen_until = Some(until);
            }
            records.extend(record);
        }
        self.missed.retain(|_, m| *m > 0);
        records
    }

    /// Punish `node_id` for signing conflicting blocks at `evidence_block`.
    ///
    /// Slashes `duplicate_sign_slash_permille` of the matured stake, pays the
    /// reporter its percentage out of the reward pool, and forces the
    /// candidate out as `Invalid` with its remaining stake locked.
    #[allow(clippy::too_many_arguments)]
    pub fn report_duplicate_sign(
        &mut self,
        accounts: &mut Accounts,
        restricting: &mut RestrictingLedger,
        staking: &mut StakeLedger,
        clock: &EpochClock,
        node_id: NodeId,
        evidence_block: u64,
        reporter: Address,
    ) -> LedgerResult<SlashRecord> {
        if self.evidence.contains(&(node_id, evidence_block)) {
            return Err(LedgerError::DuplicateEvidence { node_id, block_number: evidence_block });
        }
        let matured = match staking.get(&node_id) {
            None => return Err(LedgerError::CandidateNotFound(node_id)),
            Some(c) if c.status == CandidateStatus::Exited => {
                return Err(LedgerError::CandidateNotFound(node_id));
            }
            Some(c) if c.status == CandidateStatus::Invalid => {
                return Err(LedgerError::CandidateStatusInvalid(node_id));
            }
            Some(c) => c.matured(),
        };

        let penalty = matured * U256::from(self.config.duplicate_sign_slash_permille) / U256::from(1_000);
        let outcome = staking.apply_penalty(accounts, restricting, node_id, penalty, clock.height());
        let report_reward = outcome.slashed()
            * U256::from(self.config.duplicate_sign_report_reward_percent)
            / U256::from(100);
        move_escrow(accounts, REWARD_POOL, reporter, report_reward);
        let exit = staking.invalidate(accounts, restricting, node_id, clock.current_epoch());
        self.evidence.insert((node_id, evidence_block));

        warn!(
            target: "ppos::slashing",
            %node_id,
            evidence_block,
            %reporter,
            %penalty,
            %report_reward,
            locked = %exit.locked,
            "Duplicate sign punished"
        );
        Ok(SlashRecord {
            node_id,
            reason: SlashReason::DuplicateSign,
            penalty,
            outcome,
            frozen_until: None,
            report_reward,
        })
    }

    /// Start a new period
    pub fn reset_period(&mut self) {
        self.report.clear();
        info!(target: "ppos::slashing", "Production report reset");
    }
}
