//! Ledger error types and their wire codes

use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::NodeId;

/// Convenience alias used throughout the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors returned by ledger operations.
///
/// Every variant is a client-visible rejection: the ledger state is left
/// untouched when one of these is returned. The numeric code from
/// [`LedgerError::code`] is the value deployed clients match on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// A release entry names an epoch below 1
    #[error("Release epoch must be at least 1, got {0}")]
    InvalidEpoch(i64),

    /// Plan length outside `[1, max_releases]`
    #[error("Restricting plan must have between 1 and {max} releases, got {count}")]
    InvalidEpochCount {
        /// Submitted number of releases
        count: usize,
        /// Configured maximum
        max: usize,
    },

    /// Release amount missing, empty, non-numeric, negative or zero
    #[error("Invalid release amount: {0:?}")]
    InvalidAmount(String),

    /// Funder cannot cover the plan total
    #[error("Insufficient balance on {address}: have {available}, need {required}")]
    InsufficientBalance {
        /// Account being debited
        address: Address,
        /// Free balance available
        available: U256,
        /// Amount required
        required: U256,
    },

    /// No restricting plan exists for the beneficiary
    #[error("Restricting plan not found for {0}")]
    RestrictingPlanNotFound(Address),

    /// Restricting-funded stake or delegation of zero
    #[error("Restricting-funded amount must be greater than zero")]
    ZeroRestrictingAmount,

    /// Not enough unpledged restricting funds to back a stake or delegation
    #[error("Insufficient restricting balance on {address}: unpledged {available}, need {required}")]
    InsufficientLockedBalance {
        /// Restricting beneficiary
        address: Address,
        /// Unpledged locked balance
        available: U256,
        /// Amount required
        required: U256,
    },

    /// A description field exceeds its length cap
    #[error("Field {field} is {len} bytes, limit is {max}")]
    FieldTooLong {
        /// Field name
        field: &'static str,
        /// Submitted length in bytes
        len: usize,
        /// Maximum length in bytes
        max: usize,
    },

    /// Address is malformed or fails its EIP-55 checksum
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Stake below the configured threshold
    #[error("Staking amount {amount} below minimum {minimum}")]
    BelowMinimumStake {
        /// Submitted amount
        amount: U256,
        /// Configured minimum
        minimum: U256,
    },

    /// A record already exists for the node
    #[error("Candidate {0} is already staking")]
    AlreadyStaking(NodeId),

    /// Candidate does not exist or has exited
    #[error("Candidate {0} does not exist")]
    CandidateNotFound(NodeId),

    /// Candidate is withdrawing, invalidated or frozen
    #[error("Candidate {0} status is invalid")]
    CandidateStatusInvalid(NodeId),

    /// Increase below the configured threshold
    #[error("Increase amount {amount} below minimum {minimum}")]
    BelowMinimumIncrease {
        /// Submitted amount
        amount: U256,
        /// Configured minimum
        minimum: U256,
    },

    /// Delegation (or partial undelegation) below the configured threshold
    #[error("Delegation amount {amount} below minimum {minimum}")]
    BelowMinimumDelegation {
        /// Submitted amount
        amount: U256,
        /// Configured minimum
        minimum: U256,
    },

    /// Staking addresses of candidates may not delegate
    #[error("Account {0} is a candidate staking address and cannot delegate")]
    DelegatorIsCandidate(Address),

    /// Candidate does not accept delegations right now
    #[error("Candidate {0} does not accept delegations")]
    CandidateNotDelegatable(NodeId),

    /// No delegation record for the key
    #[error("Delegation of {delegator} to {node_id} at block {staking_block_num} not found")]
    DelegationNotFound {
        /// Delegator address
        delegator: Address,
        /// Candidate node id
        node_id: NodeId,
        /// Candidate staking block the delegation targets
        staking_block_num: u64,
    },

    /// Staker or delegator cannot cover the amount from free balance
    #[error("Insufficient free balance on {address}: have {available}, need {required}")]
    InsufficientFreeBalance {
        /// Account being debited
        address: Address,
        /// Free balance available
        available: U256,
        /// Amount required
        required: U256,
    },

    /// Undelegation exceeds what remains withdrawable
    #[error("Delegation holds {available} withdrawable, requested {requested}")]
    DelegationInsufficient {
        /// Withdrawable amount
        available: U256,
        /// Requested amount
        requested: U256,
    },

    /// Delegation key names a staking block newer than the candidate's
    #[error("Staking block {given} is newer than candidate staking block {current}")]
    WrongStakingBlockNum {
        /// Block supplied by the caller
        given: u64,
        /// Candidate's current staking block
        current: u64,
    },

    /// Candidate query for an absent record
    #[error("Query candidate info failed: {0} not found")]
    QueryCandidateNotFound(NodeId),

    /// Delegation query for an absent record
    #[error("Query delegate info failed: not found")]
    QueryDelegationNotFound,

    /// Evidence for this node and block was already punished
    #[error("Duplicate-sign evidence for {node_id} at block {block_number} already processed")]
    DuplicateEvidence {
        /// Offending node
        node_id: NodeId,
        /// Block the evidence refers to
        block_number: u64,
    },

    /// Economic configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LedgerError {
    /// Numeric code reported to transport clients.
    pub const fn code(&self) -> u32 {
        match self {
            Self::InvalidEpoch(_) => 304001,
            Self::InvalidEpochCount { .. } => 304002,
            Self::InsufficientBalance { .. } => 304004,
            Self::RestrictingPlanNotFound(_) => 304005,
            Self::ZeroRestrictingAmount => 304007,
            Self::InvalidAmount(_) => 304011,
            Self::InsufficientLockedBalance { .. } => 304013,
            Self::FieldTooLong { .. } => 301002,
            Self::InvalidAddress(_) => 301009,
            Self::BelowMinimumStake { .. } => 301100,
            Self::AlreadyStaking(_) => 301101,
            Self::CandidateNotFound(_) => 301102,
            Self::CandidateStatusInvalid(_) => 301103,
            Self::BelowMinimumIncrease { .. } => 301104,
            Self::BelowMinimumDelegation { .. } => 301105,
            Self::DelegatorIsCandidate(_) => 301106,
            Self::CandidateNotDelegatable(_) => 301107,
            Self::DelegationNotFound { .. } => 301109,
            Self::InsufficientFreeBalance { .. } => 301111,
            Self::DelegationInsufficient { .. } => 301113,
            Self::WrongStakingBlockNum { .. } => 301116,
            Self::QueryCandidateNotFound(_) => 301204,
            Self::QueryDelegationNotFound => 301205,
            Self::DuplicateEvidence { .. } => 303001,
            Self::InvalidConfig(_) => 1,
        }
    }

    /// True for the "not staking" class: absent, exited, withdrawing or frozen.
    pub const fn is_not_staking(&self) -> bool {
        matches!(self, Self::CandidateNotFound(_) | Self::CandidateStatusInvalid(_))
    }
}
