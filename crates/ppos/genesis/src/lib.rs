//! PPOS genesis tool
//!
//! Describes the state a ledger starts from and bootstraps it:
//!
//! ```text
//! Genesis:
//! ├── Network preset: mainnet | testnet | devnet (economic parameters)
//! ├── Allocations: free balances credited before anything else
//! ├── Restricting plans: vesting schedules funded from allocations
//! └── Validators: candidates staked at height 1, matured and elected
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod builder;
pub mod config;

pub use builder::GenesisBuilder;
pub use config::{Allocation, GenesisConfig, GenesisRestrictingPlan, NetworkType};

use ppos_ledger::LedgerError;
use thiserror::Error;

/// Genesis creation errors
#[derive(Debug, Error)]
pub enum GenesisError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A genesis operation was rejected by the ledger
    #[error("Genesis {stage} rejected: {source}")]
    Rejected {
        /// Which genesis step failed
        stage: &'static str,
        /// Ledger error
        #[source]
        source: LedgerError,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl GenesisError {
    pub(crate) fn rejected(stage: &'static str) -> impl FnOnce(LedgerError) -> Self {
        move |source| Self::Rejected { stage, source }
    }
}
