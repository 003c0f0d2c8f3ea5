//! Block height and period arithmetic
//!
//! Epochs (settlement periods) and consensus rounds are numbered from 1.
//! Block `h > 0` with `h % settlement_period == 0` is the last block of its
//! epoch; the boundary batch runs when that block finishes.

use serde::{Deserialize, Serialize};

use crate::config::EpochConfig;

/// Tracks the block currently being executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochClock {
    settlement_period: u64,
    consensus_round: u64,
    blocks_per_year: u64,
    height: u64,
}

/// Position of a finished block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTick {
    /// Finished block
    pub height: u64,
    /// Epoch containing the block
    pub epoch: u64,
    /// Block closed a consensus round
    pub round_boundary: bool,
    /// Block closed a settlement period
    pub settlement_boundary: bool,
}

impl EpochClock {
    /// Create a clock positioned at block 1, the first block after genesis
    pub const fn new(config: &EpochConfig) -> Self {
        Self {
            settlement_period: config.settlement_period_blocks,
            consensus_round: config.consensus_round_blocks,
            blocks_per_year: config.blocks_per_year,
            height: 1,
        }
    }

    /// Block currently executing
    pub const fn height(&self) -> u64 {
        self.height
    }

    /// Blocks per settlement period
    pub const fn settlement_period(&self) -> u64 {
        self.settlement_period
    }

    /// Blocks per consensus round
    pub const fn consensus_round(&self) -> u64 {
        self.consensus_round
    }

    /// Epoch of the executing block
    pub const fn current_epoch(&self) -> u64 {
        self.epoch_of(self.height)
    }

    /// Epoch containing `height`
    pub const fn epoch_of(&self, height: u64) -> u64 {
        period_of(height, self.settlement_period)
    }

    /// Consensus round containing `height`
    pub const fn round_of(&self, height: u64) -> u64 {
        period_of(height, self.consensus_round)
    }

    /// Reward year containing `height`
    pub const fn year_of(&self, height: u64) -> u64 {
        height.saturating_sub(1) / self.blocks_per_year + 1
    }

    /// `height` closes a settlement period
    pub const fn is_settlement_boundary(&self, height: u64) -> bool {
        height > 0 && height % self.settlement_period == 0
    }

    /// `height` closes a consensus round
    pub const fn is_round_boundary(&self, height: u64) -> bool {
        height > 0 && height % self.consensus_round == 0
    }

    /// Last block of `epoch`, `None` past `u64::MAX`
    pub const fn last_block_of(&self, epoch: u64) -> Option<u64> {
        epoch.checked_mul(self.settlement_period)
    }

    /// Unlock block for a release `epochs` periods after the next boundary,
    /// `None` when it is not representable
    pub const fn unlock_block(&self, epochs: u64) -> Option<u64> {
        match self.current_epoch().checked_add(epochs) {
            Some(epoch) => self.last_block_of(epoch),
            None => None,
        }
    }

    /// Settlement periods left before `block` unlocks
    pub const fn epochs_until(&self, block: u64) -> u64 {
        self.epoch_of(block).saturating_sub(self.current_epoch())
    }

    /// Finish the executing block and move to the next one
    pub const fn advance(&mut self) -> BlockTick {
        let height = self.height;
        let tick = BlockTick {
            height,
            epoch: self.epoch_of(height),
            round_boundary: self.is_round_boundary(height),
            settlement_boundary: self.is_settlement_boundary(height),
        };
        self.height += 1;
        tick
    }
}

const fn period_of(height: u64, length: u64) -> u64 {
    let period = height.div_ceil(length);
    if period == 0 { 1 } else { period }
}
