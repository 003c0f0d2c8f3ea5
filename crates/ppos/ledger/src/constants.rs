//! Ledger constants: units, system accounts and field limits

use alloy_primitives::{address, Address, U256};

/// Smallest unit per whole coin (1 LAT = 10^18 von)
pub const VON_PER_LAT: u128 = 1_000_000_000_000_000_000;

/// Escrow account for locked restricting funds that are not pledged
pub const RESTRICTING_POOL: Address = address!("1000000000000000000000000000000000000001");

/// Escrow account for every staked or delegated coin
pub const STAKING_POOL: Address = address!("1000000000000000000000000000000000000002");

/// Destination of slashed coins; pays duplicate-sign reporters
pub const REWARD_POOL: Address = address!("1000000000000000000000000000000000000003");

/// Maximum releases in one restricting plan call
pub const MAX_RESTRICTING_RELEASES: usize = 36;

/// Byte limit of `Description::external_id`
pub const MAX_EXTERNAL_ID_LEN: usize = 70;

/// Byte limit of `Description::node_name`
pub const MAX_NODE_NAME_LEN: usize = 30;

/// Byte limit of `Description::website`
pub const MAX_WEBSITE_LEN: usize = 140;

/// Byte limit of `Description::details`
pub const MAX_DETAILS_LEN: usize = 280;

/// Whole coins expressed in von.
pub fn lat(amount: u64) -> U256 {
    U256::from(amount) * U256::from(VON_PER_LAT)
}

/// True for the reserved escrow accounts.
pub fn is_system_account(address: &Address) -> bool {
    *address == RESTRICTING_POOL || *address == STAKING_POOL || *address == REWARD_POOL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lat_units() {
        assert_eq!(lat(1), U256::from(VON_PER_LAT));
        assert_eq!(lat(0), U256::ZERO);
    }

    #[test]
    fn test_system_accounts_distinct() {
        assert_ne!(RESTRICTING_POOL, STAKING_POOL);
        assert_ne!(STAKING_POOL, REWARD_POOL);
        assert!(is_system_account(&REWARD_POOL));
        assert!(!is_system_account(&Address::ZERO));
    }
}
