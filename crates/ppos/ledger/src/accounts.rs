//! Free balances
//!
//! The ledger never creates or destroys value outside of [`Accounts::allocate`]
//! (genesis) and [`Accounts::mint`] (rewards); everything else is a
//! [`Accounts::transfer`] between a user account and one of the escrow pools.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{LedgerError, LedgerResult};

/// Free balances keyed by address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accounts {
    balances: BTreeMap<Address, U256>,
    genesis_supply: U256,
    total_issued: U256,
}

impl Accounts {
    /// Create an empty account set
    pub fn new() -> Self {
        Self::default()
    }

    /// Free balance of `address`
    pub fn balance(&self, address: &Address) -> U256 {
        self.balances.get(address).copied().unwrap_or_default()
    }

    /// Credit a genesis allocation
    pub fn allocate(&mut self, address: Address, amount: U256) {
        self.genesis_supply += amount;
        self.credit(address, amount);
    }

    /// Issue new coins to `address`
    pub fn mint(&mut self, address: Address, amount: U256) {
        self.total_issued += amount;
        self.credit(address, amount);
    }

    /// Move `amount` from `from` to `to`.
    ///
    /// Fails with [`LedgerError::InsufficientBalance`] and leaves both
    /// balances untouched when `from` is short.
    pub fn transfer(&mut self, from: Address, to: Address, amount: U256) -> LedgerResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let available = self.balance(&from);
        let Some(remaining) = available.checked_sub(amount) else {
            return Err(LedgerError::InsufficientBalance {
                address: from,
                available,
                required: amount,
            });
        };
        if remaining.is_zero() {
            self.balances.remove(&from);
        } else {
            self.balances.insert(from, remaining);
        }
        self.credit(to, amount);
        Ok(())
    }

    fn credit(&mut self, address: Address, amount: U256) {
        if amount.is_zero() {
            return;
        }
        *self.balances.entry(address).or_default() += amount;
    }

    /// Value created at genesis
    pub const fn genesis_supply(&self) -> U256 {
        self.genesis_supply
    }

    /// Value minted as rewards since genesis
    pub const fn total_issued(&self) -> U256 {
        self.total_issued
    }

    /// Genesis supply plus issuance
    pub fn total_supply(&self) -> U256 {
        self.genesis_supply + self.total_issued
    }

    /// Sum of every balance held
    pub fn sum_balances(&self) -> U256 {
        self.balances.values().fold(U256::ZERO, |acc, b| acc + *b)
    }

    /// Iterate non-zero balances in address order
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &U256)> {
        self.balances.iter()
    }
}
