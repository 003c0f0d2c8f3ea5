//! Shared handle for concurrent callers
//!
//! One writer at a time: client mutations and block ticks take the write
//! lock, so no caller ever observes a half-applied boundary batch. Queries
//! share the read lock.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    call::{Call, Response},
    ledger::{BlockOutcome, Ledger},
    NodeId,
};

/// Cloneable handle to a [`Ledger`]
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    inner: Arc<RwLock<Ledger>>,
}

impl LedgerHandle {
    /// Wrap `ledger`
    pub fn new(ledger: Ledger) -> Self {
        Self { inner: Arc::new(RwLock::new(ledger)) }
    }

    /// Dispatch a call, taking the read lock for queries.
    pub async fn call(&self, call: Call) -> Response {
        if call.is_query() {
            let ledger = self.inner.read().await;
            if let Some(response) = ledger.dispatch_query(&call) {
                return response;
            }
        }
        self.inner.write().await.dispatch(call)
    }

    /// Finish the executing block.
    pub async fn advance_block(&self, producer: Option<NodeId>) -> BlockOutcome {
        self.inner.write().await.advance_block(producer)
    }

    /// Run `f` with shared access.
    pub async fn read<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&*self.inner.read().await)
    }

    /// Run `f` with exclusive access.
    pub async fn execute<R>(&self, f: impl FnOnce(&mut Ledger) -> R) -> R {
        f(&mut *self.inner.write().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        staking::{CreateStakingRequest, Description, FundsKind},
        test_utils::{addr, node, test_config},
    };
    use alloy_primitives::U256;

    fn handle() -> LedgerHandle {
        let mut ledger = Ledger::new(test_config()).unwrap();
        for n in 1..=20u8 {
            ledger.allocate(addr(n), U256::from(10_000));
        }
        LedgerHandle::new(ledger)
    }

    fn create(n: u8) -> Call {
        Call::CreateStaking(CreateStakingRequest {
            node_id: node(1),
            staking_address: addr(n),
            funds_kind: FundsKind::Free,
            benefit_address: addr(n).to_string(),
            amount: U256::from(1_000),
            description: Description::default(),
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_same_node() {
        let handle = handle();
        let tasks: Vec<_> = (1..=20u8)
            .map(|n| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.call(create(n)).await })
            })
            .collect();

        let mut accepted = 0;
        for task in tasks {
            let response = task.await.unwrap();
            if response.is_ok() {
                accepted += 1;
            } else {
                assert_eq!(response.code, 301101);
            }
        }
        assert_eq!(accepted, 1);
        handle.read(|ledger| ledger.check_invariants()).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ticks_and_calls_interleave_atomically() {
        let handle = handle();
        handle.call(create(1)).await;
        handle.execute(|ledger| ledger.complete_genesis().len()).await;

        let ticker = {
            let handle = handle.clone();
            tokio::spawn(async move {
                for _ in 0..120 {
                    let producer = handle.read(|l| l.scheduled_producer(l.block_number())).await;
                    handle.advance_block(producer).await;
                }
            })
        };
        let delegators: Vec<_> = (2..=6u8)
            .map(|n| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    for _ in 0..10 {
                        let response = handle
                            .call(Call::Delegate {
                                from: addr(n),
                                node_id: node(1),
                                funds_kind: FundsKind::Free,
                                amount: U256::from(10),
                            })
                            .await;
                        assert!(response.is_ok());
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        ticker.await.unwrap();
        for task in delegators {
            task.await.unwrap();
        }
        handle
            .read(|ledger| {
                assert_eq!(ledger.block_number(), 121);
                assert_eq!(ledger.staking().get(&node(1)).unwrap().delegated, U256::from(500));
                ledger.check_invariants()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_query_uses_read_path() {
        let handle = handle();
        let response = handle.call(Call::GetCandidateInfo { node_id: node(3) }).await;
        assert_eq!(response.code, 301204);
    }
}
