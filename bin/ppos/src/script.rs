//! Simulation scripts
//!
//! A script is a JSON array of steps:
//!
//! ```json
//! [
//!   {"call": {"method": "delegate", "from": "0x..", "nodeId": "0x..", "amount": "0x64"}},
//!   {"advance": {"blocks": 40}},
//!   {"advance": {"blocks": 40, "produce": false}}
//! ]
//! ```
//!
//! `advance` finishes blocks with the scheduled producer unless `produce` is
//! false, in which case nobody is credited and validators miss their slots.

use ppos_ledger::{Call, LedgerHandle, Response, Settlement};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One script step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum Step {
    /// Dispatch a call
    Call(Call),
    /// Finish `blocks` blocks
    Advance {
        blocks: u64,
        #[serde(default = "produce_by_default")]
        produce: bool,
    },
}

const fn produce_by_default() -> bool {
    true
}

/// Output line of a simulation
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub(crate) enum Report {
    /// Response to a call step
    Call {
        step: usize,
        method: &'static str,
        #[serde(flatten)]
        response: Response,
    },
    /// A settlement boundary crossed while advancing
    Settlement {
        step: usize,
        height: u64,
        #[serde(flatten)]
        settlement: Settlement,
    },
}

pub(crate) fn load(path: &Path) -> eyre::Result<Vec<Step>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub(crate) async fn run(handle: &LedgerHandle, steps: Vec<Step>) -> Vec<Report> {
    let mut reports = Vec::new();
    for (step, action) in steps.into_iter().enumerate() {
        match action {
            Step::Call(call) => {
                let method = call.method();
                let response = handle.call(call).await;
                reports.push(Report::Call { step, method, response });
            }
            Step::Advance { blocks, produce } => {
                for _ in 0..blocks {
                    let producer = if produce {
                        handle.read(|l| l.scheduled_producer(l.block_number())).await
                    } else {
                        None
                    };
                    let outcome = handle.advance_block(producer).await;
                    if let Some(settlement) = outcome.settlement {
                        reports.push(Report::Settlement {
                            step,
                            height: outcome.tick.height,
                            settlement,
                        });
                    }
                }
            }
        }
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B512};
    use ppos_genesis::{Allocation, GenesisBuilder, GenesisConfig};
    use ppos_ledger::{constants::lat, CreateStakingRequest, Description, FundsKind};

    fn handle() -> LedgerHandle {
        let operator = Address::repeat_byte(0x11);
        let config = GenesisConfig::devnet()
            .with_allocation(Allocation::new(operator, lat(1_000_000), ""))
            .with_allocation(Allocation::new(Address::repeat_byte(0x22), lat(1_000), ""))
            .with_validator(CreateStakingRequest {
                node_id: B512::repeat_byte(1),
                staking_address: operator,
                funds_kind: FundsKind::Free,
                benefit_address: operator.to_checksum(None),
                amount: lat(10_000),
                description: Description::default(),
            });
        LedgerHandle::new(GenesisBuilder::new(config).build().unwrap())
    }

    #[test]
    fn test_step_json() {
        let steps: Vec<Step> = serde_json::from_str(
            r#"[{"call":{"method":"getValidatorList"}},{"advance":{"blocks":3}},{"advance":{"blocks":1,"produce":false}}]"#,
        )
        .unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Call(Call::GetValidatorList),
                Step::Advance { blocks: 3, produce: true },
                Step::Advance { blocks: 1, produce: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_run_script() {
        let handle = handle();
        let delegate = Call::Delegate {
            from: Address::repeat_byte(0x22),
            node_id: B512::repeat_byte(1),
            funds_kind: FundsKind::Free,
            amount: lat(100),
        };
        let steps = vec![
            Step::Call(delegate),
            Step::Call(Call::WithdrewStaking { node_id: B512::repeat_byte(9) }),
            Step::Advance { blocks: 40, produce: true },
        ];

        let reports = run(&handle, steps).await;
        assert_eq!(reports.len(), 3);
        assert!(matches!(&reports[0], Report::Call { response, .. } if response.is_ok()));
        assert!(matches!(&reports[1], Report::Call { response, .. } if response.code == 301102));
        let Report::Settlement { height, settlement, .. } = &reports[2] else {
            panic!("expected settlement")
        };
        assert_eq!(*height, 40);
        assert_eq!(settlement.epoch, 1);
        assert_eq!(settlement.payouts.len(), 1);

        let json = serde_json::to_value(&reports[1]).unwrap();
        assert_eq!(json["kind"], "call");
        assert_eq!(json["method"], "withdrewStaking");
        assert_eq!(json["Code"], 301102);
        handle.read(|l| l.check_invariants()).await.unwrap();
    }

    #[test]
    fn test_load_script_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.json");
        std::fs::write(&path, r#"[{"advance":{"blocks":2}}]"#).unwrap();
        assert_eq!(load(&path).unwrap(), vec![Step::Advance { blocks: 2, produce: true }]);
        assert!(load(&dir.path().join("missing.json")).is_err());
    }
}
