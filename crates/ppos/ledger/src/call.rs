//! Transport-facing calls and `{code, ret}` responses
//!
//! The transport authenticates callers before a [`Call`] reaches the ledger;
//! `from` fields name the already-verified sender.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{LedgerError, LedgerResult},
    ledger::Ledger,
    restricting::ReleaseInput,
    staking::{CreateStakingRequest, Description, FundsKind},
    NodeId,
};

/// Code reported when a result cannot be encoded
pub const SYSTEM_ERROR_CODE: u32 = 1;

/// A client call, tagged by `method`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Call {
    /// Register a candidate
    CreateStaking(CreateStakingRequest),
    /// Add stake from the staking address
    IncreaseStaking {
        /// Candidate
        node_id: NodeId,
        /// Funding source
        #[serde(default)]
        funds_kind: FundsKind,
        /// Amount added
        amount: U256,
    },
    /// Withdraw all stake
    WithdrewStaking {
        /// Candidate
        node_id: NodeId,
    },
    /// Update candidate metadata
    EditCandidate {
        /// Candidate
        node_id: NodeId,
        /// New reward address
        #[serde(default)]
        benefit_address: Option<String>,
        /// New description
        #[serde(default)]
        description: Option<Description>,
    },
    /// Lock funds for a beneficiary
    CreateRestrictingPlan {
        /// Funding account
        from: Address,
        /// Beneficiary
        account: Address,
        /// Release schedule
        plans: Vec<ReleaseInput>,
    },
    /// Delegate to a candidate
    Delegate {
        /// Delegator
        from: Address,
        /// Candidate
        node_id: NodeId,
        /// Funding source
        #[serde(default)]
        funds_kind: FundsKind,
        /// Amount delegated
        amount: U256,
    },
    /// Withdraw (part of) a delegation
    WithdrewDelegate {
        /// Delegator
        from: Address,
        /// Candidate
        node_id: NodeId,
        /// Staking block of the candidate record delegated to
        staking_block_num: u64,
        /// Amount withdrawn
        amount: U256,
    },
    /// Submit duplicate-sign evidence
    ReportDuplicateSign {
        /// Reporter, paid part of the penalty
        from: Address,
        /// Offending node
        node_id: NodeId,
        /// Block the conflicting signatures refer to
        block_number: u64,
    },
    /// Candidate query
    GetCandidateInfo {
        /// Candidate
        node_id: NodeId,
    },
    /// Restricting plan query
    GetRestrictingInfo {
        /// Beneficiary
        account: Address,
    },
    /// Delegation query
    GetDelegateInfo {
        /// Delegator
        from: Address,
        /// Candidate
        node_id: NodeId,
        /// Staking block of the candidate record delegated to
        staking_block_num: u64,
    },
    /// Current validator set
    GetValidatorList,
    /// Every candidate record
    GetCandidateList,
}

impl Call {
    /// Wire name of the call
    pub const fn method(&self) -> &'static str {
        match self {
            Self::CreateStaking(_) => "createStaking",
            Self::IncreaseStaking { .. } => "increaseStaking",
            Self::WithdrewStaking { .. } => "withdrewStaking",
            Self::EditCandidate { .. } => "editCandidate",
            Self::CreateRestrictingPlan { .. } => "createRestrictingPlan",
            Self::Delegate { .. } => "delegate",
            Self::WithdrewDelegate { .. } => "withdrewDelegate",
            Self::ReportDuplicateSign { .. } => "reportDuplicateSign",
            Self::GetCandidateInfo { .. } => "getCandidateInfo",
            Self::GetRestrictingInfo { .. } => "getRestrictingInfo",
            Self::GetDelegateInfo { .. } => "getDelegateInfo",
            Self::GetValidatorList => "getValidatorList",
            Self::GetCandidateList => "getCandidateList",
        }
    }

    /// Call only reads state
    pub const fn is_query(&self) -> bool {
        matches!(
            self,
            Self::GetCandidateInfo { .. }
                | Self::GetRestrictingInfo { .. }
                | Self::GetDelegateInfo { .. }
                | Self::GetValidatorList
                | Self::GetCandidateList
        )
    }
}

/// Result envelope returned to the transport; code 0 is success
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    /// 0 on success, otherwise a [`LedgerError::code`]
    pub code: u32,
    /// Result payload, or the error message
    pub ret: serde_json::Value,
}

impl Response {
    /// Success carrying `ret`
    pub fn ok(ret: impl Serialize) -> Self {
        match serde_json::to_value(ret) {
            Ok(ret) => Self { code: 0, ret },
            Err(err) => Self { code: SYSTEM_ERROR_CODE, ret: err.to_string().into() },
        }
    }

    /// Failure for `err`
    pub fn error(err: &LedgerError) -> Self {
        Self { code: err.code(), ret: err.to_string().into() }
    }

    /// Code is 0
    pub const fn is_ok(&self) -> bool {
        self.code == 0
    }

    fn from_result<T: Serialize>(method: &str, result: LedgerResult<T>) -> Self {
        match result {
            Ok(ret) => Self::ok(ret),
            Err(err) => {
                debug!(target: "ppos::ledger", method, code = err.code(), %err, "Call rejected");
                Self::error(&err)
            }
        }
    }
}

impl Ledger {
    /// Execute `call` and wrap the result.
    pub fn dispatch(&mut self, call: Call) -> Response {
        if let Some(response) = self.dispatch_query(&call) {
            return response;
        }
        let method = call.method();
        match call {
            Call::CreateStaking(request) => Response::from_result(method, self.create_staking(request)),
            Call::IncreaseStaking { node_id, funds_kind, amount } => {
                Response::from_result(method, self.increase_staking(node_id, funds_kind, amount))
            }
            Call::WithdrewStaking { node_id } => {
                Response::from_result(method, self.withdrew_staking(node_id))
            }
            Call::EditCandidate { node_id, benefit_address, description } => Response::from_result(
                method,
                self.edit_candidate(node_id, benefit_address.as_deref(), description),
            ),
            Call::CreateRestrictingPlan { from, account, plans } => {
                Response::from_result(method, self.create_restricting_plan(from, account, &plans))
            }
            Call::Delegate { from, node_id, funds_kind, amount } => {
                Response::from_result(method, self.delegate(from, node_id, funds_kind, amount))
            }
            Call::WithdrewDelegate { from, node_id, staking_block_num, amount } => Response::from_result(
                method,
                self.withdrew_delegate(from, node_id, staking_block_num, amount),
            ),
            Call::ReportDuplicateSign { from, node_id, block_number } => Response::from_result(
                method,
                self.report_duplicate_sign(from, node_id, block_number),
            ),
            Call::GetCandidateInfo { .. }
            | Call::GetRestrictingInfo { .. }
            | Call::GetDelegateInfo { .. }
            | Call::GetValidatorList
            | Call::GetCandidateList => Response::ok(serde_json::Value::Null),
        }
    }

    /// Answer a query call; `None` for calls that mutate state.
    pub fn dispatch_query(&self, call: &Call) -> Option<Response> {
        let method = call.method();
        let response = match call {
            Call::GetCandidateInfo { node_id } => {
                Response::from_result(method, self.candidate_info(node_id))
            }
            Call::GetRestrictingInfo { account } => {
                Response::from_result(method, self.restricting_info(account))
            }
            Call::GetDelegateInfo { from, node_id, staking_block_num } => Response::from_result(
                method,
                self.delegation_info(*from, *node_id, *staking_block_num),
            ),
            Call::GetValidatorList => Response::ok(self.validator_list()),
            Call::GetCandidateList => Response::ok(self.candidate_list()),
            _ => return None,
        };
        Some(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{addr, node, test_config};

    fn ledger() -> Ledger {
        let mut ledger = Ledger::new(test_config()).unwrap();
        ledger.allocate(addr(1), U256::from(1_000_000));
        ledger
    }

    #[test]
    fn test_call_json_shape() {
        let json = format!(
            r#"{{"method":"createRestrictingPlan","from":"{}","account":"{}","plans":[{{"epoch":1,"amount":"1000"}}]}}"#,
            addr(1),
            addr(2)
        );
        let call: Call = serde_json::from_str(&json).unwrap();
        assert_eq!(
            call,
            Call::CreateRestrictingPlan {
                from: addr(1),
                account: addr(2),
                plans: vec![ReleaseInput::new(1, 1000)],
            }
        );

        let call: Call = serde_json::from_str(r#"{"method":"getValidatorList"}"#).unwrap();
        assert!(call.is_query());
    }

    #[test]
    fn test_negative_amount_rejected_on_decode() {
        let json = format!(
            r#"{{"method":"increaseStaking","nodeId":"{}","fundsKind":"restricting","amount":"-100"}}"#,
            node(1)
        );
        assert!(serde_json::from_str::<Call>(&json).is_err());

        let json = json.replace("-100", "100");
        let call: Call = serde_json::from_str(&json).unwrap();
        assert_eq!(
            call,
            Call::IncreaseStaking {
                node_id: node(1),
                funds_kind: FundsKind::Restricting,
                amount: U256::from(100),
            }
        );
    }

    #[test]
    fn test_dispatch_codes() {
        let mut ledger = ledger();
        let ok = ledger.dispatch(Call::CreateRestrictingPlan {
            from: addr(1),
            account: addr(2),
            plans: vec![ReleaseInput::new(1, 1000)],
        });
        assert!(ok.is_ok());

        let bad = ledger.dispatch(Call::CreateRestrictingPlan {
            from: addr(1),
            account: addr(2),
            plans: vec![ReleaseInput { epoch: 1, amount: Some(String::new()) }],
        });
        assert_eq!(bad.code, 304011);
        assert!(bad.ret.as_str().is_some());

        let query = ledger.dispatch(Call::GetRestrictingInfo { account: addr(2) });
        assert_eq!(query.code, 0);
        assert_eq!(query.ret["releases"][0]["epoch"], 1);
        assert_eq!(query.ret["debt"], "0x0");

        let missing = ledger.dispatch(Call::GetCandidateInfo { node_id: node(9) });
        assert_eq!(missing.code, 301204);
        let missing = ledger.dispatch(Call::WithdrewStaking { node_id: node(9) });
        assert_eq!(missing.code, 301102);
    }

    #[test]
    fn test_dispatch_query_skips_mutations() {
        let ledger = ledger();
        assert!(ledger.dispatch_query(&Call::WithdrewStaking { node_id: node(1) }).is_none());
        let list = ledger.dispatch_query(&Call::GetValidatorList).unwrap();
        assert_eq!(list.ret, serde_json::json!([]));
    }

    #[test]
    fn test_response_wire_names() {
        let response = Response::ok("done");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["Code"], 0);
        assert_eq!(json["Ret"], "done");
    }
}
