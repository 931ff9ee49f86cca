use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::ledger::{units::serde_tokens, Address, Amount, LedgerError, LedgerEvent, LedgerState};

/// Every state-changing call the ledger accepts. Queries are plain methods
/// on [`LedgerState`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    RenameToken {
        symbol: String,
        name: String,
    },
    IncreaseSupply {
        #[serde(with = "serde_tokens")]
        delta: Amount,
    },
    Mint {
        to: Address,
        #[serde(with = "serde_tokens")]
        amount: Amount,
    },
    MintThenLock {
        to: Address,
        #[serde(with = "serde_tokens")]
        amount: Amount,
    },
    Burn {
        from: Address,
        #[serde(with = "serde_tokens")]
        amount: Amount,
    },
    AllowTransfers,
    LockAddress {
        address: Address,
    },
    UnlockAddress {
        address: Address,
    },
    Transfer {
        to: Address,
        #[serde(with = "serde_tokens")]
        amount: Amount,
    },
    Approve {
        spender: Address,
        #[serde(with = "serde_tokens")]
        amount: Amount,
    },
    TransferFrom {
        from: Address,
        to: Address,
        #[serde(with = "serde_tokens")]
        amount: Amount,
    },
    TransferOwnership {
        new_owner: Address,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::RenameToken { .. } => "rename_token",
            Operation::IncreaseSupply { .. } => "increase_supply",
            Operation::Mint { .. } => "mint",
            Operation::MintThenLock { .. } => "mint_then_lock",
            Operation::Burn { .. } => "burn",
            Operation::AllowTransfers => "allow_transfers",
            Operation::LockAddress { .. } => "lock_address",
            Operation::UnlockAddress { .. } => "unlock_address",
            Operation::Transfer { .. } => "transfer",
            Operation::Approve { .. } => "approve",
            Operation::TransferFrom { .. } => "transfer_from",
            Operation::TransferOwnership { .. } => "transfer_ownership",
        }
    }

    /// Whether the operation is reserved for the owner.
    pub fn is_privileged(&self) -> bool {
        !matches!(
            self,
            Operation::Transfer { .. } | Operation::Approve { .. } | Operation::TransferFrom { .. }
        )
    }
}

/// An operation together with the identity that submitted it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Call {
    pub caller: Address,
    #[serde(flatten)]
    pub op: Operation,
}

impl Call {
    pub fn new(caller: Address, op: Operation) -> Self {
        Self { caller, op }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReceiptOutcome {
    Accepted { events: Vec<LedgerEvent> },
    Rejected { code: String, reason: String },
}

impl ReceiptOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ReceiptOutcome::Accepted { .. })
    }

    fn commitment(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            ReceiptOutcome::Accepted { events } => {
                buf.extend_from_slice(b"accepted");
                buf.extend_from_slice(&(events.len() as u64).to_le_bytes());
                for event in events {
                    // serializing a plain data enum into memory cannot fail
                    buf.extend(serde_json::to_vec(event).unwrap_or_default());
                }
            }
            ReceiptOutcome::Rejected { code, reason } => {
                buf.extend_from_slice(b"rejected");
                buf.extend_from_slice(code.as_bytes());
                buf.extend_from_slice(reason.as_bytes());
            }
        }
        buf
    }
}

impl From<Result<Vec<LedgerEvent>, LedgerError>> for ReceiptOutcome {
    fn from(result: Result<Vec<LedgerEvent>, LedgerError>) -> Self {
        match result {
            Ok(events) => ReceiptOutcome::Accepted { events },
            Err(err) => ReceiptOutcome::Rejected {
                code: err.code().to_string(),
                reason: err.to_string(),
            },
        }
    }
}

/// Result of one call within an ordered sequence.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub index: u64,
    pub caller: Address,
    pub op: String,
    #[serde(flatten)]
    pub outcome: ReceiptOutcome,
}

impl Receipt {
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_le_bytes());
        hasher.update(self.caller.as_bytes());
        hasher.update(self.op.as_bytes());
        hasher.update(self.outcome.commitment());
        hasher.finalize().into()
    }
}

impl LedgerState {
    /// Apply one call atomically and drain the events it emitted.
    pub fn execute(&mut self, call: &Call) -> Result<Vec<LedgerEvent>, LedgerError> {
        let start = self.events().len();
        let caller = call.caller;
        match &call.op {
            Operation::RenameToken { symbol, name } => {
                self.rename_token(caller, symbol.clone(), name.clone())?
            }
            Operation::IncreaseSupply { delta } => self.increase_supply(caller, *delta)?,
            Operation::Mint { to, amount } => self.mint(caller, *to, *amount)?,
            Operation::MintThenLock { to, amount } => self.mint_then_lock(caller, *to, *amount)?,
            Operation::Burn { from, amount } => self.burn(caller, *from, *amount)?,
            Operation::AllowTransfers => self.allow_transfers(caller)?,
            Operation::LockAddress { address } => self.lock_address(caller, *address)?,
            Operation::UnlockAddress { address } => self.unlock_address(caller, *address)?,
            Operation::Transfer { to, amount } => self.transfer(caller, *to, *amount)?,
            Operation::Approve { spender, amount } => self.approve(caller, *spender, *amount)?,
            Operation::TransferFrom { from, to, amount } => {
                self.transfer_from(caller, *from, *to, *amount)?
            }
            Operation::TransferOwnership { new_owner } => {
                self.transfer_ownership(caller, *new_owner)?
            }
        }
        Ok(self.take_events_since(start))
    }
}

/// Apply `calls` strictly in order. A rejected call leaves the state as it
/// was and does not stop the sequence.
pub fn apply_calls<'a>(
    state: &mut LedgerState,
    calls: impl IntoIterator<Item = &'a Call>,
) -> Vec<Receipt> {
    calls
        .into_iter()
        .enumerate()
        .map(|(index, call)| {
            let result = state.execute(call);
            match &result {
                Ok(events) => debug!(
                    index,
                    caller = %call.caller,
                    op = call.op.name(),
                    events = events.len(),
                    "call accepted"
                ),
                Err(err) => warn!(
                    index,
                    caller = %call.caller,
                    op = call.op.name(),
                    code = err.code(),
                    "call rejected: {err}"
                ),
            }
            Receipt {
                index: index as u64,
                caller: call.caller,
                op: call.op.name().to_string(),
                outcome: result.into(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::tokens;

    const OWNER: Address = Address::repeat(0xaa);
    const A: Address = Address::repeat(1);
    const B: Address = Address::repeat(2);

    fn genesis() -> LedgerState {
        LedgerState::new("DIGID Token", "DIGID", OWNER, tokens(1_714_285_714)).unwrap()
    }

    #[test]
    fn call_json_is_flat_and_token_denominated() {
        let call: Call = serde_json::from_str(
            r#"{"caller":"0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa","op":"mint","to":"0x0101010101010101010101010101010101010101","amount":"1000"}"#,
        )
        .unwrap();
        assert_eq!(
            call,
            Call::new(
                OWNER,
                Operation::Mint {
                    to: A,
                    amount: tokens(1000)
                }
            )
        );

        let unit: Call = serde_json::from_str(
            r#"{"caller":"0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa","op":"allow_transfers"}"#,
        )
        .unwrap();
        assert_eq!(unit.op, Operation::AllowTransfers);
    }

    #[test]
    fn execute_returns_only_new_events() {
        let mut ledger = genesis();
        let events = ledger
            .execute(&Call::new(OWNER, Operation::MintThenLock { to: A, amount: tokens(5) }))
            .unwrap();
        assert_eq!(events.len(), 2);

        let events = ledger
            .execute(&Call::new(OWNER, Operation::LockAddress { address: A }))
            .unwrap();
        assert!(events.is_empty());
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn executed_calls_leave_no_pending_events() {
        let mut ledger = genesis();
        ledger.mint(OWNER, B, tokens(1)).unwrap();

        let calls: Vec<Call> = (0..500)
            .map(|_| Call::new(OWNER, Operation::Mint { to: A, amount: tokens(1) }))
            .collect();
        let receipts = apply_calls(&mut ledger, &calls);
        assert!(receipts.iter().all(|r| matches!(
            &r.outcome,
            ReceiptOutcome::Accepted { events } if events.len() == 1
        )));
        assert_eq!(ledger.balance_of(&A), tokens(500));

        // direct calls made before dispatch stay pending for their owner
        assert_eq!(
            ledger.take_events(),
            vec![LedgerEvent::Mint { to: B, amount: tokens(1) }]
        );
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn apply_calls_keeps_going_after_rejections() {
        let mut ledger = genesis();
        let calls = vec![
            Call::new(OWNER, Operation::Mint { to: A, amount: tokens(1000) }),
            Call::new(A, Operation::Transfer { to: B, amount: tokens(200) }),
            Call::new(OWNER, Operation::AllowTransfers),
            Call::new(A, Operation::Transfer { to: B, amount: tokens(200) }),
            Call::new(B, Operation::Mint { to: B, amount: tokens(1) }),
        ];
        let receipts = apply_calls(&mut ledger, &calls);
        let accepted: Vec<bool> = receipts.iter().map(|r| r.outcome.is_accepted()).collect();
        assert_eq!(accepted, vec![true, false, true, true, false]);
        assert_eq!(
            receipts[1].outcome,
            ReceiptOutcome::Rejected {
                code: "transfers_disabled".into(),
                reason: "transfers are not enabled".into(),
            }
        );
        assert!(matches!(
            &receipts[4].outcome,
            ReceiptOutcome::Rejected { code, .. } if code == "not_owner"
        ));
        assert_eq!(ledger.balance_of(&A), tokens(800));
        assert_eq!(ledger.balance_of(&B), tokens(200));
        assert_eq!(ledger.height(), 3);
    }

    #[test]
    fn receipt_digest_commits_to_outcome() {
        let mut ledger = genesis();
        let calls = [
            Call::new(OWNER, Operation::IncreaseSupply { delta: tokens(1) }),
            Call::new(A, Operation::IncreaseSupply { delta: tokens(1) }),
        ];
        let receipts = apply_calls(&mut ledger, &calls);
        assert_eq!(receipts[0].digest(), receipts[0].clone().digest());
        assert_ne!(receipts[0].digest(), receipts[1].digest());

        let json = serde_json::to_value(&receipts[1]).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["code"], "not_owner");
        assert_eq!(json["op"], "increase_supply");
    }

    #[test]
    fn privileged_operations_are_flagged() {
        assert!(Operation::AllowTransfers.is_privileged());
        assert!(Operation::Burn { from: A, amount: tokens(1) }.is_privileged());
        assert!(!Operation::Transfer { to: A, amount: tokens(1) }.is_privileged());
    }
}
