use super::{Address, Amount};

/// Rejection of a ledger operation. Every variant means the state was left
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("caller {caller} is not the owner")]
    NotOwner { caller: Address },
    #[error("mint of {requested} exceeds remaining supply {available}")]
    SupplyCapExceeded { requested: Amount, available: Amount },
    #[error("insufficient balance in account {account}: have {balance}, need {required}")]
    InsufficientBalance {
        account: Address,
        balance: Amount,
        required: Amount,
    },
    #[error("account {account} is locked")]
    AddressLocked { account: Address },
    #[error("transfers are not enabled")]
    TransfersDisabled,
    #[error("new owner must not be the null address")]
    InvalidOwner,
    #[error("the null address cannot receive tokens or allowances")]
    InvalidAddress,
    #[error("allowance of {spender} over {owner} is {allowance}, need {required}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: Amount,
        required: Amount,
    },
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

impl LedgerError {
    /// Stable machine-readable code, used in receipts.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotOwner { .. } => "not_owner",
            LedgerError::SupplyCapExceeded { .. } => "supply_cap_exceeded",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::AddressLocked { .. } => "address_locked",
            LedgerError::TransfersDisabled => "transfers_disabled",
            LedgerError::InvalidOwner => "invalid_owner",
            LedgerError::InvalidAddress => "invalid_address",
            LedgerError::InsufficientAllowance { .. } => "insufficient_allowance",
            LedgerError::ArithmeticOverflow => "arithmetic_overflow",
            LedgerError::InvariantViolation(_) => "invariant_violation",
            LedgerError::CorruptSnapshot(_) => "corrupt_snapshot",
        }
    }
}
