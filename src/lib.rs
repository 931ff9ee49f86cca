//! Capped fungible-token ledger.
//!
//! The crate is the accounting core of an owner-administered token:
//!
//! * [`ledger`]: the authoritative [`LedgerState`] holding balances, the supply
//!   cap, account locks, the transfer switch and single-owner authority.
//! * [`ops`]: the serializable [`Operation`] set, atomic dispatch and
//!   ordered application with receipts.
//! * [`config`]: genesis parameters.
//!
//! Every operation is a synchronous state transition over `&mut
//! LedgerState`. Ordering, persistence and transport belong to the caller.

pub mod config;
pub mod ledger;
pub mod ops;

pub use config::GenesisConfig;
pub use ledger::{Address, Amount, LedgerError, LedgerEvent, LedgerSnapshot, LedgerState};
pub use ops::{apply_calls, Call, Operation, Receipt, ReceiptOutcome};
