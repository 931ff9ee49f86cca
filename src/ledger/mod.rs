use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

mod address;
mod error;
mod gate;
mod supply;
pub mod units;

pub use address::{Address, AddressParseError, ADDRESS_LEN};
pub use error::LedgerError;
pub use units::{format_units, parse_units, tokens, Amount, DECIMALS, ONE_TOKEN};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Account {
    #[serde(with = "units::serde_tokens")]
    pub balance: Amount,
    #[serde(default)]
    pub locked: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    /// Number of accepted mutating operations since genesis.
    pub height: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowanceEntry {
    pub owner: Address,
    pub spender: Address,
    #[serde(with = "units::serde_tokens")]
    pub amount: Amount,
}

/// Durable form of the ledger. `state_root` commits to everything except
/// `meta`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: SnapshotMetadata,
    pub name: String,
    pub symbol: String,
    pub owner: Address,
    #[serde(with = "units::serde_tokens")]
    pub total_supply: Amount,
    #[serde(with = "units::serde_tokens")]
    pub max_supply: Amount,
    pub transfers_enabled: bool,
    pub accounts: BTreeMap<Address, Account>,
    #[serde(default)]
    pub allowances: Vec<AllowanceEntry>,
    #[serde(with = "hex::serde")]
    pub state_root: [u8; 32],
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Mint {
        to: Address,
        #[serde(with = "units::serde_tokens")]
        amount: Amount,
    },
    Burn {
        from: Address,
        #[serde(with = "units::serde_tokens")]
        amount: Amount,
    },
    Transfer {
        from: Address,
        to: Address,
        #[serde(with = "units::serde_tokens")]
        amount: Amount,
    },
    Approval {
        owner: Address,
        spender: Address,
        #[serde(with = "units::serde_tokens")]
        amount: Amount,
    },
    Locked {
        account: Address,
    },
    Unlocked {
        account: Address,
    },
    TransfersEnabled,
    SupplyIncreased {
        #[serde(with = "units::serde_tokens")]
        delta: Amount,
        #[serde(with = "units::serde_tokens")]
        max_supply: Amount,
    },
    Renamed {
        symbol: String,
        name: String,
    },
    OwnershipTransferred {
        previous: Address,
        new: Address,
    },
}

/// The single authoritative token ledger.
///
/// Fields are private: every mutation goes through an operation that checks
/// authority and gates first and only then writes, so a rejected call never
/// leaves a partial update behind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerState {
    meta: SnapshotMetadata,
    name: String,
    symbol: String,
    owner: Address,
    total_supply: Amount,
    max_supply: Amount,
    transfers_enabled: bool,
    accounts: BTreeMap<Address, Account>,
    allowances: BTreeMap<(Address, Address), Amount>,
    events: Vec<LedgerEvent>,
}

impl LedgerState {
    /// Genesis state: no balances, transfers disabled, `owner` in charge.
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        owner: Address,
        max_supply: Amount,
    ) -> Result<Self, LedgerError> {
        if owner.is_zero() {
            return Err(LedgerError::InvalidOwner);
        }
        Ok(Self {
            meta: SnapshotMetadata::default(),
            name: name.into(),
            symbol: symbol.into(),
            owner,
            total_supply: Amount::zero(),
            max_supply,
            transfers_enabled: false,
            accounts: BTreeMap::new(),
            allowances: BTreeMap::new(),
            events: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        DECIMALS
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn max_supply(&self) -> Amount {
        self.max_supply
    }

    pub fn is_transfer_allowed(&self) -> bool {
        self.transfers_enabled
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.accounts
            .get(account)
            .map(|a| a.balance)
            .unwrap_or_default()
    }

    pub fn is_locked(&self, account: &Address) -> bool {
        self.accounts.get(account).map(|a| a.locked).unwrap_or(false)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn accounts(&self) -> &BTreeMap<Address, Account> {
        &self.accounts
    }

    pub fn height(&self) -> u64 {
        self.meta.height
    }

    /// Events emitted and not yet drained.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Hand the pending events to the consumer and clear the journal.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drain the events recorded after the first `start` pending ones.
    pub(crate) fn take_events_since(&mut self, start: usize) -> Vec<LedgerEvent> {
        self.events.split_off(start.min(self.events.len()))
    }

    /// Record an accepted operation and the events it produced.
    fn commit(&mut self, events: impl IntoIterator<Item = LedgerEvent>) {
        self.events.extend(events);
        self.meta.height += 1;
    }

    /// Accepted operation that changed nothing.
    fn commit_noop(&mut self) {
        self.meta.height += 1;
    }

    fn account_mut(&mut self, account: Address) -> &mut Account {
        self.accounts.entry(account).or_default()
    }

    pub fn check_invariants(&self) -> Result<(), LedgerError> {
        let mut sum = Amount::zero();
        for account in self.accounts.values() {
            sum = sum.checked_add(account.balance).ok_or_else(|| {
                LedgerError::InvariantViolation("sum of balances overflows".into())
            })?;
        }
        if sum != self.total_supply {
            return Err(LedgerError::InvariantViolation(format!(
                "total supply {} differs from sum of balances {}",
                self.total_supply, sum
            )));
        }
        if self.total_supply > self.max_supply {
            return Err(LedgerError::InvariantViolation(format!(
                "total supply {} exceeds max supply {}",
                self.total_supply, self.max_supply
            )));
        }
        if self.owner.is_zero() {
            return Err(LedgerError::InvariantViolation(
                "owner is the null address".into(),
            ));
        }
        Ok(())
    }

    pub fn state_root(&self) -> [u8; 32] {
        compute_merkle_root(self)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            meta: self.meta.clone(),
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            owner: self.owner,
            total_supply: self.total_supply,
            max_supply: self.max_supply,
            transfers_enabled: self.transfers_enabled,
            accounts: self.accounts.clone(),
            allowances: self
                .allowances
                .iter()
                .map(|((owner, spender), amount)| AllowanceEntry {
                    owner: *owner,
                    spender: *spender,
                    amount: *amount,
                })
                .collect(),
            state_root: self.state_root(),
        }
    }

    /// Rebuild a ledger from a stored snapshot, verifying its root and the
    /// supply invariants.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, LedgerError> {
        let mut allowances = BTreeMap::new();
        for entry in snapshot.allowances {
            if entry.amount.is_zero() {
                continue;
            }
            if allowances
                .insert((entry.owner, entry.spender), entry.amount)
                .is_some()
            {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "duplicate allowance {} -> {}",
                    entry.owner, entry.spender
                )));
            }
        }
        let state = Self {
            meta: snapshot.meta,
            name: snapshot.name,
            symbol: snapshot.symbol,
            owner: snapshot.owner,
            total_supply: snapshot.total_supply,
            max_supply: snapshot.max_supply,
            transfers_enabled: snapshot.transfers_enabled,
            accounts: snapshot.accounts,
            allowances,
            events: Vec::new(),
        };
        if state.state_root() != snapshot.state_root {
            return Err(LedgerError::CorruptSnapshot("state root mismatch".into()));
        }
        state
            .check_invariants()
            .map_err(|e| LedgerError::CorruptSnapshot(e.to_string()))?;
        Ok(state)
    }
}

fn amount_bytes(amount: &Amount) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, limb) in amount.0.iter().rev().enumerate() {
        out[i * 8..(i + 1) * 8].copy_from_slice(&limb.to_be_bytes());
    }
    out
}

fn compute_merkle_root(state: &LedgerState) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::with_capacity(1 + state.accounts.len());

    let mut hasher = Sha256::new();
    hasher.update(b"meta");
    hasher.update((state.name.len() as u64).to_le_bytes());
    hasher.update(state.name.as_bytes());
    hasher.update((state.symbol.len() as u64).to_le_bytes());
    hasher.update(state.symbol.as_bytes());
    hasher.update(state.owner.as_bytes());
    hasher.update(amount_bytes(&state.total_supply));
    hasher.update(amount_bytes(&state.max_supply));
    hasher.update([state.transfers_enabled as u8]);
    leaves.push(hasher.finalize().into());

    for (address, account) in &state.accounts {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update(address.as_bytes());
        hasher.update(amount_bytes(&account.balance));
        hasher.update([account.locked as u8]);
        leaves.push(hasher.finalize().into());
    }
    for ((owner, spender), amount) in &state.allowances {
        let mut hasher = Sha256::new();
        hasher.update(b"allow");
        hasher.update(owner.as_bytes());
        hasher.update(spender.as_bytes());
        hasher.update(amount_bytes(amount));
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    // the meta leaf is always present
    leaves[0]
}
