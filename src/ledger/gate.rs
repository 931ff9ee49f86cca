//! Authority and transfer gates.
//!
//! Privileged operations start with [`LedgerState::ensure_owner`]; value
//! moving operations pass [`LedgerState::ensure_transferable`] before the
//! recipient or any balance is looked at.

use tracing::{debug, info};

use super::{Address, Amount, LedgerError, LedgerEvent, LedgerState};

impl LedgerState {
    pub fn ensure_owner(&self, caller: &Address) -> Result<(), LedgerError> {
        if *caller != self.owner {
            return Err(LedgerError::NotOwner { caller: *caller });
        }
        Ok(())
    }

    /// Transfers must be enabled and neither party may be locked.
    pub fn ensure_transferable(&self, from: &Address, to: &Address) -> Result<(), LedgerError> {
        if !self.transfers_enabled {
            return Err(LedgerError::TransfersDisabled);
        }
        for account in [from, to] {
            if self.is_locked(account) {
                return Err(LedgerError::AddressLocked { account: *account });
            }
        }
        Ok(())
    }

    fn ensure_balance(&self, account: &Address, amount: Amount) -> Result<(), LedgerError> {
        let balance = self.balance_of(account);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *account,
                balance,
                required: amount,
            });
        }
        Ok(())
    }

    /// Move an already validated amount. Total supply is untouched.
    fn move_balance(&mut self, from: Address, to: Address, amount: Amount) -> Result<(), LedgerError> {
        if from == to {
            self.account_mut(to);
            return Ok(());
        }
        let from_balance = self
            .balance_of(&from)
            .checked_sub(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let to_balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.account_mut(from).balance = from_balance;
        self.account_mut(to).balance = to_balance;
        Ok(())
    }

    /// Move `amount` from the caller to `to`.
    pub fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> Result<(), LedgerError> {
        self.ensure_transferable(&from, &to)?;
        if to.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        self.ensure_balance(&from, amount)?;

        self.move_balance(from, to, amount)?;
        debug!(%from, %to, %amount, "transfer");
        self.commit([LedgerEvent::Transfer { from, to, amount }]);
        Ok(())
    }

    /// Set how much `spender` may move out of the caller's account.
    pub fn approve(&mut self, owner: Address, spender: Address, amount: Amount) -> Result<(), LedgerError> {
        if spender.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        if amount.is_zero() {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
        self.commit([LedgerEvent::Approval {
            owner,
            spender,
            amount,
        }]);
        Ok(())
    }

    /// Spend an allowance. Locks apply to `from` and `to`, not to the
    /// spender.
    pub fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_transferable(&from, &to)?;
        if to.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        let allowance = self.allowance(&from, &spender);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: from,
                spender,
                allowance,
                required: amount,
            });
        }
        self.ensure_balance(&from, amount)?;

        self.move_balance(from, to, amount)?;
        let remaining = allowance - amount;
        if remaining.is_zero() {
            self.allowances.remove(&(from, spender));
        } else {
            self.allowances.insert((from, spender), remaining);
        }
        debug!(%spender, %from, %to, %amount, "transfer from");
        self.commit([LedgerEvent::Transfer { from, to, amount }]);
        Ok(())
    }

    /// One-way switch. Repeating it is a successful no-op.
    pub fn allow_transfers(&mut self, caller: Address) -> Result<(), LedgerError> {
        self.ensure_owner(&caller)?;
        if self.transfers_enabled {
            self.commit_noop();
            return Ok(());
        }
        self.transfers_enabled = true;
        info!("transfers enabled");
        self.commit([LedgerEvent::TransfersEnabled]);
        Ok(())
    }

    pub fn lock_address(&mut self, caller: Address, account: Address) -> Result<(), LedgerError> {
        self.set_locked(caller, account, true)
    }

    pub fn unlock_address(&mut self, caller: Address, account: Address) -> Result<(), LedgerError> {
        self.set_locked(caller, account, false)
    }

    fn set_locked(&mut self, caller: Address, account: Address, locked: bool) -> Result<(), LedgerError> {
        self.ensure_owner(&caller)?;
        if self.is_locked(&account) == locked {
            self.commit_noop();
            return Ok(());
        }
        self.account_mut(account).locked = locked;
        debug!(%account, locked, "lock flag changed");
        let event = if locked {
            LedgerEvent::Locked { account }
        } else {
            LedgerEvent::Unlocked { account }
        };
        self.commit([event]);
        Ok(())
    }

    pub fn rename_token(
        &mut self,
        caller: Address,
        symbol: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(&caller)?;
        self.symbol = symbol.into();
        self.name = name.into();
        self.commit([LedgerEvent::Renamed {
            symbol: self.symbol.clone(),
            name: self.name.clone(),
        }]);
        Ok(())
    }

    /// Hand authority to `new_owner`. The caller loses it immediately.
    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> Result<(), LedgerError> {
        self.ensure_owner(&caller)?;
        if new_owner.is_zero() {
            return Err(LedgerError::InvalidOwner);
        }
        let previous = self.owner;
        self.owner = new_owner;
        info!(%previous, new = %new_owner, "ownership transferred");
        self.commit([LedgerEvent::OwnershipTransferred {
            previous,
            new: new_owner,
        }]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ledger::tokens;

    use super::*;

    const OWNER: Address = Address::repeat(0xaa);
    const A: Address = Address::repeat(1);
    const B: Address = Address::repeat(2);
    const C: Address = Address::repeat(3);

    fn funded() -> LedgerState {
        let mut ledger =
            LedgerState::new("DIGID Token", "DIGID", OWNER, tokens(1_714_285_714)).unwrap();
        ledger.mint(OWNER, A, tokens(1_000)).unwrap();
        ledger
    }

    #[test]
    fn transfer_requires_enablement() {
        let mut ledger = funded();
        let before = ledger.clone();
        assert_eq!(
            ledger.transfer(A, B, tokens(200)),
            Err(LedgerError::TransfersDisabled)
        );
        assert_eq!(ledger, before);

        ledger.allow_transfers(OWNER).unwrap();
        ledger.transfer(A, B, tokens(200)).unwrap();
        assert_eq!(ledger.balance_of(&A), tokens(800));
        assert_eq!(ledger.balance_of(&B), tokens(200));
        assert_eq!(ledger.total_supply(), tokens(1_000));
    }

    #[test]
    fn allow_transfers_is_idempotent_and_owner_only() {
        let mut ledger = funded();
        assert_eq!(
            ledger.allow_transfers(A),
            Err(LedgerError::NotOwner { caller: A })
        );
        ledger.allow_transfers(OWNER).unwrap();
        assert!(ledger.is_transfer_allowed());
        ledger.allow_transfers(OWNER).unwrap();
        assert!(ledger.is_transfer_allowed());
        let enabled = ledger
            .events()
            .iter()
            .filter(|e| matches!(e, LedgerEvent::TransfersEnabled))
            .count();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn locked_sender_or_receiver_blocks_transfer() {
        let mut ledger = funded();
        ledger.allow_transfers(OWNER).unwrap();
        ledger.transfer(A, B, tokens(200)).unwrap();

        ledger.lock_address(OWNER, B).unwrap();
        let before = ledger.clone();
        assert_eq!(
            ledger.transfer(B, C, tokens(100)),
            Err(LedgerError::AddressLocked { account: B })
        );
        assert_eq!(
            ledger.transfer(A, B, tokens(100)),
            Err(LedgerError::AddressLocked { account: B })
        );
        assert_eq!(ledger, before);

        ledger.unlock_address(OWNER, B).unwrap();
        ledger.transfer(B, C, tokens(100)).unwrap();
        assert_eq!(ledger.balance_of(&B), tokens(100));
        assert_eq!(ledger.balance_of(&C), tokens(100));
    }

    #[test]
    fn error_precedence_is_switch_then_lock_then_balance() {
        let mut ledger = funded();
        ledger.lock_address(OWNER, C).unwrap();
        ledger.approve(A, B, tokens(10)).unwrap();
        let before = ledger.clone();
        assert_eq!(
            ledger.transfer(C, A, tokens(5)),
            Err(LedgerError::TransfersDisabled)
        );
        assert_eq!(
            ledger.transfer(A, Address::ZERO, tokens(1)),
            Err(LedgerError::TransfersDisabled)
        );
        assert_eq!(
            ledger.transfer_from(B, A, Address::ZERO, tokens(1)),
            Err(LedgerError::TransfersDisabled)
        );
        assert_eq!(ledger, before);
        ledger.allow_transfers(OWNER).unwrap();
        assert_eq!(
            ledger.transfer(C, A, tokens(5)),
            Err(LedgerError::AddressLocked { account: C })
        );
        assert_eq!(
            ledger.transfer(B, A, tokens(5)),
            Err(LedgerError::InsufficientBalance {
                account: B,
                balance: Amount::zero(),
                required: tokens(5),
            })
        );
    }

    #[test]
    fn locking_twice_equals_locking_once() {
        let mut once = funded();
        once.lock_address(OWNER, A).unwrap();
        let mut twice = funded();
        twice.lock_address(OWNER, A).unwrap();
        twice.lock_address(OWNER, A).unwrap();
        assert_eq!(once.snapshot().state_root, twice.snapshot().state_root);
        assert_eq!(once.events(), twice.events());
        assert!(twice.is_locked(&A));
    }

    #[test]
    fn self_transfer_needs_balance_and_changes_nothing() {
        let mut ledger = funded();
        ledger.allow_transfers(OWNER).unwrap();
        ledger.transfer(A, A, tokens(1_000)).unwrap();
        assert_eq!(ledger.balance_of(&A), tokens(1_000));
        assert!(matches!(
            ledger.transfer(A, A, tokens(1_001)),
            Err(LedgerError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn transfer_to_null_address_is_rejected() {
        let mut ledger = funded();
        ledger.allow_transfers(OWNER).unwrap();
        assert_eq!(
            ledger.transfer(A, Address::ZERO, tokens(1)),
            Err(LedgerError::InvalidAddress)
        );
        ledger.approve(A, C, tokens(5)).unwrap();
        assert_eq!(
            ledger.transfer_from(C, A, Address::ZERO, tokens(1)),
            Err(LedgerError::InvalidAddress)
        );
        assert_eq!(ledger.allowance(&A, &C), tokens(5));
        assert_eq!(ledger.balance_of(&A), tokens(1_000));
    }

    #[test]
    fn transfer_from_spends_allowance_under_the_same_gates() {
        let mut ledger = funded();
        ledger.approve(A, C, tokens(300)).unwrap();
        assert_eq!(ledger.allowance(&A, &C), tokens(300));
        assert_eq!(
            ledger.transfer_from(C, A, B, tokens(100)),
            Err(LedgerError::TransfersDisabled)
        );

        ledger.allow_transfers(OWNER).unwrap();
        ledger.transfer_from(C, A, B, tokens(100)).unwrap();
        assert_eq!(ledger.balance_of(&A), tokens(900));
        assert_eq!(ledger.balance_of(&B), tokens(100));
        assert_eq!(ledger.allowance(&A, &C), tokens(200));

        assert!(matches!(
            ledger.transfer_from(C, A, B, tokens(201)),
            Err(LedgerError::InsufficientAllowance { .. })
        ));

        ledger.lock_address(OWNER, A).unwrap();
        assert_eq!(
            ledger.transfer_from(C, A, B, tokens(1)),
            Err(LedgerError::AddressLocked { account: A })
        );

        // a locked spender can still move approved funds
        ledger.unlock_address(OWNER, A).unwrap();
        ledger.lock_address(OWNER, C).unwrap();
        ledger.transfer_from(C, A, B, tokens(200)).unwrap();
        assert_eq!(ledger.allowance(&A, &C), Amount::zero());
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn approve_zero_spender_is_rejected() {
        let mut ledger = funded();
        assert_eq!(
            ledger.approve(A, Address::ZERO, tokens(1)),
            Err(LedgerError::InvalidAddress)
        );
    }

    #[test]
    fn rename_changes_only_metadata() {
        let mut ledger = funded();
        ledger.rename_token(OWNER, "FOO", "FOO Token").unwrap();
        assert_eq!(ledger.symbol(), "FOO");
        assert_eq!(ledger.name(), "FOO Token");
        assert_eq!(ledger.total_supply(), tokens(1_000));
        assert_eq!(
            ledger.rename_token(A, "BAR", "BAR Token"),
            Err(LedgerError::NotOwner { caller: A })
        );
        assert_eq!(ledger.symbol(), "FOO");
    }

    #[test]
    fn ownership_moves_authority_immediately() {
        let mut ledger = funded();
        assert_eq!(
            ledger.transfer_ownership(OWNER, Address::ZERO),
            Err(LedgerError::InvalidOwner)
        );
        assert_eq!(
            ledger.transfer_ownership(A, B),
            Err(LedgerError::NotOwner { caller: A })
        );

        ledger.transfer_ownership(OWNER, A).unwrap();
        assert_eq!(ledger.owner(), A);
        assert_eq!(
            ledger.mint(OWNER, B, tokens(1)),
            Err(LedgerError::NotOwner { caller: OWNER })
        );
        ledger.mint(A, B, tokens(200)).unwrap();
        assert_eq!(ledger.balance_of(&B), tokens(200));
    }
}
