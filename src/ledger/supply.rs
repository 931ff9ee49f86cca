//! Supply accounting: mint, burn and the cap.

use tracing::{debug, info};

use super::{Address, Amount, LedgerError, LedgerEvent, LedgerState};

impl LedgerState {
    /// Room left under the cap.
    pub fn mintable(&self) -> Amount {
        self.max_supply.saturating_sub(self.total_supply)
    }

    /// Validate a mint and return the new total supply without touching
    /// state.
    fn plan_mint(&self, to: &Address, amount: Amount) -> Result<Amount, LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        let new_total = self
            .total_supply
            .checked_add(amount)
            .filter(|total| *total <= self.max_supply)
            .ok_or(LedgerError::SupplyCapExceeded {
                requested: amount,
                available: self.mintable(),
            })?;
        Ok(new_total)
    }

    pub fn mint(&mut self, caller: Address, to: Address, amount: Amount) -> Result<(), LedgerError> {
        self.ensure_owner(&caller)?;
        let new_total = self.plan_mint(&to, amount)?;

        self.total_supply = new_total;
        self.account_mut(to).balance += amount;
        debug!(%to, %amount, total_supply = %self.total_supply, "minted");
        self.commit([LedgerEvent::Mint { to, amount }]);
        Ok(())
    }

    /// Mint and lock the recipient as one step. Nothing is locked if the
    /// mint is rejected.
    pub fn mint_then_lock(
        &mut self,
        caller: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(&caller)?;
        let new_total = self.plan_mint(&to, amount)?;

        self.total_supply = new_total;
        let account = self.account_mut(to);
        account.balance += amount;
        let newly_locked = !account.locked;
        account.locked = true;
        debug!(%to, %amount, "minted and locked");

        let mut events = vec![LedgerEvent::Mint { to, amount }];
        if newly_locked {
            events.push(LedgerEvent::Locked { account: to });
        }
        self.commit(events);
        Ok(())
    }

    /// Owner burn. Ignores the lock flag and the transfer switch.
    pub fn burn(&mut self, caller: Address, from: Address, amount: Amount) -> Result<(), LedgerError> {
        self.ensure_owner(&caller)?;
        let balance = self.balance_of(&from);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from,
                balance,
                required: amount,
            });
        }

        self.account_mut(from).balance = balance - amount;
        self.total_supply -= amount;
        debug!(%from, %amount, total_supply = %self.total_supply, "burned");
        self.commit([LedgerEvent::Burn { from, amount }]);
        Ok(())
    }

    /// Raise the cap by `delta`. There is no way to lower it.
    pub fn increase_supply(&mut self, caller: Address, delta: Amount) -> Result<(), LedgerError> {
        self.ensure_owner(&caller)?;
        let max_supply = self
            .max_supply
            .checked_add(delta)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        self.max_supply = max_supply;
        info!(%delta, %max_supply, "max supply increased");
        self.commit([LedgerEvent::SupplyIncreased { delta, max_supply }]);
        Ok(())
    }
}
