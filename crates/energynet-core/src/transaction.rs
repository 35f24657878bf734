//! Two-phase energy withdrawal.
//!
//! An [`EnergyTransaction`] withdraws energy up front and holds it until the
//! caller knows whether the dependent work (crafting an item, firing a
//! machine) succeeded. `commit` keeps the withdrawal, `rollback` returns it.
//! Each transaction is single-use; any call after completion is an
//! invalid-state error.
//!
//! A transaction dropped while still holding a reservation is rolled back,
//! so an early return or panic in the caller cannot destroy energy.

use crate::network::SharedNetwork;

/// Errors from misusing a transaction.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction already holds a reservation")]
    AlreadyReserved,
    #[error("transaction already committed")]
    AlreadyCommitted,
    #[error("transaction already rolled back")]
    AlreadyRolledBack,
}

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Reserved,
    Committed,
    RolledBack,
}

/// A pending withdrawal from one network.
#[derive(Debug)]
pub struct EnergyTransaction {
    network: SharedNetwork,
    reserved: u64,
    state: TransactionState,
}

impl EnergyTransaction {
    pub fn new(network: SharedNetwork) -> Self {
        Self {
            network,
            reserved: 0,
            state: TransactionState::Open,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Energy currently withdrawn by this transaction.
    pub fn reserved(&self) -> u64 {
        self.reserved
    }

    /// Withdraw up to `amount`. Returns `Ok(true)` only if the full amount
    /// was obtained; a partial withdrawal is still held and must be
    /// committed or rolled back.
    pub fn try_reserve(&mut self, amount: u64) -> Result<bool, TransactionError> {
        self.ensure_open()?;
        let removed = self.network.lock().remove_energy(amount);
        self.reserved = removed;
        self.state = TransactionState::Reserved;
        Ok(removed == amount)
    }

    /// Keep the withdrawal.
    pub fn commit(&mut self) -> Result<(), TransactionError> {
        self.ensure_not_finished()?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Return the withdrawn energy to the network.
    pub fn rollback(&mut self) -> Result<(), TransactionError> {
        self.ensure_not_finished()?;
        self.refund();
        self.state = TransactionState::RolledBack;
        Ok(())
    }

    fn refund(&mut self) {
        if self.reserved == 0 {
            return;
        }
        let returned = self.network.lock().add_energy(self.reserved);
        if returned < self.reserved {
            // Someone filled the network while we held the reservation.
            tracing::debug!(
                reserved = self.reserved,
                returned,
                "rollback could not return all reserved energy"
            );
        }
        self.reserved = 0;
    }

    fn ensure_open(&self) -> Result<(), TransactionError> {
        match self.state {
            TransactionState::Open => Ok(()),
            TransactionState::Reserved => Err(TransactionError::AlreadyReserved),
            TransactionState::Committed => Err(TransactionError::AlreadyCommitted),
            TransactionState::RolledBack => Err(TransactionError::AlreadyRolledBack),
        }
    }

    fn ensure_not_finished(&self) -> Result<(), TransactionError> {
        match self.state {
            TransactionState::Open | TransactionState::Reserved => Ok(()),
            TransactionState::Committed => Err(TransactionError::AlreadyCommitted),
            TransactionState::RolledBack => Err(TransactionError::AlreadyRolledBack),
        }
    }
}

impl Drop for EnergyTransaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Reserved && self.reserved > 0 {
            tracing::warn!(
                reserved = self.reserved,
                "energy transaction dropped without commit, rolling back"
            );
            self.refund();
        }
    }
}
