//! Payment ledger.
//!
//! The registrar never pushes money out in the middle of an operation.
//! Proceeds and refunds are credited here, strictly after every state
//! change of the call, and account holders pull them with `withdraw`. A
//! reentrant caller therefore can't ride a refund into a second
//! registration before the first one is final.
//!
//! Crediting happens in two steps so it can sit after the last fallible
//! step of a call: [`PaymentLedger::prepare`] does all the overflow
//! checking up front, [`PaymentLedger::apply`] cannot fail.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use nomina_protocol::amount::NativeAmount;
use nomina_protocol::identity::Address;

use crate::error::RegistrarError;
use crate::events::CreditReason;

/// Credits whose resulting balances are already known to fit.
#[derive(Debug, Clone)]
pub struct PreparedCredits {
    balances: Vec<(Address, NativeAmount)>,
    credits: Vec<(Address, NativeAmount, CreditReason)>,
    collected: NativeAmount,
}

impl PreparedCredits {
    /// The individual non-zero credits, for events.
    pub fn credits(&self) -> &[(Address, NativeAmount, CreditReason)] {
        &self.credits
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentLedger {
    balances: HashMap<Address, NativeAmount>,
    /// Lifetime proceeds credited to payment recipients.
    total_collected: NativeAmount,
}

impl PaymentLedger {
    pub fn balance_of(&self, account: &Address) -> NativeAmount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    pub fn total_collected(&self) -> NativeAmount {
        self.total_collected
    }

    /// Outstanding, not yet withdrawn, across all accounts.
    pub fn total_outstanding(&self) -> NativeAmount {
        self.balances
            .values()
            .fold(NativeAmount::ZERO, |acc, b| acc.checked_add(*b).unwrap_or(acc))
    }

    /// Checks that every credit fits and computes the final balances.
    /// Zero credits are dropped.
    pub fn prepare(
        &self,
        credits: &[(Address, NativeAmount, CreditReason)],
    ) -> Result<PreparedCredits, RegistrarError> {
        let mut balances: Vec<(Address, NativeAmount)> = Vec::new();
        let mut kept = Vec::new();
        let mut collected = self.total_collected;

        for &(account, amount, reason) in credits {
            if amount.is_zero() {
                continue;
            }
            let idx = match balances.iter().position(|(a, _)| *a == account) {
                Some(idx) => idx,
                None => {
                    balances.push((account, self.balance_of(&account)));
                    balances.len() - 1
                }
            };
            let slot = &mut balances[idx].1;
            *slot = slot.checked_add(amount).ok_or(RegistrarError::Overflow)?;
            if reason == CreditReason::Proceeds {
                collected = collected
                    .checked_add(amount)
                    .ok_or(RegistrarError::Overflow)?;
            }
            kept.push((account, amount, reason));
        }

        Ok(PreparedCredits {
            balances,
            credits: kept,
            collected,
        })
    }

    pub fn apply(&mut self, prepared: &PreparedCredits) {
        for (account, balance) in &prepared.balances {
            self.balances.insert(*account, *balance);
        }
        self.total_collected = prepared.collected;
    }

    /// Zeroes the account's balance and returns what it held.
    pub fn withdraw(&mut self, account: &Address) -> Result<NativeAmount, RegistrarError> {
        match self.balances.remove(account) {
            Some(amount) if !amount.is_zero() => Ok(amount),
            _ => Err(RegistrarError::NothingToWithdraw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nom(units: u128) -> NativeAmount {
        NativeAmount::from_units(units).unwrap()
    }

    #[test]
    fn test_prepare_then_apply() {
        let mut ledger = PaymentLedger::default();
        let treasury = Address::from_label("treasury");
        let payer = Address::from_label("payer");
        let prepared = ledger
            .prepare(&[
                (treasury, nom(5), CreditReason::Proceeds),
                (payer, nom(1), CreditReason::Refund),
                (payer, NativeAmount::ZERO, CreditReason::Refund),
            ])
            .unwrap();
        assert_eq!(prepared.credits().len(), 2);
        // Nothing moves until apply.
        assert_eq!(ledger.balance_of(&treasury), NativeAmount::ZERO);

        ledger.apply(&prepared);
        assert_eq!(ledger.balance_of(&treasury), nom(5));
        assert_eq!(ledger.balance_of(&payer), nom(1));
        assert_eq!(ledger.total_collected(), nom(5));
        assert_eq!(ledger.total_outstanding(), nom(6));
    }

    #[test]
    fn test_same_account_twice_accumulates() {
        let mut ledger = PaymentLedger::default();
        let me = Address::from_label("me");
        let prepared = ledger
            .prepare(&[
                (me, nom(2), CreditReason::Proceeds),
                (me, nom(3), CreditReason::Refund),
            ])
            .unwrap();
        ledger.apply(&prepared);
        assert_eq!(ledger.balance_of(&me), nom(5));
    }

    #[test]
    fn test_overflow_detected_before_apply() {
        let mut ledger = PaymentLedger::default();
        let me = Address::from_label("me");
        let huge = NativeAmount::from_raw(u128::MAX);
        ledger.apply(&ledger.prepare(&[(me, huge, CreditReason::Refund)]).unwrap());
        assert_eq!(
            ledger
                .prepare(&[(me, NativeAmount::from_raw(1), CreditReason::Refund)])
                .unwrap_err(),
            RegistrarError::Overflow
        );
        assert_eq!(ledger.balance_of(&me), huge);
    }

    #[test]
    fn test_withdraw_drains() {
        let mut ledger = PaymentLedger::default();
        let me = Address::from_label("me");
        assert_eq!(ledger.withdraw(&me), Err(RegistrarError::NothingToWithdraw));
        ledger.apply(&ledger.prepare(&[(me, nom(4), CreditReason::Proceeds)]).unwrap());
        assert_eq!(ledger.withdraw(&me).unwrap(), nom(4));
        assert_eq!(ledger.balance_of(&me), NativeAmount::ZERO);
        assert_eq!(ledger.total_collected(), nom(4));
    }
}
