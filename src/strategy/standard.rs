use crate::errors::Result;
use crate::money::Money;
use crate::schedule::Installment;
use crate::transaction::LoanTransaction;
use crate::types::Component;

use super::{apply_in_order, undo_in_order, AllocationStrategy};

const ORDER: [Component; 4] = [
    Component::PenaltyCharges,
    Component::FeeCharges,
    Component::Interest,
    Component::Principal,
];

const REFUND_ORDER: [Component; 4] = [
    Component::Principal,
    Component::Interest,
    Component::FeeCharges,
    Component::PenaltyCharges,
];

/// default allocation: penalties, fees, interest, principal, regardless of
/// whether the payment is early, on time or late
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardStrategy;

impl AllocationStrategy for StandardStrategy {
    fn code(&self) -> &'static str {
        "penalties-fees-interest-principal-order"
    }

    fn name(&self) -> &'static str {
        "Penalties, fees, interest, principal order"
    }

    fn handle_on_time_payment(
        &self,
        installment: &mut Installment,
        transaction: &mut LoanTransaction,
        unprocessed: Money,
    ) -> Result<Money> {
        apply_in_order(&ORDER, installment, transaction, unprocessed)
    }

    fn handle_advance_payment(
        &self,
        installment: &mut Installment,
        transaction: &mut LoanTransaction,
        unprocessed: Money,
    ) -> Result<Money> {
        apply_in_order(&ORDER, installment, transaction, unprocessed)
    }

    fn handle_late_payment(
        &self,
        installment: &mut Installment,
        transaction: &mut LoanTransaction,
        unprocessed: Money,
    ) -> Result<Money> {
        apply_in_order(&ORDER, installment, transaction, unprocessed)
    }

    fn handle_refund(
        &self,
        installment: &mut Installment,
        transaction: &mut LoanTransaction,
        unprocessed: Money,
    ) -> Result<Money> {
        undo_in_order(&REFUND_ORDER, installment, transaction, unprocessed)
    }
}
