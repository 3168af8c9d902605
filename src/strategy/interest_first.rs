use crate::errors::Result;
use crate::money::Money;
use crate::schedule::Installment;
use crate::transaction::LoanTransaction;
use crate::types::Component;

use super::{apply_in_order, undo_in_order, AllocationStrategy};

const ORDER: [Component; 4] = [
    Component::Interest,
    Component::Principal,
    Component::PenaltyCharges,
    Component::FeeCharges,
];

const REFUND_ORDER: [Component; 4] = [
    Component::FeeCharges,
    Component::PenaltyCharges,
    Component::Principal,
    Component::Interest,
];

/// interest, principal, penalties, fees. products that recognize interest
/// income before anything else
#[derive(Debug, Clone, Copy, Default)]
pub struct InterestFirstStrategy;

impl AllocationStrategy for InterestFirstStrategy {
    fn code(&self) -> &'static str {
        "interest-principal-penalties-fees-order"
    }

    fn name(&self) -> &'static str {
        "Interest, principal, penalties, fees order"
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
