use crate::errors::Result;
use crate::money::Money;
use crate::schedule::Installment;
use crate::transaction::LoanTransaction;
use crate::types::Component;

use super::{apply_in_order, undo_in_order, AllocationStrategy};

const ORDER: [Component; 4] = [
    Component::Principal,
    Component::Interest,
    Component::PenaltyCharges,
    Component::FeeCharges,
];

const REFUND_ORDER: [Component; 4] = [
    Component::FeeCharges,
    Component::PenaltyCharges,
    Component::Interest,
    Component::Principal,
];

/// principal, interest, penalties, fees. amortizes the balance down as fast
/// as the payments arrive
#[derive(Debug, Clone, Copy, Default)]
pub struct PrincipalFirstStrategy;

impl AllocationStrategy for PrincipalFirstStrategy {
    fn code(&self) -> &'static str {
        "principal-interest-penalties-fees-order"
    }

    fn name(&self) -> &'static str {
        "Principal, interest, penalties, fees order"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use crate::types::TransactionKind;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn usd() -> Currency {
        Currency::of("USD", 2).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_principal_absorbs_payment_before_interest() {
        let mut installment = Installment::new(
            1,
            date(2024, 1, 1),
            date(2024, 2, 1),
            dec!(800),
            dec!(200),
        );

        let mut transaction = LoanTransaction::new(
            TransactionKind::Repayment,
            date(2024, 2, 1),
            Money::from_major(850, usd()),
        );
        let amount = transaction.amount();
        let leftover = PrincipalFirstStrategy
            .handle_on_time_payment(&mut installment, &mut transaction, amount)
            .unwrap();

        assert!(leftover.is_zero());
        assert_eq!(transaction.principal_portion().amount(), dec!(800));
        assert_eq!(transaction.interest_portion().amount(), dec!(50));
        assert_eq!(installment.interest_outstanding(usd()).amount(), dec!(150));
        assert!(!installment.is_obligations_met());
    }
}
