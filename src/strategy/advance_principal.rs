use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::errors::Result;
use crate::money::Money;
use crate::schedule::Installment;
use crate::transaction::LoanTransaction;
use crate::types::Component;

use super::{
    apply_in_order, interest_chargeable_after_grace, undo_in_order, AllocationStrategy,
};

const ORDER: [Component; 4] = [
    Component::PenaltyCharges,
    Component::FeeCharges,
    Component::Interest,
    Component::Principal,
];

const ADVANCE_TAIL: [Component; 3] = [
    Component::Interest,
    Component::PenaltyCharges,
    Component::FeeCharges,
];

const REFUND_ORDER: [Component; 4] = [
    Component::Principal,
    Component::Interest,
    Component::FeeCharges,
    Component::PenaltyCharges,
];

/// standard order for due and overdue installments, but money arriving ahead
/// of the due date pays principal down first. clearing the whole principal
/// early earns interest relief scaled by the unused share of the period
#[derive(Debug, Clone, Copy, Default)]
pub struct AdvancePrincipalStrategy;

impl AllocationStrategy for AdvancePrincipalStrategy {
    fn code(&self) -> &'static str {
        "advance-payments-to-principal"
    }

    fn name(&self) -> &'static str {
        "Advance payments to principal"
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
        let currency = unprocessed.currency();
        let date = transaction.date;

        let mut remaining =
            apply_in_order(&[Component::Principal], installment, transaction, unprocessed)?;

        if installment.principal_outstanding(currency).is_zero() {
            let outstanding_interest = installment.interest_outstanding(currency);
            if outstanding_interest.is_positive() {
                let fraction = period_fraction_remaining(installment, date);
                let chargeable =
                    interest_chargeable_after_grace(outstanding_interest, fraction);
                let relief = outstanding_interest.subtract(&chargeable)?;
                if relief.is_positive() {
                    installment.relieve_interest(date, relief);
                }
            }
        }

        if remaining.is_positive() {
            remaining = apply_in_order(&ADVANCE_TAIL, installment, transaction, remaining)?;
        }
        Ok(remaining)
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

/// share of the repayment period still ahead of the transaction date
fn period_fraction_remaining(installment: &Installment, date: NaiveDate) -> Decimal {
    let total_days = (installment.due_date - installment.from_date).num_days();
    if total_days <= 0 {
        return Decimal::ZERO;
    }
    let early_days = (installment.due_date - date).num_days().max(0);
    Decimal::from(early_days) / Decimal::from(total_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use crate::types::TransactionKind;
    use rust_decimal_macros::dec;

    fn usd() -> Currency {
        Currency::of("USD", 2).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // 30-day period, 800 principal + 200 interest
    fn installment() -> Installment {
        Installment::new(
            1,
            date(2024, 1, 1),
            date(2024, 1, 31),
            dec!(800),
            dec!(200),
        )
    }

    fn advance_payment(day: u32, amount: i64) -> LoanTransaction {
        LoanTransaction::new(
            TransactionKind::Repayment,
            date(2024, 1, day),
            Money::from_major(amount, usd()),
        )
    }

    #[test]
    fn test_full_period_early_cancels_interest() {
        let mut target = installment();
        let mut transaction = advance_payment(1, 800);

        let amount = transaction.amount();
        let leftover = AdvancePrincipalStrategy
            .handle_advance_payment(&mut target, &mut transaction, amount)
            .unwrap();

        assert!(leftover.is_zero());
        assert_eq!(transaction.principal_portion().amount(), dec!(800));
        assert!(target.principal_outstanding(usd()).is_zero());
        assert!(target.interest_outstanding(usd()).is_zero());
        assert!(target.is_obligations_met());
    }

    #[test]
    fn test_half_period_early_halves_interest() {
        let mut target = installment();
        // 15 of 30 days early: interest scales to 100, the leftover 50
        // starts paying it
        let mut transaction = advance_payment(16, 850);

        let amount = transaction.amount();
        let leftover = AdvancePrincipalStrategy
            .handle_advance_payment(&mut target, &mut transaction, amount)
            .unwrap();

        assert!(leftover.is_zero());
        assert_eq!(transaction.principal_portion().amount(), dec!(800));
        assert_eq!(transaction.interest_portion().amount(), dec!(50));
        assert_eq!(target.interest_outstanding(usd()).amount(), dec!(50));
        assert_eq!(target.interest_relieved(usd()).amount(), dec!(100));
    }

    #[test]
    fn test_quarter_or_less_early_earns_no_relief() {
        let mut target = installment();
        // 6 of 30 days early is inside the quarter threshold
        let mut transaction = advance_payment(25, 800);

        let amount = transaction.amount();
        AdvancePrincipalStrategy
            .handle_advance_payment(&mut target, &mut transaction, amount)
            .unwrap();

        assert!(target.principal_outstanding(usd()).is_zero());
        assert_eq!(target.interest_outstanding(usd()).amount(), dec!(200));
    }

    #[test]
    fn test_partial_principal_earns_no_relief() {
        let mut target = installment();
        let mut transaction = advance_payment(1, 400);

        let amount = transaction.amount();
        let leftover = AdvancePrincipalStrategy
            .handle_advance_payment(&mut target, &mut transaction, amount)
            .unwrap();

        assert!(leftover.is_zero());
        assert_eq!(target.principal_outstanding(usd()).amount(), dec!(400));
        assert_eq!(target.interest_outstanding(usd()).amount(), dec!(200));
    }

    #[test]
    fn test_on_time_payment_keeps_standard_order() {
        let mut target = installment();
        target.update_charge_portions(
            Money::zero(usd()),
            Money::zero(usd()),
            Money::from_major(30, usd()),
            Money::zero(usd()),
        );

        let mut transaction = LoanTransaction::new(
            TransactionKind::Repayment,
            date(2024, 1, 31),
            Money::from_major(100, usd()),
        );
        let amount = transaction.amount();
        AdvancePrincipalStrategy
            .handle_on_time_payment(&mut target, &mut transaction, amount)
            .unwrap();

        assert_eq!(transaction.penalty_charges_portion().amount(), dec!(30));
        assert_eq!(transaction.interest_portion().amount(), dec!(70));
        assert!(transaction.principal_portion().is_zero());
    }
}
