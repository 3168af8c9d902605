use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{ProcessorError, Result};
use crate::money::{Currency, Money};
use crate::types::Component;

/// one repayment period of a loan schedule.
///
/// amounts are stored as decimals scaled by the operations that touch them;
/// the loan currency is passed into every accessor and mutation so the
/// installment itself carries no ambient configuration. every settling
/// operation caps at the component's outstanding amount and returns the
/// portion actually consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub sequence: u32,
    pub from_date: NaiveDate,
    pub due_date: NaiveDate,

    // due amounts
    principal_due: Decimal,
    interest_due: Decimal,
    fee_charges_due: Decimal,
    penalty_charges_due: Decimal,

    // settled amounts per component
    principal_paid: Decimal,
    principal_waived: Decimal,
    principal_written_off: Decimal,
    interest_paid: Decimal,
    interest_waived: Decimal,
    interest_written_off: Decimal,
    fee_charges_paid: Decimal,
    fee_charges_waived: Decimal,
    fee_charges_written_off: Decimal,
    penalty_charges_paid: Decimal,
    penalty_charges_waived: Decimal,
    penalty_charges_written_off: Decimal,

    // principal injected by credit-class transactions; removed on reset
    credited_principal: Decimal,

    // interest removed by advance-settlement relief; restored on reset
    interest_relieved: Decimal,

    // payment timing split
    total_paid_in_advance: Decimal,
    total_paid_late: Decimal,

    additional: bool,
    obligations_met: bool,
    obligations_met_on: Option<NaiveDate>,
}

impl Installment {
    /// fee and penalty dues are projected from the charge ledger afterwards,
    /// so the constructor only takes principal and interest
    pub fn new(
        sequence: u32,
        from_date: NaiveDate,
        due_date: NaiveDate,
        principal_due: Decimal,
        interest_due: Decimal,
    ) -> Self {
        Installment {
            sequence,
            from_date,
            due_date,
            principal_due,
            interest_due,
            fee_charges_due: Decimal::ZERO,
            penalty_charges_due: Decimal::ZERO,
            principal_paid: Decimal::ZERO,
            principal_waived: Decimal::ZERO,
            principal_written_off: Decimal::ZERO,
            interest_paid: Decimal::ZERO,
            interest_waived: Decimal::ZERO,
            interest_written_off: Decimal::ZERO,
            fee_charges_paid: Decimal::ZERO,
            fee_charges_waived: Decimal::ZERO,
            fee_charges_written_off: Decimal::ZERO,
            penalty_charges_paid: Decimal::ZERO,
            penalty_charges_waived: Decimal::ZERO,
            penalty_charges_written_off: Decimal::ZERO,
            credited_principal: Decimal::ZERO,
            interest_relieved: Decimal::ZERO,
            total_paid_in_advance: Decimal::ZERO,
            total_paid_late: Decimal::ZERO,
            additional: false,
            obligations_met: false,
            obligations_met_on: None,
        }
    }

    pub fn mark_as_additional(&mut self) {
        self.additional = true;
    }

    pub fn is_additional(&self) -> bool {
        self.additional
    }

    /// whether a value date falls into this repayment period. the period is
    /// (from_date, due_date], with from_date included for the first period
    pub fn period_contains(&self, date: NaiveDate) -> bool {
        let after_start = if self.sequence == 1 {
            date >= self.from_date
        } else {
            date > self.from_date
        };
        after_start && date <= self.due_date
    }

    // component accessors

    pub fn due(&self, component: Component, currency: Currency) -> Money {
        Money::new(
            match component {
                Component::Principal => self.principal_due,
                Component::Interest => self.interest_due,
                Component::FeeCharges => self.fee_charges_due,
                Component::PenaltyCharges => self.penalty_charges_due,
            },
            currency,
        )
    }

    pub fn paid(&self, component: Component, currency: Currency) -> Money {
        Money::new(
            match component {
                Component::Principal => self.principal_paid,
                Component::Interest => self.interest_paid,
                Component::FeeCharges => self.fee_charges_paid,
                Component::PenaltyCharges => self.penalty_charges_paid,
            },
            currency,
        )
    }

    pub fn waived(&self, component: Component, currency: Currency) -> Money {
        Money::new(
            match component {
                Component::Principal => self.principal_waived,
                Component::Interest => self.interest_waived,
                Component::FeeCharges => self.fee_charges_waived,
                Component::PenaltyCharges => self.penalty_charges_waived,
            },
            currency,
        )
    }

    pub fn written_off(&self, component: Component, currency: Currency) -> Money {
        Money::new(
            match component {
                Component::Principal => self.principal_written_off,
                Component::Interest => self.interest_written_off,
                Component::FeeCharges => self.fee_charges_written_off,
                Component::PenaltyCharges => self.penalty_charges_written_off,
            },
            currency,
        )
    }

    pub fn outstanding(&self, component: Component, currency: Currency) -> Money {
        let (due, paid, waived, written_off) = self.component_fields(component);
        Money::new(due - paid - waived - written_off, currency)
    }

    fn component_fields(&self, component: Component) -> (Decimal, Decimal, Decimal, Decimal) {
        match component {
            Component::Principal => (
                self.principal_due,
                self.principal_paid,
                self.principal_waived,
                self.principal_written_off,
            ),
            Component::Interest => (
                self.interest_due,
                self.interest_paid,
                self.interest_waived,
                self.interest_written_off,
            ),
            Component::FeeCharges => (
                self.fee_charges_due,
                self.fee_charges_paid,
                self.fee_charges_waived,
                self.fee_charges_written_off,
            ),
            Component::PenaltyCharges => (
                self.penalty_charges_due,
                self.penalty_charges_paid,
                self.penalty_charges_waived,
                self.penalty_charges_written_off,
            ),
        }
    }

    pub fn principal_outstanding(&self, currency: Currency) -> Money {
        self.outstanding(Component::Principal, currency)
    }

    pub fn interest_outstanding(&self, currency: Currency) -> Money {
        self.outstanding(Component::Interest, currency)
    }

    pub fn fee_charges_outstanding(&self, currency: Currency) -> Money {
        self.outstanding(Component::FeeCharges, currency)
    }

    pub fn penalty_charges_outstanding(&self, currency: Currency) -> Money {
        self.outstanding(Component::PenaltyCharges, currency)
    }

    pub fn total_due(&self, currency: Currency) -> Money {
        Money::new(
            self.principal_due + self.interest_due + self.fee_charges_due
                + self.penalty_charges_due,
            currency,
        )
    }

    pub fn total_paid(&self, currency: Currency) -> Money {
        Money::new(
            self.principal_paid + self.interest_paid + self.fee_charges_paid
                + self.penalty_charges_paid,
            currency,
        )
    }

    pub fn total_outstanding(&self, currency: Currency) -> Money {
        let mut total = Decimal::ZERO;
        for component in Component::ALL {
            let (due, paid, waived, written_off) = self.component_fields(component);
            total += due - paid - waived - written_off;
        }
        Money::new(total, currency)
    }

    pub fn credited_principal(&self, currency: Currency) -> Money {
        Money::new(self.credited_principal, currency)
    }

    pub fn interest_relieved(&self, currency: Currency) -> Money {
        Money::new(self.interest_relieved, currency)
    }

    pub fn total_paid_in_advance(&self, currency: Currency) -> Money {
        Money::new(self.total_paid_in_advance, currency)
    }

    pub fn total_paid_late(&self, currency: Currency) -> Money {
        Money::new(self.total_paid_late, currency)
    }

    pub fn is_obligations_met(&self) -> bool {
        self.obligations_met
    }

    pub fn obligations_met_on(&self) -> Option<NaiveDate> {
        self.obligations_met_on
    }

    pub fn is_not_fully_paid_off(&self) -> bool {
        !self.obligations_met
    }

    // payment operations, each capped at the component's outstanding amount

    pub fn pay_principal(&mut self, date: NaiveDate, amount: Money) -> Money {
        let applied = cap(amount, self.principal_outstanding(amount.currency()));
        self.principal_paid += applied.amount();
        self.track_payment_timing(date, applied.amount());
        self.update_obligations_met(date, amount.currency());
        applied
    }

    pub fn pay_interest(&mut self, date: NaiveDate, amount: Money) -> Money {
        let applied = cap(amount, self.interest_outstanding(amount.currency()));
        self.interest_paid += applied.amount();
        self.track_payment_timing(date, applied.amount());
        self.update_obligations_met(date, amount.currency());
        applied
    }

    pub fn pay_fee_charges(&mut self, date: NaiveDate, amount: Money) -> Money {
        let applied = cap(amount, self.fee_charges_outstanding(amount.currency()));
        self.fee_charges_paid += applied.amount();
        self.track_payment_timing(date, applied.amount());
        self.update_obligations_met(date, amount.currency());
        applied
    }

    pub fn pay_penalty_charges(&mut self, date: NaiveDate, amount: Money) -> Money {
        let applied = cap(amount, self.penalty_charges_outstanding(amount.currency()));
        self.penalty_charges_paid += applied.amount();
        self.track_payment_timing(date, applied.amount());
        self.update_obligations_met(date, amount.currency());
        applied
    }

    pub fn pay_component(&mut self, component: Component, date: NaiveDate, amount: Money) -> Money {
        match component {
            Component::Principal => self.pay_principal(date, amount),
            Component::Interest => self.pay_interest(date, amount),
            Component::FeeCharges => self.pay_fee_charges(date, amount),
            Component::PenaltyCharges => self.pay_penalty_charges(date, amount),
        }
    }

    // waivers, capped the same way

    pub fn waive_principal(&mut self, date: NaiveDate, amount: Money) -> Money {
        let waived = cap(amount, self.principal_outstanding(amount.currency()));
        self.principal_waived += waived.amount();
        self.update_obligations_met(date, amount.currency());
        waived
    }

    pub fn waive_interest(&mut self, date: NaiveDate, amount: Money) -> Money {
        let waived = cap(amount, self.interest_outstanding(amount.currency()));
        self.interest_waived += waived.amount();
        self.update_obligations_met(date, amount.currency());
        waived
    }

    pub fn waive_fee_charges(&mut self, date: NaiveDate, amount: Money) -> Money {
        let waived = cap(amount, self.fee_charges_outstanding(amount.currency()));
        self.fee_charges_waived += waived.amount();
        self.update_obligations_met(date, amount.currency());
        waived
    }

    pub fn waive_penalty_charges(&mut self, date: NaiveDate, amount: Money) -> Money {
        let waived = cap(amount, self.penalty_charges_outstanding(amount.currency()));
        self.penalty_charges_waived += waived.amount();
        self.update_obligations_met(date, amount.currency());
        waived
    }

    // write-offs take the full remaining component

    pub fn write_off_outstanding_principal(&mut self, date: NaiveDate, currency: Currency) -> Money {
        let written_off = self.principal_outstanding(currency);
        self.principal_written_off += written_off.amount();
        self.update_obligations_met(date, currency);
        written_off
    }

    pub fn write_off_outstanding_interest(&mut self, date: NaiveDate, currency: Currency) -> Money {
        let written_off = self.interest_outstanding(currency);
        self.interest_written_off += written_off.amount();
        self.update_obligations_met(date, currency);
        written_off
    }

    pub fn write_off_outstanding_fee_charges(
        &mut self,
        date: NaiveDate,
        currency: Currency,
    ) -> Money {
        let written_off = self.fee_charges_outstanding(currency);
        self.fee_charges_written_off += written_off.amount();
        self.update_obligations_met(date, currency);
        written_off
    }

    pub fn write_off_outstanding_penalty_charges(
        &mut self,
        date: NaiveDate,
        currency: Currency,
    ) -> Money {
        let written_off = self.penalty_charges_outstanding(currency);
        self.penalty_charges_written_off += written_off.amount();
        self.update_obligations_met(date, currency);
        written_off
    }

    // refund support: deduct previously paid amounts, capped at what was paid

    pub fn unpay_principal(&mut self, date: NaiveDate, amount: Money) -> Money {
        let deducted = cap(amount, self.paid(Component::Principal, amount.currency()));
        self.principal_paid -= deducted.amount();
        self.reduce_payment_timing(date, deducted.amount());
        self.update_obligations_met(date, amount.currency());
        deducted
    }

    pub fn unpay_interest(&mut self, date: NaiveDate, amount: Money) -> Money {
        let deducted = cap(amount, self.paid(Component::Interest, amount.currency()));
        self.interest_paid -= deducted.amount();
        self.reduce_payment_timing(date, deducted.amount());
        self.update_obligations_met(date, amount.currency());
        deducted
    }

    pub fn unpay_fee_charges(&mut self, date: NaiveDate, amount: Money) -> Money {
        let deducted = cap(amount, self.paid(Component::FeeCharges, amount.currency()));
        self.fee_charges_paid -= deducted.amount();
        self.reduce_payment_timing(date, deducted.amount());
        self.update_obligations_met(date, amount.currency());
        deducted
    }

    pub fn unpay_penalty_charges(&mut self, date: NaiveDate, amount: Money) -> Money {
        let deducted = cap(amount, self.paid(Component::PenaltyCharges, amount.currency()));
        self.penalty_charges_paid -= deducted.amount();
        self.reduce_payment_timing(date, deducted.amount());
        self.update_obligations_met(date, amount.currency());
        deducted
    }

    pub fn unpay_component(
        &mut self,
        component: Component,
        date: NaiveDate,
        amount: Money,
    ) -> Money {
        match component {
            Component::Principal => self.unpay_principal(date, amount),
            Component::Interest => self.unpay_interest(date, amount),
            Component::FeeCharges => self.unpay_fee_charges(date, amount),
            Component::PenaltyCharges => self.unpay_penalty_charges(date, amount),
        }
    }

    /// credit-class injection: raises principal due and remembers the
    /// injected amount so the next reset can take it back out
    pub fn add_to_principal(&mut self, date: NaiveDate, amount: Money) {
        self.principal_due += amount.amount();
        self.credited_principal += amount.amount();
        self.update_obligations_met(date, amount.currency());
    }

    /// advance-settlement relief: lowers the interest due and remembers the
    /// relieved amount so the next reset can put it back
    pub fn relieve_interest(&mut self, date: NaiveDate, amount: Money) {
        self.interest_due -= amount.amount();
        self.interest_relieved += amount.amount();
        self.update_obligations_met(date, amount.currency());
    }

    /// signed closing correction applied to the last installment so the
    /// schedule sums exactly to the loan totals
    pub fn adjust_principal_due(&mut self, delta: Money) {
        self.principal_due += delta.amount();
    }

    pub fn adjust_interest_due(&mut self, delta: Money) {
        self.interest_due += delta.amount();
    }

    /// projection of the charge ledger into this period, refreshed on every
    /// replay pass
    pub fn update_charge_portions(
        &mut self,
        fee_due: Money,
        fee_waived: Money,
        penalty_due: Money,
        penalty_waived: Money,
    ) {
        self.fee_charges_due = fee_due.amount();
        self.fee_charges_waived = fee_waived.amount();
        self.penalty_charges_due = penalty_due.amount();
        self.penalty_charges_waived = penalty_waived.amount();
    }

    /// clears everything a replay derives: paid, waived, written-off, timing
    /// splits, the fully-paid flag, injected credit principal and granted
    /// interest relief
    pub fn reset_derived_components(&mut self) {
        self.principal_paid = Decimal::ZERO;
        self.principal_waived = Decimal::ZERO;
        self.principal_written_off = Decimal::ZERO;
        self.interest_paid = Decimal::ZERO;
        self.interest_waived = Decimal::ZERO;
        self.interest_written_off = Decimal::ZERO;
        self.fee_charges_paid = Decimal::ZERO;
        self.fee_charges_waived = Decimal::ZERO;
        self.fee_charges_written_off = Decimal::ZERO;
        self.penalty_charges_paid = Decimal::ZERO;
        self.penalty_charges_waived = Decimal::ZERO;
        self.penalty_charges_written_off = Decimal::ZERO;
        self.total_paid_in_advance = Decimal::ZERO;
        self.total_paid_late = Decimal::ZERO;
        self.obligations_met = false;
        self.obligations_met_on = None;
        self.principal_due -= self.credited_principal;
        self.credited_principal = Decimal::ZERO;
        self.interest_due += self.interest_relieved;
        self.interest_relieved = Decimal::ZERO;
    }

    /// paid + waived + written-off must never exceed due for any component;
    /// a violation means a defect in the capping logic, not bad input
    pub fn verify_component_invariants(&self) -> Result<()> {
        for component in Component::ALL {
            let (due, paid, waived, written_off) = self.component_fields(component);
            if paid + waived + written_off > due {
                return Err(ProcessorError::AllocationInvariantViolation {
                    installment: self.sequence,
                    component,
                });
            }
        }
        Ok(())
    }

    fn track_payment_timing(&mut self, date: NaiveDate, applied: Decimal) {
        if date < self.due_date {
            self.total_paid_in_advance += applied;
        } else if date > self.due_date {
            self.total_paid_late += applied;
        }
    }

    fn reduce_payment_timing(&mut self, date: NaiveDate, deducted: Decimal) {
        if date < self.due_date {
            self.total_paid_in_advance -= deducted;
        } else if date > self.due_date {
            self.total_paid_late -= deducted;
        }
    }

    /// recomputes the settled flag; callers that change dues directly must
    /// invoke this themselves
    pub fn update_obligations_met(&mut self, date: NaiveDate, currency: Currency) {
        let met = self.total_outstanding(currency).is_zero();
        if met && !self.obligations_met {
            self.obligations_met_on = Some(date);
        }
        if !met {
            self.obligations_met_on = None;
        }
        self.obligations_met = met;
    }
}

fn cap(amount: Money, outstanding: Money) -> Money {
    Money::new(
        amount.amount().min(outstanding.amount()).max(Decimal::ZERO),
        amount.currency(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd() -> Currency {
        Currency::of("USD", 2).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn installment() -> Installment {
        Installment::new(
            1,
            date(2024, 1, 1),
            date(2024, 2, 1),
            dec!(800),
            dec!(200),
        )
    }

    #[test]
    fn test_payment_caps_at_outstanding() {
        let mut inst = installment();

        let applied = inst.pay_principal(date(2024, 2, 1), Money::from_major(1_000, usd()));
        assert_eq!(applied.amount(), dec!(800));
        assert!(inst.principal_outstanding(usd()).is_zero());

        // a second payment has nothing left to consume
        let applied = inst.pay_principal(date(2024, 2, 1), Money::from_major(50, usd()));
        assert!(applied.is_zero());
    }

    #[test]
    fn test_full_payment_meets_obligations() {
        let mut inst = installment();
        assert!(inst.is_not_fully_paid_off());

        inst.pay_interest(date(2024, 2, 1), Money::from_major(200, usd()));
        assert!(inst.is_not_fully_paid_off());

        inst.pay_principal(date(2024, 2, 1), Money::from_major(800, usd()));
        assert!(inst.is_obligations_met());
        assert_eq!(inst.obligations_met_on(), Some(date(2024, 2, 1)));
    }

    #[test]
    fn test_payment_timing_split() {
        let mut inst = installment();

        inst.pay_interest(date(2024, 1, 15), Money::from_major(200, usd()));
        assert_eq!(inst.total_paid_in_advance(usd()).amount(), dec!(200));

        inst.pay_principal(date(2024, 2, 10), Money::from_major(300, usd()));
        assert_eq!(inst.total_paid_late(usd()).amount(), dec!(300));

        // on the due date counts as neither advance nor late
        inst.pay_principal(date(2024, 2, 1), Money::from_major(100, usd()));
        assert_eq!(inst.total_paid_in_advance(usd()).amount(), dec!(200));
        assert_eq!(inst.total_paid_late(usd()).amount(), dec!(300));
    }

    #[test]
    fn test_waiver_reduces_outstanding() {
        let mut inst = installment();

        let waived = inst.waive_interest(date(2024, 1, 20), Money::from_major(50, usd()));
        assert_eq!(waived.amount(), dec!(50));
        assert_eq!(inst.interest_outstanding(usd()).amount(), dec!(150));

        // paying the rest settles interest without touching the waiver
        let applied = inst.pay_interest(date(2024, 2, 1), Money::from_major(200, usd()));
        assert_eq!(applied.amount(), dec!(150));
        assert_eq!(inst.waived(Component::Interest, usd()).amount(), dec!(50));
    }

    #[test]
    fn test_write_off_takes_full_remainder() {
        let mut inst = installment();
        inst.pay_principal(date(2024, 2, 1), Money::from_major(300, usd()));

        let written_off = inst.write_off_outstanding_principal(date(2024, 3, 1), usd());
        assert_eq!(written_off.amount(), dec!(500));
        assert!(inst.principal_outstanding(usd()).is_zero());

        let interest = inst.write_off_outstanding_interest(date(2024, 3, 1), usd());
        assert_eq!(interest.amount(), dec!(200));
        assert!(inst.is_obligations_met());
    }

    #[test]
    fn test_unpay_reverses_payment_and_reopens_period() {
        let mut inst = installment();
        inst.pay_interest(date(2024, 2, 1), Money::from_major(200, usd()));
        inst.pay_principal(date(2024, 2, 1), Money::from_major(800, usd()));
        assert!(inst.is_obligations_met());

        let deducted = inst.unpay_principal(date(2024, 2, 5), Money::from_major(300, usd()));
        assert_eq!(deducted.amount(), dec!(300));
        assert!(inst.is_not_fully_paid_off());
        assert_eq!(inst.principal_outstanding(usd()).amount(), dec!(300));

        // capped at what was actually paid
        let deducted = inst.unpay_interest(date(2024, 2, 5), Money::from_major(500, usd()));
        assert_eq!(deducted.amount(), dec!(200));
    }

    #[test]
    fn test_reset_clears_derived_state_and_restores_dues() {
        let mut inst = installment();
        inst.pay_principal(date(2024, 1, 10), Money::from_major(400, usd()));
        inst.waive_interest(date(2024, 1, 10), Money::from_major(20, usd()));
        inst.relieve_interest(date(2024, 1, 10), Money::from_major(100, usd()));
        inst.add_to_principal(date(2024, 2, 15), Money::from_major(250, usd()));
        assert_eq!(inst.due(Component::Principal, usd()).amount(), dec!(1050));
        assert_eq!(inst.due(Component::Interest, usd()).amount(), dec!(100));

        inst.reset_derived_components();

        assert!(inst.total_paid(usd()).is_zero());
        assert!(inst.waived(Component::Interest, usd()).is_zero());
        assert!(inst.total_paid_in_advance(usd()).is_zero());
        assert!(inst.credited_principal(usd()).is_zero());
        assert!(inst.interest_relieved(usd()).is_zero());
        assert_eq!(inst.due(Component::Principal, usd()).amount(), dec!(800));
        assert_eq!(inst.due(Component::Interest, usd()).amount(), dec!(200));
        assert!(inst.is_not_fully_paid_off());
    }

    #[test]
    fn test_charge_projection_can_break_invariant_until_replay() {
        let mut inst = installment();
        inst.update_charge_portions(
            Money::from_major(50, usd()),
            Money::zero(usd()),
            Money::zero(usd()),
            Money::zero(usd()),
        );
        inst.pay_fee_charges(date(2024, 2, 1), Money::from_major(50, usd()));
        assert!(inst.verify_component_invariants().is_ok());

        // projecting a smaller fee due under an already-paid amount must be
        // caught before anything else trusts the installment
        inst.update_charge_portions(
            Money::from_major(30, usd()),
            Money::zero(usd()),
            Money::zero(usd()),
            Money::zero(usd()),
        );
        assert!(matches!(
            inst.verify_component_invariants(),
            Err(ProcessorError::AllocationInvariantViolation {
                installment: 1,
                component: Component::FeeCharges,
            })
        ));
    }

    #[test]
    fn test_period_containment() {
        let first = installment();
        assert!(first.period_contains(date(2024, 1, 1)));
        assert!(first.period_contains(date(2024, 2, 1)));
        assert!(!first.period_contains(date(2024, 2, 2)));

        let second = Installment::new(
            2,
            date(2024, 2, 1),
            date(2024, 3, 1),
            dec!(800),
            dec!(180),
        );
        assert!(!second.period_contains(date(2024, 2, 1)));
        assert!(second.period_contains(date(2024, 2, 2)));
        assert!(second.period_contains(date(2024, 3, 1)));
    }
}
