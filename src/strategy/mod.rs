pub mod advance_principal;
pub mod interest_first;
pub mod principal_first;
pub mod standard;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::errors::{ProcessorError, Result};
use crate::money::{Money, RoundingMode};
use crate::schedule::Installment;
use crate::transaction::{LoanTransaction, ScheduleMapping};
use crate::types::{Component, TransactionKind};

pub use advance_principal::AdvancePrincipalStrategy;
pub use interest_first::InterestFirstStrategy;
pub use principal_first::PrincipalFirstStrategy;
pub use standard::StandardStrategy;

pub type SharedStrategy = Arc<dyn AllocationStrategy + Send + Sync>;

/// how a transaction's money lands on an installment's components.
/// each handler consumes from `unprocessed` and returns what is left over;
/// the processor routes every (transaction, installment) pair to exactly one
/// handler based on where the transaction date falls against the due date
pub trait AllocationStrategy: fmt::Debug {
    /// registry key
    fn code(&self) -> &'static str;

    fn name(&self) -> &'static str;

    /// transaction dated exactly on the installment's due date
    fn handle_on_time_payment(
        &self,
        installment: &mut Installment,
        transaction: &mut LoanTransaction,
        unprocessed: Money,
    ) -> Result<Money>;

    /// transaction dated before the installment's due date
    fn handle_advance_payment(
        &self,
        installment: &mut Installment,
        transaction: &mut LoanTransaction,
        unprocessed: Money,
    ) -> Result<Money>;

    /// transaction dated after the installment's due date
    fn handle_late_payment(
        &self,
        installment: &mut Installment,
        transaction: &mut LoanTransaction,
        unprocessed: Money,
    ) -> Result<Money>;

    /// give back previously applied amounts, latest obligations first
    fn handle_refund(
        &self,
        installment: &mut Installment,
        transaction: &mut LoanTransaction,
        unprocessed: Money,
    ) -> Result<Money>;
}

/// applies a transaction to one installment component by component.
/// interest waivers waive instead of paying and only ever touch interest.
/// whatever lands is accumulated on the transaction and in its mappings
pub fn apply_in_order(
    order: &[Component],
    installment: &mut Installment,
    transaction: &mut LoanTransaction,
    unprocessed: Money,
) -> Result<Money> {
    let currency = unprocessed.currency();
    let date = transaction.date;
    let mut remaining = unprocessed;

    if transaction.kind == TransactionKind::InterestWaiver {
        let waived = installment.waive_interest(date, remaining);
        if waived.is_positive() {
            transaction.update_components(
                Money::zero(currency),
                waived,
                Money::zero(currency),
                Money::zero(currency),
            )?;
            transaction.record_mapping(ScheduleMapping {
                installment: installment.sequence,
                principal: Money::zero(currency),
                interest: waived,
                fee_charges: Money::zero(currency),
                penalty_charges: Money::zero(currency),
            })?;
            remaining = remaining.subtract(&waived)?;
        }
        return Ok(remaining);
    }

    let mut principal = Money::zero(currency);
    let mut interest = Money::zero(currency);
    let mut fee_charges = Money::zero(currency);
    let mut penalty_charges = Money::zero(currency);

    for component in order {
        if remaining.is_zero() {
            break;
        }
        let applied = installment.pay_component(*component, date, remaining);
        match component {
            Component::Principal => principal = principal.add(&applied)?,
            Component::Interest => interest = interest.add(&applied)?,
            Component::FeeCharges => fee_charges = fee_charges.add(&applied)?,
            Component::PenaltyCharges => penalty_charges = penalty_charges.add(&applied)?,
        }
        remaining = remaining.subtract(&applied)?;
    }

    let applied_total = principal
        .add(&interest)?
        .add(&fee_charges)?
        .add(&penalty_charges)?;
    if applied_total.is_positive() {
        transaction.update_components(principal, interest, fee_charges, penalty_charges)?;
        transaction.record_mapping(ScheduleMapping {
            installment: installment.sequence,
            principal,
            interest,
            fee_charges,
            penalty_charges,
        })?;
    }

    Ok(remaining)
}

/// unwinds previously paid amounts from one installment, component by
/// component. refunded portions accumulate positively on the refund
/// transaction the same way payments do on repayments
pub fn undo_in_order(
    order: &[Component],
    installment: &mut Installment,
    transaction: &mut LoanTransaction,
    unprocessed: Money,
) -> Result<Money> {
    let currency = unprocessed.currency();
    let date = transaction.date;
    let mut remaining = unprocessed;

    let mut principal = Money::zero(currency);
    let mut interest = Money::zero(currency);
    let mut fee_charges = Money::zero(currency);
    let mut penalty_charges = Money::zero(currency);

    for component in order {
        if remaining.is_zero() {
            break;
        }
        let deducted = installment.unpay_component(*component, date, remaining);
        match component {
            Component::Principal => principal = principal.add(&deducted)?,
            Component::Interest => interest = interest.add(&deducted)?,
            Component::FeeCharges => fee_charges = fee_charges.add(&deducted)?,
            Component::PenaltyCharges => penalty_charges = penalty_charges.add(&deducted)?,
        }
        remaining = remaining.subtract(&deducted)?;
    }

    let deducted_total = principal
        .add(&interest)?
        .add(&fee_charges)?
        .add(&penalty_charges)?;
    if deducted_total.is_positive() {
        transaction.update_components(principal, interest, fee_charges, penalty_charges)?;
        transaction.record_mapping(ScheduleMapping {
            installment: installment.sequence,
            principal,
            interest,
            fee_charges,
            penalty_charges,
        })?;
    }

    Ok(remaining)
}

/// interest still chargeable on an installment settled `grace_fraction` of
/// the period ahead of its due date. a full period early cancels the
/// interest, more than a quarter early scales it down, a quarter or less
/// keeps it whole
pub fn interest_chargeable_after_grace(interest: Money, grace_fraction: Decimal) -> Money {
    if grace_fraction >= Decimal::ONE {
        Money::zero(interest.currency())
    } else if grace_fraction > dec!(0.25) {
        interest.multiplied_by(Decimal::ONE - grace_fraction, RoundingMode::HalfEven)
    } else {
        interest
    }
}

/// allocation strategies keyed by their wire code
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, SharedStrategy>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// registry preloaded with every built-in strategy
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StandardStrategy));
        registry.register(Arc::new(InterestFirstStrategy));
        registry.register(Arc::new(PrincipalFirstStrategy));
        registry.register(Arc::new(AdvancePrincipalStrategy));
        registry
    }

    pub fn register(&mut self, strategy: SharedStrategy) {
        self.strategies.insert(strategy.code().to_string(), strategy);
    }

    pub fn resolve(&self, code: &str) -> Result<SharedStrategy> {
        self.strategies
            .get(code)
            .cloned()
            .ok_or_else(|| ProcessorError::UnknownAllocationStrategy {
                code: code.to_string(),
            })
    }

    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }
}
