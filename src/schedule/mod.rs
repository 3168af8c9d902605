pub mod installment;

pub use installment::Installment;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::money::{Currency, Money};
use crate::types::Component;

/// the installment schedule of one loan, kept in due-date order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RepaymentSchedule {
    installments: Vec<Installment>,
}

impl RepaymentSchedule {
    pub fn new(mut installments: Vec<Installment>) -> Self {
        installments.sort_by_key(|inst| (inst.due_date, inst.sequence));
        RepaymentSchedule { installments }
    }

    pub fn installments(&self) -> &[Installment] {
        &self.installments
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Installment> {
        self.installments.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.installments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installments.is_empty()
    }

    pub fn last(&self) -> Option<&Installment> {
        self.installments.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Installment> {
        self.installments.last_mut()
    }

    pub fn last_due_date(&self) -> Option<NaiveDate> {
        self.installments.last().map(|inst| inst.due_date)
    }

    pub fn next_sequence(&self) -> u32 {
        self.installments
            .last()
            .map(|inst| inst.sequence + 1)
            .unwrap_or(1)
    }

    pub fn by_sequence_mut(&mut self, sequence: u32) -> Option<&mut Installment> {
        self.installments
            .iter_mut()
            .find(|inst| inst.sequence == sequence)
    }

    /// the installment whose repayment period contains the date
    pub fn installment_for(&self, date: NaiveDate) -> Option<&Installment> {
        self.installments
            .iter()
            .find(|inst| inst.period_contains(date))
    }

    pub fn reset_derived_components(&mut self) {
        for installment in &mut self.installments {
            installment.reset_derived_components();
        }
    }

    pub fn total_principal_due(&self, currency: Currency) -> Money {
        self.component_due_total(Component::Principal, currency)
    }

    pub fn total_interest_due(&self, currency: Currency) -> Money {
        self.component_due_total(Component::Interest, currency)
    }

    fn component_due_total(&self, component: Component, currency: Currency) -> Money {
        let total = self
            .installments
            .iter()
            .map(|inst| inst.due(component, currency).amount())
            .sum();
        Money::new(total, currency)
    }

    /// closing correction: the last installment absorbs any residual between
    /// the per-installment sums and the loan totals, so the schedule adds up
    /// exactly even when per-period computation rounded each row
    pub fn correct_final_installment(
        &mut self,
        total_principal: Money,
        total_interest: Money,
    ) -> Result<()> {
        let currency = total_principal.currency();
        let principal_delta = total_principal.subtract(&self.total_principal_due(currency))?;
        let interest_delta = total_interest.subtract(&self.total_interest_due(currency))?;

        if let Some(last) = self.installments.last_mut() {
            if !principal_delta.is_zero() {
                last.adjust_principal_due(principal_delta);
            }
            if !interest_delta.is_zero() {
                last.adjust_interest_due(interest_delta);
            }
        }
        Ok(())
    }

    pub fn append_additional(&mut self, installment: Installment) {
        self.installments.push(installment);
    }

    /// drops a trailing additional installment whose due amount returned to
    /// exactly zero after a replay pass
    pub fn prune_settled_additional(&mut self, currency: Currency) -> Option<Installment> {
        let settled = self
            .installments
            .last()
            .map(|inst| inst.is_additional() && inst.total_due(currency).is_zero())
            .unwrap_or(false);
        if settled {
            self.installments.pop()
        } else {
            None
        }
    }

    pub fn verify_component_invariants(&self) -> Result<()> {
        for installment in &self.installments {
            installment.verify_component_invariants()?;
        }
        Ok(())
    }
}
