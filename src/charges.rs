use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Result;
use crate::money::{Currency, Money};
use crate::schedule::RepaymentSchedule;
use crate::types::ChargeId;

/// when a charge falls due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeTime {
    /// collected at disbursement, outside the replay
    Disbursement,
    /// one-time charge due on a specific date
    SpecifiedDueDate,
    /// amortized across installments with a per-installment sub-ledger
    InstallmentFee,
}

/// per-installment slice of an amortized installment fee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentCharge {
    pub installment: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub amount_paid: Money,
    pub amount_waived: Money,
}

impl InstallmentCharge {
    fn outstanding(&self) -> Money {
        Money::new(
            self.amount.amount() - self.amount_paid.amount() - self.amount_waived.amount(),
            self.amount.currency(),
        )
    }
}

/// a fee or penalty levied on a loan.
/// outstanding = amount - paid - waived at all times
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanCharge {
    pub id: ChargeId,
    pub name: String,
    charge_time: ChargeTime,
    due_date: Option<NaiveDate>,
    penalty: bool,
    amount: Money,
    amount_paid: Money,
    amount_waived: Money,
    installment_charges: Vec<InstallmentCharge>,
}

impl LoanCharge {
    /// one-time charge due on a specific date
    pub fn new(name: &str, amount: Money, due_date: NaiveDate, penalty: bool) -> Self {
        LoanCharge {
            id: Uuid::new_v4(),
            name: name.to_string(),
            charge_time: ChargeTime::SpecifiedDueDate,
            due_date: Some(due_date),
            penalty,
            amount,
            amount_paid: Money::zero(amount.currency()),
            amount_waived: Money::zero(amount.currency()),
            installment_charges: Vec::new(),
        }
    }

    /// charge collected at disbursement; replay passes leave it untouched
    pub fn due_at_disbursement(name: &str, amount: Money, penalty: bool) -> Self {
        LoanCharge {
            id: Uuid::new_v4(),
            name: name.to_string(),
            charge_time: ChargeTime::Disbursement,
            due_date: None,
            penalty,
            amount,
            amount_paid: Money::zero(amount.currency()),
            amount_waived: Money::zero(amount.currency()),
            installment_charges: Vec::new(),
        }
    }

    /// installment fee amortized over every installment of the schedule
    pub fn installment_fee(
        name: &str,
        amount_per_installment: Money,
        schedule: &RepaymentSchedule,
        penalty: bool,
    ) -> Result<Self> {
        let currency = amount_per_installment.currency();
        let mut total = Money::zero(currency);
        let mut installment_charges = Vec::with_capacity(schedule.len());
        for installment in schedule.installments() {
            installment_charges.push(InstallmentCharge {
                installment: installment.sequence,
                due_date: installment.due_date,
                amount: amount_per_installment,
                amount_paid: Money::zero(currency),
                amount_waived: Money::zero(currency),
            });
            total = total.add(&amount_per_installment)?;
        }
        Ok(LoanCharge {
            id: Uuid::new_v4(),
            name: name.to_string(),
            charge_time: ChargeTime::InstallmentFee,
            due_date: None,
            penalty,
            amount: total,
            amount_paid: Money::zero(currency),
            amount_waived: Money::zero(currency),
            installment_charges,
        })
    }

    pub fn charge_time(&self) -> ChargeTime {
        self.charge_time
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn is_penalty(&self) -> bool {
        self.penalty
    }

    pub fn is_due_at_disbursement(&self) -> bool {
        self.charge_time == ChargeTime::Disbursement
    }

    pub fn is_installment_fee(&self) -> bool {
        self.charge_time == ChargeTime::InstallmentFee
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn amount_paid(&self) -> Money {
        self.amount_paid
    }

    pub fn amount_waived(&self) -> Money {
        self.amount_waived
    }

    pub fn amount_outstanding(&self) -> Money {
        Money::new(
            self.amount.amount() - self.amount_paid.amount() - self.amount_waived.amount(),
            self.amount.currency(),
        )
    }

    pub fn is_fully_paid(&self) -> bool {
        self.amount_outstanding().is_zero()
    }

    pub fn installment_charges(&self) -> &[InstallmentCharge] {
        &self.installment_charges
    }

    pub fn share_for(&self, installment: u32) -> Option<&InstallmentCharge> {
        self.installment_charges
            .iter()
            .find(|share| share.installment == installment)
    }

    /// whether a one-time charge falls due inside (start, end]; the first
    /// period also owns charges due exactly on its start date
    pub fn is_due_in_period(&self, start: NaiveDate, end: NaiveDate, include_start: bool) -> bool {
        match (self.charge_time, self.due_date) {
            (ChargeTime::SpecifiedDueDate, Some(due)) => {
                let after_start = if include_start { due >= start } else { due > start };
                after_start && due <= end
            }
            _ => false,
        }
    }

    /// replay reset; waived amounts survive and are re-projected instead
    pub fn reset_paid_amount(&mut self) {
        self.amount_paid = Money::zero(self.amount.currency());
        for share in &mut self.installment_charges {
            share.amount_paid = Money::zero(share.amount.currency());
        }
    }

    /// apply a payment, capped at the outstanding amount. installment fees
    /// consume one share per call (the given installment, or the earliest
    /// unpaid one) so caller loops distribute across shares in due order
    pub fn update_paid_amount_by(
        &mut self,
        incoming: Money,
        installment: Option<u32>,
    ) -> Result<Money> {
        if self.is_installment_fee() {
            let share = match installment {
                Some(sequence) => self
                    .installment_charges
                    .iter_mut()
                    .find(|share| share.installment == sequence && share.outstanding().is_positive()),
                None => self
                    .installment_charges
                    .iter_mut()
                    .find(|share| share.outstanding().is_positive()),
            };
            let Some(share) = share else {
                return Ok(Money::zero(self.amount.currency()));
            };
            let applied = incoming.min(&share.outstanding())?.negative_to_zero();
            share.amount_paid = share.amount_paid.add(&applied)?;
            self.amount_paid = self.amount_paid.add(&applied)?;
            Ok(applied)
        } else {
            let applied = incoming.min(&self.amount_outstanding())?.negative_to_zero();
            self.amount_paid = self.amount_paid.add(&applied)?;
            Ok(applied)
        }
    }

    /// refund support: deduct a previously applied payment, capped at the
    /// paid amount; installment fees give back the latest paid share first
    pub fn undo_paid_amount_by(
        &mut self,
        incoming: Money,
        installment: Option<u32>,
    ) -> Result<Money> {
        if self.is_installment_fee() {
            let share = match installment {
                Some(sequence) => self
                    .installment_charges
                    .iter_mut()
                    .find(|share| share.installment == sequence && share.amount_paid.is_positive()),
                None => self
                    .installment_charges
                    .iter_mut()
                    .rev()
                    .find(|share| share.amount_paid.is_positive()),
            };
            let Some(share) = share else {
                return Ok(Money::zero(self.amount.currency()));
            };
            let deducted = incoming.min(&share.amount_paid)?.negative_to_zero();
            share.amount_paid = share.amount_paid.subtract(&deducted)?;
            self.amount_paid = self.amount_paid.subtract(&deducted)?;
            Ok(deducted)
        } else {
            let deducted = incoming.min(&self.amount_paid)?.negative_to_zero();
            self.amount_paid = self.amount_paid.subtract(&deducted)?;
            Ok(deducted)
        }
    }

    /// waive part of the charge; picked up by the next replay's projection
    pub fn waive(&mut self, amount: Money, installment: Option<u32>) -> Result<Money> {
        if self.is_installment_fee() {
            let share = match installment {
                Some(sequence) => self
                    .installment_charges
                    .iter_mut()
                    .find(|share| share.installment == sequence && share.outstanding().is_positive()),
                None => self
                    .installment_charges
                    .iter_mut()
                    .find(|share| share.outstanding().is_positive()),
            };
            let Some(share) = share else {
                return Ok(Money::zero(self.amount.currency()));
            };
            let waived = amount.min(&share.outstanding())?.negative_to_zero();
            share.amount_waived = share.amount_waived.add(&waived)?;
            self.amount_waived = self.amount_waived.add(&waived)?;
            Ok(waived)
        } else {
            let waived = amount.min(&self.amount_outstanding())?.negative_to_zero();
            self.amount_waived = self.amount_waived.add(&waived)?;
            Ok(waived)
        }
    }

    /// installment owning the next open share of an installment fee
    pub fn next_unpaid_installment(&self) -> Option<u32> {
        self.installment_charges
            .iter()
            .find(|share| share.outstanding().is_positive())
            .map(|share| share.installment)
    }

    /// ordering key for payment distribution: disbursement charges first,
    /// then by due date; installment fees rank by their earliest open share
    fn distribution_due_date(&self) -> Option<NaiveDate> {
        match self.charge_time {
            ChargeTime::Disbursement => None,
            ChargeTime::SpecifiedDueDate => self.due_date,
            ChargeTime::InstallmentFee => self
                .installment_charges
                .iter()
                .find(|share| share.outstanding().is_positive())
                .map(|share| share.due_date),
        }
    }
}

/// projects the charge ledger into each installment's fee and penalty
/// components: dues and waivers are recomputed from scratch on every pass so
/// charge waivers recorded since the last replay are picked up
pub fn reprocess_charges(
    currency: Currency,
    disbursement_date: NaiveDate,
    schedule: &mut RepaymentSchedule,
    charges: &[LoanCharge],
) -> Result<()> {
    let mut period_start = disbursement_date;
    let mut first = true;
    for installment in schedule.iter_mut() {
        let mut fee_due = Money::zero(currency);
        let mut fee_waived = Money::zero(currency);
        let mut penalty_due = Money::zero(currency);
        let mut penalty_waived = Money::zero(currency);

        for charge in charges {
            if charge.is_due_at_disbursement() {
                continue;
            }
            let (due, waived) = if charge.is_installment_fee() {
                match charge.share_for(installment.sequence) {
                    Some(share) => (share.amount, share.amount_waived),
                    None => continue,
                }
            } else if charge.is_due_in_period(period_start, installment.due_date, first) {
                (charge.amount(), charge.amount_waived())
            } else {
                continue;
            };

            if charge.is_penalty() {
                penalty_due = penalty_due.add(&due)?;
                penalty_waived = penalty_waived.add(&waived)?;
            } else {
                fee_due = fee_due.add(&due)?;
                fee_waived = fee_waived.add(&waived)?;
            }
        }

        installment.update_charge_portions(fee_due, fee_waived, penalty_due, penalty_waived);
        period_start = installment.due_date;
        first = false;
    }
    Ok(())
}

/// earliest charge still carrying an outstanding amount, for distributing a
/// transaction's fee or penalty portion
pub fn earliest_unpaid_position(charges: &[LoanCharge], penalty: bool) -> Option<usize> {
    let mut best: Option<(usize, Option<NaiveDate>)> = None;
    for (index, charge) in charges.iter().enumerate() {
        if charge.is_penalty() != penalty || !charge.amount_outstanding().is_positive() {
            continue;
        }
        let key = charge.distribution_due_date();
        let better = match &best {
            None => true,
            Some((_, best_key)) => key < *best_key,
        };
        if better {
            best = Some((index, key));
        }
    }
    best.map(|(index, _)| index)
}

pub fn earliest_unpaid_mut(charges: &mut [LoanCharge], penalty: bool) -> Option<&mut LoanCharge> {
    earliest_unpaid_position(charges, penalty).map(|index| &mut charges[index])
}

/// latest charge carrying a paid amount, for unwinding payments on refund
pub fn latest_paid_position(charges: &[LoanCharge], penalty: bool) -> Option<usize> {
    let mut best: Option<(usize, Option<NaiveDate>)> = None;
    for (index, charge) in charges.iter().enumerate() {
        if charge.is_penalty() != penalty || !charge.amount_paid().is_positive() {
            continue;
        }
        let key = charge.distribution_due_date();
        let better = match &best {
            None => true,
            Some((_, best_key)) => key >= *best_key,
        };
        if better {
            best = Some((index, key));
        }
    }
    best.map(|(index, _)| index)
}

pub fn latest_paid_mut(charges: &mut [LoanCharge], penalty: bool) -> Option<&mut LoanCharge> {
    latest_paid_position(charges, penalty).map(|index| &mut charges[index])
}
