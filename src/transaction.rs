use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Result;
use crate::money::Money;
use crate::types::{ChargeId, TransactionId, TransactionKind};

/// per-installment breakdown recorded while a transaction is allocated
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleMapping {
    pub installment: u32,
    pub principal: Money,
    pub interest: Money,
    pub fee_charges: Money,
    pub penalty_charges: Money,
}

/// a monetary transaction against a loan.
/// derived state (the component portions and schedule mappings) is rebuilt on
/// every replay; only kind, date, amount and reversal survive as facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTransaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub date: NaiveDate,
    amount: Money,
    principal_portion: Money,
    interest_portion: Money,
    fee_charges_portion: Money,
    penalty_charges_portion: Money,
    overpayment_portion: Money,
    reversed: bool,
    persisted: bool,
    external_ref: Option<String>,
    charge: Option<ChargeId>,
    schedule_mappings: Vec<ScheduleMapping>,
}

impl LoanTransaction {
    /// a transaction being submitted for the first time
    pub fn new(kind: TransactionKind, date: NaiveDate, amount: Money) -> Self {
        let zero = Money::zero(amount.currency());
        LoanTransaction {
            id: Uuid::new_v4(),
            kind,
            date,
            amount,
            principal_portion: zero,
            interest_portion: zero,
            fee_charges_portion: zero,
            penalty_charges_portion: zero,
            overpayment_portion: zero,
            reversed: false,
            persisted: false,
            external_ref: None,
            charge: None,
            schedule_mappings: Vec::new(),
        }
    }

    /// a transaction previously processed and saved; replays recompute its
    /// portions in shadow and only replace it when they diverge
    pub fn persisted(kind: TransactionKind, date: NaiveDate, amount: Money) -> Self {
        let mut transaction = Self::new(kind, date, amount);
        transaction.persisted = true;
        transaction
    }

    /// payment settling a specific charge rather than the schedule
    pub fn charge_payment(date: NaiveDate, amount: Money, charge: ChargeId) -> Self {
        let mut transaction = Self::new(TransactionKind::ChargePayment, date, amount);
        transaction.charge = Some(charge);
        transaction
    }

    pub fn with_external_ref(mut self, external_ref: &str) -> Self {
        self.external_ref = Some(external_ref.to_string());
        self
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn principal_portion(&self) -> Money {
        self.principal_portion
    }

    pub fn interest_portion(&self) -> Money {
        self.interest_portion
    }

    pub fn fee_charges_portion(&self) -> Money {
        self.fee_charges_portion
    }

    pub fn penalty_charges_portion(&self) -> Money {
        self.penalty_charges_portion
    }

    pub fn overpayment_portion(&self) -> Money {
        self.overpayment_portion
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// callers flag a transaction once its breakdown has been stored;
    /// subsequent replays then shadow it instead of mutating in place
    pub fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    pub fn external_ref(&self) -> Option<&str> {
        self.external_ref.as_deref()
    }

    pub fn charge(&self) -> Option<ChargeId> {
        self.charge
    }

    pub fn schedule_mappings(&self) -> &[ScheduleMapping] {
        &self.schedule_mappings
    }

    pub fn is_repayment_like(&self) -> bool {
        self.kind.is_repayment_like()
    }

    pub fn is_credit_class(&self) -> bool {
        self.kind.is_credit_class()
    }

    /// zeroes everything a replay recomputes
    pub fn reset_derived_components(&mut self) {
        let zero = Money::zero(self.amount.currency());
        self.principal_portion = zero;
        self.interest_portion = zero;
        self.fee_charges_portion = zero;
        self.penalty_charges_portion = zero;
        self.overpayment_portion = zero;
        self.schedule_mappings.clear();
    }

    /// accumulate allocated portions
    pub fn update_components(
        &mut self,
        principal: Money,
        interest: Money,
        fee_charges: Money,
        penalty_charges: Money,
    ) -> Result<()> {
        self.principal_portion = self.principal_portion.add(&principal)?;
        self.interest_portion = self.interest_portion.add(&interest)?;
        self.fee_charges_portion = self.fee_charges_portion.add(&fee_charges)?;
        self.penalty_charges_portion = self.penalty_charges_portion.add(&penalty_charges)?;
        Ok(())
    }

    /// accumulate portions and rewrite the amount as their sum; write-offs
    /// derive their size from the balances they extinguish
    pub fn update_components_and_total(
        &mut self,
        principal: Money,
        interest: Money,
        fee_charges: Money,
        penalty_charges: Money,
    ) -> Result<()> {
        self.update_components(principal, interest, fee_charges, penalty_charges)?;
        self.amount = self
            .principal_portion
            .add(&self.interest_portion)?
            .add(&self.fee_charges_portion)?
            .add(&self.penalty_charges_portion)?;
        Ok(())
    }

    pub fn set_overpayment(&mut self, overpayment: Money) {
        self.overpayment_portion = overpayment;
    }

    /// an interest waiver can never waive more than the interest it found;
    /// trim its face amount to the interest actually absorbed
    pub fn adjust_interest_component(&mut self) {
        if self.kind == TransactionKind::InterestWaiver {
            self.amount = self.interest_portion;
        }
    }

    pub fn reverse(&mut self) {
        self.reversed = true;
        self.external_ref = None;
    }

    /// fresh shadow of this transaction for recomputation: new identity,
    /// zeroed portions, carries the external reference forward
    pub fn replay_copy(&self) -> LoanTransaction {
        let mut copy = Self::new(self.kind, self.date, self.amount);
        copy.external_ref = self.external_ref.clone();
        copy.charge = self.charge;
        copy
    }

    /// whether a shadow recomputation landed on the same breakdown
    pub fn components_match(&self, other: &LoanTransaction) -> bool {
        self.amount == other.amount
            && self.principal_portion == other.principal_portion
            && self.interest_portion == other.interest_portion
            && self.fee_charges_portion == other.fee_charges_portion
            && self.penalty_charges_portion == other.penalty_charges_portion
            && self.overpayment_portion == other.overpayment_portion
    }

    /// record what landed on an installment, merging repeat visits
    pub fn record_mapping(&mut self, mapping: ScheduleMapping) -> Result<()> {
        if let Some(existing) = self
            .schedule_mappings
            .iter_mut()
            .find(|existing| existing.installment == mapping.installment)
        {
            existing.principal = existing.principal.add(&mapping.principal)?;
            existing.interest = existing.interest.add(&mapping.interest)?;
            existing.fee_charges = existing.fee_charges.add(&mapping.fee_charges)?;
            existing.penalty_charges = existing.penalty_charges.add(&mapping.penalty_charges)?;
        } else {
            self.schedule_mappings.push(mapping);
        }
        Ok(())
    }

    /// adopt the breakdown a shadow recomputation produced
    pub fn adopt_mappings_from(&mut self, other: &LoanTransaction) {
        self.schedule_mappings = other.schedule_mappings.clone();
    }
}

/// how two transactions in the ledger relate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    /// `to` is the replacement written when `from` was replayed
    Replayed,
    /// `from` charges back against the repayment `to`
    Chargeback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRelation {
    pub kind: RelationKind,
    pub from: TransactionId,
    pub to: TransactionId,
}

/// arena holding every transaction in submission order plus the relations
/// between them. replacements are appended, never swapped in place, so the
/// full history stays addressable
#[derive(Debug, Clone, Default)]
pub struct TransactionLedger {
    transactions: Vec<LoanTransaction>,
    index: HashMap<TransactionId, usize>,
    relations: Vec<TransactionRelation>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, transaction: LoanTransaction) -> TransactionId {
        let id = transaction.id;
        self.index.insert(id, self.transactions.len());
        self.transactions.push(transaction);
        id
    }

    pub fn get(&self, id: TransactionId) -> Option<&LoanTransaction> {
        self.index.get(&id).map(|&position| &self.transactions[position])
    }

    pub fn get_mut(&mut self, id: TransactionId) -> Option<&mut LoanTransaction> {
        match self.index.get(&id) {
            Some(&position) => Some(&mut self.transactions[position]),
            None => None,
        }
    }

    /// submission order
    pub fn iter(&self) -> impl Iterator<Item = &LoanTransaction> {
        self.transactions.iter()
    }

    /// id snapshot in submission order; lets callers walk and mutate
    pub fn ids(&self) -> Vec<TransactionId> {
        self.transactions.iter().map(|transaction| transaction.id).collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn add_relation(&mut self, kind: RelationKind, from: TransactionId, to: TransactionId) {
        self.relations.push(TransactionRelation { kind, from, to });
    }

    pub fn relations(&self) -> &[TransactionRelation] {
        &self.relations
    }

    pub fn relations_from(
        &self,
        id: TransactionId,
    ) -> impl Iterator<Item = &TransactionRelation> {
        self.relations.iter().filter(move |relation| relation.from == id)
    }

    pub fn relations_to(&self, id: TransactionId) -> impl Iterator<Item = &TransactionRelation> {
        self.relations.iter().filter(move |relation| relation.to == id)
    }

    /// retarget relations of one kind after a replay replaced their endpoint
    pub fn repoint_relations(
        &mut self,
        kind: RelationKind,
        old_to: TransactionId,
        new_to: TransactionId,
    ) {
        for relation in &mut self.relations {
            if relation.kind == kind && relation.to == old_to {
                relation.to = new_to;
            }
        }
    }
}

/// outcome of a full replay: which persisted transactions were superseded by
/// freshly computed replacements, in processing order
#[derive(Debug, Clone, Default)]
pub struct ChangedTransactionDetail {
    replacements: Vec<(TransactionId, TransactionId)>,
}

impl ChangedTransactionDetail {
    pub fn record(&mut self, original: TransactionId, replacement: TransactionId) {
        self.replacements.push((original, replacement));
    }

    /// (original, replacement) pairs in processing order
    pub fn replacements(&self) -> &[(TransactionId, TransactionId)] {
        &self.replacements
    }

    pub fn replacement_of(&self, original: TransactionId) -> Option<TransactionId> {
        self.replacements
            .iter()
            .find(|(from, _)| *from == original)
            .map(|(_, to)| *to)
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use rust_decimal_macros::dec;

    fn usd() -> Currency {
        Currency::of("USD", 2).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_update_components_accumulates() {
        let mut transaction = LoanTransaction::new(
            TransactionKind::Repayment,
            date(2024, 2, 1),
            Money::from_major(1000, usd()),
        );
        transaction
            .update_components(
                Money::from_major(800, usd()),
                Money::from_major(200, usd()),
                Money::zero(usd()),
                Money::zero(usd()),
            )
            .unwrap();
        transaction
            .update_components(
                Money::from_major(0, usd()),
                Money::from_major(0, usd()),
                Money::from_major(15, usd()),
                Money::zero(usd()),
            )
            .unwrap();

        assert_eq!(transaction.principal_portion().amount(), dec!(800));
        assert_eq!(transaction.interest_portion().amount(), dec!(200));
        assert_eq!(transaction.fee_charges_portion().amount(), dec!(15));
    }

    #[test]
    fn test_write_off_total_follows_components() {
        let mut write_off = LoanTransaction::new(
            TransactionKind::WriteOff,
            date(2024, 6, 1),
            Money::zero(usd()),
        );
        write_off
            .update_components_and_total(
                Money::from_major(400, usd()),
                Money::from_major(35, usd()),
                Money::from_major(10, usd()),
                Money::zero(usd()),
            )
            .unwrap();
        assert_eq!(write_off.amount().amount(), dec!(445));
    }

    #[test]
    fn test_waiver_amount_trimmed_to_interest_found() {
        let mut waiver = LoanTransaction::new(
            TransactionKind::InterestWaiver,
            date(2024, 3, 1),
            Money::from_major(100, usd()),
        );
        waiver
            .update_components(
                Money::zero(usd()),
                Money::from_major(60, usd()),
                Money::zero(usd()),
                Money::zero(usd()),
            )
            .unwrap();
        waiver.adjust_interest_component();
        assert_eq!(waiver.amount().amount(), dec!(60));
    }

    #[test]
    fn test_replay_copy_resets_identity_and_portions() {
        let mut original = LoanTransaction::persisted(
            TransactionKind::Repayment,
            date(2024, 2, 1),
            Money::from_major(500, usd()),
        )
        .with_external_ref("bank-778");
        original
            .update_components(
                Money::from_major(500, usd()),
                Money::zero(usd()),
                Money::zero(usd()),
                Money::zero(usd()),
            )
            .unwrap();

        let copy = original.replay_copy();
        assert_ne!(copy.id, original.id);
        assert!(copy.principal_portion().is_zero());
        assert!(!copy.is_persisted());
        assert_eq!(copy.external_ref(), Some("bank-778"));
        assert!(!original.components_match(&copy));

        original.reverse();
        assert!(original.is_reversed());
        assert_eq!(original.external_ref(), None);
    }

    #[test]
    fn test_mapping_merge_by_installment() {
        let mut transaction = LoanTransaction::new(
            TransactionKind::Repayment,
            date(2024, 2, 1),
            Money::from_major(300, usd()),
        );
        let mapping = ScheduleMapping {
            installment: 1,
            principal: Money::from_major(100, usd()),
            interest: Money::from_major(20, usd()),
            fee_charges: Money::zero(usd()),
            penalty_charges: Money::zero(usd()),
        };
        transaction.record_mapping(mapping).unwrap();
        transaction.record_mapping(mapping).unwrap();

        assert_eq!(transaction.schedule_mappings().len(), 1);
        assert_eq!(transaction.schedule_mappings()[0].principal.amount(), dec!(200));
    }

    #[test]
    fn test_ledger_preserves_submission_order_and_relations() {
        let mut ledger = TransactionLedger::new();
        let first = ledger.insert(LoanTransaction::new(
            TransactionKind::Repayment,
            date(2024, 2, 1),
            Money::from_major(100, usd()),
        ));
        let second = ledger.insert(LoanTransaction::new(
            TransactionKind::Chargeback,
            date(2024, 3, 1),
            Money::from_major(100, usd()),
        ));

        assert_eq!(ledger.ids(), vec![first, second]);
        assert_eq!(ledger.get(first).unwrap().kind, TransactionKind::Repayment);

        ledger.add_relation(RelationKind::Chargeback, second, first);
        let replacement = ledger.insert(LoanTransaction::new(
            TransactionKind::Repayment,
            date(2024, 2, 1),
            Money::from_major(100, usd()),
        ));
        ledger.repoint_relations(RelationKind::Chargeback, first, replacement);

        let relation = ledger.relations_from(second).next().unwrap();
        assert_eq!(relation.to, replacement);
        assert_eq!(ledger.relations_to(replacement).count(), 1);
    }
}
