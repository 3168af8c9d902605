use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// unique identifier for a loan transaction
pub type TransactionId = Uuid;

/// unique identifier for a loan charge
pub type ChargeId = Uuid;

/// monetary transaction kinds recognized by the replay dispatch.
/// the set is closed: new kinds require a new dispatch arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// borrower repayment allocated through the strategy
    Repayment,
    /// waives outstanding interest instead of paying components
    InterestWaiver,
    /// collection against a written-off loan, allocated like a repayment
    RecoveryRepayment,
    /// writes off all remaining components of unpaid installments
    WriteOff,
    /// returns previously paid amounts, walking installments backwards
    Refund,
    /// pays out an overpayment credit balance
    CreditBalanceRefund,
    /// bank-initiated clawback of a settled payment
    Chargeback,
    /// pays a specific charge rather than the general waterfall
    ChargePayment,
    /// non-monetary income recognition; never enters the replay
    Accrual,
}

impl TransactionKind {
    /// kinds whose full amount counts as money paid in when computing the
    /// loan's overpaid balance
    pub fn is_repayment_like(&self) -> bool {
        matches!(
            self,
            TransactionKind::Repayment
                | TransactionKind::RecoveryRepayment
                | TransactionKind::ChargePayment
        )
    }

    /// kinds that consume an existing overpayment credit
    pub fn is_credit_class(&self) -> bool {
        matches!(
            self,
            TransactionKind::CreditBalanceRefund | TransactionKind::Chargeback
        )
    }
}

/// the four monetary components of an installment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    Principal,
    Interest,
    FeeCharges,
    PenaltyCharges,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Principal,
        Component::Interest,
        Component::FeeCharges,
        Component::PenaltyCharges,
    ];
}
