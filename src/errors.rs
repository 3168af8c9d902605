use thiserror::Error;

use crate::money::{CurrencyCode, Money};
use crate::types::{Component, TransactionKind};

/// all processing errors are fatal for the pass: the caller discards the
/// mutated state and retries only after fixing its inputs
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch {
        expected: CurrencyCode,
        actual: CurrencyCode,
    },

    #[error("allocation invariant violated on installment {installment}: {component:?} paid+waived+written-off exceeds due")]
    AllocationInvariantViolation {
        installment: u32,
        component: Component,
    },

    #[error("transaction kind {kind:?} has no replay semantics")]
    UnsupportedTransactionKind {
        kind: TransactionKind,
    },

    #[error("unknown allocation strategy: {code}")]
    UnknownAllocationStrategy {
        code: String,
    },

    #[error("invalid transaction amount: {amount}")]
    InvalidTransactionAmount {
        amount: Money,
    },

    #[error("refund of {requested} exceeds the {available} refundable from prior payments")]
    RefundExceedsPaidAmount {
        requested: Money,
        available: Money,
    },

    #[error("invalid currency code: {code}")]
    InvalidCurrencyCode {
        code: String,
    },
}

pub type Result<T> = std::result::Result<T, ProcessorError>;
