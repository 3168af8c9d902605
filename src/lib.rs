pub mod charges;
pub mod errors;
pub mod events;
pub mod money;
pub mod processor;
pub mod schedule;
pub mod strategy;
pub mod transaction;
pub mod types;

// re-export key types
pub use charges::{ChargeTime, InstallmentCharge, LoanCharge};
pub use errors::{ProcessorError, Result};
pub use events::{Event, EventStore};
pub use money::{Currency, CurrencyCode, Money, RoundingMode};
pub use processor::TransactionProcessor;
pub use schedule::{Installment, RepaymentSchedule};
pub use strategy::{
    AdvancePrincipalStrategy, AllocationStrategy, InterestFirstStrategy, PrincipalFirstStrategy,
    SharedStrategy, StandardStrategy, StrategyRegistry,
};
pub use transaction::{
    ChangedTransactionDetail, LoanTransaction, RelationKind, ScheduleMapping, TransactionLedger,
    TransactionRelation,
};
pub use types::{ChargeId, Component, TransactionId, TransactionKind};

// re-export external dependencies that users will need
pub use chrono;
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
