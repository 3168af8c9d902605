use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{ChargeId, TransactionId};

/// all events that can be emitted during a replay pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // replay events
    TransactionReplayed {
        original: TransactionId,
        replacement: TransactionId,
        date: NaiveDate,
        amount: Money,
    },
    OverpaymentRecognized {
        transaction: TransactionId,
        amount: Money,
    },

    // schedule events
    AdditionalInstallmentScheduled {
        sequence: u32,
        due_date: NaiveDate,
        principal: Money,
    },
    AdditionalInstallmentRemoved {
        sequence: u32,
        due_date: NaiveDate,
    },
    CreditReapplied {
        transaction: TransactionId,
        installment: u32,
        amount: Money,
    },

    // charge events
    ChargePaymentApplied {
        transaction: TransactionId,
        charge: ChargeId,
        amount: Money,
    },

    // terminal events
    LoanWrittenOff {
        transaction: TransactionId,
        principal: Money,
        interest: Money,
        fee_charges: Money,
        penalty_charges: Money,
    },
}

/// event store for collecting events during a replay pass
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use uuid::Uuid;

    #[test]
    fn test_take_events_drains_store() {
        let usd = Currency::of("USD", 2).unwrap();
        let mut store = EventStore::new();

        store.emit(Event::OverpaymentRecognized {
            transaction: Uuid::new_v4(),
            amount: Money::from_major(200, usd),
        });
        assert_eq!(store.events().len(), 1);

        let drained = store.take_events();
        assert_eq!(drained.len(), 1);
        assert!(store.events().is_empty());
    }

    #[test]
    fn test_events_serialize_for_audit_consumers() {
        let usd = Currency::of("USD", 2).unwrap();
        let event = Event::AdditionalInstallmentScheduled {
            sequence: 13,
            due_date: chrono::NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            principal: Money::from_major(150, usd),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["AdditionalInstallmentScheduled"]["sequence"], 13);
        assert_eq!(
            value["AdditionalInstallmentScheduled"]["due_date"],
            "2024-07-01"
        );
    }
}
