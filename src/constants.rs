//! # Operation Catalog and System Constants
//!
//! The closed namespace of business operation identifiers, the handler
//! priority constants, and the status groupings the dispatcher relies on.
//!
//! Every emitted event must carry an identifier from [`operations`]; the
//! dispatcher rejects anything else before persisting. Reaction modules match
//! on these identifiers (exactly or by `domain.*` prefix), so renaming one is
//! a breaking change for every registered handler.

/// Closed catalog of business operation identifiers.
///
/// Dot-delimited, domain-first, verbs last. Wildcard patterns subscribe to a
/// whole domain (`"payment.*"`) or to everything (`"*"`).
pub mod operations {
    // Payment lifecycle
    pub const PAYMENT_APPROVE: &str = "payment.approve";
    pub const PAYMENT_REJECT: &str = "payment.reject";
    pub const PAYMENT_REFUND: &str = "payment.refund";

    // Rental contract lifecycle
    pub const CONTRACT_ACTIVATE: &str = "contract.activate";
    pub const CONTRACT_RENEW: &str = "contract.renew";
    pub const CONTRACT_CLOSE: &str = "contract.close";

    // Invoicing
    pub const INVOICE_ISSUE: &str = "invoice.issue";
    pub const INVOICE_SETTLE: &str = "invoice.settle";
    pub const INVOICE_VOID: &str = "invoice.void";

    // Fleet vehicle lifecycle
    pub const FLEET_MOTO_REGISTER: &str = "fleet.moto.register";
    pub const FLEET_MOTO_SERVICE_DUE: &str = "fleet.moto.service_due";
    pub const FLEET_MOTO_DECOMMISSION: &str = "fleet.moto.decommission";

    // Spare-part inventory
    pub const INVENTORY_PART_RECEIVE: &str = "inventory.part.receive";
    pub const INVENTORY_PART_CONSUME: &str = "inventory.part.consume";

    // Accounting
    pub const ACCOUNTING_ENTRY_CREATE: &str = "accounting.entry.create";
    pub const ACCOUNTING_PERIOD_CLOSE: &str = "accounting.period.close";

    /// Every identifier the engine accepts, in catalog order
    pub const ALL: &[&str] = &[
        PAYMENT_APPROVE,
        PAYMENT_REJECT,
        PAYMENT_REFUND,
        CONTRACT_ACTIVATE,
        CONTRACT_RENEW,
        CONTRACT_CLOSE,
        INVOICE_ISSUE,
        INVOICE_SETTLE,
        INVOICE_VOID,
        FLEET_MOTO_REGISTER,
        FLEET_MOTO_SERVICE_DUE,
        FLEET_MOTO_DECOMMISSION,
        INVENTORY_PART_RECEIVE,
        INVENTORY_PART_CONSUME,
        ACCOUNTING_ENTRY_CREATE,
        ACCOUNTING_PERIOD_CLOSE,
    ];

    /// Check an identifier against the catalog
    pub fn is_known_operation(operation_id: &str) -> bool {
        ALL.contains(&operation_id)
    }
}

/// Handler priority constants
pub mod priorities {
    /// Priority assigned when a registration does not specify one
    pub const DEFAULT_HANDLER_PRIORITY: i32 = 100;

    /// Priority of the built-in metrics aggregator.
    ///
    /// Metrics must observe every earlier handler's recorded failures, so it
    /// runs last. The registry warns when another handler registers at or
    /// beyond this value.
    pub const METRICS_HANDLER_PRIORITY: i32 = 10_000;
}

/// Status groupings for validation and logic
pub mod status_groups {
    use crate::events::EventStatus;

    /// Event statuses that indicate in-flight dispatch work
    pub const ACTIVE_EVENT_STATES: &[EventStatus] =
        &[EventStatus::Pending, EventStatus::Processing];

    /// Event statuses that are final; the store rejects transitions out of them
    pub const TERMINAL_EVENT_STATES: &[EventStatus] =
        &[EventStatus::Completed, EventStatus::Failed];
}

/// Typed payload shapes for emit sites that want schema guarantees.
///
/// The engine never inspects payloads; these exist so call sites can pair a
/// payload with its catalog identifier at compile time via
/// [`payloads::OperationPayload`] instead of hand-building JSON. Handlers
/// that know the operation can deserialize back into the same shape.
pub mod payloads {
    use chrono::NaiveDate;
    use serde::{Deserialize, Serialize};

    use super::operations;

    /// Ties a payload shape to the catalog identifier it belongs to
    pub trait OperationPayload: Serialize {
        /// Catalog identifier emitted with this payload
        const OPERATION_ID: &'static str;
    }

    /// A customer payment cleared review and was approved
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PaymentApproved {
        pub payment_id: String,
        pub contract_id: String,
        pub amount_cents: i64,
        pub currency: String,
    }

    impl OperationPayload for PaymentApproved {
        const OPERATION_ID: &'static str = operations::PAYMENT_APPROVE;
    }

    /// A previously captured payment was refunded
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PaymentRefunded {
        pub payment_id: String,
        pub contract_id: String,
        pub amount_cents: i64,
        pub reason: String,
    }

    impl OperationPayload for PaymentRefunded {
        const OPERATION_ID: &'static str = operations::PAYMENT_REFUND;
    }

    /// A rental contract went live
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ContractActivated {
        pub contract_id: String,
        pub customer_id: String,
        pub moto_id: String,
        pub start_date: NaiveDate,
    }

    impl OperationPayload for ContractActivated {
        const OPERATION_ID: &'static str = operations::CONTRACT_ACTIVATE;
    }

    /// An invoice was issued against a contract
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct InvoiceIssued {
        pub invoice_id: String,
        pub contract_id: String,
        pub total_cents: i64,
        pub due_date: NaiveDate,
    }

    impl OperationPayload for InvoiceIssued {
        const OPERATION_ID: &'static str = operations::INVOICE_ISSUE;
    }

    /// A fleet vehicle crossed its service interval
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct MotoServiceDue {
        pub moto_id: String,
        pub odometer_km: i64,
        pub service_kind: String,
    }

    impl OperationPayload for MotoServiceDue {
        const OPERATION_ID: &'static str = operations::FLEET_MOTO_SERVICE_DUE;
    }

    /// An accounting period was closed for posting
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct AccountingPeriodClosed {
        pub period: String,
        pub closed_by: String,
    }

    impl OperationPayload for AccountingPeriodClosed {
        const OPERATION_ID: &'static str = operations::ACCOUNTING_PERIOD_CLOSE;
    }
}
