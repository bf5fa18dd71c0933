//! Tests for the operation catalog, priorities and status groupings

use fleetops_core::constants::*;
use fleetops_core::events::EventStatus;

#[test]
fn test_operation_identifiers() {
    assert_eq!(operations::PAYMENT_APPROVE, "payment.approve");
    assert_eq!(operations::PAYMENT_REJECT, "payment.reject");
    assert_eq!(operations::PAYMENT_REFUND, "payment.refund");
    assert_eq!(operations::CONTRACT_ACTIVATE, "contract.activate");
    assert_eq!(operations::INVOICE_ISSUE, "invoice.issue");
    assert_eq!(operations::FLEET_MOTO_SERVICE_DUE, "fleet.moto.service_due");
    assert_eq!(operations::INVENTORY_PART_RECEIVE, "inventory.part.receive");
    assert_eq!(operations::ACCOUNTING_PERIOD_CLOSE, "accounting.period.close");
}

#[test]
fn test_catalog_is_complete_and_unique() {
    assert_eq!(operations::ALL.len(), 16);

    let mut sorted: Vec<&str> = operations::ALL.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), operations::ALL.len(), "catalog has duplicates");

    for operation_id in operations::ALL {
        assert!(operations::is_known_operation(operation_id));
        // Identifiers are dot-delimited, lowercase, at least two segments
        assert!(operation_id.split('.').count() >= 2, "{operation_id}");
        assert_eq!(*operation_id, operation_id.to_lowercase());
        assert!(!operation_id.contains('*'));
    }
}

#[test]
fn test_unknown_identifiers_rejected() {
    assert!(!operations::is_known_operation(""));
    assert!(!operations::is_known_operation("payment"));
    assert!(!operations::is_known_operation("payment.approve.twice"));
    assert!(!operations::is_known_operation("payment.*"));
    assert!(!operations::is_known_operation("*"));
    assert!(!operations::is_known_operation("Payment.Approve"));
}

#[test]
fn test_priority_constants() {
    assert_eq!(priorities::DEFAULT_HANDLER_PRIORITY, 100);
    assert_eq!(priorities::METRICS_HANDLER_PRIORITY, 10_000);
    assert!(priorities::DEFAULT_HANDLER_PRIORITY < priorities::METRICS_HANDLER_PRIORITY);
}

#[test]
fn test_status_groups() {
    assert!(status_groups::ACTIVE_EVENT_STATES.contains(&EventStatus::Pending));
    assert!(status_groups::ACTIVE_EVENT_STATES.contains(&EventStatus::Processing));
    assert!(!status_groups::ACTIVE_EVENT_STATES.contains(&EventStatus::Completed));

    assert!(status_groups::TERMINAL_EVENT_STATES.contains(&EventStatus::Completed));
    assert!(status_groups::TERMINAL_EVENT_STATES.contains(&EventStatus::Failed));
    assert!(!status_groups::TERMINAL_EVENT_STATES.contains(&EventStatus::Pending));

    // The groups partition the status space
    for status in [
        EventStatus::Pending,
        EventStatus::Processing,
        EventStatus::Completed,
        EventStatus::Failed,
    ] {
        let active = status_groups::ACTIVE_EVENT_STATES.contains(&status);
        let terminal = status_groups::TERMINAL_EVENT_STATES.contains(&status);
        assert!(active != terminal);
        assert_eq!(status.is_terminal(), terminal);
    }
}

#[test]
fn test_typed_payloads_carry_their_operation() {
    use payloads::OperationPayload;

    assert_eq!(
        payloads::PaymentApproved::OPERATION_ID,
        operations::PAYMENT_APPROVE
    );
    assert_eq!(
        payloads::ContractActivated::OPERATION_ID,
        operations::CONTRACT_ACTIVATE
    );
    assert_eq!(
        payloads::MotoServiceDue::OPERATION_ID,
        operations::FLEET_MOTO_SERVICE_DUE
    );
    assert_eq!(
        payloads::AccountingPeriodClosed::OPERATION_ID,
        operations::ACCOUNTING_PERIOD_CLOSE
    );
}

#[test]
fn test_payload_serialization_shape() {
    let payload = payloads::PaymentApproved {
        payment_id: "pay-1".to_string(),
        contract_id: "ctr-1".to_string(),
        amount_cents: 45_000,
        currency: "EUR".to_string(),
    };

    let value = serde_json::to_value(&payload).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "payment_id": "pay-1",
            "contract_id": "ctr-1",
            "amount_cents": 45_000,
            "currency": "EUR",
        })
    );

    let back: payloads::PaymentApproved = serde_json::from_value(value).unwrap();
    assert_eq!(back, payload);
}
