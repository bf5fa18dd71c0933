//! End-to-end dispatch tests: pattern routing, ordering, fault isolation,
//! retries, causal chains and background draining.

mod common;

use common::*;
use std::sync::Arc;

use fleetops_core::constants::{operations, payloads::PaymentRefunded};
use fleetops_core::events::{EmitRequest, EventBus, EventStatus};
use fleetops_core::registry::RegisterOptions;
use fleetops_core::store::{EventStore, MemoryEventStore};
use fleetops_core::EngineError;

fn quiet_bus(store: Arc<MemoryEventStore>) -> fleetops_core::events::EventBusBuilder {
    EventBus::builder(store).metrics_enabled(false)
}

#[tokio::test]
async fn test_routing_across_pattern_kinds() {
    let store = Arc::new(MemoryEventStore::new());
    let log = invocation_log();
    let bus = quiet_bus(store)
        .register(
            operations::PAYMENT_APPROVE,
            RecordingHandler::new("exact", log.clone()),
            RegisterOptions::default().priority(10),
        )
        .register(
            "payment.*",
            RecordingHandler::new("domain", log.clone()),
            RegisterOptions::default().priority(20),
        )
        .register(
            "*",
            RecordingHandler::new("universal", log.clone()),
            RegisterOptions::default().priority(30),
        )
        .register(
            "contract.*",
            RecordingHandler::new("other_domain", log.clone()),
            RegisterOptions::default().priority(5),
        )
        .build();

    let event = bus
        .emit_sync(EmitRequest::new(operations::PAYMENT_APPROVE, "payment", "pay-1"))
        .await
        .unwrap();

    assert_eq!(event.status, EventStatus::Completed);
    assert_eq!(handler_order(&log), vec!["exact", "domain", "universal"]);
}

#[tokio::test]
async fn test_three_segment_operations_match_two_level_prefix() {
    let store = Arc::new(MemoryEventStore::new());
    let log = invocation_log();
    let bus = quiet_bus(store)
        .register(
            "fleet.*",
            RecordingHandler::new("fleet_watch", log.clone()),
            RegisterOptions::default(),
        )
        .register(
            "fleet.moto.*",
            RecordingHandler::new("moto_watch", log.clone()),
            RegisterOptions::default().priority(200),
        )
        .build();

    bus.emit_sync(EmitRequest::new(
        operations::FLEET_MOTO_SERVICE_DUE,
        "moto",
        "moto-9",
    ))
    .await
    .unwrap();

    assert_eq!(handler_order(&log), vec!["fleet_watch", "moto_watch"]);
}

#[tokio::test]
async fn test_typed_payload_emission_round_trips() {
    let store = Arc::new(MemoryEventStore::new());
    let log = invocation_log();
    let bus = quiet_bus(store)
        .register(
            "payment.*",
            RecordingHandler::new("refund_watch", log.clone()),
            RegisterOptions::default(),
        )
        .build();

    let refund = PaymentRefunded {
        payment_id: "pay-31".to_string(),
        contract_id: "ctr-8".to_string(),
        amount_cents: 4_500,
        reason: "returned early".to_string(),
    };
    let event = bus
        .emit_sync(
            EmitRequest::from_payload("payment", "pay-31", &refund)
                .unwrap()
                .with_user_id("ops-2"),
        )
        .await
        .unwrap();

    // The operation id comes from the payload schema, not the call site
    assert_eq!(event.operation_id, operations::PAYMENT_REFUND);
    assert_eq!(event.status, EventStatus::Completed);
    assert_eq!(event.payload, serde_json::to_value(&refund).unwrap());
    assert_eq!(event.user_id.as_deref(), Some("ops-2"));
    assert_eq!(handler_order(&log), vec!["refund_watch"]);
}

#[tokio::test]
async fn test_multiple_failures_accumulate_in_execution_order() {
    let store = Arc::new(MemoryEventStore::new());
    let log = invocation_log();
    let first_fail = FailingHandler::always("notify_customer", log.clone());
    let second_fail = FailingHandler::always("sync_ledger", log.clone());
    let bus = quiet_bus(store)
        .register(
            operations::INVOICE_VOID,
            first_fail,
            RegisterOptions::default().priority(10),
        )
        .register(
            operations::INVOICE_VOID,
            RecordingHandler::new("archive", log.clone()),
            RegisterOptions::default().priority(20),
        )
        .register(
            operations::INVOICE_VOID,
            second_fail,
            RegisterOptions::default().priority(30),
        )
        .build();

    let event = bus
        .emit_sync(EmitRequest::new(operations::INVOICE_VOID, "invoice", "inv-3"))
        .await
        .unwrap();

    assert_eq!(event.status, EventStatus::Failed);
    assert_eq!(
        handler_order(&log),
        vec!["notify_customer", "archive", "sync_ledger"]
    );

    let failures = event.failures();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].handler, "notify_customer");
    assert_eq!(failures[1].handler, "sync_ledger");
    assert_eq!(failures[0].message, "notify_customer attempt 1 failed");
}

#[tokio::test]
async fn test_mixed_retry_and_permanent_failure() {
    let store = Arc::new(MemoryEventStore::new());
    let log = invocation_log();
    let recovers = FailingHandler::new("flaky_webhook", 1, log.clone());
    let permanent = FailingHandler::always("broken_export", log.clone());
    let bus = quiet_bus(store)
        .register(
            operations::PAYMENT_REFUND,
            recovers.clone(),
            RegisterOptions::default().priority(10).retry_on_fail(),
        )
        .register(
            operations::PAYMENT_REFUND,
            permanent.clone(),
            RegisterOptions::default().priority(20).retry_on_fail(),
        )
        .build();

    let event = bus
        .emit_sync(EmitRequest::new(operations::PAYMENT_REFUND, "payment", "pay-7"))
        .await
        .unwrap();

    assert_eq!(event.status, EventStatus::Failed);
    assert_eq!(recovers.attempts(), 2);
    assert_eq!(permanent.attempts(), 2);

    // Only the permanently failing handler lands in the failure list,
    // and it keeps the first attempt's message
    let failures = event.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].handler, "broken_export");
    assert_eq!(
        failures[0].message,
        "failed after retry: broken_export attempt 1 failed"
    );
}

#[tokio::test]
async fn test_panic_isolation_preserves_rest_of_chain() {
    let store = Arc::new(MemoryEventStore::new());
    let log = invocation_log();
    let bus = quiet_bus(store)
        .register(
            operations::CONTRACT_CLOSE,
            PanickingHandler::new("deposit_release", "deposit service offline"),
            RegisterOptions::default().priority(10),
        )
        .register(
            operations::CONTRACT_CLOSE,
            RecordingHandler::new("final_invoice", log.clone()),
            RegisterOptions::default().priority(20),
        )
        .build();

    let event = bus
        .emit_sync(EmitRequest::new(operations::CONTRACT_CLOSE, "contract", "ctr-4"))
        .await
        .unwrap();

    assert_eq!(event.status, EventStatus::Failed);
    assert_eq!(handler_order(&log), vec!["final_invoice"]);
    assert_eq!(
        event.failures()[0].message,
        "Handler panicked: deposit service offline"
    );
}

#[tokio::test]
async fn test_unknown_operation_rejected() {
    let store = Arc::new(MemoryEventStore::new());
    let bus = quiet_bus(store.clone()).build();

    let err = bus
        .emit_sync(EmitRequest::new("garage.paint", "moto", "moto-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::UnknownOperation(ref op) if op == "garage.paint"));
    assert_eq!(store.event_count(), 0);
}

#[tokio::test]
async fn test_background_emission_settles_after_drain() {
    let store = Arc::new(MemoryEventStore::new());
    let log = invocation_log();
    let bus = quiet_bus(store.clone())
        .register(
            "invoice.*",
            RecordingHandler::new("pdf_render", log.clone()),
            RegisterOptions::default(),
        )
        .build();

    let mut pending_ids = Vec::new();
    for i in 0..5 {
        let event = bus
            .emit(EmitRequest::new(
                operations::INVOICE_ISSUE,
                "invoice",
                format!("inv-{i}"),
            ))
            .await
            .unwrap();
        assert_eq!(event.status, EventStatus::Pending);
        pending_ids.push(event.id);
    }

    bus.drain().await;
    assert_eq!(bus.in_flight(), 0);
    assert_eq!(log.lock().len(), 5);

    for event_id in pending_ids {
        let stored = store.get_event(event_id).await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::Completed);
        assert!(stored.processed_at.is_some());
    }
}

#[tokio::test]
async fn test_handler_emitting_child_event_is_drained() {
    let store = Arc::new(MemoryEventStore::new());
    let log = invocation_log();
    let bus = quiet_bus(store.clone())
        .register(
            operations::INVOICE_SETTLE,
            RecordingHandler::new("ledger_post", log.clone()),
            RegisterOptions::default(),
        )
        .build();

    // Settling a contract payment spawns an invoice-settle follow-up
    let chain_bus = bus.clone();
    bus.register_fn(
        operations::PAYMENT_APPROVE,
        "settle_invoice",
        move |ctx| {
            let bus = chain_bus.clone();
            async move {
                bus.emit(
                    EmitRequest::new(operations::INVOICE_SETTLE, "invoice", "inv-11")
                        .with_parent_event(ctx.event_id()),
                )
                .await?;
                Ok(())
            }
        },
        RegisterOptions::default(),
    );

    let parent = bus
        .emit(EmitRequest::new(operations::PAYMENT_APPROVE, "payment", "pay-11"))
        .await
        .unwrap();

    bus.drain().await;

    let children = store.child_events(parent.id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].operation_id, operations::INVOICE_SETTLE);
    assert_eq!(children[0].status, EventStatus::Completed);
    assert_eq!(handler_order(&log), vec!["ledger_post"]);
}

#[tokio::test]
async fn test_entity_history_is_newest_first() {
    let store = Arc::new(MemoryEventStore::new());
    let bus = quiet_bus(store.clone()).build();

    for operation_id in [
        operations::CONTRACT_ACTIVATE,
        operations::CONTRACT_RENEW,
        operations::CONTRACT_CLOSE,
    ] {
        bus.emit_sync(EmitRequest::new(operation_id, "contract", "ctr-9"))
            .await
            .unwrap();
        // MemoryEventStore orders by created_at; keep the stamps distinct
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let history = store.events_for_entity("contract", "ctr-9").await.unwrap();
    let ids: Vec<&str> = history.iter().map(|e| e.operation_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            operations::CONTRACT_CLOSE,
            operations::CONTRACT_RENEW,
            operations::CONTRACT_ACTIVATE,
        ]
    );
}

#[tokio::test]
async fn test_finalize_failure_in_background_leaves_processing() {
    let store = Arc::new(UnreliableStore::new());
    let log = invocation_log();
    let bus = EventBus::builder(store.clone())
        .metrics_enabled(false)
        .register(
            operations::PAYMENT_REJECT,
            RecordingHandler::new("notify", log.clone()),
            RegisterOptions::default(),
        )
        .build();

    store.fail_finalize(true);
    let event = bus
        .emit(EmitRequest::new(operations::PAYMENT_REJECT, "payment", "pay-2"))
        .await
        .unwrap();
    bus.drain().await;

    // The handler ran, but the terminal write was lost; the record stays
    // visible as in-flight rather than silently completed
    assert_eq!(handler_order(&log), vec!["notify"]);
    let stored = store.get_event(event.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EventStatus::Processing);

    // Blocking mode surfaces the same fault to the caller
    let err = bus
        .emit_sync(EmitRequest::new(operations::PAYMENT_REJECT, "payment", "pay-3"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(_)));
}
