use proptest::prelude::*;

use fleetops_core::constants::operations;

/// Strategy drawing one identifier from the operation catalog
pub fn catalog_operation_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(operations::ALL.to_vec()).prop_map(String::from)
}

/// Strategy for a single lowercase identifier segment
pub fn segment_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}"
}

/// Strategy for dot-delimited operation-shaped identifiers (not
/// necessarily in the catalog)
pub fn operation_shaped_id_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(segment_strategy(), 1..=4).prop_map(|segments| segments.join("."))
}

/// Strategy for handler priorities across the whole useful range
pub fn priority_strategy() -> impl Strategy<Value = i32> {
    -1_000i32..=20_000
}

/// Strategy for small opaque JSON payloads
pub fn payload_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::json!({})),
        Just(serde_json::json!({ "amount_cents": 125_000, "currency": "EUR" })),
        Just(serde_json::json!({ "moto_id": "moto-77", "odometer_km": 18_250 })),
        Just(serde_json::json!({ "nested": { "items": [1, 2, 3] } })),
        Just(serde_json::json!({ "note": "manual adjustment", "approved": true })),
    ]
}
