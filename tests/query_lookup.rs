//! Query lookup, validation and execution tests
//!
//! Test Categories:
//! 1. Idempotent save and resume
//! 2. Validation failures
//! 3. Deterministic SQL and results
//! 4. Order reversal

use std::sync::Arc;

use serde_json::{json, Value};

use mycoquery::backend::{Row, ScriptedBackend};
use mycoquery::query::{
    reverse_order, Flavor, ParamValue, QueryArgs, QueryEngine, QueryErrorCode, RawParam, SqlOverrides,
};
use mycoquery::schema::{MemDirectory, ModelKind};
use mycoquery::store::QueryStore;

fn directory() -> MemDirectory {
    MemDirectory::new()
        .with(ModelKind::User, 2, &[("login", Value::from("rolf"))])
        .with(ModelKind::Location, 7, &[("name", Value::from("Burbank, California"))])
        .with_name(3, "Agaricus campestris", "Species", None, None)
}

fn engine(backend: ScriptedBackend) -> QueryEngine {
    QueryEngine::in_memory(Arc::new(backend), Arc::new(directory()))
}

// =============================================================================
// IDEMPOTENT SAVE
// =============================================================================

/// Equivalent arguments, spelled differently, intern to one record.
#[test]
fn test_equivalent_arguments_share_a_token() {
    let engine = engine(ScriptedBackend::new());

    let a = engine
        .lookup_and_save(ModelKind::Observation, "by_user", QueryArgs::new().with("user", 2))
        .unwrap();
    let b = engine
        .lookup_and_save(
            ModelKind::Observation,
            "by_user",
            QueryArgs::new()
                .with("user", "2")
                .with("title", RawParam::Null),
        )
        .unwrap();
    let c = engine
        .lookup_and_save(
            ModelKind::Observation,
            "by_user",
            QueryArgs::new().with("user", RawParam::entity(ModelKind::User, 2)),
        )
        .unwrap();

    assert_eq!(a.record_id(), b.record_id());
    assert_eq!(a.record_id(), c.record_id());
    assert_eq!(engine.store().count().unwrap(), 1);
}

/// Different params never collide.
#[test]
fn test_different_arguments_get_different_tokens() {
    let engine = engine(ScriptedBackend::new());
    let a = engine
        .lookup_and_save(ModelKind::Name, "all", QueryArgs::new().with("by", "created"))
        .unwrap();
    let b = engine
        .lookup_and_save(ModelKind::Name, "all", QueryArgs::new().with("by", "modified"))
        .unwrap();
    assert_ne!(a.record_id(), b.record_id());
}

/// A resumed query is the same query, and the resume is recorded.
#[test]
fn test_resume_by_token() {
    let engine = engine(ScriptedBackend::new());
    let saved = engine
        .lookup_and_save(ModelKind::Observation, "at_location", QueryArgs::new().with("location", 7))
        .unwrap();
    let token = saved.record_id().unwrap();

    let resumed = engine.find_saved(token).unwrap();
    assert!(resumed.same_descriptor(&saved));
    assert_eq!(resumed.sql().unwrap(), saved.sql().unwrap());

    engine.find_saved(token).unwrap();
    assert_eq!(engine.store().find(token).unwrap().unwrap().access_count, 2);
}

// =============================================================================
// VALIDATION
// =============================================================================

#[test]
fn test_unknown_flavor_is_a_config_error() {
    let engine = engine(ScriptedBackend::new());
    let err = engine
        .lookup(ModelKind::User, "of_children", QueryArgs::new())
        .unwrap_err();
    assert_eq!(err.code(), QueryErrorCode::UnknownFlavor);
    assert!(err.is_config_error());
}

#[test]
fn test_unknown_and_missing_params() {
    let engine = engine(ScriptedBackend::new());

    let err = engine
        .lookup(ModelKind::Name, "all", QueryArgs::new().with("colour", "red"))
        .unwrap_err();
    assert_eq!(err.code(), QueryErrorCode::UnknownParam);

    let err = engine
        .lookup(ModelKind::Observation, "by_user", QueryArgs::new())
        .unwrap_err();
    assert_eq!(err.code(), QueryErrorCode::MissingParam);
}

#[test]
fn test_bad_values_name_the_param() {
    let engine = engine(ScriptedBackend::new());

    let err = engine
        .lookup(ModelKind::Observation, "by_user", QueryArgs::new().with("user", "rolf!"))
        .unwrap_err();
    assert_eq!(err.code(), QueryErrorCode::BadValue);
    assert_eq!(err.param(), Some("user"));
    assert!(!err.is_config_error());

    let err = engine
        .lookup(ModelKind::Observation, "all", QueryArgs::new().with("has_comments", "no"))
        .unwrap_err();
    assert_eq!(err.code(), QueryErrorCode::NotInAllowedSet);
    assert_eq!(err.allowed(), &["yes".to_string()]);
}

#[test]
fn test_missing_entity_is_not_found() {
    let engine = engine(ScriptedBackend::new());
    let err = engine
        .lookup(ModelKind::Observation, "by_user", QueryArgs::new().with("user", 99))
        .unwrap_err();
    assert_eq!(err.code(), QueryErrorCode::NotFound);
}

#[test]
fn test_bad_sort_order() {
    let engine = engine(ScriptedBackend::new());
    let err = engine
        .lookup(ModelKind::Name, "all", QueryArgs::new().with("by", "colour"))
        .unwrap_err();
    assert_eq!(err.code(), QueryErrorCode::BadSortOrder);
}

/// Arguments can arrive as JSON, as a CLI or API would pass them.
#[test]
fn test_lookup_from_json_arguments() {
    let engine = engine(ScriptedBackend::new());
    let args = QueryArgs::from_json(&json!({"ids": [5, 3, 5, 4], "by": "name"})).unwrap();
    let query = engine.lookup(ModelKind::Name, "in_set", args).unwrap();
    assert_eq!(query.flavor(), Flavor::InSet);
    assert_eq!(
        query.params().get("ids"),
        Some(&ParamValue::IntList(vec![5, 3, 5, 4]))
    );
}

// =============================================================================
// DETERMINISM
// =============================================================================

#[test]
fn test_sql_is_deterministic() {
    let engine = engine(ScriptedBackend::new());
    let args = QueryArgs::new()
        .with("users", vec![2])
        .with("date", vec!["2012", "2013-06"])
        .with("has_images", true);
    let a = engine.lookup(ModelKind::Observation, "all", args.clone()).unwrap();
    let b = engine.lookup(ModelKind::Observation, "all", args).unwrap();

    let sql = a.sql().unwrap();
    assert_eq!(sql, b.sql().unwrap());
    assert!(sql.starts_with("SELECT DISTINCT observations.id FROM `observations`"));
    assert!(sql.contains("observations.user_id IN (2)"));
    assert!(sql.contains("observations.when >= '2012-01-01'"));
    assert!(sql.contains("observations.when <= '2013-06-31'"));
}

#[test]
fn test_in_set_keeps_caller_order_without_a_query() {
    let backend = Arc::new(ScriptedBackend::new());
    let engine = QueryEngine::in_memory(backend.clone(), Arc::new(directory()));
    let mut query = engine
        .lookup(ModelKind::Name, "in_set", QueryArgs::new().with("ids", vec![9, 3, 6]))
        .unwrap();
    assert_eq!(query.result_ids().unwrap(), vec![9, 3, 6]);
    assert_eq!(backend.execution_count(), 0);
    assert!(query
        .sql()
        .unwrap()
        .contains("ORDER BY FIND_IN_SET(names.id,'9,3,6') ASC"));
}

#[test]
fn test_results_are_cached_per_query() {
    let backend = Arc::new(ScriptedBackend::new().ids(&["FROM `names`"], &[4, 2, 8]));
    let engine = QueryEngine::in_memory(backend.clone(), Arc::new(directory()));
    let mut query = engine.lookup(ModelKind::Name, "all", QueryArgs::new()).unwrap();

    assert_eq!(query.result_ids().unwrap(), vec![4, 2, 8]);
    assert_eq!(query.num_results().unwrap(), 3);
    assert_eq!(query.index_of(8).unwrap(), Some(2));
    assert_eq!(backend.execution_count(), 1);

    query.clear_cache();
    query.result_ids().unwrap();
    assert_eq!(backend.execution_count(), 2);
}

#[test]
fn test_backend_errors_propagate() {
    let engine = engine(ScriptedBackend::new().fail(&["FROM `names`"], "table is locked"));
    let mut query = engine.lookup(ModelKind::Name, "all", QueryArgs::new()).unwrap();
    let err = query.result_ids().unwrap_err();
    assert_eq!(err.code(), QueryErrorCode::Backend);
    assert!(err.backend_error().is_some());
}

#[test]
fn test_hydrated_records() {
    let backend = ScriptedBackend::new().rule(
        &["SELECT DISTINCT names.*"],
        vec![
            Row::new().with("id", 3).with("text_name", "Agaricus campestris"),
            Row::new().with("id", 1).with("text_name", "Fungi"),
        ],
    );
    let engine = engine(backend);
    let mut query = engine
        .lookup(ModelKind::Name, "in_set", QueryArgs::new().with("ids", vec![3, 1]))
        .unwrap();
    let records = query.results().unwrap();
    let names: Vec<_> = records.iter().map(|r| r.get("text_name").cloned()).collect();
    assert_eq!(
        names,
        vec![Some(Value::from("Agaricus campestris")), Some(Value::from("Fungi"))]
    );
}

// =============================================================================
// ORDER REVERSAL
// =============================================================================

#[test]
fn test_reverse_order_is_an_involution() {
    for order in [
        "names.sort_name ASC",
        "observations.when DESC, observations.id DESC",
        "FIND_IN_SET(names.id,'1,2') ASC, names.id",
    ] {
        let once = reverse_order(order);
        assert_ne!(once, order);
        assert_eq!(reverse_order(&reverse_order(&once)), once);
    }
}

#[test]
fn test_reverse_override_flips_the_query_order() {
    let engine = engine(ScriptedBackend::new());
    let query = engine
        .lookup(ModelKind::Name, "all", QueryArgs::new().with("by", "created"))
        .unwrap();
    let forward = query.sql().unwrap();
    let backward = query.sql_with(&SqlOverrides::new().reverse()).unwrap();
    assert_ne!(forward, backward);
    assert!(forward.contains("names.created DESC"));
    assert!(backward.contains("names.created ASC"));
}

/// Ordering by a joined table's id can tie; the model's own id breaks it.
#[test]
fn test_joined_id_order_keeps_model_tiebreak() {
    let engine = engine(ScriptedBackend::new());
    let query = engine
        .lookup(
            ModelKind::Observation,
            "all",
            QueryArgs::new().with("join", "names").with("order", "names.id ASC"),
        )
        .unwrap();
    let sql = query.sql().unwrap();
    assert!(sql.contains("JOIN `names`"));
    assert!(sql.ends_with("ORDER BY names.id ASC, observations.id DESC"));
}
