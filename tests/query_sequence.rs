//! Cursor and chaining tests
//!
//! Test Categories:
//! 1. Cursor laws on a single query
//! 2. Inner/outer chaining across observations

use std::sync::Arc;

use serde_json::Value;

use mycoquery::backend::ScriptedBackend;
use mycoquery::query::{Moved, Query, QueryArgs, QueryEngine};
use mycoquery::schema::{MemDirectory, ModelKind};

// =============================================================================
// CURSOR LAWS
// =============================================================================

fn names(ids: &[i64]) -> Query {
    let backend = ScriptedBackend::new().ids(&["FROM `names`"], ids);
    QueryEngine::in_memory(Arc::new(backend), Arc::new(MemDirectory::new()))
        .lookup(ModelKind::Name, "all", QueryArgs::new())
        .unwrap()
}

/// next then prev returns to the same id away from the ends.
#[test]
fn test_next_prev_round_trip() {
    let mut query = names(&[5, 6, 7, 8]);
    for id in [5, 6, 7] {
        query.set_current_id(Some(id));
        assert!(query.next(false).unwrap().is_some());
        assert!(query.prev(false).unwrap().is_some());
        assert_eq!(query.current_id(), Some(id));
    }
}

#[test]
fn test_walk_covers_every_result_in_order() {
    let mut query = names(&[5, 6, 7, 8]);
    let mut seen = Vec::new();
    let mut moved = query.first(false).unwrap();
    while moved.is_some() {
        seen.push(query.current_id().unwrap());
        moved = query.next(false).unwrap();
    }
    assert_eq!(seen, vec![5, 6, 7, 8]);

    query.last(false).unwrap();
    assert_eq!(query.current_id(), Some(8));
}

#[test]
fn test_single_result() {
    let mut query = names(&[42]);
    query.first(false).unwrap();
    assert_eq!(query.current_id(), Some(42));
    assert!(query.next(false).unwrap().is_none());
    assert!(query.prev(false).unwrap().is_none());
    assert_eq!(query.current_id(), Some(42));
}

/// reset goes back to the id placed with set_current_id, however the
/// cursor moved since.
#[test]
fn test_reset_after_moves_and_jumps() {
    let mut query = names(&[5, 6, 7, 8]);
    query.set_current_id(Some(7));
    query.prev(false).unwrap();
    assert_eq!(query.current_id(), Some(6));
    query.next(false).unwrap();
    query.next(false).unwrap();
    assert_eq!(query.current_id(), Some(8));
    query.last(false).unwrap();
    query.first(false).unwrap();
    assert_eq!(query.current_id(), Some(5));
    query.reset();
    assert_eq!(query.current_id(), Some(7));
}

#[test]
fn test_no_cursor_means_no_move() {
    let mut query = names(&[1, 2]);
    assert!(query.next(false).unwrap().is_none());
    assert!(query.current().unwrap().is_none());
}

// =============================================================================
// CHAINING
// =============================================================================

/// Observations 1 and 3 have images, 2 has none.
fn chained_engine() -> QueryEngine {
    let backend = ScriptedBackend::new()
        .ids(&["images_observations.observation_id = '1'"], &[10, 11])
        .ids(&["images_observations.observation_id = '2'"], &[])
        .ids(&["images_observations.observation_id = '3'"], &[30])
        .ids(&["FROM `observations`", "`images_observations`"], &[1, 2, 3]);
    let directory = MemDirectory::new()
        .with(ModelKind::Observation, 1, &[("notes", Value::from("one"))])
        .with(ModelKind::Observation, 2, &[("notes", Value::from("two"))])
        .with(ModelKind::Observation, 3, &[("notes", Value::from("three"))]);
    QueryEngine::in_memory(Arc::new(backend), Arc::new(directory))
}

fn inner(engine: &QueryEngine, observation: i64) -> Query {
    let outer = engine
        .lookup_and_save(ModelKind::Observation, "all", QueryArgs::new())
        .unwrap();
    engine
        .lookup(
            ModelKind::Image,
            "inside_observation",
            QueryArgs::new()
                .with("observation", observation)
                .with("outer", outer.record_id().unwrap()),
        )
        .unwrap()
}

fn into(moved: Option<Moved>) -> Query {
    match moved {
        Some(Moved::Into(query)) => *query,
        other => panic!("expected to cross into a new inner query, got {:?}", other),
    }
}

#[test]
fn test_inner_query_knows_its_outer() {
    let engine = chained_engine();
    let mut query = inner(&engine, 1);
    assert!(query.has_outer());
    assert_eq!(query.outer_current_id(), Some(1));
    let outer = query.outer().unwrap().unwrap();
    assert_eq!(outer.model(), ModelKind::Observation);
    assert_eq!(outer.current_id(), Some(1));
}

#[test]
fn test_next_crosses_and_skips_empty_observations() {
    let engine = chained_engine();
    let mut query = inner(&engine, 1);
    query.set_current_id(Some(10));

    assert!(matches!(query.next(false).unwrap(), Some(Moved::InPlace)));
    assert_eq!(query.current_id(), Some(11));

    let mut third = into(query.next(false).unwrap());
    assert_eq!(third.outer_current_id(), Some(3));
    assert_eq!(third.current_id(), Some(30));
    assert!(third.is_saved());

    let back = into(third.prev(false).unwrap());
    assert_eq!(back.outer_current_id(), Some(1));
    assert_eq!(back.current_id(), Some(11));
}

#[test]
fn test_chain_ends_stay_put() {
    let engine = chained_engine();
    let mut query = inner(&engine, 3);
    query.set_current_id(Some(30));
    assert!(query.next(false).unwrap().is_none());
    assert_eq!(query.current_id(), Some(30));
    assert_eq!(query.outer().unwrap().unwrap().current_id(), Some(3));
}

#[test]
fn test_skip_outer_stays_inside() {
    let engine = chained_engine();
    let mut query = inner(&engine, 1);
    query.set_current_id(Some(11));
    assert!(query.next(true).unwrap().is_none());
    assert_eq!(query.current_id(), Some(11));
}

#[test]
fn test_first_and_last_span_the_chain() {
    let engine = chained_engine();
    let mut query = inner(&engine, 3);

    let first = into(query.first(false).unwrap());
    assert_eq!(first.outer_current_id(), Some(1));
    assert_eq!(first.current_id(), Some(10));

    let mut query = inner(&engine, 1);
    let last = into(query.last(false).unwrap());
    assert_eq!(last.outer_current_id(), Some(3));
    assert_eq!(last.current_id(), Some(30));
}
