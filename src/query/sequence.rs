//! Cursor movement and inner/outer chaining
//!
//! The cursor is a `current_id` within the ordered results, plus the id
//! `reset` returns to. Moving never changes the results themselves.
//!
//! An `Image :inside_observation` query is the inner half of a chain: its
//! `outer` param is the token of an Observation query. Stepping off either
//! end of the inner query moves the outer cursor and hands back a fresh
//! inner query for the new observation, skipping observations whose inner
//! query is empty.

use super::errors::{QueryError, QueryResult};
use super::query::Query;
use super::results::Record;
use crate::schema::{JoinTree, ModelKind};

/// Outcome of a successful cursor move.
#[derive(Debug)]
pub enum Moved {
    /// The cursor of the query itself moved
    InPlace,
    /// The chain crossed into a new inner query, already positioned
    Into(Box<Query>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

impl Direction {
    fn reverse(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

impl Query {
    pub fn current_id(&self) -> Option<i64> {
        self.current_id
    }

    /// Place the cursor. This also becomes the position `reset` returns to.
    pub fn set_current_id(&mut self, id: Option<i64>) {
        self.current_id = id;
        self.saved_current_id = id;
    }

    /// Return to the last explicitly placed position.
    pub fn reset(&mut self) {
        self.current_id = self.saved_current_id;
    }

    /// The record under the cursor.
    pub fn current(&mut self) -> QueryResult<Option<Record>> {
        match self.current_id {
            Some(id) => Ok(self.instantiate(&[id], &[])?.into_iter().next()),
            None => Ok(None),
        }
    }

    pub fn has_outer(&self) -> bool {
        self.outer_id.is_some()
    }

    /// The observation this inner query is positioned on.
    pub fn outer_current_id(&self) -> Option<i64> {
        if self.has_outer() {
            self.descriptor.get_int("observation")
        } else {
            None
        }
    }

    /// The outer query, loaded from the store on first use. It is tweaked
    /// to skip observations without images and positioned on this query's
    /// observation.
    pub fn outer(&mut self) -> QueryResult<Option<&mut Query>> {
        let outer_id = match self.outer_id {
            Some(id) => id,
            None => return Ok(None),
        };
        if self.outer.is_none() {
            let mut outer = self.engine.load_saved(outer_id)?;
            if outer.model() != ModelKind::Observation {
                return Err(QueryError::bad_value(
                    "outer",
                    format!("must be an Observation query, got {}", outer.model()),
                ));
            }
            outer.clauses.add_join(JoinTree::leaf("images_observations"));
            outer.clear_cache();
            outer.set_current_id(self.outer_current_id());
            self.outer = Some(Box::new(outer));
        }
        Ok(self.outer.as_deref_mut())
    }

    pub fn first(&mut self, skip_outer: bool) -> QueryResult<Option<Moved>> {
        self.end(Direction::Backward, skip_outer)
    }

    pub fn last(&mut self, skip_outer: bool) -> QueryResult<Option<Moved>> {
        self.end(Direction::Forward, skip_outer)
    }

    pub fn next(&mut self, skip_outer: bool) -> QueryResult<Option<Moved>> {
        self.step(Direction::Forward, skip_outer)
    }

    pub fn prev(&mut self, skip_outer: bool) -> QueryResult<Option<Moved>> {
        self.step(Direction::Backward, skip_outer)
    }

    /// Jump to one end. With an outer query, the outer moves to the same
    /// end first and the first non-empty inner query wins.
    fn end(&mut self, direction: Direction, skip_outer: bool) -> QueryResult<Option<Moved>> {
        if self.has_outer() && !skip_outer {
            let outer_moved = match self.outer()? {
                Some(outer) => match direction {
                    Direction::Forward => outer.last(false)?,
                    Direction::Backward => outer.first(false)?,
                },
                None => None,
            };
            if outer_moved.is_none() {
                return Ok(None);
            }
            // The outer's own end may have an empty inner; walk inward.
            return self.cross_outer(direction.reverse(), direction, true);
        }

        let ids = self.result_ids()?;
        let id = match direction {
            Direction::Forward => ids.last(),
            Direction::Backward => ids.first(),
        };
        match id {
            Some(id) => {
                self.current_id = Some(*id);
                Ok(Some(Moved::InPlace))
            }
            None => Ok(None),
        }
    }

    /// Move one position; at a boundary, cross into the next inner query
    /// if there is an outer.
    fn step(&mut self, direction: Direction, skip_outer: bool) -> QueryResult<Option<Moved>> {
        let ids = self.result_ids()?;
        let current = match self.current_id {
            Some(id) => id,
            None => return Ok(None),
        };
        let index = match ids.iter().position(|id| *id == current) {
            Some(index) => index,
            None => return Ok(None),
        };
        let neighbor = match direction {
            Direction::Forward => ids.get(index + 1),
            Direction::Backward => index.checked_sub(1).and_then(|i| ids.get(i)),
        };
        if let Some(id) = neighbor {
            self.current_id = Some(*id);
            return Ok(Some(Moved::InPlace));
        }
        if self.has_outer() && !skip_outer {
            // Stepping forward enters the next inner query at its start.
            return self.cross_outer(direction, direction.reverse(), false);
        }
        Ok(None)
    }

    /// Walk the outer cursor in `outer_direction` until an observation with
    /// a non-empty inner query turns up. The new inner is positioned at its
    /// last result for `Forward` and its first for `Backward`. When
    /// `include_current` is set, the outer's current observation is tried
    /// before moving. On failure the outer cursor is restored.
    fn cross_outer(
        &mut self,
        outer_direction: Direction,
        inner_end: Direction,
        include_current: bool,
    ) -> QueryResult<Option<Moved>> {
        let start = match self.outer()? {
            Some(outer) => outer.current_id(),
            None => return Ok(None),
        };
        let mut try_current = include_current;

        loop {
            let observation = {
                let outer = match self.outer()? {
                    Some(outer) => outer,
                    None => return Ok(None),
                };
                if !try_current {
                    let moved = match outer_direction {
                        Direction::Forward => outer.next(false)?,
                        Direction::Backward => outer.prev(false)?,
                    };
                    if moved.is_none() {
                        outer.current_id = start;
                        return Ok(None);
                    }
                }
                try_current = false;
                match outer.current_id() {
                    Some(id) => id,
                    None => return Ok(None),
                }
            };

            let mut inner = self.new_inner(observation)?;
            let positioned = match inner_end {
                Direction::Forward => inner.last(true)?,
                Direction::Backward => inner.first(true)?,
            };
            if positioned.is_some() {
                return Ok(Some(Moved::Into(Box::new(inner))));
            }
        }
    }

    /// A saved inner query for `observation`, sharing this query's params
    /// and a copy of its outer query.
    fn new_inner(&self, observation: i64) -> QueryResult<Query> {
        let mut args = self.descriptor.to_args();
        args.insert("observation", observation);
        let mut inner = self
            .engine
            .lookup_and_save(self.model(), self.flavor().as_str(), args)?;
        inner.outer = self.outer.clone();
        Ok(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScriptedBackend;
    use crate::query::{QueryArgs, QueryEngine};
    use std::sync::Arc;

    fn names_query(ids: &[i64]) -> Query {
        let backend = Arc::new(ScriptedBackend::new().ids(&["FROM `names`"], ids));
        QueryEngine::for_tests_with(backend)
            .lookup(ModelKind::Name, "all", QueryArgs::new())
            .unwrap()
    }

    #[test]
    fn test_first_last_next_prev() {
        let mut query = names_query(&[10, 20, 30]);
        assert!(matches!(query.first(false).unwrap(), Some(Moved::InPlace)));
        assert_eq!(query.current_id(), Some(10));
        query.next(false).unwrap();
        assert_eq!(query.current_id(), Some(20));
        query.last(false).unwrap();
        assert_eq!(query.current_id(), Some(30));
        query.prev(false).unwrap();
        assert_eq!(query.current_id(), Some(20));
    }

    #[test]
    fn test_boundaries_leave_cursor_alone() {
        let mut query = names_query(&[10, 20]);
        query.set_current_id(Some(20));
        assert!(query.next(false).unwrap().is_none());
        assert_eq!(query.current_id(), Some(20));
        query.set_current_id(Some(10));
        assert!(query.prev(false).unwrap().is_none());
        assert_eq!(query.current_id(), Some(10));
    }

    #[test]
    fn test_unknown_current_id() {
        let mut query = names_query(&[10, 20]);
        query.set_current_id(Some(99));
        assert!(query.next(false).unwrap().is_none());
        assert!(query.prev(false).unwrap().is_none());
        assert_eq!(query.current_id(), Some(99));
    }

    #[test]
    fn test_reset_returns_to_placed_id() {
        let mut query = names_query(&[10, 20, 30]);
        query.set_current_id(Some(10));
        query.next(false).unwrap();
        query.next(false).unwrap();
        assert_eq!(query.current_id(), Some(30));
        query.reset();
        assert_eq!(query.current_id(), Some(10));
    }

    #[test]
    fn test_reset_ignores_jumps_to_the_ends() {
        let mut query = names_query(&[10, 20, 30, 40]);
        query.set_current_id(Some(30));
        query.prev(false).unwrap();
        query.next(false).unwrap();
        query.last(false).unwrap();
        assert_eq!(query.current_id(), Some(40));
        query.first(false).unwrap();
        assert_eq!(query.current_id(), Some(10));
        query.reset();
        assert_eq!(query.current_id(), Some(30));
    }

    #[test]
    fn test_empty_results() {
        let mut query = names_query(&[]);
        assert!(query.first(false).unwrap().is_none());
        assert!(query.last(false).unwrap().is_none());
        assert_eq!(query.current_id(), None);
    }

    #[test]
    fn test_no_outer_without_inside_observation() {
        let mut query = names_query(&[1]);
        assert!(!query.has_outer());
        assert!(query.outer().unwrap().is_none());
        assert_eq!(query.outer_current_id(), None);
    }
}
