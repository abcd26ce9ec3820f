//! Model coercion
//!
//! Turns a query over one model into the equivalent query over a related
//! model. Each supported combination is either a [`Coercion::Remap`], which
//! rewrites the descriptor onto another flavor, or a
//! [`Coercion::Materialize`], which executes the source and feeds its ids to
//! an `*_in_set` flavor of the target. Remap is preferred; it falls back to
//! Materialize when the target rejects a carried param or the source
//! injects raw SQL that would not make sense against the target.

use super::args::QueryArgs;
use super::errors::{QueryErrorCode, QueryResult};
use super::query::Query;
use super::registry::{self, Flavor};
use crate::observability::{log_event_with_fields, Event};
use crate::schema::ModelKind;

#[derive(Debug, Clone, PartialEq)]
enum Coercion {
    Remap { flavor: Flavor, args: QueryArgs },
    Materialize { flavor: Flavor },
}

/// Remap and Materialize candidates for `query -> target`.
fn plan(query: &Query, target: ModelKind) -> (Option<Coercion>, Option<Coercion>) {
    let source = query.model();
    let flavor = query.flavor();
    let d = query.descriptor();
    let mut args = d.to_args();

    match (source, target) {
        (ModelKind::RssLog, _) if flavor == Flavor::All => {
            if !target.has_rss_log() {
                return (None, None);
            }
            args.remove("type");
            (
                Some(Coercion::Remap {
                    flavor: Flavor::ByRssLog,
                    args,
                }),
                None,
            )
        }

        (ModelKind::Observation, ModelKind::Image | ModelKind::Location | ModelKind::Name) => {
            args.remove("by");
            let materialize = Some(Coercion::Materialize {
                flavor: Flavor::WithObservationsInSet,
            });
            let remapped = match flavor {
                Flavor::All => Flavor::WithObservations,
                Flavor::ByUser => Flavor::WithObservationsByUser,
                Flavor::InSpeciesList => Flavor::WithObservationsInSpeciesList,
                Flavor::OfChildren => Flavor::WithObservationsOfChildren,
                Flavor::OfName if target == ModelKind::Name => return (None, None),
                Flavor::OfName => Flavor::WithObservationsOfName,
                Flavor::AtLocation if target == ModelKind::Location => {
                    let mut ids = QueryArgs::new();
                    if let Some(location) = d.get_int("location") {
                        ids.insert("ids", vec![location]);
                    }
                    return (
                        Some(Coercion::Remap {
                            flavor: Flavor::InSet,
                            args: ids,
                        }),
                        None,
                    );
                }
                Flavor::AtLocation => Flavor::WithObservationsAtLocation,
                Flavor::AtWhere => Flavor::WithObservationsAtWhere,
                Flavor::InSet => {
                    args.insert("old_title", query.title());
                    if let Some(by) = d.get_str("by") {
                        args.insert("old_by", by);
                    }
                    args.remove("title");
                    Flavor::WithObservationsInSet
                }
                Flavor::PatternSearch | Flavor::AdvancedSearch => return (None, materialize),
                _ => return (None, None),
            };
            (
                Some(Coercion::Remap {
                    flavor: remapped,
                    args,
                }),
                materialize,
            )
        }

        (ModelKind::LocationDescription, ModelKind::Location)
        | (ModelKind::NameDescription, ModelKind::Name) => {
            args.remove("by");
            let materialize = Some(Coercion::Materialize {
                flavor: Flavor::WithDescriptionsInSet,
            });
            let remapped = match flavor {
                Flavor::All => Flavor::WithDescriptions,
                Flavor::ByUser => Flavor::WithDescriptionsByUser,
                Flavor::ByAuthor => Flavor::WithDescriptionsByAuthor,
                Flavor::ByEditor => Flavor::WithDescriptionsByEditor,
                Flavor::InSet => {
                    args.insert("old_title", query.title());
                    if let Some(by) = d.get_str("by") {
                        args.insert("old_by", by);
                    }
                    args.remove("title");
                    Flavor::WithDescriptionsInSet
                }
                _ => return (None, materialize),
            };
            (
                Some(Coercion::Remap {
                    flavor: remapped,
                    args,
                }),
                materialize,
            )
        }

        (_, ModelKind::Observation) if flavor.is_with_observations() => unwrap_with(query, args),
        (ModelKind::Location, ModelKind::LocationDescription)
        | (ModelKind::Name, ModelKind::NameDescription)
            if flavor.is_with_descriptions() =>
        {
            unwrap_with(query, args)
        }

        _ => (None, None),
    }
}

/// `X :with_<type>_foo` -> `<type> :foo`, restoring the title and order the
/// query was derived from.
fn unwrap_with(query: &Query, mut args: QueryArgs) -> (Option<Coercion>, Option<Coercion>) {
    let Some(base) = query.flavor().without_with_prefix() else {
        return (None, None);
    };
    let old_title = args.remove("old_title");
    let old_by = args.remove("old_by");
    args.remove("by");
    if !args.contains("title") {
        if let Some(title) = old_title {
            args.insert("title", title);
        }
    }
    if let Some(by) = old_by {
        args.insert("by", by);
    }
    (Some(Coercion::Remap { flavor: base, args }), None)
}

impl Query {
    /// The equivalent query over `target`. `Ok(None)` means the
    /// combination is not supported.
    pub fn coerce(&mut self, target: ModelKind) -> QueryResult<Option<Query>> {
        if target == self.model() {
            return Ok(Some(self.clone()));
        }

        let (remap, materialize) = plan(self, target);
        let fallback = materialize.filter(|c| {
            matches!(c, Coercion::Materialize { flavor } if registry::is_allowed(target, *flavor))
        });

        let coerced = match remap {
            Some(Coercion::Remap { flavor, .. }) if !registry::is_allowed(target, flavor) => None,
            Some(Coercion::Remap { flavor, args }) => {
                if self.descriptor.has_raw_sql() {
                    self.materialize(target, fallback)?
                } else {
                    match self.engine.lookup(target, flavor.as_str(), args) {
                        Ok(query) => Some(query),
                        Err(e) if e.code() == QueryErrorCode::UnknownParam && fallback.is_some() => {
                            self.materialize(target, fallback)?
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            _ => self.materialize(target, fallback)?,
        };

        let from = self.model().as_str();
        let flavor = self.flavor();
        match &coerced {
            Some(query) => {
                self.engine.metrics().increment_coercions();
                log_event_with_fields(
                    Event::QueryCoerced,
                    &[
                        ("from", from),
                        ("from_flavor", flavor.as_str()),
                        ("to", target.as_str()),
                        ("to_flavor", query.flavor().as_str()),
                    ],
                );
            }
            None => {
                self.engine.metrics().increment_coercions_unsupported();
                log_event_with_fields(
                    Event::CoercionUnsupported,
                    &[("from", from), ("from_flavor", flavor.as_str()), ("to", target.as_str())],
                );
            }
        }
        Ok(coerced)
    }

    fn materialize(&mut self, target: ModelKind, coercion: Option<Coercion>) -> QueryResult<Option<Query>> {
        let flavor = match coercion {
            Some(Coercion::Materialize { flavor }) => flavor,
            _ => return Ok(None),
        };
        let ids = self.result_ids()?;
        let mut args = QueryArgs::new()
            .with("ids", ids)
            .with("old_title", self.title());
        if let Some(by) = self.descriptor.get_str("by") {
            args.insert("old_by", by);
        }
        self.engine.lookup(target, flavor.as_str(), args).map(Some)
    }
}
