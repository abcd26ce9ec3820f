//! The `by` sort mechanism
//!
//! Maps a sort key such as `name` or `reverse_date` to an ORDER BY clause
//! for a model, adding whatever joins and grouping the order needs.

use super::clauses::{reverse_order, ClauseSet};
use super::errors::{QueryError, QueryResult};
use crate::schema::{JoinTree, ModelKind};

/// Set `clauses.order` from a sort key. A `reverse_` prefix flips the
/// resulting order; an unknown key is a configuration error.
pub fn apply_by(model: ModelKind, by: &str, clauses: &mut ClauseSet) -> QueryResult<()> {
    let (key, reverse) = match by.strip_prefix("reverse_") {
        Some(key) => (key, true),
        None => (by, false),
    };
    let order = order_for(model, key, clauses).ok_or_else(|| QueryError::bad_sort_order(model, by))?;
    clauses.order = if reverse { reverse_order(&order) } else { order };
    Ok(())
}

fn order_for(model: ModelKind, by: &str, clauses: &mut ClauseSet) -> Option<String> {
    let table = model.table_name();
    let has = |column: &str| model.has_column(column);

    match by {
        "modified" | "created" | "last_login" | "num_views" => {
            has(by).then(|| format!("{}.{} DESC", table, by))
        }

        "date" => ["date", "when", "created"]
            .iter()
            .find(|c| has(c))
            .map(|c| format!("{}.{} DESC", table, c)),

        "name" => Some(match model {
            ModelKind::Image => {
                clauses.add_join(JoinTree::path(&["images_observations", "observations", "names"]));
                clauses.group = Some("images.id".into());
                "MIN(names.search_name) ASC, images.when DESC".into()
            }
            ModelKind::Location => "locations.search_name ASC".into(),
            ModelKind::LocationDescription => {
                clauses.add_join(JoinTree::leaf("locations"));
                "locations.search_name ASC, location_descriptions.created ASC".into()
            }
            ModelKind::Name => "names.text_name ASC, names.author ASC".into(),
            ModelKind::NameDescription => {
                clauses.add_join(JoinTree::leaf("names"));
                "names.text_name ASC, names.author ASC, name_descriptions.created ASC".into()
            }
            ModelKind::Observation => {
                clauses.add_join(JoinTree::leaf("names"));
                "names.text_name ASC, names.author ASC, observations.when DESC".into()
            }
            _ => return ["search_name", "name", "title"]
                .iter()
                .find(|c| has(c))
                .map(|c| format!("{}.{} ASC", table, c)),
        }),

        "title" | "login" | "summary" | "copyright_holder" | "where" => {
            has(by).then(|| format!("{}.{} ASC", table, by))
        }

        "user" => has("user_id").then(|| {
            clauses.add_join(JoinTree::leaf("users"));
            r#"IF(users.name = "" OR users.name IS NULL, users.login, users.name) ASC"#.to_string()
        }),

        "location" => has("location_id").then(|| {
            clauses.add_join(JoinTree::leaf("locations"));
            "locations.search_name ASC".to_string()
        }),

        "rss_log" => has("rss_log_id").then(|| {
            clauses.add_join(JoinTree::leaf("rss_logs"));
            "rss_logs.modified DESC".to_string()
        }),

        "confidence" => match model {
            ModelKind::Image => {
                clauses.add_join(JoinTree::path(&["images_observations", "observations"]));
                Some("observations.vote_cache DESC".into())
            }
            ModelKind::Observation => Some("observations.vote_cache DESC".into()),
            _ => None,
        },

        "image_quality" => (model == ModelKind::Image).then(|| "images.vote_cache DESC".to_string()),

        "thumbnail_quality" => (model == ModelKind::Observation).then(|| {
            clauses.add_join(JoinTree::leaf("images.thumb_image"));
            "images.vote_cache DESC, observations.vote_cache DESC".to_string()
        }),

        "contribution" => (model == ModelKind::User).then(|| "users.contribution DESC".to_string()),

        "id" => Some(format!("{}.id ASC", table)),

        _ => None,
    }
}
