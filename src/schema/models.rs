//! Model catalogue
//!
//! Every queryable entity type, its backing table, and the column metadata
//! the clause builder consults when choosing sort orders and filters.
//! Every table has an integer primary key named `id`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A queryable entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    Comment,
    Image,
    Location,
    LocationDescription,
    Name,
    NameDescription,
    Observation,
    Project,
    RssLog,
    SpeciesList,
    User,
}

const COMMENT_COLUMNS: &[&str] = &[
    "id", "created", "modified", "user_id", "summary", "comment", "target_id", "target_type",
];

const IMAGE_COLUMNS: &[&str] = &[
    "id", "created", "modified", "content_type", "user_id", "when", "notes",
    "copyright_holder", "license_id", "num_views", "last_view", "width", "height",
    "vote_cache", "votes", "ok_for_export", "original_name",
];

const LOCATION_COLUMNS: &[&str] = &[
    "id", "created", "modified", "user_id", "description_id", "rss_log_id", "num_views",
    "last_view", "north", "south", "west", "east", "high", "low", "notes", "version",
    "name", "scientific_name", "search_name", "license_id",
];

const LOCATION_DESCRIPTION_COLUMNS: &[&str] = &[
    "id", "created", "modified", "user_id", "location_id", "num_views", "last_view",
    "source_type", "source_name", "locale", "public", "license_id", "gen_desc", "ecology",
    "species", "notes", "refs", "version",
];

const NAME_COLUMNS: &[&str] = &[
    "id", "created", "modified", "user_id", "description_id", "rss_log_id", "num_views",
    "last_view", "rank", "text_name", "search_name", "display_name", "sort_name", "citation",
    "deprecated", "synonym_id", "correct_spelling_id", "notes", "classification",
    "ok_for_export", "author", "reviewer_id", "license_id", "version",
];

const NAME_DESCRIPTION_COLUMNS: &[&str] = &[
    "id", "created", "modified", "user_id", "name_id", "review_status", "last_review",
    "reviewer_id", "ok_for_export", "num_views", "last_view", "source_type", "source_name",
    "locale", "public", "license_id", "classification", "gen_desc", "diag_desc",
    "distribution", "habitat", "look_alikes", "uses", "notes", "refs", "version",
];

const OBSERVATION_COLUMNS: &[&str] = &[
    "id", "created", "modified", "when", "user_id", "specimen", "notes", "thumb_image_id",
    "name_id", "location_id", "is_collection_location", "vote_cache", "num_views",
    "last_view", "rss_log_id", "lat", "long", "where", "alt",
];

const PROJECT_COLUMNS: &[&str] = &[
    "id", "created", "modified", "user_id", "admin_group_id", "user_group_id", "title",
    "summary", "rss_log_id",
];

const RSS_LOG_COLUMNS: &[&str] = &[
    "id", "modified", "notes", "observation_id", "species_list_id", "name_id", "location_id",
    "project_id",
];

const SPECIES_LIST_COLUMNS: &[&str] = &[
    "id", "created", "modified", "when", "user_id", "where", "title", "notes", "rss_log_id",
    "location_id",
];

const USER_COLUMNS: &[&str] = &[
    "id", "created", "modified", "login", "name", "email", "last_login", "contribution",
    "location_id", "image_id", "license_id", "verified", "admin",
];

impl ModelKind {
    /// All models, in name order.
    pub const ALL: [ModelKind; 11] = [
        ModelKind::Comment,
        ModelKind::Image,
        ModelKind::Location,
        ModelKind::LocationDescription,
        ModelKind::Name,
        ModelKind::NameDescription,
        ModelKind::Observation,
        ModelKind::Project,
        ModelKind::RssLog,
        ModelKind::SpeciesList,
        ModelKind::User,
    ];

    /// The model's name as it appears in descriptors and polymorphic
    /// `target_type` columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Comment => "Comment",
            ModelKind::Image => "Image",
            ModelKind::Location => "Location",
            ModelKind::LocationDescription => "LocationDescription",
            ModelKind::Name => "Name",
            ModelKind::NameDescription => "NameDescription",
            ModelKind::Observation => "Observation",
            ModelKind::Project => "Project",
            ModelKind::RssLog => "RssLog",
            ModelKind::SpeciesList => "SpeciesList",
            ModelKind::User => "User",
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            ModelKind::Comment => "comments",
            ModelKind::Image => "images",
            ModelKind::Location => "locations",
            ModelKind::LocationDescription => "location_descriptions",
            ModelKind::Name => "names",
            ModelKind::NameDescription => "name_descriptions",
            ModelKind::Observation => "observations",
            ModelKind::Project => "projects",
            ModelKind::RssLog => "rss_logs",
            ModelKind::SpeciesList => "species_lists",
            ModelKind::User => "users",
        }
    }

    /// Inverse of [`ModelKind::table_name`].
    pub fn from_table(table: &str) -> Option<ModelKind> {
        ModelKind::ALL.iter().copied().find(|m| m.table_name() == table)
    }

    /// Snake-case singular form, e.g. `species_list`.
    pub fn singular(&self) -> &'static str {
        match self {
            ModelKind::Comment => "comment",
            ModelKind::Image => "image",
            ModelKind::Location => "location",
            ModelKind::LocationDescription => "location_description",
            ModelKind::Name => "name",
            ModelKind::NameDescription => "name_description",
            ModelKind::Observation => "observation",
            ModelKind::Project => "project",
            ModelKind::RssLog => "rss_log",
            ModelKind::SpeciesList => "species_list",
            ModelKind::User => "user",
        }
    }

    /// Human-readable plural used in generated titles.
    pub fn plural_label(&self) -> &'static str {
        match self {
            ModelKind::Comment => "Comments",
            ModelKind::Image => "Images",
            ModelKind::Location => "Locations",
            ModelKind::LocationDescription => "Location Descriptions",
            ModelKind::Name => "Names",
            ModelKind::NameDescription => "Name Descriptions",
            ModelKind::Observation => "Observations",
            ModelKind::Project => "Projects",
            ModelKind::RssLog => "Activity Log",
            ModelKind::SpeciesList => "Species Lists",
            ModelKind::User => "Users",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            ModelKind::Comment => COMMENT_COLUMNS,
            ModelKind::Image => IMAGE_COLUMNS,
            ModelKind::Location => LOCATION_COLUMNS,
            ModelKind::LocationDescription => LOCATION_DESCRIPTION_COLUMNS,
            ModelKind::Name => NAME_COLUMNS,
            ModelKind::NameDescription => NAME_DESCRIPTION_COLUMNS,
            ModelKind::Observation => OBSERVATION_COLUMNS,
            ModelKind::Project => PROJECT_COLUMNS,
            ModelKind::RssLog => RSS_LOG_COLUMNS,
            ModelKind::SpeciesList => SPECIES_LIST_COLUMNS,
            ModelKind::User => USER_COLUMNS,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    /// Whether rows of this model can be reached from an activity log entry.
    pub fn has_rss_log(&self) -> bool {
        self.has_column("rss_log_id")
    }

    /// Sort key used when a query does not name one.
    pub fn default_order(&self) -> &'static str {
        match self {
            ModelKind::Comment | ModelKind::Image => "created",
            ModelKind::Location
            | ModelKind::LocationDescription
            | ModelKind::Name
            | ModelKind::NameDescription
            | ModelKind::User => "name",
            ModelKind::Observation => "date",
            ModelKind::Project | ModelKind::SpeciesList => "title",
            ModelKind::RssLog => "modified",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s || m.table_name() == s || m.singular() == s)
            .ok_or_else(|| format!("Invalid model: '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_round_trip() {
        for model in ModelKind::ALL {
            assert_eq!(ModelKind::from_table(model.table_name()), Some(model));
        }
        assert_eq!(ModelKind::from_table("images_observations"), None);
    }

    #[test]
    fn test_parse_accepts_name_table_and_singular() {
        assert_eq!("SpeciesList".parse::<ModelKind>().unwrap(), ModelKind::SpeciesList);
        assert_eq!("species_lists".parse::<ModelKind>().unwrap(), ModelKind::SpeciesList);
        assert_eq!("species_list".parse::<ModelKind>().unwrap(), ModelKind::SpeciesList);
        assert!("BogusModel".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_rss_log_reachability() {
        assert!(ModelKind::Observation.has_rss_log());
        assert!(ModelKind::Name.has_rss_log());
        assert!(ModelKind::Location.has_rss_log());
        assert!(ModelKind::SpeciesList.has_rss_log());
        assert!(!ModelKind::User.has_rss_log());
        assert!(!ModelKind::Comment.has_rss_log());
    }

    #[test]
    fn test_every_table_has_id() {
        for model in ModelKind::ALL {
            assert!(model.has_column("id"), "{}", model);
        }
    }
}
