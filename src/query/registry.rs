//! Static flavor and parameter registry
//!
//! Which flavors each model supports, and which parameters each
//! `(model, flavor)` accepts. The accepted set is the flavor's own
//! parameters, then the model's, then the global ones; the first
//! declaration of a name wins.

use std::fmt;
use std::str::FromStr;

use super::params::{DefaultValue, ParamKind, ParamSpec};
use crate::schema::ModelKind;

/// A named query shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flavor {
    AdvancedSearch,
    All,
    AtLocation,
    AtWhere,
    ByAuthor,
    ByEditor,
    ByRssLog,
    ByUser,
    ForObject,
    ForUser,
    InSet,
    InSpeciesList,
    InsideObservation,
    OfChildren,
    OfName,
    OfParents,
    PatternSearch,
    WithDescriptions,
    WithDescriptionsByAuthor,
    WithDescriptionsByEditor,
    WithDescriptionsByUser,
    WithDescriptionsInSet,
    WithObservations,
    WithObservationsAtLocation,
    WithObservationsAtWhere,
    WithObservationsByUser,
    WithObservationsInSet,
    WithObservationsInSpeciesList,
    WithObservationsOfChildren,
    WithObservationsOfName,
}

impl Flavor {
    pub const ALL: [Flavor; 30] = [
        Flavor::AdvancedSearch,
        Flavor::All,
        Flavor::AtLocation,
        Flavor::AtWhere,
        Flavor::ByAuthor,
        Flavor::ByEditor,
        Flavor::ByRssLog,
        Flavor::ByUser,
        Flavor::ForObject,
        Flavor::ForUser,
        Flavor::InSet,
        Flavor::InSpeciesList,
        Flavor::InsideObservation,
        Flavor::OfChildren,
        Flavor::OfName,
        Flavor::OfParents,
        Flavor::PatternSearch,
        Flavor::WithDescriptions,
        Flavor::WithDescriptionsByAuthor,
        Flavor::WithDescriptionsByEditor,
        Flavor::WithDescriptionsByUser,
        Flavor::WithDescriptionsInSet,
        Flavor::WithObservations,
        Flavor::WithObservationsAtLocation,
        Flavor::WithObservationsAtWhere,
        Flavor::WithObservationsByUser,
        Flavor::WithObservationsInSet,
        Flavor::WithObservationsInSpeciesList,
        Flavor::WithObservationsOfChildren,
        Flavor::WithObservationsOfName,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Flavor::AdvancedSearch => "advanced_search",
            Flavor::All => "all",
            Flavor::AtLocation => "at_location",
            Flavor::AtWhere => "at_where",
            Flavor::ByAuthor => "by_author",
            Flavor::ByEditor => "by_editor",
            Flavor::ByRssLog => "by_rss_log",
            Flavor::ByUser => "by_user",
            Flavor::ForObject => "for_object",
            Flavor::ForUser => "for_user",
            Flavor::InSet => "in_set",
            Flavor::InSpeciesList => "in_species_list",
            Flavor::InsideObservation => "inside_observation",
            Flavor::OfChildren => "of_children",
            Flavor::OfName => "of_name",
            Flavor::OfParents => "of_parents",
            Flavor::PatternSearch => "pattern_search",
            Flavor::WithDescriptions => "with_descriptions",
            Flavor::WithDescriptionsByAuthor => "with_descriptions_by_author",
            Flavor::WithDescriptionsByEditor => "with_descriptions_by_editor",
            Flavor::WithDescriptionsByUser => "with_descriptions_by_user",
            Flavor::WithDescriptionsInSet => "with_descriptions_in_set",
            Flavor::WithObservations => "with_observations",
            Flavor::WithObservationsAtLocation => "with_observations_at_location",
            Flavor::WithObservationsAtWhere => "with_observations_at_where",
            Flavor::WithObservationsByUser => "with_observations_by_user",
            Flavor::WithObservationsInSet => "with_observations_in_set",
            Flavor::WithObservationsInSpeciesList => "with_observations_in_species_list",
            Flavor::WithObservationsOfChildren => "with_observations_of_children",
            Flavor::WithObservationsOfName => "with_observations_of_name",
        }
    }

    /// `with_observations_by_user` -> `by_user`, `with_descriptions` -> `all`.
    pub fn without_with_prefix(&self) -> Option<Flavor> {
        let name = self.as_str();
        let rest = name
            .strip_prefix("with_observations")
            .or_else(|| name.strip_prefix("with_descriptions"))?;
        if rest.is_empty() {
            return Some(Flavor::All);
        }
        rest.strip_prefix('_')?.parse().ok()
    }

    /// `by_user` -> `with_observations_by_user`, `all` -> `with_observations`.
    pub fn with_observations(&self) -> Option<Flavor> {
        Self::prefixed("with_observations", *self)
    }

    /// `by_author` -> `with_descriptions_by_author`, `all` -> `with_descriptions`.
    pub fn with_descriptions(&self) -> Option<Flavor> {
        Self::prefixed("with_descriptions", *self)
    }

    fn prefixed(prefix: &str, flavor: Flavor) -> Option<Flavor> {
        if flavor == Flavor::All {
            return prefix.parse().ok();
        }
        format!("{}_{}", prefix, flavor.as_str()).parse().ok()
    }

    pub fn is_with_observations(&self) -> bool {
        self.as_str().starts_with("with_observations")
    }

    pub fn is_with_descriptions(&self) -> bool {
        self.as_str().starts_with("with_descriptions")
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Flavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix(':').unwrap_or(s);
        Flavor::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("Invalid flavor: '{}'", s))
    }
}

/// Flavor used when a caller asks for `default`.
pub fn default_flavor(_model: ModelKind) -> Flavor {
    Flavor::All
}

/// Flavors each model supports.
pub fn allowed_flavors(model: ModelKind) -> &'static [Flavor] {
    use Flavor::*;
    match model {
        ModelKind::Comment => &[All, ByUser, InSet, ForObject, ForUser, PatternSearch],
        ModelKind::Image => &[
            AdvancedSearch,
            All,
            ByUser,
            InSet,
            InsideObservation,
            PatternSearch,
            WithObservations,
            WithObservationsAtLocation,
            WithObservationsAtWhere,
            WithObservationsByUser,
            WithObservationsInSet,
            WithObservationsInSpeciesList,
            WithObservationsOfChildren,
            WithObservationsOfName,
        ],
        ModelKind::Location => &[
            AdvancedSearch,
            All,
            ByUser,
            ByEditor,
            ByRssLog,
            InSet,
            PatternSearch,
            WithDescriptions,
            WithDescriptionsByAuthor,
            WithDescriptionsByEditor,
            WithDescriptionsByUser,
            WithDescriptionsInSet,
            WithObservations,
            WithObservationsByUser,
            WithObservationsInSet,
            WithObservationsInSpeciesList,
            WithObservationsOfChildren,
            WithObservationsOfName,
        ],
        ModelKind::LocationDescription | ModelKind::NameDescription => {
            &[All, ByAuthor, ByEditor, ByUser, InSet]
        }
        ModelKind::Name => &[
            AdvancedSearch,
            All,
            ByUser,
            ByEditor,
            ByRssLog,
            InSet,
            OfChildren,
            OfParents,
            PatternSearch,
            WithDescriptions,
            WithDescriptionsByAuthor,
            WithDescriptionsByEditor,
            WithDescriptionsByUser,
            WithDescriptionsInSet,
            WithObservations,
            WithObservationsAtLocation,
            WithObservationsAtWhere,
            WithObservationsByUser,
            WithObservationsInSet,
            WithObservationsInSpeciesList,
        ],
        ModelKind::Observation => &[
            AdvancedSearch,
            All,
            AtLocation,
            AtWhere,
            ByRssLog,
            ByUser,
            InSet,
            InSpeciesList,
            OfChildren,
            OfName,
            PatternSearch,
        ],
        ModelKind::Project => &[All, ByRssLog, InSet, PatternSearch],
        ModelKind::RssLog => &[All, InSet],
        ModelKind::SpeciesList => &[All, AtLocation, AtWhere, ByRssLog, ByUser, InSet, PatternSearch],
        ModelKind::User => &[All, InSet, PatternSearch],
    }
}

pub fn is_allowed(model: ModelKind, flavor: Flavor) -> bool {
    allowed_flavors(model).contains(&flavor)
}

const SYNONYM_MODES: &[&str] = &["no", "all", "exclusive"];
const MISSPELLING_MODES: &[&str] = &["no", "either", "only"];
const DEPRECATED_MODES: &[&str] = &["either", "no", "only"];
const YES: &[&str] = &["yes"];

const USER: ParamSpec = ParamSpec::required("user", ParamKind::Id(ModelKind::User));
const NAME: ParamSpec = ParamSpec::required("name", ParamKind::Id(ModelKind::Name));
const ALL_CHILDREN: ParamSpec =
    ParamSpec::with_default("all", ParamKind::Bool, DefaultValue::Bool(false));
const LOCATION_ID: ParamSpec = ParamSpec::required("location", ParamKind::Id(ModelKind::Location));
const LOCATION_WHERE: ParamSpec = ParamSpec::required("location", ParamKind::Str);
const SPECIES_LIST: ParamSpec =
    ParamSpec::required("species_list", ParamKind::Id(ModelKind::SpeciesList));
const IDS: ParamSpec = ParamSpec::required("ids", ParamKind::IdSet(None));
const OLD_TITLE: ParamSpec = ParamSpec::optional("old_title", ParamKind::Str);
const OLD_BY: ParamSpec = ParamSpec::optional("old_by", ParamKind::Str);
const SYNONYMS: ParamSpec =
    ParamSpec::with_default("synonyms", ParamKind::Enum(SYNONYM_MODES), DefaultValue::Str("no"));
const NONCONSENSUS: ParamSpec = ParamSpec::with_default(
    "nonconsensus",
    ParamKind::Enum(SYNONYM_MODES),
    DefaultValue::Str("no"),
);

const ADVANCED_SEARCH_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("name", ParamKind::Str),
    ParamSpec::optional("location", ParamKind::Str),
    ParamSpec::optional("user", ParamKind::Str),
    ParamSpec::optional("content", ParamKind::Str),
];
const FOR_OBJECT_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("object", ParamKind::AnyId),
    ParamSpec::required("type", ParamKind::Str),
];
const INSIDE_OBSERVATION_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("observation", ParamKind::Id(ModelKind::Observation)),
    ParamSpec::required("outer", ParamKind::QueryRef),
];
const PATTERN_PARAMS: &[ParamSpec] = &[ParamSpec::required("pattern", ParamKind::Str)];
const OBSERVATIONS_IN_SET_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("ids", ParamKind::IdSet(Some(ModelKind::Observation))),
    OLD_TITLE,
    OLD_BY,
];

/// Parameters a flavor adds, regardless of model.
pub fn flavor_params(flavor: Flavor) -> &'static [ParamSpec] {
    match flavor {
        Flavor::AdvancedSearch => ADVANCED_SEARCH_PARAMS,
        Flavor::All | Flavor::ByRssLog | Flavor::WithDescriptions | Flavor::WithObservations => &[],
        Flavor::AtLocation | Flavor::WithObservationsAtLocation => &[LOCATION_ID],
        Flavor::AtWhere | Flavor::WithObservationsAtWhere => &[LOCATION_WHERE],
        Flavor::ByAuthor
        | Flavor::ByEditor
        | Flavor::ByUser
        | Flavor::ForUser
        | Flavor::WithDescriptionsByAuthor
        | Flavor::WithDescriptionsByEditor
        | Flavor::WithDescriptionsByUser
        | Flavor::WithObservationsByUser => &[USER],
        Flavor::ForObject => FOR_OBJECT_PARAMS,
        Flavor::InSet => &[IDS],
        Flavor::InSpeciesList | Flavor::WithObservationsInSpeciesList => &[SPECIES_LIST],
        Flavor::InsideObservation => INSIDE_OBSERVATION_PARAMS,
        Flavor::OfChildren | Flavor::OfParents | Flavor::WithObservationsOfChildren => {
            &[NAME, ALL_CHILDREN]
        }
        Flavor::OfName | Flavor::WithObservationsOfName => &[NAME, SYNONYMS, NONCONSENSUS],
        Flavor::PatternSearch => PATTERN_PARAMS,
        Flavor::WithDescriptionsInSet => &[IDS, OLD_TITLE, OLD_BY],
        Flavor::WithObservationsInSet => OBSERVATIONS_IN_SET_PARAMS,
    }
}

const CREATED: ParamSpec = ParamSpec::optional("created", ParamKind::Time);
const MODIFIED: ParamSpec = ParamSpec::optional("modified", ParamKind::Time);
const DATE: ParamSpec = ParamSpec::optional("date", ParamKind::Date);
const USERS: ParamSpec = ParamSpec::optional("users", ParamKind::IdSet(Some(ModelKind::User)));
const NAMES: ParamSpec = ParamSpec::optional("names", ParamKind::StrList);
const SYNONYM_NAMES: ParamSpec = ParamSpec::optional("synonym_names", ParamKind::StrList);
const LOCATIONS: ParamSpec = ParamSpec::optional("locations", ParamKind::StrList);
const SPECIES_LISTS: ParamSpec = ParamSpec::optional("species_lists", ParamKind::StrList);
const HAS_NOTES: ParamSpec = ParamSpec::optional("has_notes", ParamKind::Bool);
const HAS_VOTES: ParamSpec = ParamSpec::optional("has_votes", ParamKind::Bool);
const NOTES_HAS: ParamSpec = ParamSpec::optional("notes_has", ParamKind::Str);

const COMMENT_PARAMS: &[ParamSpec] = &[
    CREATED,
    MODIFIED,
    USERS,
    ParamSpec::optional("types", ParamKind::Str),
    ParamSpec::optional("summary_has", ParamKind::Str),
    ParamSpec::optional("content_has", ParamKind::Str),
];

const IMAGE_PARAMS: &[ParamSpec] = &[
    CREATED,
    MODIFIED,
    DATE,
    USERS,
    NAMES,
    SYNONYM_NAMES,
    LOCATIONS,
    SPECIES_LISTS,
    ParamSpec::optional("has_observation", ParamKind::Enum(YES)),
    HAS_NOTES,
    NOTES_HAS,
    ParamSpec::optional("copyright_holder_has", ParamKind::Str),
    HAS_VOTES,
    ParamSpec::optional("quality", ParamKind::IntRange),
    ParamSpec::optional("confidence", ParamKind::FloatRange),
    ParamSpec::optional("ok_for_export", ParamKind::Bool),
];

const NAME_PARAMS: &[ParamSpec] = &[
    CREATED,
    MODIFIED,
    USERS,
    SYNONYM_NAMES,
    ParamSpec::with_default(
        "misspellings",
        ParamKind::Enum(MISSPELLING_MODES),
        DefaultValue::Str("no"),
    ),
    ParamSpec::with_default(
        "deprecated",
        ParamKind::Enum(DEPRECATED_MODES),
        DefaultValue::Str("either"),
    ),
];

const OBSERVATION_PARAMS: &[ParamSpec] = &[
    CREATED,
    MODIFIED,
    DATE,
    USERS,
    NAMES,
    SYNONYM_NAMES,
    LOCATIONS,
    SPECIES_LISTS,
    ParamSpec::optional("projects", ParamKind::StrList),
    ParamSpec::optional("confidence", ParamKind::FloatRange),
    ParamSpec::optional("is_col_loc", ParamKind::Bool),
    ParamSpec::optional("has_specimen", ParamKind::Bool),
    ParamSpec::optional("has_location", ParamKind::Bool),
    HAS_NOTES,
    ParamSpec::optional("has_name", ParamKind::Bool),
    ParamSpec::optional("has_images", ParamKind::Bool),
    HAS_VOTES,
    ParamSpec::optional("has_comments", ParamKind::Enum(YES)),
    NOTES_HAS,
    ParamSpec::optional("comments_has", ParamKind::Str),
];

const RSS_LOG_PARAMS: &[ParamSpec] = &[MODIFIED, ParamSpec::optional("type", ParamKind::Str)];

/// Parameters every flavor of a model accepts.
pub fn model_params(model: ModelKind) -> &'static [ParamSpec] {
    match model {
        ModelKind::Comment => COMMENT_PARAMS,
        ModelKind::Image => IMAGE_PARAMS,
        ModelKind::Location
        | ModelKind::LocationDescription
        | ModelKind::NameDescription
        | ModelKind::Project => &[CREATED, MODIFIED, USERS],
        ModelKind::Name => NAME_PARAMS,
        ModelKind::Observation => OBSERVATION_PARAMS,
        ModelKind::RssLog => RSS_LOG_PARAMS,
        ModelKind::SpeciesList => &[CREATED, MODIFIED, DATE, USERS],
        ModelKind::User => &[CREATED, MODIFIED],
    }
}

/// Parameters every query accepts.
pub const GLOBAL_PARAMS: &[ParamSpec] = &[
    ParamSpec::optional("title", ParamKind::Str),
    ParamSpec::optional("join", ParamKind::JoinTree),
    ParamSpec::optional("tables", ParamKind::Text),
    ParamSpec::optional("where", ParamKind::Text),
    ParamSpec::optional("group", ParamKind::Clause),
    ParamSpec::optional("order", ParamKind::Clause),
    ParamSpec::optional("by", ParamKind::Clause),
];

/// Names of the globals that inject raw SQL.
pub const RAW_SQL_PARAMS: &[&str] = &["join", "tables", "where", "group", "order"];

/// Merged, ordered parameter list for one `(model, flavor)`.
pub fn param_specs(model: ModelKind, flavor: Flavor) -> Vec<ParamSpec> {
    let mut specs: Vec<ParamSpec> = Vec::new();
    let sources = [flavor_params(flavor), model_params(model), GLOBAL_PARAMS];
    for spec in sources.iter().flat_map(|s| s.iter()) {
        if !specs.iter().any(|s| s.name == spec.name) {
            specs.push(*spec);
        }
    }
    specs
}

pub fn find_spec(model: ModelKind, flavor: Flavor, name: &str) -> Option<ParamSpec> {
    param_specs(model, flavor).into_iter().find(|s| s.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_names_round_trip() {
        for flavor in Flavor::ALL {
            assert_eq!(flavor.as_str().parse::<Flavor>().unwrap(), flavor);
        }
        assert_eq!(":by_user".parse::<Flavor>().unwrap(), Flavor::ByUser);
        assert!("bogus".parse::<Flavor>().is_err());
    }

    #[test]
    fn test_prefix_mapping() {
        assert_eq!(Flavor::All.with_observations(), Some(Flavor::WithObservations));
        assert_eq!(Flavor::ByUser.with_observations(), Some(Flavor::WithObservationsByUser));
        assert_eq!(Flavor::OfParents.with_observations(), None);
        assert_eq!(Flavor::ByAuthor.with_descriptions(), Some(Flavor::WithDescriptionsByAuthor));
        assert_eq!(Flavor::WithObservations.without_with_prefix(), Some(Flavor::All));
        assert_eq!(
            Flavor::WithObservationsOfName.without_with_prefix(),
            Some(Flavor::OfName)
        );
        assert_eq!(Flavor::WithDescriptionsInSet.without_with_prefix(), Some(Flavor::InSet));
        assert_eq!(Flavor::ByUser.without_with_prefix(), None);
    }

    #[test]
    fn test_every_model_allows_all_and_in_set() {
        for model in ModelKind::ALL {
            assert!(is_allowed(model, Flavor::All), "{}", model);
            assert!(is_allowed(model, Flavor::InSet), "{}", model);
        }
        assert!(!is_allowed(ModelKind::User, Flavor::ByRssLog));
        assert!(!is_allowed(ModelKind::Name, Flavor::WithObservationsOfName));
    }

    #[test]
    fn test_param_merge_order() {
        let specs = param_specs(ModelKind::Observation, Flavor::ByUser);
        let names: Vec<&str> = specs.iter().map(|s| s.name).collect();
        assert_eq!(names[0], "user");
        assert!(names.contains(&"has_specimen"));
        assert_eq!(names.last(), Some(&"by"));
        assert!(specs[0].required);
    }

    #[test]
    fn test_first_declaration_wins() {
        // advanced_search declares `user` as free text
        let spec = find_spec(ModelKind::Observation, Flavor::AdvancedSearch, "user").unwrap();
        assert_eq!(spec.kind, ParamKind::Str);
        assert!(!spec.required);
    }
}
