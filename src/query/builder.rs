//! Clause builder
//!
//! Turns a validated descriptor into a [`ClauseSet`] in four passes:
//!
//! 1. the flavor initializer (may set the order, seed result ids, link an
//!    outer query)
//! 2. the `by` sort key, when given or when the flavor left no order
//! 3. the model's own filter params
//! 4. the global raw-SQL overrides (`join`, `tables`, `where`, `group`, `order`)
//!
//! Entity params are checked against the [`Directory`] as they are read;
//! a dangling id is a `NotFound` rejection.

use super::clauses::{clean_id_set, clean_pattern, ClauseSet};
use super::descriptor::QueryDescriptor;
use super::errors::{QueryError, QueryResult};
use super::google::{google_conditions, google_parse};
use super::order::apply_by;
use super::params::ParamValue;
use super::registry::Flavor;
use crate::schema::{Directory, JoinColumn, JoinGraph, JoinTree, ModelKind, NameRecord};

/// Output of a build.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Built {
    pub clauses: ClauseSet,
    /// Result ids known without executing (`in_set`)
    pub result_ids: Option<Vec<i64>>,
    /// Persisted id of the outer query (`inside_observation`)
    pub outer_id: Option<u64>,
}

pub(crate) fn build(descriptor: &QueryDescriptor, directory: &dyn Directory) -> QueryResult<Built> {
    let mut builder = Builder::new(descriptor, directory);
    builder.initialize_flavor()?;
    builder.initialize_order()?;
    builder.initialize_model()?;
    builder.initialize_overrides()?;
    Ok(Built {
        clauses: builder.clauses,
        result_ids: builder.result_ids,
        outer_id: builder.outer_id,
    })
}

const RSS_LOG_TYPES: &[&str] = &["location", "name", "observation", "project", "species_list"];

const LOCATION_NOTE_FIELDS: &[&str] = &["gen_desc", "ecology", "species", "notes", "refs"];

const NAME_NOTE_FIELDS: &[&str] = &[
    "classification", "gen_desc", "diag_desc", "distribution", "habitat", "look_alikes", "uses",
    "notes", "refs",
];

const COL_LOC: &str = "observations.is_collection_location IS TRUE";

struct Builder<'a> {
    d: &'a QueryDescriptor,
    directory: &'a dyn Directory,
    model: ModelKind,
    table: &'static str,
    clauses: ClauseSet,
    default_by: Option<&'static str>,
    result_ids: Option<Vec<i64>>,
    outer_id: Option<u64>,
}

impl<'a> Builder<'a> {
    fn new(d: &'a QueryDescriptor, directory: &'a dyn Directory) -> Self {
        Self {
            d,
            directory,
            model: d.model(),
            table: d.model().table_name(),
            clauses: ClauseSet::new(),
            default_by: None,
            result_ids: None,
            outer_id: None,
        }
    }

    fn join(&mut self, tree: JoinTree) {
        self.clauses.add_join(tree);
    }

    fn where_(&mut self, condition: impl Into<String>) {
        self.clauses.add_where(condition);
    }

    /// Path from the model table to `observations`, then on to `rest`.
    fn observations_path(&self, rest: &[&str]) -> JoinTree {
        let mut path: Vec<&str> = Vec::with_capacity(rest.len() + 2);
        if self.model == ModelKind::Image {
            path.push("images_observations");
        }
        path.push("observations");
        path.extend_from_slice(rest);
        JoinTree::path(&path)
    }

    fn unsupported(&self) -> QueryError {
        QueryError::bad_declaration(format!(
            "Forgot to tell me how to build a :{} query for {}",
            self.d.flavor(),
            self.model
        ))
    }

    fn require_entity(&self, param: &str, model: ModelKind) -> QueryResult<i64> {
        let id = self.d.require_int(param)?;
        if !self.directory.exists(model, id)? {
            return Err(QueryError::not_found(param, format!("{} #{}", model, id)));
        }
        Ok(id)
    }

    fn require_name(&self) -> QueryResult<NameRecord> {
        let id = self.d.require_int("name")?;
        self.directory
            .name_record(id)?
            .ok_or_else(|| QueryError::not_found("name", format!("Name #{}", id)))
    }

    // ----------------------------------------------------------------
    //  Flavors
    // ----------------------------------------------------------------

    fn initialize_flavor(&mut self) -> QueryResult<()> {
        match self.d.flavor() {
            Flavor::AdvancedSearch => self.initialize_advanced_search(),
            Flavor::All => self.initialize_all(),
            Flavor::AtLocation => self.initialize_at_location(),
            Flavor::AtWhere => self.initialize_at_where(),
            Flavor::ByAuthor | Flavor::ByEditor => self.initialize_by_editor(),
            Flavor::ByRssLog => {
                self.join(JoinTree::leaf("rss_logs"));
                self.default_by = Some("rss_log");
                Ok(())
            }
            Flavor::ByUser => self.initialize_by_user(),
            Flavor::ForObject => self.initialize_for_object(),
            Flavor::ForUser => self.initialize_for_user(),
            Flavor::InSet => self.initialize_in_set(),
            Flavor::InSpeciesList => self.initialize_in_species_list(),
            Flavor::InsideObservation => self.initialize_inside_observation(),
            Flavor::OfChildren | Flavor::WithObservationsOfChildren => self.initialize_of_children(),
            Flavor::OfName | Flavor::WithObservationsOfName => self.initialize_of_name(),
            Flavor::OfParents => self.initialize_of_parents(),
            Flavor::PatternSearch => self.initialize_pattern_search(),
            Flavor::WithDescriptions
            | Flavor::WithDescriptionsByAuthor
            | Flavor::WithDescriptionsByEditor
            | Flavor::WithDescriptionsByUser
            | Flavor::WithDescriptionsInSet => self.initialize_with_descriptions(),
            Flavor::WithObservations
            | Flavor::WithObservationsAtLocation
            | Flavor::WithObservationsAtWhere
            | Flavor::WithObservationsByUser
            | Flavor::WithObservationsInSet
            | Flavor::WithObservationsInSpeciesList => self.initialize_with_observations(),
        }
    }

    fn initialize_all(&mut self) -> QueryResult<()> {
        if self.model != ModelKind::RssLog {
            return Ok(());
        }
        let requested = self.d.get_str("type").unwrap_or("all");
        let types: Vec<&str> = requested.split_whitespace().collect();
        if types.contains(&"all") || types.is_empty() {
            return Ok(());
        }
        let conditions: Vec<String> = types
            .iter()
            .filter(|t| RSS_LOG_TYPES.contains(t))
            .map(|t| format!("rss_logs.{}_id IS NOT NULL", t))
            .collect();
        if conditions.is_empty() {
            self.where_("FALSE");
        } else {
            self.where_(conditions.join(" OR "));
        }
        Ok(())
    }

    fn initialize_by_user(&mut self) -> QueryResult<()> {
        let user = self.require_entity("user", ModelKind::User)?;
        if !self.model.has_column("user_id") {
            return Err(QueryError::bad_declaration(format!(
                "Can't figure out how to select {} by user_id",
                self.model
            )));
        }
        self.where_(format!("{}.user_id = '{}'", self.table, user));
        self.default_by = match self.model {
            ModelKind::Observation | ModelKind::Image => Some("modified"),
            ModelKind::Location
            | ModelKind::Name
            | ModelKind::LocationDescription
            | ModelKind::NameDescription => Some("name"),
            ModelKind::SpeciesList => Some("title"),
            ModelKind::Comment => Some("created"),
            _ => None,
        };
        Ok(())
    }

    fn initialize_for_object(&mut self) -> QueryResult<()> {
        let type_name = self.d.require_str("type")?;
        let target: ModelKind = type_name
            .parse()
            .map_err(|_| QueryError::bad_value("type", format!("is not a model: {:?}", type_name)))?;
        if !matches!(
            JoinGraph::edge("comments", target.table_name()),
            Some(JoinColumn::Polymorphic(_))
        ) {
            return Err(QueryError::bad_value(
                "type",
                format!("names a model that does not support comments: {}", target),
            ));
        }
        let object = self.require_entity("object", target)?;
        self.where_(format!("comments.target_id = '{}'", object));
        self.where_(format!("comments.target_type = '{}'", target.as_str()));
        self.default_by = Some("created");
        Ok(())
    }

    fn initialize_for_user(&mut self) -> QueryResult<()> {
        let user = self.require_entity("user", ModelKind::User)?;
        self.join(JoinTree::leaf("observations"));
        self.where_(format!("observations.user_id = '{}'", user));
        self.default_by = Some("created");
        Ok(())
    }

    fn initialize_by_editor(&mut self) -> QueryResult<()> {
        let user = self.require_entity("user", ModelKind::User)?;
        match self.model {
            ModelKind::Name | ModelKind::Location => {
                let versions = format!("{}_versions", self.table);
                self.join(JoinTree::leaf(versions.as_str()));
                self.where_(format!("{}.user_id = '{}'", versions, user));
                self.where_(format!("{}.user_id != '{}'", self.table, user));
            }
            ModelKind::NameDescription | ModelKind::LocationDescription => {
                let role = match self.d.flavor() {
                    Flavor::ByAuthor => "authors",
                    _ => "editors",
                };
                let glue = format!("{}_{}", self.table, role);
                self.join(JoinTree::leaf(glue.as_str()));
                self.where_(format!("{}.user_id = '{}'", glue, user));
                self.default_by = Some("name");
            }
            _ => {
                return Err(QueryError::bad_declaration(format!(
                    "No editors or authors in {}",
                    self.model
                )))
            }
        }
        Ok(())
    }

    fn initialize_at_location(&mut self) -> QueryResult<()> {
        let location = self.require_entity("location", ModelKind::Location)?;
        if self.model == ModelKind::Observation {
            self.join(JoinTree::leaf("names"));
        }
        self.where_(format!("{}.location_id = '{}'", self.table, location));
        self.default_by = Some("name");
        Ok(())
    }

    fn initialize_at_where(&mut self) -> QueryResult<()> {
        let pattern = clean_pattern(self.d.require_str("location")?);
        if self.model == ModelKind::Observation {
            self.join(JoinTree::leaf("names"));
        }
        self.where_(format!("{}.where LIKE '%{}%'", self.table, pattern));
        self.default_by = Some("name");
        Ok(())
    }

    fn initialize_in_species_list(&mut self) -> QueryResult<()> {
        let list = self.require_entity("species_list", ModelKind::SpeciesList)?;
        self.join(JoinTree::leaf("names"));
        self.join(JoinTree::leaf("observations_species_lists"));
        self.where_(format!("observations_species_lists.species_list_id = '{}'", list));
        self.default_by = Some("name");
        Ok(())
    }

    fn initialize_of_name(&mut self) -> QueryResult<()> {
        let name = self.require_name()?;
        let synonyms = self.d.get_str("synonyms").unwrap_or("no");
        let nonconsensus = self.d.get_str("nonconsensus").unwrap_or("no");

        let ids: Vec<i64> = match synonyms {
            "all" => self.directory.name_synonym_ids(name.id)?,
            "exclusive" => {
                let misspellings = self.directory.name_misspelling_ids(name.id)?;
                self.directory
                    .name_synonym_ids(name.id)?
                    .into_iter()
                    .filter(|id| *id != name.id && !misspellings.contains(id))
                    .collect()
            }
            _ => {
                let mut ids = vec![name.id];
                ids.extend(self.directory.name_misspelling_ids(name.id)?);
                ids
            }
        };
        let set = clean_id_set(&ids);

        match nonconsensus {
            "all" => {
                self.where_(format!(
                    "observations.name_id IN ({set}) AND observations.vote_cache >= 0 OR \
                     namings.name_id IN ({set}) AND namings.vote_cache >= 0"
                ));
                self.clauses.order = "IF(observations.vote_cache > namings.vote_cache, \
                     observations.vote_cache, namings.vote_cache) DESC, observations.when DESC"
                    .into();
            }
            "exclusive" => {
                self.where_(format!("namings.name_id IN ({set})"));
                self.where_("namings.vote_cache >= 0");
                self.where_(format!("observations.name_id NOT IN ({set})"));
                self.clauses.order = "namings.vote_cache DESC, observations.when DESC".into();
            }
            _ => {
                self.where_(format!("observations.name_id IN ({set})"));
                self.where_("observations.vote_cache >= 0");
                self.clauses.order = "observations.vote_cache DESC, observations.when DESC".into();
            }
        }

        let with_namings = nonconsensus != "no";
        match self.model {
            ModelKind::Observation if with_namings => self.join(JoinTree::leaf("namings")),
            ModelKind::Location => {
                let tree = if with_namings {
                    JoinTree::path(&["observations", "namings"])
                } else {
                    JoinTree::leaf("observations")
                };
                self.join(tree);
                self.where_(COL_LOC);
            }
            ModelKind::Image => {
                let tree = if with_namings {
                    self.observations_path(&["namings"])
                } else {
                    self.observations_path(&[])
                };
                self.join(tree);
            }
            _ => {}
        }
        Ok(())
    }

    fn initialize_of_children(&mut self) -> QueryResult<()> {
        let name = self.require_name()?;
        let all = self.d.get_bool("all").unwrap_or(false);
        self.default_by = Some("name");

        if all || name.is_above_genus() {
            let children = self.directory.name_children(name.id, all)?;
            self.where_(format!("names.id IN ({})", clean_id_set(&children)));
        } else {
            let text = clean_pattern(&name.text_name);
            self.where_(format!("names.text_name LIKE '{} %'", text));
            let depth = if name.is_genus() { "% %" } else { "% % %" };
            self.where_(format!("names.text_name NOT LIKE '{} {}'", text, depth));
        }

        match self.model {
            ModelKind::Observation => self.join(JoinTree::leaf("names")),
            ModelKind::Image | ModelKind::Location => {
                let tree = self.observations_path(&["names"]);
                self.join(tree);
            }
            _ => {}
        }
        Ok(())
    }

    fn initialize_of_parents(&mut self) -> QueryResult<()> {
        let name = self.require_name()?;
        let all = self.d.get_bool("all").unwrap_or(false);
        let parents = self.directory.name_parents(name.id, all)?;
        self.where_(format!("names.id IN ({})", clean_id_set(&parents)));
        self.default_by = Some("name");
        Ok(())
    }

    fn initialize_in_set(&mut self) -> QueryResult<()> {
        let ids = self.d.get_int_list("ids").unwrap_or_default().to_vec();
        let set = if ids.is_empty() {
            "-1".to_string()
        } else {
            ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
        };
        self.where_(format!("{}.id IN ({})", self.table, set));
        self.clauses.order = format!("FIND_IN_SET({}.id,'{}') ASC", self.table, set);
        self.result_ids = Some(ids);
        Ok(())
    }

    fn initialize_inside_observation(&mut self) -> QueryResult<()> {
        let observation = self.require_entity("observation", ModelKind::Observation)?;
        self.join(JoinTree::leaf("images_observations"));
        self.where_(format!("images_observations.observation_id = '{}'", observation));
        let outer = self.d.require_int("outer")?;
        self.outer_id = Some(outer as u64);
        Ok(())
    }

    fn initialize_with_observations(&mut self) -> QueryResult<()> {
        let is_location = self.model == ModelKind::Location;
        let base = self.observations_path(&[]);
        self.default_by = Some("name");

        match self.d.flavor() {
            Flavor::WithObservationsAtLocation => {
                let location = self.require_entity("location", ModelKind::Location)?;
                self.join(base);
                self.where_(format!("observations.location_id = '{}'", location));
                self.where_(COL_LOC);
            }
            Flavor::WithObservationsAtWhere => {
                let pattern = clean_pattern(self.d.require_str("location")?);
                self.join(base);
                self.where_(format!("observations.where LIKE '%{}%'", pattern));
                self.where_(COL_LOC);
            }
            Flavor::WithObservationsByUser => {
                let user = self.require_entity("user", ModelKind::User)?;
                self.join(base);
                self.where_(format!("observations.user_id = '{}'", user));
                if is_location {
                    self.where_(COL_LOC);
                }
            }
            Flavor::WithObservationsInSet => {
                let ids = self.d.get_int_list("ids").unwrap_or_default();
                let set = clean_id_set(ids);
                self.join(base);
                self.where_(format!("observations.id IN ({})", set));
                if is_location {
                    self.where_(COL_LOC);
                }
            }
            Flavor::WithObservationsInSpeciesList => {
                let list = self.require_entity("species_list", ModelKind::SpeciesList)?;
                let tree = self.observations_path(&["observations_species_lists"]);
                self.join(tree);
                self.where_(format!(
                    "observations_species_lists.species_list_id = '{}'",
                    list
                ));
                if is_location {
                    self.where_(COL_LOC);
                }
            }
            _ => self.join(base),
        }
        Ok(())
    }

    fn initialize_with_descriptions(&mut self) -> QueryResult<()> {
        let descriptions = format!("{}_descriptions", self.model.singular());
        self.default_by = Some("name");

        match self.d.flavor() {
            Flavor::WithDescriptionsByAuthor | Flavor::WithDescriptionsByEditor => {
                let user = self.require_entity("user", ModelKind::User)?;
                let role = if self.d.flavor() == Flavor::WithDescriptionsByAuthor {
                    "authors"
                } else {
                    "editors"
                };
                let glue = format!("{}_{}", descriptions, role);
                self.join(JoinTree::path(&[descriptions.as_str(), glue.as_str()]));
                self.where_(format!("{}.user_id = '{}'", glue, user));
            }
            Flavor::WithDescriptionsByUser => {
                let user = self.require_entity("user", ModelKind::User)?;
                self.join(JoinTree::leaf(descriptions.as_str()));
                self.where_(format!("{}.user_id = '{}'", descriptions, user));
            }
            Flavor::WithDescriptionsInSet => {
                let ids = self.d.get_int_list("ids").unwrap_or_default();
                let set = clean_id_set(ids);
                self.join(JoinTree::leaf(descriptions.as_str()));
                self.where_(format!("{}.id IN ({})", descriptions, set));
            }
            _ => self.join(JoinTree::leaf(descriptions.as_str())),
        }
        Ok(())
    }

    fn initialize_pattern_search(&mut self) -> QueryResult<()> {
        let search = google_parse(self.d.require_str("pattern")?);
        let field = match self.model {
            ModelKind::Comment => {
                r#"CONCAT(comments.summary,COALESCE(comments.comment,""))"#.to_string()
            }
            ModelKind::Image => {
                self.join(JoinTree::branch(
                    "images_observations",
                    vec![JoinTree::branch(
                        "observations",
                        vec![JoinTree::leaf("locations!"), JoinTree::leaf("names")],
                    )],
                ));
                concat!(
                    r#"CONCAT(names.search_name,"#,
                    r#"COALESCE(images.copyright_holder,""),COALESCE(images.notes,""),"#,
                    r#"IF(locations.id,locations.search_name,observations.where))"#
                )
                .to_string()
            }
            ModelKind::Location => {
                self.join(JoinTree::leaf("location_descriptions.default!"));
                let notes: Vec<String> = LOCATION_NOTE_FIELDS
                    .iter()
                    .map(|f| format!("COALESCE(location_descriptions.{},'')", f))
                    .collect();
                format!("CONCAT(locations.search_name,{})", notes.join(","))
            }
            ModelKind::Name => {
                self.join(JoinTree::leaf("name_descriptions.default!"));
                let notes: Vec<String> = NAME_NOTE_FIELDS
                    .iter()
                    .map(|f| format!("COALESCE(name_descriptions.{},'')", f))
                    .collect();
                format!(
                    "CONCAT(names.search_name,COALESCE(names.citation,''),COALESCE(names.notes,''),{})",
                    notes.join(",")
                )
            }
            ModelKind::Observation => {
                self.join(JoinTree::leaf("locations!"));
                self.join(JoinTree::leaf("names"));
                concat!(
                    r#"CONCAT(names.search_name,COALESCE(observations.notes,""),"#,
                    r#"IF(locations.id,locations.search_name,observations.where))"#
                )
                .to_string()
            }
            ModelKind::Project => {
                r#"CONCAT(projects.title,COALESCE(projects.summary,""))"#.to_string()
            }
            ModelKind::SpeciesList => {
                self.join(JoinTree::leaf("locations!"));
                concat!(
                    r#"CONCAT(species_lists.title,COALESCE(species_lists.notes,""),"#,
                    r#"IF(locations.id,locations.search_name,species_lists.where))"#
                )
                .to_string()
            }
            ModelKind::User => "CONCAT(users.login,users.name)".to_string(),
            _ => return Err(self.unsupported()),
        };
        let condition = google_conditions(&search, &field);
        if !condition.is_empty() {
            self.where_(condition);
        }
        Ok(())
    }

    fn initialize_advanced_search(&mut self) -> QueryResult<()> {
        let name = google_parse(self.d.get_str("name").unwrap_or_default());
        let user_text = self.d.get_str("user").unwrap_or_default();
        let user = google_parse(&strip_email(user_text));
        let location = google_parse(self.d.get_str("location").unwrap_or_default());
        let content = google_parse(self.d.get_str("content").unwrap_or_default());

        if name.is_blank() && user.is_blank() && location.is_blank() && content.is_blank() {
            return Err(QueryError::bad_value(
                "name",
                "is required: give at least one of :name, :user, :location or :content",
            ));
        }

        match self.model {
            ModelKind::Image => {
                if !user.is_blank() {
                    let tree = self.observations_path(&["users"]);
                    self.join(tree);
                }
                if !name.is_blank() {
                    let tree = self.observations_path(&["names"]);
                    self.join(tree);
                }
                if !location.is_blank() {
                    let tree = self.observations_path(&["locations!"]);
                    self.join(tree);
                }
                if !content.is_blank() {
                    let tree = self.observations_path(&[]);
                    self.join(tree);
                }
            }
            ModelKind::Location => {
                if !user.is_blank() {
                    self.join(JoinTree::path(&["observations", "users"]));
                }
                if !name.is_blank() {
                    self.join(JoinTree::path(&["observations", "names"]));
                }
                if !content.is_blank() {
                    self.join(JoinTree::leaf("observations"));
                }
            }
            ModelKind::Name => {
                if !user.is_blank() {
                    self.join(JoinTree::path(&["observations", "users"]));
                }
                if !location.is_blank() {
                    self.join(JoinTree::path(&["observations", "locations!"]));
                }
                if !content.is_blank() {
                    self.join(JoinTree::leaf("observations"));
                }
            }
            ModelKind::Observation => {
                if !name.is_blank() {
                    self.join(JoinTree::leaf("names"));
                }
                if !user.is_blank() {
                    self.join(JoinTree::leaf("users"));
                }
                if !location.is_blank() {
                    self.join(JoinTree::leaf("locations!"));
                }
            }
            _ => return Err(self.unsupported()),
        }

        let location_field = if self.model == ModelKind::Location {
            "locations.search_name"
        } else {
            "IF(locations.id,locations.search_name,observations.where)"
        };
        for (search, field) in [
            (&name, "names.search_name"),
            (&user, "CONCAT(users.login,users.name)"),
            (&location, location_field),
            (&content, "observations.notes"),
        ] {
            let condition = google_conditions(search, field);
            if !condition.is_empty() {
                self.where_(condition);
            }
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    //  Sort order
    // ----------------------------------------------------------------

    fn initialize_order(&mut self) -> QueryResult<()> {
        let by = self.d.get_str("by");
        if by.is_some() || self.clauses.order.is_empty() {
            let key = by
                .or(self.default_by)
                .unwrap_or_else(|| self.model.default_order());
            apply_by(self.model, key, &mut self.clauses)?;
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    //  Model params
    // ----------------------------------------------------------------

    fn initialize_model(&mut self) -> QueryResult<()> {
        match self.model {
            ModelKind::Comment => {
                self.do_time("created");
                self.do_time("modified");
                self.do_users();
                self.do_comment_types();
                self.do_search("summary_has", "comments.summary");
                self.do_search("content_has", "comments.comment");
            }
            ModelKind::Image => {
                let via_observations = self.observations_path(&[]);
                self.do_time("created");
                self.do_time("modified");
                self.do_date("date", "images.when");
                self.do_users();
                self.do_objects_by_name(
                    ModelKind::Name,
                    "names",
                    "observations.name_id",
                    false,
                    Some(via_observations.clone()),
                )?;
                self.do_objects_by_name(
                    ModelKind::Name,
                    "synonym_names",
                    "observations.name_id",
                    true,
                    Some(via_observations.clone()),
                )?;
                self.do_locations("observations", Some(via_observations.clone()))?;
                let via_lists = self.observations_path(&["observations_species_lists"]);
                self.do_objects_by_name(
                    ModelKind::SpeciesList,
                    "species_lists",
                    "observations_species_lists.species_list_id",
                    false,
                    Some(via_lists),
                )?;
                if self.d.has("has_observation") {
                    self.join(JoinTree::leaf("images_observations"));
                }
                self.do_boolean(
                    "has_notes",
                    r#"LENGTH(COALESCE(images.notes,"")) > 0"#,
                    r#"LENGTH(COALESCE(images.notes,"")) = 0"#,
                );
                self.do_search("notes_has", "images.notes");
                self.do_search("copyright_holder_has", "images.copyright_holder");
                self.do_boolean(
                    "has_votes",
                    r#"LENGTH(COALESCE(images.votes,"")) > 0"#,
                    r#"LENGTH(COALESCE(images.votes,"")) = 0"#,
                );
                self.do_range("quality", "images.vote_cache", None);
                self.do_range("confidence", "observations.vote_cache", Some(via_observations));
                self.do_boolean(
                    "ok_for_export",
                    "images.ok_for_export IS TRUE",
                    "images.ok_for_export IS FALSE",
                );
            }
            ModelKind::Location
            | ModelKind::LocationDescription
            | ModelKind::NameDescription
            | ModelKind::Project => {
                self.do_time("created");
                self.do_time("modified");
                self.do_users();
            }
            ModelKind::Name => {
                self.do_time("created");
                self.do_time("modified");
                self.do_users();
                match self.d.get_str("misspellings").unwrap_or("no") {
                    "no" => self.where_("names.correct_spelling_id IS NULL"),
                    "only" => self.where_("names.correct_spelling_id IS NOT NULL"),
                    _ => {}
                }
                match self.d.get_str("deprecated").unwrap_or("either") {
                    "no" => self.where_("names.deprecated IS FALSE"),
                    "only" => self.where_("names.deprecated IS TRUE"),
                    _ => {}
                }
                self.do_objects_by_name(ModelKind::Name, "synonym_names", "names.id", true, None)?;
            }
            ModelKind::Observation => self.initialize_observation_params()?,
            ModelKind::RssLog => self.do_time("modified"),
            ModelKind::SpeciesList => {
                self.do_time("created");
                self.do_time("modified");
                self.do_date("date", "species_lists.when");
                self.do_users();
            }
            ModelKind::User => {
                self.do_time("created");
                self.do_time("modified");
            }
        }
        Ok(())
    }

    fn initialize_observation_params(&mut self) -> QueryResult<()> {
        self.do_time("created");
        self.do_time("modified");
        self.do_date("date", "observations.when");
        self.do_users();
        self.do_objects_by_name(ModelKind::Name, "names", "observations.name_id", false, None)?;
        self.do_objects_by_name(
            ModelKind::Name,
            "synonym_names",
            "observations.name_id",
            true,
            None,
        )?;
        self.do_locations("observations", None)?;
        self.do_objects_by_name(
            ModelKind::SpeciesList,
            "species_lists",
            "observations_species_lists.species_list_id",
            false,
            Some(JoinTree::leaf("observations_species_lists")),
        )?;
        self.do_objects_by_name(
            ModelKind::Project,
            "projects",
            "projects_observations.project_id",
            false,
            Some(JoinTree::leaf("projects_observations")),
        )?;
        self.do_range("confidence", "observations.vote_cache", None);
        self.do_search("notes_has", "observations.notes");
        self.do_boolean(
            "is_col_loc",
            "observations.is_collection_location IS TRUE",
            "observations.is_collection_location IS FALSE",
        );
        self.do_boolean(
            "has_specimen",
            "observations.specimen IS TRUE",
            "observations.specimen IS FALSE",
        );
        self.do_boolean(
            "has_location",
            "observations.location_id IS NOT NULL",
            "observations.location_id IS NULL",
        );
        if self.d.has("has_name") {
            if let Some(unknown) = self.directory.unknown_name_id()? {
                self.do_boolean(
                    "has_name",
                    &format!("observations.name_id != {}", unknown),
                    &format!("observations.name_id = {}", unknown),
                );
            }
        }
        self.do_boolean(
            "has_notes",
            r#"LENGTH(COALESCE(observations.notes,"")) > 0"#,
            r#"LENGTH(COALESCE(observations.notes,"")) = 0"#,
        );
        self.do_boolean(
            "has_images",
            "observations.thumb_image_id IS NOT NULL",
            "observations.thumb_image_id IS NULL",
        );
        self.do_boolean(
            "has_votes",
            "observations.vote_cache IS NOT NULL",
            "observations.vote_cache IS NULL",
        );
        if self.d.has("has_comments") {
            self.join(JoinTree::leaf("comments"));
        }
        if self.d.get_str("comments_has").map_or(false, |s| !s.trim().is_empty()) {
            self.do_search("comments_has", "CONCAT(comments.summary,comments.comment)");
            self.join(JoinTree::leaf("comments"));
        }
        Ok(())
    }

    fn do_boolean(&mut self, arg: &str, if_true: &str, if_false: &str) {
        if let Some(value) = self.d.get_bool(arg) {
            self.where_(if value { if_true } else { if_false });
        }
    }

    fn do_search(&mut self, arg: &str, field: &str) {
        if let Some(pattern) = self.d.get_str(arg) {
            let condition = google_conditions(&google_parse(pattern), field);
            if !condition.is_empty() {
                self.where_(condition);
            }
        }
    }

    fn do_range(&mut self, arg: &str, column: &str, join: Option<JoinTree>) {
        let bounds: Vec<String> = match self.d.get(arg) {
            Some(ParamValue::FloatList(v)) => v.iter().map(f64::to_string).collect(),
            Some(ParamValue::IntList(v)) => v.iter().map(i64::to_string).collect(),
            _ => return,
        };
        let mut added = false;
        if let Some(min) = bounds.first() {
            self.where_(format!("{} >= {}", column, min));
            added = true;
        }
        if let Some(max) = bounds.get(1) {
            self.where_(format!("{} <= {}", column, max));
            added = true;
        }
        if let (true, Some(join)) = (added, join) {
            self.join(join);
        }
    }

    fn do_users(&mut self) {
        if let Some(ids) = self.d.get_int_list("users") {
            let condition = format!("{}.user_id IN ({})", self.table, clean_id_set(ids));
            self.where_(condition);
        }
    }

    fn do_comment_types(&mut self) {
        let types = match self.d.get_str("types") {
            Some(types) => types,
            None => return,
        };
        let valid: Vec<&str> = types
            .split_whitespace()
            .filter(|t| {
                t.parse::<ModelKind>().map_or(false, |m| {
                    m.as_str() == *t
                        && matches!(
                            JoinGraph::edge("comments", m.table_name()),
                            Some(JoinColumn::Polymorphic(_))
                        )
                })
            })
            .collect();
        if !valid.is_empty() {
            self.where_(format!("comments.target_type IN ('{}')", valid.join("','")));
        }
    }

    fn do_time(&mut self, arg: &str) {
        let column = format!("{}.{}", self.table, arg);
        if let Some(values) = self.d.get_str_list(arg).map(|v| v.to_vec()) {
            for (i, value) in values.iter().take(2).enumerate() {
                if let Some(condition) = time_half(i == 0, value, &column) {
                    self.where_(condition);
                }
            }
        }
    }

    fn do_date(&mut self, arg: &str, column: &str) {
        if let Some(values) = self.d.get_str_list(arg).map(|v| v.to_vec()) {
            for (i, value) in values.iter().take(2).enumerate() {
                if let Some(condition) = date_half(i == 0, value, column) {
                    self.where_(condition);
                }
            }
        }
    }

    /// Ids of `target` rows named by the values of `arg`. Numeric values
    /// are ids; anything else is looked up by the model's display column.
    fn resolve_objects(&self, target: ModelKind, values: &[String], synonyms: bool) -> QueryResult<Vec<i64>> {
        let mut ids: Vec<i64> = Vec::new();
        for value in values {
            let value = value.trim();
            if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(id) = value.parse::<i64>() {
                    if self.directory.exists(target, id)? {
                        ids.push(id);
                    }
                }
                continue;
            }
            let columns: &[&str] = match target {
                ModelKind::Name => &["search_name", "text_name"],
                ModelKind::Location => &["name", "scientific_name"],
                ModelKind::SpeciesList | ModelKind::Project => &["title"],
                ModelKind::User => &["login", "name"],
                _ => &[],
            };
            for column in columns {
                let found = self.directory.find_ids_by(target, column, value)?;
                if !found.is_empty() {
                    ids.extend(found);
                    break;
                }
            }
        }
        if synonyms {
            let mut expanded = Vec::new();
            for id in ids {
                expanded.extend(self.directory.name_synonym_ids(id)?);
            }
            ids = expanded;
        }
        Ok(ids)
    }

    fn do_objects_by_name(
        &mut self,
        target: ModelKind,
        arg: &str,
        column: &str,
        synonyms: bool,
        join: Option<JoinTree>,
    ) -> QueryResult<bool> {
        let values = match self.d.get_str_list(arg) {
            Some(values) if !values.is_empty() => values.to_vec(),
            _ => return Ok(false),
        };
        let ids = self.resolve_objects(target, &values, synonyms)?;
        if let Some(join) = join {
            self.join(join);
        }
        self.where_(format!("{} IN ({})", column, clean_id_set(&ids)));
        Ok(true)
    }

    fn do_locations(&mut self, table: &str, join: Option<JoinTree>) -> QueryResult<()> {
        let values = match self.d.get_str_list("locations") {
            Some(values) if !values.is_empty() => values.to_vec(),
            _ => return Ok(()),
        };
        let ids = self.resolve_objects(ModelKind::Location, &values, false)?;
        let mut condition = format!("{}.location_id IN ({})", table, clean_id_set(&ids));
        for value in &values {
            if value.chars().any(|c| !c.is_ascii_digit()) {
                condition.push_str(&format!(
                    " OR {}.where LIKE '%{}%'",
                    table,
                    clean_pattern(value)
                ));
            }
        }
        if let Some(join) = join {
            self.join(join);
        }
        self.where_(condition);
        Ok(())
    }

    // ----------------------------------------------------------------
    //  Raw SQL overrides
    // ----------------------------------------------------------------

    fn initialize_overrides(&mut self) -> QueryResult<()> {
        if let Some(join) = self.d.get_json("join") {
            self.clauses.add_join_json(join)?;
        }
        if let Some(tables) = self.d.get_str_list("tables") {
            self.clauses.tables.extend(tables.iter().cloned());
        }
        if let Some(conditions) = self.d.get_str_list("where") {
            self.clauses.where_.extend(conditions.iter().cloned());
        }
        if let Some(group) = self.d.get_str("group") {
            self.clauses.group = Some(group.to_string());
        }
        if let Some(order) = self.d.get_str("order") {
            self.clauses.order = order.to_string();
        }
        Ok(())
    }
}

fn parse_part(part: Option<&str>, default: u32) -> u32 {
    part.and_then(|p| p.parse().ok()).unwrap_or(default)
}

/// One side of a `YYYY[-MM[-DD[-HH[-MM[-SS]]]]]` range.
fn time_half(min: bool, value: &str, column: &str) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    let dir = if min { '>' } else { '<' };
    let mut parts = value.split('-');
    let year = parse_part(parts.next(), 0);
    let defaults: [u32; 5] = if min { [1, 1, 0, 0, 0] } else { [12, 31, 24, 60, 60] };
    let rest: Vec<u32> = defaults.iter().map(|d| parse_part(parts.next(), *d)).collect();
    Some(format!(
        "{} {}= '{:04}-{:02}-{:02} {:02}:{:02}:{:02}'",
        column, dir, year, rest[0], rest[1], rest[2], rest[3], rest[4]
    ))
}

/// One side of a date range: a full `YYYY[-MM[-DD]]` date, or a
/// `MM[-DD]` wildcard that matches any year.
fn date_half(min: bool, value: &str, column: &str) -> Option<String> {
    let dir = if min { '>' } else { '<' };
    let full_date = value
        .get(..4)
        .map_or(false, |year| year.chars().all(|c| c.is_ascii_digit()));
    if full_date {
        let mut parts = value.split('-');
        let year = parse_part(parts.next(), 0);
        let month = parse_part(parts.next(), if min { 1 } else { 12 });
        let day = parse_part(parts.next(), if min { 1 } else { 31 });
        Some(format!("{} {}= '{:04}-{:02}-{:02}'", column, dir, year, month, day))
    } else if let Some((month, day)) = value.split_once('-') {
        Some(format!(
            "MONTH({col}) {dir} {month} OR (MONTH({col}) = {month} AND DAY({col}) {dir}= {day})",
            col = column,
            dir = dir,
            month = month,
            day = day
        ))
    } else if !value.is_empty() {
        Some(format!("MONTH({}) {}= {}", column, dir, value))
    } else {
        None
    }
}

/// `"Rolf <rolf@example.com>"` -> `"Rolf"`
fn strip_email(user: &str) -> String {
    let mut out = String::with_capacity(user.len());
    let mut depth = 0usize;
    for c in user.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 => depth -= 1,
            c if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim_end().to_string()
}

/// Human-readable singular name of a model.
fn label(model: ModelKind) -> &'static str {
    match model {
        ModelKind::LocationDescription => "Location Description",
        ModelKind::NameDescription => "Name Description",
        ModelKind::RssLog => "Activity Log",
        ModelKind::SpeciesList => "Species List",
        other => other.as_str(),
    }
}

/// Title for a query: the `title` param if given, otherwise one generated
/// from the model and flavor.
pub(crate) fn title(d: &QueryDescriptor) -> String {
    if let Some(title) = d.get_str("title") {
        return title.to_string();
    }
    let plural = d.model().plural_label();
    let entity = |param: &str, model: ModelKind| match d.get_int(param) {
        Some(id) => format!("{} #{}", label(model), id),
        None => label(model).to_string(),
    };

    match d.flavor() {
        Flavor::AdvancedSearch => format!("Advanced Search of {}", plural),
        Flavor::All => match d.get_str("by") {
            Some(by) => format!("{} by {}", plural, by.replace('_', " ")),
            None => plural.to_string(),
        },
        Flavor::AtLocation => format!("{} at {}", plural, entity("location", ModelKind::Location)),
        Flavor::AtWhere => format!("{} at '{}'", plural, d.get_str("location").unwrap_or_default()),
        Flavor::ByAuthor => format!("{} authored by {}", plural, entity("user", ModelKind::User)),
        Flavor::ByEditor => format!("{} edited by {}", plural, entity("user", ModelKind::User)),
        Flavor::ByRssLog => format!("{} by Activity", plural),
        Flavor::ByUser => format!("{} by {}", plural, entity("user", ModelKind::User)),
        Flavor::ForObject => {
            let target = d
                .get_str("type")
                .and_then(|t| t.parse::<ModelKind>().ok())
                .unwrap_or(ModelKind::Observation);
            format!("{} on {}", plural, entity("object", target))
        }
        Flavor::ForUser => format!("{} for {}", plural, entity("user", ModelKind::User)),
        Flavor::InSet => format!("Selected {}", plural),
        Flavor::InSpeciesList => format!(
            "{} in {}",
            plural,
            entity("species_list", ModelKind::SpeciesList)
        ),
        Flavor::InsideObservation => format!(
            "{} of {}",
            plural,
            entity("observation", ModelKind::Observation)
        ),
        Flavor::OfChildren | Flavor::WithObservationsOfChildren => format!(
            "{} of children of {}",
            plural,
            entity("name", ModelKind::Name)
        ),
        Flavor::OfName | Flavor::WithObservationsOfName => {
            let modifier = match (
                d.get_str("synonyms").unwrap_or("no"),
                d.get_str("nonconsensus").unwrap_or("no"),
            ) {
                (_, "no") | (_, "") => "",
                _ => " (including nonconsensus)",
            };
            let synonyms = if d.get_str("synonyms").unwrap_or("no") == "no" {
                ""
            } else {
                " or synonyms"
            };
            format!(
                "{} of {}{}{}",
                plural,
                entity("name", ModelKind::Name),
                synonyms,
                modifier
            )
        }
        Flavor::OfParents => format!("{} of parents of {}", plural, entity("name", ModelKind::Name)),
        Flavor::PatternSearch => format!(
            "{} matching '{}'",
            plural,
            d.get_str("pattern").unwrap_or_default()
        ),
        Flavor::WithDescriptions => format!("{} with Descriptions", plural),
        Flavor::WithDescriptionsByAuthor => format!(
            "{} with Descriptions authored by {}",
            plural,
            entity("user", ModelKind::User)
        ),
        Flavor::WithDescriptionsByEditor => format!(
            "{} with Descriptions edited by {}",
            plural,
            entity("user", ModelKind::User)
        ),
        Flavor::WithDescriptionsByUser => format!(
            "{} with Descriptions by {}",
            plural,
            entity("user", ModelKind::User)
        ),
        Flavor::WithDescriptionsInSet => format!(
            "{} with {}",
            plural,
            d.get_str("old_title").unwrap_or("Selected Descriptions")
        ),
        Flavor::WithObservations => format!("{} with Observations", plural),
        Flavor::WithObservationsAtLocation => format!(
            "{} with Observations at {}",
            plural,
            entity("location", ModelKind::Location)
        ),
        Flavor::WithObservationsAtWhere => format!(
            "{} with Observations at '{}'",
            plural,
            d.get_str("location").unwrap_or_default()
        ),
        Flavor::WithObservationsByUser => format!(
            "{} with Observations by {}",
            plural,
            entity("user", ModelKind::User)
        ),
        Flavor::WithObservationsInSet => format!(
            "{} with {}",
            plural,
            d.get_str("old_title").unwrap_or("Selected Observations")
        ),
        Flavor::WithObservationsInSpeciesList => format!(
            "{} with Observations in {}",
            plural,
            entity("species_list", ModelKind::SpeciesList)
        ),
    }
}
