//! CLI command implementations
//!
//! Commands are thin: they build an engine, make one call and print the
//! result as JSON. Nothing here changes query semantics.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use crate::backend::{ScriptedBackend, SqlBackend};
use crate::config::EngineConfig;
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::pattern_search::Parser;
use crate::query::{reverse_order, QueryArgs, QueryEngine, QueryError};
use crate::schema::ModelKind;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Parse arguments and run the chosen command.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    // stdout carries exactly one JSON response
    Logger::send_all_to_stderr();
    run_command(cli.command)
}

pub fn run_command(cmd: Command) -> CliResult<()> {
    let data = match cmd {
        Command::Parse { pattern } => parse(&pattern)?,
        Command::Sql {
            model,
            flavor,
            params,
            fixture,
        } => sql(&model, &flavor, &params, fixture.as_deref())?,
        Command::Save {
            config,
            model,
            flavor,
            params,
            fixture,
        } => save(&config, &model, &flavor, &params, fixture.as_deref())?,
        Command::Cleanup { config } => cleanup(&config)?,
        Command::ReverseOrder { order } => json!({ "order": reverse_order(&order) }),
    };
    write_response(data)
}

/// Terms of a search string.
pub fn parse(pattern: &str) -> CliResult<Value> {
    let parser = Parser::new(pattern)?;
    Ok(json!({
        "clean": parser.clean_incoming_string(),
        "terms": serde_json::to_value(parser.terms())?,
    }))
}

/// SQL a query would run, against an in-memory store.
pub fn sql(model: &str, flavor: &str, params: &str, fixture: Option<&Path>) -> CliResult<Value> {
    let engine = QueryEngine::from_config(EngineConfig::default(), load_backend(fixture)?);
    let query = engine.lookup(parse_model(model)?, flavor, parse_params(params)?)?;
    Ok(json!({
        "model": query.model(),
        "flavor": query.flavor().as_str(),
        "title": query.title(),
        "sql": query.sql()?,
    }))
}

/// Intern a query in the configured store and report its token.
pub fn save(
    config_path: &Path,
    model: &str,
    flavor: &str,
    params: &str,
    fixture: Option<&Path>,
) -> CliResult<Value> {
    let config = load_config(config_path)?;
    let engine = QueryEngine::from_config(config, load_backend(fixture)?);
    let query = engine.lookup_and_save(parse_model(model)?, flavor, parse_params(params)?)?;
    Ok(json!({
        "id": query.record_id(),
        "model": query.model(),
        "flavor": query.flavor().as_str(),
        "descriptor": query.serialize()?,
    }))
}

/// Run cleanup once against the configured store.
pub fn cleanup(config_path: &Path) -> CliResult<Value> {
    let config = load_config(config_path)?;
    let engine = QueryEngine::from_config(config, Arc::new(ScriptedBackend::new()));
    let deleted = engine.cleanup(Utc::now())?;
    Ok(json!({
        "deleted": deleted,
        "remaining": engine.store().count().map_err(QueryError::from)?,
    }))
}

fn load_config(path: &Path) -> CliResult<EngineConfig> {
    let config = EngineConfig::load(path)?;
    Logger::set_min_severity(config.log_severity()?);
    log_event_with_fields(Event::ConfigLoaded, &[("path", &path.display().to_string())]);
    Ok(config)
}

fn load_backend(fixture: Option<&Path>) -> CliResult<Arc<dyn SqlBackend>> {
    let backend = match fixture {
        Some(path) => ScriptedBackend::from_fixture(path)?,
        None => ScriptedBackend::new(),
    };
    Ok(Arc::new(backend))
}

fn parse_model(model: &str) -> CliResult<ModelKind> {
    model
        .parse()
        .map_err(|_| QueryError::unknown_model(model).into())
}

fn parse_params(params: &str) -> CliResult<QueryArgs> {
    let value: Value = serde_json::from_str(params)
        .map_err(|e| CliError::invalid_argument(format!("--params is not valid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(CliError::invalid_argument("--params must be a JSON object"));
    }
    Ok(QueryArgs::from_json(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::errors::CliErrorCode;
    use std::fs;
    use tempfile::TempDir;

    fn create_config(temp_dir: &TempDir) -> std::path::PathBuf {
        let store = temp_dir.path().join("queries.json");
        let config_path = temp_dir.path().join("mycoquery.json");
        let config = json!({
            "store_path": store,
            "log_level": "ERROR"
        });
        fs::write(&config_path, serde_json::to_string(&config).unwrap()).unwrap();
        config_path
    }

    #[test]
    fn test_parse_prints_terms() {
        let data = parse("Agaricus user:rolf").unwrap();
        assert_eq!(data["clean"], "Agaricus user:rolf");
        assert_eq!(data["terms"][0]["var"], "pattern");
        assert_eq!(data["terms"][1]["vals"][0], "rolf");
    }

    #[test]
    fn test_sql_for_pattern_search() {
        let data = sql("Name", "pattern_search", r#"{"pattern": "agaricus"}"#, None).unwrap();
        assert_eq!(data["flavor"], "pattern_search");
        assert!(data["sql"].as_str().unwrap().contains("LIKE '%agaricus%'"));
    }

    #[test]
    fn test_sql_rejects_bad_arguments() {
        let err = sql("Mushroom", "all", "{}", None).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::QueryFailed);

        let err = sql("Name", "all", "[1, 2]", None).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::InvalidArgument);
    }

    #[test]
    fn test_save_is_idempotent_across_runs() {
        let temp_dir = TempDir::new().unwrap();
        let config = create_config(&temp_dir);
        let first = save(&config, "Name", "all", r#"{"by": "created"}"#, None).unwrap();
        let second = save(&config, "names", "all", r#"{"by": "created"}"#, None).unwrap();
        assert_eq!(first["id"], second["id"]);
        assert!(temp_dir.path().join("queries.json").exists());
    }

    #[test]
    fn test_cleanup_reports_counts() {
        let temp_dir = TempDir::new().unwrap();
        let config = create_config(&temp_dir);
        save(&config, "Name", "all", "{}", None).unwrap();
        let data = cleanup(&config).unwrap();
        assert_eq!(data["deleted"], 0);
        assert_eq!(data["remaining"], 1);
    }

    #[test]
    fn test_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let err = cleanup(&temp_dir.path().join("nope.json")).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }
}
