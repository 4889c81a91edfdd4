use kilometrik_core::rates::{RateTable, RateTableRegistry};
use tracing::info;

use super::file;

/// Builtin barème plus the tables of `path`, if given. Tables in the file
/// replace builtin ones with the same (country, year).
pub fn load_registry(path: Option<&str>) -> Result<RateTableRegistry, Box<dyn std::error::Error>> {
    let mut registry = RateTableRegistry::builtin();
    let Some(path) = path else {
        return Ok(registry);
    };

    let (canonical, contents) = file::read_text(path)?;
    let is_yaml = canonical
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    let count = if is_yaml {
        let tables = parse_yaml(&contents)
            .map_err(|e| format!("Failed to load rate tables from '{}': {}", canonical.display(), e))?;
        let count = tables.len();
        for table in tables {
            registry.insert(table);
        }
        count
    } else {
        registry
            .load_json(&contents)
            .map_err(|e| format!("Failed to load rate tables from '{}': {}", canonical.display(), e))?
    };

    info!(count, path = %canonical.display(), "loaded rate tables");
    Ok(registry)
}

/// A YAML document holds either one table or a list of tables.
fn parse_yaml(contents: &str) -> Result<Vec<RateTable>, serde_yaml::Error> {
    let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
    if value.is_sequence() {
        serde_yaml::from_value(value)
    } else {
        serde_yaml::from_value(value).map(|t| vec![t])
    }
}
