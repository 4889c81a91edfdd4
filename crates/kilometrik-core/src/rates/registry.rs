use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::MileageError;
use crate::rates::table::{RateTable, RateTableKey};
use crate::MileageResult;

/// What to do when no table exists for the requested year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearFallback {
    /// Fail with `UnknownRateTable`
    #[default]
    Exact,
    /// Use the latest table of the same country dated before the year
    NearestPrior,
}

/// Process-wide set of loaded rate tables, addressable by (country, year).
///
/// Tables are immutable and reference counted, so a registry can be
/// cloned cheaply and shared across threads.
#[derive(Debug, Clone, Default)]
pub struct RateTableRegistry {
    tables: BTreeMap<RateTableKey, Arc<RateTable>>,
}

impl RateTableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the embedded French barème.
    #[cfg(feature = "builtin_tables")]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for table in crate::rates::builtin::france_tables() {
            registry.insert(table);
        }
        registry
    }

    /// Add a table, replacing any table with the same key.
    pub fn insert(&mut self, table: RateTable) -> Option<Arc<RateTable>> {
        let key = table.key().clone();
        debug!(table = %key, "registering rate table");
        self.tables.insert(key, Arc::new(table))
    }

    /// Parse a JSON document holding one table or an array of tables.
    pub fn load_json(&mut self, json: &str) -> MileageResult<usize> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let tables: Vec<RateTable> = if value.is_array() {
            serde_json::from_value(value)?
        } else {
            vec![serde_json::from_value(value)?]
        };
        let count = tables.len();
        for table in tables {
            self.insert(table);
        }
        Ok(count)
    }

    pub fn keys(&self) -> impl Iterator<Item = &RateTableKey> {
        self.tables.keys()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Exact lookup. The engine never guesses a year on its own.
    pub fn get(&self, country: &str, year: i32) -> MileageResult<&RateTable> {
        let key = RateTableKey::new(country, year);
        self.tables
            .get(&key)
            .map(|t| t.as_ref())
            .ok_or(MileageError::UnknownRateTable {
                country: key.country,
                year,
            })
    }

    /// Lookup honouring an explicitly requested fallback policy.
    pub fn lookup(
        &self,
        country: &str,
        year: i32,
        fallback: YearFallback,
    ) -> MileageResult<&RateTable> {
        match fallback {
            YearFallback::Exact => self.get(country, year),
            YearFallback::NearestPrior => {
                let upper = RateTableKey::new(country, year);
                let lower = RateTableKey::new(country, i32::MIN);
                let found = self
                    .tables
                    .range(lower..=upper)
                    .next_back()
                    .map(|(_, t)| t.as_ref());
                match found {
                    Some(table) => {
                        if table.key().year != year {
                            warn!(
                                requested = year,
                                used = table.key().year,
                                country = %table.key().country,
                                "no rate table for requested year, using nearest prior"
                            );
                        }
                        Ok(table)
                    }
                    None => Err(MileageError::UnknownRateTable {
                        country: country.to_uppercase(),
                        year,
                    }),
                }
            }
        }
    }
}
