use crate::parser::parse;
use crate::schema::{Schema, SchemaCatalog};
use tracing::{debug, warn};

/// Structural comparison of two queries against one schema.
///
/// Literal values are ignored, aliases are resolved to the tables they name,
/// and foreign-key-linked columns are treated as the same column. A query that
/// cannot be parsed never matches.
pub fn exact_match(predicted: &str, gold: &str, schema: &Schema) -> bool {
    let gold = match parse(gold, schema) {
        Ok(query) => query,
        Err(e) => {
            warn!(db_id = %schema.db_id, error = %e, "gold query could not be parsed");
            return false;
        }
    };
    let predicted = match parse(predicted, schema) {
        Ok(query) => query,
        Err(e) => {
            debug!(db_id = %schema.db_id, error = %e, "predicted query could not be parsed");
            return false;
        }
    };
    let keys = schema.foreign_keys();
    predicted.canonical(keys) == gold.canonical(keys)
}

/// Exact-match scorer over every database of a `tables.json` catalog.
#[derive(Debug, Clone, Default)]
pub struct ExactMatcher {
    catalog: SchemaCatalog,
}

impl ExactMatcher {
    pub fn new(catalog: SchemaCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// `false` for a `db_id` the catalog does not describe.
    pub fn matches(&self, db_id: &str, predicted: &str, gold: &str) -> bool {
        match self.catalog.get(db_id) {
            Some(schema) => exact_match(predicted, gold, schema),
            None => {
                warn!(db_id, "no schema for database, exact match scores 0");
                false
            }
        }
    }
}
