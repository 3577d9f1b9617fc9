use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub const ALL_COLUMNS: &str = "__all__";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid tables.json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database {db_id}: column {column} refers to missing table index {table}")]
    MissingTable {
        db_id: String,
        column: String,
        table: i64,
    },

    #[error("Database {db_id}: foreign key refers to missing column index {column}")]
    MissingColumn { db_id: String, column: usize },
}

/// One entry of a Spider/BIRD `tables.json` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDefinition {
    pub db_id: String,
    pub table_names_original: Vec<String>,
    /// `(table index, column name)`; index `-1` is the `*` pseudo column.
    pub column_names_original: Vec<(i64, String)>,
    #[serde(default)]
    pub foreign_keys: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
}

/// Canonical identifier of a schema column, `__table.column__`.
pub fn column_id(table: &str, column: &str) -> String {
    format!("__{}.{}__", table, column)
}

/// Maps every foreign-key-linked column to one representative so that
/// `t1.singer_id = t2.singer_id` joins compare equal whichever side is named.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForeignKeyMap {
    canonical: HashMap<String, String>,
}

impl ForeignKeyMap {
    pub fn resolve<'a>(&'a self, column: &'a str) -> &'a str {
        self.canonical
            .get(column)
            .map(String::as_str)
            .unwrap_or(column)
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    fn build(ids: &[String], links: &[(usize, usize)]) -> Self {
        let mut parent: Vec<usize> = (0..ids.len()).collect();
        fn find(parent: &mut [usize], x: usize) -> usize {
            let mut root = x;
            while parent[root] != root {
                root = parent[root];
            }
            let mut node = x;
            while parent[node] != root {
                let next = parent[node];
                parent[node] = root;
                node = next;
            }
            root
        }
        for &(a, b) in links {
            let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
            if ra != rb {
                // smallest id string wins so the representative is stable
                if ids[ra] <= ids[rb] {
                    parent[rb] = ra;
                } else {
                    parent[ra] = rb;
                }
            }
        }
        let mut canonical = HashMap::new();
        for &(a, b) in links {
            for x in [a, b] {
                let root = find(&mut parent, x);
                canonical.insert(ids[x].clone(), ids[root].clone());
            }
        }
        Self { canonical }
    }
}

/// Lower-cased schema of one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub db_id: String,
    tables: Vec<TableSchema>,
    by_name: HashMap<String, usize>,
    keys: ForeignKeyMap,
}

impl Schema {
    pub fn from_definition(def: &DatabaseDefinition) -> Result<Self, SchemaError> {
        let mut tables: Vec<TableSchema> = def
            .table_names_original
            .iter()
            .map(|t| TableSchema {
                name: t.to_lowercase(),
                columns: Vec::new(),
            })
            .collect();

        let mut ids = Vec::with_capacity(def.column_names_original.len());
        for (table, column) in &def.column_names_original {
            let column = column.to_lowercase();
            if *table < 0 {
                ids.push(ALL_COLUMNS.to_string());
                continue;
            }
            let entry = tables
                .get_mut(*table as usize)
                .ok_or_else(|| SchemaError::MissingTable {
                    db_id: def.db_id.clone(),
                    column: column.clone(),
                    table: *table,
                })?;
            ids.push(column_id(&entry.name, &column));
            entry.columns.push(column);
        }

        for &(a, b) in &def.foreign_keys {
            for column in [a, b] {
                if column >= ids.len() {
                    return Err(SchemaError::MissingColumn {
                        db_id: def.db_id.clone(),
                        column,
                    });
                }
            }
        }

        let by_name = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Ok(Self {
            db_id: def.db_id.clone(),
            tables,
            by_name,
            keys: ForeignKeyMap::build(&ids, &def.foreign_keys),
        })
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.by_name.get(name).map(|i| &self.tables[*i])
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.table(table)
            .map(|t| t.columns.iter().any(|c| c == column))
            .unwrap_or(false)
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn foreign_keys(&self) -> &ForeignKeyMap {
        &self.keys
    }
}

/// Every database described by one `tables.json` document, keyed by `db_id`.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    schemas: HashMap<String, Arc<Schema>>,
}

impl SchemaCatalog {
    pub fn from_definitions(defs: &[DatabaseDefinition]) -> Result<Self, SchemaError> {
        let schemas = defs
            .iter()
            .map(|d| Ok((d.db_id.clone(), Arc::new(Schema::from_definition(d)?))))
            .collect::<Result<_, SchemaError>>()?;
        Ok(Self { schemas })
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self, SchemaError> {
        let defs: Vec<DatabaseDefinition> = serde_json::from_value(value)?;
        Self::from_definitions(&defs)
    }

    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        let defs: Vec<DatabaseDefinition> = serde_json::from_str(json)?;
        Self::from_definitions(&defs)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn get(&self, db_id: &str) -> Option<&Arc<Schema>> {
        self.schemas.get(db_id)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
