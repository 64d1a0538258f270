use super::{Table, TableError, TableResult, TabularStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File-backed [`TabularStore`]: one file holds one serde_json document with
/// all named tables of a format family (e.g. a spo or res file).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonTabularStore {
    tables: BTreeMap<String, Table>,
}

impl JsonTabularStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(path: impl AsRef<Path>) -> TableResult<Self> {
        let path = path.as_ref();
        let payload = std::fs::read_to_string(path).map_err(|error| TableError::Io {
            path: path.display().to_string(),
            detail: error.to_string(),
        })?;
        serde_json::from_str(&payload).map_err(|error| TableError::Io {
            path: path.display().to_string(),
            detail: format!("malformed table document: {error}"),
        })
    }

    pub fn save(&self, path: impl AsRef<Path>, overwrite: bool) -> TableResult<()> {
        let path = path.as_ref();
        if path.exists() && !overwrite {
            return Err(TableError::AlreadyExists {
                path: path.display().to_string(),
            });
        }
        let payload = serde_json::to_string(self).map_err(|error| TableError::Io {
            path: path.display().to_string(),
            detail: error.to_string(),
        })?;
        std::fs::write(path, payload).map_err(|error| TableError::Io {
            path: path.display().to_string(),
            detail: error.to_string(),
        })
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

impl TabularStore for JsonTabularStore {
    fn read_table(&self, name: &str) -> TableResult<Table> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| TableError::TableNotFound {
                table: name.to_string(),
            })
    }

    fn write_table(&mut self, table: Table) -> TableResult<()> {
        // Writing validates column lengths up front so a store never holds
        // a ragged table.
        table.rows()?;
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }
}
