use crate::table::Table;
use anyhow::{Context, Result};
use duck::Connection;
use std::path::Path;

/// Thin wrapper around an in-memory DuckDB connection used to ingest CSV files.
pub struct DuckDB {
    conn: Connection,
}

impl DuckDB {
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory DuckDB")?;
        Ok(Self { conn })
    }

    pub fn execute(&self, sql: &str) -> Result<usize> {
        self.conn
            .execute(sql, [])
            .context("Failed to execute query")
    }

    pub fn query_all<T, F>(&self, sql: &str, row_mapper: F) -> Result<Vec<T>>
    where
        F: Fn(&duck::Row) -> Result<T>,
    {
        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("Failed to prepare query: {}", sql))?;
        let mut rows = stmt.query([])?;

        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(row_mapper(row)?);
        }
        Ok(results)
    }

    /// Column names of a query's result, in order.
    pub fn describe(&self, sql: &str) -> Result<Vec<String>> {
        self.query_all(&format!("DESCRIBE {}", sql), |row| {
            Ok(row.get::<_, String>(0)?)
        })
    }

    /// Materialize every row of `sql` as nullable text cells.
    pub fn query_table(&self, sql: &str) -> Result<Table> {
        let headers = self
            .describe(sql)
            .with_context(|| format!("Failed to describe query: {}", sql))?;
        let width = headers.len();

        let rows = self.query_all(sql, |row| {
            (0..width)
                .map(|idx| Ok(row.get::<_, Option<String>>(idx)?))
                .collect::<Result<Vec<_>>>()
        })?;

        Ok(Table::new(headers, rows))
    }

    /// Read a CSV file with a header row. Every column is read as text so that
    /// identifiers like organization numbers keep their exact spelling.
    pub fn read_csv(&self, path: &Path) -> Result<Table> {
        let sql = format!(
            "SELECT * FROM read_csv('{}', header = true, all_varchar = true)",
            path.display().to_string().replace('\'', "''")
        );
        self.query_table(&sql)
            .with_context(|| format!("Failed to read CSV file: {}", path.display()))
    }
}
