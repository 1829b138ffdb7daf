//! SQLite storage implementation

use std::collections::HashMap;
use std::path::Path;
use indexmap::IndexMap;
use rusqlite::{Connection, DatabaseName, OpenFlags, params_from_iter};
use rusqlite::types::Value as SqlValue;
use crate::Result;
use crate::value::Value;
use super::schema::{self, Column, ForeignKey, quote_ident};

/// A flat row: column name → stored value
pub type Row = IndexMap<String, Value>;

/// Row filtering, ordering and pagination for [`SqliteStore::query`]
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// SQL condition with `?` placeholders
    pub where_clause: Option<String>,
    pub params: Vec<Value>,
    /// SQL ordering term, e.g. `"name DESC"`
    pub order_by: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Restrict the returned columns
    pub select: Option<Vec<String>>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, where_clause: impl Into<String>, params: Vec<Value>) -> Self {
        self.where_clause = Some(where_clause.into());
        self.params = params;
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

/// SQLite-backed storage engine for record tables
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an existing file for reading, leaving its schema untouched
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        // Foreign keys are relation metadata only; list columns hold JSON key arrays
        self.conn.execute_batch("PRAGMA foreign_keys = OFF")?;
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    /// Backing file of the main database, `":memory:"` for in-memory engines
    pub fn filename(&self) -> Result<String> {
        let file: String = self
            .conn
            .query_row("SELECT file FROM pragma_database_list WHERE name = 'main'", [], |row| row.get(0))?;
        if file.is_empty() || file == ":memory:" {
            Ok(":memory:".to_string())
        } else {
            Ok(file)
        }
    }

    pub fn is_in_memory(&self) -> Result<bool> {
        Ok(self.filename()? == ":memory:")
    }

    // ========== Table Operations ==========

    /// Names of all user tables, registry table included
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Foreign keys declared on a table
    pub fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let mut stmt = self
            .conn
            .prepare(r#"SELECT "from", "table", "to" FROM pragma_foreign_key_list(?1) ORDER BY id"#)?;
        let keys = stmt
            .query_map([table], |row| {
                Ok(ForeignKey {
                    column: row.get(0)?,
                    other_table: row.get(1)?,
                    other_column: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    /// Foreign-key columns of a table mapped to their target tables
    pub fn foreign_key_map(&self, table: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .foreign_keys(table)?
            .into_iter()
            .map(|fk| (fk.column, fk.other_table))
            .collect())
    }

    /// Create the table, or add foreign keys it does not declare yet
    fn ensure_table(&self, table: &str, columns: &[Column], primary_key: &str, foreign_keys: &[ForeignKey]) -> Result<()> {
        if !self.table_exists(table)? {
            tracing::debug!("Creating table '{}' ({} columns)", table, columns.len());
            self.conn
                .execute(&schema::create_table_sql(table, columns, primary_key, foreign_keys), [])?;
            return Ok(());
        }

        let mut existing = self.foreign_keys(table)?;
        let missing: Vec<&ForeignKey> = foreign_keys.iter().filter(|fk| !existing.contains(fk)).collect();
        if missing.is_empty() {
            return Ok(());
        }
        existing.extend(missing.into_iter().cloned());
        self.rebuild_table(table, columns, primary_key, &existing)
    }

    /// Recreate a table with a new foreign-key set, keeping its rows
    fn rebuild_table(&self, table: &str, columns: &[Column], primary_key: &str, foreign_keys: &[ForeignKey]) -> Result<()> {
        tracing::debug!("Rebuilding table '{}' with {} foreign keys", table, foreign_keys.len());
        let staging = format!("{}__rebuild", table);
        let column_list = columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(&schema::create_table_sql(&staging, columns, primary_key, foreign_keys), [])?;
        tx.execute(
            &format!(
                "INSERT INTO {} ({cols}) SELECT {cols} FROM {}",
                quote_ident(&staging),
                quote_ident(table),
                cols = column_list
            ),
            [],
        )?;
        tx.execute(&format!("DROP TABLE {}", quote_ident(table)), [])?;
        tx.execute(
            &format!("ALTER TABLE {} RENAME TO {}", quote_ident(&staging), quote_ident(table)),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ========== Row Operations ==========

    /// Insert or overwrite a row keyed by its primary key.
    ///
    /// The table is created from `columns` on first use.
    pub fn upsert(
        &self,
        table: &str,
        row: &Row,
        columns: &[Column],
        primary_key: &str,
        foreign_keys: &[ForeignKey],
    ) -> Result<()> {
        self.ensure_table(table, columns, primary_key, foreign_keys)?;

        let names: Vec<String> = row.keys().map(|k| quote_ident(k)).collect();
        let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{}", i)).collect();
        let updates: Vec<String> = row
            .keys()
            .filter(|k| k.as_str() != primary_key)
            .map(|k| format!("{0} = excluded.{0}", quote_ident(k)))
            .collect();
        let on_conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
            quote_ident(table),
            names.join(", "),
            placeholders.join(", "),
            quote_ident(primary_key),
            on_conflict
        );
        self.conn.execute(&sql, params_from_iter(row.values()))?;
        Ok(())
    }

    /// Rows of a table, filtered, ordered and paginated
    pub fn query(&self, table: &str, options: &QueryOptions) -> Result<Vec<Row>> {
        let select = match &options.select {
            Some(columns) => columns.iter().map(|c| quote_ident(c.trim())).collect::<Vec<_>>().join(", "),
            None => "*".to_string(),
        };
        let mut sql = format!("SELECT {} FROM {}", select, quote_ident(table));
        if let Some(where_clause) = &options.where_clause {
            sql.push_str(&format!(" WHERE {}", where_clause));
        }
        if let Some(order_by) = &options.order_by {
            sql.push_str(&format!(" ORDER BY {}", order_by));
        }
        match (options.limit, options.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query_map(params_from_iter(options.params.iter()), |row| {
                let mut out = Row::with_capacity(names.len());
                for (i, name) in names.iter().enumerate() {
                    let value: SqlValue = row.get(i)?;
                    out.insert(name.clone(), Value::from(value));
                }
                Ok(out)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Rows whose `column` equals `value`
    pub fn rows_where_eq(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>> {
        let options = QueryOptions::new().filter(format!("{} = ?1", quote_ident(column)), vec![value.clone()]);
        self.query(table, &options)
    }

    /// Number of rows in a table; zero if it was never created
    pub fn count(&self, table: &str) -> Result<usize> {
        if !self.table_exists(table)? {
            return Ok(0);
        }
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== Whole-Database Operations ==========

    /// Copy the whole database into a file
    pub fn backup_to(&self, path: &Path) -> Result<()> {
        self.conn.backup(DatabaseName::Main, path, None)?;
        Ok(())
    }

    /// Merge a database file into this one.
    ///
    /// Tables missing here are created from the file's own DDL. Rows whose
    /// primary key already exists are replaced by the file's copy.
    pub fn import_from(&self, path: &Path) -> Result<usize> {
        let source = path.to_string_lossy().into_owned();
        self.conn.execute("ATTACH DATABASE ?1 AS source", [source.as_str()])?;
        let imported = self.import_attached();
        self.conn.execute_batch("DETACH DATABASE source")?;
        imported
    }

    fn import_attached(&self) -> Result<usize> {
        let tables = {
            let mut stmt = self.conn.prepare(
                "SELECT name, sql FROM source.sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let tables = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            tables
        };

        let tx = self.conn.unchecked_transaction()?;
        let mut rows = 0;
        for (table, ddl) in &tables {
            let present: i64 = tx.query_row(
                "SELECT COUNT(*) FROM main.sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )?;
            if present == 0 {
                tx.execute(ddl, [])?;
            }
            let columns = {
                let mut stmt = tx.prepare(&format!("PRAGMA source.table_info({})", quote_ident(table)))?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(1))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                names.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
            };
            rows += tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO main.{t} ({cols}) SELECT {cols} FROM source.{t}",
                    t = quote_ident(table),
                    cols = columns
                ),
                [],
            )?;
        }
        tx.commit()?;
        tracing::debug!("Imported {} rows across {} tables", rows, tables.len());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person_columns() -> Vec<Column> {
        vec![
            Column { name: "uuid".into(), affinity: Some("TEXT") },
            Column { name: "name".into(), affinity: Some("TEXT") },
        ]
    }

    fn person_row(uuid: &str, name: &str) -> Row {
        let mut row = Row::new();
        row.insert("uuid".into(), Value::from(uuid));
        row.insert("name".into(), Value::from(name));
        row
    }

    #[test]
    fn test_upsert_overwrites_by_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        let columns = person_columns();

        store.upsert("Persons", &person_row("1", "Ann"), &columns, "uuid", &[]).unwrap();
        store.upsert("Persons", &person_row("2", "Bo"), &columns, "uuid", &[]).unwrap();
        store.upsert("Persons", &person_row("1", "Cy"), &columns, "uuid", &[]).unwrap();

        assert_eq!(store.count("Persons").unwrap(), 2);
        let rows = store.rows_where_eq("Persons", "uuid", &Value::from("1")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], Value::from("Cy"));
    }

    #[test]
    fn test_query_options() {
        let store = SqliteStore::open_in_memory().unwrap();
        let columns = person_columns();
        for (uuid, name) in [("1", "d"), ("2", "b"), ("3", "a"), ("4", "c")] {
            store.upsert("Persons", &person_row(uuid, name), &columns, "uuid", &[]).unwrap();
        }

        let rows = store.query("Persons", &QueryOptions::new().order_by("name")).unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![Value::from("a"), Value::from("b"), Value::from("c"), Value::from("d")]);

        let rows = store.query("Persons", &QueryOptions::new().order_by("uuid").limit(2).offset(1)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["uuid"], Value::from("2"));

        let rows = store.query("Persons", &QueryOptions::new().select(["name"])).unwrap();
        assert_eq!(rows[0].len(), 1);
    }

    #[test]
    fn test_foreign_keys_added_after_creation() {
        let store = SqliteStore::open_in_memory().unwrap();
        let columns = vec![
            Column { name: "uuid".into(), affinity: Some("TEXT") },
            Column { name: "person".into(), affinity: None },
        ];
        let mut row = Row::new();
        row.insert("uuid".into(), Value::from("e1"));
        row.insert("person".into(), Value::from("p1"));
        store.upsert("Employee", &row, &columns, "uuid", &[]).unwrap();
        assert!(store.foreign_keys("Employee").unwrap().is_empty());

        let fk = ForeignKey {
            column: "person".into(),
            other_table: "Persons".into(),
            other_column: "uuid".into(),
        };
        store.upsert("Employee", &row, &columns, "uuid", &[fk.clone()]).unwrap();
        assert_eq!(store.foreign_keys("Employee").unwrap(), vec![fk]);
        assert_eq!(store.count("Employee").unwrap(), 1);
        assert_eq!(store.foreign_key_map("Employee").unwrap()["person"], "Persons");
    }

    #[test]
    fn test_count_missing_table() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.count("Nothing").unwrap(), 0);
        assert_eq!(store.table_names().unwrap(), vec![schema::METADATA_TABLE.to_string()]);
        assert!(store.is_in_memory().unwrap());
    }

    #[test]
    fn test_import_merges_tables_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.db");
        let columns = person_columns();
        {
            let other = SqliteStore::open(&path).unwrap();
            other.upsert("Persons", &person_row("1", "Cy"), &columns, "uuid", &[]).unwrap();
            other.upsert("Persons", &person_row("3", "Di"), &columns, "uuid", &[]).unwrap();
            other.upsert("Pets", &person_row("9", "Rex"), &columns, "uuid", &[]).unwrap();
        }

        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert("Persons", &person_row("1", "Ann"), &columns, "uuid", &[]).unwrap();
        store.upsert("Persons", &person_row("2", "Bo"), &columns, "uuid", &[]).unwrap();

        assert_eq!(store.import_from(&path).unwrap(), 3);
        assert_eq!(store.count("Persons").unwrap(), 3);
        assert_eq!(store.count("Pets").unwrap(), 1);
        let rows = store.rows_where_eq("Persons", "uuid", &Value::from("1")).unwrap();
        assert_eq!(rows[0]["name"], Value::from("Cy"));
        // the attachment does not outlive the import
        let attached: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM pragma_database_list WHERE name = 'source'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(attached, 0);
    }

    #[test]
    fn test_read_only_open_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.db");
        Connection::open(&path).unwrap().execute_batch("CREATE TABLE t (x)").unwrap();

        let store = SqliteStore::open_read_only(&path).unwrap();
        assert_eq!(store.table_names().unwrap(), vec!["t".to_string()]);
        assert!(!store.table_exists(schema::METADATA_TABLE).unwrap());
    }
}
