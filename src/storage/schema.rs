//! Database schema definitions

use crate::record::{FieldDef, FieldType};

/// Name of the registry table
pub const METADATA_TABLE: &str = "__record_tables__";

/// SQL to create the registry table.
/// One row per table name; several tables may share a record type.
pub const CREATE_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS "__record_tables__" (
    table_name TEXT PRIMARY KEY,
    type_name TEXT NOT NULL,
    primary_keys TEXT NOT NULL
)
"#;

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![CREATE_METADATA_TABLE]
}

/// A column of a record table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Declared SQLite type; `None` keeps values in their native storage class
    pub affinity: Option<&'static str>,
}

impl Column {
    pub fn for_field(field: &FieldDef) -> Self {
        Self {
            name: field.name.to_string(),
            affinity: column_affinity(&field.ty),
        }
    }
}

/// A foreign-key association of a column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    pub column: String,
    pub other_table: String,
    pub other_column: String,
}

/// Column type for a declared field type
pub fn column_affinity(ty: &FieldType) -> Option<&'static str> {
    match ty {
        FieldType::Text | FieldType::Literal(_) | FieldType::List(_) => Some("TEXT"),
        FieldType::Integer | FieldType::Boolean => Some("INTEGER"),
        FieldType::Real => Some("FLOAT"),
        FieldType::Any | FieldType::Null | FieldType::Union(_) | FieldType::Record(_) => None,
    }
}

/// Quote an identifier; table names such as `test.db` are legal
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// SQL to create a record table
pub fn create_table_sql(table: &str, columns: &[Column], primary_key: &str, foreign_keys: &[ForeignKey]) -> String {
    let mut defs: Vec<String> = columns
        .iter()
        .map(|column| {
            let mut def = quote_ident(&column.name);
            if let Some(affinity) = column.affinity {
                def.push(' ');
                def.push_str(affinity);
            }
            if column.name == primary_key {
                def.push_str(" PRIMARY KEY");
            }
            def
        })
        .collect();

    for fk in foreign_keys {
        defs.push(format!(
            "FOREIGN KEY({}) REFERENCES {}({})",
            quote_ident(&fk.column),
            quote_ident(&fk.other_table),
            quote_ident(&fk.other_column)
        ));
    }

    format!("CREATE TABLE {} (\n    {}\n)", quote_ident(table), defs.join(",\n    "))
}
