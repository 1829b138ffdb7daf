use tabled::{settings::Style, Table, Tabled};

/// One registered table of a saved database
#[derive(Debug, Clone, PartialEq, Tabled)]
pub struct TableSummary {
    #[tabled(rename = "Table")]
    pub table: String,
    #[tabled(rename = "Record Type")]
    pub record_type: String,
    #[tabled(rename = "Primary Key")]
    pub primary_key: String,
    #[tabled(rename = "Rows")]
    pub rows: usize,
}

pub fn summary_table(summaries: &[TableSummary]) -> String {
    if summaries.is_empty() {
        return String::new();
    }
    Table::new(summaries).with(Style::rounded()).to_string()
}
