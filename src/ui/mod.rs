pub mod table;

pub use table::{summary_table, TableSummary};
