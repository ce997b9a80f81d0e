//! Types that represent the core data model: the three record kinds read from the spreadsheet and
//! the metadata that accompanies each cached dataset.
mod amount;
mod budget;
mod columns;
mod metadata;
mod template;
mod transaction;

pub use amount::{Amount, AmountError};
pub use budget::Budget;
pub use columns::{SheetColumns, SheetRecord};
pub use metadata::{CacheMetadata, CacheStatus, Domain};
pub use template::BudgetTemplate;
pub use transaction::Transaction;
