pub mod transaction;
pub mod alert;

pub use transaction::{Block, BlockHeader, Transaction};
pub use alert::{Alert, Severity};
