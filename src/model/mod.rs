//! Types that represent the core data model, such as `Expense` and `Category`.
mod amount;
mod category;
mod expense;
mod filter;
mod record;
mod status;

pub use amount::{Amount, AmountError};
pub use category::{Category, CategoryUpdate, NewCategory};
pub use expense::{CategoryRef, Expense, ExpenseUpdate, NewExpense};
pub use filter::ExpenseFilter;
pub(crate) use record::replay_payload;
pub use record::{Collection, Record, ID_KEY, STATUS_KEY};
pub use status::SyncStatus;
