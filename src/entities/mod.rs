// Entity Models
//
// Five record types linked Person → User → UserAccount → Account → Company.
// Each entity knows its table, its column list and how to read itself from a
// row at a column offset, so one wide joined row can hydrate the whole chain.

pub mod person;
pub mod user;
pub mod company;
pub mod account;
pub mod user_account;

pub use person::Person;
pub use user::User;
pub use company::Company;
pub use account::Account;
pub use user_account::UserAccount;

use rusqlite::Row;

/// A mapped table
pub trait Entity: Sized + Clone + 'static {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    /// Read the entity from `row` starting at column `offset`
    ///
    /// Returns `None` when the leading key column is NULL (outer join miss).
    fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Option<Self>>;
}

/// Entity with a single integer primary key
pub trait Keyed: Entity {
    fn id(&self) -> i64;
}

/// `source.col AS label_col, ...` for a select list
pub fn labeled_columns(source: &str, label: &str, columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| format!("{}.{} AS {}_{}", source, column, label, column))
        .collect::<Vec<_>>()
        .join(", ")
}
