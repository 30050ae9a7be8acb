// 💳 Account Entity - status plus Company relationship
//
// Relationship: company_id → Company (many-to-one). The lazy loader goes
// through the session identity map, so a company already in the session is
// returned without a statement.

use anyhow::{Context, Result};
use rusqlite::{params, Row};
use serde::Serialize;

use super::{Company, Entity, Keyed};
use crate::relation::Relation;
use crate::session::Session;

// ============================================================================
// ACCOUNT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: i64,

    /// Free-form status, e.g. "x3"
    pub status: String,

    /// Company ID (foreign key to Company entity)
    pub company_id: i64,

    pub company: Relation<Option<Company>>,
}

impl Account {
    pub fn create(session: &Session, status: impl Into<String>, company_id: i64) -> Result<Account> {
        let status = status.into();
        let id = session
            .connection()
            .insert(
                "INSERT INTO account (status, company_id) VALUES (?1, ?2)",
                params![status, company_id],
            )
            .with_context(|| format!("Failed to insert account for company {}", company_id))?;

        Ok(Account {
            id,
            status,
            company_id,
            company: Relation::NotLoaded,
        })
    }

    /// Related company, lazily loaded on first access
    pub fn company(&mut self, session: &Session) -> Result<Option<&mut Company>> {
        let company_id = self.company_id;
        let company = self
            .company
            .get_or_load(|| session.get::<Company>(company_id))?;
        Ok(company.as_mut())
    }
}

impl Entity for Account {
    const TABLE: &'static str = "account";
    const COLUMNS: &'static [&'static str] = &["id", "status", "company_id"];

    fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Option<Self>> {
        let Some(id) = row.get::<_, Option<i64>>(offset)? else {
            return Ok(None);
        };

        Ok(Some(Account {
            id,
            status: row.get(offset + 1)?,
            company_id: row.get(offset + 2)?,
            company: Relation::NotLoaded,
        }))
    }
}

impl Keyed for Account {
    fn id(&self) -> i64 {
        self.id
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::StatementCounter;
    use crate::db::open_store;

    #[test]
    fn test_account_creation() {
        let conn = open_store().unwrap();
        let session = Session::new(&conn);

        let company = Company::create(&session, "company0").unwrap();
        let account = Account::create(&session, "x0", company.id).unwrap();

        assert_eq!(account.id, 1);
        assert_eq!(account.status, "x0");
        assert_eq!(account.company_id, company.id);
        assert!(!account.company.is_loaded());
    }

    #[test]
    fn test_account_requires_company() {
        let conn = open_store().unwrap();
        let session = Session::new(&conn);

        assert!(Account::create(&session, "x0", 42).is_err());
    }

    #[test]
    fn test_company_loaded_once() {
        let conn = open_store().unwrap();
        let session = Session::new(&conn);

        let company = Company::create(&session, "company0").unwrap();
        let mut account = Account::create(&session, "x0", company.id).unwrap();

        let counter = StatementCounter::new(session.connection());
        {
            let _scope = counter.enter();
            let name = account.company(&session).unwrap().map(|c| c.name.clone());
            assert_eq!(name.as_deref(), Some("company0"));

            // Slot is filled, no second statement
            account.company(&session).unwrap();
        }

        assert_eq!(counter.count(), 1);
    }
}
