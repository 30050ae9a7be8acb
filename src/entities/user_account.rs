// UserAccount Entity - M:N association between User and Account
//
// Composite primary key (account_id, user_id); no surrogate id, so it never
// enters the identity map.

use anyhow::{Context, Result};
use rusqlite::{params, Row};
use serde::Serialize;

use super::{Account, Entity, User};
use crate::relation::Relation;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAccount {
    pub account_id: i64,
    pub user_id: i64,
    pub user: Relation<Option<User>>,
    pub account: Relation<Option<Account>>,
}

impl UserAccount {
    pub fn create(session: &Session, user_id: i64, account_id: i64) -> Result<UserAccount> {
        session
            .connection()
            .execute(
                "INSERT INTO user_account (account_id, user_id) VALUES (?1, ?2)",
                params![account_id, user_id],
            )
            .with_context(|| format!("Failed to link user {} to account {}", user_id, account_id))?;

        Ok(UserAccount {
            account_id,
            user_id,
            user: Relation::NotLoaded,
            account: Relation::NotLoaded,
        })
    }

    /// Composite primary key
    pub fn key(&self) -> (i64, i64) {
        (self.account_id, self.user_id)
    }

    /// All association rows of one user (one statement)
    pub fn for_user(session: &Session, user_id: i64) -> Result<Vec<UserAccount>> {
        session.select_where::<UserAccount>("user_id", user_id)
    }

    /// Owning user, lazily loaded through the identity map
    pub fn user(&mut self, session: &Session) -> Result<Option<&mut User>> {
        let user_id = self.user_id;
        let user = self.user.get_or_load(|| session.get::<User>(user_id))?;
        Ok(user.as_mut())
    }

    /// Related account, lazily loaded on first access
    pub fn account(&mut self, session: &Session) -> Result<Option<&mut Account>> {
        let account_id = self.account_id;
        let account = self
            .account
            .get_or_load(|| session.get::<Account>(account_id))?;
        Ok(account.as_mut())
    }
}

impl Entity for UserAccount {
    const TABLE: &'static str = "user_account";
    const COLUMNS: &'static [&'static str] = &["account_id", "user_id"];

    fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Option<Self>> {
        let Some(account_id) = row.get::<_, Option<i64>>(offset)? else {
            return Ok(None);
        };

        Ok(Some(UserAccount {
            account_id,
            user_id: row.get(offset + 1)?,
            user: Relation::NotLoaded,
            account: Relation::NotLoaded,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_store;
    use crate::entities::{Company, Person};

    #[test]
    fn test_links_for_user() {
        let conn = open_store().unwrap();
        let session = Session::new(&conn);

        let person = Person::create(&session, "test0").unwrap();
        let user = User::create(&session, person.id).unwrap();
        let company = Company::create(&session, "company0").unwrap();
        let first = Account::create(&session, "x0", company.id).unwrap();
        let second = Account::create(&session, "x1", company.id).unwrap();

        UserAccount::create(&session, user.id, first.id).unwrap();
        UserAccount::create(&session, user.id, second.id).unwrap();

        let mut links = UserAccount::for_user(&session, user.id).unwrap();
        links.sort_by_key(UserAccount::key);

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].key(), (first.id, user.id));

        let account = links[1].account(&session).unwrap().unwrap();
        assert_eq!(account.status, "x1");

        let owner = links[1].user(&session).unwrap().unwrap();
        assert_eq!(owner.person_id, person.id);
    }

    #[test]
    fn test_duplicate_link_rejected() {
        let conn = open_store().unwrap();
        let session = Session::new(&conn);

        let person = Person::create(&session, "test0").unwrap();
        let user = User::create(&session, person.id).unwrap();
        let company = Company::create(&session, "company0").unwrap();
        let account = Account::create(&session, "x0", company.id).unwrap();

        UserAccount::create(&session, user.id, account.id).unwrap();
        assert!(UserAccount::create(&session, user.id, account.id).is_err());
    }
}
