// User Entity - belongs to a Person, owns UserAccount links

use anyhow::{Context, Result};
use rusqlite::{params, Row};
use serde::Serialize;

use super::{Entity, Keyed, Person, UserAccount};
use crate::relation::Relation;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,

    /// Foreign key to Person
    pub person_id: i64,

    /// Owning person (many-to-one back to Person)
    pub person: Relation<Option<Box<Person>>>,

    /// Association rows (User 1:N UserAccount)
    pub my_accounts: Relation<Vec<UserAccount>>,
}

impl User {
    pub fn create(session: &Session, person_id: i64) -> Result<User> {
        let id = session
            .connection()
            .insert("INSERT INTO \"user\" (person_id) VALUES (?1)", params![person_id])
            .with_context(|| format!("Failed to insert user for person {}", person_id))?;

        Ok(User {
            id,
            person_id,
            person: Relation::NotLoaded,
            my_accounts: Relation::NotLoaded,
        })
    }

    /// Load the user belonging to a person (one statement)
    pub fn for_person(session: &Session, person_id: i64) -> Result<Option<User>> {
        let user = session
            .select_where::<User>("person_id", person_id)?
            .into_iter()
            .next();

        if let Some(user) = &user {
            session.register(user);
        }
        Ok(user)
    }

    /// Owning person, lazily loaded through the identity map
    pub fn person(&mut self, session: &Session) -> Result<Option<&mut Person>> {
        let person_id = self.person_id;
        let person = self
            .person
            .get_or_load(|| Ok(session.get::<Person>(person_id)?.map(Box::new)))?;
        Ok(person.as_deref_mut())
    }

    /// Association rows, lazily loaded on first access
    pub fn my_accounts(&mut self, session: &Session) -> Result<&mut Vec<UserAccount>> {
        let user_id = self.id;
        self.my_accounts
            .get_or_load(|| UserAccount::for_user(session, user_id))
    }
}

impl Entity for User {
    const TABLE: &'static str = "user";
    const COLUMNS: &'static [&'static str] = &["id", "person_id"];

    fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Option<Self>> {
        let Some(id) = row.get::<_, Option<i64>>(offset)? else {
            return Ok(None);
        };

        Ok(Some(User {
            id,
            person_id: row.get(offset + 1)?,
            person: Relation::NotLoaded,
            my_accounts: Relation::NotLoaded,
        }))
    }
}

impl Keyed for User {
    fn id(&self) -> i64 {
        self.id
    }
}
