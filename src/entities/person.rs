// 👤 Person Entity - root of the relationship chain

use anyhow::{Context, Result};
use rusqlite::{params, Row};
use serde::Serialize;

use super::{Entity, Keyed, User};
use crate::relation::Relation;
use crate::session::Session;

/// Person - 1:1 with User
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Person {
    pub id: i64,
    pub name: String,

    /// The user whose `person_id` points here
    pub user: Relation<Option<User>>,
}

impl Person {
    /// Insert a new person and return it with its assigned id
    pub fn create(session: &Session, name: impl Into<String>) -> Result<Person> {
        let name = name.into();
        let id = session
            .connection()
            .insert("INSERT INTO person (name) VALUES (?1)", params![name])
            .with_context(|| format!("Failed to insert person {}", name))?;

        Ok(Person {
            id,
            name,
            user: Relation::NotLoaded,
        })
    }

    /// Related user, lazily loaded on first access
    pub fn user(&mut self, session: &Session) -> Result<Option<&mut User>> {
        let person_id = self.id;
        let user = self
            .user
            .get_or_load(|| User::for_person(session, person_id))?;
        Ok(user.as_mut())
    }
}

impl Entity for Person {
    const TABLE: &'static str = "person";
    const COLUMNS: &'static [&'static str] = &["id", "name"];

    fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Option<Self>> {
        let Some(id) = row.get::<_, Option<i64>>(offset)? else {
            return Ok(None);
        };

        Ok(Some(Person {
            id,
            name: row.get(offset + 1)?,
            user: Relation::NotLoaded,
        }))
    }
}

impl Keyed for Person {
    fn id(&self) -> i64 {
        self.id
    }
}
