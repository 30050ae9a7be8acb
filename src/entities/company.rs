// 🏢 Company Entity - referenced by Account

use anyhow::{Context, Result};
use rusqlite::{params, Row};
use serde::Serialize;

use super::{Entity, Keyed};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
}

impl Company {
    pub fn create(session: &Session, name: impl Into<String>) -> Result<Company> {
        let name = name.into();
        let id = session
            .connection()
            .insert("INSERT INTO company (name) VALUES (?1)", params![name])
            .with_context(|| format!("Failed to insert company {}", name))?;

        Ok(Company { id, name })
    }
}

impl Entity for Company {
    const TABLE: &'static str = "company";
    const COLUMNS: &'static [&'static str] = &["id", "name"];

    fn from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Option<Self>> {
        let Some(id) = row.get::<_, Option<i64>>(offset)? else {
            return Ok(None);
        };

        Ok(Some(Company {
            id,
            name: row.get(offset + 1)?,
        }))
    }
}

impl Keyed for Company {
    fn id(&self) -> i64 {
        self.id
    }
}
