use anyhow::{Context, Result};
use rusqlite::Connection;
use std::borrow::Cow;

// Tables in dependency order (parents first)
pub const TABLES: [&str; 5] = ["person", "user", "company", "account", "user_account"];

/// Quote a table name when SQL would otherwise read it as a keyword
pub fn ident(name: &str) -> Cow<'_, str> {
    match name {
        "user" => Cow::Owned(format!("\"{}\"", name)),
        _ => Cow::Borrowed(name),
    }
}

/// Open the process-wide in-memory store with a fresh schema
pub fn open_store() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
    setup_database(&conn)?;
    Ok(conn)
}

/// Drop and recreate every table, enforcing foreign keys
pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;

    drop_all(conn)?;
    create_all(conn)?;

    Ok(())
}

pub fn drop_all(conn: &Connection) -> Result<()> {
    for table in TABLES.iter().rev() {
        conn.execute(&format!("DROP TABLE IF EXISTS {}", ident(table)), [])
            .with_context(|| format!("Failed to drop table {}", table))?;
    }

    Ok(())
}

pub fn create_all(conn: &Connection) -> Result<()> {
    // ==========================================================================
    // Person / User (1:1)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE person (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE \"user\" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id INTEGER NOT NULL REFERENCES person(id)
        )",
        [],
    )?;

    // ==========================================================================
    // Company / Account (1:N)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE company (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE account (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            status TEXT NOT NULL,
            company_id INTEGER NOT NULL REFERENCES company(id)
        )",
        [],
    )?;

    // ==========================================================================
    // UserAccount (M:N association, composite key)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE user_account (
            account_id INTEGER NOT NULL REFERENCES account(id),
            user_id INTEGER NOT NULL REFERENCES \"user\"(id),
            PRIMARY KEY (account_id, user_id)
        )",
        [],
    )?;

    Ok(())
}

/// Row count for one table
pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", ident(table)),
        [],
        |row| row.get(0),
    )?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_recreated() {
        let conn = open_store().unwrap();

        conn.execute("INSERT INTO person (name) VALUES ('test0')", []).unwrap();
        assert_eq!(count_rows(&conn, "person").unwrap(), 1);

        // Second setup drops everything
        setup_database(&conn).unwrap();

        for table in TABLES {
            assert_eq!(count_rows(&conn, table).unwrap(), 0, "{} should be empty", table);
        }
    }

    #[test]
    fn test_foreign_key_enforced() {
        let conn = open_store().unwrap();

        let result = conn.execute("INSERT INTO \"user\" (person_id) VALUES (42)", []);

        match result {
            Err(rusqlite::Error::SqliteFailure(err, _)) => {
                assert_eq!(err.code, rusqlite::ErrorCode::ConstraintViolation);
            }
            other => panic!("expected constraint violation, got {:?}", other),
        }
    }

    #[test]
    fn test_composite_key_unique() {
        let conn = open_store().unwrap();

        conn.execute_batch(
            "INSERT INTO person (name) VALUES ('test0');
             INSERT INTO \"user\" (person_id) VALUES (1);
             INSERT INTO company (name) VALUES ('company0');
             INSERT INTO account (status, company_id) VALUES ('x0', 1);
             INSERT INTO user_account (account_id, user_id) VALUES (1, 1);",
        )
        .unwrap();

        let duplicate = conn.execute(
            "INSERT INTO user_account (account_id, user_id) VALUES (1, 1)",
            [],
        );

        assert!(duplicate.is_err());
        assert_eq!(count_rows(&conn, "user_account").unwrap(), 1);
    }

    #[test]
    fn test_ident_quotes_keyword() {
        assert_eq!(ident("user"), "\"user\"");
        assert_eq!(ident("account"), "account");
    }
}
