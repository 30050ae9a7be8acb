// Session - unit of work over the shared store connection
//
// Every statement issued through a session goes through `SessionConnection`,
// which begins a transaction on first use and notifies after-execute
// listeners once the statement has run.
//
// SQLite keeps one transaction per connection. A session only commits or
// rolls back a transaction it began itself, and refuses to run statements
// while another session's transaction is open on the same connection.

use anyhow::{bail, Context, Result};
use rusqlite::{Connection, Params, Row};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::ident;
use crate::entities::{labeled_columns, Entity, Keyed};

// ============================================================================
// EXECUTION EVENTS
// ============================================================================

/// A statement that finished executing on a session connection
#[derive(Debug, Clone)]
pub struct ExecutedStatement {
    pub sql: String,
    /// Rows changed (writes) or returned (reads)
    pub rows: usize,
}

pub type ListenerId = u64;

type Listener = Box<dyn FnMut(&ExecutedStatement)>;

/// After-execute listeners attached to one connection
#[derive(Default)]
pub struct ConnectionEvents {
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_id: Cell<ListenerId>,
}

impl ConnectionEvents {
    /// Register a callback run after every statement
    pub fn listen<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&ExecutedStatement) + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push((id, Box::new(callback)));
        id
    }

    /// Unregister a callback; returns false if it was not registered
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn dispatch(&self, statement: &ExecutedStatement) {
        for (_, listener) in self.listeners.borrow_mut().iter_mut() {
            listener(statement);
        }
    }
}

// ============================================================================
// SESSION CONNECTION
// ============================================================================

/// Connection handle owned by a session
pub struct SessionConnection<'conn> {
    conn: &'conn Connection,
    events: ConnectionEvents,
    in_transaction: Cell<bool>,
}

impl<'conn> SessionConnection<'conn> {
    fn new(conn: &'conn Connection) -> Self {
        SessionConnection {
            conn,
            events: ConnectionEvents::default(),
            in_transaction: Cell::new(false),
        }
    }

    pub fn events(&self) -> &ConnectionEvents {
        &self.events
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.get()
    }

    /// Run a write statement, returning the number of changed rows
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.begin()?;
        let changed = self
            .conn
            .execute(sql, params)
            .with_context(|| format!("Failed to execute: {}", sql))?;
        self.after_execute(sql, changed);
        Ok(changed)
    }

    /// Run an INSERT and return the new rowid
    pub fn insert<P: Params>(&self, sql: &str, params: P) -> Result<i64> {
        self.execute(sql, params)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Run a SELECT, mapping every row with `f`
    pub fn query<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.begin()?;
        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("Failed to prepare: {}", sql))?;

        let rows = stmt
            .query_map(params, f)?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read rows: {}", sql))?;

        self.after_execute(sql, rows.len());
        Ok(rows)
    }

    // Transaction control bypasses the listeners
    fn begin(&self) -> Result<()> {
        if self.in_transaction.get() {
            return Ok(());
        }
        if !self.conn.is_autocommit() {
            bail!("Connection already has an open transaction from another session; commit or drop that session first");
        }
        self.conn.execute_batch("BEGIN")?;
        self.in_transaction.set(true);
        Ok(())
    }

    fn commit(&self) -> Result<bool> {
        if !self.in_transaction.get() {
            return Ok(false);
        }
        if self.conn.is_autocommit() {
            self.in_transaction.set(false);
            warn!("transaction was already closed on the connection");
            return Ok(false);
        }
        self.conn.execute_batch("COMMIT").context("Failed to commit")?;
        self.in_transaction.set(false);
        Ok(true)
    }

    fn rollback(&self) -> Result<()> {
        if self.in_transaction.get() {
            self.in_transaction.set(false);
            if !self.conn.is_autocommit() {
                self.conn.execute_batch("ROLLBACK")?;
            }
        }
        Ok(())
    }

    fn after_execute(&self, sql: &str, rows: usize) {
        debug!(rows, sql, "executed statement");
        self.events.dispatch(&ExecutedStatement {
            sql: sql.to_string(),
            rows,
        });
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Unit of work with an identity map
///
/// The identity map caches entities by (table, primary key) until the next
/// commit, so a many-to-one load of an entity already in the session costs no
/// statement. Dropping a session rolls back anything not committed.
pub struct Session<'conn> {
    id: Uuid,
    connection: SessionConnection<'conn>,
    identity_map: RefCell<HashMap<(&'static str, i64), Box<dyn Any>>>,
}

impl<'conn> Session<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        let id = Uuid::new_v4();
        debug!(session = %id, "session opened");

        Session {
            id,
            connection: SessionConnection::new(conn),
            identity_map: RefCell::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connection(&self) -> &SessionConnection<'conn> {
        &self.connection
    }

    /// Commit the open transaction and expire the identity map
    pub fn commit(&self) -> Result<()> {
        if self.connection.commit()? {
            self.identity_map.borrow_mut().clear();
            debug!(session = %self.id, "committed");
        }
        Ok(())
    }

    /// Entity by primary key, from the identity map when present
    pub fn get<T: Keyed>(&self, id: i64) -> Result<Option<T>> {
        if let Some(found) = self.lookup::<T>(id) {
            debug!(table = T::TABLE, id, "identity map hit");
            return Ok(Some(found));
        }

        let found = self.select_where::<T>("id", id)?.into_iter().next();
        if let Some(entity) = &found {
            self.register(entity);
        }
        Ok(found)
    }

    pub fn lookup<T: Keyed>(&self, id: i64) -> Option<T> {
        self.identity_map
            .borrow()
            .get(&(T::TABLE, id))
            .and_then(|entity| entity.downcast_ref::<T>())
            .cloned()
    }

    /// Add an entity to the identity map unless its key is already present
    pub fn register<T: Keyed>(&self, entity: &T) {
        self.identity_map
            .borrow_mut()
            .entry((T::TABLE, entity.id()))
            .or_insert_with(|| Box::new(entity.clone()));
    }

    pub fn identity_map_len(&self) -> usize {
        self.identity_map.borrow().len()
    }

    /// All rows of `T` whose integer `column` equals `value`
    pub fn select_where<T: Entity>(&self, column: &str, value: i64) -> Result<Vec<T>> {
        let table = ident(T::TABLE);
        let sql = format!(
            "SELECT {} FROM {} WHERE {}.{} = ?1",
            labeled_columns(&table, T::TABLE, T::COLUMNS),
            table,
            table,
            column
        );

        let rows = self
            .connection
            .query(&sql, [value], |row| T::from_row_at(row, 0))?;

        Ok(rows.into_iter().flatten().collect())
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.connection.rollback() {
            warn!(session = %self.id, error = %e, "rollback on close failed");
        }
    }
}
