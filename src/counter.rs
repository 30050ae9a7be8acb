use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::session::{ConnectionEvents, ListenerId, SessionConnection};

#[derive(Default)]
struct CounterState {
    active: Cell<bool>,
    count: Cell<usize>,
    statements: RefCell<Vec<String>>,
}

/// Counts statements executed on one session connection
///
/// Counting only happens while a [`CountingScope`] from [`enter`] is alive:
///
/// ```
/// # use eager_loading_demo::{open_store, Session, StatementCounter};
/// let conn = open_store()?;
/// let session = Session::new(&conn);
/// let counter = StatementCounter::new(session.connection());
/// {
///     let _scope = counter.enter();
///     session.connection().query("SELECT 1", [], |row| row.get::<_, i64>(0))?;
///     session.connection().query("SELECT 1", [], |row| row.get::<_, i64>(0))?;
/// }
/// assert_eq!(counter.count(), 2);
/// # Ok::<(), anyhow::Error>(())
/// ```
///
/// [`enter`]: StatementCounter::enter
pub struct StatementCounter<'a> {
    events: &'a ConnectionEvents,
    listener: ListenerId,
    state: Rc<CounterState>,
}

impl<'a> StatementCounter<'a> {
    pub fn new(connection: &'a SessionConnection<'_>) -> Self {
        let state = Rc::new(CounterState::default());

        let observed = Rc::clone(&state);
        let listener = connection.events().listen(move |statement| {
            if observed.active.get() {
                observed.count.set(observed.count.get() + 1);
                observed.statements.borrow_mut().push(statement.sql.clone());
            }
        });

        StatementCounter {
            events: connection.events(),
            listener,
            state,
        }
    }

    /// Start counting until the returned guard is dropped
    pub fn enter(&self) -> CountingScope<'_> {
        self.state.active.set(true);
        CountingScope { state: &self.state }
    }

    pub fn is_active(&self) -> bool {
        self.state.active.get()
    }

    pub fn count(&self) -> usize {
        self.state.count.get()
    }

    /// SQL of every counted statement, in execution order
    pub fn statements(&self) -> Vec<String> {
        self.state.statements.borrow().clone()
    }
}

impl Drop for StatementCounter<'_> {
    fn drop(&mut self) {
        self.events.remove(self.listener);
    }
}

/// Active counting scope; counting stops on drop
pub struct CountingScope<'c> {
    state: &'c CounterState,
}

impl Drop for CountingScope<'_> {
    fn drop(&mut self) {
        self.state.active.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_store;
    use crate::entities::Person;
    use crate::session::Session;

    fn select_one(session: &Session) {
        session
            .connection()
            .query("SELECT 1", [], |row| row.get::<_, i64>(0))
            .unwrap();
    }

    #[test]
    fn test_counts_only_inside_scope() {
        let conn = open_store().unwrap();
        let session = Session::new(&conn);
        let counter = StatementCounter::new(session.connection());

        select_one(&session);
        assert_eq!(counter.count(), 0);

        {
            let _scope = counter.enter();
            assert!(counter.is_active());
            select_one(&session);
            Person::create(&session, "test0").unwrap();
        }

        assert!(!counter.is_active());
        select_one(&session);

        assert_eq!(counter.count(), 2);
        assert_eq!(counter.statements()[0], "SELECT 1");
        assert!(counter.statements()[1].starts_with("INSERT INTO person"));
    }

    #[test]
    fn test_transaction_control_not_counted() {
        let conn = open_store().unwrap();
        let session = Session::new(&conn);
        let counter = StatementCounter::new(session.connection());

        {
            let _scope = counter.enter();
            Person::create(&session, "test0").unwrap();
            session.commit().unwrap();
        }

        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_drop_unregisters_listener() {
        let conn = open_store().unwrap();
        let session = Session::new(&conn);

        {
            let _counter = StatementCounter::new(session.connection());
            assert_eq!(session.connection().events().listener_count(), 1);
        }

        assert_eq!(session.connection().events().listener_count(), 0);
    }

    #[test]
    fn test_counters_are_independent() {
        let conn = open_store().unwrap();
        let session = Session::new(&conn);
        let outer = StatementCounter::new(session.connection());
        let inner = StatementCounter::new(session.connection());

        let _outer_scope = outer.enter();
        select_one(&session);
        {
            let _inner_scope = inner.enter();
            select_one(&session);
        }

        assert_eq!(outer.count(), 2);
        assert_eq!(inner.count(), 1);
    }
}
