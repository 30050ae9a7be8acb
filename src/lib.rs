// Eager Loading Demo - Core Library
// Session, query builder and statement counter behind the N+1 scenarios

pub mod config;
pub mod counter;
pub mod db;
pub mod entities;
pub mod query;
pub mod relation;
pub mod scenarios;
pub mod seed;
pub mod session;

// Re-export commonly used types
pub use config::{DemoConfig, OutputFormat, DEFAULT_ROWS};
pub use counter::{CountingScope, StatementCounter};
pub use db::{count_rows, open_store, setup_database, TABLES};
pub use entities::{Account, Company, Entity, Keyed, Person, User, UserAccount};
pub use query::{contains_eager, get_query, joinedload, LoadOption, LoadPlan, PersonQuery, Rel, Strategy};
pub use relation::Relation;
pub use scenarios::{dereference_chain, run_all, run_scenario, Scenario, ScenarioReport};
pub use seed::{insert_chain, populate};
pub use session::{ConnectionEvents, ExecutedStatement, Session, SessionConnection};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
