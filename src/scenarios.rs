// N+1 demonstration scenarios
//
// Each scenario runs the same filtered Person query inside a statement
// counting scope, takes the first result and walks
// person.user.my_accounts[0].account.company.name, then reports how many
// statements that cost.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::counter::StatementCounter;
use crate::entities::Person;
use crate::query::{contains_eager, get_query, joinedload, LoadOption, Rel, CHAIN};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scenario {
    #[serde(rename = "simple")]
    Simple,
    #[serde(rename = "joinedload")]
    JoinedLoad,
    #[serde(rename = "contains_eager")]
    ContainsEager,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Scenario::Simple, Scenario::JoinedLoad, Scenario::ContainsEager];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Simple => "simple",
            Scenario::JoinedLoad => "joinedload",
            Scenario::ContainsEager => "contains_eager",
        }
    }

    /// One option per prefix of the chain: user, user.my_accounts, ...
    pub fn options(&self) -> Vec<LoadOption> {
        let strategy: fn(&[Rel]) -> LoadOption = match self {
            Scenario::Simple => return Vec::new(),
            Scenario::JoinedLoad => joinedload,
            Scenario::ContainsEager => contains_eager,
        };

        (1..=CHAIN.len()).map(|n| strategy(&CHAIN[..n])).collect()
    }
}

/// Outcome of one scenario run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub session_id: Uuid,
    /// Rendered query, without the row limit
    pub query: String,
    pub statements: usize,
    /// SQL of every counted statement
    pub executed: Vec<String>,
    /// Company reached through the chain, if the chain was complete
    pub company: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl ScenarioReport {
    pub fn render_text(&self) -> String {
        format!(
            "--------\n{}\nQuery\n{}\nStatements\n{}\n",
            self.scenario.name(),
            self.query,
            self.statements
        )
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Walk person.user.my_accounts[0].account.company.name
///
/// Any missing link ends the walk with `None`.
pub fn dereference_chain(session: &Session, person: &mut Person) -> Result<Option<String>> {
    let Some(user) = person.user(session)? else {
        return Ok(None);
    };
    let Some(link) = user.my_accounts(session)?.first_mut() else {
        return Ok(None);
    };
    let Some(account) = link.account(session)? else {
        return Ok(None);
    };
    let Some(company) = account.company(session)? else {
        return Ok(None);
    };

    Ok(Some(company.name.clone()))
}

pub fn run_scenario(conn: &Connection, scenario: Scenario) -> Result<ScenarioReport> {
    let session = Session::new(conn);
    let counter = StatementCounter::new(session.connection());

    let (query, company) = {
        let _scope = counter.enter();

        let query = get_query(&session, &scenario.options())?;
        let sql = query.to_string();

        let company = match query.first()? {
            Some(mut person) => dereference_chain(&session, &mut person)?,
            None => None,
        };

        (sql, company)
    };

    info!(
        scenario = scenario.name(),
        statements = counter.count(),
        "scenario finished"
    );

    Ok(ScenarioReport {
        scenario,
        session_id: session.id(),
        query,
        statements: counter.count(),
        executed: counter.statements(),
        company,
        finished_at: Utc::now(),
    })
}

pub fn run_all(conn: &Connection) -> Result<Vec<ScenarioReport>> {
    Scenario::ALL
        .iter()
        .map(|scenario| run_scenario(conn, *scenario))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_store;
    use crate::seed::populate;

    fn seeded(n: usize) -> Connection {
        let conn = open_store().unwrap();
        populate(&conn, n).unwrap();
        conn
    }

    #[test]
    fn test_simple_scenario_is_n_plus_one() {
        let conn = seeded(10);
        let report = run_scenario(&conn, Scenario::Simple).unwrap();

        // person + user + my_accounts + account + company
        assert_eq!(report.statements, 5);
        assert_eq!(report.executed.len(), 5);
        assert!(report.executed[1].contains("WHERE \"user\".person_id = ?1"));
        assert!(report.executed[4].starts_with("SELECT company.id AS company_id"));
        assert_eq!(report.company.as_deref(), Some("company0"));
    }

    #[test]
    fn test_eager_scenarios_use_one_statement() {
        let conn = seeded(10);

        for scenario in [Scenario::JoinedLoad, Scenario::ContainsEager] {
            let report = run_scenario(&conn, scenario).unwrap();
            assert_eq!(report.statements, 1, "{} should need one statement", scenario.name());
            assert_eq!(report.company.as_deref(), Some("company0"));
        }
    }

    #[test]
    fn test_simple_never_cheaper_than_eager() {
        for n in [1, 3, 10] {
            let conn = seeded(n);
            let reports = run_all(&conn).unwrap();

            let simple = reports[0].statements;
            assert!(simple >= reports[1].statements);
            assert!(simple >= reports[2].statements);
        }
    }

    #[test]
    fn test_empty_store_counts_initial_select_only() {
        let conn = seeded(0);

        for report in run_all(&conn).unwrap() {
            assert_eq!(report.statements, 1, "{}", report.scenario.name());
            assert!(report.company.is_none());
        }
    }

    #[test]
    fn test_broken_chain_short_circuits() {
        let conn = open_store().unwrap();
        let session = Session::new(&conn);

        let mut person = Person::create(&session, "test0").unwrap();
        assert_eq!(dereference_chain(&session, &mut person).unwrap(), None);

        let mut person = Person::create(&session, "test1").unwrap();
        crate::entities::User::create(&session, person.id).unwrap();
        assert_eq!(dereference_chain(&session, &mut person).unwrap(), None);
    }

    #[test]
    fn test_options_cover_chain_prefixes() {
        assert!(Scenario::Simple.options().is_empty());

        let options = Scenario::ContainsEager.options();
        assert_eq!(options.len(), 4);
        assert_eq!(options[1], contains_eager(&[Rel::User, Rel::MyAccounts]));
        assert_eq!(options[3].path, CHAIN.to_vec());
    }

    #[test]
    fn test_report_output() {
        let conn = seeded(1);
        let report = run_scenario(&conn, Scenario::JoinedLoad).unwrap();

        let text = report.render_text();
        assert!(text.starts_with("--------\njoinedload\nQuery\nSELECT person.id AS person_id"));
        assert!(text.ends_with("\nStatements\n1\n"));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["scenario"], "joinedload");
        assert_eq!(json["statements"], 1);
        assert_eq!(json["company"], "company0");
    }
}
