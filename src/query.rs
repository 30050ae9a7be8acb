// Person query over the full relationship chain
//
// The query always joins Person → User → UserAccount → Account → Company for
// filtering. Loader options decide how the related objects get populated:
//
// - no options:      relations stay NotLoaded, each access costs a statement
// - joinedload:      extra LEFT OUTER JOINs on anonymous aliases fill them in
//                    the same statement
// - contains_eager:  the columns of the filtering joins fill them directly

use anyhow::{anyhow, bail, Result};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Row};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use crate::db::ident;
use crate::entities::{labeled_columns, Account, Company, Entity, Person, User, UserAccount};
use crate::session::Session;

/// Alias of the wrapped person subquery under a joined load with a limit
const SUBQUERY_ALIAS: &str = "anon_1";

// ============================================================================
// RELATIONSHIPS
// ============================================================================

/// Relationship along the Person chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rel {
    /// Person.user
    User,
    /// User.my_accounts
    MyAccounts,
    /// UserAccount.account
    Account,
    /// Account.company
    Company,
}

/// Relationships in traversal order from Person
pub const CHAIN: [Rel; 4] = [Rel::User, Rel::MyAccounts, Rel::Account, Rel::Company];

const OWNERS: [&str; 5] = ["Person", "User", "UserAccount", "Account", "Company"];

impl Rel {
    pub fn name(&self) -> &'static str {
        match self {
            Rel::User => "user",
            Rel::MyAccounts => "my_accounts",
            Rel::Account => "account",
            Rel::Company => "company",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            Rel::User => User::TABLE,
            Rel::MyAccounts => UserAccount::TABLE,
            Rel::Account => Account::TABLE,
            Rel::Company => Company::TABLE,
        }
    }

    fn columns(&self) -> &'static [&'static str] {
        match self {
            Rel::User => User::COLUMNS,
            Rel::MyAccounts => UserAccount::COLUMNS,
            Rel::Account => Account::COLUMNS,
            Rel::Company => Company::COLUMNS,
        }
    }

    fn alias(&self) -> String {
        format!("{}_1", self.table())
    }

    /// ON clause joining this relationship's table (as `target`) to `parent`
    fn join_condition(&self, parent: &Source, target: &str) -> String {
        match self {
            Rel::User => format!("{} = {}.person_id", parent.column("id"), target),
            Rel::MyAccounts => format!("{} = {}.user_id", parent.column("id"), target),
            Rel::Account => format!("{}.id = {}", target, parent.column("account_id")),
            Rel::Company => format!("{}.id = {}", target, parent.column("company_id")),
        }
    }
}

impl fmt::Display for Rel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the parent side of a join reads its columns from
enum Source {
    Table(&'static str),
    Alias(String),
    PersonSubquery,
}

impl Source {
    fn column(&self, column: &str) -> String {
        match self {
            Source::Table(table) => format!("{}.{}", ident(table), column),
            Source::Alias(alias) => format!("{}.{}", alias, column),
            Source::PersonSubquery => format!("{}.{}_{}", SUBQUERY_ALIAS, Person::TABLE, column),
        }
    }
}

// ============================================================================
// LOADER OPTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Populate through anonymous LEFT OUTER JOINs
    Joined,
    /// Populate from the query's own explicit joins
    ContainsEager,
}

/// Loading directive for the relationship at the end of `path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOption {
    pub strategy: Strategy,
    pub path: Vec<Rel>,
}

pub fn joinedload(path: &[Rel]) -> LoadOption {
    LoadOption {
        strategy: Strategy::Joined,
        path: path.to_vec(),
    }
}

pub fn contains_eager(path: &[Rel]) -> LoadOption {
    LoadOption {
        strategy: Strategy::ContainsEager,
        path: path.to_vec(),
    }
}

/// Resolved loading plan: the first `depth` relationships of [`CHAIN`] are
/// populated by `strategy`, everything below stays lazy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadPlan {
    pub strategy: Option<Strategy>,
    pub depth: usize,
}

impl LoadPlan {
    pub fn from_options(options: &[LoadOption]) -> Result<Self> {
        let mut marked = [false; CHAIN.len()];
        let mut strategy = None;

        for option in options {
            validate_path(&option.path)?;

            match strategy {
                None => strategy = Some(option.strategy),
                Some(chosen) if chosen != option.strategy => {
                    bail!("joinedload and contains_eager cannot be combined in one query")
                }
                Some(_) => {}
            }

            marked[option.path.len() - 1] = true;
        }

        let depth = marked.iter().take_while(|m| **m).count();
        for (level, rel) in CHAIN.iter().enumerate().skip(depth) {
            if marked[level] {
                warn!(
                    relationship = %rel,
                    "loader option ignored: parent relationship '{}' is not eagerly loaded",
                    CHAIN[depth]
                );
            }
        }

        Ok(LoadPlan {
            strategy: if depth > 0 { strategy } else { None },
            depth,
        })
    }

    /// Relationships populated by the query itself
    pub fn eager(&self) -> &'static [Rel] {
        match self.strategy {
            Some(_) => &CHAIN[..self.depth],
            None => &[],
        }
    }
}

fn validate_path(path: &[Rel]) -> Result<()> {
    if path.is_empty() {
        bail!("loader option needs at least one relationship");
    }

    for (level, rel) in path.iter().enumerate() {
        if CHAIN.get(level) != Some(rel) {
            bail!("'{}' is not a relationship of {}", rel, OWNERS[level.min(OWNERS.len() - 1)]);
        }
    }

    Ok(())
}

// ============================================================================
// FILTERS
// ============================================================================

/// Case-insensitive LIKE on one column
#[derive(Debug, Clone)]
struct Ilike {
    table: &'static str,
    column: &'static str,
    pattern: String,
}

// ============================================================================
// PERSON QUERY
// ============================================================================

pub struct PersonQuery<'s> {
    session: &'s Session<'s>,
    plan: LoadPlan,
    filters: Vec<Ilike>,
}

/// The demonstration query: persons reachable through the whole chain whose
/// name, account status and company name match the seeded prefixes
pub fn get_query<'s>(session: &'s Session<'s>, options: &[LoadOption]) -> Result<PersonQuery<'s>> {
    Ok(PersonQuery::new(session)
        .options(options)?
        .filter_ilike(Person::TABLE, "name", "test%")
        .filter_ilike(Account::TABLE, "status", "x%")
        .filter_ilike(Company::TABLE, "name", "company%"))
}

impl<'s> PersonQuery<'s> {
    pub fn new(session: &'s Session<'s>) -> Self {
        PersonQuery {
            session,
            plan: LoadPlan::default(),
            filters: Vec::new(),
        }
    }

    pub fn options(mut self, options: &[LoadOption]) -> Result<Self> {
        self.plan = LoadPlan::from_options(options)?;
        Ok(self)
    }

    pub fn filter_ilike(mut self, table: &'static str, column: &'static str, pattern: &str) -> Self {
        self.filters.push(Ilike {
            table,
            column,
            pattern: pattern.to_string(),
        });
        self
    }

    /// First matching person
    pub fn first(&self) -> Result<Option<Person>> {
        Ok(self.fetch(Some(1))?.into_iter().next())
    }

    pub fn all(&self) -> Result<Vec<Person>> {
        self.fetch(None)
    }

    /// SQL text, with a trailing LIMIT parameter when `limited`
    pub fn sql(&self, limited: bool) -> String {
        let person = ident(Person::TABLE);
        let person_columns = labeled_columns(&person, Person::TABLE, Person::COLUMNS);
        let limit = if limited {
            format!(" LIMIT ?{}", self.filters.len() + 1)
        } else {
            String::new()
        };
        let order = format!(" ORDER BY {}.id", person);
        let from = self.from_clause();
        let filter = self.where_clause();
        let eager = self.plan.eager();

        match self.plan.strategy {
            None => format!("SELECT {} {}{}{}{}", person_columns, from, filter, order, limit),

            Some(Strategy::ContainsEager) => {
                let mut columns = vec![person_columns];
                for rel in eager {
                    columns.push(labeled_columns(&ident(rel.table()), rel.table(), rel.columns()));
                }
                format!("SELECT {} {}{}{}{}", columns.join(", "), from, filter, order, limit)
            }

            // Limit the persons first so the collection is not cut short
            Some(Strategy::Joined) if limited => {
                let inner = format!("SELECT {} {}{}{}{}", person_columns, from, filter, order, limit);
                let mut columns: Vec<String> = Person::COLUMNS
                    .iter()
                    .map(|column| Source::PersonSubquery.column(column))
                    .collect();
                columns.extend(eager.iter().map(|rel| labeled_columns(&rel.alias(), &rel.alias(), rel.columns())));

                format!(
                    "SELECT {} FROM ({}) AS {}{} ORDER BY {}",
                    columns.join(", "),
                    inner,
                    SUBQUERY_ALIAS,
                    outer_joins(eager, Source::PersonSubquery),
                    Source::PersonSubquery.column("id")
                )
            }

            Some(Strategy::Joined) => {
                let mut columns = vec![person_columns];
                columns.extend(eager.iter().map(|rel| labeled_columns(&rel.alias(), &rel.alias(), rel.columns())));

                format!(
                    "SELECT {} {}{}{}{}",
                    columns.join(", "),
                    from,
                    outer_joins(eager, Source::Table(Person::TABLE)),
                    filter,
                    order
                )
            }
        }
    }

    fn from_clause(&self) -> String {
        let mut sql = format!("FROM {}", ident(Person::TABLE));
        let mut parent = Source::Table(Person::TABLE);

        for rel in CHAIN {
            let target = ident(rel.table());
            sql.push_str(&format!(" JOIN {} ON {}", target, rel.join_condition(&parent, &target)));
            parent = Source::Table(rel.table());
        }

        sql
    }

    fn where_clause(&self) -> String {
        if self.filters.is_empty() {
            return String::new();
        }

        let conditions: Vec<String> = self
            .filters
            .iter()
            .enumerate()
            .map(|(i, filter)| {
                format!("lower({}.{}) LIKE lower(?{})", ident(filter.table), filter.column, i + 1)
            })
            .collect();

        format!(" WHERE {}", conditions.join(" AND "))
    }

    fn fetch(&self, limit: Option<usize>) -> Result<Vec<Person>> {
        let sql = self.sql(limit.is_some());

        let mut params: Vec<Value> = self
            .filters
            .iter()
            .map(|filter| Value::Text(filter.pattern.clone()))
            .collect();
        if let Some(limit) = limit {
            params.push(Value::Integer(limit as i64));
        }

        let depth = self.plan.eager().len();
        let rows = self
            .session
            .connection()
            .query(&sql, params_from_iter(params), |row| ChainRow::read(row, depth))?;

        debug!(rows = rows.len(), depth, "hydrating persons");
        let persons = hydrate(rows, depth)?;
        for person in &persons {
            register_graph(self.session, person);
        }

        Ok(persons)
    }
}

impl fmt::Display for PersonQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql(false))
    }
}

fn outer_joins(eager: &[Rel], root: Source) -> String {
    let mut sql = String::new();
    let mut parent = root;

    for rel in eager {
        let alias = rel.alias();
        sql.push_str(&format!(
            " LEFT OUTER JOIN {} AS {} ON {}",
            ident(rel.table()),
            alias,
            rel.join_condition(&parent, &alias)
        ));
        parent = Source::Alias(alias);
    }

    sql
}

// ============================================================================
// HYDRATION
// ============================================================================

/// One result row split into its entities
#[derive(Debug, Default)]
struct ChainRow {
    person: Option<Person>,
    user: Option<User>,
    link: Option<UserAccount>,
    account: Option<Account>,
    company: Option<Company>,
}

impl ChainRow {
    fn read(row: &Row<'_>, depth: usize) -> rusqlite::Result<ChainRow> {
        let mut chain = ChainRow {
            person: Person::from_row_at(row, 0)?,
            ..ChainRow::default()
        };
        let mut offset = Person::COLUMNS.len();

        if depth >= 1 {
            chain.user = User::from_row_at(row, offset)?;
            offset += User::COLUMNS.len();
        }
        if depth >= 2 {
            chain.link = UserAccount::from_row_at(row, offset)?;
            offset += UserAccount::COLUMNS.len();
        }
        if depth >= 3 {
            chain.account = Account::from_row_at(row, offset)?;
            offset += Account::COLUMNS.len();
        }
        if depth >= 4 {
            chain.company = Company::from_row_at(row, offset)?;
        }

        Ok(chain)
    }
}

/// Fold joined rows into distinct persons with their eager relations filled
fn hydrate(rows: Vec<ChainRow>, depth: usize) -> Result<Vec<Person>> {
    let mut persons: Vec<Person> = Vec::new();
    let mut positions: HashMap<i64, usize> = HashMap::new();

    for row in rows {
        let person = row
            .person
            .ok_or_else(|| anyhow!("query returned a row without a person id"))?;
        let position = *positions.entry(person.id).or_insert_with(|| {
            persons.push(person);
            persons.len() - 1
        });

        if depth < 1 {
            continue;
        }
        let user = persons[position].user.get_or_insert_with(|| row.user);
        let Some(user) = user.as_mut() else { continue };

        if depth < 2 {
            continue;
        }
        let links = user.my_accounts.get_or_insert_with(Vec::new);
        let Some(link) = row.link else { continue };
        let index = match links.iter().position(|existing| existing.key() == link.key()) {
            Some(index) => index,
            None => {
                links.push(link);
                links.len() - 1
            }
        };

        if depth < 3 {
            continue;
        }
        let account = links[index].account.get_or_insert_with(|| row.account);
        let Some(account) = account.as_mut() else { continue };

        if depth < 4 {
            continue;
        }
        account.company.get_or_insert_with(|| row.company);
    }

    Ok(persons)
}

fn register_graph(session: &Session, person: &Person) {
    session.register(person);

    let Some(Some(user)) = person.user.get() else { return };
    session.register(user);

    for link in user.my_accounts.get().into_iter().flatten() {
        let Some(Some(account)) = link.account.get() else { continue };
        session.register(account);

        if let Some(Some(company)) = account.company.get() {
            session.register(company);
        }
    }
}
