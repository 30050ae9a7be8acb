use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::entities::{Account, Company, Person, User, UserAccount};
use crate::session::Session;

/// Insert one Person → User → UserAccount → Account → Company chain
///
/// Each insert runs immediately, so later rows can reference the generated
/// ids. Nothing is committed here.
pub fn insert_chain(
    session: &Session,
    person_name: &str,
    company_name: &str,
    status: &str,
) -> Result<UserAccount> {
    let person = Person::create(session, person_name)?;
    let user = User::create(session, person.id)?;
    let company = Company::create(session, company_name)?;
    let account = Account::create(session, status, company.id)?;

    UserAccount::create(session, user.id, account.id)
}

/// Seed `n` chains named `test{i}` / `company{i}` / `x{i}`, committing each
pub fn populate(conn: &Connection, n: usize) -> Result<()> {
    let session = Session::new(conn);

    for i in 0..n {
        insert_chain(
            &session,
            &format!("test{}", i),
            &format!("company{}", i),
            &format!("x{}", i),
        )?;
        session.commit()?;
    }

    info!(chains = n, "store populated");
    Ok(())
}
