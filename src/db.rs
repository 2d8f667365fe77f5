//! Opens, configures and initializes the application's SQLite database.

use std::{path::Path, time::Duration};

use rusqlite::{Connection, Row, Transaction as SqlTransaction, TransactionBehavior, types::Type};
use time::OffsetDateTime;

use crate::{
    Error, account::create_account_table, savings_goal::create_savings_goal_table,
    savings_transaction::create_savings_transaction_table, transaction::create_transaction_table,
    user::create_user_table,
};

/// Open the database at `path` and configure the connection.
///
/// Foreign keys are enabled and a writer that finds the database locked will
/// wait up to `busy_timeout` before giving up with [Error::SqlError].
///
/// # Errors
/// Returns an [Error::SqlError] if the database cannot be opened or configured.
pub fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection, Error> {
    let connection = Connection::open(path)?;
    configure_connection(&connection, busy_timeout)?;

    Ok(connection)
}

/// Enable foreign keys and set the busy timeout on `connection`.
///
/// # Errors
/// Returns an [Error::SqlError] if a pragma could not be set.
pub fn configure_connection(connection: &Connection, busy_timeout: Duration) -> Result<(), Error> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection.busy_timeout(busy_timeout)?;

    Ok(())
}

/// Create the tables for the domain models.
///
/// Safe to call on a database that has already been initialized.
///
/// # Errors
/// Returns an [Error::SqlError] if a table could not be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_account_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_savings_goal_table(&transaction)?;
    create_savings_transaction_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

/// Open the transactional scope for an operation that reads and then
/// changes balances.
///
/// The scope is started with `BEGIN IMMEDIATE`, so the write lock is held
/// from the first read until commit and no other writer can act on a stale
/// balance in between. The scope rolls back when it is dropped without
/// being committed.
///
/// # Errors
/// Returns an [Error::SqlError] if the lock could not be acquired within the
/// connection's busy timeout.
pub(crate) fn begin_write_scope(connection: &Connection) -> Result<SqlTransaction<'_>, Error> {
    let scope = SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;
    tracing::debug!("opened write scope");

    Ok(scope)
}

/// Read a unix timestamp column as a date-time in UTC.
pub(crate) fn get_timestamp(row: &Row, index: usize) -> Result<OffsetDateTime, rusqlite::Error> {
    let seconds: i64 = row.get(index)?;

    OffsetDateTime::from_unix_timestamp(seconds).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Integer, Box::new(error))
    })
}
