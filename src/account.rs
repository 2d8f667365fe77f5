//! The account that holds a user's current and savings balances.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error, Money,
    balances::Balances,
    db::get_timestamp,
    user::UserID,
};

/// The balances and allowance settings of a user. Each user has exactly one
/// account, created when the user registers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The id for the account.
    pub id: i64,
    /// The user that owns the account.
    pub user_id: UserID,
    /// The money available for spending.
    ///
    /// Only changes together with a journal entry or a savings transfer.
    pub balance: Money,
    /// The money put aside as savings. Always equal to the sum of the user's
    /// savings ledger.
    pub savings_balance: Money,
    /// The amount credited by the monthly allowance.
    pub allowance_income: Money,
    /// When the account was created.
    pub created_at: OffsetDateTime,
    /// When the account was last changed.
    pub updated_at: OffsetDateTime,
}

/// Create the account table.
///
/// Money is stored as integer cents.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL UNIQUE,
            balance INTEGER NOT NULL DEFAULT 0,
            savings_balance INTEGER NOT NULL DEFAULT 0 CHECK (savings_balance >= 0),
            allowance_income INTEGER NOT NULL DEFAULT 0 CHECK (allowance_income >= 0),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

/// Map a database row to an [Account].
pub fn map_account_row(row: &Row) -> Result<Account, rusqlite::Error> {
    Ok(Account {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        balance: row.get(2)?,
        savings_balance: row.get(3)?,
        allowance_income: row.get(4)?,
        created_at: get_timestamp(row, 5)?,
        updated_at: get_timestamp(row, 6)?,
    })
}

/// Insert a zero-balance account for `user_id`.
pub(crate) fn insert_account(
    user_id: UserID,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Account, Error> {
    let account = connection
        .prepare(
            "INSERT INTO account (user_id, balance, savings_balance, allowance_income, created_at, updated_at)
             VALUES (?1, 0, 0, 0, ?2, ?2)
             RETURNING id, user_id, balance, savings_balance, allowance_income, created_at, updated_at",
        )?
        .query_row((user_id.as_i64(), now.unix_timestamp()), map_account_row)?;

    Ok(account)
}

/// Retrieve the account belonging to `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the user has no account,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_account(user_id: UserID, connection: &Connection) -> Result<Account, Error> {
    let account = connection
        .prepare(
            "SELECT id, user_id, balance, savings_balance, allowance_income, created_at, updated_at
             FROM account WHERE user_id = :user_id",
        )?
        .query_row(&[(":user_id", &user_id.as_i64())], map_account_row)?;

    Ok(account)
}

/// Set the amount the monthly allowance credits to the current balance.
///
/// Zero turns the allowance off.
///
/// # Errors
/// This function will return a:
/// - [Error::NegativeAmount] if `amount` is less than zero,
/// - [Error::NotFound] if the user has no account,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn set_allowance_income(
    user_id: UserID,
    amount: Money,
    connection: &Connection,
) -> Result<Account, Error> {
    if amount.is_negative() {
        return Err(Error::NegativeAmount(amount));
    }

    let account = connection
        .prepare(
            "UPDATE account SET allowance_income = ?1, updated_at = ?2 WHERE user_id = ?3
             RETURNING id, user_id, balance, savings_balance, allowance_income, created_at, updated_at",
        )?
        .query_row(
            (
                amount,
                OffsetDateTime::now_utc().unix_timestamp(),
                user_id.as_i64(),
            ),
            map_account_row,
        )?;

    tracing::info!("Set allowance for user {user_id} to {amount}");

    Ok(account)
}

/// Add `delta` to the current balance of `user_id` and return the new balance.
///
/// The sum is computed here rather than in SQL, where an overflowing integer
/// silently turns into a float.
///
/// Callers must run this in the same scope as the journal write that
/// justifies the change.
pub(crate) fn apply_balance_delta(
    user_id: UserID,
    delta: Money,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Money, Error> {
    let balance: Money = connection.query_row(
        "SELECT balance FROM account WHERE user_id = ?1",
        [user_id.as_i64()],
        |row| row.get(0),
    )?;

    let new_balance = balance.checked_add(delta).inspect_err(|_| {
        tracing::warn!("Rejected change of {delta} to balance {balance} of user {user_id}");
    })?;

    connection.execute(
        "UPDATE account SET balance = ?1, updated_at = ?2 WHERE user_id = ?3",
        (new_balance, now.unix_timestamp(), user_id.as_i64()),
    )?;

    Ok(new_balance)
}

/// Overwrite both balances of `user_id` in one statement.
///
/// Callers must run this in the same scope as the savings ledger write that
/// justifies the change.
pub(crate) fn set_balances(
    user_id: UserID,
    balances: &Balances,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE account SET balance = ?1, savings_balance = ?2, updated_at = ?3 WHERE user_id = ?4",
        (
            balances.balance,
            balances.savings_balance,
            now.unix_timestamp(),
            user_id.as_i64(),
        ),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}
