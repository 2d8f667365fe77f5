//! Code for creating the user table and registering users.
//!
//! Authentication is handled outside of this crate. Registration only needs
//! to create the user row and the account that holds the user's balances.

use std::fmt::Display;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    account::insert_account,
    db::{begin_write_scope, get_timestamp},
};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered user of the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The user's email address, unique across all users.
    pub email: String,
    /// The user's display name.
    pub name: String,
    /// When the user registered.
    pub created_at: OffsetDateTime,
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                created_at INTEGER NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Register a new user and create their account with zero balances.
///
/// The user and the account are created in the same database transaction.
///
/// # Errors
///
/// This function will return a:
/// - [Error::InvalidEmail] if `email` is blank or has no `@`,
/// - [Error::EmptyField] if `name` is blank,
/// - [Error::DuplicateEmail] if `email` is already registered,
/// - or [Error::SqlError] if some other SQL error occurred.
pub fn register_user(email: &str, name: &str, connection: &Connection) -> Result<User, Error> {
    let email = email.trim();
    let name = name.trim();

    if email.is_empty() || !email.contains('@') {
        return Err(Error::InvalidEmail(email.to_owned()));
    }

    if name.is_empty() {
        return Err(Error::EmptyField("name"));
    }

    let now = OffsetDateTime::now_utc();
    let scope = begin_write_scope(connection)?;

    scope
        .execute(
            "INSERT INTO user (email, name, created_at) VALUES (?1, ?2, ?3)",
            (email, name, now.unix_timestamp()),
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                _,
            ) => Error::DuplicateEmail(email.to_owned()),
            error => error.into(),
        })?;

    let id = UserID::new(scope.last_insert_rowid());
    insert_account(id, now, &scope)?;

    scope.commit()?;
    tracing::info!("Registered user {id}");

    get_user_by_id(id, connection)
}

/// Get the user from the database with an ID equal to `user_id`.
///
/// # Errors
///
/// This function will return an error if:
/// - `user_id` does not belong to a registered user.
/// - there was an error trying to access the store.
pub fn get_user_by_id(user_id: UserID, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare("SELECT id, email, name, created_at FROM user WHERE id = :id")?
        .query_row(&[(":id", &user_id.as_i64())], |row| {
            Ok(User {
                id: UserID::new(row.get(0)?),
                email: row.get(1)?,
                name: row.get(2)?,
                created_at: get_timestamp(row, 3)?,
            })
        })
        .map_err(|error| error.into())
}
