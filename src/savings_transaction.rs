//! The savings ledger: an append-only record of money moved into and out of
//! the savings balance.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    Error, Money,
    database_id::{SavingsGoalId, SavingsTransactionId},
    db::get_timestamp,
    user::UserID,
};

/// Whether a savings ledger entry adds to or takes from the savings balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SavingsKind {
    /// Money moved from the current balance into savings.
    Deposit,
    /// Money moved from savings back into the current balance.
    Withdrawal,
}

impl SavingsKind {
    /// The change to the savings balance caused by an entry of this kind for
    /// `amount`.
    pub fn signed(&self, amount: Money) -> Money {
        match self {
            SavingsKind::Deposit => amount,
            SavingsKind::Withdrawal => -amount,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            SavingsKind::Deposit => "deposit",
            SavingsKind::Withdrawal => "withdrawal",
        }
    }
}

impl Display for SavingsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SavingsKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(SavingsKind::Deposit),
            "withdrawal" => Ok(SavingsKind::Withdrawal),
            other => Err(Error::InvalidEnumValue {
                field: "savings transaction kind",
                value: other.to_owned(),
            }),
        }
    }
}

impl ToSql for SavingsKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SavingsKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

/// One entry in the savings ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsTransaction {
    /// The ID of the entry.
    pub id: SavingsTransactionId,
    /// The user the entry belongs to.
    pub user_id: UserID,
    /// The goal the money was earmarked for, or `None` for general savings.
    ///
    /// Cleared if the goal row is removed.
    pub goal_id: Option<SavingsGoalId>,
    /// The amount moved, always greater than zero.
    pub amount: Money,
    /// Which way the money moved.
    pub kind: SavingsKind,
    /// A text description of the transfer.
    pub description: String,
    /// The day of the transfer.
    pub date: Date,
    /// When the entry was recorded.
    pub created_at: OffsetDateTime,
    /// When the entry was last changed.
    pub updated_at: OffsetDateTime,
}

impl SavingsTransaction {
    /// The change this entry made to the savings balance.
    pub fn savings_effect(&self) -> Money {
        self.kind.signed(self.amount)
    }
}

/// Create the savings ledger table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_savings_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS savings_transaction (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            goal_id INTEGER,
            amount INTEGER NOT NULL CHECK (amount > 0),
            kind TEXT NOT NULL CHECK (kind IN ('deposit', 'withdrawal')),
            description TEXT NOT NULL DEFAULT '',
            date TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(goal_id) REFERENCES savings_goal(id) ON UPDATE CASCADE ON DELETE SET NULL
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_savings_transaction_goal ON savings_transaction(goal_id);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [SavingsTransaction].
pub fn map_savings_transaction_row(row: &Row) -> Result<SavingsTransaction, rusqlite::Error> {
    Ok(SavingsTransaction {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        goal_id: row.get(2)?,
        amount: row.get(3)?,
        kind: row.get(4)?,
        description: row.get(5)?,
        date: row.get(6)?,
        created_at: get_timestamp(row, 7)?,
        updated_at: get_timestamp(row, 8)?,
    })
}

/// The fields of a savings ledger entry that is about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewSavingsTransaction<'a> {
    pub goal_id: Option<SavingsGoalId>,
    pub amount: Money,
    pub kind: SavingsKind,
    pub description: &'a str,
    pub date: Date,
}

/// Append an entry to the savings ledger.
///
/// Callers must update the savings balance in the same scope.
pub(crate) fn insert_savings_transaction(
    user_id: UserID,
    new: &NewSavingsTransaction,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<SavingsTransaction, Error> {
    let savings_transaction = connection
        .prepare(
            "INSERT INTO savings_transaction
                (user_id, goal_id, amount, kind, description, date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             RETURNING id, user_id, goal_id, amount, kind, description, date, created_at, updated_at",
        )?
        .query_row(
            (
                user_id.as_i64(),
                new.goal_id,
                new.amount,
                new.kind,
                new.description,
                new.date,
                now.unix_timestamp(),
            ),
            map_savings_transaction_row,
        )?;

    Ok(savings_transaction)
}

/// Retrieve the savings ledger of `user_id`, newest first.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn list_savings_transactions(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<SavingsTransaction>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, goal_id, amount, kind, description, date, created_at, updated_at
             FROM savings_transaction
             WHERE user_id = :user_id
             ORDER BY date DESC, created_at DESC, id DESC",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], map_savings_transaction_row)?
        .map(|maybe_row| maybe_row.map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod savings_transaction_tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::{OffsetDateTime, macros::date};

    use crate::{
        Error, Money,
        db::initialize,
        user::{UserID, register_user},
    };

    use super::{
        NewSavingsTransaction, SavingsKind, insert_savings_transaction, list_savings_transactions,
    };

    fn get_test_connection() -> (Connection, UserID) {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let user = register_user("test@test.com", "Test", &conn).unwrap();
        (conn, user.id)
    }

    #[test]
    fn withdrawal_is_negative() {
        let amount = Money::new(dec!(5)).unwrap();

        assert_eq!(SavingsKind::Withdrawal.signed(amount), -amount);
        assert_eq!(SavingsKind::Deposit.signed(amount), amount);
    }

    #[test]
    fn rejects_unknown_kind() {
        assert_eq!(
            "transfer".parse::<SavingsKind>(),
            Err(Error::InvalidEnumValue {
                field: "savings transaction kind",
                value: "transfer".to_owned()
            })
        );
    }

    #[test]
    fn lists_newest_first_for_owner_only() {
        let (conn, user_id) = get_test_connection();
        let other = register_user("other@test.com", "Other", &conn).unwrap();
        let now = OffsetDateTime::now_utc();
        let amount = Money::new(dec!(12.34)).unwrap();

        let older = insert_savings_transaction(
            user_id,
            &NewSavingsTransaction {
                goal_id: None,
                amount,
                kind: SavingsKind::Deposit,
                description: "first",
                date: date!(2025 - 01 - 01),
            },
            now,
            &conn,
        )
        .unwrap();
        let newer = insert_savings_transaction(
            user_id,
            &NewSavingsTransaction {
                goal_id: None,
                amount,
                kind: SavingsKind::Withdrawal,
                description: "second",
                date: date!(2025 - 02 - 01),
            },
            now,
            &conn,
        )
        .unwrap();
        insert_savings_transaction(
            other.id,
            &NewSavingsTransaction {
                goal_id: None,
                amount,
                kind: SavingsKind::Deposit,
                description: "not mine",
                date: date!(2025 - 03 - 01),
            },
            now,
            &conn,
        )
        .unwrap();

        let got = list_savings_transactions(user_id, &conn).unwrap();

        assert_eq!(got, vec![newer, older]);
    }
}
