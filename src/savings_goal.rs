//! Savings goals: named targets that money in the savings balance can be
//! earmarked for.
//!
//! A goal does not store how much has been saved towards it. The current
//! amount is always computed from the savings ledger entries tagged with the
//! goal's ID.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    Error, Money,
    database_id::SavingsGoalId,
    db::{begin_write_scope, get_timestamp},
    user::UserID,
};

/// A named savings target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsGoal {
    /// The ID of the goal.
    pub id: SavingsGoalId,
    /// The user the goal belongs to.
    pub user_id: UserID,
    /// What the user is saving for.
    pub name: String,
    /// How much the user wants to save, always greater than zero.
    pub target_amount: Money,
    /// The signed sum of the savings ledger entries tagged with this goal.
    ///
    /// May exceed [SavingsGoal::target_amount].
    pub current_amount: Money,
    /// The day the user wants to reach the target by.
    pub deadline: Option<Date>,
    /// A text description of the goal.
    pub description: String,
    /// `false` once the goal has been deleted. Inactive goals keep their
    /// ledger entries but no longer count towards allocated savings.
    pub is_active: bool,
    /// When the goal was created.
    pub created_at: OffsetDateTime,
    /// When the goal was last changed.
    pub updated_at: OffsetDateTime,
}

impl SavingsGoal {
    /// How much is left to save, zero once the target has been reached.
    pub fn remaining(&self) -> Money {
        let remaining = self.target_amount - self.current_amount;

        if remaining.is_negative() {
            Money::zero()
        } else {
            remaining
        }
    }
}

/// The user-editable fields of a savings goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalDetails {
    /// What the user is saving for, must not be blank.
    pub name: String,
    /// How much the user wants to save, must be greater than zero.
    pub target_amount: Money,
    /// The day the user wants to reach the target by.
    pub deadline: Option<Date>,
    /// A text description of the goal.
    pub description: String,
}

impl GoalDetails {
    fn validate(mut self) -> Result<Self, Error> {
        self.name = self.name.trim().to_owned();

        if self.name.is_empty() {
            return Err(Error::EmptyField("name"));
        }

        if !self.target_amount.is_positive() {
            return Err(Error::NonPositiveAmount(self.target_amount));
        }

        Ok(self)
    }
}

/// Create the savings goal table.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_savings_goal_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS savings_goal (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            target_amount INTEGER NOT NULL CHECK (target_amount > 0),
            deadline TEXT,
            description TEXT NOT NULL DEFAULT '',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_savings_goal_user ON savings_goal(user_id, is_active);",
        (),
    )?;

    Ok(())
}

// The current amount is folded from the ledger, never read from a column.
const SELECT_GOAL: &str = "SELECT
        g.id, g.user_id, g.name, g.target_amount,
        COALESCE(SUM(CASE st.kind WHEN 'deposit' THEN st.amount ELSE -st.amount END), 0),
        g.deadline, g.description, g.is_active, g.created_at, g.updated_at
    FROM savings_goal g
    LEFT JOIN savings_transaction st ON st.goal_id = g.id";

fn map_goal_row(row: &Row) -> Result<SavingsGoal, rusqlite::Error> {
    Ok(SavingsGoal {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        name: row.get(2)?,
        target_amount: row.get(3)?,
        current_amount: row.get(4)?,
        deadline: row.get(5)?,
        description: row.get(6)?,
        is_active: row.get(7)?,
        created_at: get_timestamp(row, 8)?,
        updated_at: get_timestamp(row, 9)?,
    })
}

/// Create a new, empty savings goal.
///
/// # Errors
/// This function will return a:
/// - [Error::EmptyField] if the name is blank,
/// - [Error::NonPositiveAmount] if the target is not greater than zero,
/// - [Error::NotFound] if the user does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_savings_goal(
    user_id: UserID,
    details: GoalDetails,
    connection: &Connection,
) -> Result<SavingsGoal, Error> {
    let details = details.validate()?;
    let now = OffsetDateTime::now_utc().unix_timestamp();

    connection
        .execute(
            "INSERT INTO savings_goal
                (user_id, name, target_amount, deadline, description, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            (
                user_id.as_i64(),
                &details.name,
                details.target_amount,
                details.deadline,
                &details.description,
                now,
            ),
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::NotFound,
            error => error.into(),
        })?;

    let id = connection.last_insert_rowid();
    tracing::info!(
        "Created savings goal {id} \"{}\" with target {} for user {user_id}",
        details.name,
        details.target_amount
    );

    get_savings_goal(id, user_id, connection)
}

/// Retrieve a savings goal, active or not, with its current amount.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a goal owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_savings_goal(
    id: SavingsGoalId,
    user_id: UserID,
    connection: &Connection,
) -> Result<SavingsGoal, Error> {
    let goal = connection
        .prepare(&format!(
            "{SELECT_GOAL} WHERE g.id = :id AND g.user_id = :user_id GROUP BY g.id"
        ))?
        .query_row(&[(":id", &id), (":user_id", &user_id.as_i64())], map_goal_row)?;

    Ok(goal)
}

/// Retrieve the active savings goals of `user_id`, newest first.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn list_active_savings_goals(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<SavingsGoal>, Error> {
    connection
        .prepare(&format!(
            "{SELECT_GOAL} WHERE g.user_id = :user_id AND g.is_active = 1
             GROUP BY g.id
             ORDER BY g.created_at DESC, g.id DESC"
        ))?
        .query_map(&[(":user_id", &user_id.as_i64())], map_goal_row)?
        .map(|maybe_goal| maybe_goal.map_err(Error::from))
        .collect()
}

/// Replace the name, target, deadline and description of an active goal.
///
/// The goal's ledger entries, and therefore its current amount, are not
/// affected.
///
/// # Errors
/// This function will return a:
/// - [Error::EmptyField] if the name is blank,
/// - [Error::NonPositiveAmount] if the target is not greater than zero,
/// - [Error::NotFound] if `id` does not refer to an active goal owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_savings_goal(
    id: SavingsGoalId,
    user_id: UserID,
    details: GoalDetails,
    connection: &Connection,
) -> Result<SavingsGoal, Error> {
    let details = details.validate()?;

    let scope = begin_write_scope(connection)?;
    let rows_affected = scope.execute(
        "UPDATE savings_goal
         SET name = ?1, target_amount = ?2, deadline = ?3, description = ?4, updated_at = ?5
         WHERE id = ?6 AND user_id = ?7 AND is_active = 1",
        (
            &details.name,
            details.target_amount,
            details.deadline,
            &details.description,
            OffsetDateTime::now_utc().unix_timestamp(),
            id,
            user_id.as_i64(),
        ),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    let goal = get_savings_goal(id, user_id, &scope)?;
    scope.commit()?;

    tracing::info!("Updated savings goal {id} for user {user_id}");

    Ok(goal)
}

/// Soft delete an active goal.
///
/// The goal's ledger entries are kept and still count towards the savings
/// balance, but the money is no longer earmarked and becomes unallocated.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to an active goal owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn deactivate_savings_goal(
    id: SavingsGoalId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE savings_goal SET is_active = 0, updated_at = ?1
         WHERE id = ?2 AND user_id = ?3 AND is_active = 1",
        (
            OffsetDateTime::now_utc().unix_timestamp(),
            id,
            user_id.as_i64(),
        ),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    tracing::info!("Deactivated savings goal {id} for user {user_id}");

    Ok(())
}
