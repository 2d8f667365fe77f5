//! Reads the stored account balances and derives the goal allocations from
//! the savings ledger.
//!
//! Pass the open write scope as the connection when the values feed a
//! decision, so that they are read under the same lock as the write.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{Error, Money, database_id::SavingsGoalId, user::UserID};

/// The two stored balances of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// The money available for spending.
    pub balance: Money,
    /// The money put aside as savings.
    pub savings_balance: Money,
}

/// Get the current and savings balances of `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the user has no account,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn current_balances(user_id: UserID, connection: &Connection) -> Result<Balances, Error> {
    let balances = connection
        .prepare("SELECT balance, savings_balance FROM account WHERE user_id = :user_id")?
        .query_row(&[(":user_id", &user_id.as_i64())], |row| {
            Ok(Balances {
                balance: row.get(0)?,
                savings_balance: row.get(1)?,
            })
        })?;

    Ok(balances)
}

/// Get the amount saved towards a goal: deposits minus withdrawals tagged
/// with `goal_id`. A goal without any entries has saved zero.
///
/// The goal does not have to be active.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `goal_id` does not refer to a goal owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn goal_current_amount(
    goal_id: SavingsGoalId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Money, Error> {
    let amount: Money = connection
        .prepare(
            "SELECT COALESCE(SUM(CASE st.kind WHEN 'deposit' THEN st.amount ELSE -st.amount END), 0)
             FROM savings_goal g
             LEFT JOIN savings_transaction st ON st.goal_id = g.id
             WHERE g.id = :goal_id AND g.user_id = :user_id
             GROUP BY g.id",
        )?
        .query_row(
            &[(":goal_id", &goal_id), (":user_id", &user_id.as_i64())],
            |row| row.get(0),
        )?;

    Ok(amount)
}

/// Get the sum of the current amounts of the active goals of `user_id`.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn allocated_savings(user_id: UserID, connection: &Connection) -> Result<Money, Error> {
    let amount: Money = connection
        .prepare(
            "SELECT COALESCE(SUM(CASE st.kind WHEN 'deposit' THEN st.amount ELSE -st.amount END), 0)
             FROM savings_transaction st
             INNER JOIN savings_goal g ON st.goal_id = g.id
             WHERE g.user_id = :user_id AND g.is_active = 1",
        )?
        .query_row(&[(":user_id", &user_id.as_i64())], |row| row.get(0))?;

    Ok(amount)
}

/// Get the part of the savings balance of `user_id` that is not earmarked
/// for an active goal.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the user has no account,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn unallocated_savings(user_id: UserID, connection: &Connection) -> Result<Money, Error> {
    let Balances {
        savings_balance, ..
    } = current_balances(user_id, connection)?;
    let allocated = allocated_savings(user_id, connection)?;

    Ok(savings_balance - allocated)
}

#[cfg(test)]
mod balances_tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::{OffsetDateTime, macros::date};

    use crate::{
        Error, Money,
        account::set_balances,
        db::initialize,
        savings_goal::{GoalDetails, create_savings_goal, deactivate_savings_goal},
        savings_transaction::{NewSavingsTransaction, SavingsKind, insert_savings_transaction},
        user::{UserID, register_user},
    };

    use super::{
        Balances, allocated_savings, current_balances, goal_current_amount, unallocated_savings,
    };

    fn get_test_connection() -> (Connection, UserID) {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let user = register_user("test@test.com", "Test", &conn).unwrap();
        (conn, user.id)
    }

    fn money(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount).unwrap()
    }

    fn create_goal(user_id: UserID, conn: &Connection) -> i64 {
        create_savings_goal(
            user_id,
            GoalDetails {
                name: "Bike".to_owned(),
                target_amount: money(dec!(300)),
                deadline: None,
                description: String::new(),
            },
            conn,
        )
        .unwrap()
        .id
    }

    fn record(
        user_id: UserID,
        goal_id: Option<i64>,
        amount: Money,
        kind: SavingsKind,
        conn: &Connection,
    ) {
        insert_savings_transaction(
            user_id,
            &NewSavingsTransaction {
                goal_id,
                amount,
                kind,
                description: "",
                date: date!(2025 - 10 - 01),
            },
            OffsetDateTime::now_utc(),
            conn,
        )
        .unwrap();
    }

    #[test]
    fn new_account_has_zero_balances() {
        let (conn, user_id) = get_test_connection();

        assert_eq!(
            current_balances(user_id, &conn),
            Ok(Balances {
                balance: Money::zero(),
                savings_balance: Money::zero()
            })
        );
    }

    #[test]
    fn current_balances_fails_for_unknown_user() {
        let (conn, _) = get_test_connection();

        assert_eq!(current_balances(UserID::new(42), &conn), Err(Error::NotFound));
    }

    #[test]
    fn unfunded_goal_has_zero_current_amount() {
        let (conn, user_id) = get_test_connection();
        let goal_id = create_goal(user_id, &conn);

        assert_eq!(goal_current_amount(goal_id, user_id, &conn), Ok(Money::zero()));
    }

    #[test]
    fn goal_current_amount_is_signed_sum() {
        let (conn, user_id) = get_test_connection();
        let goal_id = create_goal(user_id, &conn);
        record(user_id, Some(goal_id), money(dec!(40)), SavingsKind::Deposit, &conn);
        record(user_id, Some(goal_id), money(dec!(10.01)), SavingsKind::Withdrawal, &conn);
        record(user_id, None, money(dec!(99)), SavingsKind::Deposit, &conn);

        assert_eq!(goal_current_amount(goal_id, user_id, &conn), Ok(money(dec!(29.99))));
    }

    #[test]
    fn goal_current_amount_hides_other_users_goals() {
        let (conn, user_id) = get_test_connection();
        let other = register_user("other@test.com", "Other", &conn).unwrap();
        let goal_id = create_goal(user_id, &conn);

        assert_eq!(goal_current_amount(goal_id, other.id, &conn), Err(Error::NotFound));
        assert_eq!(goal_current_amount(goal_id + 1, user_id, &conn), Err(Error::NotFound));
    }

    #[test]
    fn unallocated_excludes_active_goals_only() {
        let (conn, user_id) = get_test_connection();
        let active_goal = create_goal(user_id, &conn);
        let inactive_goal = create_goal(user_id, &conn);
        record(user_id, Some(active_goal), money(dec!(30)), SavingsKind::Deposit, &conn);
        record(user_id, Some(inactive_goal), money(dec!(20)), SavingsKind::Deposit, &conn);
        record(user_id, None, money(dec!(5)), SavingsKind::Deposit, &conn);
        set_balances(
            user_id,
            &Balances {
                balance: Money::zero(),
                savings_balance: money(dec!(55)),
            },
            OffsetDateTime::now_utc(),
            &conn,
        )
        .unwrap();
        deactivate_savings_goal(inactive_goal, user_id, &conn).unwrap();

        assert_eq!(allocated_savings(user_id, &conn), Ok(money(dec!(30))));
        assert_eq!(unallocated_savings(user_id, &conn), Ok(money(dec!(25))));
    }
}
