//! Checks that the stored balances agree with the journal and the savings
//! ledger, and repairs a savings balance that predates the ledger.

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error, Money,
    balances::{Balances, allocated_savings, current_balances},
    db::begin_write_scope,
    user::UserID,
};

/// The stored balances of an account next to the totals they should match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// The stored current balance.
    pub balance: Money,
    /// Income minus expenses over the whole journal.
    pub journal_total: Money,
    /// The stored savings balance.
    pub savings_balance: Money,
    /// Deposits minus withdrawals over the whole savings ledger.
    pub ledger_total: Money,
    /// The money allocated to active goals.
    pub allocated: Money,
}

impl ConsistencyReport {
    /// Whether the current balance equals the journal total.
    pub fn balance_matches_journal(&self) -> bool {
        self.balance == self.journal_total
    }

    /// Whether the savings balance equals the savings ledger total.
    pub fn savings_match_ledger(&self) -> bool {
        self.savings_balance == self.ledger_total
    }

    /// Whether the active goals hold no more than the savings balance.
    pub fn allocation_within_savings(&self) -> bool {
        self.allocated <= self.savings_balance
    }

    /// Whether every check passed.
    pub fn is_consistent(&self) -> bool {
        self.balance_matches_journal()
            && self.savings_match_ledger()
            && self.allocation_within_savings()
    }
}

fn journal_total(user_id: UserID, connection: &Connection) -> Result<Money, Error> {
    let total: Money = connection.query_row(
        "SELECT COALESCE(SUM(CASE kind WHEN 'income' THEN amount ELSE -amount END), 0)
         FROM \"transaction\" WHERE user_id = ?1",
        [user_id.as_i64()],
        |row| row.get(0),
    )?;

    Ok(total)
}

fn ledger_total(user_id: UserID, connection: &Connection) -> Result<Money, Error> {
    let total: Money = connection.query_row(
        "SELECT COALESCE(SUM(CASE kind WHEN 'deposit' THEN amount ELSE -amount END), 0)
         FROM savings_transaction WHERE user_id = ?1",
        [user_id.as_i64()],
        |row| row.get(0),
    )?;

    Ok(total)
}

/// Compare the stored balances of `user_id` with the journal and savings
/// ledger totals.
///
/// All values are read from the same snapshot of the database.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the user has no account,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn check_consistency(
    user_id: UserID,
    connection: &Connection,
) -> Result<ConsistencyReport, Error> {
    let snapshot = SqlTransaction::new_unchecked(connection, TransactionBehavior::Deferred)?;

    let Balances {
        balance,
        savings_balance,
    } = current_balances(user_id, &snapshot)?;

    let report = ConsistencyReport {
        balance,
        journal_total: journal_total(user_id, &snapshot)?,
        savings_balance,
        ledger_total: ledger_total(user_id, &snapshot)?,
        allocated: allocated_savings(user_id, &snapshot)?,
    };

    snapshot.commit()?;

    if !report.is_consistent() {
        tracing::warn!("Balances of user {user_id} are inconsistent: {report:?}");
    }

    Ok(report)
}

/// Set the stored savings balance of `user_id` to the savings ledger total.
///
/// This is a one-off repair for accounts whose savings balance was recorded
/// before the ledger existed. It is never run automatically.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if the user has no account,
/// - or [Error::SqlError] if there is some other SQL error, including a
///   ledger total below zero.
pub fn backfill_savings_balance(user_id: UserID, connection: &Connection) -> Result<Balances, Error> {
    let scope = begin_write_scope(connection)?;
    let before = current_balances(user_id, &scope)?;
    let total = ledger_total(user_id, &scope)?;

    scope.execute(
        "UPDATE account SET savings_balance = ?1, updated_at = ?2 WHERE user_id = ?3",
        (
            total,
            OffsetDateTime::now_utc().unix_timestamp(),
            user_id.as_i64(),
        ),
    )?;
    scope.commit()?;

    if before.savings_balance != total {
        tracing::warn!(
            "Backfilled savings balance of user {user_id} from {} to {total}",
            before.savings_balance
        );
    } else {
        tracing::info!("Savings balance of user {user_id} already matched the ledger");
    }

    Ok(Balances {
        balance: before.balance,
        savings_balance: total,
    })
}

#[cfg(test)]
mod reconcile_tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::{OffsetDateTime, macros::date};

    use crate::{
        Error, Money,
        account::set_allowance_income,
        allowance::process_auto_allowance,
        balances::{Balances, current_balances},
        db::initialize,
        savings_goal::{GoalDetails, create_savings_goal, deactivate_savings_goal},
        timezone::get_timezone,
        transaction::{
            Transaction, TransactionKind, TransactionPatch, create_transaction,
            delete_transaction, patch_transaction, replace_transaction,
        },
        transfer::{TransferDirection, TransferRequest, transfer},
        user::{UserID, register_user},
    };

    use super::{backfill_savings_balance, check_consistency};

    fn get_test_connection() -> (Connection, UserID) {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let user = register_user("test@test.com", "Test", &conn).unwrap();
        (conn, user.id)
    }

    fn money(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount).unwrap()
    }

    fn move_money(
        user_id: UserID,
        amount: Money,
        direction: TransferDirection,
        goal_id: Option<i64>,
        conn: &Connection,
    ) -> Result<(), Error> {
        transfer(
            user_id,
            TransferRequest {
                amount,
                direction,
                goal_id,
                description: None,
            },
            OffsetDateTime::now_utc(),
            conn,
        )
        .map(|_| ())
    }

    #[test]
    fn new_account_is_consistent() {
        let (conn, user_id) = get_test_connection();

        let report = check_consistency(user_id, &conn).unwrap();

        assert!(report.is_consistent());
        assert_eq!(report.journal_total, Money::zero());
    }

    #[test]
    fn stays_consistent_through_every_operation() {
        let (conn, user_id) = get_test_connection();
        let assert_consistent = |conn: &Connection| {
            let report = check_consistency(user_id, conn).unwrap();
            assert!(report.is_consistent(), "{report:?}");
        };

        set_allowance_income(user_id, money(dec!(200)), &conn).unwrap();
        process_auto_allowance(
            user_id,
            OffsetDateTime::now_utc(),
            get_timezone("Etc/UTC").unwrap(),
            &conn,
        )
        .unwrap();
        assert_consistent(&conn);

        let expense = create_transaction(
            user_id,
            Transaction::build(
                money(dec!(19.99)),
                TransactionKind::Expense,
                "Books & Supplies",
                date!(2025 - 10 - 03),
            ),
            &conn,
        )
        .unwrap();
        patch_transaction(
            expense.id,
            user_id,
            TransactionPatch {
                amount: Some(money(dec!(29.99))),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();
        assert_consistent(&conn);

        let goal = create_savings_goal(
            user_id,
            GoalDetails {
                name: "Trip".to_owned(),
                target_amount: money(dec!(500)),
                deadline: None,
                description: String::new(),
            },
            &conn,
        )
        .unwrap();
        move_money(user_id, money(dec!(80)), TransferDirection::ToSavings, Some(goal.id), &conn)
            .unwrap();
        move_money(user_id, money(dec!(20)), TransferDirection::ToSavings, None, &conn).unwrap();
        assert_consistent(&conn);

        let rejected =
            move_money(user_id, money(dec!(30)), TransferDirection::FromSavings, None, &conn);
        assert!(matches!(rejected, Err(Error::AllocationConflict { .. })));
        move_money(user_id, money(dec!(30)), TransferDirection::FromSavings, Some(goal.id), &conn)
            .unwrap();
        assert_consistent(&conn);

        replace_transaction(
            expense.id,
            user_id,
            Transaction::build(
                money(dec!(5)),
                TransactionKind::Income,
                "Gift Money",
                date!(2025 - 10 - 04),
            ),
            &conn,
        )
        .unwrap();
        delete_transaction(expense.id, user_id, &conn).unwrap();
        deactivate_savings_goal(goal.id, user_id, &conn).unwrap();
        assert_consistent(&conn);

        let report = check_consistency(user_id, &conn).unwrap();
        assert_eq!(report.balance, money(dec!(130)));
        assert_eq!(report.savings_balance, money(dec!(70)));
        assert_eq!(report.allocated, Money::zero());
    }

    #[test]
    fn detects_and_backfills_savings_drift() {
        let (conn, user_id) = get_test_connection();
        create_transaction(
            user_id,
            Transaction::build(
                money(dec!(100)),
                TransactionKind::Income,
                "Part-time Job",
                date!(2025 - 10 - 01),
            ),
            &conn,
        )
        .unwrap();
        move_money(user_id, money(dec!(25)), TransferDirection::ToSavings, None, &conn).unwrap();
        conn.execute("UPDATE account SET savings_balance = 9900", [])
            .unwrap();

        let report = check_consistency(user_id, &conn).unwrap();
        assert!(!report.savings_match_ledger());
        assert!(report.balance_matches_journal());
        assert!(!report.is_consistent());

        let balances = backfill_savings_balance(user_id, &conn).unwrap();

        assert_eq!(
            balances,
            Balances {
                balance: money(dec!(75)),
                savings_balance: money(dec!(25)),
            }
        );
        assert_eq!(current_balances(user_id, &conn), Ok(balances));
        assert!(check_consistency(user_id, &conn).unwrap().is_consistent());
    }

    #[test]
    fn unknown_user_is_not_found() {
        let (conn, _) = get_test_connection();

        assert_eq!(check_consistency(UserID::new(3), &conn), Err(Error::NotFound));
        assert_eq!(backfill_savings_balance(UserID::new(3), &conn), Err(Error::NotFound));
    }
}
