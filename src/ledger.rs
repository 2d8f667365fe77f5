//! A shareable handle that owns the database connection and exposes every
//! ledger operation as a method.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use time::OffsetDateTime;

use crate::{
    Error, Money,
    account::{self, Account},
    allowance::{self, AllowanceReceipt},
    balances::{self, Balances},
    config::LedgerConfig,
    database_id::{SavingsGoalId, TransactionId},
    db::{initialize, open_connection},
    reconcile::{self, ConsistencyReport},
    savings_goal::{self, GoalDetails, SavingsGoal},
    savings_transaction::{self, SavingsTransaction},
    timezone::{get_timezone, local_now},
    transaction::{self, NewTransaction, Transaction, TransactionPatch, TransactionQuery},
    transfer::{self, TransferReceipt, TransferRequest},
    user::{self, User, UserID},
};

/// The entry point for callers that do not want to manage connections.
///
/// Cloning a `Ledger` is cheap and every clone shares the same connection.
#[derive(Debug, Clone)]
pub struct Ledger {
    /// The database connection.
    connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    local_timezone: String,
}

impl Ledger {
    /// Open the database described by `config`, creating the tables if
    /// needed.
    ///
    /// # Errors
    /// Returns an:
    /// - [Error::InvalidTimezoneError] if the configured timezone is unknown,
    /// - or [Error::SqlError] if the database cannot be opened or initialized.
    pub fn open(config: &LedgerConfig) -> Result<Self, Error> {
        let connection = open_connection(&config.db_path, config.busy_timeout)?;

        Self::new(connection, &config.local_timezone)
    }

    /// Create a new [Ledger] from an open SQLite connection.
    ///
    /// This function will initialize the database by adding the tables for the domain models.
    /// `local_timezone` should be a valid, canonical timezone name, e.g. "Pacific/Auckland".
    ///
    /// # Errors
    /// Returns an:
    /// - [Error::InvalidTimezoneError] if `local_timezone` is unknown,
    /// - or [Error::SqlError] if the database cannot be initialized.
    pub fn new(connection: Connection, local_timezone: &str) -> Result<Self, Error> {
        get_timezone(local_timezone)?;
        initialize(&connection)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            local_timezone: local_timezone.to_owned(),
        })
    }

    /// The configured timezone name.
    pub fn local_timezone(&self) -> &str {
        &self.local_timezone
    }

    fn with_connection<T>(
        &self,
        operation: impl FnOnce(&Connection) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)?;

        operation(&connection)
    }

    /// See [register_user](crate::register_user).
    pub fn register_user(&self, email: &str, name: &str) -> Result<User, Error> {
        self.with_connection(|connection| user::register_user(email, name, connection))
    }

    /// See [get_account](crate::get_account).
    pub fn account(&self, user_id: UserID) -> Result<Account, Error> {
        self.with_connection(|connection| account::get_account(user_id, connection))
    }

    /// See [set_allowance_income](crate::set_allowance_income).
    pub fn set_allowance_income(&self, user_id: UserID, amount: Money) -> Result<Account, Error> {
        self.with_connection(|connection| {
            account::set_allowance_income(user_id, amount, connection)
        })
    }

    /// See [current_balances](crate::current_balances).
    pub fn balances(&self, user_id: UserID) -> Result<Balances, Error> {
        self.with_connection(|connection| balances::current_balances(user_id, connection))
    }

    /// See [unallocated_savings](crate::unallocated_savings).
    pub fn unallocated_savings(&self, user_id: UserID) -> Result<Money, Error> {
        self.with_connection(|connection| balances::unallocated_savings(user_id, connection))
    }

    /// See [create_transaction](crate::create_transaction).
    pub fn create_transaction(
        &self,
        user_id: UserID,
        new: NewTransaction,
    ) -> Result<Transaction, Error> {
        self.with_connection(|connection| transaction::create_transaction(user_id, new, connection))
    }

    /// See [get_transaction](crate::get_transaction).
    pub fn transaction(&self, id: TransactionId, user_id: UserID) -> Result<Transaction, Error> {
        self.with_connection(|connection| transaction::get_transaction(id, user_id, connection))
    }

    /// See [query_transactions](crate::query_transactions).
    pub fn transactions(
        &self,
        user_id: UserID,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>, Error> {
        self.with_connection(|connection| {
            transaction::query_transactions(user_id, query, connection)
        })
    }

    /// See [replace_transaction](crate::replace_transaction).
    pub fn replace_transaction(
        &self,
        id: TransactionId,
        user_id: UserID,
        new: NewTransaction,
    ) -> Result<Transaction, Error> {
        self.with_connection(|connection| {
            transaction::replace_transaction(id, user_id, new, connection)
        })
    }

    /// See [patch_transaction](crate::patch_transaction).
    pub fn patch_transaction(
        &self,
        id: TransactionId,
        user_id: UserID,
        patch: TransactionPatch,
    ) -> Result<Transaction, Error> {
        self.with_connection(|connection| {
            transaction::patch_transaction(id, user_id, patch, connection)
        })
    }

    /// See [delete_transaction](crate::delete_transaction).
    pub fn delete_transaction(
        &self,
        id: TransactionId,
        user_id: UserID,
    ) -> Result<Transaction, Error> {
        self.with_connection(|connection| transaction::delete_transaction(id, user_id, connection))
    }

    /// See [create_savings_goal](crate::create_savings_goal).
    pub fn create_savings_goal(
        &self,
        user_id: UserID,
        details: GoalDetails,
    ) -> Result<SavingsGoal, Error> {
        self.with_connection(|connection| {
            savings_goal::create_savings_goal(user_id, details, connection)
        })
    }

    /// See [get_savings_goal](crate::get_savings_goal).
    pub fn savings_goal(&self, id: SavingsGoalId, user_id: UserID) -> Result<SavingsGoal, Error> {
        self.with_connection(|connection| savings_goal::get_savings_goal(id, user_id, connection))
    }

    /// See [list_active_savings_goals](crate::list_active_savings_goals).
    pub fn savings_goals(&self, user_id: UserID) -> Result<Vec<SavingsGoal>, Error> {
        self.with_connection(|connection| {
            savings_goal::list_active_savings_goals(user_id, connection)
        })
    }

    /// See [update_savings_goal](crate::update_savings_goal).
    pub fn update_savings_goal(
        &self,
        id: SavingsGoalId,
        user_id: UserID,
        details: GoalDetails,
    ) -> Result<SavingsGoal, Error> {
        self.with_connection(|connection| {
            savings_goal::update_savings_goal(id, user_id, details, connection)
        })
    }

    /// See [deactivate_savings_goal](crate::deactivate_savings_goal).
    pub fn deactivate_savings_goal(&self, id: SavingsGoalId, user_id: UserID) -> Result<(), Error> {
        self.with_connection(|connection| {
            savings_goal::deactivate_savings_goal(id, user_id, connection)
        })
    }

    /// See [list_savings_transactions](crate::list_savings_transactions).
    pub fn savings_transactions(&self, user_id: UserID) -> Result<Vec<SavingsTransaction>, Error> {
        self.with_connection(|connection| {
            savings_transaction::list_savings_transactions(user_id, connection)
        })
    }

    /// Move money between the current and savings balances, dated today in
    /// the local timezone. See [transfer](crate::transfer()).
    pub fn transfer(
        &self,
        user_id: UserID,
        request: TransferRequest,
    ) -> Result<TransferReceipt, Error> {
        let now = local_now(&self.local_timezone)?;

        self.with_connection(|connection| transfer::transfer(user_id, request, now, connection))
    }

    /// Credit the monthly allowance, using the calendar month of the local
    /// timezone. See [process_auto_allowance](crate::process_auto_allowance).
    pub fn process_auto_allowance(&self, user_id: UserID) -> Result<AllowanceReceipt, Error> {
        let timezone = get_timezone(&self.local_timezone)?;
        let now = OffsetDateTime::now_utc();

        self.with_connection(|connection| {
            allowance::process_auto_allowance(user_id, now, timezone, connection)
        })
    }

    /// See [check_consistency](crate::check_consistency).
    pub fn check_consistency(&self, user_id: UserID) -> Result<ConsistencyReport, Error> {
        self.with_connection(|connection| reconcile::check_consistency(user_id, connection))
    }

    /// See [backfill_savings_balance](crate::backfill_savings_balance).
    pub fn backfill_savings_balance(&self, user_id: UserID) -> Result<Balances, Error> {
        self.with_connection(|connection| {
            reconcile::backfill_savings_balance(user_id, connection)
        })
    }
}

#[cfg(test)]
mod ledger_tests {
    use std::thread;

    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        Error, Money,
        transaction::{Transaction, TransactionKind},
        transfer::{TransferDirection, TransferRequest},
    };

    use super::Ledger;

    fn get_test_ledger() -> Ledger {
        Ledger::new(Connection::open_in_memory().unwrap(), "Etc/UTC").unwrap()
    }

    #[test]
    fn rejects_unknown_timezone() {
        let result = Ledger::new(Connection::open_in_memory().unwrap(), "Atlantis/Capital");

        assert!(matches!(result, Err(Error::InvalidTimezoneError(_))));
    }

    #[test]
    fn runs_operations_through_shared_connection() {
        let ledger = get_test_ledger();
        let user = ledger.register_user("test@test.com", "Test").unwrap();
        let clone = ledger.clone();

        clone
            .create_transaction(
                user.id,
                Transaction::build(
                    Money::new(dec!(100)).unwrap(),
                    TransactionKind::Income,
                    "Part-time Job",
                    date!(2025 - 10 - 01),
                ),
            )
            .unwrap();
        let receipt = ledger
            .transfer(
                user.id,
                TransferRequest {
                    amount: Money::new(dec!(40)).unwrap(),
                    direction: TransferDirection::ToSavings,
                    goal_id: None,
                    description: None,
                },
            )
            .unwrap();

        assert_eq!(receipt.balance, Money::new(dec!(60)).unwrap());
        assert_eq!(clone.balances(user.id).unwrap().savings_balance, receipt.savings_balance);
        assert!(ledger.check_consistency(user.id).unwrap().is_consistent());
    }

    #[test]
    fn allowance_is_credited_once() {
        let ledger = get_test_ledger();
        let user = ledger.register_user("test@test.com", "Test").unwrap();
        ledger
            .set_allowance_income(user.id, Money::new(dec!(50)).unwrap())
            .unwrap();

        let first = ledger.process_auto_allowance(user.id);
        let second = ledger.process_auto_allowance(user.id);

        assert!(first.is_ok());
        assert_eq!(second, Err(Error::AllowanceAlreadyProcessed));
        assert_eq!(
            ledger.balances(user.id).unwrap().balance,
            Money::new(dec!(50)).unwrap()
        );
    }

    #[test]
    fn poisoned_lock_is_store_error() {
        let ledger = get_test_ledger();
        let user = ledger.register_user("test@test.com", "Test").unwrap();
        let clone = ledger.clone();

        let _ = thread::spawn(move || {
            let _guard = clone.connection.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert_eq!(ledger.account(user.id), Err(Error::DatabaseLockError));
    }
}
