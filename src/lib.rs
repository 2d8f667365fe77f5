//! Student ledger keeps track of a student's money: a current balance, a
//! savings balance, a journal of income and expenses, and savings goals that
//! are funded through a savings ledger.
//!
//! This library provides the balance-consistency and transfer engine. Every
//! operation that changes money runs inside a single SQLite transaction so
//! that the stored balances, the journal and the savings ledger always agree.

#![warn(missing_docs)]

mod account;
mod allowance;
mod balances;
mod category;
mod config;
mod database_id;
mod db;
mod ledger;
mod logging;
mod money;
mod reconcile;
mod savings_goal;
mod savings_transaction;
mod timezone;
mod transaction;
mod transfer;
mod user;

pub use account::{Account, get_account, set_allowance_income};
pub use allowance::{
    ALLOWANCE_CATEGORY, ALLOWANCE_DESCRIPTION, AllowanceReceipt, process_auto_allowance,
};
pub use balances::{
    Balances, allocated_savings, current_balances, goal_current_amount, unallocated_savings,
};
pub use category::{RECOMMENDED_EXPENSE_CATEGORIES, RECOMMENDED_INCOME_CATEGORIES, is_recommended};
pub use config::{DEFAULT_BUSY_TIMEOUT, DEFAULT_TIMEZONE, LedgerConfig};
pub use database_id::{DatabaseId, SavingsGoalId, SavingsTransactionId, TransactionId};
pub use db::{initialize as initialize_db, open_connection};
pub use ledger::Ledger;
pub use logging::setup_logging;
pub use money::Money;
pub use reconcile::{ConsistencyReport, backfill_savings_balance, check_consistency};
pub use savings_goal::{
    GoalDetails, SavingsGoal, create_savings_goal, deactivate_savings_goal, get_savings_goal,
    list_active_savings_goals, update_savings_goal,
};
pub use savings_transaction::{SavingsKind, SavingsTransaction, list_savings_transactions};
pub use timezone::{get_local_offset, get_timezone, local_now};
pub use transaction::{
    NewTransaction, Transaction, TransactionKind, TransactionPatch, TransactionQuery,
    create_transaction, delete_transaction, get_transaction, parse_date, patch_transaction,
    query_transactions, replace_transaction,
};
pub use transfer::{TransferDirection, TransferReceipt, TransferRequest, transfer};
pub use user::{User, UserID, register_user};

/// The stable category of an [Error].
///
/// Callers that need to translate failures into another representation
/// (e.g., HTTP status codes) should match on the kind rather than on
/// individual [Error] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or out-of-range input, including an unknown configured
    /// timezone.
    Validation,
    /// The entity does not exist or belongs to another user.
    NotFound,
    /// The amount exceeds the relevant balance.
    InsufficientFunds,
    /// A withdrawal from general savings would use money earmarked for a goal.
    AllocationConflict,
    /// The request clashes with existing state, e.g. a duplicate allowance.
    Conflict,
    /// The underlying store failed.
    Store,
}

/// Which balance an [Error::InsufficientFunds] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundsSource {
    /// The current (spending) balance.
    CurrentBalance,
    /// The total savings balance.
    SavingsBalance,
    /// The money allocated to a single savings goal.
    SavingsGoal(SavingsGoalId),
}

impl std::fmt::Display for FundsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FundsSource::CurrentBalance => write!(f, "current balance"),
            FundsSource::SavingsBalance => write!(f, "savings balance"),
            FundsSource::SavingsGoal(id) => write!(f, "savings goal {id}"),
        }
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// An amount was zero or negative where a positive amount is required.
    #[error("amount must be greater than zero, got {0}")]
    NonPositiveAmount(Money),

    /// An amount was negative where only non-negative amounts are allowed.
    #[error("amount must not be negative, got {0}")]
    NegativeAmount(Money),

    /// An amount had more decimal places than the currency supports.
    ///
    /// Amounts are never rounded, the caller must supply whole cents.
    #[error("{0} has more than two decimal places")]
    TooPrecise(rust_decimal::Decimal),

    /// An amount is too large to be stored.
    #[error("{0} is too large to be stored")]
    AmountOutOfRange(rust_decimal::Decimal),

    /// A string could not be parsed as an amount of money.
    #[error("\"{0}\" is not a valid amount")]
    InvalidAmount(String),

    /// A string could not be parsed as a `YYYY-MM-DD` date.
    #[error("invalid date \"{0}\", use YYYY-MM-DD")]
    InvalidDate(String),

    /// A string did not name a known variant of an enumeration, e.g. a
    /// transaction kind that is neither income nor expense.
    #[error("\"{value}\" is not a valid {field}")]
    InvalidEnumValue {
        /// The name of the field that was being parsed.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A required text field was empty.
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    /// The email address is not plausible.
    #[error("\"{0}\" is not a valid email address")]
    InvalidEmail(String),

    /// The user has not configured an allowance amount.
    #[error("no allowance amount set")]
    NoAllowanceSet,

    /// The requested resource was not found.
    ///
    /// This is also returned when the resource exists but belongs to another
    /// user so that callers cannot probe for other users' IDs.
    #[error("the requested resource could not be found")]
    NotFound,

    /// The amount exceeds the balance it would be taken from.
    #[error("insufficient funds in {balance}: requested {requested}, available {available}")]
    InsufficientFunds {
        /// The balance the money would be taken from.
        balance: FundsSource,
        /// The amount that was requested.
        requested: Money,
        /// The amount that is available.
        available: Money,
    },

    /// A withdrawal without a goal would take money that is allocated to
    /// savings goals.
    #[error(
        "cannot withdraw ${requested} from general savings, only ${unallocated} is \
        unallocated. Select a specific goal to withdraw from or reduce the amount"
    )]
    AllocationConflict {
        /// The amount that was requested.
        requested: Money,
        /// The savings not allocated to any active goal.
        unallocated: Money,
    },

    /// The monthly allowance has already been added for the current month.
    #[error("allowance already processed for this month")]
    AllowanceAlreadyProcessed,

    /// The email address is already registered.
    #[error("the email \"{0}\" is already registered")]
    DuplicateEmail(String),

    /// An error occurred while getting the local timezone from a canonical
    /// timezone string.
    ///
    /// Its kind is [ErrorKind::Validation], but it comes from the configured
    /// timezone rather than from a user's request. Callers should report it
    /// as a configuration failure, not as bad user input.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// Could not acquire the database lock.
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl Error {
    /// The stable category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NonPositiveAmount(_)
            | Error::NegativeAmount(_)
            | Error::TooPrecise(_)
            | Error::AmountOutOfRange(_)
            | Error::InvalidAmount(_)
            | Error::InvalidDate(_)
            | Error::InvalidEnumValue { .. }
            | Error::EmptyField(_)
            | Error::InvalidEmail(_)
            | Error::InvalidTimezoneError(_)
            | Error::NoAllowanceSet => ErrorKind::Validation,
            Error::NotFound => ErrorKind::NotFound,
            Error::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Error::AllocationConflict { .. } => ErrorKind::AllocationConflict,
            Error::AllowanceAlreadyProcessed | Error::DuplicateEmail(_) => ErrorKind::Conflict,
            Error::DatabaseLockError | Error::SqlError(_) => ErrorKind::Store,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}
