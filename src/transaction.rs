//! The journal of income and expenses and the engine that keeps the current
//! balance in step with it.
//!
//! Every function that changes the journal applies the matching change to
//! the account's current balance inside the same database transaction, so the
//! balance always equals the signed sum of the journal.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row, params_from_iter,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, macros::format_description};

use crate::{
    Error, Money,
    account::apply_balance_delta,
    category::is_recommended,
    database_id::TransactionId,
    db::{begin_write_scope, get_timestamp},
    user::UserID,
};

// ============================================================================
// MODELS
// ============================================================================

/// Whether a journal entry adds to or takes from the current balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money earned, added to the current balance.
    Income,
    /// Money spent, taken from the current balance.
    Expense,
}

impl TransactionKind {
    /// The change to the current balance caused by an entry of this kind for
    /// `amount`.
    pub fn signed(&self, amount: Money) -> Money {
        match self {
            TransactionKind::Income => amount,
            TransactionKind::Expense => -amount,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(Error::InvalidEnumValue {
                field: "transaction kind",
                value: other.to_owned(),
            }),
        }
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

/// An expense or income, i.e. an event where money was either spent or earned.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The user the transaction belongs to.
    pub user_id: UserID,
    /// The amount of money spent or earned, always greater than zero.
    pub amount: Money,
    /// Whether the money was spent or earned.
    pub kind: TransactionKind,
    /// What the money was spent on or where it came from.
    pub category: String,
    /// A text description of what the transaction was for.
    pub description: String,
    /// When the transaction happened.
    pub date: Date,
    /// When the transaction was recorded.
    pub created_at: OffsetDateTime,
    /// When the transaction was last changed.
    pub updated_at: OffsetDateTime,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [NewTransaction] for discoverability.
    pub fn build(amount: Money, kind: TransactionKind, category: &str, date: Date) -> NewTransaction {
        NewTransaction {
            amount,
            kind,
            category: category.to_owned(),
            description: String::new(),
            date,
        }
    }

    /// The change this transaction made to the current balance.
    pub fn balance_effect(&self) -> Money {
        self.kind.signed(self.amount)
    }
}

/// The fields of a transaction that is about to be created, or that will
/// replace an existing transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    /// The amount of money, must be greater than zero.
    pub amount: Money,
    /// Whether the money was spent or earned.
    pub kind: TransactionKind,
    /// The category, must not be blank.
    pub category: String,
    /// A text description of what the transaction was for.
    pub description: String,
    /// When the transaction happened.
    pub date: Date,
}

impl NewTransaction {
    /// Set the description for the transaction.
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }

    fn validate(mut self) -> Result<Self, Error> {
        validate_amount(self.amount)?;
        self.category = validate_category(&self.category, self.kind)?;

        Ok(self)
    }
}

/// A partial update to a transaction. Fields that are `None` keep their
/// current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionPatch {
    /// The new amount, must be greater than zero.
    pub amount: Option<Money>,
    /// The new kind.
    pub kind: Option<TransactionKind>,
    /// The new category, must not be blank.
    pub category: Option<String>,
    /// The new description.
    pub description: Option<String>,
    /// The new date.
    pub date: Option<Date>,
}

impl TransactionPatch {
    /// Whether applying the patch can change the current balance.
    fn changes_balance(&self) -> bool {
        self.amount.is_some() || self.kind.is_some()
    }

    fn apply_to(self, transaction: &Transaction) -> Result<NewTransaction, Error> {
        let kind = self.kind.unwrap_or(transaction.kind);

        let category = match self.category {
            Some(category) => validate_category(&category, kind)?,
            None => transaction.category.clone(),
        };

        let amount = match self.amount {
            Some(amount) => validate_amount(amount)?,
            None => transaction.amount,
        };

        Ok(NewTransaction {
            amount,
            kind,
            category,
            description: self
                .description
                .unwrap_or_else(|| transaction.description.clone()),
            date: self.date.unwrap_or(transaction.date),
        })
    }
}

/// Defines how transactions should be fetched from [query_transactions].
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionQuery {
    /// Only include transactions in this category.
    pub category: Option<String>,
    /// Only include transactions of this kind.
    pub kind: Option<TransactionKind>,
    /// Selects up to the first N (`limit`) transactions.
    pub limit: u64,
    /// Skip the first N transactions.
    pub offset: u64,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            category: None,
            kind: None,
            limit: 5,
            offset: 0,
        }
    }
}

/// Parse a calendar date in the format `YYYY-MM-DD`.
///
/// # Errors
/// Returns an [Error::InvalidDate] if `text` is not a valid date.
pub fn parse_date(text: &str) -> Result<Date, Error> {
    Date::parse(text.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| Error::InvalidDate(text.to_owned()))
}

fn validate_amount(amount: Money) -> Result<Money, Error> {
    if !amount.is_positive() {
        return Err(Error::NonPositiveAmount(amount));
    }

    Ok(amount)
}

fn validate_category(category: &str, kind: TransactionKind) -> Result<String, Error> {
    let category = category.trim();

    if category.is_empty() {
        return Err(Error::EmptyField("category"));
    }

    if !is_recommended(category, kind) {
        tracing::debug!("\"{category}\" is not a recommended {kind} category");
    }

    Ok(category.to_owned())
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                amount INTEGER NOT NULL CHECK (amount > 0),
                kind TEXT NOT NULL CHECK (kind IN ('income', 'expense')),
                category TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                date TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_user_date ON \"transaction\"(user_id, date);",
        (),
    )?;

    // Used for the monthly allowance lookup.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_user_category_created
         ON \"transaction\"(user_id, category, created_at);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        amount: row.get(2)?,
        kind: row.get(3)?,
        category: row.get(4)?,
        description: row.get(5)?,
        date: row.get(6)?,
        created_at: get_timestamp(row, 7)?,
        updated_at: get_timestamp(row, 8)?,
    })
}

const SELECT_COLUMNS: &str =
    "id, user_id, amount, kind, category, description, date, created_at, updated_at";

/// Insert a validated journal entry without touching the balance.
///
/// Callers must apply [Transaction::balance_effect] in the same scope.
pub(crate) fn insert_journal_entry(
    user_id: UserID,
    new: &NewTransaction,
    created_at: OffsetDateTime,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!(
            "INSERT INTO \"transaction\" (user_id, amount, kind, category, description, date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             RETURNING {SELECT_COLUMNS}"
        ))?
        .query_row(
            (
                user_id.as_i64(),
                new.amount,
                new.kind,
                &new.category,
                &new.description,
                new.date,
                created_at.unix_timestamp(),
            ),
            map_transaction_row,
        )
        .map_err(|error| match error {
            // The user does not exist.
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::NotFound,
            error => error.into(),
        })?;

    Ok(transaction)
}

/// Record a new income or expense and apply it to the current balance.
///
/// # Errors
/// This function will return a:
/// - [Error::NonPositiveAmount] if the amount is not greater than zero,
/// - [Error::EmptyField] if the category is blank,
/// - [Error::AmountOutOfRange] if the new balance would be too large to store,
/// - [Error::NotFound] if the user has no account,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    user_id: UserID,
    new: NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let new = new.validate()?;
    let now = OffsetDateTime::now_utc();

    let scope = begin_write_scope(connection)?;
    let transaction = insert_journal_entry(user_id, &new, now, &scope)?;
    apply_balance_delta(user_id, transaction.balance_effect(), now, &scope)?;
    scope.commit()?;

    tracing::info!(
        "Created {} transaction {} of {} for user {user_id}",
        transaction.kind,
        transaction.id,
        transaction.amount
    );

    Ok(transaction)
}

/// Retrieve a transaction from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a transaction owned by `user_id`,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction(
    id: TransactionId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM \"transaction\" WHERE id = :id AND user_id = :user_id"
        ))?
        .query_row(
            &[(":id", &id), (":user_id", &user_id.as_i64())],
            map_transaction_row,
        )?;

    Ok(transaction)
}

fn update_journal_entry(
    id: TransactionId,
    user_id: UserID,
    new: &NewTransaction,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(&format!(
            "UPDATE \"transaction\"
             SET amount = ?1, kind = ?2, category = ?3, description = ?4, date = ?5, updated_at = ?6
             WHERE id = ?7 AND user_id = ?8
             RETURNING {SELECT_COLUMNS}"
        ))?
        .query_row(
            (
                new.amount,
                new.kind,
                &new.category,
                &new.description,
                new.date,
                now.unix_timestamp(),
                id,
                user_id.as_i64(),
            ),
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Replace every field of a transaction and move the current balance from the
/// old entry's effect to the new one's in a single update.
///
/// # Errors
/// This function will return a:
/// - [Error::NonPositiveAmount] if the amount is not greater than zero,
/// - [Error::EmptyField] if the category is blank,
/// - [Error::AmountOutOfRange] if the new balance would be too large to store,
/// - [Error::NotFound] if `id` does not refer to a transaction owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn replace_transaction(
    id: TransactionId,
    user_id: UserID,
    new: NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let new = new.validate()?;
    let now = OffsetDateTime::now_utc();

    let scope = begin_write_scope(connection)?;
    let old = get_transaction(id, user_id, &scope)?;
    let transaction = update_journal_entry(id, user_id, &new, now, &scope)?;
    let delta = transaction.balance_effect() - old.balance_effect();
    apply_balance_delta(user_id, delta, now, &scope)?;
    scope.commit()?;

    tracing::info!("Replaced transaction {id} for user {user_id}, balance changed by {delta}");

    Ok(transaction)
}

/// Change some fields of a transaction.
///
/// The current balance is only recomputed when the patch includes the amount
/// or the kind; other fields have no effect on the balance.
///
/// # Errors
/// This function will return a:
/// - [Error::NonPositiveAmount] if the new amount is not greater than zero,
/// - [Error::EmptyField] if the new category is blank,
/// - [Error::AmountOutOfRange] if the new balance would be too large to store,
/// - [Error::NotFound] if `id` does not refer to a transaction owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn patch_transaction(
    id: TransactionId,
    user_id: UserID,
    patch: TransactionPatch,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let now = OffsetDateTime::now_utc();
    let changes_balance = patch.changes_balance();

    let scope = begin_write_scope(connection)?;
    let old = get_transaction(id, user_id, &scope)?;
    let new = patch.apply_to(&old)?;
    let transaction = update_journal_entry(id, user_id, &new, now, &scope)?;

    if changes_balance {
        let delta = transaction.balance_effect() - old.balance_effect();
        apply_balance_delta(user_id, delta, now, &scope)?;
        tracing::debug!("Patching transaction {id} changed the balance by {delta}");
    }

    scope.commit()?;

    tracing::info!("Patched transaction {id} for user {user_id}");

    Ok(transaction)
}

/// Delete a transaction and reverse its effect on the current balance.
///
/// Returns the deleted transaction.
///
/// # Errors
/// This function will return a:
/// - [Error::AmountOutOfRange] if the new balance would be too large to store,
/// - [Error::NotFound] if `id` does not refer to a transaction owned by `user_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn delete_transaction(
    id: TransactionId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let now = OffsetDateTime::now_utc();

    let scope = begin_write_scope(connection)?;
    let transaction = get_transaction(id, user_id, &scope)?;
    scope.execute(
        "DELETE FROM \"transaction\" WHERE id = ?1 AND user_id = ?2",
        (id, user_id.as_i64()),
    )?;
    apply_balance_delta(user_id, -transaction.balance_effect(), now, &scope)?;
    scope.commit()?;

    tracing::info!("Deleted transaction {id} for user {user_id}");

    Ok(transaction)
}

/// Retrieve a user's transactions, newest first, in the way defined by `query`.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn query_transactions(
    user_id: UserID,
    query: &TransactionQuery,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let mut query_string =
        format!("SELECT {SELECT_COLUMNS} FROM \"transaction\" WHERE user_id = ?1");
    let mut query_parameters = vec![Value::Integer(user_id.as_i64())];

    if let Some(category) = &query.category {
        query_parameters.push(Value::Text(category.clone()));
        query_string.push_str(&format!(" AND category = ?{}", query_parameters.len()));
    }

    if let Some(kind) = query.kind {
        query_parameters.push(Value::Text(kind.to_string()));
        query_string.push_str(&format!(" AND kind = ?{}", query_parameters.len()));
    }

    query_string.push_str(" ORDER BY date DESC, created_at DESC, id DESC");

    query_parameters.push(Value::Integer(i64::try_from(query.limit).unwrap_or(i64::MAX)));
    query_string.push_str(&format!(" LIMIT ?{}", query_parameters.len()));
    query_parameters.push(Value::Integer(i64::try_from(query.offset).unwrap_or(i64::MAX)));
    query_string.push_str(&format!(" OFFSET ?{}", query_parameters.len()));

    connection
        .prepare(&query_string)?
        .query_map(params_from_iter(query_parameters), map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod parse_date_tests {
    use time::macros::date;

    use crate::Error;

    use super::parse_date;

    #[test]
    fn parses_iso_date() {
        assert_eq!(parse_date("2025-10-05"), Ok(date!(2025 - 10 - 05)));
    }

    #[test]
    fn rejects_other_formats() {
        assert_eq!(
            parse_date("05/10/2025"),
            Err(Error::InvalidDate("05/10/2025".to_owned()))
        );
        assert_eq!(
            parse_date("2025-02-30"),
            Err(Error::InvalidDate("2025-02-30".to_owned()))
        );
    }
}

#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::{
        Error, Money,
        account::get_account,
        db::initialize,
        user::{UserID, register_user},
    };

    use super::{
        Transaction, TransactionKind, TransactionPatch, TransactionQuery, create_transaction,
        delete_transaction, get_transaction, patch_transaction, query_transactions,
        replace_transaction,
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

    fn balance(user_id: UserID, conn: &Connection) -> Money {
        get_account(user_id, conn).unwrap().balance
    }

    fn income(amount: rust_decimal::Decimal) -> super::NewTransaction {
        Transaction::build(
            money(amount),
            TransactionKind::Income,
            "Part-time Job",
            date!(2025 - 10 - 01),
        )
    }

    fn expense(amount: rust_decimal::Decimal) -> super::NewTransaction {
        Transaction::build(
            money(amount),
            TransactionKind::Expense,
            "Food & Dining",
            date!(2025 - 10 - 02),
        )
    }

    #[test]
    fn create_income_increases_balance() {
        let (conn, user_id) = get_test_connection();

        let transaction =
            create_transaction(user_id, income(dec!(100)).description("Pay day"), &conn).unwrap();

        assert_eq!(transaction.amount, money(dec!(100)));
        assert_eq!(transaction.description, "Pay day");
        assert_eq!(transaction.user_id, user_id);
        assert_eq!(balance(user_id, &conn), money(dec!(100)));
    }

    #[test]
    fn create_expense_decreases_balance() {
        let (conn, user_id) = get_test_connection();
        create_transaction(user_id, income(dec!(100)), &conn).unwrap();

        create_transaction(user_id, expense(dec!(25)), &conn).unwrap();

        assert_eq!(balance(user_id, &conn), money(dec!(75)));
    }

    #[test]
    fn create_fails_on_non_positive_amount() {
        let (conn, user_id) = get_test_connection();

        let result = create_transaction(user_id, income(dec!(0)), &conn);

        assert_eq!(result, Err(Error::NonPositiveAmount(Money::zero())));
        assert_eq!(balance(user_id, &conn), Money::zero());
    }

    #[test]
    fn create_fails_on_blank_category() {
        let (conn, user_id) = get_test_connection();
        let mut new = income(dec!(10));
        new.category = "   ".to_owned();

        let result = create_transaction(user_id, new, &conn);

        assert_eq!(result, Err(Error::EmptyField("category")));
    }

    #[test]
    fn create_accepts_unrecommended_category() {
        let (conn, user_id) = get_test_connection();
        let mut new = expense(dec!(3.50));
        new.category = "  Coffee ".to_owned();

        let transaction = create_transaction(user_id, new, &conn).unwrap();

        assert_eq!(transaction.category, "Coffee");
    }

    #[test]
    fn create_fails_for_unknown_user() {
        let (conn, _) = get_test_connection();

        let result = create_transaction(UserID::new(999), income(dec!(10)), &conn);

        assert_eq!(result, Err(Error::NotFound));
        assert!(conn.is_autocommit(), "the scope should have been rolled back");
    }

    #[test]
    fn create_then_delete_restores_balance_exactly() {
        let (conn, user_id) = get_test_connection();
        create_transaction(user_id, income(dec!(100.10)), &conn).unwrap();
        let before = balance(user_id, &conn);

        let transaction = create_transaction(user_id, expense(dec!(33.33)), &conn).unwrap();
        let deleted = delete_transaction(transaction.id, user_id, &conn).unwrap();

        assert_eq!(deleted, transaction);
        assert_eq!(balance(user_id, &conn), before);
        assert_eq!(
            get_transaction(transaction.id, user_id, &conn),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn income_that_would_overflow_balance_is_rejected() {
        let (conn, user_id) = get_test_connection();
        let large = Money::from_cents(i64::MAX / 2 + 10);
        let large_income = || {
            Transaction::build(large, TransactionKind::Income, "Gift Money", date!(2025 - 10 - 01))
        };
        create_transaction(user_id, large_income(), &conn).unwrap();

        let result = create_transaction(user_id, large_income(), &conn);

        assert!(matches!(result, Err(Error::AmountOutOfRange(_))));
        assert_eq!(balance(user_id, &conn), large);
        let entries = query_transactions(user_id, &TransactionQuery::default(), &conn).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn delete_income_reduces_balance() {
        let (conn, user_id) = get_test_connection();
        let transaction = create_transaction(user_id, income(dec!(80)), &conn).unwrap();

        delete_transaction(transaction.id, user_id, &conn).unwrap();

        assert_eq!(balance(user_id, &conn), Money::zero());
    }

    #[test]
    fn patching_amount_reapplies_from_original_balance() {
        let (conn, user_id) = get_test_connection();
        create_transaction(user_id, income(dec!(100)), &conn).unwrap();
        let transaction = create_transaction(user_id, expense(dec!(25)), &conn).unwrap();
        assert_eq!(balance(user_id, &conn), money(dec!(75)));

        let patched = patch_transaction(
            transaction.id,
            user_id,
            TransactionPatch {
                amount: Some(money(dec!(40))),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();

        assert_eq!(patched.amount, money(dec!(40)));
        assert_eq!(patched.kind, TransactionKind::Expense);
        assert_eq!(balance(user_id, &conn), money(dec!(60)));
    }

    #[test]
    fn patching_kind_flips_the_effect() {
        let (conn, user_id) = get_test_connection();
        let transaction = create_transaction(user_id, expense(dec!(20)), &conn).unwrap();
        assert_eq!(balance(user_id, &conn), money(dec!(-20)));

        patch_transaction(
            transaction.id,
            user_id,
            TransactionPatch {
                kind: Some(TransactionKind::Income),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();

        assert_eq!(balance(user_id, &conn), money(dec!(20)));
    }

    #[test]
    fn patching_other_fields_keeps_balance() {
        let (conn, user_id) = get_test_connection();
        let transaction = create_transaction(user_id, expense(dec!(12.5)), &conn).unwrap();

        let patched = patch_transaction(
            transaction.id,
            user_id,
            TransactionPatch {
                category: Some("Entertainment".to_owned()),
                description: Some("Cinema".to_owned()),
                date: Some(date!(2025 - 09 - 30)),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();

        assert_eq!(patched.category, "Entertainment");
        assert_eq!(patched.description, "Cinema");
        assert_eq!(patched.date, date!(2025 - 09 - 30));
        assert_eq!(patched.amount, transaction.amount);
        assert_eq!(balance(user_id, &conn), money(dec!(-12.5)));
    }

    #[test]
    fn patch_rejects_non_positive_amount() {
        let (conn, user_id) = get_test_connection();
        let transaction = create_transaction(user_id, expense(dec!(12.5)), &conn).unwrap();

        let result = patch_transaction(
            transaction.id,
            user_id,
            TransactionPatch {
                amount: Some(money(dec!(-1))),
                ..Default::default()
            },
            &conn,
        );

        assert_eq!(result, Err(Error::NonPositiveAmount(money(dec!(-1)))));
        assert_eq!(
            get_transaction(transaction.id, user_id, &conn).unwrap(),
            transaction
        );
        assert!(conn.is_autocommit());
    }

    #[test]
    fn replace_applies_single_net_delta() {
        let (conn, user_id) = get_test_connection();
        create_transaction(user_id, income(dec!(100)), &conn).unwrap();
        let transaction = create_transaction(user_id, expense(dec!(25)), &conn).unwrap();

        let replaced = replace_transaction(
            transaction.id,
            user_id,
            income(dec!(10)).description("Refund"),
            &conn,
        )
        .unwrap();

        assert_eq!(replaced.id, transaction.id);
        assert_eq!(replaced.kind, TransactionKind::Income);
        assert_eq!(replaced.description, "Refund");
        assert_eq!(balance(user_id, &conn), money(dec!(110)));
    }

    #[test]
    fn other_users_cannot_see_or_change_transactions() {
        let (conn, user_id) = get_test_connection();
        let other = register_user("other@test.com", "Other", &conn).unwrap();
        let transaction = create_transaction(user_id, income(dec!(50)), &conn).unwrap();

        assert_eq!(
            get_transaction(transaction.id, other.id, &conn),
            Err(Error::NotFound)
        );
        assert_eq!(
            replace_transaction(transaction.id, other.id, income(dec!(1)), &conn),
            Err(Error::NotFound)
        );
        assert_eq!(
            patch_transaction(transaction.id, other.id, TransactionPatch::default(), &conn),
            Err(Error::NotFound)
        );
        assert_eq!(
            delete_transaction(transaction.id, other.id, &conn),
            Err(Error::NotFound)
        );
        assert_eq!(balance(user_id, &conn), money(dec!(50)));
        assert_eq!(balance(other.id, &conn), Money::zero());
    }

    #[test]
    fn query_filters_and_pages_newest_first() {
        let (conn, user_id) = get_test_connection();
        let first = create_transaction(user_id, income(dec!(100)), &conn).unwrap();
        let second = create_transaction(user_id, expense(dec!(1)), &conn).unwrap();
        let third = create_transaction(user_id, expense(dec!(2)), &conn).unwrap();

        let all = query_transactions(user_id, &TransactionQuery::default(), &conn).unwrap();
        let expenses = query_transactions(
            user_id,
            &TransactionQuery {
                kind: Some(TransactionKind::Expense),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();
        let by_category = query_transactions(
            user_id,
            &TransactionQuery {
                category: Some("Part-time Job".to_owned()),
                ..Default::default()
            },
            &conn,
        )
        .unwrap();
        let second_page = query_transactions(
            user_id,
            &TransactionQuery {
                limit: 1,
                offset: 1,
                ..Default::default()
            },
            &conn,
        )
        .unwrap();

        assert_eq!(all, vec![third.clone(), second.clone(), first.clone()]);
        assert_eq!(expenses, vec![third.clone(), second]);
        assert_eq!(by_category, vec![first]);
        assert_eq!(second_page.len(), 1);
    }

    #[test]
    fn query_default_limit_is_five() {
        let (conn, user_id) = get_test_connection();
        for _ in 0..7 {
            create_transaction(user_id, income(dec!(1)), &conn).unwrap();
        }

        let got = query_transactions(user_id, &TransactionQuery::default(), &conn).unwrap();

        assert_eq!(got.len(), 5);
    }
}
