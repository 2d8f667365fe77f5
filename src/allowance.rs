//! Credits a user's monthly allowance to their current balance, at most once
//! per calendar month.
//!
//! Nothing here runs on a timer. Callers invoke [process_auto_allowance]
//! whenever they like and the month check makes repeated calls harmless.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime};
use time_tz::{OffsetDateTimeExt, PrimitiveDateTimeExt, Tz};

use crate::{
    Error, Money,
    account::{apply_balance_delta, get_account},
    db::begin_write_scope,
    transaction::{Transaction, TransactionKind, insert_journal_entry},
    user::UserID,
};

/// The category of the journal entries created by the monthly allowance.
pub const ALLOWANCE_CATEGORY: &str = "Allowance";

/// The description of the journal entries created by the monthly allowance.
pub const ALLOWANCE_DESCRIPTION: &str = "Monthly allowance - auto-added";

/// The outcome of a successful allowance credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowanceReceipt {
    /// The income entry that was added to the journal.
    pub transaction: Transaction,
    /// The amount credited.
    pub amount: Money,
    /// The current balance after the credit.
    pub balance: Money,
}

/// Add the configured allowance of `user_id` as income, unless an allowance
/// income was already recorded in the calendar month of `now`.
///
/// The month is the calendar month of `now` in `timezone`, with each end of
/// the month resolved using the offset in effect at that moment. The new
/// entry is dated on the local day of `now`.
///
/// # Errors
/// This function will return a:
/// - [Error::NoAllowanceSet] if the user's allowance is zero,
/// - [Error::AllowanceAlreadyProcessed] if the allowance was already added this month,
/// - [Error::AmountOutOfRange] if the new balance would be too large to store,
/// - [Error::NotFound] if the user has no account,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn process_auto_allowance(
    user_id: UserID,
    now: OffsetDateTime,
    timezone: &Tz,
    connection: &Connection,
) -> Result<AllowanceReceipt, Error> {
    let now = now.to_timezone(timezone);
    let (month_start, next_month_start) = month_bounds(now, timezone)?;

    let scope = begin_write_scope(connection)?;
    let account = get_account(user_id, &scope)?;
    let amount = account.allowance_income;

    if !amount.is_positive() {
        return Err(Error::NoAllowanceSet);
    }

    let already_processed: bool = scope.query_row(
        "SELECT EXISTS (
            SELECT 1 FROM \"transaction\"
            WHERE user_id = ?1 AND kind = 'income' AND category = ?2
                AND created_at >= ?3 AND created_at < ?4
        )",
        (
            user_id.as_i64(),
            ALLOWANCE_CATEGORY,
            month_start.unix_timestamp(),
            next_month_start.unix_timestamp(),
        ),
        |row| row.get(0),
    )?;

    if already_processed {
        tracing::warn!("Allowance for user {user_id} was already processed this month");
        return Err(Error::AllowanceAlreadyProcessed);
    }

    let new = Transaction::build(
        amount,
        TransactionKind::Income,
        ALLOWANCE_CATEGORY,
        now.date(),
    )
    .description(ALLOWANCE_DESCRIPTION);
    let transaction = insert_journal_entry(user_id, &new, now, &scope)?;
    let balance = apply_balance_delta(user_id, amount, now, &scope)?;
    scope.commit()?;

    tracing::info!("Added allowance of {amount} for user {user_id}, balance is now {balance}");

    Ok(AllowanceReceipt {
        transaction,
        amount,
        balance,
    })
}

/// The start of the local month of `now` and the start of the following
/// month in `timezone`.
fn month_bounds(
    now: OffsetDateTime,
    timezone: &Tz,
) -> Result<(OffsetDateTime, OffsetDateTime), Error> {
    let invalid = |_| Error::InvalidDate(now.to_string());

    let first_day = Date::from_calendar_date(now.year(), now.month(), 1).map_err(invalid)?;
    let next_first_day = match now.month() {
        Month::December => Date::from_calendar_date(now.year() + 1, Month::January, 1),
        month => Date::from_calendar_date(now.year(), month.next(), 1),
    }
    .map_err(invalid)?;

    Ok((
        start_of_day(first_day, timezone),
        start_of_day(next_first_day, timezone),
    ))
}

/// The first instant of `date` in `timezone`.
///
/// Where the clocks skip midnight, the offset in effect at midnight UTC on
/// that date is used instead.
fn start_of_day(date: Date, timezone: &Tz) -> OffsetDateTime {
    let midnight = date.midnight();

    midnight
        .assume_timezone(timezone)
        .take_first()
        .unwrap_or_else(|| midnight.assume_timezone_utc(timezone))
}
