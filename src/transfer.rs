//! Moves money between the current balance and the savings balance.
//!
//! A transfer reads both balances, checks the request against them and the
//! goal allocations, then writes the new balances and one savings ledger
//! entry. All of this happens inside one write scope, so two transfers for
//! the same user can never both pass their checks against the same stale
//! balance.

use std::{fmt::Display, str::FromStr};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error, FundsSource, Money,
    account::set_balances,
    balances::{Balances, allocated_savings, current_balances, goal_current_amount},
    database_id::SavingsGoalId,
    db::begin_write_scope,
    savings_transaction::{
        NewSavingsTransaction, SavingsKind, SavingsTransaction, insert_savings_transaction,
    },
    user::UserID,
};

/// The description used for deposits when the caller does not give one.
const DEFAULT_DEPOSIT_DESCRIPTION: &str = "Transfer from current balance";
/// The description used for withdrawals when the caller does not give one.
const DEFAULT_WITHDRAWAL_DESCRIPTION: &str = "Transfer to current balance";

/// Which way a transfer moves money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// From the current balance into savings.
    ToSavings,
    /// From savings back into the current balance.
    FromSavings,
}

impl TransferDirection {
    fn savings_kind(&self) -> SavingsKind {
        match self {
            TransferDirection::ToSavings => SavingsKind::Deposit,
            TransferDirection::FromSavings => SavingsKind::Withdrawal,
        }
    }

    fn default_description(&self) -> &'static str {
        match self {
            TransferDirection::ToSavings => DEFAULT_DEPOSIT_DESCRIPTION,
            TransferDirection::FromSavings => DEFAULT_WITHDRAWAL_DESCRIPTION,
        }
    }
}

impl Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferDirection::ToSavings => f.write_str("to_savings"),
            TransferDirection::FromSavings => f.write_str("from_savings"),
        }
    }
}

impl FromStr for TransferDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to_savings" => Ok(TransferDirection::ToSavings),
            "from_savings" => Ok(TransferDirection::FromSavings),
            other => Err(Error::InvalidEnumValue {
                field: "transfer direction",
                value: other.to_owned(),
            }),
        }
    }
}

/// A request to move money between the current and savings balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// How much to move, must be greater than zero.
    pub amount: Money,
    /// Which way to move the money.
    pub direction: TransferDirection,
    /// The goal to earmark the deposit for, or to take the withdrawal from.
    ///
    /// Without a goal a deposit goes to general savings and a withdrawal
    /// may only use unallocated savings.
    pub goal_id: Option<SavingsGoalId>,
    /// A text description of the transfer. A default is used when this is
    /// `None` or blank.
    pub description: Option<String>,
}

/// The outcome of a successful transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// The savings ledger entry that records the transfer.
    pub savings_transaction: SavingsTransaction,
    /// The current balance after the transfer.
    pub balance: Money,
    /// The savings balance after the transfer.
    pub savings_balance: Money,
}

/// Move money between the current balance and the savings balance of
/// `user_id`, dating the ledger entry on the day of `now`.
///
/// # Errors
/// This function will return a:
/// - [Error::NonPositiveAmount] if the amount is not greater than zero,
/// - [Error::InsufficientFunds] if the amount is more than the current balance
///   (to savings), the savings balance or the named goal's current amount
///   (from savings),
/// - [Error::AllocationConflict] if a withdrawal without a goal would use
///   money allocated to active goals,
/// - [Error::AmountOutOfRange] if the receiving balance would be too large to store,
/// - [Error::NotFound] if the user has no account, or the named goal is
///   missing, inactive or owned by another user,
/// - or [Error::SqlError] if there is some other SQL error.
///
/// Nothing is written when an error is returned.
pub fn transfer(
    user_id: UserID,
    request: TransferRequest,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<TransferReceipt, Error> {
    let TransferRequest {
        amount,
        direction,
        goal_id,
        description,
    } = request;

    if !amount.is_positive() {
        return Err(Error::NonPositiveAmount(amount));
    }

    let scope = begin_write_scope(connection)?;
    let balances = current_balances(user_id, &scope)?;

    let new_balances = match direction {
        TransferDirection::ToSavings => check_deposit(user_id, amount, goal_id, &balances, &scope)?,
        TransferDirection::FromSavings => {
            check_withdrawal(user_id, amount, goal_id, &balances, &scope)?
        }
    };

    let description = description
        .as_deref()
        .map(str::trim)
        .filter(|description| !description.is_empty())
        .unwrap_or(direction.default_description());

    let savings_transaction = insert_savings_transaction(
        user_id,
        &NewSavingsTransaction {
            goal_id,
            amount,
            kind: direction.savings_kind(),
            description,
            date: now.date(),
        },
        now,
        &scope,
    )?;
    set_balances(user_id, &new_balances, now, &scope)?;
    scope.commit()?;

    tracing::info!(
        "Transferred {amount} {direction} for user {user_id}: balance {}, savings {}",
        new_balances.balance,
        new_balances.savings_balance
    );

    Ok(TransferReceipt {
        savings_transaction,
        balance: new_balances.balance,
        savings_balance: new_balances.savings_balance,
    })
}

fn check_deposit(
    user_id: UserID,
    amount: Money,
    goal_id: Option<SavingsGoalId>,
    balances: &Balances,
    connection: &Connection,
) -> Result<Balances, Error> {
    if amount > balances.balance {
        tracing::warn!(
            "Rejected transfer of {amount} to savings for user {user_id}: balance is {}",
            balances.balance
        );
        return Err(Error::InsufficientFunds {
            balance: FundsSource::CurrentBalance,
            requested: amount,
            available: balances.balance,
        });
    }

    if let Some(goal_id) = goal_id {
        ensure_active_goal(goal_id, user_id, connection)?;
    }

    Ok(Balances {
        balance: balances.balance - amount,
        savings_balance: balances.savings_balance.checked_add(amount)?,
    })
}

fn check_withdrawal(
    user_id: UserID,
    amount: Money,
    goal_id: Option<SavingsGoalId>,
    balances: &Balances,
    connection: &Connection,
) -> Result<Balances, Error> {
    if amount > balances.savings_balance {
        tracing::warn!(
            "Rejected transfer of {amount} from savings for user {user_id}: savings balance is {}",
            balances.savings_balance
        );
        return Err(Error::InsufficientFunds {
            balance: FundsSource::SavingsBalance,
            requested: amount,
            available: balances.savings_balance,
        });
    }

    match goal_id {
        None => {
            let allocated = allocated_savings(user_id, connection)?;
            let unallocated = balances.savings_balance - allocated;

            if allocated.is_positive() && amount > unallocated {
                tracing::warn!(
                    "Rejected transfer of {amount} from general savings for user {user_id}: \
                    only {unallocated} is unallocated"
                );
                return Err(Error::AllocationConflict {
                    requested: amount,
                    unallocated,
                });
            }
        }
        Some(goal_id) => {
            ensure_active_goal(goal_id, user_id, connection)?;
            let current_amount = goal_current_amount(goal_id, user_id, connection)?;

            if amount > current_amount {
                tracing::warn!(
                    "Rejected transfer of {amount} from goal {goal_id} for user {user_id}: \
                    goal has {current_amount}"
                );
                return Err(Error::InsufficientFunds {
                    balance: FundsSource::SavingsGoal(goal_id),
                    requested: amount,
                    available: current_amount,
                });
            }
        }
    }

    Ok(Balances {
        balance: balances.balance.checked_add(amount)?,
        savings_balance: balances.savings_balance - amount,
    })
}

/// Missing, foreign and inactive goals are all reported as [Error::NotFound].
fn ensure_active_goal(
    goal_id: SavingsGoalId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let is_active: bool = connection
        .prepare("SELECT is_active FROM savings_goal WHERE id = :id AND user_id = :user_id")?
        .query_row(&[(":id", &goal_id), (":user_id", &user_id.as_i64())], |row| {
            row.get(0)
        })?;

    if !is_active {
        return Err(Error::NotFound);
    }

    Ok(())
}
