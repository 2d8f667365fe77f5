//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;

/// The ID of a journal entry (income or expense).
pub type TransactionId = DatabaseId;

/// The ID of a savings goal.
pub type SavingsGoalId = DatabaseId;

/// The ID of an entry in the savings ledger.
pub type SavingsTransactionId = DatabaseId;
