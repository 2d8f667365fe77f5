//! The recommended categories for a student's income and expenses.
//!
//! Categories are free text. The lists here are suggestions for clients and
//! are not enforced.

use crate::transaction::TransactionKind;

/// Suggested categories for expenses.
pub const RECOMMENDED_EXPENSE_CATEGORIES: [&str; 8] = [
    "Food & Dining",
    "Transportation",
    "Books & Supplies",
    "Entertainment",
    "Clothing",
    "Health & Fitness",
    "Technology",
    "Miscellaneous",
];

/// Suggested categories for income.
pub const RECOMMENDED_INCOME_CATEGORIES: [&str; 5] = [
    "Allowance",
    "Part-time Job",
    "Scholarship",
    "Gift Money",
    "Other Income",
];

/// Whether `category` is one of the suggested categories for `kind`.
pub fn is_recommended(category: &str, kind: TransactionKind) -> bool {
    let recommended: &[&str] = match kind {
        TransactionKind::Income => &RECOMMENDED_INCOME_CATEGORIES,
        TransactionKind::Expense => &RECOMMENDED_EXPENSE_CATEGORIES,
    };

    recommended.contains(&category)
}
