use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rust_decimal_macros::dec;
use time::{Duration, OffsetDateTime};

use student_ledger::{
    GoalDetails, Ledger, LedgerConfig, Money, Transaction, TransactionKind, TransferDirection,
    TransferRequest,
};

/// A utility for creating a test database for the student ledger.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let ledger = Ledger::open(&LedgerConfig::new(output_path))?;

    println!("Creating test user...");
    let user = ledger.register_user("test@test.com", "Test Student")?;
    ledger.set_allowance_income(user.id, Money::new(dec!(250))?)?;

    println!("Adding transactions...");
    let today = OffsetDateTime::now_utc().date();
    let transactions = [
        (dec!(320), TransactionKind::Income, "Part-time Job", "Cafe shifts"),
        (dec!(42.80), TransactionKind::Expense, "Food & Dining", "Groceries"),
        (dec!(65), TransactionKind::Expense, "Books & Supplies", "Textbook"),
        (dec!(18.50), TransactionKind::Expense, "Transportation", "Bus card top up"),
        (dec!(50), TransactionKind::Income, "Gift Money", "Birthday"),
    ];

    for (days_ago, (amount, kind, category, description)) in transactions.into_iter().enumerate() {
        let date = today - Duration::days(days_ago as i64);
        ledger.create_transaction(
            user.id,
            Transaction::build(Money::new(amount)?, kind, category, date).description(description),
        )?;
    }

    ledger.process_auto_allowance(user.id)?;

    println!("Adding savings goals...");
    let laptop = ledger.create_savings_goal(
        user.id,
        GoalDetails {
            name: "New laptop".to_owned(),
            target_amount: Money::new(dec!(1200))?,
            deadline: Some(today + Duration::days(180)),
            description: "For next semester".to_owned(),
        },
    )?;
    ledger.create_savings_goal(
        user.id,
        GoalDetails {
            name: "Emergency fund".to_owned(),
            target_amount: Money::new(dec!(500))?,
            deadline: None,
            description: String::new(),
        },
    )?;

    for (amount, goal_id) in [(dec!(150), Some(laptop.id)), (dec!(40), None)] {
        ledger.transfer(
            user.id,
            TransferRequest {
                amount: Money::new(amount)?,
                direction: TransferDirection::ToSavings,
                goal_id,
                description: None,
            },
        )?;
    }

    let report = ledger.check_consistency(user.id)?;
    if !report.is_consistent() {
        eprintln!("Seeded balances are inconsistent: {report:?}");
        exit(1);
    }

    println!("Success!");

    Ok(())
}
