use std::{path::PathBuf, process::exit, time::Duration};

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use time::Date;

use student_ledger::{
    DEFAULT_TIMEZONE, Error, GoalDetails, Ledger, LedgerConfig, Money, SavingsGoalId,
    Transaction, TransactionId, TransactionKind, TransactionPatch, TransactionQuery,
    TransferDirection, TransferRequest, UserID, local_now, parse_date, setup_logging,
};

/// An administrative tool for the student ledger.
///
/// Results are printed to stdout as JSON, logs are written to stderr.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long, env = "LEDGER_DB_PATH")]
    db_path: PathBuf,

    /// The canonical timezone used to decide the current day and month,
    /// e.g. "Pacific/Auckland".
    #[arg(long, env = "LEDGER_TIMEZONE", default_value = DEFAULT_TIMEZONE)]
    timezone: String,

    /// How long to wait for another writer, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    busy_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database tables.
    Init,
    /// Register a user and create their account.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },
    /// Show a user's account.
    Account {
        #[arg(long)]
        user: i64,
    },
    /// Set the amount credited by the monthly allowance, zero to turn it off.
    SetAllowance {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        amount: Money,
    },
    /// Record an income or expense.
    Add {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        amount: Money,
        #[arg(long)]
        kind: TransactionKind,
        #[arg(long)]
        category: String,
        #[arg(long, default_value = "")]
        description: String,
        /// The date as YYYY-MM-DD, defaults to today.
        #[arg(long, value_parser = parse_date)]
        date: Option<Date>,
    },
    /// Replace every field of a transaction.
    Replace {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        id: TransactionId,
        #[arg(long)]
        amount: Money,
        #[arg(long)]
        kind: TransactionKind,
        #[arg(long)]
        category: String,
        #[arg(long, default_value = "")]
        description: String,
        /// The date as YYYY-MM-DD, defaults to today.
        #[arg(long, value_parser = parse_date)]
        date: Option<Date>,
    },
    /// Change some fields of a transaction.
    Patch {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        id: TransactionId,
        #[arg(long)]
        amount: Option<Money>,
        #[arg(long)]
        kind: Option<TransactionKind>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_date)]
        date: Option<Date>,
    },
    /// Delete a transaction.
    Delete {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        id: TransactionId,
    },
    /// Show a transaction.
    Show {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        id: TransactionId,
    },
    /// List transactions, newest first.
    List {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        kind: Option<TransactionKind>,
        #[arg(long, default_value_t = 5)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Manage savings goals.
    #[command(subcommand)]
    Goal(GoalCommand),
    /// Move money between the current and savings balances.
    Transfer {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        amount: Money,
        /// Either "to_savings" or "from_savings".
        #[arg(long)]
        direction: TransferDirection,
        #[arg(long)]
        goal: Option<SavingsGoalId>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Credit this month's allowance.
    Allowance {
        #[arg(long)]
        user: i64,
    },
    /// List the savings ledger, newest first.
    SavingsHistory {
        #[arg(long)]
        user: i64,
    },
    /// Compare the stored balances with the journal and savings ledger.
    Check {
        #[arg(long)]
        user: i64,
    },
    /// Set the stored savings balance to the savings ledger total.
    Backfill {
        #[arg(long)]
        user: i64,
    },
}

#[derive(Subcommand, Debug)]
enum GoalCommand {
    /// Create a savings goal.
    Create {
        #[arg(long)]
        user: i64,
        #[command(flatten)]
        details: GoalArgs,
    },
    /// Change the details of an active savings goal.
    Update {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        id: SavingsGoalId,
        #[command(flatten)]
        details: GoalArgs,
    },
    /// Deactivate a savings goal. Its savings become unallocated.
    Delete {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        id: SavingsGoalId,
    },
    /// Show a savings goal.
    Show {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        id: SavingsGoalId,
    },
    /// List the active savings goals.
    List {
        #[arg(long)]
        user: i64,
    },
}

#[derive(clap::Args, Debug)]
struct GoalArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    target: Money,
    /// The deadline as YYYY-MM-DD.
    #[arg(long, value_parser = parse_date)]
    deadline: Option<Date>,
    #[arg(long, default_value = "")]
    description: String,
}

impl From<GoalArgs> for GoalDetails {
    fn from(args: GoalArgs) -> Self {
        GoalDetails {
            name: args.name,
            target_amount: args.target,
            deadline: args.deadline,
            description: args.description,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Ledger(#[from] Error),
    #[error("could not format the result as JSON: {0}")]
    Output(#[from] serde_json::Error),
}

fn main() {
    setup_logging();
    let args = Args::parse();

    match run(args) {
        Ok(output) => println!("{output}"),
        Err(error) => {
            print_error(&error);

            if let CliError::Ledger(error) = &error {
                println!(
                    "{}",
                    json!({ "error": { "kind": error.kind(), "message": error.to_string() } })
                );
            }

            exit(1);
        }
    }
}

fn run(args: Args) -> Result<String, CliError> {
    let config = LedgerConfig::new(args.db_path)
        .with_timezone(&args.timezone)?
        .with_busy_timeout(Duration::from_millis(args.busy_timeout_ms));
    let ledger = Ledger::open(&config)?;
    let today = || local_now(ledger.local_timezone()).map(|now| now.date());

    match args.command {
        Command::Init => to_json(&json!({ "initialized": config.db_path })),
        Command::Register { email, name } => to_json(&ledger.register_user(&email, &name)?),
        Command::Account { user } => to_json(&ledger.account(UserID::new(user))?),
        Command::SetAllowance { user, amount } => {
            to_json(&ledger.set_allowance_income(UserID::new(user), amount)?)
        }
        Command::Add {
            user,
            amount,
            kind,
            category,
            description,
            date,
        } => {
            let date = date.map_or_else(today, Ok)?;
            let new = Transaction::build(amount, kind, &category, date).description(&description);
            to_json(&ledger.create_transaction(UserID::new(user), new)?)
        }
        Command::Replace {
            user,
            id,
            amount,
            kind,
            category,
            description,
            date,
        } => {
            let date = date.map_or_else(today, Ok)?;
            let new = Transaction::build(amount, kind, &category, date).description(&description);
            to_json(&ledger.replace_transaction(id, UserID::new(user), new)?)
        }
        Command::Patch {
            user,
            id,
            amount,
            kind,
            category,
            description,
            date,
        } => {
            let patch = TransactionPatch {
                amount,
                kind,
                category,
                description,
                date,
            };
            to_json(&ledger.patch_transaction(id, UserID::new(user), patch)?)
        }
        Command::Delete { user, id } => {
            to_json(&ledger.delete_transaction(id, UserID::new(user))?)
        }
        Command::Show { user, id } => to_json(&ledger.transaction(id, UserID::new(user))?),
        Command::List {
            user,
            category,
            kind,
            limit,
            offset,
        } => {
            let query = TransactionQuery {
                category,
                kind,
                limit,
                offset,
            };
            to_json(&ledger.transactions(UserID::new(user), &query)?)
        }
        Command::Goal(command) => run_goal_command(&ledger, command),
        Command::Transfer {
            user,
            amount,
            direction,
            goal,
            description,
        } => {
            let request = TransferRequest {
                amount,
                direction,
                goal_id: goal,
                description,
            };
            to_json(&ledger.transfer(UserID::new(user), request)?)
        }
        Command::Allowance { user } => to_json(&ledger.process_auto_allowance(UserID::new(user))?),
        Command::SavingsHistory { user } => {
            to_json(&ledger.savings_transactions(UserID::new(user))?)
        }
        Command::Check { user } => {
            let report = ledger.check_consistency(UserID::new(user))?;
            to_json(&json!({ "consistent": report.is_consistent(), "report": report }))
        }
        Command::Backfill { user } => {
            to_json(&ledger.backfill_savings_balance(UserID::new(user))?)
        }
    }
}

fn run_goal_command(ledger: &Ledger, command: GoalCommand) -> Result<String, CliError> {
    match command {
        GoalCommand::Create { user, details } => {
            to_json(&ledger.create_savings_goal(UserID::new(user), details.into())?)
        }
        GoalCommand::Update { user, id, details } => {
            to_json(&ledger.update_savings_goal(id, UserID::new(user), details.into())?)
        }
        GoalCommand::Delete { user, id } => {
            ledger.deactivate_savings_goal(id, UserID::new(user))?;
            to_json(&json!({ "deactivated": id }))
        }
        GoalCommand::Show { user, id } => to_json(&ledger.savings_goal(id, UserID::new(user))?),
        GoalCommand::List { user } => to_json(&ledger.savings_goals(UserID::new(user))?),
    }
}

fn to_json(value: &impl Serialize) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn print_error(error: impl ToString) {
    eprintln!(
        "\x1b[31;1m{}\x1b[0m",
        capitalise_first_char(&error.to_string())
    )
}

/// From https://crates.io/crates/capitalize
fn capitalise_first_char(string: &str) -> String {
    let mut chars = string.chars();
    let Some(first) = chars.next() else {
        return String::with_capacity(0);
    };
    first.to_uppercase().chain(chars).collect()
}
