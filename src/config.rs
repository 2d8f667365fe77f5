//! Settings needed to open a [Ledger](crate::Ledger).

use std::{path::PathBuf, time::Duration};

use crate::{Error, timezone::get_timezone};

/// The timezone used when none is configured.
pub const DEFAULT_TIMEZONE: &str = "Etc/UTC";

/// How long a writer waits for the database lock before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the ledger lives and how it should treat time.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// File path to the SQLite database.
    pub db_path: PathBuf,
    /// The canonical timezone name, e.g. "Pacific/Auckland", used to decide
    /// the current day and calendar month.
    pub local_timezone: String,
    /// How long a writer waits for another writer to finish.
    pub busy_timeout: Duration,
}

impl LedgerConfig {
    /// Create a config for the database at `db_path` with the default
    /// timezone and busy timeout.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            local_timezone: DEFAULT_TIMEZONE.to_owned(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Set the timezone.
    ///
    /// # Errors
    /// Returns an [Error::InvalidTimezoneError] if `local_timezone` is not a
    /// known canonical timezone name.
    pub fn with_timezone(mut self, local_timezone: &str) -> Result<Self, Error> {
        get_timezone(local_timezone)?;
        self.local_timezone = local_timezone.to_owned();
        Ok(self)
    }

    /// Set the busy timeout.
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }
}
