//! Resolves canonical timezone names to their rules and offsets.

use time::{OffsetDateTime, UtcOffset};
use time_tz::{Offset, OffsetDateTimeExt, TimeZone, Tz};

use crate::Error;

/// Get the UTC offset currently in effect for a canonical timezone name
/// such as "Pacific/Auckland".
///
/// Returns `None` if the name is not a known timezone.
pub fn get_local_offset(canonical_timezone: &str) -> Option<UtcOffset> {
    time_tz::timezones::get_by_name(canonical_timezone)
        .map(|tz| tz.get_offset_utc(&OffsetDateTime::now_utc()).to_utc())
}

/// Get the rules of a canonical timezone name such as "Europe/Berlin".
///
/// Use this rather than a fixed offset when the result has to be right on
/// both sides of a daylight saving change.
///
/// # Errors
/// Returns an [Error::InvalidTimezoneError] if the name is not a known timezone.
pub fn get_timezone(canonical_timezone: &str) -> Result<&'static Tz, Error> {
    time_tz::timezones::get_by_name(canonical_timezone)
        .ok_or_else(|| Error::InvalidTimezoneError(canonical_timezone.to_owned()))
}

/// Get the current date and time in `canonical_timezone`.
///
/// # Errors
/// Returns an [Error::InvalidTimezoneError] if the name is not a known timezone.
pub fn local_now(canonical_timezone: &str) -> Result<OffsetDateTime, Error> {
    let timezone = get_timezone(canonical_timezone)?;

    Ok(OffsetDateTime::now_utc().to_timezone(timezone))
}

#[cfg(test)]
mod timezone_tests {
    use time::{UtcOffset, macros::datetime};
    use time_tz::OffsetDateTimeExt;

    use crate::Error;

    use super::{get_local_offset, get_timezone, local_now};

    #[test]
    fn utc_has_zero_offset() {
        assert_eq!(get_local_offset("Etc/UTC"), Some(UtcOffset::UTC));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        assert_eq!(get_local_offset("Mars/Olympus_Mons"), None);
        assert_eq!(
            local_now("Mars/Olympus_Mons"),
            Err(Error::InvalidTimezoneError("Mars/Olympus_Mons".to_owned()))
        );
        assert!(matches!(
            get_timezone("Mars/Olympus_Mons"),
            Err(Error::InvalidTimezoneError(_))
        ));
    }

    #[test]
    fn local_now_uses_offset() {
        let now = local_now("Asia/Kolkata").unwrap();

        assert_eq!(now.offset(), UtcOffset::from_hms(5, 30, 0).unwrap());
    }

    #[test]
    fn timezone_follows_daylight_saving() {
        let berlin = get_timezone("Europe/Berlin").unwrap();

        let summer = datetime!(2025-10-25 12:00 UTC).to_timezone(berlin);
        let winter = datetime!(2025-10-27 12:00 UTC).to_timezone(berlin);

        assert_eq!(summer.offset(), UtcOffset::from_hms(2, 0, 0).unwrap());
        assert_eq!(winter.offset(), UtcOffset::from_hms(1, 0, 0).unwrap());
    }
}
