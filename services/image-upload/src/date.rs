//! Capture date normalization.
//!
//! Clients send `date_taken` in whatever shape their camera roll produced.
//! The metadata store wants a plain `YYYY-MM-DD` date, so the accepted
//! formats are tried in a fixed order and the first one that parses wins.

use crate::error::UploadError;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::debug;

/// Accepted capture date formats, in the order they are attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureDateFormat {
    /// `2024-01-15`
    IsoDate,
    /// `01/15/24`
    SlashedShortYear,
    /// `01-15-24`
    DashedShortYear,
    /// `01/15/24 10:30:45.123456`
    SlashedShortYearWithTime,
}

impl CaptureDateFormat {
    pub const ORDERED: [CaptureDateFormat; 4] = [
        CaptureDateFormat::IsoDate,
        CaptureDateFormat::SlashedShortYear,
        CaptureDateFormat::DashedShortYear,
        CaptureDateFormat::SlashedShortYearWithTime,
    ];

    fn pattern(&self) -> &'static str {
        match self {
            CaptureDateFormat::IsoDate => "%Y-%m-%d",
            CaptureDateFormat::SlashedShortYear => "%m/%d/%y",
            CaptureDateFormat::DashedShortYear => "%m-%d-%y",
            CaptureDateFormat::SlashedShortYearWithTime => "%m/%d/%y %H:%M:%S.%f",
        }
    }

    /// Try to parse `input` with this format
    pub fn parse(&self, input: &str) -> Option<NaiveDate> {
        match self {
            // chrono's %Y accepts any digit count, which would read `12-11-24`
            // as year 12. Only a four digit year is an ISO date.
            CaptureDateFormat::IsoDate => {
                let year = input.split('-').next().unwrap_or_default();
                if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                NaiveDate::parse_from_str(input, self.pattern()).ok()
            }
            CaptureDateFormat::SlashedShortYear | CaptureDateFormat::DashedShortYear => {
                NaiveDate::parse_from_str(input, self.pattern())
                    .ok()
                    .map(pivot_short_year)
            }
            // Microsecond precision at most; chrono alone would take nine digits
            CaptureDateFormat::SlashedShortYearWithTime => {
                let (_, fraction) = input.rsplit_once('.')?;
                if !(1..=MAX_FRACTION_DIGITS).contains(&fraction.len())
                    || !fraction.bytes().all(|b| b.is_ascii_digit())
                {
                    return None;
                }
                NaiveDateTime::parse_from_str(input, self.pattern())
                    .ok()
                    .map(|dt| pivot_short_year(dt.date()))
            }
        }
    }
}

/// Longest accepted fractional seconds part
const MAX_FRACTION_DIGITS: usize = 6;

/// Two digit years `69`..`99` are 1969..1999, `00`..`68` are 2000..2068.
///
/// chrono places `69` in 2069, so that single year is moved back a century.
fn pivot_short_year(date: NaiveDate) -> NaiveDate {
    if date.year() == 2069 {
        date.with_year(1969).unwrap_or(date)
    } else {
        date
    }
}

/// Normalize a capture date to `YYYY-MM-DD`.
///
/// An absent date stays absent. A supplied date that matches none of the
/// accepted formats (including the empty string) is a [`UploadError::DateFormat`].
pub fn normalize_capture_date(date_taken: Option<&str>) -> Result<Option<String>, UploadError> {
    let Some(raw) = date_taken else {
        return Ok(None);
    };

    for format in CaptureDateFormat::ORDERED {
        match format.parse(raw) {
            Some(date) => return Ok(Some(date.format("%Y-%m-%d").to_string())),
            None => debug!(date_taken = %raw, format = ?format, "Capture date did not match format"),
        }
    }

    Err(UploadError::DateFormat(raw.to_string()))
}
