// Fulfillment week helpers
// Friday..Thursday delivery window and default picklist naming

use chrono::{Datelike, Days, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::error::GuardError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive Friday..Thursday fulfillment window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekWindow {
    /// Window containing `today`: the coming (or current) Thursday and the Friday before it
    pub fn containing(today: NaiveDate) -> Self {
        let weekday = today.weekday().num_days_from_monday();
        let days_to_thursday = (3 + 7 - weekday) % 7;
        let end = today + Days::new(u64::from(days_to_thursday));
        let start = end - Days::new(6);
        Self { start, end }
    }

    /// Window for the current date in `tz`
    pub fn current(tz: Tz) -> Self {
        Self::containing(Utc::now().with_timezone(&tz).date_naive())
    }

    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }

    /// Refuse any range other than exactly this window
    pub fn guard(&self, start: &str, end: &str) -> Result<(), GuardError> {
        let expected_start = self.start_str();
        let expected_end = self.end_str();
        if start == expected_start && end == expected_end {
            return Ok(());
        }

        Err(GuardError::OutsideCurrentWeek {
            expected_start,
            expected_end,
            start: start.to_string(),
            end: end.to_string(),
        })
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, GuardError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| GuardError::InvalidDate(value.to_string()))
}

/// English ordinal: 1st, 2nd, 3rd, 4th, 11th, 21st
pub fn ordinal(n: u32) -> String {
    let suffix = if (10..=20).contains(&(n % 100)) {
        "th"
    } else {
        match n % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };
    format!("{}{}", n, suffix)
}

/// e.g. `2026-10-15` -> `Thursday, Oct 15th Deliveries`
pub fn default_picklist_name(date: &str) -> Result<String, GuardError> {
    let date = parse_date(date)?;
    Ok(format!(
        "{}, {} {} Deliveries",
        date.format("%A"),
        date.format("%b"),
        ordinal(date.day())
    ))
}
