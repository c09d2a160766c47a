use std::fmt;

use chrono::{Datelike, Days, Months, NaiveDate};

/// A calendar offset. Months and days are kept apart because a month has no
/// fixed length; they are applied months first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Offset {
    pub months: i32,
    pub days: i64,
}

impl Offset {
    pub fn days(days: i64) -> Self {
        Self { months: 0, days }
    }

    /// `None` when the count does not fit a month offset.
    pub fn months(months: i64) -> Option<Self> {
        let months = i32::try_from(months).ok()?;
        Some(Self { months, days: 0 })
    }

    pub fn years(years: i64) -> Option<Self> {
        Self::months(years.checked_mul(12)?)
    }

    pub fn weeks(weeks: i64) -> Option<Self> {
        Some(Self::days(weeks.checked_mul(7)?))
    }

    pub fn checked_add(self, other: Offset) -> Option<Offset> {
        Some(Offset {
            months: self.months.checked_add(other.months)?,
            days: self.days.checked_add(other.days)?,
        })
    }

    pub fn checked_neg(self) -> Option<Offset> {
        Some(Offset {
            months: self.months.checked_neg()?,
            days: self.days.checked_neg()?,
        })
    }

    pub fn checked_sub(self, other: Offset) -> Option<Offset> {
        self.checked_add(other.checked_neg()?)
    }

    pub fn checked_scale(self, factor: i64) -> Option<Offset> {
        let months = i64::from(self.months).checked_mul(factor)?;
        Some(Offset {
            months: i32::try_from(months).ok()?,
            days: self.days.checked_mul(factor)?,
        })
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn plural(n: i64, unit: &str) -> String {
            if n.abs() == 1 {
                format!("{n} {unit}")
            } else {
                format!("{n} {unit}s")
            }
        }
        match (self.months, self.days) {
            (0, days) => write!(f, "{}", plural(days, "day")),
            (months, 0) => write!(f, "{}", plural(months as i64, "month")),
            (months, days) => write!(
                f,
                "{} {}",
                plural(months as i64, "month"),
                plural(days, "day")
            ),
        }
    }
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

/// Applies an offset to a date. Month arithmetic clamps to the last day of
/// the target month. `None` when the result leaves chrono's range.
pub fn shift(date: NaiveDate, offset: Offset) -> Option<NaiveDate> {
    let date = match offset.months {
        0 => date,
        m if m > 0 => date.checked_add_months(Months::new(m as u32))?,
        m => date.checked_sub_months(Months::new(m.unsigned_abs()))?,
    };
    match offset.days {
        0 => Some(date),
        d if d > 0 => date.checked_add_days(Days::new(d as u64)),
        d => date.checked_sub_days(Days::new(d.unsigned_abs())),
    }
}

/// Signed day count from `start` to `end`.
pub fn between(start: NaiveDate, end: NaiveDate) -> Offset {
    Offset::days((end - start).num_days())
}

pub fn year(date: NaiveDate) -> i32 {
    date.year()
}

pub fn month(date: NaiveDate) -> u32 {
    date.month()
}

pub fn day(date: NaiveDate) -> u32 {
    date.day()
}

/// ISO weekday, Monday = 1.
pub fn weekday(date: NaiveDate) -> u32 {
    date.weekday().number_from_monday()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(text: &str) -> NaiveDate {
        parse_date(text).expect("valid date")
    }

    #[test]
    fn month_shift_clamps_to_month_end() {
        let month = Offset::months(1).expect("fits");
        let shifted = shift(date("2024-01-31"), month).expect("in range");
        assert_eq!(shifted, date("2024-02-29"));
    }

    #[test]
    fn negative_offsets_go_backwards() {
        let shifted = shift(date("2024-03-01"), Offset::days(-1)).expect("in range");
        assert_eq!(shifted, date("2024-02-29"));
    }

    #[test]
    fn between_counts_days() {
        assert_eq!(
            between(date("2024-01-01"), date("2024-12-31")),
            Offset::days(365)
        );
    }

    #[test]
    fn offsets_render_readably() {
        assert_eq!(Offset::days(1).to_string(), "1 day");
        assert_eq!(Offset { months: 2, days: 3 }.to_string(), "2 months 3 days");
    }

    #[test]
    fn oversized_offsets_are_rejected() {
        assert_eq!(Offset::years(200_000_000), None);
        assert_eq!(Offset::months(i64::from(i32::MAX) + 1), None);
        assert_eq!(Offset::weeks(9_000_000_000_000_000_000), None);
        let huge = Offset::days(9_000_000_000_000_000_000);
        assert_eq!(huge.checked_add(huge), None);
        assert_eq!(Offset::days(2).checked_scale(i64::MAX), None);
        assert_eq!(Offset::days(i64::MIN).checked_neg(), None);
        assert_eq!(Offset::years(2), Offset::months(24));
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(parse_date("2024-13-01").is_none());
        assert!(parse_date("yesterday").is_none());
    }
}
