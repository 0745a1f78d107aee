use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Last day of the week containing `date`, for weeks ending on `week_end`.
///
/// A date that already falls on `week_end` is its own week ending.
pub fn week_ending(date: NaiveDate, week_end: Weekday) -> NaiveDate {
    let current = date.weekday().num_days_from_monday();
    let target = week_end.num_days_from_monday();
    let ahead = (target + 7 - current) % 7;

    date.checked_add_days(Days::new(ahead as u64))
        .unwrap_or(date)
}

/// Every week ending from `first` to `last` inclusive, seven days apart.
pub fn week_endings_in_range(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    let mut weeks = Vec::new();
    let mut current = first;

    while current <= last {
        weeks.push(current);
        match current.checked_add_days(Days::new(7)) {
            Some(next) => current = next,
            None => break,
        }
    }

    weeks
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn next_month_start(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Month starts covering `start` through `end`, like a monthly date range
/// anchored on the first of the month.
pub fn month_starts_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    let mut current = month_start(start);

    while current <= end {
        months.push(current);
        let next = next_month_start(current);
        if next <= current {
            break;
        }
        current = next;
    }

    months
}

/// Renders a number without a trailing `.0` when it is integral.
pub fn format_plain_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week_ending_sunday() {
        // 2024-01-01 is a Monday
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();

        assert_eq!(week_ending(monday, Weekday::Sun), sunday);
        assert_eq!(week_ending(sunday, Weekday::Sun), sunday);
        assert_eq!(
            week_ending(sunday.succ_opt().unwrap(), Weekday::Sun),
            NaiveDate::from_ymd_opt(2024, 1, 14).unwrap()
        );
    }

    #[test]
    fn test_week_ending_other_boundary() {
        let wednesday = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert_eq!(
            week_ending(wednesday, Weekday::Fri),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
        );
        assert_eq!(
            week_ending(wednesday, Weekday::Tue),
            NaiveDate::from_ymd_opt(2024, 1, 9).unwrap()
        );
    }

    #[test]
    fn test_month_starts_cross_year() {
        let months = month_starts_in_range(
            NaiveDate::from_ymd_opt(2022, 11, 15).unwrap(),
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
        );
        assert_eq!(
            months,
            vec![
                NaiveDate::from_ymd_opt(2022, 11, 1).unwrap(),
                NaiveDate::from_ymd_opt(2022, 12, 1).unwrap(),
                NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
            ]
        );
    }

    #[test]
    fn test_format_plain_number() {
        assert_eq!(format_plain_number(3.0), "3");
        assert_eq!(format_plain_number(-12.0), "-12");
        assert_eq!(format_plain_number(2.5), "2.5");
    }
}
