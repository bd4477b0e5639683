//! # Cron Schedule Parser
//!
//! Standard 6-field cron expressions (`sec min hour day-of-month month
//! day-of-week`) used for maintenance window starts. Supports `*`, `?`
//! (alias of `*`), lists, ranges, steps and three-letter month/weekday
//! names; `0` and `7` both mean Sunday. When both day fields are
//! restricted a date matches if either field matches, following classic
//! cron semantics.
//!
//! Expressions are parsed once at entity creation; lookups only walk the
//! field sets, never the wall clock.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

/// Lookahead horizon for [`CronSchedule::next_after`]. A schedule with no
/// occurrence inside the horizon (e.g. `0 0 0 30 2 *`) is treated as
/// exhausted by the window evaluator.
pub const LOOKAHEAD_DAYS: i64 = 4 * 366;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Allowed values for one cron field, packed into a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet {
    mask: u64,
    /// False when the field was `*`/`?`; relevant for day matching
    restricted: bool,
}

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.mask & (1 << value) != 0
    }

    fn next_at_or_above(&self, value: u32, max: u32) -> Option<u32> {
        (value..=max).find(|&v| self.contains(v))
    }
}

/// A parsed 6-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    seconds: FieldSet,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
}

impl CronSchedule {
    /// Parse a 6-field cron expression.
    pub fn parse(expression: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(format!(
                "expected 6 fields (sec min hour day month weekday), got {}",
                fields.len()
            ));
        }

        Ok(Self {
            seconds: parse_field(fields[0], 0, 59, &[], false)?,
            minutes: parse_field(fields[1], 0, 59, &[], false)?,
            hours: parse_field(fields[2], 0, 23, &[], false)?,
            days_of_month: parse_field(fields[3], 1, 31, &[], false)?,
            months: parse_field(fields[4], 1, 12, &MONTH_NAMES, false)?,
            days_of_week: parse_field(fields[5], 0, 7, &DAY_NAMES, true)?,
        })
    }

    /// First occurrence strictly after `after`, within the lookahead
    /// horizon. Sub-second precision is truncated; occurrences are whole
    /// seconds.
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut t = (after + Duration::seconds(1)).with_nanosecond(0)?;
        let horizon = after + Duration::days(LOOKAHEAD_DAYS);

        while t <= horizon {
            if !self.months.contains(t.month()) {
                t = start_of_next_month(t)?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                match self.hours.next_at_or_above(t.hour() + 1, 23) {
                    Some(hour) => t = t.date().and_hms_opt(hour, 0, 0)?,
                    None => t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?,
                }
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                match self.minutes.next_at_or_above(t.minute() + 1, 59) {
                    Some(minute) => t = t.date().and_hms_opt(t.hour(), minute, 0)?,
                    None => {
                        t = t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1);
                    }
                }
                continue;
            }
            if !self.seconds.contains(t.second()) {
                match self.seconds.next_at_or_above(t.second() + 1, 59) {
                    Some(second) => {
                        t = t.date().and_hms_opt(t.hour(), t.minute(), second)?;
                    }
                    None => {
                        t = t.date().and_hms_opt(t.hour(), t.minute(), 0)? + Duration::minutes(1);
                    }
                }
                continue;
            }
            return Some(t);
        }
        None
    }

    /// Day matching: when both day fields are restricted, either may
    /// claim the date (classic cron OR semantics).
    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());
        match (
            self.days_of_month.restricted,
            self.days_of_week.restricted,
        ) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }
}

fn start_of_next_month(t: NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

/// Parse one cron field into a bitmask.
///
/// `names` provides optional three-letter aliases starting at the field
/// minimum (months) or zero (weekdays). `wrap_high` folds the maximum
/// value onto the minimum, so weekday `7` becomes Sunday.
fn parse_field(
    spec: &str,
    min: u32,
    max: u32,
    names: &[&str],
    wrap_high: bool,
) -> Result<FieldSet, String> {
    if spec == "*" || spec == "?" {
        let mut mask = 0u64;
        for v in min..=max {
            mask |= 1 << v;
        }
        return Ok(FieldSet {
            mask,
            restricted: false,
        });
    }

    let mut mask = 0u64;
    for part in spec.split(',') {
        if part.is_empty() {
            return Err("empty list element".to_string());
        }
        let (range_part, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step '{step}'"))?;
                if step == 0 {
                    return Err("step must be positive".to_string());
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if range_part == "*" || range_part == "?" {
            (min, max)
        } else if let Some((a, b)) = range_part.split_once('-') {
            (
                parse_value(a, min, max, names, wrap_high)?,
                parse_value(b, min, max, names, wrap_high)?,
            )
        } else {
            let v = parse_value(range_part, min, max, names, wrap_high)?;
            // A bare value with a step opens the range to the field max.
            if part.contains('/') {
                (v, max)
            } else {
                (v, v)
            }
        };

        if lo > hi {
            return Err(format!("descending range {lo}-{hi}"));
        }

        let mut v = lo;
        while v <= hi {
            mask |= 1 << v;
            v += step;
        }
    }

    Ok(FieldSet {
        mask,
        restricted: true,
    })
}

fn parse_value(
    s: &str,
    min: u32,
    max: u32,
    names: &[&str],
    wrap_high: bool,
) -> Result<u32, String> {
    let lowered = s.to_ascii_lowercase();
    let value = if let Some(idx) = names.iter().position(|n| *n == lowered) {
        idx as u32 + min
    } else {
        lowered
            .parse::<u32>()
            .map_err(|_| format!("invalid value '{s}'"))?
    };

    let value = if wrap_high && value == max { 0 } else { value };
    let max = if wrap_high { max - 1 } else { max };
    if value < min || value > max {
        return Err(format!("value {value} out of range {min}-{max}"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        assert!(CronSchedule::parse("0 0 2 * *").is_err());
        assert!(CronSchedule::parse("0 0 2 * * * 2026").is_err());
        assert!(CronSchedule::parse("").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(CronSchedule::parse("60 0 2 * * *").is_err());
        assert!(CronSchedule::parse("0 0 24 * * *").is_err());
        assert!(CronSchedule::parse("0 0 2 0 * *").is_err());
        assert!(CronSchedule::parse("0 0 2 * 13 *").is_err());
        assert!(CronSchedule::parse("0 0 2 * * 8").is_err());
        assert!(CronSchedule::parse("0 0 2 * * mon-").is_err());
        assert!(CronSchedule::parse("0 0/0 2 * * *").is_err());
        assert!(CronSchedule::parse("0 30-10 2 * * *").is_err());
    }

    #[test]
    fn test_next_daily() {
        let schedule = CronSchedule::parse("0 0 2 * * *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 3, 10, 1, 0, 0)),
            Some(at(2026, 3, 10, 2, 0, 0))
        );
        // Already past today's occurrence: tomorrow.
        assert_eq!(
            schedule.next_after(at(2026, 3, 10, 2, 0, 0)),
            Some(at(2026, 3, 11, 2, 0, 0))
        );
    }

    #[test]
    fn test_next_is_strictly_after() {
        let schedule = CronSchedule::parse("30 15 4 * * *").unwrap();
        let fire = at(2026, 6, 1, 4, 15, 30);
        assert_eq!(
            schedule.next_after(fire - Duration::seconds(1)),
            Some(fire)
        );
        assert_eq!(
            schedule.next_after(fire),
            Some(fire + Duration::days(1))
        );
    }

    #[test]
    fn test_step_and_list_fields() {
        let schedule = CronSchedule::parse("0 */15 * * * *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 1, 1, 9, 13, 12)),
            Some(at(2026, 1, 1, 9, 15, 0))
        );
        assert_eq!(
            schedule.next_after(at(2026, 1, 1, 9, 45, 0)),
            Some(at(2026, 1, 1, 10, 0, 0))
        );

        let schedule = CronSchedule::parse("0 0 8,20 * * *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 1, 1, 9, 0, 0)),
            Some(at(2026, 1, 1, 20, 0, 0))
        );
    }

    #[test]
    fn test_weekday_names_and_sunday_alias() {
        // 2026-03-08 is a Sunday.
        let by_name = CronSchedule::parse("0 0 3 ? * SUN").unwrap();
        let by_seven = CronSchedule::parse("0 0 3 ? * 7").unwrap();
        let by_zero = CronSchedule::parse("0 0 3 ? * 0").unwrap();

        let expected = Some(at(2026, 3, 8, 3, 0, 0));
        let probe = at(2026, 3, 4, 0, 0, 0);
        assert_eq!(by_name.next_after(probe), expected);
        assert_eq!(by_seven.next_after(probe), expected);
        assert_eq!(by_zero.next_after(probe), expected);
    }

    #[test]
    fn test_weekday_range() {
        // Weeknights only: Friday 2026-03-13 -> next is Monday 2026-03-16.
        let schedule = CronSchedule::parse("0 0 1 ? * MON-FRI").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 3, 13, 2, 0, 0)),
            Some(at(2026, 3, 16, 1, 0, 0))
        );
    }

    #[test]
    fn test_month_names_and_rollover() {
        let schedule = CronSchedule::parse("0 0 0 1 JAN *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 2, 1, 0, 0, 0)),
            Some(at(2027, 1, 1, 0, 0, 0))
        );
    }

    #[test]
    fn test_both_day_fields_use_or_semantics() {
        // 15th of the month or any Monday.
        let schedule = CronSchedule::parse("0 0 12 15 * MON").unwrap();
        // From Sat 2026-03-07: Monday the 9th wins over the 15th.
        assert_eq!(
            schedule.next_after(at(2026, 3, 7, 0, 0, 0)),
            Some(at(2026, 3, 9, 12, 0, 0))
        );
        // From Tue 2026-03-10: the 15th (a Sunday) comes before next Monday.
        assert_eq!(
            schedule.next_after(at(2026, 3, 10, 0, 0, 0)),
            Some(at(2026, 3, 15, 12, 0, 0))
        );
    }

    #[test]
    fn test_impossible_date_exhausts_lookahead() {
        let schedule = CronSchedule::parse("0 0 0 30 2 *").unwrap();
        assert_eq!(schedule.next_after(at(2026, 1, 1, 0, 0, 0)), None);
    }

    #[test]
    fn test_leap_day_found_within_horizon() {
        let schedule = CronSchedule::parse("0 0 0 29 2 *").unwrap();
        assert_eq!(
            schedule.next_after(at(2026, 3, 1, 0, 0, 0)),
            Some(at(2028, 2, 29, 0, 0, 0))
        );
    }
}
