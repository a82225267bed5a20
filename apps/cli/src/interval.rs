//! Time interval parsing.
//!
//! Accepts `yyyy[-mm[-dd[Thh[:mm[:ss]]]]]` or `min,max` where either end
//! may be empty. A partial max is expanded to the last instant of its
//! prefix, so `-s 2023-04` covers all of April 2023.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Days, Duration, Local, Months, NaiveDateTime, TimeZone};
use sigvault_store::Interval;

pub fn parse_interval(arg: &str) -> Result<Interval> {
    let (min_spec, max_spec) = match arg.split_once(',') {
        Some((min, max)) => (min, max),
        None => (arg, arg),
    };
    Ok(Interval {
        min: parse_time(min_spec, false)?,
        max: parse_time(max_spec, true)?,
    })
}

#[derive(Clone, Copy)]
enum Granularity {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

fn parse_time(s: &str, is_max: bool) -> Result<Option<DateTime<Local>>> {
    if s.is_empty() {
        return Ok(None);
    }

    let (pad, granularity) = match s.len() {
        4 => ("-01-01T00:00:00", Granularity::Year),
        7 => ("-01T00:00:00", Granularity::Month),
        10 => ("T00:00:00", Granularity::Day),
        13 => (":00:00", Granularity::Hour),
        16 => (":00", Granularity::Minute),
        19 => ("", Granularity::Second),
        _ => return Err(invalid(s)),
    };

    let naive = NaiveDateTime::parse_from_str(&format!("{s}{pad}"), "%Y-%m-%dT%H:%M:%S")
        .map_err(|_| invalid(s))?;
    let naive = if is_max {
        advance(naive, granularity).ok_or_else(|| invalid(s))?
    } else {
        naive
    };

    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| invalid(s))?;

    // The max bound is inclusive: back off from the start of the next
    // prefix to its last representable millisecond.
    Ok(Some(if is_max {
        local - Duration::milliseconds(1)
    } else {
        local
    }))
}

fn advance(t: NaiveDateTime, granularity: Granularity) -> Option<NaiveDateTime> {
    match granularity {
        Granularity::Year => t.checked_add_months(Months::new(12)),
        Granularity::Month => t.checked_add_months(Months::new(1)),
        Granularity::Day => t.checked_add_days(Days::new(1)),
        Granularity::Hour => t.checked_add_signed(Duration::hours(1)),
        Granularity::Minute => t.checked_add_signed(Duration::minutes(1)),
        Granularity::Second => t.checked_add_signed(Duration::seconds(1)),
    }
}

fn invalid(s: &str) -> anyhow::Error {
    anyhow!("{s}: invalid time")
}
