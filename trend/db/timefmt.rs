use anyhow::{anyhow, Context};
use time::{macros::format_description, OffsetDateTime};

// Fixed width and always UTC so stored timestamps order lexicographically.
const STORED: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

/// `t` as a UTC date-time, or `None` when it is outside what `time` can
/// represent.
fn to_utc(t: &std::time::SystemTime) -> Option<OffsetDateTime> {
    match t.duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => OffsetDateTime::UNIX_EPOCH.checked_add(time::Duration::try_from(d).ok()?),
        Err(e) => OffsetDateTime::UNIX_EPOCH.checked_sub(time::Duration::try_from(e.duration()).ok()?),
    }
}

pub(crate) fn format_time(t: &std::time::SystemTime) -> anyhow::Result<String> {
    let ts = to_utc(t).ok_or_else(|| anyhow!("time out of range: {t:?}"))?;
    ts.format(STORED).context("error formatting time")
}

pub(crate) fn parse_time(t: &str) -> anyhow::Result<std::time::SystemTime> {
    time::PrimitiveDateTime::parse(t, STORED)
        .map(|pt| std::convert::Into::<std::time::SystemTime>::into(pt.assume_utc()))
        .with_context(|| format!("error parsing time {t:?}"))
}

/// UTC calendar date, `YYYY-MM-DD`.
/// Saturates at the representable range; stored times always fall inside it.
pub(crate) fn day_of(t: &std::time::SystemTime) -> time::Date {
    match to_utc(t) {
        Some(ts) => ts.date(),
        None if *t < std::time::UNIX_EPOCH => time::Date::MIN,
        None => time::Date::MAX,
    }
}

/// Monday of the ISO week containing `t`.
pub(crate) fn week_of(t: &std::time::SystemTime) -> time::Date {
    let d = day_of(t);
    d - time::Duration::days(d.weekday().number_days_from_monday() as i64)
}
