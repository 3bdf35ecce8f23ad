use anyhow::{Context, anyhow};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use regex::Regex;

/// Monday of the week containing `date`.
#[must_use]
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = date.weekday().num_days_from_monday() as i64;
    date - Duration::days(offset)
}

#[must_use]
pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Saturday and Sunday roll forward to the following Monday.
#[must_use]
pub fn clamp_forward_to_weekday(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date + Duration::days(2),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// Saturday and Sunday roll back to the preceding Friday.
#[must_use]
pub fn clamp_back_to_weekday(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date - Duration::days(2),
        _ => date,
    }
}

/// One step forward, skipping the weekend (Friday jumps to Monday).
#[must_use]
pub fn next_weekday(date: NaiveDate) -> NaiveDate {
    let step = if date.weekday() == Weekday::Fri { 3 } else { 1 };
    date + Duration::days(step)
}

/// One step back, skipping the weekend (Monday jumps to Friday).
#[must_use]
pub fn previous_weekday(date: NaiveDate) -> NaiveDate {
    let step = if date.weekday() == Weekday::Mon { 3 } else { 1 };
    date - Duration::days(step)
}

/// Monday through Friday of the week starting at `start`.
#[must_use]
pub fn week_dates(start: NaiveDate) -> [NaiveDate; 5] {
    [
        start,
        start + Duration::days(1),
        start + Duration::days(2),
        start + Duration::days(3),
        start + Duration::days(4),
    ]
}

#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date_expr(input: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let token = input.trim();
    let lower = token.to_ascii_lowercase();

    match lower.as_str() {
        "today" => return Ok(today),
        "tomorrow" => return Ok(today + Duration::days(1)),
        "yesterday" => return Ok(today - Duration::days(1)),
        _ => {}
    }

    if let Some(target) = parse_weekday_name(&lower) {
        return Ok(next_weekday_date(today, target));
    }

    let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)d$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
    if let Some(caps) = rel_re.captures(token) {
        let sign = caps
            .name("sign")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing relative sign"))?;
        let num: i64 = caps
            .name("num")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing relative amount"))?
            .parse()
            .context("invalid relative number")?;
        let delta = Duration::days(num);
        return Ok(if sign == "-" { today - delta } else { today + delta });
    }

    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return Ok(date);
    }

    Err(anyhow!("unrecognized date expression: {input}")).with_context(|| {
        "supported formats: today/tomorrow/yesterday, weekday names (e.g. monday), \
         +Nd/-Nd, YYYY-MM-DD"
    })
}

fn parse_weekday_name(token: &str) -> Option<Weekday> {
    match token.trim() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn next_weekday_date(from: NaiveDate, target: Weekday) -> NaiveDate {
    let from_idx = from.weekday().num_days_from_monday() as i64;
    let target_idx = target.num_days_from_monday() as i64;
    let mut delta = (7 + target_idx - from_idx) % 7;
    if delta == 0 {
        delta = 7;
    }
    from.checked_add_signed(Duration::days(delta)).unwrap_or(from)
}
