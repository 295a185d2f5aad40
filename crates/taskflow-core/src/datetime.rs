use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

const TIMEZONE_ENV_VAR: &str =
  "TASKFLOW_TIMEZONE";

/// Zone used to decide which calendar
/// day a timestamp falls on.
#[derive(Debug, Clone, Copy)]
pub enum DisplayZone {
  Local,
  Named(Tz)
}

impl DisplayZone {
  pub fn date_of(
    &self,
    dt: DateTime<Utc>
  ) -> NaiveDate {
    match self {
      | Self::Local => {
        dt.with_timezone(&Local)
          .date_naive()
      }
      | Self::Named(tz) => {
        dt.with_timezone(tz)
          .date_naive()
      }
    }
  }

  fn resolve_local(
    &self,
    naive: NaiveDateTime
  ) -> LocalResult<DateTime<Utc>> {
    match self {
      | Self::Local => Local
        .from_local_datetime(&naive)
        .map(|dt| {
          dt.with_timezone(&Utc)
        }),
      | Self::Named(tz) => tz
        .from_local_datetime(&naive)
        .map(|dt| {
          dt.with_timezone(&Utc)
        })
    }
  }
}

pub fn display_zone()
-> &'static DisplayZone {
  static ZONE: OnceLock<DisplayZone> =
    OnceLock::new();
  ZONE.get_or_init(resolve_display_zone)
}

#[must_use]
pub fn to_display_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  display_zone().date_of(dt)
}

#[must_use]
pub fn format_display_date(
  dt: DateTime<Utc>
) -> String {
  to_display_date(dt)
    .format("%Y-%m-%d")
    .to_string()
}

fn resolve_display_zone() -> DisplayZone
{
  match std::env::var(TIMEZONE_ENV_VAR)
  {
    | Ok(raw) => {
      parse_timezone(&raw)
        .map(DisplayZone::Named)
        .unwrap_or(DisplayZone::Local)
    }
    | Err(_) => DisplayZone::Local
  }
}

fn parse_timezone(
  raw: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        timezone = %trimmed,
        "configured display timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::warn!(
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id; \
         falling back to local time"
      );
      None
    }
  }
}

fn end_of_day(
  zone: &DisplayZone,
  date: NaiveDate
) -> anyhow::Result<DateTime<Utc>> {
  let naive = date
    .and_hms_opt(23, 59, 59)
    .ok_or_else(|| {
      anyhow!(
        "failed to construct end of \
         day for {date}"
      )
    })?;

  match zone.resolve_local(naive) {
    | LocalResult::Single(dt) => Ok(dt),
    | LocalResult::Ambiguous(
      first,
      second
    ) => Ok(first.min(second)),
    | LocalResult::None => {
      Err(anyhow!(
        "end of day {date} does not \
         exist in the display timezone"
      ))
    }
  }
}

/// Parses a due-date expression.
///
/// Day-resolution inputs resolve to the
/// last second of that calendar day in
/// the display zone, so a task due today
/// is not overdue until the day is over.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_due_expr(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  parse_due_expr_in(
    display_zone(),
    input,
    now
  )
}

pub fn parse_due_expr_in(
  zone: &DisplayZone,
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = zone.date_of(now);

  match lower.as_str() {
    | "" => {
      return Err(anyhow!(
        "due date expression is empty"
      ));
    }
    | "now" => return Ok(now),
    | "today" => {
      return end_of_day(zone, today);
    }
    | "tomorrow" => {
      return end_of_day(
        zone,
        shift_days(today, 1)?
      );
    }
    | "yesterday" => {
      return end_of_day(
        zone,
        shift_days(today, -1)?
      );
    }
    | _ => {}
  }

  if let Some(weekday) =
    parse_weekday_name(&lower)
  {
    return end_of_day(
      zone,
      next_weekday_date(today, weekday)?
    );
  }

  if let Some(days) =
    parse_relative_days(&lower)?
  {
    return end_of_day(
      zone,
      shift_days(today, days)?
    );
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return end_of_day(zone, date);
  }

  DateTime::parse_from_rfc3339(token)
    .map(|dt| dt.with_timezone(&Utc))
    .with_context(|| {
      format!(
        "unrecognized due date \
         expression: {token}"
      )
    })
}

fn parse_relative_days(
  lower: &str
) -> anyhow::Result<Option<i64>> {
  let short_re = Regex::new(
    r"^\+(?P<num>\d+)(?P<unit>[dw])$"
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile \
       failure: {e}"
    )
  })?;
  let long_re = Regex::new(
    r"^in\s+(?P<num>\d+)\s+(?P<unit>days?|weeks?)$"
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile \
       failure: {e}"
    )
  })?;

  let Some(caps) = short_re
    .captures(lower)
    .or_else(|| {
      long_re.captures(lower)
    })
  else {
    return Ok(None);
  };

  let num: i64 = caps
    .name("num")
    .map(|m| m.as_str())
    .ok_or_else(|| {
      anyhow!("missing relative amount")
    })?
    .parse()
    .context("invalid relative amount")?;
  let unit = caps
    .name("unit")
    .map(|m| m.as_str())
    .unwrap_or("d");

  let days = if unit.starts_with('w') {
    num.saturating_mul(7)
  } else {
    num
  };
  Ok(Some(days))
}

fn shift_days(
  date: NaiveDate,
  days: i64
) -> anyhow::Result<NaiveDate> {
  Duration::try_days(days)
    .and_then(|delta| {
      date.checked_add_signed(delta)
    })
    .ok_or_else(|| {
      anyhow!(
        "due date {days} day(s) from \
         {date} is out of range"
      )
    })
}

fn next_weekday_date(
  today: NaiveDate,
  target: Weekday
) -> anyhow::Result<NaiveDate> {
  let current = today
    .weekday()
    .num_days_from_monday();
  let wanted =
    target.num_days_from_monday();
  let mut delta =
    (7 + wanted - current) % 7;
  if delta == 0 {
    delta = 7;
  }
  shift_days(today, i64::from(delta))
}

fn parse_weekday_name(
  lower: &str
) -> Option<Weekday> {
  match lower {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

/// Serde adapter for `dueDate`.
///
/// Writes RFC 3339 or `null`; reads RFC
/// 3339, a bare `YYYY-MM-DD` (UTC
/// midnight, the shape browsers store),
/// an empty string, or `null`.
pub mod due_date_serde {
  use chrono::{
    DateTime,
    NaiveDate,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &Option<DateTime<Utc>>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match dt {
      | Some(value) => serializer
        .serialize_str(
          &value.to_rfc3339()
        ),
      | None => {
        serializer.serialize_none()
      }
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<
    Option<DateTime<Utc>>,
    D::Error
  >
  where
    D: Deserializer<'de>
  {
    let opt =
      Option::<String>::deserialize(
        deserializer
      )?;
    match opt {
      | None => Ok(None),
      | Some(raw) => {
        super::parse_stored_due(&raw)
          .map_err(
            serde::de::Error::custom
          )
      }
    }
  }

  pub(crate) fn parse_naive_midnight(
    raw: &str
  ) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(
      raw, "%Y-%m-%d"
    )
    .ok()
    .and_then(|date| {
      date.and_hms_opt(0, 0, 0)
    })
    .map(|naive| naive.and_utc())
  }
}

pub(crate) fn parse_stored_due(
  raw: &str
) -> anyhow::Result<Option<DateTime<Utc>>>
{
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Ok(None);
  }

  if let Some(dt) =
    due_date_serde::parse_naive_midnight(
      trimmed
    )
  {
    return Ok(Some(dt));
  }

  DateTime::parse_from_rfc3339(trimmed)
    .map(|dt| {
      Some(dt.with_timezone(&Utc))
    })
    .with_context(|| {
      format!(
        "invalid due date: {trimmed}"
      )
    })
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    DisplayZone,
    parse_due_expr_in,
    parse_stored_due
  };

  fn utc_zone() -> DisplayZone {
    DisplayZone::Named(chrono_tz::UTC)
  }

  #[test]
  fn today_resolves_to_end_of_day() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let parsed = parse_due_expr_in(
      &utc_zone(),
      "today",
      now
    )
    .expect("parse today");
    assert_eq!(
      parsed,
      Utc
        .with_ymd_and_hms(
          2026, 2, 17, 23, 59, 59
        )
        .single()
        .expect("valid due")
    );
    assert!(parsed > now);
  }

  #[test]
  fn parses_weekday_and_relative_forms()
  {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let zone = utc_zone();

    let wednesday = parse_due_expr_in(
      &zone,
      "wednesday",
      now
    )
    .expect("parse weekday");
    assert_eq!(
      zone.date_of(wednesday),
      NaiveDate::from_ymd_opt(
        2026, 2, 18
      )
      .expect("date")
    );

    let plus_week = parse_due_expr_in(
      &zone, "+1w", now
    )
    .expect("parse +1w");
    let in_days = parse_due_expr_in(
      &zone,
      "in 7 days",
      now
    )
    .expect("parse in 7 days");
    assert_eq!(plus_week, in_days);
    assert_eq!(
      zone.date_of(plus_week),
      NaiveDate::from_ymd_opt(
        2026, 2, 24
      )
      .expect("date")
    );
  }

  #[test]
  fn rejects_garbage() {
    let now = Utc::now();
    assert!(
      parse_due_expr_in(
        &utc_zone(),
        "someday maybe",
        now
      )
      .is_err()
    );
    assert!(
      parse_due_expr_in(
        &utc_zone(),
        "  ",
        now
      )
      .is_err()
    );
  }

  #[test]
  fn huge_offsets_are_errors() {
    let now = Utc
      .with_ymd_and_hms(2026, 3, 3, 12, 0, 0)
      .single()
      .expect("valid now");

    for expr in [
      "+100000000d",
      "+99999999w",
      "in 99999999999 weeks"
    ] {
      let err = parse_due_expr_in(
        &utc_zone(),
        expr,
        now
      )
      .expect_err(expr);
      assert!(
        err
          .to_string()
          .contains("out of range"),
        "{expr}: {err}"
      );
    }
  }

  #[test]
  fn stored_due_accepts_bare_dates() {
    let parsed =
      parse_stored_due("2024-03-05")
        .expect("parse bare date")
        .expect("some date");
    assert_eq!(
      parsed,
      Utc
        .with_ymd_and_hms(
          2024, 3, 5, 0, 0, 0
        )
        .single()
        .expect("valid")
    );
    assert_eq!(
      parse_stored_due("")
        .expect("empty is none"),
      None
    );
    assert!(
      parse_stored_due(
        "2024-03-05T10:00:00.000Z"
      )
      .expect("parse iso")
      .is_some()
    );
  }
}
