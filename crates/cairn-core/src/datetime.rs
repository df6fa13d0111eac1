use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Days,
  Local,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

pub const TIMEZONE_ENV_VAR: &str =
  "CAIRN_TIMEZONE";

/// Picks the zone used to decide what
/// "today" is. The environment wins
/// over the configured value; `None`
/// means the system local zone.
pub fn resolve_timezone(
  configured: Option<&str>
) -> Option<Tz> {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return Some(tz);
  }

  configured.and_then(|raw| {
    parse_timezone(raw, "time.timezone")
  })
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[must_use]
pub fn today_in(
  tz: Option<Tz>,
  now: DateTime<Utc>
) -> NaiveDate {
  match tz {
    | Some(tz) => {
      now.with_timezone(&tz).date_naive()
    }
    | None => {
      now.with_timezone(&Local).date_naive()
    }
  }
}

#[must_use]
pub fn format_date(
  date: NaiveDate
) -> String {
  date.format("%Y-%m-%d").to_string()
}

/// Resolves a due-date expression
/// relative to `today`.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_due_date(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return today
        .checked_add_days(Days::new(1))
        .ok_or_else(|| {
          anyhow!(
            "date out of range after \
             {today}"
          )
        });
    }
    | "yesterday" => {
      return today
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| {
          anyhow!(
            "date out of range before \
             {today}"
          )
        });
    }
    | _ => {}
  }

  if let Some(target) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today, target
    ));
  }

  if let Some(month) =
    parse_month_name(&lower)
  {
    let mut year = today.year();
    if month <= today.month() {
      year = year.saturating_add(1);
    }
    return NaiveDate::from_ymd_opt(
      year, month, 1
    )
    .ok_or_else(|| {
      anyhow!(
        "invalid month/year \
         candidate: {year}-{month}"
      )
    });
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: u64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let days = match caps
      .name("unit")
      .map(|m| m.as_str())
    {
      | Some("d") => num,
      | Some("w") => num.saturating_mul(7),
      | other => {
        return Err(anyhow!(
          "unknown relative unit: \
           {other:?}"
        ));
      }
    };

    let shifted = if sign == "-" {
      today
        .checked_sub_days(Days::new(days))
    } else {
      today
        .checked_add_days(Days::new(days))
    };
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative date out of range: \
         {token}"
      )
    });
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(date);
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     today/tomorrow/yesterday, \
     weekday names (e.g. monday), \
     month names (e.g. march), \
     +Nd/+Nw/-Nd/-Nw, YYYY-MM-DD"
  })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
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

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as u64;
  let target_idx = target
    .num_days_from_monday()
    as u64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_days(Days::new(delta))
    .unwrap_or(from)
}

fn parse_month_name(
  token: &str
) -> Option<u32> {
  match token.trim() {
    | "january" | "jan" => Some(1),
    | "february" | "feb" => Some(2),
    | "march" | "mar" => Some(3),
    | "april" | "apr" => Some(4),
    | "may" => Some(5),
    | "june" | "jun" => Some(6),
    | "july" | "jul" => Some(7),
    | "august" | "aug" => Some(8),
    | "september" | "sep" | "sept" => {
      Some(9)
    }
    | "october" | "oct" => Some(10),
    | "november" | "nov" => Some(11),
    | "december" | "dec" => Some(12),
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    parse_due_date,
    today_in
  };

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn parses_keywords() {
    let today = day(2026, 2, 17);
    assert_eq!(
      parse_due_date("today", today)
        .expect("today"),
      today
    );
    assert_eq!(
      parse_due_date("Tomorrow", today)
        .expect("tomorrow"),
      day(2026, 2, 18)
    );
    assert_eq!(
      parse_due_date("yesterday", today)
        .expect("yesterday"),
      day(2026, 2, 16)
    );
  }

  #[test]
  fn parses_weekday_name() {
    // 2026-02-17 is a Tuesday
    let today = day(2026, 2, 17);
    assert_eq!(
      parse_due_date("wednesday", today)
        .expect("parse weekday"),
      day(2026, 2, 18)
    );
    assert_eq!(
      parse_due_date("tue", today)
        .expect("same weekday"),
      day(2026, 2, 24)
    );
  }

  #[test]
  fn parses_month_name() {
    let today = day(2026, 2, 17);
    assert_eq!(
      parse_due_date("march", today)
        .expect("parse month"),
      day(2026, 3, 1)
    );
    assert_eq!(
      parse_due_date("feb", today)
        .expect("rolls over"),
      day(2027, 2, 1)
    );
  }

  #[test]
  fn parses_relative_offsets() {
    let today = day(2026, 2, 17);
    assert_eq!(
      parse_due_date("+3d", today)
        .expect("days"),
      day(2026, 2, 20)
    );
    assert_eq!(
      parse_due_date("+2w", today)
        .expect("weeks"),
      day(2026, 3, 3)
    );
    assert_eq!(
      parse_due_date("-1d", today)
        .expect("past"),
      day(2026, 2, 16)
    );
    assert_eq!(
      parse_due_date("-1w", today)
        .expect("week back"),
      day(2026, 2, 10)
    );
  }

  #[test]
  fn parses_iso_and_rejects_garbage() {
    let today = day(2026, 2, 17);
    assert_eq!(
      parse_due_date(
        "2026-12-31",
        today
      )
      .expect("iso"),
      day(2026, 12, 31)
    );
    assert!(
      parse_due_date("someday", today)
        .is_err()
    );
  }

  #[test]
  fn today_follows_timezone() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 3, 0, 0
      )
      .single()
      .expect("valid now");
    assert_eq!(
      today_in(
        Some(chrono_tz::America::Mexico_City),
        now
      ),
      day(2026, 2, 16)
    );
    assert_eq!(
      today_in(Some(chrono_tz::UTC), now),
      day(2026, 2, 17)
    );
  }
}

pub mod due_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  const FORMAT: &str = "%Y-%m-%d";

  pub fn serialize<S>(
    date: &Option<NaiveDate>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match date {
      | Some(value) => {
        serializer.serialize_str(
          &value
            .format(FORMAT)
            .to_string()
        )
      }
      | None => serializer.serialize_none()
    }
  }

  /// Empty strings read as "no due
  /// date".
  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<NaiveDate>, D::Error>
  where
    D: Deserializer<'de>
  {
    let opt =
      Option::<String>::deserialize(
        deserializer
      )?;
    match opt.as_deref().map(str::trim) {
      | None | Some("") => Ok(None),
      | Some(raw) => {
        NaiveDate::parse_from_str(
          raw, FORMAT
        )
        .map(Some)
        .map_err(serde::de::Error::custom)
      }
    }
  }
}
