use anyhow::anyhow;
use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Utc,
  Weekday
};
use chrono_tz::Tz;

const DAY_NAMES: [&str; 7] = [
  "Sunday",
  "Monday",
  "Tuesday",
  "Wednesday",
  "Thursday",
  "Friday",
  "Saturday"
];

const MONTH_NAMES: [&str; 12] = [
  "January",
  "February",
  "March",
  "April",
  "May",
  "June",
  "July",
  "August",
  "September",
  "October",
  "November",
  "December"
];

const WALL_CLOCK_FORMATS: [&str; 4] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%d %H:%M"
];

/// Current calendar date, in `timezone` when one is configured and in the
/// system zone otherwise.
#[must_use]
pub fn today(
  timezone: Option<&Tz>
) -> NaiveDate {
  match timezone {
    | Some(tz) => {
      Utc::now()
        .with_timezone(tz)
        .date_naive()
    }
    | None => Local::now().date_naive()
  }
}

pub fn parse_timezone(
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
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured calendar timezone"
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

/// ISO-8601 week number (Monday start, week 1 holds the year's first
/// Thursday).
///
/// Only used for labels. Grid rows are Sunday-start, see
/// [`start_of_week_sunday`].
#[must_use]
pub fn iso_week(date: NaiveDate) -> u32 {
  let iso_weekday = i64::from(
    date.weekday().number_from_monday()
  );
  let thursday =
    add_days(date, 4 - iso_weekday);
  let year_start = NaiveDate::from_ymd_opt(
    thursday.year(),
    1,
    1
  )
  .unwrap_or(thursday);
  let days_since =
    (thursday - year_start).num_days();
  // ceil((days_since + 1) / 7)
  ((days_since + 7) / 7) as u32
}

/// First day (Sunday) of the display week containing `day`.
#[must_use]
pub fn start_of_week_sunday(
  day: NaiveDate
) -> NaiveDate {
  let diff = i64::from(
    day
      .weekday()
      .num_days_from_sunday()
  );
  add_days(day, -diff)
}

#[must_use]
pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

#[must_use]
pub fn first_day_of_month(
  year: i32,
  month: u32
) -> Option<NaiveDate> {
  NaiveDate::from_ymd_opt(year, month, 1)
}

#[must_use]
pub fn is_today(
  when: &NaiveDateTime,
  today: NaiveDate
) -> bool {
  when.date() == today
}

/// Strictly after `today`, comparing calendar dates only.
#[must_use]
pub fn is_upcoming(
  when: &NaiveDateTime,
  today: NaiveDate
) -> bool {
  when.date() > today
}

#[must_use]
pub fn day_name(
  weekday: Weekday
) -> &'static str {
  DAY_NAMES[weekday.num_days_from_sunday()
    as usize]
}

/// English month name for a 1-indexed month; empty when out of range.
#[must_use]
pub fn month_name(
  month: u32
) -> &'static str {
  month
    .checked_sub(1)
    .and_then(|idx| {
      MONTH_NAMES.get(idx as usize)
    })
    .copied()
    .unwrap_or_default()
}

/// "Mar 1, 2024"
#[must_use]
pub fn format_date(
  date: NaiveDate
) -> String {
  date.format("%b %-d, %Y").to_string()
}

/// "3:05 PM"
#[must_use]
pub fn format_time(
  when: &NaiveDateTime
) -> String {
  when.format("%-I:%M %p").to_string()
}

/// Minute-precision form used by date-time inputs, "2024-03-01T15:05".
#[must_use]
pub fn to_local_input(
  when: &NaiveDateTime
) -> String {
  when
    .format("%Y-%m-%dT%H:%M")
    .to_string()
}

/// Parses a wall-clock timestamp. Accepts ISO-8601 with or without
/// seconds, a bare date (midnight) or RFC 3339, whose offset is dropped.
pub fn parse_wall_clock(
  raw: &str
) -> Option<NaiveDateTime> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  for fmt in WALL_CLOCK_FORMATS {
    if let Ok(parsed) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Some(parsed);
    }
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Some(
      date.and_time(NaiveTime::MIN)
    );
  }

  DateTime::parse_from_rfc3339(token)
    .ok()
    .map(|dt| dt.naive_local())
}

/// Parses an RFC 3339 instant, or a naive ISO-8601 one taken as UTC.
pub fn parse_utc_timestamp(
  raw: &str
) -> Option<DateTime<Utc>> {
  let token = raw.trim();
  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(dt.with_timezone(&Utc));
  }

  WALL_CLOCK_FORMATS
    .iter()
    .find_map(|fmt| {
      NaiveDateTime::parse_from_str(
        token, fmt
      )
      .ok()
    })
    .map(|ndt| ndt.and_utc())
}

/// Date input from the command line: `today`, `tomorrow`, `YYYY-MM-DD` or
/// a wall-clock timestamp.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date_input(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDateTime> {
  let token = input.trim();
  let lower = token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => {
      return Ok(
        today.and_time(NaiveTime::MIN)
      );
    }
    | "tomorrow" => {
      return Ok(
        add_days(today, 1)
          .and_time(NaiveTime::MIN)
      );
    }
    | _ => {}
  }

  parse_wall_clock(token).ok_or_else(
    || {
      anyhow!(
        "unrecognized date: {token} \
         (expected today, tomorrow, \
         YYYY-MM-DD or \
         YYYY-MM-DDTHH:MM)"
      )
    }
  )
}


pub mod utc_timestamp_serde {
  use chrono::{
    DateTime,
    SecondsFormat,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.to_rfc3339_opts(
        SecondsFormat::AutoSi,
        true
      )
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_utc_timestamp(&raw)
      .ok_or_else(|| {
        serde::de::Error::custom(
          format!(
            "invalid timestamp: {raw}"
          )
        )
      })
  }
}

pub mod wall_clock_serde {
  pub mod option {
    use chrono::NaiveDateTime;
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<NaiveDateTime>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          serializer.serialize_str(
            &value
              .format(
                "%Y-%m-%dT%H:%M:%S%.f"
              )
              .to_string()
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<NaiveDateTime>,
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
        | Some(raw)
          if raw.trim().is_empty() =>
        {
          Ok(None)
        }
        | Some(raw) => {
          crate::datetime::parse_wall_clock(
            &raw
          )
          .map(Some)
          .ok_or_else(|| {
            serde::de::Error::custom(
              format!(
                "invalid date-time: \
                 {raw}"
              )
            )
          })
        }
        | None => Ok(None)
      }
    }
  }
}
