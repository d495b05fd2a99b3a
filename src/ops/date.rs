use crate::error::EvalError;
use crate::expr::{DatePart, DateUnit};
use crate::value::Value;
use chrono::{
    DateTime, Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta,
    Timelike, Utc,
};

pub fn now(utc: bool) -> Value {
    if utc {
        Value::DateTime(Utc::now().fixed_offset())
    } else {
        Value::DateTime(Local::now().fixed_offset())
    }
}

fn mismatch(op: &str, v: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.to_string(),
        detail: v.type_name().to_string(),
    }
}

fn truncate_date(unit: DateUnit, d: NaiveDate) -> Option<NaiveDate> {
    match unit {
        DateUnit::Year => NaiveDate::from_ymd_opt(d.year(), 1, 1),
        DateUnit::Quarter => NaiveDate::from_ymd_opt(d.year(), 3 * ((d.month() - 1) / 3) + 1, 1),
        DateUnit::Month => NaiveDate::from_ymd_opt(d.year(), d.month(), 1),
        DateUnit::Week => {
            d.checked_sub_signed(TimeDelta::days(i64::from(d.weekday().num_days_from_monday())))
        }
        DateUnit::Day | DateUnit::Date => Some(d),
        DateUnit::Hour | DateUnit::Minute | DateUnit::Second | DateUnit::Time => None,
    }
}

fn truncate_time(unit: DateUnit, t: NaiveTime) -> Option<NaiveTime> {
    match unit {
        DateUnit::Hour => NaiveTime::from_hms_opt(t.hour(), 0, 0),
        DateUnit::Minute => NaiveTime::from_hms_opt(t.hour(), t.minute(), 0),
        DateUnit::Second | DateUnit::Time => {
            NaiveTime::from_hms_opt(t.hour(), t.minute(), t.second())
        }
        _ => None,
    }
}

fn truncate_naive(unit: DateUnit, dt: NaiveDateTime) -> Option<NaiveDateTime> {
    match unit {
        DateUnit::Hour | DateUnit::Minute | DateUnit::Second => {
            Some(dt.date().and_time(truncate_time(unit, dt.time())?))
        }
        other => truncate_date(other, dt.date())?.and_hms_opt(0, 0, 0),
    }
}

/// Truncates to the start of `unit`. Datetimes keep their offset; `date`
/// and `time` units convert to the matching value kind.
pub fn trunc(unit: DateUnit, v: &Value) -> Result<Value, EvalError> {
    let out_of_range = || EvalError::Domain { op: "trunc" };
    match v {
        Value::Null => Ok(Value::Null),
        Value::DateTime(dt) => match unit {
            DateUnit::Date => Ok(Value::Date(dt.date_naive())),
            DateUnit::Time => Ok(Value::Time(dt.time())),
            _ => {
                let local = truncate_naive(unit, dt.naive_local()).ok_or_else(out_of_range)?;
                let offset: FixedOffset = *dt.offset();
                let truncated: DateTime<FixedOffset> =
                    local.and_local_timezone(offset).single().ok_or_else(out_of_range)?;
                Ok(Value::DateTime(truncated))
            }
        },
        Value::Date(d) => truncate_date(unit, *d)
            .map(Value::Date)
            .ok_or_else(|| mismatch("trunc", v)),
        Value::Time(t) => truncate_time(unit, *t)
            .map(Value::Time)
            .ok_or_else(|| mismatch("trunc", v)),
        other => Err(mismatch("trunc", other)),
    }
}

fn date_part(part: DatePart, d: NaiveDate) -> Option<i64> {
    Some(i64::from(match part {
        DatePart::Year => d.year(),
        DatePart::IsoYear => d.iso_week().year(),
        DatePart::Quarter => ((d.month() + 2) / 3) as i32,
        DatePart::Month => d.month() as i32,
        DatePart::Week => d.iso_week().week() as i32,
        DatePart::Day => d.day() as i32,
        DatePart::WeekDay => (d.weekday().num_days_from_sunday() + 1) as i32,
        DatePart::IsoWeekDay => d.weekday().number_from_monday() as i32,
        DatePart::Hour | DatePart::Minute | DatePart::Second => return None,
    }))
}

fn time_part(part: DatePart, t: NaiveTime) -> Option<i64> {
    Some(i64::from(match part {
        DatePart::Hour => t.hour(),
        DatePart::Minute => t.minute(),
        DatePart::Second => t.second(),
        _ => return None,
    }))
}

/// Extracts a calendar component. `week_day` counts from Sunday = 1,
/// `iso_week_day` from Monday = 1.
pub fn extract(part: DatePart, v: &Value) -> Result<Value, EvalError> {
    let out = match v {
        Value::Null => return Ok(Value::Null),
        Value::DateTime(dt) => {
            let local = dt.naive_local();
            date_part(part, local.date()).or_else(|| time_part(part, local.time()))
        }
        Value::Date(d) => date_part(part, *d),
        Value::Time(t) => time_part(part, *t),
        other => return Err(mismatch("extract", other)),
    };
    out.map(Value::Int).ok_or_else(|| mismatch("extract", v))
}
