//! Casters for simple scalar column types.
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::{CastError, TypeCaster, Value};

/// Signed integer column with a byte limit (2, 4 or 8).
#[derive(Debug, Clone, Copy)]
pub struct IntegerCaster {
    limit: u32,
}

impl IntegerCaster {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.clamp(1, 8),
        }
    }

    fn range(&self) -> (i64, i64) {
        if self.limit >= 8 {
            (i64::MIN, i64::MAX)
        } else {
            let max = (1i64 << (self.limit * 8 - 1)) - 1;
            (-max - 1, max)
        }
    }

    fn check(&self, n: i64) -> Result<Value, CastError> {
        let (min, max) = self.range();
        if n < min || n > max {
            return Err(CastError::OutOfRange {
                value: n.to_string(),
                sql_type: self.sql_type().to_string(),
            });
        }
        Ok(Value::Integer(n))
    }
}

impl TypeCaster for IntegerCaster {
    fn sql_type(&self) -> &str {
        match self.limit {
            1 | 2 => "smallint",
            3 | 4 => "integer",
            _ => "bigint",
        }
    }

    fn serialize(&self, value: &Value) -> Result<Value, CastError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Integer(n) => self.check(*n),
            Value::Bool(b) => Ok(Value::Integer(i64::from(*b))),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                if *f < i64::MIN as f64 || *f >= i64::MAX as f64 {
                    return Err(CastError::OutOfRange {
                        value: f.to_string(),
                        sql_type: self.sql_type().to_string(),
                    });
                }
                self.check(*f as i64)
            }
            Value::Text(s) => match s.trim().parse::<i64>() {
                Ok(n) => self.check(n),
                Err(_) => Err(CastError::invalid(value, self.sql_type())),
            },
            other => Err(CastError::invalid(other, self.sql_type())),
        }
    }
}

/// `double precision` and friends.
#[derive(Debug, Clone, Copy)]
pub struct FloatCaster;

impl TypeCaster for FloatCaster {
    fn sql_type(&self) -> &str {
        "float8"
    }

    fn serialize(&self, value: &Value) -> Result<Value, CastError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Integer(n) => Ok(Value::Float(*n as f64)),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| CastError::invalid(value, self.sql_type())),
            other => Err(CastError::invalid(other, self.sql_type())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BooleanCaster;

impl TypeCaster for BooleanCaster {
    fn sql_type(&self) -> &str {
        "boolean"
    }

    fn serialize(&self, value: &Value) -> Result<Value, CastError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Integer(0) => Ok(Value::Bool(false)),
            Value::Integer(1) => Ok(Value::Bool(true)),
            Value::Text(s) => match s.trim().to_lowercase().as_str() {
                "t" | "true" | "y" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "f" | "false" | "n" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(CastError::invalid(value, self.sql_type())),
            },
            other => Err(CastError::invalid(other, self.sql_type())),
        }
    }
}

/// Character types. Every scalar has a text form; binary data does not.
#[derive(Debug, Clone, Copy)]
pub struct TextCaster;

impl TypeCaster for TextCaster {
    fn sql_type(&self) -> &str {
        "text"
    }

    fn serialize(&self, value: &Value) -> Result<Value, CastError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Text(s) => Ok(Value::Text(s.clone())),
            Value::Bytes(_) | Value::Array(_) => Err(CastError::invalid(value, self.sql_type())),
            other => Ok(Value::Text(other.to_text().unwrap_or_default())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DateCaster;

impl TypeCaster for DateCaster {
    fn sql_type(&self) -> &str {
        "date"
    }

    fn serialize(&self, value: &Value) -> Result<Value, CastError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Date(d) => Ok(Value::Date(*d)),
            Value::Timestamp(ts) => Ok(Value::Date(ts.date())),
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| CastError::invalid(value, self.sql_type())),
            other => Err(CastError::invalid(other, self.sql_type())),
        }
    }
}

/// `timestamp without time zone`.
#[derive(Debug, Clone, Copy)]
pub struct TimestampCaster;

const TIMESTAMP_INPUT_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

impl TypeCaster for TimestampCaster {
    fn sql_type(&self) -> &str {
        "timestamp"
    }

    fn serialize(&self, value: &Value) -> Result<Value, CastError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Timestamp(ts) => Ok(Value::Timestamp(*ts)),
            Value::Date(d) => Ok(Value::Timestamp(d.and_time(NaiveTime::MIN))),
            Value::Text(s) => TIMESTAMP_INPUT_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
                .map(Value::Timestamp)
                .ok_or_else(|| CastError::invalid(value, self.sql_type())),
            other => Err(CastError::invalid(other, self.sql_type())),
        }
    }
}
