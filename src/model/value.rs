//! Universal value type for the property graph and Cypher expression layer.
//!
//! Covers every kind in spec: scalars (null, bool, int, float, string),
//! composites (list, map), the graph result kinds (node, relationship,
//! path), and the temporal kinds (date, time, datetime, duration).

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration as ChronoDuration, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Node, Path, Relationship};
use crate::{Error, Result};

/// A Cypher value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),

    Node(Box<Node>),
    Relationship(Box<Relationship>),
    Path(Box<Path>),

    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime<Utc>),
    LocalDateTime(NaiveDateTime),
    Duration(IsoDuration),
}

/// months/days are calendar-aware, seconds/nanoseconds are absolute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsoDuration {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
    pub nanoseconds: i32,
}

impl IsoDuration {
    pub const ZERO: IsoDuration = IsoDuration { months: 0, days: 0, seconds: 0, nanoseconds: 0 };
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::List(_) => "LIST",
            Value::Map(_) => "MAP",
            Value::Node(_) => "NODE",
            Value::Relationship(_) => "RELATIONSHIP",
            Value::Path(_) => "PATH",
            Value::Date(_) => "DATE",
            Value::Time(_) => "TIME",
            Value::DateTime(_) => "DATETIME",
            Value::LocalDateTime(_) => "LOCAL_DATETIME",
            Value::Duration(_) => "DURATION",
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }
    pub fn is_numeric(&self) -> bool { matches!(self, Value::Int(_) | Value::Float(_)) }
    pub fn is_string(&self) -> bool { matches!(self, Value::String(_)) }

    /// Cypher truthiness: only used where a boolean is mandatory (e.g. `CASE WHEN`
    /// on a non-null/non-bool falls through to the ELSE branch, not here).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// `date`/`datetime` + `duration`, calendar-aware on months/days, absolute on
    /// the sub-day component. Resolves DESIGN NOTES' temporal-arithmetic open question.
    pub fn add_duration(&self, dur: &IsoDuration) -> Result<Value> {
        match self {
            Value::Date(d) => {
                let shifted = shift_date(*d, dur)?;
                Ok(Value::Date(shifted))
            }
            Value::DateTime(dt) => {
                let naive = shift_naive_datetime(dt.naive_utc(), dur)?;
                Ok(Value::DateTime(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)))
            }
            Value::LocalDateTime(dt) => {
                Ok(Value::LocalDateTime(shift_naive_datetime(*dt, dur)?))
            }
            Value::Time(t) => {
                let nanos = dur.seconds * 1_000_000_000 + dur.nanoseconds as i64;
                Ok(Value::Time(*t + ChronoDuration::nanoseconds(nanos)))
            }
            other => Err(Error::TypeError {
                expected: "Date, Time, DateTime, or LocalDateTime".into(),
                got: other.type_name().into(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Property codec: canonical JSON, ISO-8601 sidecar for temporal kinds
    // ------------------------------------------------------------------

    /// Encode into the canonical JSON property codec. `decode(encode(v)) == v`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => json!(i),
            Value::Float(f) => json!(f),
            Value::String(s) => json!(s),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(m) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in m {
                    obj.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(obj)
            }
            Value::Date(d) => json!({"$kind": "date", "v": d.to_string()}),
            Value::Time(t) => json!({"$kind": "time", "v": t.to_string()}),
            Value::DateTime(dt) => json!({"$kind": "datetime", "v": dt.to_rfc3339()}),
            Value::LocalDateTime(dt) => json!({"$kind": "local_datetime", "v": dt.to_string()}),
            Value::Duration(d) => json!({
                "$kind": "duration",
                "months": d.months, "days": d.days,
                "seconds": d.seconds, "nanoseconds": d.nanoseconds
            }),
            // Graph types never round-trip through the property codec; they only
            // ever appear as expression-evaluation results, not as stored properties.
            Value::Node(_) | Value::Relationship(_) | Value::Path(_) => serde_json::Value::Null,
        }
    }

    /// Decode from the canonical JSON property codec.
    pub fn from_json(v: &serde_json::Value) -> Result<Value> {
        match v {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Float(f))
                } else {
                    Err(Error::TypeError { expected: "i64 or f64".into(), got: format!("unrepresentable number {n}") })
                }
            }
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            serde_json::Value::Array(items) => {
                Ok(Value::List(items.iter().map(Value::from_json).collect::<Result<_>>()?))
            }
            serde_json::Value::Object(obj) => {
                if let Some(kind) = obj.get("$kind").and_then(|k| k.as_str()) {
                    return Self::from_tagged_json(kind, obj);
                }
                let mut m = HashMap::new();
                for (k, val) in obj {
                    m.insert(k.clone(), Value::from_json(val)?);
                }
                Ok(Value::Map(m))
            }
        }
    }

    fn from_tagged_json(kind: &str, obj: &serde_json::Map<String, serde_json::Value>) -> Result<Value> {
        let get_str = |k: &str| -> Result<&str> {
            obj.get(k).and_then(|v| v.as_str())
                .ok_or_else(|| Error::TypeError { expected: format!("field '{k}'"), got: "missing".into() })
        };
        match kind {
            "date" => {
                let d: NaiveDate = get_str("v")?.parse()
                    .map_err(|e| Error::TypeError { expected: "ISO-8601 date".into(), got: format!("{e}") })?;
                Ok(Value::Date(d))
            }
            "time" => {
                let t: NaiveTime = get_str("v")?.parse()
                    .map_err(|e| Error::TypeError { expected: "ISO-8601 time".into(), got: format!("{e}") })?;
                Ok(Value::Time(t))
            }
            "datetime" => {
                let dt: DateTime<Utc> = get_str("v")?.parse()
                    .map_err(|e| Error::TypeError { expected: "RFC-3339 datetime".into(), got: format!("{e}") })?;
                Ok(Value::DateTime(dt))
            }
            "local_datetime" => {
                let dt: NaiveDateTime = NaiveDateTime::parse_from_str(get_str("v")?, "%Y-%m-%d %H:%M:%S%.f")
                    .map_err(|e| Error::TypeError { expected: "local datetime".into(), got: format!("{e}") })?;
                Ok(Value::LocalDateTime(dt))
            }
            "duration" => {
                let get_i64 = |k: &str| obj.get(k).and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(Value::Duration(IsoDuration {
                    months: get_i64("months"),
                    days: get_i64("days"),
                    seconds: get_i64("seconds"),
                    nanoseconds: get_i64("nanoseconds") as i32,
                }))
            }
            other => Err(Error::TypeError { expected: "known temporal $kind".into(), got: other.to_string() }),
        }
    }
}

fn shift_date(d: NaiveDate, dur: &IsoDuration) -> Result<NaiveDate> {
    let with_months = if dur.months >= 0 {
        d.checked_add_months(Months::new(dur.months as u32))
    } else {
        d.checked_sub_months(Months::new((-dur.months) as u32))
    }
    .ok_or_else(|| Error::TypeError { expected: "date within representable range".into(), got: "overflow adding months".into() })?;
    with_months.checked_add_signed(ChronoDuration::days(dur.days))
        .ok_or_else(|| Error::TypeError { expected: "date within representable range".into(), got: "overflow adding days".into() })
}

fn shift_naive_datetime(dt: NaiveDateTime, dur: &IsoDuration) -> Result<NaiveDateTime> {
    let date = shift_date(dt.date(), dur)?;
    let time_delta = ChronoDuration::seconds(dur.seconds) + ChronoDuration::nanoseconds(dur.nanoseconds as i64);
    Ok(NaiveDateTime::new(date, dt.time()) + time_delta)
}

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(v as i64) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::String(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::String(v.to_owned()) } }
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self { Value::List(v.into_iter().map(Into::into).collect()) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Node(n) => write!(f, "{n:?}"),
            Value::Relationship(r) => write!(f, "{r:?}"),
            Value::Path(p) => write!(f, "{p:?}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::DateTime(dt) => write!(f, "{dt}"),
            Value::LocalDateTime(dt) => write!(f, "{dt}"),
            Value::Duration(d) => write!(f, "P{}M{}DT{}.{:09}S", d.months, d.days, d.seconds, d.nanoseconds),
        }
    }
}

// ============================================================================
// Comparison
// ============================================================================

/// Rank used by `cypher_total_cmp`'s total order: null last, then
/// bool < number < string < list < map < node < relationship < path.
fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Bool(_) => 0,
        Value::Int(_) | Value::Float(_) => 1,
        Value::String(_) => 2,
        Value::List(_) => 3,
        Value::Map(_) => 4,
        Value::Node(_) => 5,
        Value::Relationship(_) => 6,
        Value::Path(_) => 7,
        Value::Date(_) | Value::Time(_) | Value::DateTime(_) | Value::LocalDateTime(_) | Value::Duration(_) => 8,
        Value::Null => 9,
    }
}

impl Value {
    /// Cypher comparison operators (`< <= > >=`). Returns `None` ("null"
    /// propagation) whenever either side is null or the kinds don't compare.
    pub fn neo4j_cmp(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.partial_cmp(b),
            (Value::Time(a), Value::Time(b)) => a.partial_cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.partial_cmp(b),
            (Value::LocalDateTime(a), Value::LocalDateTime(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    /// Structural/deep equality. Unlike `==` at the Cypher level, this treats
    /// `Null == Null` as a plain boolean fact (used by `DISTINCT`/grouping, not by
    /// the `=` operator, which goes through `neo4j_cmp`-style null propagation
    /// in the evaluator instead).
    pub fn structural_eq(&self, other: &Value) -> bool {
        self == other
    }

    /// A total order over every `Value` kind, used by `ORDER BY`. Never
    /// returns `None`; within a kind, falls back to `neo4j_cmp`/equality.
    pub fn cypher_total_cmp(&self, other: &Value) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        let (ra, rb) = (kind_rank(self), kind_rank(other));
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let c = x.cypher_total_cmp(y);
                    if c != Ordering::Equal { return c; }
                }
                a.len().cmp(&b.len())
            }
            (Value::Map(a), Value::Map(b)) => {
                let mut ak: Vec<_> = a.keys().collect();
                let mut bk: Vec<_> = b.keys().collect();
                ak.sort();
                bk.sort();
                ak.cmp(&bk)
            }
            (Value::Node(a), Value::Node(b)) => a.id.0.cmp(&b.id.0),
            (Value::Relationship(a), Value::Relationship(b)) => a.id.0.cmp(&b.id.0),
            (Value::Path(a), Value::Path(b)) => a.len().cmp(&b.len()),
            _ => self.neo4j_cmp(other).unwrap_or(Ordering::Equal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from("hello"), Value::String("hello".into()));
        assert_eq!(Value::from(42), Value::Int(42));
        assert_eq!(Value::from(3.14), Value::Float(3.14));
        assert_eq!(Value::from(true), Value::Bool(true));
    }

    #[test]
    fn test_null_comparison() {
        assert_eq!(Value::Null.neo4j_cmp(&Value::Null), None);
        assert_eq!(Value::Null.neo4j_cmp(&Value::Int(1)), None);
    }

    #[test]
    fn test_numeric_comparison() {
        assert_eq!(
            Value::Int(1).neo4j_cmp(&Value::Float(1.5)),
            Some(std::cmp::Ordering::Less)
        );
    }

    #[test]
    fn test_total_order_null_last() {
        let mut values = vec![Value::Int(1), Value::Null, Value::String("a".into()), Value::Bool(true)];
        values.sort_by(Value::cypher_total_cmp);
        assert_eq!(values, vec![
            Value::Bool(true),
            Value::Int(1),
            Value::String("a".into()),
            Value::Null,
        ]);
    }

    #[test]
    fn test_codec_roundtrip_scalars() {
        for v in [Value::Null, Value::Bool(true), Value::Int(7), Value::Float(1.5), Value::String("x".into())] {
            assert_eq!(Value::from_json(&v.to_json()).unwrap(), v);
        }
    }

    #[test]
    fn test_codec_roundtrip_temporal() {
        let d = Value::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(Value::from_json(&d.to_json()).unwrap(), d);
    }

    #[test]
    fn test_date_plus_duration_calendar_aware() {
        let d = Value::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        let dur = IsoDuration { months: 1, days: 0, seconds: 0, nanoseconds: 0 };
        let shifted = d.add_duration(&dur).unwrap();
        // chrono clamps Jan 31 + 1 month to the last valid day of February.
        assert_eq!(shifted, Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
    }
}
