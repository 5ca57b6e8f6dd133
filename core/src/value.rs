//! Cell values and the wire codec.
//!
//! Every cell mutation carries its payload as a `(data_type, value)` string
//! pair. [`Value`] is the typed view of that pair: encoding is exact,
//! decoding is lossy best-effort so the cell view stays populated even when
//! producers and consumers disagree on the tag.

use chrono::{DateTime, FixedOffset, Utc};

/// Wire tags for the built-in value kinds.
pub mod tag {
    pub const NULL: &str = "null";
    pub const STRING: &str = "string";
    pub const INT: &str = "int";
    pub const DOUBLE: &str = "double";
    pub const BOOL: &str = "bool";
    pub const DATETIME: &str = "datetime";
    pub const JSON: &str = "json";
}

/// A typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Real(f64),
    Bool(bool),
    DateTime(DateTime<FixedOffset>),
    Json(serde_json::Value),
    /// Escape hatch: an opaque payload under a caller-chosen tag.
    /// Encodes verbatim; unknown tags decode back as [`Value::Text`].
    Tagged { data_type: String, raw: String },
}

impl Value {
    /// Encode into the wire pair.
    ///
    /// | kind | tag | value string |
    /// |------|-----|--------------|
    /// | `Null` | `null` | empty |
    /// | `Text` | `string` | verbatim |
    /// | `Int` | `int` | decimal |
    /// | `Real` | `double` | shortest round-trip form |
    /// | `Bool` | `bool` | `1` / `0` |
    /// | `DateTime` | `datetime` | RFC 3339 with offset |
    /// | `Json` | `json` | canonical JSON |
    /// | `Tagged` | caller's | verbatim |
    pub fn encode(&self) -> (String, String) {
        match self {
            Value::Null => (tag::NULL.to_string(), String::new()),
            Value::Text(text) => (tag::STRING.to_string(), text.clone()),
            Value::Int(n) => (tag::INT.to_string(), n.to_string()),
            Value::Real(f) => (tag::DOUBLE.to_string(), f.to_string()),
            Value::Bool(b) => (
                tag::BOOL.to_string(),
                if *b { "1" } else { "0" }.to_string(),
            ),
            Value::DateTime(dt) => (tag::DATETIME.to_string(), dt.to_rfc3339()),
            Value::Json(v) => (tag::JSON.to_string(), v.to_string()),
            Value::Tagged { data_type, raw } => (data_type.clone(), raw.clone()),
        }
    }

    /// Decode from the wire pair, best-effort.
    ///
    /// Unparseable numerics fall back to zero, unparseable datetimes to
    /// `Null`, unparseable JSON and unknown tags to the raw text. Decoding
    /// never fails.
    pub fn decode(data_type: &str, raw: &str) -> Value {
        match data_type {
            tag::NULL => Value::Null,
            "" if raw.is_empty() => Value::Null,
            "" | tag::STRING => Value::Text(raw.to_string()),
            tag::INT => Value::Int(raw.parse().unwrap_or(0)),
            tag::DOUBLE => Value::Real(raw.parse().unwrap_or(0.0)),
            tag::BOOL => Value::Bool(raw == "1" || raw.eq_ignore_ascii_case("true")),
            tag::DATETIME => DateTime::parse_from_rfc3339(raw)
                .map(Value::DateTime)
                .unwrap_or(Value::Null),
            tag::JSON => serde_json::from_str(raw)
                .map(Value::Json)
                .unwrap_or_else(|_| Value::Text(raw.to_string())),
            _ => Value::Text(raw.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt.fixed_offset())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_table() {
        assert_eq!(Value::Null.encode(), ("null".into(), "".into()));
        assert_eq!(
            Value::from("hello").encode(),
            ("string".into(), "hello".into())
        );
        assert_eq!(Value::Int(-42).encode(), ("int".into(), "-42".into()));
        assert_eq!(Value::Bool(true).encode(), ("bool".into(), "1".into()));
        assert_eq!(Value::Bool(false).encode(), ("bool".into(), "0".into()));
        assert_eq!(
            Value::Json(json!({"a": [1, 2]})).encode(),
            ("json".into(), r#"{"a":[1,2]}"#.into())
        );
    }

    #[test]
    fn encode_tagged_passthrough() {
        let value = Value::Tagged {
            data_type: "geo-point".into(),
            raw: "52.52,13.40".into(),
        };
        assert_eq!(value.encode(), ("geo-point".into(), "52.52,13.40".into()));
        // unknown tags come back as raw text; the message keeps the tag
        assert_eq!(
            Value::decode("geo-point", "52.52,13.40"),
            Value::Text("52.52,13.40".into())
        );
    }

    #[test]
    fn decode_null_forms() {
        assert_eq!(Value::decode("null", ""), Value::Null);
        assert_eq!(Value::decode("null", "ignored"), Value::Null);
        assert_eq!(Value::decode("", ""), Value::Null);
        assert_eq!(Value::decode("", "text"), Value::Text("text".into()));
    }

    #[test]
    fn decode_int_lossy() {
        assert_eq!(Value::decode("int", "17"), Value::Int(17));
        assert_eq!(Value::decode("int", "-9"), Value::Int(-9));
        assert_eq!(Value::decode("int", "not a number"), Value::Int(0));
        assert_eq!(Value::decode("int", ""), Value::Int(0));
    }

    #[test]
    fn decode_double_lossy() {
        assert_eq!(Value::decode("double", "2.5"), Value::Real(2.5));
        assert_eq!(Value::decode("double", "junk"), Value::Real(0.0));
    }

    #[test]
    fn double_roundtrip_finite() {
        let cases = [
            0.0,
            -0.0,
            1.5,
            std::f64::consts::PI,
            f64::MAX,
            f64::MIN,
            f64::MIN_POSITIVE,
            1e-300,
        ];
        for f in cases {
            let (data_type, raw) = Value::Real(f).encode();
            let decoded = Value::decode(&data_type, &raw);
            match decoded {
                Value::Real(back) => assert_eq!(back.to_bits(), f.to_bits(), "{f}"),
                other => panic!("expected Real, got {other:?}"),
            }
        }
    }

    #[test]
    fn double_roundtrip_non_finite() {
        for f in [f64::INFINITY, f64::NEG_INFINITY] {
            let (data_type, raw) = Value::Real(f).encode();
            assert_eq!(Value::decode(&data_type, &raw), Value::Real(f));
        }
        let (data_type, raw) = Value::Real(f64::NAN).encode();
        match Value::decode(&data_type, &raw) {
            Value::Real(back) => assert!(back.is_nan()),
            other => panic!("expected Real, got {other:?}"),
        }
    }

    #[test]
    fn decode_bool_forms() {
        assert_eq!(Value::decode("bool", "1"), Value::Bool(true));
        assert_eq!(Value::decode("bool", "true"), Value::Bool(true));
        assert_eq!(Value::decode("bool", "TRUE"), Value::Bool(true));
        assert_eq!(Value::decode("bool", "0"), Value::Bool(false));
        assert_eq!(Value::decode("bool", "yes"), Value::Bool(false));
        assert_eq!(Value::decode("bool", ""), Value::Bool(false));
    }

    #[test]
    fn datetime_roundtrip_keeps_offset() {
        let dt = DateTime::parse_from_rfc3339("2024-03-01T09:30:00+05:30").unwrap();
        let (data_type, raw) = Value::DateTime(dt).encode();
        assert_eq!(data_type, "datetime");
        assert_eq!(Value::decode(&data_type, &raw), Value::DateTime(dt));
    }

    #[test]
    fn decode_datetime_unparseable_is_null() {
        assert_eq!(Value::decode("datetime", "last tuesday"), Value::Null);
        assert_eq!(Value::decode("datetime", ""), Value::Null);
    }

    #[test]
    fn json_roundtrip() {
        let v = json!({"items": [1, 2, 3], "nested": {"ok": true}});
        let (data_type, raw) = Value::Json(v.clone()).encode();
        assert_eq!(Value::decode(&data_type, &raw), Value::Json(v));
    }

    #[test]
    fn decode_json_unparseable_falls_back_to_text() {
        assert_eq!(
            Value::decode("json", "{not json"),
            Value::Text("{not json".into())
        );
    }

    #[test]
    fn decode_unknown_tag_is_raw_text() {
        assert_eq!(
            Value::decode("duration", "PT5M"),
            Value::Text("PT5M".into())
        );
    }

    #[test]
    fn from_conversions() {
        assert_eq!(Value::from(7i32), Value::Int(7));
        assert_eq!(Value::from(7i64), Value::Int(7));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from("x".to_string()), Value::Text("x".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Int(3));
    }
}
