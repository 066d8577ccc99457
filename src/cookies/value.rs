//! Typed cookie payloads.
//!
//! Every typed payload carries a 2-character tag:
//! `t:` text, `n:` number, `b:` boolean (`0`/`1`), `j:` JSON (including `null`).
//! A payload without a known tag decodes as raw text.

use serde::Serialize;
use serde_json::{Number, Value};

const TEXT_TAG: &str = "t:";
const NUMBER_TAG: &str = "n:";
const BOOL_TAG: &str = "b:";
const JSON_TAG: &str = "j:";

/// A value stored in a cookie.
#[derive(Debug, Clone, PartialEq)]
pub enum CookieValue {
    Text(String),
    Number(Number),
    Bool(bool),
    Json(Value),
    Null,
}

impl CookieValue {
    /// Serialize any value into its cookie representation.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::from)
    }

    /// Render the tagged wire payload.
    pub fn encode(&self) -> String {
        match self {
            CookieValue::Text(text) => format!("{TEXT_TAG}{text}"),
            CookieValue::Number(number) => format!("{NUMBER_TAG}{number}"),
            CookieValue::Bool(flag) => format!("{BOOL_TAG}{}", if *flag { "1" } else { "0" }),
            CookieValue::Json(value) => format!("{JSON_TAG}{value}"),
            CookieValue::Null => format!("{JSON_TAG}null"),
        }
    }

    /// Decode a tagged payload.
    ///
    /// Returns `None` when a recognized tag carries a corrupt payload
    /// (malformed JSON, non-numeric number). Unknown tags fall back to
    /// the whole string as text.
    pub fn decode(raw: &str) -> Option<Self> {
        let (Some(tag), Some(payload)) = (raw.get(..2), raw.get(2..)) else {
            return Some(CookieValue::Text(raw.to_string()));
        };

        match tag {
            TEXT_TAG => Some(CookieValue::Text(payload.to_string())),
            NUMBER_TAG => {
                let number = parse_number(payload);
                if number.is_none() {
                    tracing::warn!(payload = %payload, "Cookie number payload is not numeric");
                }
                number.map(CookieValue::Number)
            }
            BOOL_TAG => Some(CookieValue::Bool(payload == "1")),
            JSON_TAG => match serde_json::from_str::<Value>(payload) {
                Ok(Value::Null) => Some(CookieValue::Null),
                Ok(value) => Some(CookieValue::Json(value)),
                Err(e) => {
                    tracing::warn!(error = %e, "Cookie JSON payload could not be parsed");
                    None
                }
            },
            _ => Some(CookieValue::Text(raw.to_string())),
        }
    }

    /// Convert into a JSON value for typed extraction.
    pub fn into_json(self) -> Value {
        match self {
            CookieValue::Text(text) => Value::String(text),
            CookieValue::Number(number) => Value::Number(number),
            CookieValue::Bool(flag) => Value::Bool(flag),
            CookieValue::Json(value) => value,
            CookieValue::Null => Value::Null,
        }
    }
}

fn parse_number(payload: &str) -> Option<Number> {
    if let Ok(int) = payload.parse::<i64>() {
        return Some(Number::from(int));
    }
    if let Ok(uint) = payload.parse::<u64>() {
        return Some(Number::from(uint));
    }
    payload.parse::<f64>().ok().and_then(Number::from_f64)
}

impl From<Value> for CookieValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CookieValue::Null,
            Value::Bool(flag) => CookieValue::Bool(flag),
            Value::Number(number) => CookieValue::Number(number),
            Value::String(text) => CookieValue::Text(text),
            other => CookieValue::Json(other),
        }
    }
}

impl From<&str> for CookieValue {
    fn from(text: &str) -> Self {
        CookieValue::Text(text.to_string())
    }
}

impl From<String> for CookieValue {
    fn from(text: String) -> Self {
        CookieValue::Text(text)
    }
}

impl From<bool> for CookieValue {
    fn from(flag: bool) -> Self {
        CookieValue::Bool(flag)
    }
}

impl From<f64> for CookieValue {
    fn from(number: f64) -> Self {
        Number::from_f64(number).map_or(CookieValue::Null, CookieValue::Number)
    }
}

macro_rules! integer_cookie_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for CookieValue {
                fn from(number: $ty) -> Self {
                    CookieValue::Number(Number::from(number))
                }
            }
        )*
    };
}

integer_cookie_value!(i32, i64, u32, u64);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tags() {
        assert_eq!(CookieValue::from("hi").encode(), "t:hi");
        assert_eq!(CookieValue::from(42).encode(), "n:42");
        assert_eq!(CookieValue::from(1.5).encode(), "n:1.5");
        assert_eq!(CookieValue::from(true).encode(), "b:1");
        assert_eq!(CookieValue::from(false).encode(), "b:0");
        assert_eq!(CookieValue::Null.encode(), "j:null");
        assert_eq!(CookieValue::from(json!({"a": [1, 2]})).encode(), r#"j:{"a":[1,2]}"#);
    }

    #[test]
    fn test_integer_stays_integer() {
        let decoded = CookieValue::decode("n:42").unwrap();
        assert_eq!(decoded, CookieValue::Number(Number::from(42)));
        assert_eq!(decoded.into_json().as_i64(), Some(42));
    }

    #[test]
    fn test_unknown_tag_is_raw_text() {
        assert_eq!(
            CookieValue::decode("legacy-value"),
            Some(CookieValue::Text("legacy-value".into()))
        );
        assert_eq!(CookieValue::decode("x"), Some(CookieValue::Text("x".into())));
    }

    #[test]
    fn test_corrupt_payloads_are_absent() {
        assert_eq!(CookieValue::decode("j:{broken"), None);
        assert_eq!(CookieValue::decode("n:abc"), None);
    }

    #[test]
    fn test_json_null() {
        assert_eq!(CookieValue::decode("j:null"), Some(CookieValue::Null));
    }

    #[test]
    fn test_nan_is_null() {
        assert_eq!(CookieValue::from(f64::NAN), CookieValue::Null);
    }
}
