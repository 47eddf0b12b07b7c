//! Small shared utilities used across the router's components.

use std::time::Duration;

/// `serde` (de)serialization helpers for [`Duration`] fields in config
/// structs, accepting either a human string (`"30s"`, `"500ms"`, `"2m"`,
/// `"1h"`) or an explicit `{secs, nanos}` object.
pub mod duration_serde {
    use super::Duration;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs_f64()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        use serde_json::Value;

        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) => parse_duration_string(&s).map_err(Error::custom),
            Value::Number(n) => {
                let secs = n.as_f64().ok_or_else(|| Error::custom("invalid duration number"))?;
                Ok(Duration::from_secs_f64(secs))
            }
            Value::Object(obj) => {
                let secs = obj
                    .get("secs")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| Error::custom("missing 'secs' field"))?;
                let nanos = obj.get("nanos").and_then(|v| v.as_u64()).unwrap_or(0);
                Ok(Duration::new(secs, nanos as u32))
            }
            _ => Err(Error::custom("invalid duration format")),
        }
    }

    pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration string".to_string());
        }
        if let Some(stripped) = s.strip_suffix("ms") {
            let num: u64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {}", stripped))?;
            return Ok(Duration::from_millis(num));
        }
        if let Some(stripped) = s.strip_suffix('h') {
            let num: f64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {}", stripped))?;
            return Ok(Duration::from_secs_f64(num * 3600.0));
        }
        if let Some(stripped) = s.strip_suffix('m') {
            let num: f64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {}", stripped))?;
            return Ok(Duration::from_secs_f64(num * 60.0));
        }
        if let Some(stripped) = s.strip_suffix('s') {
            let num: f64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {}", stripped))?;
            return Ok(Duration::from_secs_f64(num));
        }
        Err(format!("unknown duration unit in '{}'", s))
    }

}
