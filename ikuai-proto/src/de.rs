//! Lenient deserializers for counters the appliance reports loosely typed.
//!
//! Depending on firmware a counter may arrive as a number, a float or a
//! numeric string. Anything negative or unparsable becomes `0`.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};

struct LenientU64;

impl<'de> Visitor<'de> for LenientU64 {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative number or numeric string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        Ok(u64::try_from(v).unwrap_or(0))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<u64, E> {
        // `as` saturates and maps NaN to 0
        Ok(if v > 0.0 { v as u64 } else { 0 })
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        let v = v.trim();
        Ok(v.parse::<u64>()
            .ok()
            .or_else(|| v.parse::<f64>().ok().map(|f| if f > 0.0 { f as u64 } else { 0 }))
            .unwrap_or(0))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<u64, E> {
        Ok(v as u64)
    }

    fn visit_unit<E: de::Error>(self) -> Result<u64, E> {
        Ok(0)
    }
}

struct LenientF64;

impl<'de> Visitor<'de> for LenientF64 {
    type Value = f64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number or numeric string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
        Ok(v)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
        Ok(v.trim().parse::<f64>().ok().filter(|f| f.is_finite()).unwrap_or(0.0))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<f64, E> {
        Ok(u8::from(v).into())
    }

    fn visit_unit<E: de::Error>(self) -> Result<f64, E> {
        Ok(0.0)
    }
}

/// Deserialize a counter from a number or a numeric string.
pub fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientU64)
}

/// Like [`lenient_u64`], keeping fractions and sign.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientF64)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Counter {
        #[serde(deserialize_with = "super::lenient_u64")]
        value: u64,
    }

    fn parse(json: &str) -> u64 {
        serde_json::from_str::<Counter>(json).unwrap().value
    }

    #[test]
    fn accepts_numbers_and_strings() {
        assert_eq!(parse(r#"{"value": 42}"#), 42);
        assert_eq!(parse(r#"{"value": "42"}"#), 42);
        assert_eq!(parse(r#"{"value": " 7 "}"#), 7);
        assert_eq!(parse(r#"{"value": 12.9}"#), 12);
        assert_eq!(parse(r#"{"value": "3.5"}"#), 3);
    }

    #[derive(Debug, Deserialize)]
    struct Volume {
        #[serde(deserialize_with = "super::lenient_f64")]
        value: f64,
    }

    fn parse_f64(json: &str) -> f64 {
        serde_json::from_str::<Volume>(json).unwrap().value
    }

    #[test]
    fn floats_from_numbers_and_strings() {
        assert_eq!(parse_f64(r#"{"value": 1048576}"#), 1048576.0);
        assert_eq!(parse_f64(r#"{"value": 2.5}"#), 2.5);
        assert_eq!(parse_f64(r#"{"value": "2097152"}"#), 2097152.0);
        assert_eq!(parse_f64(r#"{"value": "n/a"}"#), 0.0);
        assert_eq!(parse_f64(r#"{"value": "NaN"}"#), 0.0);
        assert_eq!(parse_f64(r#"{"value": null}"#), 0.0);
    }

    #[test]
    fn malformed_values_become_zero() {
        assert_eq!(parse(r#"{"value": "abc"}"#), 0);
        assert_eq!(parse(r#"{"value": ""}"#), 0);
        assert_eq!(parse(r#"{"value": -5}"#), 0);
        assert_eq!(parse(r#"{"value": null}"#), 0);
    }
}
