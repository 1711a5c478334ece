//! Gateway status payload: decoding and unit normalization.
//!
//! The appliance reports gateway quality as display strings (`"0.2 %"`,
//! `"12.3 ms"`, `"Online"`). This module turns the raw JSON body into typed
//! records and those records into numbers that can be exported as gauges.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Suffix of the loss field.
pub const PERCENT_SUFFIX: &str = " %";

/// Suffix of the delay and stddev fields.
pub const MILLIS_SUFFIX: &str = " ms";

/// `status_translated` value that marks a gateway as up.
pub const STATUS_ONLINE: &str = "Online";

/// The body could not be decoded into a [`GatewayStatusResponse`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to decode gateway status: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to decode gateway status: {0} is not a JSON object")]
    NotAnObject(&'static str),
}

/// A record field did not match `<number> <unit>`.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Gateway '{gateway}': {field} value {value:?} is missing the '{unit}' suffix")]
    MissingUnit {
        gateway: String,
        field: GatewayField,
        value: String,
        unit: &'static str,
    },
    #[error("Gateway '{gateway}': {field} value {value:?} is not a number: {source}")]
    InvalidNumber {
        gateway: String,
        field: GatewayField,
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },
}

/// Numeric fields of a gateway record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayField {
    Loss,
    Delay,
    Stddev,
}

impl GatewayField {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayField::Loss => "loss",
            GatewayField::Delay => "delay",
            GatewayField::Stddev => "stddev",
        }
    }

    fn unit(&self) -> &'static str {
        match self {
            GatewayField::Loss => PERCENT_SUFFIX,
            GatewayField::Delay | GatewayField::Stddev => MILLIS_SUFFIX,
        }
    }
}

impl std::fmt::Display for GatewayField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One gateway as reported by `/api/routes/gateway/status`.
///
/// Missing and `null` fields decode to empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub loss: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub delay: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stddev: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status_translated: String,
}

/// Top-level payload of the gateway status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayStatusResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<GatewayRecord>,
    /// Overall status reported by the API; informational only.
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
}

/// A gateway with every field converted to its numeric form.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedGateway {
    pub name: String,
    pub address: String,
    pub status_translated: String,
    pub loss_pct: f64,
    pub delay_ms: f64,
    pub stddev_ms: f64,
    pub up: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decode a raw response body.
///
/// The response and each entry of `items` must be JSON objects. serde would
/// otherwise accept arrays and bind their elements to fields by position.
pub fn decode(body: &[u8]) -> Result<GatewayStatusResponse, DecodeError> {
    let value: serde_json::Value = serde_json::from_slice(body)?;

    let Some(object) = value.as_object() else {
        return Err(DecodeError::NotAnObject("response"));
    };
    if let Some(items) = object.get("items").and_then(|v| v.as_array())
        && items.iter().any(|item| !item.is_object())
    {
        return Err(DecodeError::NotAnObject("gateway item"));
    }

    Ok(serde_json::from_value(value)?)
}

/// Normalize a single record.
pub fn normalize(record: &GatewayRecord) -> Result<NormalizedGateway, ParseError> {
    Ok(NormalizedGateway {
        name: record.name.clone(),
        address: record.address.clone(),
        status_translated: record.status_translated.clone(),
        loss_pct: parse_field(record, GatewayField::Loss, &record.loss)?,
        delay_ms: parse_field(record, GatewayField::Delay, &record.delay)?,
        stddev_ms: parse_field(record, GatewayField::Stddev, &record.stddev)?,
        up: is_online(&record.status_translated),
    })
}

/// Normalize a batch. The first failing record fails the whole batch.
pub fn normalize_all<'a, I>(records: I) -> Result<Vec<NormalizedGateway>, ParseError>
where
    I: IntoIterator<Item = &'a GatewayRecord>,
{
    records.into_iter().map(normalize).collect()
}

/// Exact, case-sensitive comparison against [`STATUS_ONLINE`].
pub fn is_online(status_translated: &str) -> bool {
    status_translated == STATUS_ONLINE
}

fn parse_field(record: &GatewayRecord, field: GatewayField, raw: &str) -> Result<f64, ParseError> {
    let unit = field.unit();
    let number = raw
        .strip_suffix(unit)
        .ok_or_else(|| ParseError::MissingUnit {
            gateway: record.name.clone(),
            field,
            value: raw.to_string(),
            unit,
        })?;

    number
        .parse::<f64>()
        .map_err(|source| ParseError::InvalidNumber {
            gateway: record.name.clone(),
            field,
            value: raw.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(loss: &str, delay: &str, stddev: &str, status: &str) -> GatewayRecord {
        GatewayRecord {
            name: "WAN_GW".to_string(),
            address: "203.0.113.1".to_string(),
            loss: loss.to_string(),
            delay: delay.to_string(),
            stddev: stddev.to_string(),
            status_translated: status.to_string(),
        }
    }

    #[test]
    fn test_decode_payload() {
        let body = br#"{
            "items": [
                {"name":"WAN_GW","address":"203.0.113.1","status":"none","loss":"0.0 %",
                 "delay":"14.2 ms","stddev":"1.1 ms","status_translated":"Online"},
                {"name":"WAN2_GW","address":"198.51.100.7","loss":"100.0 %",
                 "delay":"0.0 ms","stddev":"0.0 ms","status_translated":"Offline"}
            ],
            "status": "ok"
        }"#;

        let response = decode(body).unwrap();

        assert_eq!(response.status, "ok");
        assert_eq!(response.items.len(), 2);
        assert_eq!(response.items[0].name, "WAN_GW");
        assert_eq!(response.items[0].delay, "14.2 ms");
        assert_eq!(response.items[1].status_translated, "Offline");
    }

    #[test]
    fn test_decode_missing_and_null_fields_default() {
        let body = br#"{"items":[{"name":"LAN_GW","address":null}]}"#;

        let response = decode(body).unwrap();

        assert_eq!(response.status, "");
        assert_eq!(response.items[0].name, "LAN_GW");
        assert_eq!(response.items[0].address, "");
        assert_eq!(response.items[0].loss, "");

        let response = decode(br#"{"items":null,"status":"ok"}"#).unwrap();
        assert!(response.items.is_empty());

        let response = decode(b"{}").unwrap();
        assert!(response.items.is_empty());
    }

    #[test]
    fn test_decode_rejects_malformed_body() {
        assert!(decode(b"not json").is_err());
        assert!(decode(b"").is_err());
        assert!(decode(b"[]").is_err());
        assert!(decode(br#"{"items":"nope"}"#).is_err());
        assert!(decode(br#"{"items":[{"loss":0.5}]}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_positional_arrays() {
        let err = decode(b"[]").unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject("response")));

        let err = decode(br#"[[{"name":"X","loss":"bad"}],"ok"]"#).unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject("response")));

        let body = br#"{"items":[["GW","1.2.3.4","0.0 %","1.0 ms","0.1 ms","Online"]]}"#;
        let err = decode(body).unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject("gateway item")));
        assert_eq!(
            err.to_string(),
            "Failed to decode gateway status: gateway item is not a JSON object"
        );

        let err = decode(br#"{"items":[null]}"#).unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject("gateway item")));
    }

    #[test]
    fn test_normalize_loss_values() {
        for (raw, expected) in [("0 %", 0.0), ("0.2 %", 0.2), ("100 %", 100.0)] {
            let gw = normalize(&record(raw, "1 ms", "1 ms", "Online")).unwrap();
            assert_eq!(gw.loss_pct, expected, "loss {:?}", raw);
        }
    }

    #[test]
    fn test_normalize_millisecond_values() {
        for (raw, expected) in [("0 ms", 0.0), ("12.3 ms", 12.3), ("1500.25 ms", 1500.25)] {
            let gw = normalize(&record("0 %", raw, raw, "Online")).unwrap();
            assert_eq!(gw.delay_ms, expected, "delay {:?}", raw);
            assert_eq!(gw.stddev_ms, expected, "stddev {:?}", raw);
        }
    }

    #[test]
    fn test_normalize_keeps_identity_fields() {
        let gw = normalize(&record("0.0 %", "14.2 ms", "1.1 ms", "Online")).unwrap();

        assert_eq!(gw.name, "WAN_GW");
        assert_eq!(gw.address, "203.0.113.1");
        assert_eq!(gw.status_translated, "Online");
        assert_eq!(gw.delay_ms, 14.2);
        assert_eq!(gw.stddev_ms, 1.1);
        assert!(gw.up);
    }

    #[test]
    fn test_status_is_exact_match() {
        assert!(is_online("Online"));
        assert!(!is_online("online"));
        assert!(!is_online("ONLINE"));
        assert!(!is_online("Offline"));
        assert!(!is_online(""));
        assert!(!is_online("Online "));
    }

    #[test]
    fn test_normalize_rejects_non_numeric() {
        let err = normalize(&record("bad", "1 ms", "1 ms", "Online")).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingUnit {
                field: GatewayField::Loss,
                ..
            }
        ));

        let err = normalize(&record("0 %", "~ ms", "1 ms", "Online")).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidNumber {
                field: GatewayField::Delay,
                ..
            }
        ));
        assert!(err.to_string().contains("WAN_GW"));
    }

    #[test]
    fn test_normalize_requires_unit_suffix() {
        let err = normalize(&record("0.5", "1 ms", "1 ms", "Online")).unwrap_err();
        assert!(err.to_string().contains("missing the ' %' suffix"));

        let err = normalize(&record("0 %", "1 ms", "1ms", "Online")).unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingUnit {
                field: GatewayField::Stddev,
                ..
            }
        ));

        // Units are not interchangeable.
        assert!(normalize(&record("0 ms", "1 ms", "1 ms", "Online")).is_err());
    }

    #[test]
    fn test_normalize_all_is_all_or_nothing() {
        let good = record("0 %", "1 ms", "0.5 ms", "Online");
        let bad = record("bad", "1 ms", "0.5 ms", "Online");

        let ok = normalize_all(&[good.clone(), good.clone()]).unwrap();
        assert_eq!(ok.len(), 2);

        assert!(normalize_all(&[good.clone(), bad, good]).is_err());
        let empty: [GatewayRecord; 0] = [];
        assert!(normalize_all(&empty).unwrap().is_empty());
    }
}
