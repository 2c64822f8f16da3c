//! Decoder for the device telegram carried on the MQTT topic.
//!
//! Wire format: `CIoTA-D1=2603&D2=5411&...`. Values are raw integers that
//! still need the channel's scale factor applied (see [`crate::channels`]).
//! Decoding never fails as a whole; problems are reported as warnings and
//! the affected field (or the whole telegram) is dropped.

use std::collections::HashMap;

use thiserror::Error;

/// Literal every well-formed telegram starts with.
pub const TELEGRAM_PREFIX: &str = "CIoTA-";

/// Non-fatal problem found while decoding. The caller logs and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeWarning {
    #[error("telegram is missing the {TELEGRAM_PREFIX:?} prefix: {payload:?}")]
    MalformedTelegram { payload: String },
    #[error("could not parse value for {key}: {value:?}")]
    UnparsableField { key: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    /// Channel code → raw reading. Iteration order is unspecified.
    pub values: HashMap<String, f64>,
    pub warnings: Vec<DecodeWarning>,
}

/// Split a telegram into channel code → raw value pairs.
///
/// Each `&`-separated pair is split on its first `=`. A pair whose value
/// does not parse as a finite number is skipped with a warning; segments
/// without `=` are ignored. When a key repeats, the last value wins.
pub fn decode(raw: &str) -> Decoded {
    let mut decoded = Decoded::default();

    let Some(body) = raw.strip_prefix(TELEGRAM_PREFIX) else {
        decoded.warnings.push(DecodeWarning::MalformedTelegram { payload: raw.to_owned() });
        return decoded;
    };

    for pair in body.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        match value.parse::<f64>() {
            Ok(v) if v.is_finite() => {
                decoded.values.insert(key.to_owned(), v);
            }
            _ => decoded.warnings.push(DecodeWarning::UnparsableField {
                key: key.to_owned(),
                value: value.to_owned(),
            }),
        }
    }

    decoded
}
