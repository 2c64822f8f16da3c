use chrono::{DateTime, Utc};

use crate::{db::models::SensorClass, telegram::Decoded};

/// One physical measurement slot on the field device.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// Telegram key, `D1`..`D7`.
    pub code: &'static str,
    /// External identifier of the sensor this channel feeds.
    pub external_id: &'static str,
    /// Multiplier turning the raw integer into the physical unit.
    pub factor: f64,
    pub unit: &'static str,
    pub class: SensorClass,
}

/// Channel table for the deployed device.
///
/// | Code | Sensor   | Raw | Real     |
/// |------|----------|-----|----------|
/// | D1   | SENS-002 | 2603 | 26.03 C |
/// | D4   | SENS-003 | 4512 | 451.2 lx |
pub const CHANNELS: [Channel; 7] = [
    Channel { code: "D1", external_id: "SENS-002", factor: 0.01, unit: "C", class: SensorClass::Temperature },
    Channel { code: "D2", external_id: "SENS-004", factor: 0.01, unit: "%", class: SensorClass::Humidity },
    Channel { code: "D3", external_id: "SENS-001", factor: 0.01, unit: "%", class: SensorClass::SoilMoisture },
    Channel { code: "D4", external_id: "SENS-003", factor: 0.1, unit: "lx", class: SensorClass::Light },
    Channel { code: "D5", external_id: "SENS-005", factor: 0.1, unit: "ppm", class: SensorClass::Co2 },
    Channel { code: "D6", external_id: "SENS-006", factor: 0.1, unit: "ppb", class: SensorClass::Voc },
    Channel { code: "D7", external_id: "SENS-007", factor: 0.1, unit: "ppb", class: SensorClass::Nox },
];

/// Returns `None` for codes that are not provisioned; that is not an error.
pub fn lookup(code: &str) -> Option<&'static Channel> {
    CHANNELS.iter().find(|c| c.code == code)
}

/// A reading in physical units, addressed to a logical sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReading {
    pub channel: &'static str,
    pub external_id: &'static str,
    pub value: f64,
    pub unit: &'static str,
    pub class: SensorClass,
    pub timestamp: DateTime<Utc>,
}

/// Scale a raw channel value into its physical unit.
///
/// Unmapped channels yield `None`. `timestamp` falls back to now; the device
/// protocol carries none, so in practice it is the receipt time.
pub fn normalize(
    code: &str,
    raw: f64,
    timestamp: Option<DateTime<Utc>>,
) -> Option<NormalizedReading> {
    let channel = lookup(code)?;
    Some(NormalizedReading {
        channel: channel.code,
        external_id: channel.external_id,
        value: round2(raw * channel.factor),
        unit: channel.unit,
        class: channel.class,
        timestamp: timestamp.unwrap_or_else(Utc::now),
    })
}

/// Normalize every mapped channel of a decoded telegram.
///
/// All readings share one timestamp and are ordered by channel code.
pub fn normalize_all(decoded: &Decoded, timestamp: Option<DateTime<Utc>>) -> Vec<NormalizedReading> {
    let timestamp = timestamp.unwrap_or_else(Utc::now);
    let mut readings: Vec<_> = decoded
        .values
        .iter()
        .filter_map(|(code, raw)| normalize(code, *raw, Some(timestamp)))
        .collect();
    readings.sort_by(|a, b| a.channel.cmp(b.channel));
    readings
}

/// Round to two decimals, halves away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::telegram::decode;

    #[test]
    fn table_is_complete() {
        let ids: Vec<_> = CHANNELS.iter().map(|c| (c.code, c.external_id)).collect();
        assert_eq!(
            ids,
            vec![
                ("D1", "SENS-002"),
                ("D2", "SENS-004"),
                ("D3", "SENS-001"),
                ("D4", "SENS-003"),
                ("D5", "SENS-005"),
                ("D6", "SENS-006"),
                ("D7", "SENS-007"),
            ]
        );
    }

    #[test]
    fn lookup_unknown_code_is_none() {
        assert!(lookup("D9").is_none());
        assert!(lookup("d1").is_none());
    }

    #[test]
    fn normalizes_temperature_channel() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let r = normalize("D1", 2603.0, Some(ts)).unwrap();
        assert_eq!(r.external_id, "SENS-002");
        assert_eq!(r.value, 26.03);
        assert_eq!(r.unit, "C");
        assert_eq!(r.class, SensorClass::Temperature);
        assert_eq!(r.timestamp, ts);
    }

    #[test]
    fn normalizes_tenth_scaled_channel() {
        let r = normalize("D5", 4123.0, None).unwrap();
        assert_eq!(r.external_id, "SENS-005");
        assert_eq!(r.value, 412.3);
        assert_eq!(r.unit, "ppm");
    }

    #[test]
    fn unmapped_channel_is_skipped() {
        assert!(normalize("D9", 100.0, None).is_none());
    }

    #[test]
    fn missing_timestamp_defaults_to_now() {
        let before = Utc::now();
        let r = normalize("D2", 5411.0, None).unwrap();
        assert!(r.timestamp >= before && r.timestamp <= Utc::now());
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(2.675), 2.68);
        assert_eq!(round2(26.034999), 26.03);
    }

    #[test]
    fn normalize_all_skips_unmapped_and_orders_by_channel() {
        let d = decode("CIoTA-D4=4512&D9=1&D1=2603&D2=5411");
        let readings = normalize_all(&d, None);

        let channels: Vec<_> = readings.iter().map(|r| r.channel).collect();
        assert_eq!(channels, vec!["D1", "D2", "D4"]);
        assert!(readings.iter().all(|r| r.timestamp == readings[0].timestamp));
        assert_eq!(readings[2].value, 451.2);
    }
}
