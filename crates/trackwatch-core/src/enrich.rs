//! ---
//! tw_section: "01-core-functionality"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Ingestion pipeline and alert correlation."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
use chrono::Utc;
use rand::prelude::*;

use trackwatch_common::config::{SynthesisConfig, ValueRange};
use trackwatch_msg::types::{Classification, EnrichedTelemetry, SensorReading, SCHEMA_VERSION};

/// Fills sensor channels absent from a raw payload before broadcast.
///
/// Field nodes frequently publish only the raw vibration value; the broadcast
/// schema is complete. Missing channels are substituted from the configured
/// bounded ranges. This is a deliberate, narrowly scoped workaround for
/// partial sensor payloads: the baselines are fixed `[lo, hi]` intervals from
/// configuration, never unbounded randomness, and channels the node did send
/// pass through untouched.
#[derive(Debug)]
pub struct FieldSynthesizer {
    rng: StdRng,
    rms_ratio: f64,
    mag_norm: ValueRange,
    temperature: ValueRange,
    humidity: ValueRange,
    pressure: ValueRange,
}

impl FieldSynthesizer {
    /// Build the synthesizer from the `[synthesis]` configuration section.
    pub fn from_config(config: &SynthesisConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            rms_ratio: config.rms_ratio,
            mag_norm: config.mag_norm,
            temperature: config.temperature,
            humidity: config.humidity,
            pressure: config.pressure,
        }
    }

    /// Merge a raw reading and its classification into the broadcast record.
    pub fn enrich(
        &mut self,
        reading: &SensorReading,
        classification: Classification,
    ) -> EnrichedTelemetry {
        let accel_mag = reading.vibration_val.or(reading.accel_mag).unwrap_or(0.0);
        let accel_roll_rms = reading
            .accel_roll_rms
            .unwrap_or(accel_mag * self.rms_ratio);
        EnrichedTelemetry {
            schema_version: SCHEMA_VERSION,
            node_id: reading.node_id.clone(),
            accel_mag,
            accel_roll_rms,
            mag_norm: reading.mag_norm.unwrap_or_else(|| sample(&mut self.rng, self.mag_norm)),
            temperature: reading
                .temperature
                .unwrap_or_else(|| sample(&mut self.rng, self.temperature)),
            humidity: reading
                .humidity
                .unwrap_or_else(|| sample(&mut self.rng, self.humidity)),
            pressure: reading
                .pressure
                .unwrap_or_else(|| sample(&mut self.rng, self.pressure)),
            classification,
            processed_at: Utc::now(),
        }
    }
}

fn sample(rng: &mut StdRng, range: ValueRange) -> f64 {
    if range.lo == range.hi {
        range.lo
    } else {
        rng.gen_range(range.lo..=range.hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthesizer() -> FieldSynthesizer {
        FieldSynthesizer::from_config(&SynthesisConfig {
            seed: Some(7),
            ..SynthesisConfig::default()
        })
    }

    fn vibration_only(value: f64) -> SensorReading {
        SensorReading {
            node_id: "TRACK_SEC_42".to_owned(),
            vibration_val: Some(value),
            accel_mag: None,
            accel_roll_rms: None,
            mag_norm: None,
            temperature: None,
            humidity: None,
            pressure: None,
        }
    }

    #[test]
    fn synthesized_channels_stay_within_configured_bounds() {
        let mut synthesizer = synthesizer();
        for _ in 0..100 {
            let record = synthesizer.enrich(&vibration_only(9.8), Classification::fallback());
            assert_eq!(record.accel_mag, 9.8);
            assert!((record.accel_roll_rms - 9.8 * 0.7).abs() < 1e-9);
            assert!((40.0..=45.0).contains(&record.mag_norm));
            assert!((25.0..=27.0).contains(&record.temperature));
            assert!((60.0..=65.0).contains(&record.humidity));
            assert!((1013.0..=1023.0).contains(&record.pressure));
        }
    }

    #[test]
    fn provided_channels_pass_through_untouched() {
        let mut synthesizer = synthesizer();
        let reading = SensorReading {
            mag_norm: Some(39.2),
            temperature: Some(31.0),
            accel_roll_rms: Some(1.25),
            ..vibration_only(2.0)
        };
        let record = synthesizer.enrich(&reading, Classification::fallback());
        assert_eq!(record.mag_norm, 39.2);
        assert_eq!(record.temperature, 31.0);
        assert_eq!(record.accel_roll_rms, 1.25);
    }

    #[test]
    fn accel_mag_falls_back_through_channels() {
        let mut synthesizer = synthesizer();
        let reading = SensorReading {
            vibration_val: None,
            accel_mag: Some(4.4),
            ..vibration_only(0.0)
        };
        let record = synthesizer.enrich(&reading, Classification::fallback());
        assert_eq!(record.accel_mag, 4.4);
    }
}
