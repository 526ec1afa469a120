//! Latest-value cache for sensor channels.

use std::collections::HashMap;

use time::{Duration, OffsetDateTime};

use biorig_types::{SensorChannel, SensorReading};

/// Holds the latest reading per sensor channel.
///
/// Mutated only by the message-ingest path; everyone else reads copies.
/// A channel holds at most one reading, replaced on every arrival.
#[derive(Debug, Default)]
pub struct SensorCache {
    readings: HashMap<SensorChannel, SensorReading>,
}

impl SensorCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest reading for its channel.
    pub fn update(&mut self, reading: SensorReading) {
        self.readings.insert(reading.channel, reading);
    }

    /// The latest reading for a channel, regardless of age.
    #[must_use]
    pub fn latest(&self, channel: SensorChannel) -> Option<SensorReading> {
        self.readings.get(&channel).copied()
    }

    /// The latest value for a channel, only if it arrived within `max_age`
    /// of `now`.
    ///
    /// Readings from the future (clock skew between publishers) count as
    /// fresh.
    #[must_use]
    pub fn fresh(&self, channel: SensorChannel, now: OffsetDateTime, max_age: Duration) -> Option<f64> {
        self.readings
            .get(&channel)
            .filter(|r| now - r.observed_at <= max_age)
            .map(|r| r.value)
    }

    /// Whether every tracked channel has a fresh reading.
    #[must_use]
    pub fn is_complete(&self, now: OffsetDateTime, max_age: Duration) -> bool {
        SensorChannel::ALL
            .into_iter()
            .all(|c| self.fresh(c, now, max_age).is_some())
    }

    /// Number of channels with any reading at all.
    #[must_use]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Whether no channel has reported yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(channel: SensorChannel, value: f64, at: OffsetDateTime) -> SensorReading {
        SensorReading {
            channel,
            value,
            observed_at: at,
        }
    }

    #[test]
    fn test_update_replaces_previous() {
        let now = OffsetDateTime::now_utc();
        let mut cache = SensorCache::new();

        cache.update(reading(SensorChannel::CstrTemp, 25.0, now));
        cache.update(reading(SensorChannel::CstrTemp, 26.0, now));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.latest(SensorChannel::CstrTemp).unwrap().value, 26.0);
    }

    #[test]
    fn test_fresh_respects_max_age() {
        let now = OffsetDateTime::now_utc();
        let mut cache = SensorCache::new();
        cache.update(reading(SensorChannel::MtankLevel, 8500.0, now - Duration::seconds(120)));

        assert_eq!(
            cache.fresh(SensorChannel::MtankLevel, now, Duration::seconds(90)),
            None
        );
        assert_eq!(
            cache.fresh(SensorChannel::MtankLevel, now, Duration::seconds(180)),
            Some(8500.0)
        );
    }

    #[test]
    fn test_fresh_missing_channel() {
        let cache = SensorCache::new();
        assert_eq!(
            cache.fresh(SensorChannel::CstrPh, OffsetDateTime::now_utc(), Duration::seconds(90)),
            None
        );
    }

    #[test]
    fn test_future_reading_counts_as_fresh() {
        let now = OffsetDateTime::now_utc();
        let mut cache = SensorCache::new();
        cache.update(reading(SensorChannel::CstrTemp, 27.0, now + Duration::seconds(5)));

        assert_eq!(
            cache.fresh(SensorChannel::CstrTemp, now, Duration::seconds(90)),
            Some(27.0)
        );
    }

    #[test]
    fn test_is_complete() {
        let now = OffsetDateTime::now_utc();
        let mut cache = SensorCache::new();
        let max_age = Duration::seconds(90);

        assert!(!cache.is_complete(now, max_age));

        for channel in SensorChannel::ALL {
            cache.update(reading(channel, 1.0, now));
        }
        assert!(cache.is_complete(now, max_age));

        // One stale channel breaks completeness.
        cache.update(reading(SensorChannel::CstrEc, 1.0, now - Duration::seconds(300)));
        assert!(!cache.is_complete(now, max_age));
    }
}
