use crate::config::TimestampRule;

/// Derives the presentation timestamp (microseconds) of each page a stream
/// produces from the page's granule position.
///
/// The timestamp only orders pages across streams; it is never written.
#[derive(Debug, Clone)]
pub struct StampClock {
    rate: f64,
    previous: bool,
    constant: bool,
    old_granulepos: i64,
}

impl StampClock {
    /// A clock for a stream with `rate` granules per second.
    pub fn new(rate: f64, rule: TimestampRule, text: bool) -> Self {
        Self {
            rate,
            previous: rule.uses_previous(text),
            constant: false,
            old_granulepos: 0,
        }
    }

    /// A clock that stamps every page with zero, used for index streams.
    pub fn constant() -> Self {
        Self {
            rate: 1.0,
            previous: false,
            constant: true,
            old_granulepos: 0,
        }
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Stamps a page. Pages that end no packet (granule -1) reuse the last
    /// known granule and leave it unchanged.
    pub fn stamp(&mut self, granulepos: i64) -> i64 {
        if self.constant || self.rate <= 0.0 {
            return 0;
        }
        let granule = if granulepos == -1 || self.previous {
            self.old_granulepos
        } else {
            granulepos
        };
        if granulepos != -1 {
            self.old_granulepos = granulepos;
        }
        (granule as f64 * 1_000_000.0 / self.rate) as i64
    }

    pub fn reset(&mut self) {
        self.old_granulepos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_previous_rule_for_audio() {
        let mut clock = StampClock::new(1000.0, TimestampRule::PreviousExceptText, false);
        assert_eq!(clock.stamp(500), 0);
        assert_eq!(clock.stamp(1500), 500_000);
        assert_eq!(clock.stamp(-1), 1_500_000);
        assert_eq!(clock.stamp(2000), 1_500_000);
    }

    #[test]
    fn test_text_uses_own_granule() {
        let mut clock = StampClock::new(1000.0, TimestampRule::PreviousExceptText, true);
        assert_eq!(clock.stamp(500), 500_000);
        assert_eq!(clock.stamp(1500), 1_500_000);
    }

    #[test]
    fn test_alternative_rules() {
        let mut text = StampClock::new(1000.0, TimestampRule::AlwaysPrevious, true);
        assert_eq!(text.stamp(500), 0);
        assert_eq!(text.stamp(700), 500_000);

        let mut video = StampClock::new(25.0, TimestampRule::AlwaysOwn, false);
        assert_eq!(video.stamp(25), 1_000_000);
        assert_eq!(video.stamp(-1), 1_000_000);
    }

    #[test]
    fn test_constant_clock() {
        let mut clock = StampClock::constant();
        assert_eq!(clock.stamp(123_456), 0);
    }
}
