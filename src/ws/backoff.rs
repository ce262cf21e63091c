//! Reconnect backoff: doubles from a floor up to a ceiling, resets on handshake.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    pub fn from_millis(floor_ms: u64, ceiling_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(floor_ms),
            Duration::from_millis(ceiling_ms),
        )
    }

    /// Delay to wait before the next attempt. Advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.ceiling);
        delay
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(d: Duration) -> u64 {
        d.as_millis() as u64
    }

    #[test]
    fn test_doubling_sequence_with_ceiling() {
        let mut backoff = Backoff::from_millis(500, 8_000);
        let seq: Vec<u64> = (0..7).map(|_| ms(backoff.next_delay())).collect();
        assert_eq!(seq, vec![500, 1_000, 2_000, 4_000, 8_000, 8_000, 8_000]);
    }

    #[test]
    fn test_reset_after_handshake() {
        let mut backoff = Backoff::from_millis(500, 8_000);
        for _ in 0..4 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(ms(backoff.next_delay()), 500);
        assert_eq!(ms(backoff.next_delay()), 1_000);
    }
}
