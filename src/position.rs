use crate::player::PlaybackStatus;
use std::time::Instant;

/// Raw positions this far behind the base count as a seek backwards.
const BACKWARD_JUMP_SECS: f64 = 0.75;

/// Turns coarse position samples into a position that keeps moving between
/// them.
///
/// Sources refresh every 0.5-1 s, so while playing with no fresh sample the
/// estimate advances at wall-clock rate from the last observed sample.
#[derive(Debug, Clone, Default)]
pub struct PositionEstimator {
    base_status: PlaybackStatus,
    base_position: f64,
    base_duration: f64,
    captured_at: Option<Instant>,
    last_raw_position: f64,
}

impl PositionEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective position for this sample at `now`.
    pub fn estimate(&mut self, status: PlaybackStatus, raw_position: f64, raw_duration: f64, now: Instant) -> f64 {
        let captured_at = match self.captured_at {
            Some(at) if !self.should_reset(status, raw_position) => at,
            _ => {
                self.reset(status, raw_position, raw_duration, now);
                return raw_position;
            }
        };

        let elapsed = now.saturating_duration_since(captured_at).as_secs_f64();
        let extrapolated = self.base_position + elapsed;
        if self.base_duration > 0.0 {
            extrapolated.min(self.base_duration)
        } else {
            extrapolated
        }
    }

    fn should_reset(&self, status: PlaybackStatus, raw_position: f64) -> bool {
        status != PlaybackStatus::Playing
            || self.base_status != PlaybackStatus::Playing
            || raw_position != self.last_raw_position
            || raw_position < self.base_position - BACKWARD_JUMP_SECS
    }

    fn reset(&mut self, status: PlaybackStatus, raw_position: f64, raw_duration: f64, now: Instant) {
        self.base_status = status;
        self.base_position = raw_position;
        self.base_duration = raw_duration;
        self.captured_at = Some(now);
        self.last_raw_position = raw_position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const PLAYING: PlaybackStatus = PlaybackStatus::Playing;

    #[test]
    fn test_first_sample_is_returned_as_is() {
        let mut est = PositionEstimator::new();
        assert_eq!(est.estimate(PLAYING, 10.0, 200.0, Instant::now()), 10.0);
    }

    #[test]
    fn test_extrapolates_at_wall_clock_rate() {
        let mut est = PositionEstimator::new();
        let t0 = Instant::now();
        est.estimate(PLAYING, 10.0, 0.0, t0);

        let at_2s = est.estimate(PLAYING, 10.0, 0.0, t0 + Duration::from_secs(2));
        assert!((at_2s - 12.0).abs() < 1e-9);

        let at_3s = est.estimate(PLAYING, 10.0, 0.0, t0 + Duration::from_millis(3500));
        assert!(at_3s >= at_2s);
        assert!((at_3s - 13.5).abs() < 1e-9);
    }

    #[test]
    fn test_clamps_to_duration() {
        let mut est = PositionEstimator::new();
        let t0 = Instant::now();
        est.estimate(PLAYING, 199.0, 200.0, t0);
        assert_eq!(est.estimate(PLAYING, 199.0, 200.0, t0 + Duration::from_secs(5)), 200.0);
    }

    #[test]
    fn test_new_sample_resets_base() {
        let mut est = PositionEstimator::new();
        let t0 = Instant::now();
        est.estimate(PLAYING, 10.0, 0.0, t0);
        est.estimate(PLAYING, 10.0, 0.0, t0 + Duration::from_millis(400));

        let fresh = est.estimate(PLAYING, 10.5, 0.0, t0 + Duration::from_millis(600));
        assert_eq!(fresh, 10.5);

        let later = est.estimate(PLAYING, 10.5, 0.0, t0 + Duration::from_millis(1600));
        assert!((later - 11.5).abs() < 1e-9);
    }

    #[test]
    fn test_backward_jump_resets_immediately() {
        let mut est = PositionEstimator::new();
        let t0 = Instant::now();
        est.estimate(PLAYING, 95.0, 0.0, t0);
        est.estimate(PLAYING, 95.0, 0.0, t0 + Duration::from_secs(3));

        assert_eq!(est.estimate(PLAYING, 2.0, 0.0, t0 + Duration::from_secs(4)), 2.0);
    }

    #[test]
    fn test_paused_never_extrapolates() {
        let mut est = PositionEstimator::new();
        let t0 = Instant::now();
        est.estimate(PlaybackStatus::Paused, 42.0, 0.0, t0);
        assert_eq!(est.estimate(PlaybackStatus::Paused, 42.0, 0.0, t0 + Duration::from_secs(10)), 42.0);

        // Resuming: previous status was not playing, so the first playing sample is taken raw
        assert_eq!(est.estimate(PLAYING, 42.0, 0.0, t0 + Duration::from_secs(11)), 42.0);
        let resumed = est.estimate(PLAYING, 42.0, 0.0, t0 + Duration::from_secs(12));
        assert!((resumed - 43.0).abs() < 1e-9);
    }

    #[test]
    fn test_clock_going_backwards_does_not_regress() {
        let mut est = PositionEstimator::new();
        let t1 = Instant::now() + Duration::from_secs(5);
        est.estimate(PLAYING, 10.0, 0.0, t1);
        assert_eq!(est.estimate(PLAYING, 10.0, 0.0, t1 - Duration::from_secs(1)), 10.0);
    }
}
