use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Clamped time since the previous tick, in seconds.
    pub dt: f32,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Monotonic frame counter.
    pub frame_index: u64,

    /// Instantaneous frame rate, `round(1 / raw_dt)`. Zero on the first tick.
    pub fps: u32,
}

/// Frame clock producing `FrameTime` snapshots.
///
/// `dt` is clamped so animation stays stable after stalls; the reported frame
/// rate is computed from the unclamped interval.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Instant>,
    frame_index: u64,
    fps: u32,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    /// Creates a clock with custom delta-time clamps.
    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: None,
            frame_index: 0,
            fps: 0,
            dt_min,
            dt_max,
        }
    }

    /// Forgets the previous timestamp; the next tick reports no frame rate change.
    ///
    /// Use after the loop was paused so the gap does not read as a slow frame.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Last computed frame rate.
    #[inline]
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Advances the clock using the current time.
    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    /// Advances the clock to `now`.
    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let raw = self
            .last
            .map(|last| now.saturating_duration_since(last));

        if let Some(raw) = raw.filter(|d| !d.is_zero()) {
            self.fps = (1.0 / raw.as_secs_f64()).round() as u32;
        }

        let dt = raw.unwrap_or(self.dt_min).clamp(self.dt_min, self.dt_max);
        self.last = Some(now);

        let ft = FrameTime {
            dt: dt.as_secs_f32(),
            now,
            frame_index: self.frame_index,
            fps: self.fps,
        };

        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_reports_zero_fps() {
        let mut clock = FrameClock::new();
        let ft = clock.tick_at(Instant::now());
        assert_eq!(ft.fps, 0);
        assert_eq!(ft.frame_index, 0);
    }

    #[test]
    fn one_second_apart_is_one_fps() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.tick_at(t0);
        let ft = clock.tick_at(t0 + Duration::from_millis(1000));
        assert_eq!(ft.fps, 1);
        assert_eq!(clock.fps(), 1);
        // dt is clamped, fps is not
        assert!((ft.dt - 0.25).abs() < 1e-6);
    }

    #[test]
    fn sixteen_point_six_ms_is_sixty_fps() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.tick_at(t0);
        let ft = clock.tick_at(t0 + Duration::from_micros(16_600));
        assert_eq!(ft.fps, 60);
        assert_eq!(ft.frame_index, 1);
    }

    #[test]
    fn zero_interval_keeps_previous_rate() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.tick_at(t0);
        clock.tick_at(t0 + Duration::from_millis(20));
        let ft = clock.tick_at(t0 + Duration::from_millis(20));
        assert_eq!(ft.fps, 50);
    }
}
