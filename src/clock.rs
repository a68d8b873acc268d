use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Monotonic simulated-time source (spec §4.A).
///
/// Shared the same way the teacher shares `AppState::plant_data`: an
/// `Arc<RwLock<_>>` clone handed to every task, reads non-blocking on the
/// common path.
#[derive(Clone, Debug)]
pub struct Clock {
    inner: Arc<RwLock<ClockState>>,
}

#[derive(Debug)]
struct ClockState {
    start_wall: Instant,
    start_sim: f64,
    speed: f64,
}

impl Clock {
    pub fn new(speed: f64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ClockState {
                start_wall: Instant::now(),
                start_sim: 0.0,
                speed,
            })),
        }
    }

    /// Current simulated time in seconds since the clock was created.
    pub fn sim_now(&self) -> f64 {
        let s = self.inner.read().unwrap();
        s.start_sim + s.start_wall.elapsed().as_secs_f64() * s.speed
    }

    pub fn speed(&self) -> f64 {
        self.inner.read().unwrap().speed
    }

    /// Change simulation speed, rebasing so `sim_now()` stays continuous.
    pub fn set_speed(&self, new_speed: f64) {
        let mut s = self.inner.write().unwrap();
        let now = s.start_sim + s.start_wall.elapsed().as_secs_f64() * s.speed;
        s.start_sim = now;
        s.start_wall = Instant::now();
        s.speed = new_speed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn sim_now_is_monotonic() {
        let clock = Clock::new(100.0);
        let a = clock.sim_now();
        sleep(Duration::from_millis(5));
        let b = clock.sim_now();
        assert!(b > a);
    }

    #[test]
    fn set_speed_is_continuous() {
        let clock = Clock::new(1.0);
        sleep(Duration::from_millis(5));
        let before = clock.sim_now();
        clock.set_speed(1000.0);
        let after = clock.sim_now();
        assert!((after - before).abs() < 0.05, "speed change should not jump sim time");
        assert_eq!(clock.speed(), 1000.0);
    }
}
