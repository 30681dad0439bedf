//! Time as seen by the bus engine.
//!
//! The engine's timeouts (no ALE, no strobe) and the settle and reset
//! delays are all measured against a [`Clock`].  On real hardware
//! that is the wall clock; under test it is a [`SteppingClock`] which
//! advances a fixed amount every time it is read, so that a timeout
//! expires after a predictable number of polls.

use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

/// Waits shorter than this are done by spinning, longer ones by
/// sleeping.
const SPIN_LIMIT: Duration = Duration::from_micros(100);

pub trait Clock {
    /// Time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Lets `interval` pass.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use bus::Clock;
    ///
    /// fn settle<C: Clock>(clk: &mut C) {
    ///   // The data lines need a few microseconds before we drive them.
    ///   clk.consume(&Duration::from_micros(3));
    /// }
    /// ```
    fn consume(&mut self, interval: &Duration);
}

/// The wall clock.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use bus::BasicClock;
/// use bus::Clock;
/// let mut clk = BasicClock::new();
/// clk.consume(&Duration::from_micros(12));
/// assert!(clk.now() >= Duration::from_micros(12));
/// ```
#[derive(Debug)]
pub struct BasicClock {
    origin: Instant,
}

impl BasicClock {
    pub fn new() -> BasicClock {
        BasicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for BasicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for BasicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn consume(&mut self, interval: &Duration) {
        if *interval >= SPIN_LIMIT {
            thread::sleep(*interval);
        } else {
            let until = Instant::now() + *interval;
            while Instant::now() < until {
                std::hint::spin_loop();
            }
        }
    }
}

/// A simulated clock which moves forward by `step` each time it is
/// read.  Nothing ever blocks.
#[derive(Debug)]
pub struct SteppingClock {
    elapsed: Cell<Duration>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(step: Duration) -> SteppingClock {
        SteppingClock {
            elapsed: Cell::new(Duration::ZERO),
            step,
        }
    }
}

impl Default for SteppingClock {
    fn default() -> Self {
        SteppingClock::new(Duration::from_micros(1))
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Duration {
        let t = self.elapsed.get();
        self.elapsed.set(t + self.step);
        t
    }

    fn consume(&mut self, interval: &Duration) {
        self.elapsed.set(self.elapsed.get() + *interval);
    }
}

#[test]
fn test_stepping_clock() {
    let mut clk = SteppingClock::new(Duration::from_micros(5));
    assert_eq!(clk.now(), Duration::ZERO);
    assert_eq!(clk.now(), Duration::from_micros(5));
    clk.consume(&Duration::from_millis(1));
    assert_eq!(clk.now(), Duration::from_micros(1010));
}
