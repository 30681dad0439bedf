//! The processor clock is generated by a PWM slice of the controller.
//! Its frequency is the system clock divided first by a fractional
//! divider and then by the PWM period (`wrap + 1`); only the
//! frequencies in [`FrequencyTable::standard`] have known-good
//! settings.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// The controller's system clock.
pub const SYSTEM_CLOCK_HZ: u32 = 250_000_000;

/// The processor clock used when none is chosen.
pub const DEFAULT_CLOCK_HZ: u32 = 125_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedFrequency {
    pub hz: u32,
}

impl Display for UnsupportedFrequency {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "processor clock frequency {} Hz is not supported", self.hz)
    }
}

impl Error for UnsupportedFrequency {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSetting {
    /// The frequency this setting is meant to produce.
    pub hz: u32,
    /// PWM counter top value; the period is `wrap + 1` counts.
    pub wrap: u16,
    /// Fractional clock divider.
    pub divider: f32,
}

impl ClockSetting {
    /// The frequency the hardware actually produces.
    pub fn output_hz(&self) -> f64 {
        f64::from(SYSTEM_CLOCK_HZ) / ((f64::from(self.wrap) + 1.0) * f64::from(self.divider))
    }
}

impl Display for ClockSetting {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        if self.hz >= 1_000_000 {
            write!(f, "{} MHz", self.hz / 1_000_000)
        } else {
            write!(f, "{} kHz", self.hz / 1000)
        }
    }
}

const fn setting(hz: u32, wrap: u16, divider: f32) -> ClockSetting {
    ClockSetting { hz, wrap, divider }
}

const STANDARD: [ClockSetting; 10] = [
    setting(8_000_000, 4, 6.25),
    setting(4_000_000, 4, 12.5),
    setting(1_000_000, 4, 50.0),
    setting(750_000, 4, 66.666_67),
    setting(500_000, 4, 100.0),
    setting(250_000, 99, 10.0),
    setting(125_000, 99, 20.0),
    setting(50_000, 99, 50.0),
    setting(10_000, 249, 100.0),
    setting(1_000, 999, 250.0),
];

#[derive(Debug, Clone)]
pub struct FrequencyTable {
    settings: Vec<ClockSetting>,
}

impl FrequencyTable {
    /// The frequencies the board supports, fastest first.
    pub fn standard() -> FrequencyTable {
        FrequencyTable {
            settings: STANDARD.to_vec(),
        }
    }

    pub fn settings(&self) -> &[ClockSetting] {
        &self.settings
    }

    pub fn lookup_hz(&self, hz: u32) -> Result<ClockSetting, UnsupportedFrequency> {
        self.settings
            .iter()
            .find(|s| s.hz == hz)
            .copied()
            .ok_or(UnsupportedFrequency { hz })
    }

    pub fn lookup_khz(&self, khz: u32) -> Result<ClockSetting, UnsupportedFrequency> {
        match khz.checked_mul(1000) {
            Some(hz) => self.lookup_hz(hz),
            None => Err(UnsupportedFrequency { hz: u32::MAX }),
        }
    }

    pub fn default_setting(&self) -> Result<ClockSetting, UnsupportedFrequency> {
        self.lookup_hz(DEFAULT_CLOCK_HZ)
    }
}

impl Default for FrequencyTable {
    fn default() -> Self {
        FrequencyTable::standard()
    }
}
