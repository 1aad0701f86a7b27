//! A platform-agnostic battery clock/alarm controller.
//!
//! The controller reads the time from a real-time clock, shows it on a small
//! display and lets the user set the time and a daily alarm with four buttons
//! (Hour, Minute, Mode, Alarm). When the alarm fires a buzzer beeps until the
//! Alarm button is pressed.
//!
//! # Structure
//!
//! - [`debounce`] turns raw, bouncy button levels into press events.
//! - [`mode`] holds the five UI modes and the `(mode, button)` transition table.
//! - [`alarm`] detects the alarm instant and drives the beep cadence.
//! - [`render`] computes the screen contents and redraws only what changed.
//! - [`controller`] ties these together: [`controller::ClockContext::step`] is
//!   a pure tick function, [`controller::AlarmClock`] performs the I/O around it.
//! - [`time`] and [`ds3231`] provide the wall clock, [`graphics`] adapts
//!   `embedded-graphics` targets as the display.
//!
//! # Example
//!
//! ```rust,ignore
//! use alarm_clock::{controller::AlarmClock, ds3231::DS3231, Config};
//!
//! let rtc = DS3231::new(i2c, 0x68);
//! let inputs = ButtonInputs::new(hour, minute, mode, alarm);
//! let mut clock = match AlarmClock::boot(rtc, inputs, buzzer, display, Config::default()) {
//!     Ok(clock) => clock,
//!     Err(_) => alarm_clock::controller::halt(&mut delay),
//! };
//! clock.run(&mut monotonic, &mut delay);
//! ```
#![no_std]

// Must come first so the logging macros are visible in every module.
mod fmt;

pub mod alarm;
pub mod controller;
pub mod debounce;
pub mod ds3231;
#[cfg(feature = "graphics")]
pub mod graphics;
pub mod mode;
pub mod render;
pub mod time;

use embedded_hal::digital::ErrorKind;

pub use alarm::{AlarmSetting, TriggerPolicy};
pub use controller::{AlarmClock, ClockContext};
pub use debounce::{ButtonId, ButtonInputs};
pub use mode::ClockMode;
pub use render::{Color, DisplayOutput, Layout};
pub use time::{MonotonicClock, TimeSource};

/// Longest tick period that still debounces reliably, in milliseconds.
pub const MAX_TICK_MS: u32 = 50;

/// Controller configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// A raw level must hold for longer than this to count
    pub debounce_ms: u64,
    /// Delay between ticks of the run loop (1-50)
    pub tick_ms: u32,
    /// Buzzer half period while the alarm sounds
    pub beep_interval_ms: u64,
    pub trigger_policy: TriggerPolicy,
    /// Alarm setting after power-up
    pub initial_alarm: AlarmSetting,
    pub layout: Layout,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_ms: debounce::DEBOUNCE_MS,
            tick_ms: MAX_TICK_MS,
            beep_interval_ms: alarm::BEEP_INTERVAL_MS,
            trigger_policy: TriggerPolicy::default(),
            initial_alarm: AlarmSetting::default(),
            layout: Layout::default(),
        }
    }
}

impl Config {
    /// Checks the timing constraints between the fields.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 || self.tick_ms > MAX_TICK_MS {
            Err(ConfigError::TickPeriod(self.tick_ms))
        } else if self.debounce_ms <= u64::from(self.tick_ms) {
            Err(ConfigError::DebounceWindow(self.debounce_ms))
        } else if self.beep_interval_ms == 0 {
            Err(ConfigError::BeepInterval)
        } else if !self.initial_alarm.is_valid() {
            Err(ConfigError::InitialAlarm)
        } else {
            Ok(())
        }
    }
}

/// Invalid [`Config`] values.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Tick period must be 1-50 ms
    TickPeriod(u32),
    /// Debounce window must be longer than the tick period
    DebounceWindow(u64),
    /// Beep interval must not be zero
    BeepInterval,
    /// Initial alarm is not a valid time of day
    InitialAlarm,
}

/// Controller errors, `E` is the time source error and `DE` the display error.
#[derive(Debug)]
pub enum Error<E, DE> {
    Config(ConfigError),
    /// The time source could not be brought up; the clock is halted
    TimeSourceInit(E),
    /// Reading or writing the time source failed
    HardwareFault(E),
    /// Reading a button failed
    Input(ErrorKind),
    /// Driving the buzzer failed
    Buzzer(ErrorKind),
    /// Drawing failed
    Display(DE),
}

impl<E, DE> From<ConfigError> for Error<E, DE> {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}
