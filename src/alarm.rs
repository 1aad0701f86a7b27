//! The alarm setting and trigger engine.
//!
//! The engine compares the live clock against the [`AlarmSetting`] once per
//! tick. When it fires it latches `triggered` and drives the buzzer as a square
//! wave until the user silences it; it never clears itself.
//!
//! # Trigger policies
//!
//! - [`TriggerPolicy::ExactSecond`] fires only when the clock reads exactly
//!   `hour:minute:00`. A tick that stalls across second 0 misses the alarm.
//! - [`TriggerPolicy::CatchUp`] fires at any second of the alarm minute, once
//!   per calendar minute.

use chrono::{NaiveDate, NaiveDateTime, Timelike};

use crate::mode::{wrap_hour, wrap_minute};

/// Default buzzer half period in milliseconds.
pub const BEEP_INTERVAL_MS: u64 = 500;

/// When the alarm is allowed to fire within the alarm minute.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TriggerPolicy {
    /// Only at second 0 of the alarm minute
    #[default]
    ExactSecond,
    /// At the first tick inside the alarm minute
    CatchUp,
}

/// The user's alarm setting.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlarmSetting {
    /// Hour (0-23)
    pub hour: u8,
    /// Minute (0-59)
    pub minute: u8,
    pub enabled: bool,
}

impl AlarmSetting {
    pub const fn new(hour: u8, minute: u8, enabled: bool) -> Self {
        Self {
            hour,
            minute,
            enabled,
        }
    }

    /// Whether the setting holds a valid time of day.
    pub fn is_valid(&self) -> bool {
        self.hour < 24 && self.minute < 60
    }

    fn matches_minute(&self, now: &NaiveDateTime) -> bool {
        now.hour() == u32::from(self.hour) && now.minute() == u32::from(self.minute)
    }
}

impl Default for AlarmSetting {
    fn default() -> Self {
        Self::new(7, 0, false)
    }
}

/// Runtime state of a sounding alarm.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlarmState {
    pub triggered: bool,
    /// Monotonic time of the last toggle boundary; the next toggle is due one
    /// interval later
    pub last_beep_ms: u64,
    /// Current buzzer level
    pub beep_on: bool,
}

/// Result of pressing the Alarm button.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlarmButtonOutcome {
    /// A sounding alarm was silenced; the buzzer must be switched off
    Silenced,
    /// The alarm was switched on or off
    Toggled { enabled: bool },
}

/// Edge-detects the alarm instant and drives the beep cadence.
#[derive(Clone, Debug)]
pub struct AlarmEngine {
    setting: AlarmSetting,
    state: AlarmState,
    policy: TriggerPolicy,
    beep_interval_ms: u64,
    // Minute the catch-up policy last fired for.
    fired_for: Option<(NaiveDate, u32, u32)>,
}

impl AlarmEngine {
    pub fn new(setting: AlarmSetting, policy: TriggerPolicy, beep_interval_ms: u64) -> Self {
        Self {
            setting,
            state: AlarmState::default(),
            policy,
            beep_interval_ms,
            fired_for: None,
        }
    }

    pub fn setting(&self) -> &AlarmSetting {
        &self.setting
    }

    pub fn state(&self) -> &AlarmState {
        &self.state
    }

    pub fn is_triggered(&self) -> bool {
        self.state.triggered
    }

    pub fn bump_hour(&mut self) {
        self.setting.hour = wrap_hour(self.setting.hour);
        debug!("alarm hour -> {}", self.setting.hour);
    }

    pub fn bump_minute(&mut self) {
        self.setting.minute = wrap_minute(self.setting.minute);
        debug!("alarm minute -> {}", self.setting.minute);
    }

    /// Silences a sounding alarm, otherwise toggles `enabled`.
    pub fn press(&mut self) -> AlarmButtonOutcome {
        if self.state.triggered {
            self.state.triggered = false;
            self.state.beep_on = false;
            info!("alarm silenced");
            AlarmButtonOutcome::Silenced
        } else {
            self.setting.enabled = !self.setting.enabled;
            info!("alarm enabled: {}", self.setting.enabled);
            AlarmButtonOutcome::Toggled {
                enabled: self.setting.enabled,
            }
        }
    }

    fn should_fire(&self, now: &NaiveDateTime) -> bool {
        if !self.setting.enabled || self.state.triggered || !self.setting.matches_minute(now) {
            return false;
        }
        match self.policy {
            TriggerPolicy::ExactSecond => now.second() == 0,
            TriggerPolicy::CatchUp => {
                self.fired_for != Some((now.date(), now.hour(), now.minute()))
            }
        }
    }

    /// Evaluates the alarm for this tick.
    ///
    /// Returns the new buzzer level when it has to change.
    pub fn check(&mut self, now: &NaiveDateTime, now_ms: u64) -> Option<bool> {
        if self.should_fire(now) {
            info!(
                "alarm triggered at {}:{}:{}",
                now.hour(),
                now.minute(),
                now.second()
            );
            self.fired_for = Some((now.date(), now.hour(), now.minute()));
            self.state.triggered = true;
            self.state.beep_on = true;
            self.state.last_beep_ms = now_ms;
            return Some(true);
        }

        if !self.state.triggered {
            return None;
        }

        let elapsed = now_ms.saturating_sub(self.state.last_beep_ms);
        if elapsed < self.beep_interval_ms {
            return None;
        }
        if elapsed < self.beep_interval_ms.saturating_mul(2) {
            self.state.last_beep_ms = self.state.last_beep_ms.saturating_add(self.beep_interval_ms);
        } else {
            // Stalled for more than a period, restart the phase here.
            self.state.last_beep_ms = now_ms;
        }
        self.state.beep_on = !self.state.beep_on;
        Some(self.state.beep_on)
    }
}

impl Default for AlarmEngine {
    fn default() -> Self {
        Self::new(
            AlarmSetting::default(),
            TriggerPolicy::default(),
            BEEP_INTERVAL_MS,
        )
    }
}
