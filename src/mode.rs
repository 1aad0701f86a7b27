//! UI modes and the button transition table.
//!
//! What a button does depends on the current [`ClockMode`]. Rather than having
//! each handler switch on the mode, every `(mode, button)` pair maps to one
//! [`Transition`] in [`transition`], which keeps the table total and easy to
//! audit.

use chrono::{NaiveDateTime, Timelike};

use crate::debounce::ButtonId;

/// The UI configuration context.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockMode {
    /// Show the live time and the alarm setting
    #[default]
    Normal,
    /// Hour button advances the clock hour
    SetHour,
    /// Minute button advances the clock minute
    SetMinute,
    /// Hour button advances the alarm hour
    SetAlarmHour,
    /// Minute button advances the alarm minute
    SetAlarmMinute,
}

impl ClockMode {
    /// All modes in cycle order.
    pub const ALL: [ClockMode; 5] = [
        ClockMode::Normal,
        ClockMode::SetHour,
        ClockMode::SetMinute,
        ClockMode::SetAlarmHour,
        ClockMode::SetAlarmMinute,
    ];

    /// The mode the Mode button moves to.
    pub fn next(self) -> Self {
        match self {
            ClockMode::Normal => ClockMode::SetHour,
            ClockMode::SetHour => ClockMode::SetMinute,
            ClockMode::SetMinute => ClockMode::SetAlarmHour,
            ClockMode::SetAlarmHour => ClockMode::SetAlarmMinute,
            ClockMode::SetAlarmMinute => ClockMode::Normal,
        }
    }

    /// How the display looks in this mode.
    pub fn render_profile(self) -> RenderProfile {
        match self {
            ClockMode::Normal => RenderProfile::LiveClock,
            ClockMode::SetHour => RenderProfile::EditClock("Set Hour"),
            ClockMode::SetMinute => RenderProfile::EditClock("Set Minute"),
            ClockMode::SetAlarmHour => RenderProfile::EditAlarm("Set Alarm Hour"),
            ClockMode::SetAlarmMinute => RenderProfile::EditAlarm("Set Alarm Minute"),
        }
    }
}

/// Display layout selected by the mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RenderProfile {
    /// `HH:MM:SS` of the clock with the alarm summary as status
    LiveClock,
    /// `HH:MM:SS` of the clock, highlighted, with a fixed status
    EditClock(&'static str),
    /// `HH:MM` of the alarm, alarm-highlighted, with a fixed status
    EditAlarm(&'static str),
}

/// Field mutation requested by a button.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    None,
    /// Clock hour +1 mod 24, written to the time source
    BumpClockHour,
    /// Clock minute +1 mod 60, written to the time source
    BumpClockMinute,
    /// Alarm hour +1 mod 24
    BumpAlarmHour,
    /// Alarm minute +1 mod 60
    BumpAlarmMinute,
    /// Silence a sounding alarm, otherwise toggle it on/off
    SilenceOrToggleAlarm,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transition {
    pub next: ClockMode,
    pub action: Action,
}

/// The `(mode, button)` transition table.
pub fn transition(mode: ClockMode, button: ButtonId) -> Transition {
    use ClockMode::*;

    let (next, action) = match (mode, button) {
        (_, ButtonId::Mode) => (mode.next(), Action::None),
        (_, ButtonId::Alarm) => (mode, Action::SilenceOrToggleAlarm),

        (SetHour, ButtonId::Hour) => (mode, Action::BumpClockHour),
        (SetAlarmHour, ButtonId::Hour) => (mode, Action::BumpAlarmHour),
        (Normal | SetMinute | SetAlarmMinute, ButtonId::Hour) => (mode, Action::None),

        (SetMinute, ButtonId::Minute) => (mode, Action::BumpClockMinute),
        (SetAlarmMinute, ButtonId::Minute) => (mode, Action::BumpAlarmMinute),
        (Normal | SetHour | SetAlarmHour, ButtonId::Minute) => (mode, Action::None),
    };
    Transition { next, action }
}

/// `hour + 1` on a 24 hour dial.
pub fn wrap_hour(hour: u8) -> u8 {
    (hour % 24 + 1) % 24
}

/// `minute + 1` on a 60 minute dial.
pub fn wrap_minute(minute: u8) -> u8 {
    (minute % 60 + 1) % 60
}

/// Advances the hour of `datetime`, keeping date, minute and second.
pub fn bump_clock_hour(datetime: &NaiveDateTime) -> NaiveDateTime {
    let hour = (datetime.hour() + 1) % 24;
    // Every hour 0-23 exists on every date.
    datetime.with_hour(hour).unwrap_or(*datetime)
}

/// Advances the minute of `datetime`, keeping date, hour and second.
pub fn bump_clock_minute(datetime: &NaiveDateTime) -> NaiveDateTime {
    let minute = (datetime.minute() + 1) % 60;
    datetime.with_minute(minute).unwrap_or(*datetime)
}
