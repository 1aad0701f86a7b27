//! Button debouncing.
//!
//! Mechanical switches bounce for a few milliseconds when they close or open.
//! Each [`Button`] tracks the last raw level it saw and when that level last
//! changed; the debounced (stable) level only follows the raw level once it has
//! held steady for longer than the debounce window.
//!
//! Buttons are wired active-low: [`PinState::Low`] means physically pressed.
//! Only the transition of the stable level *to* pressed produces a
//! [`PressEvent`], releases are silent.

use embedded_hal::digital::{Error as _, ErrorKind, InputPin, PinState};
use heapless::Vec;

/// Default debounce window in milliseconds.
pub const DEBOUNCE_MS: u64 = 200;

/// The four physical controls, in the order their events are applied.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonId {
    /// +1 hour (clock or alarm)
    Hour = 0,
    /// +1 minute (clock or alarm)
    Minute = 1,
    /// Cycle through the modes
    Mode = 2,
    /// Toggle the alarm, or silence it while sounding
    Alarm = 3,
}

impl ButtonId {
    /// All buttons in event order.
    pub const ALL: [ButtonId; 4] = [
        ButtonId::Hour,
        ButtonId::Minute,
        ButtonId::Mode,
        ButtonId::Alarm,
    ];
}

/// A debounced falling edge on one button.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PressEvent {
    pub button: ButtonId,
    /// Monotonic time of the poll that recognised the press.
    pub at_ms: u64,
}

/// Debounce state for a single button.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Button {
    id: ButtonId,
    last_raw: PinState,
    stable: PinState,
    last_change_ms: u64,
}

impl Button {
    pub fn new(id: ButtonId) -> Self {
        Self {
            id,
            last_raw: PinState::High,
            stable: PinState::High,
            last_change_ms: 0,
        }
    }

    pub fn id(&self) -> ButtonId {
        self.id
    }

    /// The debounced level.
    pub fn stable(&self) -> PinState {
        self.stable
    }

    pub fn is_pressed(&self) -> bool {
        self.stable == PinState::Low
    }

    /// Feeds one raw sample taken at `now_ms`.
    ///
    /// Returns a press event when the stable level has just become pressed.
    pub fn poll(&mut self, raw: PinState, now_ms: u64, debounce_ms: u64) -> Option<PressEvent> {
        if raw != self.last_raw {
            self.last_change_ms = now_ms;
            self.last_raw = raw;
        }

        if now_ms.saturating_sub(self.last_change_ms) > debounce_ms && raw != self.stable {
            self.stable = raw;
            if raw == PinState::Low {
                return Some(PressEvent {
                    button: self.id,
                    at_ms: now_ms,
                });
            }
        }
        None
    }
}

/// Raw levels of all four buttons, indexed by [`ButtonId`].
pub type RawLevels = [PinState; 4];

/// All released.
pub const RELEASED: RawLevels = [PinState::High; 4];

/// Debounces the four buttons together.
#[derive(Clone, Debug)]
pub struct ButtonBank {
    buttons: [Button; 4],
    debounce_ms: u64,
}

impl ButtonBank {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            buttons: ButtonId::ALL.map(Button::new),
            debounce_ms,
        }
    }

    pub fn button(&self, id: ButtonId) -> &Button {
        &self.buttons[id as usize]
    }

    /// Polls every button once, returning the press events in [`ButtonId::ALL`] order.
    pub fn poll(&mut self, levels: RawLevels, now_ms: u64) -> Vec<PressEvent, 4> {
        let mut events = Vec::new();
        for (button, level) in self.buttons.iter_mut().zip(levels) {
            if let Some(event) = button.poll(level, now_ms, self.debounce_ms) {
                debug!("press: {:?} at {} ms", event.button, now_ms);
                // At most one event per button, capacity is never exceeded.
                let _ = events.push(event);
            }
        }
        events
    }
}

impl Default for ButtonBank {
    fn default() -> Self {
        Self::new(DEBOUNCE_MS)
    }
}

/// The four button input pins, ordered like [`ButtonId::ALL`].
pub struct ButtonInputs<P: InputPin> {
    pins: [P; 4],
}

impl<P: InputPin> ButtonInputs<P> {
    pub fn new(hour: P, minute: P, mode: P, alarm: P) -> Self {
        Self {
            pins: [hour, minute, mode, alarm],
        }
    }

    /// Reads the raw level of every pin.
    pub fn sample(&mut self) -> Result<RawLevels, ErrorKind> {
        let mut levels = RELEASED;
        for (level, pin) in levels.iter_mut().zip(self.pins.iter_mut()) {
            let low = pin.is_low().map_err(|e| e.kind())?;
            *level = PinState::from(!low);
        }
        Ok(levels)
    }

    /// Gives the pins back.
    pub fn release(self) -> [P; 4] {
        self.pins
    }
}
