//! Time collaborators.
//!
//! The wall clock comes from a [`TimeSource`] (usually a battery-backed RTC) and
//! is only read and written once or twice per tick. Debouncing and the beep
//! cadence need a finer, monotonic millisecond counter: [`MonotonicClock`].

use chrono::NaiveDateTime;

/// A settable wall clock.
pub trait TimeSource {
    type Error;

    /// Brings the clock up. Failure here is fatal for the controller.
    fn init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// The current date and time.
    fn now(&mut self) -> Result<NaiveDateTime, Self::Error>;

    /// Replaces the current date and time.
    fn set(&mut self, datetime: &NaiveDateTime) -> Result<(), Self::Error>;
}

/// Milliseconds since an arbitrary, fixed origin. Never goes backwards.
pub trait MonotonicClock {
    fn now_millis(&mut self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for &mut T {
    type Error = T::Error;

    fn init(&mut self) -> Result<(), Self::Error> {
        T::init(self)
    }

    fn now(&mut self) -> Result<NaiveDateTime, Self::Error> {
        T::now(self)
    }

    fn set(&mut self, datetime: &NaiveDateTime) -> Result<(), Self::Error> {
        T::set(self, datetime)
    }
}
