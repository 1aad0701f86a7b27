//! DS3231 time source.
//!
//! A small driver for the DS3231 precision RTC covering what the clock needs:
//! reading and writing the date/time registers and keeping the oscillator alive
//! on battery power.
//!
//! # Register Model
//!
//! The date and time live in 7 consecutive BCD registers starting at `0x00`:
//! seconds, minutes, hours, day of week, date, month (with the century bit) and
//! year. Hours may have been written in 12-hour format by other software; they
//! are decoded either way and always written back in 24-hour format.
//!
//! # Lost power
//!
//! The oscillator-stop flag is set when the chip lost all power (no coin cell)
//! and its time is meaningless. [`DS3231::init`] then writes a fallback time
//! and clears the flag.

use bitfield::bitfield;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use embedded_hal::i2c::I2c;
use paste::paste;

use crate::time::TimeSource;

/// Default I2C address.
pub const DS3231_ADDRESS: u8 = 0x68;

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegAddr {
    /// First of the 7 date/time registers
    Seconds = 0x00,
    Control = 0x0E,
    ControlStatus = 0x0F,
}

bitfield! {
    /// Hours register.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Hours(u8);
    impl Debug;
    pub twelve_hour, set_twelve_hour: 6;
    pub pm, set_pm: 5;
    pub bcd24, set_bcd24: 5, 0;
    pub bcd12, set_bcd12: 4, 0;
}

bitfield! {
    /// Month register.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Month(u8);
    impl Debug;
    pub century, set_century: 7;
    pub bcd, set_bcd: 4, 0;
}

bitfield! {
    /// Control register.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Control(u8);
    impl Debug;
    /// Stops the oscillator while running on battery when set.
    pub disable_oscillator, set_disable_oscillator: 7;
    pub interrupt_control, set_interrupt_control: 2;
}

bitfield! {
    /// Control/status register.
    #[derive(Clone, Copy, Default, PartialEq)]
    pub struct Status(u8);
    impl Debug;
    pub oscillator_stop_flag, set_oscillator_stop_flag: 7;
    pub enable_32khz_output, set_enable_32khz_output: 3;
    pub busy, set_busy: 2;
}

#[derive(Debug)]
pub enum DS3231Error<I2CE> {
    I2c(I2CE),
    /// The registers do not hold a valid date and time
    InvalidDateTime,
    /// Only years 2000-2199 can be stored
    YearOutOfRange(i32),
}

impl<I2CE> From<I2CE> for DS3231Error<I2CE> {
    fn from(e: I2CE) -> Self {
        DS3231Error::I2c(e)
    }
}

bitfield! {
    /// One BCD encoded byte.
    #[derive(Clone, Copy, Default, PartialEq)]
    struct Bcd(u8);
    impl Debug;
    tens, _: 7, 4;
    ones, _: 3, 0;
}

// `None` when either nibble is above 9.
fn bcd_decode(raw: u8) -> Option<u32> {
    let bcd = Bcd(raw);
    if bcd.tens() > 9 || bcd.ones() > 9 {
        return None;
    }
    Some(u32::from(bcd.tens()) * 10 + u32::from(bcd.ones()))
}

// `value` must be below 100.
fn bcd_encode(value: u32) -> u8 {
    (((value / 10) << 4) | (value % 10)) as u8
}

/// Decodes the 7 date/time registers.
pub(crate) fn decode_datetime(data: &[u8; 7]) -> Option<NaiveDateTime> {
    let seconds = bcd_decode(data[0] & 0x7F)?;
    let minutes = bcd_decode(data[1] & 0x7F)?;
    let hours = Hours(data[2]);
    let hours = if hours.twelve_hour() {
        match (bcd_decode(hours.bcd12())?, hours.pm()) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        }
    } else {
        bcd_decode(hours.bcd24())?
    };
    let date = bcd_decode(data[4] & 0x3F)?;
    let month = Month(data[5]);
    let century = if month.century() { 100 } else { 0 };
    let year = 2000 + century + bcd_decode(data[6])? as i32;

    NaiveDate::from_ymd_opt(year, bcd_decode(month.bcd())?, date)
        .and_then(|d| d.and_hms_opt(hours, minutes, seconds))
}

/// Encodes a date/time into the 7 date/time registers, 24-hour format.
pub(crate) fn encode_datetime<E>(
    datetime: &NaiveDateTime,
) -> Result<[u8; 7], DS3231Error<E>> {
    let year = datetime.year();
    if !(2000..=2199).contains(&year) {
        return Err(DS3231Error::YearOutOfRange(year));
    }
    let offset = (year - 2000) as u32;

    let mut hours = Hours::default();
    hours.set_bcd24(bcd_encode(datetime.hour()));
    let mut month = Month::default();
    month.set_bcd(bcd_encode(datetime.month()));
    month.set_century(offset >= 100);

    Ok([
        bcd_encode(datetime.second()),
        bcd_encode(datetime.minute()),
        hours.0,
        datetime.weekday().number_from_sunday() as u8,
        bcd_encode(datetime.day()),
        month.0,
        bcd_encode(offset % 100),
    ])
}

macro_rules! register_access {
    ($(($name:ident, $regaddr:expr, $typ:ident)),+ $(,)?) => {
        $(
            paste! {
                #[doc = concat!("Reads the ", stringify!($name), " register.")]
                pub fn $name(&mut self) -> Result<$typ, DS3231Error<I2C::Error>> {
                    let mut data = [0];
                    self.i2c
                        .write_read(self.address, &[$regaddr as u8], &mut data)?;
                    Ok($typ(data[0]))
                }

                #[doc = concat!("Writes the ", stringify!($name), " register.")]
                pub fn [<set_ $name>](&mut self, value: $typ) -> Result<(), DS3231Error<I2C::Error>> {
                    self.i2c.write(self.address, &[$regaddr as u8, value.0])?;
                    Ok(())
                }
            }
        )+
    };
}

/// DS3231 on an I2C bus.
pub struct DS3231<I2C: I2c> {
    i2c: I2C,
    address: u8,
    fallback: Option<NaiveDateTime>,
}

impl<I2C: I2c> DS3231<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            fallback: None,
        }
    }

    /// Time written by [`DS3231::init`] after a power loss, 2000-01-01 00:00:00
    /// unless set here.
    #[must_use]
    pub fn with_fallback(mut self, datetime: NaiveDateTime) -> Self {
        self.fallback = Some(datetime);
        self
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    register_access!(
        (control, RegAddr::Control, Control),
        (status, RegAddr::ControlStatus, Status),
    );

    pub fn datetime(&mut self) -> Result<NaiveDateTime, DS3231Error<I2C::Error>> {
        let mut data = [0; 7];
        self.i2c
            .write_read(self.address, &[RegAddr::Seconds as u8], &mut data)?;
        decode_datetime(&data).ok_or(DS3231Error::InvalidDateTime)
    }

    pub fn set_datetime(
        &mut self,
        datetime: &NaiveDateTime,
    ) -> Result<(), DS3231Error<I2C::Error>> {
        let data = encode_datetime::<I2C::Error>(datetime)?;
        let mut frame = [0; 8];
        frame[0] = RegAddr::Seconds as u8;
        frame[1..].copy_from_slice(&data);
        self.i2c.write(self.address, &frame)?;
        debug!(
            "ds3231: set {}:{}:{}",
            datetime.hour(),
            datetime.minute(),
            datetime.second()
        );
        Ok(())
    }

    fn fallback(&self) -> Result<NaiveDateTime, DS3231Error<I2C::Error>> {
        match self.fallback {
            Some(datetime) => Ok(datetime),
            None => NaiveDate::from_ymd_opt(2000, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .ok_or(DS3231Error::InvalidDateTime),
        }
    }
}

impl<I2C: I2c> TimeSource for DS3231<I2C> {
    type Error = DS3231Error<I2C::Error>;

    /// Keeps the oscillator running on battery, recovers from a power loss and
    /// checks that the time registers are readable.
    fn init(&mut self) -> Result<(), Self::Error> {
        let mut control = self.control()?;
        if control.disable_oscillator() {
            control.set_disable_oscillator(false);
            self.set_control(control)?;
        }

        let mut status = self.status()?;
        if status.oscillator_stop_flag() {
            warn!("ds3231: oscillator stopped, time was lost");
            let fallback = self.fallback()?;
            self.set_datetime(&fallback)?;
            status.set_oscillator_stop_flag(false);
            self.set_status(status)?;
        }

        self.datetime()?;
        info!("ds3231: ready");
        Ok(())
    }

    fn now(&mut self) -> Result<NaiveDateTime, Self::Error> {
        self.datetime()
    }

    fn set(&mut self, datetime: &NaiveDateTime) -> Result<(), Self::Error> {
        self.set_datetime(datetime)
    }
}
