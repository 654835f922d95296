/*
 * This file is part of Sprinkler.
 *
 * Copyright (C) 2025 Sprinkler contributors
 *
 * Sprinkler is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Sprinkler is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Sprinkler. If not, see <https://www.gnu.org/licenses/>.
 */

//! Valve controllers
//!
//! A valve controller models the hardware that switches irrigation valve
//! relays. Each one tracks how many stations it drives and which physical
//! level means "ON" (relay boards come in both active-high and active-low
//! flavours). The scheduler hands over a full station vector once per tick
//! and the controller turns it into pin activity.
//!
//! Variants:
//! - [`BitBangShiftRegister`]: 74HC595 chain on four GPIO lines
//! - [`IoExpander`]: MCP23017 expander (no bus traffic yet)
//! - [`Simulator`]: bookkeeping only, never touches GPIO

pub mod io_expander;
pub mod shift_register;
pub mod simulator;

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::ValveError;
use crate::gpio::{Gpio, Level};
use crate::pins::PinRegistry;
use crate::system::Platform;

pub use io_expander::IoExpander;
pub use shift_register::{BitBangShiftRegister, ShiftRegisterPins};
pub use simulator::Simulator;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

impl Polarity {
    pub fn from_active_low(active_low: bool) -> Self {
        if active_low { Polarity::ActiveLow } else { Polarity::ActiveHigh }
    }

    pub fn on_level(self) -> Level {
        match self {
            Polarity::ActiveHigh => Level::High,
            Polarity::ActiveLow => Level::Low,
        }
    }

    pub fn off_level(self) -> Level {
        self.on_level().inverted()
    }

    /// Physical level that puts a station into the requested logical state.
    pub fn level_for(self, on: bool) -> Level {
        if on { self.on_level() } else { self.off_level() }
    }
}

/// Construction parameters shared by every backend.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ControllerParams {
    pub station_count: usize,
    pub polarity: Polarity,
    pub quiet: bool,
}

impl ControllerParams {
    pub fn new(station_count: usize, polarity: Polarity) -> Self {
        Self { station_count, polarity, quiet: false }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}

/// Process-scoped hardware state handed to constructors.
#[derive(Clone)]
pub struct HardwareContext {
    pub gpio: Arc<dyn Gpio>,
    pub pins: Arc<PinRegistry>,
    pub platform: Platform,
    /// Header pins for the shift register; `None` uses the platform defaults.
    pub shift_register_pins: Option<ShiftRegisterPins>,
}

impl HardwareContext {
    pub fn new(gpio: Arc<dyn Gpio>, pins: Arc<PinRegistry>, platform: Platform) -> Self {
        Self { gpio, pins, platform, shift_register_pins: None }
    }

    pub fn with_shift_register_pins(mut self, pins: ShiftRegisterPins) -> Self {
        self.shift_register_pins = Some(pins);
        self
    }
}

pub trait ValveController: Send + Sync {
    /// Static identifier, e.g. `"bbsr: ..."`.
    fn describe(&self) -> &'static str;

    fn polarity(&self) -> Polarity;

    /// Applies to later writes only; already latched outputs are left alone.
    fn set_polarity(&self, polarity: Polarity);

    fn station_count(&self) -> usize;

    /// Changes the expected vector length. Nothing is retransmitted.
    fn set_station_count(&self, count: usize);

    /// Drive every station to the state in `stations`.
    ///
    /// `stations.len()` must equal [`station_count`](Self::station_count);
    /// anything else is rejected before any hardware is touched.
    fn write_output(&self, stations: &[bool]) -> Result<(), ValveError>;

    /// Return claimed pins to inputs and drop the claims. Safe to repeat.
    fn release_hardware(&self);
}

/// Station count and polarity, the state every variant carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub station_count: usize,
    pub polarity: Polarity,
}

impl Settings {
    pub fn check_len(&self, stations: &[bool]) -> Result<(), ValveError> {
        if stations.len() != self.station_count {
            return Err(ValveError::StationCountMismatch {
                expected: self.station_count,
                actual: stations.len(),
            });
        }
        Ok(())
    }
}

impl From<ControllerParams> for Settings {
    fn from(p: ControllerParams) -> Self {
        Settings { station_count: p.station_count, polarity: p.polarity }
    }
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
