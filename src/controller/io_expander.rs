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

//! MCP23017 I/O expander boards (Slice of Pi/O)
//!
//! No bus traffic yet: the controller keeps the port images it would send so
//! callers and tests can see the payload. Each chip drives 16 stations, port A
//! carrying stations 0-7 and port B 8-15, bit n = station n within the port.

use std::sync::Mutex;

use super::{lock, ControllerParams, Polarity, Settings, ValveController};
use crate::error::ValveError;

pub const DESCRIPTION: &str = "i2c_sr: IO expander using one or more MCP23017";

pub const STATIONS_PER_CHIP: usize = 16;

/// GPIOA/GPIOB register values for one chip.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct PortImage {
    pub gpio_a: u8,
    pub gpio_b: u8,
}

/// Pack a station vector into per-chip port images, polarity applied.
/// Unused outputs on the last chip are driven to the "off" level.
pub fn pack_ports(stations: &[bool], polarity: Polarity) -> Vec<PortImage> {
    let chips = stations.len().div_ceil(STATIONS_PER_CHIP);
    let mut images = Vec::with_capacity(chips);
    for chip in 0..chips {
        let mut word: u16 = 0;
        for bit in 0..STATIONS_PER_CHIP {
            let on = stations.get(chip * STATIONS_PER_CHIP + bit).copied().unwrap_or(false);
            if polarity.level_for(on).as_bit() == 1 {
                word |= 1 << bit;
            }
        }
        images.push(PortImage { gpio_a: (word & 0xff) as u8, gpio_b: (word >> 8) as u8 });
    }
    images
}

#[derive(Debug)]
struct ExpanderState {
    settings: Settings,
    ports: Vec<PortImage>,
}

#[derive(Debug)]
pub struct IoExpander {
    state: Mutex<ExpanderState>,
}

impl IoExpander {
    pub fn new(params: ControllerParams) -> Self {
        Self { state: Mutex::new(ExpanderState { settings: params.into(), ports: Vec::new() }) }
    }

    pub fn ports(&self) -> Vec<PortImage> {
        lock(&self.state).ports.clone()
    }
}

impl ValveController for IoExpander {
    fn describe(&self) -> &'static str {
        DESCRIPTION
    }

    fn polarity(&self) -> Polarity {
        lock(&self.state).settings.polarity
    }

    fn set_polarity(&self, polarity: Polarity) {
        lock(&self.state).settings.polarity = polarity;
    }

    fn station_count(&self) -> usize {
        lock(&self.state).settings.station_count
    }

    fn set_station_count(&self, count: usize) {
        lock(&self.state).settings.station_count = count;
    }

    fn write_output(&self, stations: &[bool]) -> Result<(), ValveError> {
        let mut state = lock(&self.state);
        state.settings.check_len(stations)?;
        state.ports = pack_ports(stations, state.settings.polarity);
        Ok(())
    }

    fn release_hardware(&self) {
        lock(&self.state).ports.clear();
    }
}
