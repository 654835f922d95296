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

//! Bit-banged 74HC595 shift register (OSPi / SIP boards)
//!
//! Four GPIO lines drive the chain:
//! - DATA: serial bit, sampled on the CLOCK rising edge
//! - CLOCK: shifts every stage one place down the chain
//! - LATCH: rising edge copies the shift stage to the output stage
//! - OUTPUT-ENABLE: active low; HIGH forces every output off
//!
//! One transfer is: disable outputs, prime CLOCK/LATCH low, shift the vector
//! in reverse order, pulse LATCH, enable outputs. Bits go out last station
//! first, so after N clocks station 0 sits in the first stage and lands on
//! the first physical output.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{lock, ControllerParams, HardwareContext, Polarity, Settings, ValveController};
use crate::error::ValveError;
use crate::gpio::{Gpio, GpioError, Level};
use crate::logger;
use crate::pins::{PinHandle, PinRegistry};
use crate::system::Platform;

pub const DESCRIPTION: &str = "bbsr: BitBanged shift reg compatible with OSPi/SIP";

/// Header pin numbers for the four control lines.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftRegisterPins {
    pub data: u32,
    pub clock: u32,
    pub output_enable: u32,
    pub latch: u32,
}

impl ShiftRegisterPins {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::RaspberryPi => Self { data: 13, clock: 7, output_enable: 11, latch: 15 },
            // header numbers on connector P9
            Platform::BeagleBone => Self { data: 11, clock: 13, output_enable: 14, latch: 12 },
            Platform::Simulated => Self { data: 3, clock: 4, output_enable: 5, latch: 6 },
        }
    }

    pub fn headers(&self) -> [u32; 4] {
        [self.data, self.clock, self.output_enable, self.latch]
    }

    pub fn is_distinct(&self) -> bool {
        let h = self.headers();
        (0..h.len()).all(|i| !h[i + 1..].contains(&h[i]))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PinRole {
    Data,
    Clock,
    OutputEnable,
    Latch,
}

impl PinRole {
    pub fn name(self) -> &'static str {
        match self {
            PinRole::Data => "data",
            PinRole::Clock => "clock",
            PinRole::OutputEnable => "output-enable",
            PinRole::Latch => "latch",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PinBinding {
    pub role: PinRole,
    pub handle: PinHandle,
}

#[derive(Debug)]
struct ShiftState {
    settings: Settings,
    released: bool,
}

type StepResult = Result<(), (&'static str, GpioError)>;

pub struct BitBangShiftRegister {
    gpio: Arc<dyn Gpio>,
    registry: Arc<PinRegistry>,
    data: PinBinding,
    clock: PinBinding,
    output_enable: PinBinding,
    latch: PinBinding,
    state: Mutex<ShiftState>,
    failed_writes: AtomicU64,
    quiet: bool,
}

/// Claim all four pins non-shareable, or none of them.
fn claim_all(registry: &PinRegistry, pins: &ShiftRegisterPins) -> Result<[PinBinding; 4], ValveError> {
    let wanted = [
        (PinRole::Data, pins.data),
        (PinRole::Clock, pins.clock),
        (PinRole::OutputEnable, pins.output_enable),
        (PinRole::Latch, pins.latch),
    ];
    let mut claimed: Vec<PinBinding> = Vec::with_capacity(wanted.len());
    for (role, header) in wanted {
        match registry.claim(header, false) {
            Ok(handle) => claimed.push(PinBinding { role, handle }),
            Err(e) => {
                for b in &claimed {
                    registry.release(b.handle.header);
                }
                return Err(e.into());
            }
        }
    }
    Ok([claimed[0], claimed[1], claimed[2], claimed[3]])
}

impl BitBangShiftRegister {
    pub fn new(ctx: &HardwareContext, params: ControllerParams) -> Result<Self, ValveError> {
        let pins = ctx
            .shift_register_pins
            .unwrap_or_else(|| ShiftRegisterPins::for_platform(ctx.platform));
        let [data, clock, output_enable, latch] = claim_all(&ctx.pins, &pins)?;

        // From here on, dropping `sr` on an error path releases the pins.
        let sr = Self {
            gpio: ctx.gpio.clone(),
            registry: ctx.pins.clone(),
            data,
            clock,
            output_enable,
            latch,
            state: Mutex::new(ShiftState { settings: params.into(), released: false }),
            failed_writes: AtomicU64::new(0),
            quiet: params.quiet,
        };
        sr.setup_lines()?;
        sr.write_output(&vec![false; params.station_count])?;

        logger::log_event(
            "shift_register_ready",
            json!({
                "data": data.handle.header,
                "clock": clock.handle.header,
                "output_enable": output_enable.handle.header,
                "latch": latch.handle.header,
                "stations": params.station_count,
                "polarity": params.polarity,
            }),
        );
        Ok(sr)
    }

    fn setup_lines(&self) -> Result<(), ValveError> {
        for b in [self.output_enable, self.clock, self.data, self.latch] {
            self.gpio.configure_output(b.handle.line)?;
        }
        // outputs stay disabled until the first full pattern is latched
        self.gpio.write(self.output_enable.handle.line, Level::High)?;
        self.gpio.write(self.clock.handle.line, Level::Low)?;
        self.gpio.write(self.data.handle.line, Level::Low)?;
        self.gpio.write(self.latch.handle.line, Level::Low)?;
        Ok(())
    }

    pub fn bindings(&self) -> [PinBinding; 4] {
        [self.data, self.clock, self.output_enable, self.latch]
    }

    /// Number of transfers aborted by a GPIO write failure.
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    fn drive(&self, binding: PinBinding, level: Level) -> StepResult {
        self.gpio
            .write(binding.handle.line, level)
            .map_err(|e| (binding.role.name(), e))
    }

    fn shift_out(&self, stations: &[bool], polarity: Polarity) -> StepResult {
        self.drive(self.output_enable, Level::High)?;
        self.drive(self.clock, Level::Low)?;
        self.drive(self.latch, Level::Low)?;
        for &on in stations.iter().rev() {
            self.drive(self.clock, Level::Low)?;
            self.drive(self.data, polarity.level_for(on))?;
            self.drive(self.clock, Level::High)?;
        }
        self.drive(self.latch, Level::High)?;
        self.drive(self.output_enable, Level::Low)
    }
}

impl ValveController for BitBangShiftRegister {
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
        // held for the whole transfer so concurrent callers cannot interleave
        let state = lock(&self.state);
        if state.released {
            return Err(ValveError::Released);
        }
        state.settings.check_len(stations)?;

        match self.shift_out(stations, state.settings.polarity) {
            Ok(()) => {
                if !self.quiet {
                    let pattern: String = stations.iter().map(|&on| if on { '1' } else { '0' }).collect();
                    logger::log_event("shift_out", json!({ "stations": pattern }));
                }
                Ok(())
            }
            Err((role, source)) => {
                // Never leave outputs enabled over a half-shifted chain.
                let _ = self.gpio.write(self.output_enable.handle.line, Level::High);
                let total = self.failed_writes.fetch_add(1, Ordering::Relaxed) + 1;
                logger::log_event(
                    "shift_aborted",
                    json!({ "role": role, "error": source.to_string(), "failed_writes": total }),
                );
                Err(ValveError::TransientWrite { role, source })
            }
        }
    }

    fn release_hardware(&self) {
        let mut state = lock(&self.state);
        if state.released {
            return;
        }
        state.released = true;
        let headers = [
            self.data.handle.header,
            self.clock.handle.header,
            self.output_enable.handle.header,
            self.latch.handle.header,
        ];
        let released = self.registry.cleanup(self.gpio.as_ref(), Some(&headers[..]));
        logger::log_event("shift_register_released", json!({ "pins": released }));
    }
}

impl Drop for BitBangShiftRegister {
    fn drop(&mut self) {
        self.release_hardware();
    }
}
