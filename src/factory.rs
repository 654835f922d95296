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

//! Backend registry and controller factory
//!
//! Unknown backend names never fail: they resolve to the virtual simulator so
//! the daemon still starts. That also means nothing gets watered, so callers
//! should check [`is_simulator`](crate::controller::simulator::is_simulator)
//! on the result and tell the operator.

use std::collections::BTreeMap;

use serde_json::json;

use crate::controller::io_expander::{self, IoExpander};
use crate::controller::shift_register::{self, BitBangShiftRegister};
use crate::controller::simulator::{self, Simulator, SimulatorKind};
use crate::controller::{ControllerParams, HardwareContext, Polarity, ValveController};
use crate::error::ValveError;
use crate::logger;

pub type Constructor =
    fn(&HardwareContext, ControllerParams) -> Result<Box<dyn ValveController>, ValveError>;

#[derive(Clone)]
pub struct Backend {
    pub name: &'static str,
    pub description: &'static str,
    pub construct: Constructor,
}

fn build_shift_register(
    ctx: &HardwareContext,
    params: ControllerParams,
) -> Result<Box<dyn ValveController>, ValveError> {
    Ok(Box::new(BitBangShiftRegister::new(ctx, params)?))
}

fn build_io_expander(
    _ctx: &HardwareContext,
    params: ControllerParams,
) -> Result<Box<dyn ValveController>, ValveError> {
    Ok(Box::new(IoExpander::new(params)))
}

fn build_simulated(
    _ctx: &HardwareContext,
    params: ControllerParams,
) -> Result<Box<dyn ValveController>, ValveError> {
    Ok(Box::new(Simulator::new(SimulatorKind::Simulated, params)))
}

/// Names that pick the quiet virtual controller on purpose.
const QUIET_NAMES: [&str; 2] = ["virtual", "none"];

#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<&'static str, Backend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        reg.register(Backend {
            name: "bbsr",
            description: shift_register::DESCRIPTION,
            construct: build_shift_register,
        });
        reg.register(Backend {
            name: "i2c_sr",
            description: io_expander::DESCRIPTION,
            construct: build_io_expander,
        });
        reg.register(Backend {
            name: "sim_vc",
            description: simulator::SIMULATED_DESCRIPTION,
            construct: build_simulated,
        });
        reg
    }

    /// Later registrations under the same name replace earlier ones.
    pub fn register(&mut self, backend: Backend) {
        self.backends.insert(backend.name, backend);
    }

    pub fn get(&self, name: &str) -> Option<&Backend> {
        self.backends.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.backends.keys().copied().collect()
    }

    /// Name to description table, including the pseudo backends.
    pub fn descriptions(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        out.insert(
            "no_vc".to_string(),
            "no_vc: disable valve controller and sending of zone_changed signal".to_string(),
        );
        out.insert("virtual".to_string(), simulator::VIRTUAL_DESCRIPTION.to_string());
        for b in self.backends.values() {
            out.insert(b.name.to_string(), b.description.to_string());
        }
        out
    }

    pub fn create(
        &self,
        ctx: &HardwareContext,
        name: &str,
        station_count: usize,
        polarity: Polarity,
    ) -> Result<Box<dyn ValveController>, ValveError> {
        let params = ControllerParams::new(station_count, polarity);
        let controller: Box<dyn ValveController> = match self.backends.get(name) {
            Some(backend) => (backend.construct)(ctx, params)?,
            None => {
                let quiet = QUIET_NAMES.contains(&name);
                Box::new(Simulator::new(SimulatorKind::Virtual, params.quiet(quiet)))
            }
        };
        logger::log_event(
            "controller_created",
            json!({
                "requested": name,
                "describe": controller.describe(),
                "stations": station_count,
                "polarity": polarity,
            }),
        );
        Ok(controller)
    }
}
