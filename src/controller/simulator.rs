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

use std::sync::Mutex;

use serde_json::json;

use super::{lock, ControllerParams, Polarity, Settings, ValveController};
use crate::error::ValveError;
use crate::logger;

pub const VIRTUAL_DESCRIPTION: &str = "virtual: VirtualValveController used for demo and debug";
pub const SIMULATED_DESCRIPTION: &str = "sim_vc: Simulated Valve Controller sans hardware";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SimulatorKind {
    /// Fallback for unknown, `virtual` and `none` backends.
    Virtual,
    /// The registered `sim_vc` backend.
    Simulated,
}

impl SimulatorKind {
    pub fn description(self) -> &'static str {
        match self {
            SimulatorKind::Virtual => VIRTUAL_DESCRIPTION,
            SimulatorKind::Simulated => SIMULATED_DESCRIPTION,
        }
    }
}

/// True for identifiers returned by [`Simulator::describe`](ValveController::describe).
pub fn is_simulator(description: &str) -> bool {
    description == VIRTUAL_DESCRIPTION || description == SIMULATED_DESCRIPTION
}

#[derive(Debug)]
struct SimState {
    settings: Settings,
    last_output: Option<Vec<bool>>,
    writes: u64,
}

/// Accepts station vectors and remembers them; no pins, no GPIO calls.
#[derive(Debug)]
pub struct Simulator {
    kind: SimulatorKind,
    quiet: bool,
    state: Mutex<SimState>,
}

impl Simulator {
    pub fn new(kind: SimulatorKind, params: ControllerParams) -> Self {
        Self {
            kind,
            quiet: params.quiet,
            state: Mutex::new(SimState { settings: params.into(), last_output: None, writes: 0 }),
        }
    }

    pub fn kind(&self) -> SimulatorKind {
        self.kind
    }

    pub fn last_output(&self) -> Option<Vec<bool>> {
        lock(&self.state).last_output.clone()
    }

    pub fn write_count(&self) -> u64 {
        lock(&self.state).writes
    }
}

impl ValveController for Simulator {
    fn describe(&self) -> &'static str {
        self.kind.description()
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
        if !self.quiet {
            let levels: Vec<u8> = stations
                .iter()
                .map(|&on| state.settings.polarity.level_for(on).as_bit())
                .collect();
            logger::log_event(
                "simulated_output",
                json!({ "backend": self.describe(), "levels": levels }),
            );
        }
        state.last_output = Some(stations.to_vec());
        state.writes += 1;
        Ok(())
    }

    fn release_hardware(&self) {}
}
