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

//! Header pin claims
//!
//! Components claim header pins before touching them. A pin first claimed as
//! non-shareable is blocked for everybody until it is released; a pin first
//! claimed as shareable hands the same handle to later callers.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::json;
use thiserror::Error;

use crate::gpio::{Gpio, Pull};
use crate::logger;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("pin #{pin} is allocated and not shareable")]
    Conflict { pin: u32 },
    #[error("pin #{pin} is not usable on this platform")]
    Unusable { pin: u32 },
}

/// A claimed header pin and the GPIO line it drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinHandle {
    pub header: u32,
    pub line: u32,
}

/// Header pin number to GPIO line lookup. Entry 0 (or a missing entry) means unusable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinMap {
    lines: Vec<u32>,
}

impl PinMap {
    /// Table indexed by header pin number; index 0 is never a real pin.
    pub fn from_table(lines: Vec<u32>) -> Self {
        Self { lines }
    }

    /// Every header pin 1..=count maps to the line with the same number.
    pub fn identity(count: u32) -> Self {
        Self { lines: (0..=count).collect() }
    }

    pub fn lookup(&self, header: u32) -> Option<u32> {
        match self.lines.get(header as usize) {
            Some(0) | None => None,
            Some(line) => Some(*line),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Claim {
    line: u32,
    shareable: bool,
}

#[derive(Debug)]
pub struct PinRegistry {
    map: PinMap,
    claims: Mutex<HashMap<u32, Claim>>,
}

impl PinRegistry {
    pub fn new(map: PinMap) -> Self {
        Self { map, claims: Mutex::new(HashMap::new()) }
    }

    fn claims(&self) -> MutexGuard<'_, HashMap<u32, Claim>> {
        match self.claims.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn map(&self) -> &PinMap {
        &self.map
    }

    pub fn claim(&self, header: u32, shareable: bool) -> Result<PinHandle, ClaimError> {
        let line = self.map.lookup(header).ok_or(ClaimError::Unusable { pin: header })?;
        let mut claims = self.claims();
        if let Some(existing) = claims.get(&header) {
            if existing.shareable {
                return Ok(PinHandle { header, line: existing.line });
            }
            logger::log_event("pin_claim_conflict", json!({ "pin": header }));
            return Err(ClaimError::Conflict { pin: header });
        }
        claims.insert(header, Claim { line, shareable });
        Ok(PinHandle { header, line })
    }

    /// Returns whether the pin was claimed.
    pub fn release(&self, header: u32) -> bool {
        self.claims().remove(&header).is_some()
    }

    pub fn is_claimed(&self, header: u32) -> bool {
        self.claims().contains_key(&header)
    }

    pub fn claimed_count(&self) -> usize {
        self.claims().len()
    }

    /// Return claimed pins to high-impedance inputs and drop their claims.
    ///
    /// `None` cleans every claimed pin. Pins that are not claimed are skipped,
    /// so calling this twice only touches hardware once. Returns the number
    /// of pins released.
    pub fn cleanup(&self, gpio: &dyn Gpio, headers: Option<&[u32]>) -> usize {
        let mut claims = self.claims();
        let targets: Vec<u32> = match headers {
            Some(list) => list.iter().copied().filter(|h| claims.contains_key(h)).collect(),
            None => claims.keys().copied().collect(),
        };
        for header in &targets {
            if let Some(claim) = claims.remove(header) {
                if let Err(e) = gpio.configure_input(claim.line, Pull::Off) {
                    logger::log_event(
                        "pin_cleanup_error",
                        json!({ "pin": header, "line": claim.line, "error": e.to_string() }),
                    );
                }
            }
        }
        targets.len()
    }
}
