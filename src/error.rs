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

use thiserror::Error;

use crate::gpio::GpioError;
use crate::pins::ClaimError;

/// Errors surfaced by valve controllers.
#[derive(Error, Debug)]
pub enum ValveError {
    /// A required pin could not be claimed; fatal to construction.
    #[error("Pin claim failed: {0}")]
    PinClaim(#[from] ClaimError),
    /// The GPIO layer refused to configure a line during construction.
    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),
    /// A write failed part way through a shift sequence. Output was left disabled.
    #[error("Transient write failure on {role} line: {source}")]
    TransientWrite {
        role: &'static str,
        source: GpioError,
    },
    #[error("Station vector has {actual} entries, controller expects {expected}")]
    StationCountMismatch { expected: usize, actual: usize },
    #[error("Hardware already released")]
    Released,
}

impl ValveError {
    /// Errors the scheduling loop should log and move past.
    pub fn is_transient(&self) -> bool {
        matches!(self, ValveError::TransientWrite { .. })
    }
}
