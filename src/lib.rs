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

//! Sprinkler - irrigation valve output for single-board computers
//!
//! This library turns per-station on/off vectors from a scheduler into relay
//! signals: a 74HC595 shift register chain driven over GPIO, an MCP23017
//! expander, or a simulator when there is no hardware.

pub mod config;
pub mod controller;
pub mod error;
pub mod factory;
pub mod gpio;
pub mod logger;
pub mod output;
pub mod pins;
pub mod system;

#[cfg(test)]
pub mod test_utils;
