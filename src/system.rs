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

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

const DEVICE_TREE_MODEL: &str = "/proc/device-tree/model";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    RaspberryPi,
    BeagleBone,
    Simulated,
}

impl Platform {
    pub fn has_gpio(self) -> bool {
        !matches!(self, Platform::Simulated)
    }
}

pub fn read_board_model() -> String {
    read_board_model_from(Path::new(DEVICE_TREE_MODEL))
}

fn read_board_model_from(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(mut s) => {
            s.retain(|c| c != '\u{0}');
            s.trim().to_string()
        }
        Err(_) => String::new(),
    }
}

pub fn platform_from_model(model: &str) -> Platform {
    let lower = model.to_ascii_lowercase();
    if lower.contains("raspberry pi") {
        Platform::RaspberryPi
    } else if lower.contains("beaglebone") {
        Platform::BeagleBone
    } else {
        Platform::Simulated
    }
}

pub fn detect_platform() -> Platform {
    platform_from_model(&read_board_model())
}
