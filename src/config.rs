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

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::controller::{Polarity, ShiftRegisterPins};
use crate::pins::PinMap;
use crate::system::Platform;

/// Stations per shift register board.
pub const STATIONS_PER_BOARD: usize = 8;
pub const MAX_BOARDS: usize = 64;
/// Largest header number any supported board exposes, with room to spare.
pub const MAX_PIN_MAP_LEN: usize = 256;

fn default_vct() -> String { "default".to_string() }
fn default_nst() -> usize { 8 }
fn default_nbrd() -> usize { 1 }

/// Valve settings read from `sd.json`. The file is shared with the web layer,
/// so unknown keys are accepted and ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValveSettings {
    /// Backend name
    #[serde(default = "default_vct")]
    pub vct: String,
    /// Station count
    #[serde(default = "default_nst")]
    pub nst: usize,
    /// Number of boards
    #[serde(default = "default_nbrd")]
    pub nbrd: usize,
    /// Active low relays, 0 or 1
    #[serde(default)]
    pub alr: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    /// Header pin to GPIO line table, index = header pin, 0 = unusable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_map: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sr_pins: Option<ShiftRegisterPins>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpio_root: Option<PathBuf>,
}

impl Default for ValveSettings {
    fn default() -> Self {
        Self {
            vct: default_vct(),
            nst: default_nst(),
            nbrd: default_nbrd(),
            alr: 0,
            platform: None,
            pin_map: None,
            sr_pins: None,
            gpio_root: None,
        }
    }
}

impl ValveSettings {
    pub fn active_low(&self) -> bool {
        self.alr != 0
    }

    pub fn polarity(&self) -> Polarity {
        Polarity::from_active_low(self.active_low())
    }

    /// Configured table, or an identity map over `default_len` header pins.
    pub fn pin_map_or(&self, default_len: u32) -> PinMap {
        match &self.pin_map {
            Some(table) => PinMap::from_table(table.clone()),
            None => PinMap::identity(default_len),
        }
    }
}

pub fn settings_path() -> PathBuf {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        return Path::new(&xdg).join("sprinkler").join("sd.json");
    }
    if let Ok(home) = env::var("HOME") {
        return Path::new(&home)
            .join(".config")
            .join("sprinkler")
            .join("sd.json");
    }
    PathBuf::from("/etc/sprinkler/sd.json")
}

fn is_safe_label(s: &str) -> bool {
    if s.is_empty() || s.len() > 64 { return false; }
    s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

pub fn validate_settings(s: &ValveSettings) -> Result<(), String> {
    if !is_safe_label(&s.vct) {
        return Err("invalid characters or length in vct".to_string());
    }
    if s.nbrd == 0 || s.nbrd > MAX_BOARDS {
        return Err(format!("nbrd out of range (1..{})", MAX_BOARDS));
    }
    if s.nst == 0 {
        return Err("nst must be at least 1".to_string());
    }
    if s.nst > s.nbrd * STATIONS_PER_BOARD {
        return Err(format!(
            "nst {} exceeds {} boards x {} stations",
            s.nst, s.nbrd, STATIONS_PER_BOARD
        ));
    }
    if s.alr > 1 {
        return Err("alr must be 0 or 1".to_string());
    }
    if let Some(map) = &s.pin_map {
        if map.len() > MAX_PIN_MAP_LEN {
            return Err(format!("pin_map too long (max {})", MAX_PIN_MAP_LEN));
        }
    }
    if let Some(pins) = &s.sr_pins {
        if !pins.is_distinct() {
            return Err("sr_pins must name four different header pins".to_string());
        }
        if pins.headers().contains(&0) {
            return Err("sr_pins cannot use header pin 0".to_string());
        }
    }
    Ok(())
}

pub fn load_settings(path: &Path) -> Result<ValveSettings, String> {
    let data = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let settings: ValveSettings =
        serde_json::from_str(&data).map_err(|e| format!("parse error: {}", e))?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Missing file means defaults; a file that exists but is broken is an error.
pub fn load_settings_or_default(path: &Path) -> Result<ValveSettings, String> {
    if !path.exists() {
        return Ok(ValveSettings::default());
    }
    load_settings(path)
}
