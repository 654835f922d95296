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

//! GPIO access layer
//!
//! The valve controllers only ever talk to hardware through the [`Gpio`] trait.
//! Two backends ship here:
//! - [`SysfsGpio`] drives lines through the Linux `/sys/class/gpio` interface
//! - [`NullGpio`] is used on hosts without GPIO; writes are dropped and reads return HIGH

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::json;
use thiserror::Error;

use crate::logger;

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn as_bit(self) -> u8 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }

    pub fn inverted(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Off,
    Up,
    Down,
}

#[derive(Error, Debug)]
pub enum GpioError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// The four primitives the controllers need from the platform.
#[cfg_attr(test, mockall::automock)]
pub trait Gpio: Send + Sync {
    fn configure_output(&self, line: u32) -> Result<(), GpioError>;
    fn configure_input(&self, line: u32, pull: Pull) -> Result<(), GpioError>;
    fn write(&self, line: u32, level: Level) -> Result<(), GpioError>;
    fn read(&self, line: u32) -> Result<Level, GpioError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullGpio;

impl Gpio for NullGpio {
    fn configure_output(&self, _line: u32) -> Result<(), GpioError> {
        Ok(())
    }

    fn configure_input(&self, _line: u32, _pull: Pull) -> Result<(), GpioError> {
        Ok(())
    }

    fn write(&self, _line: u32, _level: Level) -> Result<(), GpioError> {
        Ok(())
    }

    fn read(&self, _line: u32) -> Result<Level, GpioError> {
        Ok(Level::High)
    }
}

/// Linux sysfs GPIO. Lines are exported on first use.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    pub fn new() -> Self {
        Self::with_root(DEFAULT_SYSFS_ROOT)
    }

    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn line_dir(&self, line: u32) -> PathBuf {
        self.root.join(format!("gpio{}", line))
    }

    fn ensure_exported(&self, line: u32) -> Result<PathBuf, GpioError> {
        let dir = self.line_dir(line);
        if !dir.exists() {
            fs::write(self.root.join("export"), line.to_string())?;
            if !dir.exists() {
                return Err(GpioError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("gpio{} did not appear after export", line),
                )));
            }
        }
        Ok(dir)
    }

    fn set_direction(&self, line: u32, direction: &str) -> Result<(), GpioError> {
        let dir = self.ensure_exported(line)?;
        fs::write(dir.join("direction"), direction)?;
        Ok(())
    }
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl Gpio for SysfsGpio {
    fn configure_output(&self, line: u32) -> Result<(), GpioError> {
        self.set_direction(line, "out")
    }

    fn configure_input(&self, line: u32, pull: Pull) -> Result<(), GpioError> {
        self.set_direction(line, "in")?;
        // sysfs has no bias control; the line is left floating
        if pull != Pull::Off {
            logger::log_event(
                "gpio_pull_ignored",
                json!({ "line": line, "pull": format!("{:?}", pull) }),
            );
        }
        Ok(())
    }

    fn write(&self, line: u32, level: Level) -> Result<(), GpioError> {
        fs::write(self.line_dir(line).join("value"), level.as_bit().to_string())?;
        Ok(())
    }

    fn read(&self, line: u32) -> Result<Level, GpioError> {
        let raw = fs::read_to_string(self.line_dir(line).join("value"))?;
        match raw.trim() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => Err(GpioError::InvalidValue(format!("gpio{} value '{}'", line, other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_sysfs(lines: &[u32]) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("export"), "").unwrap();
        for line in lines {
            let d = dir.path().join(format!("gpio{}", line));
            fs::create_dir(&d).unwrap();
            fs::write(d.join("direction"), "in").unwrap();
            fs::write(d.join("value"), "0").unwrap();
        }
        dir
    }

    #[test]
    fn test_level_helpers() {
        assert_eq!(Level::Low.as_bit(), 0);
        assert_eq!(Level::High.as_bit(), 1);
        assert_eq!(Level::Low.inverted(), Level::High);
        assert_eq!(Level::High.inverted(), Level::Low);
    }

    #[test]
    fn test_null_gpio_reads_high() {
        let gpio = NullGpio;
        gpio.configure_output(4).unwrap();
        gpio.write(4, Level::Low).unwrap();
        assert_eq!(gpio.read(4).unwrap(), Level::High);
    }

    #[test]
    fn test_sysfs_configure_output_sets_direction() {
        let dir = fake_sysfs(&[17]);
        let gpio = SysfsGpio::with_root(dir.path());
        gpio.configure_output(17).unwrap();
        let direction = fs::read_to_string(dir.path().join("gpio17/direction")).unwrap();
        assert_eq!(direction, "out");
    }

    #[test]
    fn test_sysfs_write_and_read() {
        let dir = fake_sysfs(&[22]);
        let gpio = SysfsGpio::with_root(dir.path());
        gpio.write(22, Level::High).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("gpio22/value")).unwrap(), "1");
        assert_eq!(gpio.read(22).unwrap(), Level::High);
        gpio.write(22, Level::Low).unwrap();
        assert_eq!(gpio.read(22).unwrap(), Level::Low);
    }

    #[test]
    fn test_sysfs_read_rejects_garbage() {
        let dir = fake_sysfs(&[5]);
        fs::write(dir.path().join("gpio5/value"), "maybe").unwrap();
        let gpio = SysfsGpio::with_root(dir.path());
        assert!(matches!(gpio.read(5), Err(GpioError::InvalidValue(_))));
    }

    #[test]
    fn test_sysfs_export_missing_line() {
        // Writing to "export" in a plain directory does not create gpioN
        let dir = fake_sysfs(&[]);
        let gpio = SysfsGpio::with_root(dir.path());
        let err = gpio.configure_output(9).unwrap_err();
        assert!(matches!(err, GpioError::Io(_)));
        assert_eq!(fs::read_to_string(dir.path().join("export")).unwrap(), "9");
    }

    #[test]
    fn test_sysfs_write_unexported_line_fails() {
        let dir = fake_sysfs(&[]);
        let gpio = SysfsGpio::with_root(dir.path());
        assert!(gpio.write(3, Level::High).is_err());
    }

    #[test]
    fn test_sysfs_configure_input_with_pull() {
        let dir = fake_sysfs(&[8]);
        let gpio = SysfsGpio::with_root(dir.path());
        gpio.configure_output(8).unwrap();
        gpio.configure_input(8, Pull::Up).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("gpio8/direction")).unwrap(), "in");
    }
}
