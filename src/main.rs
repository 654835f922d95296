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

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};

use sprinkler::config::{load_settings_or_default, settings_path, ValveSettings};
use sprinkler::controller::HardwareContext;
use sprinkler::factory::BackendRegistry;
use sprinkler::gpio::{Gpio, NullGpio, SysfsGpio};
use sprinkler::logger;
use sprinkler::output::StationOutput;
use sprinkler::pins::PinRegistry;
use sprinkler::system::{detect_platform, Platform};

/// Header pins covered by the default identity map (40-pin Pi header).
const DEFAULT_HEADER_PINS: u32 = 40;
const DEFAULT_WALK_SECS: u64 = 2;

const USAGE: &str = "usage: sprinkler [--settings <path>] [--logging] <backends | set <bits> | walk [seconds]>";

struct Cli {
    settings: Option<PathBuf>,
    logging: bool,
    command: Vec<String>,
}

fn parse_args(args: &[String]) -> anyhow::Result<Cli> {
    let mut cli = Cli { settings: None, logging: false, command: Vec::new() };
    let mut it = args.iter().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--logging" => cli.logging = true,
            "--settings" => {
                let path = it.next().ok_or_else(|| anyhow!("--settings needs a path"))?;
                cli.settings = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            _ => cli.command.push(arg.clone()),
        }
    }
    Ok(cli)
}

fn parse_bits(bits: &str, stations: usize) -> anyhow::Result<Vec<bool>> {
    if bits.len() != stations {
        bail!("pattern has {} stations, settings say {}", bits.len(), stations);
    }
    bits.chars()
        .map(|c| match c {
            '1' => Ok(true),
            '0' => Ok(false),
            other => Err(anyhow!("invalid station bit '{}'", other)),
        })
        .collect()
}

fn hardware_context(settings: &ValveSettings, platform: Platform) -> HardwareContext {
    let gpio: Arc<dyn Gpio> = if platform.has_gpio() {
        match &settings.gpio_root {
            Some(root) => Arc::new(SysfsGpio::with_root(root)),
            None => Arc::new(SysfsGpio::new()),
        }
    } else {
        Arc::new(NullGpio)
    };
    let pins = Arc::new(PinRegistry::new(settings.pin_map_or(DEFAULT_HEADER_PINS)));
    let ctx = HardwareContext::new(gpio, pins, platform);
    match settings.sr_pins {
        Some(sr) => ctx.with_shift_register_pins(sr),
        None => ctx,
    }
}

/// Energize each station in turn for `dwell`, then switch everything off.
fn walk(output: &StationOutput, stations: usize, dwell: Duration) -> anyhow::Result<()> {
    for station in 0..stations {
        let mut vector = vec![false; stations];
        vector[station] = true;
        println!("station {}", station + 1);
        if !output.apply(&vector) {
            eprintln!("sprinkler: write failed for station {}", station + 1);
        }
        thread::sleep(dwell);
    }
    if output.apply(&vec![false; stations]) {
        Ok(())
    } else {
        eprintln!("sprinkler: write failed switching all stations off");
        Err(anyhow!("final all-off write failed, outputs left disabled"))
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cli = parse_args(&args)?;

    if cli.logging {
        logger::init_logging();
        logger::log_event("startup", serde_json::json!({ "args": args }));
    }

    let registry = BackendRegistry::with_builtin();
    let command = cli.command.first().map(|s| s.as_str());

    if command == Some("backends") {
        for (name, description) in registry.descriptions() {
            println!("{:<8} {}", name, description);
        }
        return Ok(());
    }

    let path = cli.settings.unwrap_or_else(settings_path);
    let settings = load_settings_or_default(&path)
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("reading settings from {}", path.display()))?;
    let platform = settings.platform.unwrap_or_else(detect_platform);

    if platform.has_gpio() && unsafe { libc::geteuid() } != 0 {
        eprintln!("Error: sprinkler requires root privileges to drive GPIO on {:?}.", platform);
        eprintln!("Please run with: sudo {}", args.first().map(|s| s.as_str()).unwrap_or("sprinkler"));
        std::process::exit(1);
    }

    let ctx = hardware_context(&settings, platform);
    let output = StationOutput::open(&registry, &ctx, &settings)
        .with_context(|| format!("starting valve controller '{}'", settings.vct))?;
    if output.irrigation_disabled() {
        eprintln!(
            "sprinkler: backend '{}' resolved to \"{}\"; irrigation disabled",
            settings.vct,
            output.describe()
        );
    }

    let result = match command {
        Some("set") => {
            let bits = cli.command.get(1).ok_or_else(|| anyhow!("set needs a pattern like 10010000"))?;
            let vector = parse_bits(bits, settings.nst)?;
            if output.apply(&vector) {
                Ok(())
            } else {
                Err(anyhow!("write failed, outputs left disabled"))
            }
        }
        Some("walk") => {
            let secs = match cli.command.get(1) {
                Some(s) => s.parse::<u64>().with_context(|| format!("invalid seconds '{}'", s))?,
                None => DEFAULT_WALK_SECS,
            };
            walk(&output, settings.nst, Duration::from_secs(secs))
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    output.shutdown();
    if let Err(err) = &result {
        logger::log_event("fatal_error", serde_json::json!({ "error": err.to_string() }));
    }
    logger::shutdown_logging();
    result
}
