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

//! The daemon-facing station output
//!
//! Owns the active controller and is the single writer the scheduler talks to.
//! Write failures are logged and reported as `false`; the scheduler retries on
//! its next tick.

use std::sync::Mutex;

use serde_json::json;

use crate::config::ValveSettings;
use crate::controller::io_expander;
use crate::controller::simulator::{is_simulator, Simulator, SimulatorKind};
use crate::controller::{lock, ControllerParams, HardwareContext, ShiftRegisterPins, ValveController};
use crate::error::ValveError;
use crate::factory::BackendRegistry;
use crate::logger;
use crate::pins::PinMap;

/// Backend name recorded after a failed rebuild, matching the controller
/// that took over.
const FALLBACK_BACKEND: &str = "virtual";

pub type ZoneListener = Box<dyn Fn(&[bool]) + Send + Sync>;

/// Pin assignment a controller was built against. Any change forces a rebuild.
#[derive(Debug, Clone, PartialEq)]
struct Wiring {
    shift_register: ShiftRegisterPins,
    pin_map: PinMap,
}

impl Wiring {
    fn of(ctx: &HardwareContext) -> Self {
        Self {
            shift_register: ctx
                .shift_register_pins
                .unwrap_or_else(|| ShiftRegisterPins::for_platform(ctx.platform)),
            pin_map: ctx.pins.map().clone(),
        }
    }
}

struct OutputState {
    controller: Box<dyn ValveController>,
    backend: String,
    wiring: Wiring,
    last: Option<Vec<bool>>,
}

pub struct StationOutput {
    state: Mutex<OutputState>,
    listeners: Mutex<Vec<ZoneListener>>,
}

impl StationOutput {
    /// Wrap a controller that was built from `ctx`.
    pub fn new(ctx: &HardwareContext, backend: &str, controller: Box<dyn ValveController>) -> Self {
        Self {
            state: Mutex::new(OutputState {
                controller,
                backend: backend.to_string(),
                wiring: Wiring::of(ctx),
                last: None,
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Build the controller named in `settings` and wrap it.
    pub fn open(
        registry: &BackendRegistry,
        ctx: &HardwareContext,
        settings: &ValveSettings,
    ) -> Result<Self, ValveError> {
        let vc = registry.create(ctx, &settings.vct, settings.nst, settings.polarity())?;
        Ok(Self::new(ctx, &settings.vct, vc))
    }

    /// Write a full station vector. Listeners run only after a successful
    /// write and must not call back into this output.
    pub fn apply(&self, stations: &[bool]) -> bool {
        let mut state = lock(&self.state);
        state.last = Some(stations.to_vec());
        match state.controller.write_output(stations) {
            Ok(()) => {
                for listener in lock(&self.listeners).iter() {
                    listener(stations);
                }
                true
            }
            Err(e) => {
                logger::log_event(
                    "write_output_failed",
                    json!({
                        "backend": state.backend,
                        "transient": e.is_transient(),
                        "error": e.to_string(),
                    }),
                );
                false
            }
        }
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&[bool]) + Send + Sync + 'static,
    {
        lock(&self.listeners).push(Box::new(listener));
    }

    /// Follow a settings change. A new backend name or new pin assignment
    /// replaces the controller: the old one releases its pins first so the new
    /// one can claim them. If the new one cannot be built, the quiet virtual
    /// controller takes over under the name `virtual` and the error is
    /// returned, so repeating the same request retries the build.
    pub fn reconfigure(
        &self,
        registry: &BackendRegistry,
        ctx: &HardwareContext,
        settings: &ValveSettings,
    ) -> Result<(), ValveError> {
        let mut state = lock(&self.state);
        let polarity = settings.polarity();
        let wiring = Wiring::of(ctx);

        if state.backend == settings.vct && state.wiring == wiring {
            state.controller.set_polarity(polarity);
            state.controller.set_station_count(settings.nst);
            return Ok(());
        }

        state.controller.release_hardware();
        let previous = state.backend.clone();
        state.wiring = wiring;
        match registry.create(ctx, &settings.vct, settings.nst, polarity) {
            Ok(vc) => {
                state.controller = vc;
                state.backend = settings.vct.clone();
                logger::log_event(
                    "controller_replaced",
                    json!({ "from": previous, "to": settings.vct }),
                );
                Ok(())
            }
            Err(e) => {
                let params = ControllerParams::new(settings.nst, polarity).quiet(true);
                state.controller = Box::new(Simulator::new(SimulatorKind::Virtual, params));
                state.backend = FALLBACK_BACKEND.to_string();
                logger::log_event(
                    "controller_replace_failed",
                    json!({ "from": previous, "to": settings.vct, "error": e.to_string() }),
                );
                Err(e)
            }
        }
    }

    pub fn describe(&self) -> &'static str {
        lock(&self.state).controller.describe()
    }

    pub fn backend(&self) -> String {
        lock(&self.state).backend.clone()
    }

    pub fn station_count(&self) -> usize {
        lock(&self.state).controller.station_count()
    }

    /// Most recent vector handed to [`apply`](Self::apply), written or not.
    pub fn last_requested(&self) -> Option<Vec<bool>> {
        lock(&self.state).last.clone()
    }

    /// True when no relay can be energized: a simulator, or the I2C
    /// expander, which has no bus driver yet.
    pub fn irrigation_disabled(&self) -> bool {
        let describe = self.describe();
        is_simulator(describe) || describe == io_expander::DESCRIPTION
    }

    pub fn shutdown(&self) {
        let state = lock(&self.state);
        state.controller.release_hardware();
        logger::log_event("station_output_shutdown", json!({ "backend": state.backend }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::shift_register;
    use crate::controller::Polarity;
    use crate::test_utils::{sim_context, RecordingGpio, ShiftRegisterModel};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn settings(vct: &str, nst: usize, alr: u8) -> ValveSettings {
        ValveSettings { vct: vct.to_string(), nst, alr, ..Default::default() }
    }

    #[test]
    fn test_apply_notifies_listeners() {
        let (ctx, _pins) = sim_context(Arc::new(RecordingGpio::new()));
        let out = StationOutput::open(&BackendRegistry::with_builtin(), &ctx, &settings("sim_vc", 4, 0)).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        out.subscribe(move |v| {
            assert_eq!(v.len(), 4);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(out.apply(&[true, false, false, false]));
        assert!(out.apply(&[false; 4]));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(out.irrigation_disabled());
    }

    #[test]
    fn test_apply_swallows_length_mismatch() {
        let (ctx, _pins) = sim_context(Arc::new(RecordingGpio::new()));
        let out = StationOutput::open(&BackendRegistry::with_builtin(), &ctx, &settings("virtual", 4, 0)).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        out.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!out.apply(&[true, true]));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(out.last_requested(), Some(vec![true, true]));
    }

    #[test]
    fn test_apply_swallows_transient_failure() {
        let gpio = Arc::new(RecordingGpio::new());
        let (ctx, _pins) = sim_context(gpio.clone());
        let out = StationOutput::open(&BackendRegistry::with_builtin(), &ctx, &settings("bbsr", 8, 0)).unwrap();
        assert!(!out.irrigation_disabled());

        gpio.clear();
        gpio.fail_write_at(Some(4));
        assert!(!out.apply(&[true; 8]));

        gpio.fail_write_at(None);
        gpio.clear();
        assert!(out.apply(&[true; 8]));
        let model = ShiftRegisterModel::replay(&gpio.ops(), 8);
        assert!(model.output_enabled);
        assert!(model.latched.iter().all(|&l| l == crate::gpio::Level::High));
    }

    #[test]
    fn test_reconfigure_same_backend_uses_setters() {
        let (ctx, pins) = sim_context(Arc::new(RecordingGpio::new()));
        let reg = BackendRegistry::with_builtin();
        let out = StationOutput::open(&reg, &ctx, &settings("bbsr", 8, 0)).unwrap();
        out.reconfigure(&reg, &ctx, &settings("bbsr", 16, 1)).unwrap();
        assert_eq!(out.station_count(), 16);
        assert_eq!(out.describe(), shift_register::DESCRIPTION);
        assert_eq!(pins.claimed_count(), 4);
        assert!(out.apply(&[false; 16]));
    }

    #[test]
    fn test_reconfigure_switches_backend_and_releases_pins() {
        let (ctx, pins) = sim_context(Arc::new(RecordingGpio::new()));
        let reg = BackendRegistry::with_builtin();
        let out = StationOutput::open(&reg, &ctx, &settings("bbsr", 8, 0)).unwrap();
        assert_eq!(pins.claimed_count(), 4);

        out.reconfigure(&reg, &ctx, &settings("i2c_sr", 8, 0)).unwrap();
        assert_eq!(pins.claimed_count(), 0);
        assert_eq!(out.backend(), "i2c_sr");

        out.reconfigure(&reg, &ctx, &settings("bbsr", 8, 1)).unwrap();
        assert_eq!(pins.claimed_count(), 4);
    }

    #[test]
    fn test_reconfigure_failure_installs_quiet_simulator() {
        let (ctx, pins) = sim_context(Arc::new(RecordingGpio::new()));
        let reg = BackendRegistry::with_builtin();
        let out = StationOutput::open(&reg, &ctx, &settings("sim_vc", 8, 0)).unwrap();

        // someone else holds the latch pin
        pins.claim(6, false).unwrap();
        let err = out.reconfigure(&reg, &ctx, &settings("bbsr", 8, 1)).unwrap_err();
        assert!(matches!(err, ValveError::PinClaim(_)));
        assert!(out.irrigation_disabled());
        assert_eq!(out.station_count(), 8);
        assert!(out.apply(&[false; 8]));
        assert_eq!(pins.claimed_count(), 1);
    }

    #[test]
    fn test_shutdown_releases_pins() {
        let (ctx, pins) = sim_context(Arc::new(RecordingGpio::new()));
        let vc = BackendRegistry::with_builtin()
            .create(&ctx, "bbsr", 8, Polarity::ActiveLow)
            .unwrap();
        let out = StationOutput::new(&ctx, "bbsr", vc);
        out.shutdown();
        out.shutdown();
        assert_eq!(pins.claimed_count(), 0);
        assert!(!out.apply(&[false; 8]));
    }

    #[test]
    fn test_reconfigure_retries_after_failed_switch() {
        let (ctx, pins) = sim_context(Arc::new(RecordingGpio::new()));
        let reg = BackendRegistry::with_builtin();
        let out = StationOutput::open(&reg, &ctx, &settings("sim_vc", 8, 0)).unwrap();

        pins.claim(6, false).unwrap();
        assert!(out.reconfigure(&reg, &ctx, &settings("bbsr", 8, 0)).is_err());
        assert_eq!(out.backend(), "virtual");

        // same request once the pin is free builds the shift register
        pins.release(6);
        out.reconfigure(&reg, &ctx, &settings("bbsr", 8, 0)).unwrap();
        assert_eq!(out.backend(), "bbsr");
        assert_eq!(out.describe(), shift_register::DESCRIPTION);
        assert!(!out.irrigation_disabled());
        assert_eq!(pins.claimed_count(), 4);
    }

    #[test]
    fn test_reconfigure_rebuilds_on_new_shift_register_pins() {
        let (ctx, pins) = sim_context(Arc::new(RecordingGpio::new()));
        let reg = BackendRegistry::with_builtin();
        let out = StationOutput::open(&reg, &ctx, &settings("bbsr", 8, 0)).unwrap();
        assert!(pins.is_claimed(3));

        let moved = ctx.clone().with_shift_register_pins(ShiftRegisterPins {
            data: 10,
            clock: 11,
            output_enable: 12,
            latch: 13,
        });
        out.reconfigure(&reg, &moved, &settings("bbsr", 8, 0)).unwrap();
        assert!(!pins.is_claimed(3));
        assert!(pins.is_claimed(10) && pins.is_claimed(13));
        assert_eq!(pins.claimed_count(), 4);

        // unchanged wiring keeps the controller and its claims
        out.reconfigure(&reg, &moved, &settings("bbsr", 8, 1)).unwrap();
        assert!(pins.is_claimed(10));
        assert!(out.apply(&[true; 8]));
    }

    #[test]
    fn test_reconfigure_rebuilds_on_new_pin_map() {
        let gpio = Arc::new(RecordingGpio::new());
        let (ctx, _pins) = sim_context(gpio.clone());
        let reg = BackendRegistry::with_builtin();
        let out = StationOutput::open(&reg, &ctx, &settings("bbsr", 8, 0)).unwrap();

        // header n now drives line n + 20
        let remapped_pins = Arc::new(crate::pins::PinRegistry::new(PinMap::from_table((0..27).map(|n| n + 20).collect())));
        let remapped = HardwareContext {
            gpio: gpio.clone(),
            pins: remapped_pins.clone(),
            platform: ctx.platform,
            shift_register_pins: ctx.shift_register_pins,
        };
        gpio.clear();
        out.reconfigure(&reg, &remapped, &settings("bbsr", 8, 0)).unwrap();
        assert_eq!(remapped_pins.claimed_count(), 4);
        assert!(!gpio.writes_to(23).is_empty());
    }

    #[test]
    fn test_io_expander_counts_as_disabled() {
        let (ctx, _pins) = sim_context(Arc::new(RecordingGpio::new()));
        let out = StationOutput::open(&BackendRegistry::with_builtin(), &ctx, &settings("i2c_sr", 16, 0)).unwrap();
        assert!(out.apply(&[false; 16]));
        assert!(out.irrigation_disabled());
    }
}
