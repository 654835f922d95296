/*
 * Test utilities and fakes for Sprinkler
 *
 * A recording GPIO backend plus a small 74HC595 model that replays the
 * recorded pin activity, so tests can check what the relays would see.
 */

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::controller::{HardwareContext, ShiftRegisterPins};
use crate::gpio::{Gpio, GpioError, Level, Pull};
use crate::pins::{PinMap, PinRegistry};
use crate::system::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioOp {
    ConfigureOutput(u32),
    ConfigureInput(u32, Pull),
    Write(u32, Level),
    Read(u32),
}

/// Records every call. Optionally fails the nth write (0-based, counted from the last `clear`).
#[derive(Debug, Default)]
pub struct RecordingGpio {
    ops: Mutex<Vec<GpioOp>>,
    fail_write_at: Mutex<Option<usize>>,
    writes_seen: Mutex<usize>,
}

impl RecordingGpio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<GpioOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
        *self.writes_seen.lock().unwrap() = 0;
    }

    pub fn fail_write_at(&self, n: Option<usize>) {
        *self.fail_write_at.lock().unwrap() = n;
    }

    pub fn writes_to(&self, line: u32) -> Vec<Level> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                GpioOp::Write(l, level) if l == line => Some(level),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&GpioOp) -> bool) -> usize {
        self.ops().iter().filter(|op| pred(op)).count()
    }

    fn push(&self, op: GpioOp) {
        self.ops.lock().unwrap().push(op);
    }
}

impl Gpio for RecordingGpio {
    fn configure_output(&self, line: u32) -> Result<(), GpioError> {
        self.push(GpioOp::ConfigureOutput(line));
        Ok(())
    }

    fn configure_input(&self, line: u32, pull: Pull) -> Result<(), GpioError> {
        self.push(GpioOp::ConfigureInput(line, pull));
        Ok(())
    }

    fn write(&self, line: u32, level: Level) -> Result<(), GpioError> {
        let n = {
            let mut seen = self.writes_seen.lock().unwrap();
            let n = *seen;
            *seen += 1;
            n
        };
        if *self.fail_write_at.lock().unwrap() == Some(n) {
            return Err(GpioError::Unsupported(format!("injected failure on write #{}", n)));
        }
        self.push(GpioOp::Write(line, level));
        Ok(())
    }

    fn read(&self, line: u32) -> Result<Level, GpioError> {
        self.push(GpioOp::Read(line));
        Ok(Level::High)
    }
}

/// Shift register header pins used by the simulated platform (identity pin map).
pub const DATA: u32 = 3;
pub const CLOCK: u32 = 4;
pub const OUTPUT_ENABLE: u32 = 5;
pub const LATCH: u32 = 6;

/// Replays recorded writes through a cascaded 74HC595 chain `len` outputs long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftRegisterModel {
    pub latched: Vec<Level>,
    pub output_enabled: bool,
    pub clock_pulses: usize,
}

impl ShiftRegisterModel {
    pub fn replay(ops: &[GpioOp], len: usize) -> Self {
        let mut stage: VecDeque<Level> = VecDeque::from(vec![Level::Low; len]);
        let mut latched = vec![Level::Low; len];
        let mut data = Level::Low;
        let mut clock: Option<Level> = None;
        let mut latch: Option<Level> = None;
        let mut oe: Option<Level> = None;
        let mut clock_pulses = 0;

        for op in ops {
            if let GpioOp::Write(line, level) = *op {
                match line {
                    DATA => data = level,
                    CLOCK => {
                        if clock == Some(Level::Low) && level == Level::High {
                            // rising edge: Q0 takes DATA, everything moves one place down the chain
                            stage.push_front(data);
                            stage.truncate(len);
                            clock_pulses += 1;
                        }
                        clock = Some(level);
                    }
                    LATCH => {
                        if latch == Some(Level::Low) && level == Level::High {
                            latched = stage.iter().copied().collect();
                        }
                        latch = Some(level);
                    }
                    OUTPUT_ENABLE => oe = Some(level),
                    _ => {}
                }
            }
        }

        Self { latched, output_enabled: oe == Some(Level::Low), clock_pulses }
    }
}

pub fn sim_context(gpio: Arc<dyn Gpio>) -> (HardwareContext, Arc<PinRegistry>) {
    let pins = Arc::new(PinRegistry::new(PinMap::identity(26)));
    let ctx = HardwareContext::new(gpio, pins.clone(), Platform::Simulated)
        .with_shift_register_pins(ShiftRegisterPins::for_platform(Platform::Simulated));
    (ctx, pins)
}

pub fn levels(bits: &[bool], polarity_low: bool) -> Vec<Level> {
    bits.iter()
        .map(|&on| if on != polarity_low { Level::High } else { Level::Low })
        .collect()
}
