//! Push-button handler: counts presses and toggles an LED.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dx_sync::{msleep, AtomicContext, CounterView, ProcessContext, SharedCounter};
use log::info;

use crate::dispatcher::{IrqReturn, ThreadedHandler, ThreadedIrqReturn};
use crate::gpio::{Level, OutputPin};
use crate::line::Edge;

/// Immediate phase: bump the press counter, flip the LED.
/// Threaded phase: optionally stall like slow I/O, then report the count.
pub struct ButtonHandler {
    presses: Arc<SharedCounter>,
    led_on: AtomicBool,
    led: Arc<dyn OutputPin>,
    simulate_busy: Option<Duration>,
}

impl ButtonHandler {
    pub fn new(led: Arc<dyn OutputPin>) -> Self {
        let led_on = led.output_level().is_high();
        Self {
            presses: SharedCounter::new(),
            led_on: AtomicBool::new(led_on),
            led,
            simulate_busy: None,
        }
    }

    /// Makes every threaded phase sleep for `delay` before reporting.
    pub fn simulate_busy(mut self, delay: Duration) -> Self {
        self.simulate_busy = Some(delay).filter(|delay| !delay.is_zero());
        self
    }

    pub fn presses(&self) -> CounterView {
        self.presses.view()
    }

    pub fn led_state(&self) -> Level {
        Level::from(self.led_on.load(Ordering::Acquire))
    }
}

impl ThreadedHandler for ButtonHandler {
    fn handle(&self, _edge: Edge, _ctx: &AtomicContext) -> ThreadedIrqReturn {
        self.presses.increment();
        let on = !self.led_on.fetch_xor(true, Ordering::AcqRel);
        self.led.write(Level::from(on));
        ThreadedIrqReturn::WakeThread
    }

    fn handle_threaded(&self, ctx: &ProcessContext) -> IrqReturn {
        if let Some(delay) = self.simulate_busy {
            msleep(ctx, delay);
        }
        info!(
            "button pressed {} time(s), led {}",
            self.presses.get(),
            if self.led_state().is_high() { "on" } else { "off" }
        );
        IrqReturn::Handled
    }
}
