//! Hardware the subsystem is wired to.

use std::fmt;
use std::sync::Arc;

use dx_irq::{Edge, InputPin, IrqLine, Level, OutputPin, SimPin};

/// Pins and interrupt line used by a [`Subsystem`](crate::Subsystem).
///
/// The button is active-low: pressing it drives the pin low and raises a
/// falling edge on `button_line`.
#[derive(Clone)]
pub struct Board {
    pub button: Arc<dyn InputPin>,
    /// Toggled by every accepted button press.
    pub led: Arc<dyn OutputPin>,
    /// Driven by the mirror timer to follow the button level.
    pub mirror_led: Option<Arc<dyn OutputPin>>,
    pub button_line: Arc<IrqLine>,
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Board")
            .field("button", &self.button.pin_number())
            .field("led", &self.led.pin_number())
            .field("mirror_led", &self.mirror_led.as_ref().map(|pin| pin.pin_number()))
            .field("button_line", &self.button_line.number())
            .finish()
    }
}

/// In-memory board built from [`SimPin`]s.
#[derive(Debug, Clone)]
pub struct SimBoard {
    pub button: Arc<SimPin>,
    pub led: Arc<SimPin>,
    pub mirror_led: Arc<SimPin>,
    pub line: Arc<IrqLine>,
}

impl SimBoard {
    pub const BUTTON_PIN: u32 = 17;
    pub const LED_PIN: u32 = 26;
    pub const MIRROR_LED_PIN: u32 = 27;

    pub fn new() -> Self {
        Self {
            button: Arc::new(SimPin::new(Self::BUTTON_PIN, Level::High)),
            led: Arc::new(SimPin::new(Self::LED_PIN, Level::Low)),
            mirror_led: Arc::new(SimPin::new(Self::MIRROR_LED_PIN, Level::Low)),
            line: Arc::new(IrqLine::new(Self::BUTTON_PIN)),
        }
    }

    pub fn board(&self) -> Board {
        Board {
            button: Arc::clone(&self.button) as Arc<dyn InputPin>,
            led: Arc::clone(&self.led) as Arc<dyn OutputPin>,
            mirror_led: Some(Arc::clone(&self.mirror_led) as Arc<dyn OutputPin>),
            button_line: Arc::clone(&self.line),
        }
    }

    /// Pushes the button: level goes low and a falling edge is raised.
    pub fn press(&self) {
        self.button.set_level(Level::Low);
        self.line.raise(Edge::Falling);
    }

    /// Lets the button go: level goes high and a rising edge is raised.
    pub fn release(&self) {
        self.button.set_level(Level::High);
        self.line.raise(Edge::Rising);
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}
