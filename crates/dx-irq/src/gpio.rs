//! Pin abstraction for the event source and its indicator.

use std::ops::Not;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// GPIO pin levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Low level (0V)
    Low,
    /// High level (VCC)
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        matches!(self, Self::High)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Self::High
        } else {
            Self::Low
        }
    }
}

impl Not for Level {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

/// Readable pin. Reads must not block.
pub trait InputPin: Send + Sync {
    fn read(&self) -> Level;

    fn pin_number(&self) -> u32;
}

/// Drivable pin. Writes must not block; they are issued from atomic context.
pub trait OutputPin: Send + Sync {
    fn write(&self, level: Level);

    /// Level last written.
    fn output_level(&self) -> Level;

    fn toggle(&self) {
        self.write(!self.output_level());
    }

    fn pin_number(&self) -> u32;
}

/// In-memory pin usable both as input and as output.
#[derive(Debug)]
pub struct SimPin {
    number: u32,
    high: AtomicBool,
    writes: AtomicU64,
}

impl SimPin {
    pub fn new(number: u32, initial: Level) -> Self {
        Self {
            number,
            high: AtomicBool::new(initial.is_high()),
            writes: AtomicU64::new(0),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Sets the level seen by readers, as external circuitry would.
    pub fn set_level(&self, level: Level) {
        self.high.store(level.is_high(), Ordering::Release);
    }

    pub fn level(&self) -> Level {
        Level::from(self.high.load(Ordering::Acquire))
    }

    /// Number of [`OutputPin::write`] calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl InputPin for SimPin {
    fn read(&self) -> Level {
        self.level()
    }

    fn pin_number(&self) -> u32 {
        self.number
    }
}

impl OutputPin for SimPin {
    fn write(&self, level: Level) {
        self.set_level(level);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn output_level(&self) -> Level {
        self.level()
    }

    fn pin_number(&self) -> u32 {
        self.number
    }
}
