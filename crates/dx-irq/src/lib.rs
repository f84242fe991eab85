//! # dx-irq
//!
//! Edge-triggered event dispatch split into two phases.
//!
//! ## Module Overview
//! - [`gpio`]       – Pin traits and the in-memory [`SimPin`].
//! - [`line`]       – [`IrqLine`], the source that raises edges.
//! - [`dispatcher`] – [`request_threaded_irq`] and the [`Registration`] that
//!   owns the handler, its debounce state and its threaded-phase thread.
//! - [`button`]     – [`ButtonHandler`], an edge counter that toggles an LED.
//!
//! The immediate ("hard") phase runs inline in [`IrqLine::raise`] inside an
//! atomic section. A handler that returns [`ThreadedIrqReturn::WakeThread`]
//! gets its threaded phase run later on the registration's own thread, where
//! it may block.

pub mod button;
pub mod dispatcher;
pub mod error;
pub mod gpio;
pub mod line;

pub use button::ButtonHandler;
pub use dispatcher::{
    request_threaded_irq, FreedIrq, IrqFlags, IrqPhase, IrqRequest, IrqReturn, IrqStats,
    Registration, ThreadedHandler, ThreadedIrqReturn,
};
pub use error::IrqError;
pub use gpio::{InputPin, Level, OutputPin, SimPin};
pub use line::{Edge, IrqLine};

#[cfg(test)]
mod tests;
