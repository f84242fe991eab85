//! Interrupt lines.
//!
//! An [`IrqLine`] stands for one external event source. Whoever observes the
//! physical edge calls [`IrqLine::raise`]; the installed action's immediate
//! phase runs inline on the caller's thread, inside an atomic section, with
//! the line's action slot read-locked. Detaching an action takes the slot's
//! write lock and therefore waits for every in-flight immediate phase.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dx_sync::AtomicContext;
use log::trace;
use spin::RwLock;

use crate::error::IrqError;

/// Signal transition observed on a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Low to high.
    Rising,
    /// High to low.
    Falling,
}

/// Receiver of edges on a line.
pub(crate) trait LineAction: Send + Sync {
    fn id(&self) -> u64;

    fn deliver(&self, edge: Edge, at: Instant, ctx: &AtomicContext);
}

pub struct IrqLine {
    number: u32,
    action: RwLock<Option<Arc<dyn LineAction>>>,
    raised: AtomicU64,
    spurious: AtomicU64,
}

impl IrqLine {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            action: RwLock::new(None),
            raised: AtomicU64::new(0),
            spurious: AtomicU64::new(0),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Signals an edge observed now.
    pub fn raise(&self, edge: Edge) {
        self.raise_at(edge, Instant::now());
    }

    /// Signals an edge observed at `at`.
    ///
    /// Debouncing compares the timestamps given here, so callers replaying
    /// recorded edges get the same decisions as live ones.
    pub fn raise_at(&self, edge: Edge, at: Instant) {
        self.raised.fetch_add(1, Ordering::Relaxed);
        let handled = AtomicContext::enter(|ctx| {
            let action = self.action.read();
            match action.as_ref() {
                Some(action) => {
                    action.deliver(edge, at, ctx);
                    true
                }
                None => false,
            }
        });
        if !handled {
            self.spurious.fetch_add(1, Ordering::Relaxed);
            trace!("irq {}: {edge:?} edge with no handler", self.number);
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.action.read().is_some()
    }

    /// Edges raised so far, handled or not.
    pub fn raised_count(&self) -> u64 {
        self.raised.load(Ordering::Relaxed)
    }

    /// Edges raised while no handler was installed.
    pub fn spurious_count(&self) -> u64 {
        self.spurious.load(Ordering::Relaxed)
    }

    pub(crate) fn attach(&self, action: Arc<dyn LineAction>) -> Result<(), IrqError> {
        let mut slot = self.action.write();
        if slot.is_some() {
            return Err(IrqError::Busy { line: self.number });
        }
        *slot = Some(action);
        Ok(())
    }

    /// Removes the action with `id`, waiting out in-flight immediate phases.
    pub(crate) fn detach(&self, id: u64) -> bool {
        let mut slot = self.action.write();
        match slot.as_ref() {
            Some(action) if action.id() == id => {
                *slot = None;
                true
            }
            _ => false,
        }
    }
}

impl fmt::Debug for IrqLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqLine")
            .field("number", &self.number)
            .field("claimed", &self.is_claimed())
            .field("raised", &self.raised_count())
            .finish()
    }
}
