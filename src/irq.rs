//! Level-triggered interrupt lines and the controller's pass-through output.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A level-triggered interrupt line.
pub trait IrqLine {
    fn set_level(&self, level: bool);
}

/// Interrupt output that latches its level and forwards it to an optional upstream line.
///
/// The OTG controller hands a clone of this to the host-controller core at realize so the core's
/// interrupt reaches the machine unchanged (no remapping).
#[derive(Clone, Default)]
pub struct PassthroughIrq {
    inner: Rc<PassthroughIrqInner>,
}

#[derive(Default)]
struct PassthroughIrqInner {
    level: Cell<bool>,
    upstream: RefCell<Option<Rc<dyn IrqLine>>>,
}

impl PassthroughIrq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> bool {
        self.inner.level.get()
    }

    /// Connects (or disconnects) the upstream line and replays the current level onto it.
    pub fn connect(&self, upstream: Option<Rc<dyn IrqLine>>) {
        if let Some(line) = upstream.as_ref() {
            line.set_level(self.inner.level.get());
        }
        *self.inner.upstream.borrow_mut() = upstream;
    }
}

impl IrqLine for PassthroughIrq {
    fn set_level(&self, level: bool) {
        self.inner.level.set(level);
        if let Some(line) = self.inner.upstream.borrow().as_ref() {
            line.set_level(level);
        }
    }
}
