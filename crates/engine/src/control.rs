// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control binding for an attached worker.
//!
//! The handle returned when a worker's session is bound to its machine.
//! While it lives, the control channel is considered up; dropping it
//! requests graceful sealing, so a torn-down control stream retires the
//! worker without cutting in-flight channels. [`ControlHandle::disarm`]
//! is for paths where the whole connection is already gone and the machine
//! will hear about it directly.

use crate::machine::{Machine, MachineInner};
use dy_adapters::SpawnAdapter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub struct ControlHandle<S: SpawnAdapter> {
    machine: Weak<MachineInner<S>>,
    armed: AtomicBool,
}

impl<S: SpawnAdapter> ControlHandle<S> {
    pub(crate) fn new(machine: Weak<MachineInner<S>>) -> Self {
        Self {
            machine,
            armed: AtomicBool::new(true),
        }
    }

    /// Defuse the drop behavior.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

impl<S: SpawnAdapter> Drop for ControlHandle<S> {
    fn drop(&mut self) {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.machine.upgrade() {
            let machine = Machine::from_inner(inner);
            tracing::debug!(worker_id = %machine.id(), "control binding dropped, sealing");
            machine.seal();
        }
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
