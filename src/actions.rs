//! Detached execution of bound commands.

use std::process::{Child, Command};

use crate::button::{Button, Gesture};

/// Spawns one shell per matching binding and reaps the children as they
/// finish. Nothing here ever blocks on a child, and children still running
/// when the daemon stops are left alone.
pub struct Executor {
    children: Vec<Child>,
}

impl Executor {
    pub fn new() -> Executor {
        Executor {
            children: Vec::new(),
        }
    }

    /// Fire every binding on `button` whose gesture matches `gesture`, in
    /// binding order. A spawn failure is logged and the remaining bindings
    /// still fire.
    pub fn dispatch(&mut self, button: &Button, gesture: Gesture) {
        for binding in button.bindings().iter().filter(|b| b.gesture == gesture) {
            match Command::new("/bin/sh").arg("-c").arg(&binding.action).spawn() {
                Ok(child) => self.children.push(child),
                Err(e) => eprintln!(
                    "[buttonsd] cannot run '{}' for GPIO {}: {}",
                    binding.action,
                    button.pin(),
                    e
                ),
            }
        }
    }

    /// Retire finished children without blocking.
    pub fn reap(&mut self) {
        self.children.retain_mut(|child| match child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(e) => {
                eprintln!("[buttonsd] cannot reap child {}: {}", child.id(), e);
                false
            }
        });
    }

    /// Children spawned and not yet reaped.
    pub fn pending(&self) -> usize {
        self.children.len()
    }
}
