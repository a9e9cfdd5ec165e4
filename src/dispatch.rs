//! Poll-driven event loop.
//!
//! One blocking `poll` multiplexes every configured button. A wake on a
//! descriptor means its pin changed state: a high level stamps the press
//! time, a low level classifies the press/release pair by duration and
//! fires the matching bindings. Each serviced descriptor is then reissued
//! by the driver, so the poll set entry and the descriptor index both have
//! to be rewritten before the next wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result, bail};

use crate::actions::Executor;
use crate::button::{ButtonId, ButtonSet, Gesture};
use crate::gpio::{Edge, Level};
use crate::registry::Registry;

/// Upper bound on one blocking wait, so a stop request is noticed promptly
/// even when no pin changes.
const POLL_TIMEOUT_MS: libc::c_int = 5000;

pub struct Dispatcher {
    buttons: ButtonSet,
    by_fd: Registry<ButtonId>,
    poll_set: Vec<libc::pollfd>,
    executor: Executor,
}

impl Dispatcher {
    /// Arm every button: both-edge triggering, a pollable descriptor in the
    /// poll set and the descriptor index, and a fresh press stamp so that a
    /// release with no observed press counts as a short click.
    pub fn new(mut buttons: ButtonSet) -> Result<Dispatcher> {
        let mut by_fd = Registry::new();
        let mut poll_set = Vec::with_capacity(buttons.len());
        let now = Instant::now();

        for (id, button) in buttons.iter_mut() {
            button.press(now);
            button.source_mut().set_edge(Edge::Both)?;
            let target = button.source_mut().poll_target()?;
            poll_set.push(libc::pollfd {
                fd: target.fd,
                events: target.events,
                revents: 0,
            });
            by_fd.upsert(target.fd as u64, id);
        }

        Ok(Dispatcher {
            buttons,
            by_fd,
            poll_set,
            executor: Executor::new(),
        })
    }

    /// Run until `stop` is observed. Poll, read, and reissue failures all
    /// abort the loop; they leave the indexes untrustworthy.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        while !stop.load(Ordering::Relaxed) {
            let ready = unsafe {
                libc::poll(
                    self.poll_set.as_mut_ptr(),
                    self.poll_set.len() as libc::nfds_t,
                    POLL_TIMEOUT_MS,
                )
            };
            if ready < 0 {
                let err = std::io::Error::last_os_error();
                // The stop signal interrupting the wait is the normal
                // shutdown path, not a poll failure.
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(err).context("poll failed");
            }
            if ready > 0 {
                for slot in 0..self.poll_set.len() {
                    let entry = self.poll_set[slot];
                    if entry.revents & entry.events != 0 {
                        self.service_ready(slot, Instant::now())?;
                    }
                }
            }
            self.executor.reap();
        }
        Ok(())
    }

    /// Handle one descriptor that woke the poll, then re-arm its pin.
    fn service_ready(&mut self, slot: usize, now: Instant) -> Result<()> {
        let fd = self.poll_set[slot].fd;
        let id = match self.by_fd.get(fd as u64) {
            Some(id) => *id,
            None => bail!("descriptor {} does not resolve to a button", fd),
        };

        match self.buttons.get_mut(id).source_mut().level()? {
            Level::High => {
                // Pressed: remember when. Nothing fires until release.
                self.buttons.get_mut(id).press(now);
            }
            Level::Low => {
                let held = self.buttons.get(id).held_for(now);
                self.executor
                    .dispatch(self.buttons.get(id), Gesture::classify(held));
            }
        }

        // An edge-triggered value descriptor reports once; take a fresh one
        // and keep the index in step. Evict the stale key before inserting
        // the new one: the reissued descriptor may reuse the number.
        let target = self.buttons.get_mut(id).source_mut().poll_target()?;
        self.by_fd.remove(fd as u64);
        self.by_fd.upsert(target.fd as u64, id);
        self.poll_set[slot] = libc::pollfd {
            fd: target.fd,
            events: target.events,
            revents: 0,
        };
        Ok(())
    }
}
