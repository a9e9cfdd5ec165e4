//! GPIO driver seam.
//!
//! The dispatcher only ever talks to an `InputSource`: set the edge mode,
//! take a pollable descriptor, read the level. The production implementation
//! sits on the sysfs GPIO interface, where the value file of an
//! edge-triggered pin reports POLLPRI once per transition and has to be
//! reopened before the next transition can be observed — which is why the
//! trait hands out a fresh descriptor instead of a stable one.

use std::fs::File;
use std::io::Read;
use std::os::unix::io::{AsRawFd, RawFd};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

/// A pollable descriptor for one pin, plus the poll events the driver wants
/// watched on it.
#[derive(Debug, Clone, Copy)]
pub struct PollTarget {
    pub fd: RawFd,
    pub events: libc::c_short,
}

pub trait InputSource {
    fn set_edge(&mut self, edge: Edge) -> Result<()>;

    /// Hand out a descriptor to poll for the next transition. Any descriptor
    /// previously issued for this pin is invalidated, and the new one may
    /// reuse its number.
    fn poll_target(&mut self) -> Result<PollTarget>;

    fn level(&mut self) -> Result<Level>;
}

/// An input pin exported through `/sys/class/gpio`.
pub struct SysfsInput {
    pin: sysfs_gpio::Pin,
    number: u32,
    value: Option<File>,
}

impl SysfsInput {
    /// Export `number` and configure it as an input.
    pub fn open(number: u32) -> Result<SysfsInput> {
        let pin = sysfs_gpio::Pin::new(number as u64);
        pin.export()
            .with_context(|| format!("cannot export GPIO {}", number))?;

        // The gpioN node appears immediately but udev applies its group
        // permissions asynchronously; retry briefly before giving up.
        let mut attempts = 0u64;
        loop {
            match pin.set_direction(sysfs_gpio::Direction::In) {
                Ok(()) => break,
                Err(e) => {
                    attempts += 1;
                    if attempts >= 5 {
                        return Err(e)
                            .with_context(|| format!("cannot set GPIO {} as input", number));
                    }
                    thread::sleep(Duration::from_millis(10 * attempts));
                }
            }
        }

        Ok(SysfsInput {
            pin,
            number,
            value: None,
        })
    }
}

impl InputSource for SysfsInput {
    fn set_edge(&mut self, edge: Edge) -> Result<()> {
        let mode = match edge {
            Edge::Rising => sysfs_gpio::Edge::RisingEdge,
            Edge::Falling => sysfs_gpio::Edge::FallingEdge,
            Edge::Both => sysfs_gpio::Edge::BothEdges,
        };
        self.pin
            .set_edge(mode)
            .with_context(|| format!("cannot set edge mode of GPIO {}", self.number))
    }

    fn poll_target(&mut self) -> Result<PollTarget> {
        // Close the spent descriptor before opening its replacement; the new
        // one may come back under the same number.
        self.value = None;

        let mut file = File::open(format!("/sys/class/gpio/gpio{}/value", self.number))
            .with_context(|| format!("cannot open value file of GPIO {}", self.number))?;

        // A freshly opened value fd polls ready at once; read it off so the
        // descriptor only wakes on the next edge.
        let mut buf = [0u8; 8];
        file.read(&mut buf)
            .with_context(|| format!("cannot read value file of GPIO {}", self.number))?;

        let fd = file.as_raw_fd();
        self.value = Some(file);
        Ok(PollTarget {
            fd,
            events: libc::POLLPRI | libc::POLLERR,
        })
    }

    fn level(&mut self) -> Result<Level> {
        let raw = self
            .pin
            .get_value()
            .with_context(|| format!("cannot read state of GPIO {}", self.number))?;
        Ok(if raw == 0 { Level::Low } else { Level::High })
    }
}

impl Drop for SysfsInput {
    fn drop(&mut self) {
        self.value = None;
        if let Err(e) = self.pin.unexport() {
            eprintln!("[buttonsd] cannot unexport GPIO {}: {}", self.number, e);
        }
    }
}
