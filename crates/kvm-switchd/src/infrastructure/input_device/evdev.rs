//! evdev keyboard reader.
//!
//! The device node is opened non-blocking.  A poll drains whatever events are
//! queued; when nothing is queued it waits on the descriptor for at most the
//! poll timeout and reports [`InputPoll::Idle`] if nothing arrived.  The grab
//! probe uses `EVIOCGRAB`, which fails with `EBUSY` while another process
//! (QEMU on behalf of the guest) holds the device exclusively.

use std::io;
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::time::Duration;

use evdev::{Device, EventSummary};
use kvm_switch_core::KeyEvent;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::debug;

use crate::application::hotkey_monitor::{InputDeviceError, InputPoll, KeyInput, KeyInputOpener};

/// Opens one `/dev/input/event*` path.
#[derive(Debug, Clone)]
pub struct EvdevOpener {
    path: PathBuf,
}

impl EvdevOpener {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open_error(&self, source: io::Error) -> InputDeviceError {
        InputDeviceError::Open {
            path: self.describe(),
            source,
        }
    }
}

impl KeyInputOpener for EvdevOpener {
    type Input = EvdevKeyInput;

    fn open(&self) -> Result<EvdevKeyInput, InputDeviceError> {
        let device = Device::open(&self.path).map_err(|e| self.open_error(e))?;
        set_nonblocking(&device).map_err(|e| self.open_error(e))?;
        debug!(
            name = device.name().unwrap_or("unnamed"),
            "opened {}",
            self.path.display()
        );
        Ok(EvdevKeyInput { device })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub struct EvdevKeyInput {
    device: Device,
}

impl EvdevKeyInput {
    /// Reads queued key events; `None` when the queue is empty.
    fn drain(&mut self) -> Result<Option<Vec<KeyEvent>>, InputDeviceError> {
        match self.device.fetch_events() {
            Ok(events) => Ok(Some(
                events
                    .filter_map(|event| match event.destructure() {
                        EventSummary::Key(_, code, value) => Some(key_event(code.code(), value)),
                        _ => None,
                    })
                    .collect(),
            )),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(InputDeviceError::Read(err)),
        }
    }
}

impl KeyInput for EvdevKeyInput {
    fn poll(&mut self, timeout: Duration) -> Result<InputPoll, InputDeviceError> {
        if let Some(keys) = self.drain()? {
            return Ok(InputPoll::Events(keys));
        }
        if wait_readable(self.device.as_fd(), timeout).map_err(InputDeviceError::Read)? {
            if let Some(keys) = self.drain()? {
                return Ok(InputPoll::Events(keys));
            }
        }
        Ok(InputPoll::Idle)
    }

    fn probe_grab(&mut self) -> bool {
        match self.device.grab() {
            Ok(()) => {
                if let Err(e) = self.device.ungrab() {
                    debug!("ungrab after probe failed: {e}");
                }
                true
            }
            Err(e) => {
                debug!("grab probe refused: {e}");
                false
            }
        }
    }
}

/// Value 0 is a release; 1 (press) and 2 (autorepeat) count as held.
fn key_event(code: u16, value: i32) -> KeyEvent {
    KeyEvent {
        code,
        pressed: value != 0,
    }
}

/// Blocks until `fd` is readable or `timeout` passes.  A hang-up or error
/// condition counts as readable so the next read surfaces it.
fn wait_readable(fd: impl AsFd, timeout: Duration) -> io::Result<bool> {
    let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    let mut fds = [PollFd::new(fd.as_fd(), PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(ready) => Ok(ready > 0),
        Err(Errno::EINTR) => Ok(false),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

fn set_nonblocking(device: &Device) -> io::Result<()> {
    let current = fcntl(device.as_fd(), FcntlArg::F_GETFL)?;
    let mut flags = OFlag::from_bits_retain(current);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(device.as_fd(), FcntlArg::F_SETFL(flags))?;
    Ok(())
}
