// This file is part of ucubed, an application to expose FPGA acquisition hardware to user-space consumers.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// ucubed is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// ucubed is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Bitstream upload and programming.
//!
//! A bitstream arrives as a series of bounded writes into a fixed-capacity buffer. Each write
//! lands at the offset the caller gives and moves the cursor to the furthest byte written so
//! far. Programming hands `data[0..cursor]` to a [`ReconfigurationService`].
//!
//! ```text
//!          append                program() ok
//!   Idle ---------> Accumulating -------------> Ready
//!    ^                  ^   |                     |
//!    |                  +---+ program() failed    |
//!    +------------------------ reset() -----------+
//! ```
//!
//! The cursor survives programming, so a bitstream can be programmed again, or extended, without
//! re-uploading. [`ReconfigurationController::reset`] starts a new upload.
//!
//! # A sysfs map of the fpga_manager class
//!
//! [`FpgaManagerService`] drives the kernel FPGA manager. Of the files below only `firmware` and
//! `state` are used:
//! ```text
//! /sys/class/fpga_manager/fpga0
//! ├── firmware   <- name of an image in the firmware search path
//! ├── flags
//! ├── name
//! ├── state      -> "operating" once programmed
//! └── status
//! ```

use crate::config;
use crate::error::GatewayError;
use crate::system_io::{fs_read, fs_write, fs_write_bytes};
use log::{debug, info, trace, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Applies a complete bitstream to the fabric.
pub trait ReconfigurationService: Send + Sync {
    /// Program `bitstream` into the device.
    fn program(&self, bitstream: &[u8]) -> Result<(), GatewayError>;

    /// Whether the device currently reports itself as configured and operating.
    fn is_operating(&self) -> Result<bool, GatewayError>;
}

/// The Linux FPGA manager.
///
/// The image is staged as [`config::BITSTREAM_IMAGE_NAME`] in the firmware directory, its name is
/// written to `<managers_dir>/<device>/firmware`, and the manager's `state` must then read
/// `operating`.
#[derive(Debug, Clone)]
pub struct FpgaManagerService {
    managers_dir: PathBuf,
    firmware_dir: PathBuf,
    device_handle: String,
}

impl Default for FpgaManagerService {
    fn default() -> Self {
        FpgaManagerService::new(
            PathBuf::from(config::FPGA_MANAGERS_DIR),
            PathBuf::from(config::FIRMWARE_DIR),
            config::FPGA_DEVICE_HANDLE,
        )
    }
}

impl FpgaManagerService {
    pub fn new(managers_dir: PathBuf, firmware_dir: PathBuf, device_handle: &str) -> Self {
        FpgaManagerService {
            managers_dir,
            firmware_dir,
            device_handle: device_handle.to_owned(),
        }
    }

    fn state(&self) -> Result<String, GatewayError> {
        let state_path = self.managers_dir.join(&self.device_handle).join("state");
        trace!("reading {state_path:?}");
        fs_read(&state_path).map(|s| s.trim_end_matches('\n').to_string())
    }

    fn assert_state(&self) -> Result<(), GatewayError> {
        let state = self.state()?;
        if state == "operating" {
            info!("{}'s state is 'operating'", self.device_handle);
            return Ok(());
        }
        warn!("{}'s state is '{state}' after programming", self.device_handle);
        Err(GatewayError::DeviceState(format!(
            "after programming, {}'s state should be 'operating' but it is '{state}'",
            self.device_handle
        )))
    }
}

impl ReconfigurationService for FpgaManagerService {
    fn program(&self, bitstream: &[u8]) -> Result<(), GatewayError> {
        let image = self.firmware_dir.join(config::BITSTREAM_IMAGE_NAME);
        fs_write_bytes(&image, true, bitstream)?;
        debug!("Staged {} byte bitstream at {image:?}", bitstream.len());
        let control_path = self.managers_dir.join(&self.device_handle).join("firmware");
        fs_write(&control_path, false, config::BITSTREAM_IMAGE_NAME)?;
        self.assert_state()
    }

    fn is_operating(&self) -> Result<bool, GatewayError> {
        Ok(self.state()? == "operating")
    }
}

/// Progress of the current upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitstreamState {
    Idle,
    Accumulating,
    Programming,
    Ready,
}

impl fmt::Display for BitstreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BitstreamState::Idle => "idle",
            BitstreamState::Accumulating => "accumulating",
            BitstreamState::Programming => "programming",
            BitstreamState::Ready => "ready",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
struct BitstreamBuffer {
    data: Vec<u8>,
    cursor: usize,
}

pub struct ReconfigurationController {
    service: Box<dyn ReconfigurationService>,
    capacity: usize,
    buffer: Mutex<BitstreamBuffer>,
    // taken after `buffer`, never held across a service call
    state: Mutex<BitstreamState>,
}

impl ReconfigurationController {
    /// Reserve the upload buffer up front.
    ///
    /// # Returns: `Result<ReconfigurationController, GatewayError>`
    /// * `Ok(ReconfigurationController)` - Controller in the `Idle` state
    /// * `Err(GatewayError::ResourceUnavailable)` - `capacity` bytes could not be allocated
    pub fn new(
        service: Box<dyn ReconfigurationService>,
        capacity: usize,
    ) -> Result<ReconfigurationController, GatewayError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity).map_err(|e| {
            GatewayError::ResourceUnavailable(format!(
                "cannot reserve a {capacity} byte bitstream buffer: {e}"
            ))
        })?;
        data.resize(capacity, 0);
        Ok(ReconfigurationController {
            service,
            capacity,
            buffer: Mutex::new(BitstreamBuffer {
                data,
                cursor: 0,
            }),
            state: Mutex::new(BitstreamState::Idle),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, BitstreamBuffer>, GatewayError> {
        self.buffer
            .lock()
            .map_err(|_| GatewayError::Internal("bitstream lock poisoned".into()))
    }

    fn set_state(&self, state: BitstreamState) -> Result<(), GatewayError> {
        *self
            .state
            .lock()
            .map_err(|_| GatewayError::Internal("bitstream state lock poisoned".into()))? = state;
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy `bytes` to `offset` in the upload buffer.
    ///
    /// # Returns: `Result<usize, GatewayError>`
    /// * `Ok(usize)` - Number of bytes accepted, always `bytes.len()`
    /// * `Err(GatewayError::CapacityExceeded)` - `offset + bytes.len()` passes the capacity; the
    ///   buffer and cursor are unchanged
    pub fn append(&self, offset: u64, bytes: &[u8]) -> Result<usize, GatewayError> {
        let exceeded = || GatewayError::CapacityExceeded {
            offset,
            len: bytes.len(),
            capacity: self.capacity,
        };
        let start = usize::try_from(offset).map_err(|_| exceeded())?;
        let stop = start
            .checked_add(bytes.len())
            .filter(|stop| *stop <= self.capacity)
            .ok_or_else(exceeded)?;

        let mut buffer = self.lock()?;
        buffer.data[start..stop].copy_from_slice(bytes);
        buffer.cursor = buffer.cursor.max(stop);
        self.set_state(BitstreamState::Accumulating)?;
        trace!(
            "Bitstream write of {} bytes at {start}, cursor now {}",
            bytes.len(),
            buffer.cursor
        );
        Ok(bytes.len())
    }

    /// Program the accumulated bitstream, `data[0..cursor]`.
    ///
    /// # Returns: `Result<usize, GatewayError>`
    /// * `Ok(usize)` - The number of bytes handed to the service
    /// * `Err(GatewayError::InvalidArgument)` - Nothing has been uploaded
    /// * `Err(..)` - Whatever the service reported; the bitstream is kept
    pub fn program(&self) -> Result<usize, GatewayError> {
        let buffer = self.lock()?;
        if buffer.cursor == 0 {
            return Err(GatewayError::InvalidArgument(
                "no bitstream has been uploaded".into(),
            ));
        }
        self.set_state(BitstreamState::Programming)?;
        let len = buffer.cursor;
        info!("Programming {len} byte bitstream");
        match self.service.program(&buffer.data[..len]) {
            Ok(()) => {
                self.set_state(BitstreamState::Ready)?;
                Ok(len)
            }
            Err(e) => {
                self.set_state(BitstreamState::Accumulating)?;
                Err(e)
            }
        }
    }

    /// Whether the device reports itself as operating, regardless of the last program attempt.
    pub fn status(&self) -> Result<bool, GatewayError> {
        self.service.is_operating()
    }

    /// Discard the upload and return to `Idle`.
    pub fn reset(&self) -> Result<(), GatewayError> {
        let mut buffer = self.lock()?;
        let previous = buffer.cursor;
        buffer.data[..previous].fill(0);
        buffer.cursor = 0;
        self.set_state(BitstreamState::Idle)?;
        debug!("Bitstream buffer reset, discarded {previous} bytes");
        Ok(())
    }

    pub fn cursor(&self) -> Result<usize, GatewayError> {
        Ok(self.lock()?.cursor)
    }

    /// Current upload state. Answers while a program call is in flight.
    pub fn state(&self) -> Result<BitstreamState, GatewayError> {
        self.state
            .lock()
            .map(|state| *state)
            .map_err(|_| GatewayError::Internal("bitstream state lock poisoned".into()))
    }
}
