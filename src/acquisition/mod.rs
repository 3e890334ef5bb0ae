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

//! The acquisition channel: buffer pair, interrupt bridge and readiness handoff.
//!
//! # Readiness protocol
//!
//! ```text
//!            on_interrupt(): copy source -> shadow, set ready
//!   Idle  ------------------------------------------------->  Ready
//!         <-------------------------------------------------
//!            read(): deliver shadow, clear ready
//! ```
//!
//! The indicator is a single flag; a second interrupt before a read simply refreshes the shadow
//! again. A read while idle still succeeds and returns the previous snapshot marked as stale.
//!
//! Copy-and-set and read-and-clear run under the same lock, so a reader never sees a shadow that
//! is half old and half new. A resize first masks the interrupt line, then allocates the new pair
//! outside the lock and swaps it in under the lock; if the allocation fails the old pair is never
//! touched.

pub mod buffer;
pub mod interrupt;

use crate::error::GatewayError;
use crate::platform::WordWidth;
use buffer::{AcquisitionBuffer, DmaAllocator, check_size};
use interrupt::{InterruptLine, QuiescedLine};
use log::{debug, info, trace};
use std::sync::{Mutex, MutexGuard};

/// Result of a read on the data endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Bytes copied into the caller's buffer.
    pub len: usize,
    /// Whether the snapshot was new since the previous read.
    pub fresh: bool,
}

#[derive(Debug)]
struct Acquisition {
    buffer: AcquisitionBuffer,
    ready: bool,
}

/// Owns the acquisition buffer pair and the interrupt line that refreshes it.
pub struct AcquisitionChannel {
    allocator: Box<dyn DmaAllocator>,
    line: Box<dyn InterruptLine>,
    width: WordWidth,
    state: Mutex<Acquisition>,
}

impl AcquisitionChannel {
    /// Allocate the initial buffer pair.
    ///
    /// # Returns: `Result<AcquisitionChannel, GatewayError>`
    /// * `Ok(AcquisitionChannel)` - Pair allocated, readiness cleared
    /// * `Err(GatewayError::InvalidArgument)` - `size_bytes` is not a non-zero multiple of the word
    /// * `Err(GatewayError::ResourceUnavailable)` - Allocation failed
    pub fn new(
        allocator: Box<dyn DmaAllocator>,
        line: Box<dyn InterruptLine>,
        size_bytes: usize,
        width: WordWidth,
    ) -> Result<AcquisitionChannel, GatewayError> {
        let buffer = AcquisitionBuffer::allocate(allocator.as_ref(), size_bytes, width)?;
        info!(
            "Acquisition buffer of {size_bytes} bytes at {:#x}",
            buffer.physical_address()
        );
        Ok(AcquisitionChannel {
            allocator,
            line,
            width,
            state: Mutex::new(Acquisition {
                buffer,
                ready: false,
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Acquisition>, GatewayError> {
        self.state
            .lock()
            .map_err(|_| GatewayError::Internal("acquisition lock poisoned".into()))
    }

    /// Handle one acquisition-complete interrupt.
    ///
    /// Copies exactly `size_bytes` from source to shadow and raises the readiness flag. Returns
    /// the number of bytes copied.
    pub fn on_interrupt(&self) -> Result<usize, GatewayError> {
        let mut state = self.lock()?;
        let copied = state.buffer.refresh_shadow();
        state.ready = true;
        trace!("Interrupt refreshed {copied} bytes of shadow");
        Ok(copied)
    }

    /// Deliver up to `min(out.len(), size_bytes)` bytes of the shadow and clear readiness.
    ///
    /// An empty `out` consumes nothing and leaves readiness set.
    pub fn read(&self, out: &mut [u8]) -> Result<Delivery, GatewayError> {
        let mut state = self.lock()?;
        let len = state.buffer.read_shadow(out);
        let fresh = state.ready;
        if len > 0 {
            state.ready = false;
        }
        trace!("Read delivered {len} bytes (fresh: {fresh})");
        Ok(Delivery { len, fresh })
    }

    /// Whether a new snapshot is waiting to be read.
    pub fn is_ready(&self) -> Result<bool, GatewayError> {
        Ok(self.lock()?.ready)
    }

    pub fn size_bytes(&self) -> Result<usize, GatewayError> {
        Ok(self.lock()?.buffer.size_bytes())
    }

    /// Physical address of the source region, as programmed into the capture core.
    pub fn physical_address(&self) -> Result<u64, GatewayError> {
        Ok(self.lock()?.buffer.physical_address())
    }

    pub fn width(&self) -> WordWidth {
        self.width
    }

    /// Replace the buffer pair with one of `new_size_bytes`.
    ///
    /// # Returns: `Result<(), GatewayError>`
    /// * `Ok(())` - New pair in place, readiness cleared, old pair released
    /// * `Err(GatewayError::InvalidArgument)` - Size not a non-zero multiple of the word width
    /// * `Err(GatewayError::ResourceUnavailable)` - Allocation failed; the old pair is unchanged
    pub fn resize(&self, new_size_bytes: usize) -> Result<(), GatewayError> {
        check_size(new_size_bytes, self.width)?;
        let _quiesced = QuiescedLine::new(self.line.as_ref())?;
        let replacement =
            AcquisitionBuffer::allocate(self.allocator.as_ref(), new_size_bytes, self.width)?;
        let old = {
            let mut state = self.lock()?;
            state.ready = false;
            std::mem::replace(&mut state.buffer, replacement)
        };
        info!(
            "Acquisition buffer resized from {} to {new_size_bytes} bytes",
            old.size_bytes()
        );
        drop(old);
        debug!("Previous acquisition buffer released");
        Ok(())
    }

    /// Write into the source region as the capture core would. Used by simulation and tests.
    pub fn fill_source(&self, data: &[u8]) -> Result<usize, GatewayError> {
        Ok(self.lock()?.buffer.fill_source(data))
    }
}

impl std::fmt::Debug for AcquisitionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionChannel")
            .field("width", &self.width)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
