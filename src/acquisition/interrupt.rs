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

//! Interrupt lines feeding the acquisition channel.
//!
//! The channel only needs to silence its interrupt source while the buffer pair is swapped, so
//! the contract is two calls: [`InterruptLine::mask`] and [`InterruptLine::unmask`].
//!
//! Two lines are provided:
//! - [`UioInterruptLine`] drives a Linux UIO device. A blocking 4-byte read waits for the next
//!   interrupt and returns the running event count; writing `1u32` enables the interrupt and
//!   `0u32` disables it. The UIO generic IRQ driver disables the line after each event, so the
//!   wait loop re-arms it with [`UioInterruptLine::rearm`], which is a no-op while a resize holds
//!   the line masked.
//! - [`SoftwareInterruptLine`] keeps the mask state in memory, for simulation and tests where
//!   interrupts are raised by calling the channel directly.

use crate::error::GatewayError;
use log::{trace, warn};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// The interrupt source of the capture core.
pub trait InterruptLine: Send + Sync {
    /// Stop delivering interrupts until [`InterruptLine::unmask`] is called.
    fn mask(&self) -> Result<(), GatewayError>;

    /// Resume delivering interrupts.
    fn unmask(&self) -> Result<(), GatewayError>;
}

impl<T: InterruptLine + ?Sized> InterruptLine for Arc<T> {
    fn mask(&self) -> Result<(), GatewayError> {
        (**self).mask()
    }

    fn unmask(&self) -> Result<(), GatewayError> {
        (**self).unmask()
    }
}

/// Holds a line masked for as long as it lives.
pub(crate) struct QuiescedLine<'a> {
    line: &'a dyn InterruptLine,
}

impl<'a> QuiescedLine<'a> {
    pub(crate) fn new(line: &'a dyn InterruptLine) -> Result<QuiescedLine<'a>, GatewayError> {
        line.mask()?;
        trace!("Interrupt line quiesced");
        Ok(QuiescedLine { line })
    }
}

impl Drop for QuiescedLine<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.line.unmask() {
            warn!("Failed to re-enable the interrupt line: {e}");
        } else {
            trace!("Interrupt line re-enabled");
        }
    }
}

/// In-memory interrupt line.
#[derive(Debug, Default)]
pub struct SoftwareInterruptLine {
    masked: AtomicBool,
    quiesce_count: AtomicUsize,
}

impl SoftwareInterruptLine {
    pub fn new() -> SoftwareInterruptLine {
        SoftwareInterruptLine::default()
    }

    pub fn is_masked(&self) -> bool {
        self.masked.load(Ordering::SeqCst)
    }

    /// How many times the line has been masked since creation.
    pub fn quiesce_count(&self) -> usize {
        self.quiesce_count.load(Ordering::SeqCst)
    }
}

impl InterruptLine for SoftwareInterruptLine {
    fn mask(&self) -> Result<(), GatewayError> {
        self.masked.store(true, Ordering::SeqCst);
        self.quiesce_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unmask(&self) -> Result<(), GatewayError> {
        self.masked.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Interrupt line backed by a UIO device node such as `/dev/uio0`.
#[derive(Debug)]
pub struct UioInterruptLine {
    device: File,
    path: PathBuf,
    // held across the enable write so a rearm cannot slip in between mask and unmask
    quiesced: Mutex<bool>,
}

impl UioInterruptLine {
    /// Open the UIO device read/write.
    ///
    /// # Returns: `Result<UioInterruptLine, GatewayError>`
    /// * `Ok(UioInterruptLine)` - Device opened; the interrupt state is left untouched
    /// * `Err(GatewayError::IORead)` - The node does not exist or cannot be opened
    pub fn open(path: &Path) -> Result<UioInterruptLine, GatewayError> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| GatewayError::IORead {
                file: path.into(),
                e,
            })?;
        Ok(UioInterruptLine {
            device,
            path: path.into(),
            quiesced: Mutex::new(false),
        })
    }

    fn write_enable(&self, enabled: bool) -> Result<(), GatewayError> {
        let value = u32::from(enabled).to_ne_bytes();
        (&self.device)
            .write_all(&value)
            .map_err(|e| GatewayError::IOWrite {
                file: self.path.clone(),
                e,
            })
    }

    fn quiesced(&self) -> Result<std::sync::MutexGuard<'_, bool>, GatewayError> {
        self.quiesced
            .lock()
            .map_err(|_| GatewayError::Internal("UIO quiesce lock poisoned".into()))
    }

    /// Block until the next interrupt and return the device's running event count.
    pub fn wait(&self) -> Result<u32, GatewayError> {
        let mut count = [0u8; 4];
        (&self.device)
            .read_exact(&mut count)
            .map_err(|e| GatewayError::IORead {
                file: self.path.clone(),
                e,
            })?;
        let count = u32::from_ne_bytes(count);
        trace!("{:?} reported interrupt #{count}", self.path);
        Ok(count)
    }

    /// Re-enable the interrupt after it has been handled, unless a resize has the line masked.
    pub fn rearm(&self) -> Result<(), GatewayError> {
        let quiesced = self.quiesced()?;
        if *quiesced {
            trace!("Not re-arming {:?}: line is quiesced", self.path);
            return Ok(());
        }
        self.write_enable(true)
    }
}

impl InterruptLine for UioInterruptLine {
    fn mask(&self) -> Result<(), GatewayError> {
        let mut quiesced = self.quiesced()?;
        self.write_enable(false)?;
        *quiesced = true;
        Ok(())
    }

    fn unmask(&self) -> Result<(), GatewayError> {
        let mut quiesced = self.quiesced()?;
        self.write_enable(true)?;
        *quiesced = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;

    fn scratch_device(name: &str, contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ucubed-uio-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("failed to create scratch dir");
        let path = dir.join(name);
        std::fs::write(&path, contents).expect("failed to create scratch device");
        path
    }

    #[gtest]
    fn test_quiesced_line_unmasks_on_drop() {
        let line = SoftwareInterruptLine::new();
        {
            let _quiesced = QuiescedLine::new(&line).expect("mask");
            expect_that!(line.is_masked(), eq(true));
        }
        expect_that!(line.is_masked(), eq(false));
        expect_that!(line.quiesce_count(), eq(1));
    }

    #[gtest]
    fn test_uio_open_missing_node_fails() {
        expect_that!(
            UioInterruptLine::open(Path::new("/nonexistent/uio9")),
            err(displays_as(contains_substring("GatewayError::IORead")))
        );
    }

    #[gtest]
    fn test_uio_wait_returns_event_count() {
        let path = scratch_device("wait", &7u32.to_ne_bytes());
        let line = UioInterruptLine::open(&path).expect("open");
        expect_that!(line.wait(), ok(eq(&7)));
    }

    #[gtest]
    fn test_uio_rearm_is_suppressed_while_quiesced() {
        let path = scratch_device("rearm", &[]);
        let line = UioInterruptLine::open(&path).expect("open");
        line.mask().expect("mask");
        line.rearm().expect("rearm");
        // only the disable write reached the device
        expect_that!(
            std::fs::read(&path).expect("read back"),
            eq(&0u32.to_ne_bytes().to_vec())
        );
        line.unmask().expect("unmask");
        line.rearm().expect("rearm");
        expect_that!(std::fs::metadata(&path).expect("stat").len(), eq(12));
    }
}
