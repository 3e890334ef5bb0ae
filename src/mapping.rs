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

//! Validation and mapping of raw physical bus windows.
//!
//! The two bus-window endpoints expose the fabric's physical address space directly. A request
//! names a physical address (`offset`) and a `length`; it is accepted only when the whole range
//! `[offset, offset + length)` lies inside the endpoint's window for the attached variant. The
//! accepted range is handed to a [`PhysicalMapper`] unchanged: the mapping starts at `offset`
//! itself, so the page index is `offset / PAGE_SIZE` and the offset within the page is kept.
//!
//! Two mappers exist:
//! - [`DevMemMapper`] maps the range out of `/dev/mem` with `O_SYNC`, giving an uncached view
//!   the daemon can peek and poke with volatile 32-bit accesses.
//! - [`GrantMapper`] records the validated range only, for callers that map it themselves.

use crate::config;
use crate::endpoints::EndpointDescriptor;
use crate::error::{GatewayError, WindowBound};
use crate::platform::AddressWindow;
use log::{debug, info, trace};
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// A validated, established mapping of part of a bus window.
#[derive(Debug)]
pub struct MappedRegion {
    physical_base: u64,
    length: u64,
    view: Option<DevMemView>,
}

impl MappedRegion {
    /// A region that carries no host view of its own.
    pub fn granted(physical_base: u64, length: u64) -> MappedRegion {
        MappedRegion {
            physical_base,
            length,
            view: None,
        }
    }

    pub fn physical_base(&self) -> u64 {
        self.physical_base
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn page_index(&self) -> u64 {
        self.physical_base / config::PAGE_SIZE
    }

    pub fn page_offset(&self) -> u64 {
        self.physical_base % config::PAGE_SIZE
    }

    fn view_at(&self, offset: u64) -> Result<(&DevMemView, usize), GatewayError> {
        let view = self.view.as_ref().ok_or_else(|| {
            GatewayError::UnsupportedOperation(format!(
                "region at {:#x} has no host view",
                self.physical_base
            ))
        })?;
        let stop = offset.checked_add(4).unwrap_or(u64::MAX);
        if stop > self.length {
            return Err(GatewayError::OutOfRange {
                bound: WindowBound::Above,
                requested: self.physical_base.saturating_add(stop),
                limit: self.physical_base.saturating_add(self.length),
            });
        }
        let offset = usize::try_from(offset)
            .map_err(|_| GatewayError::TransferFault(format!("offset {offset:#x} too large")))?;
        Ok((view, offset))
    }

    /// Volatile 32-bit load at `offset` bytes into the region.
    pub fn read32(&self, offset: u64) -> Result<u32, GatewayError> {
        let (view, offset) = self.view_at(offset)?;
        Ok(view.read32(offset))
    }

    /// Volatile 32-bit store at `offset` bytes into the region.
    pub fn write32(&self, offset: u64, value: u32) -> Result<(), GatewayError> {
        let (view, offset) = self.view_at(offset)?;
        view.write32(offset, value);
        Ok(())
    }
}

/// Establishes a mapping of an already validated physical range.
pub trait PhysicalMapper: Send + Sync {
    fn map(&self, physical_base: u64, length: u64) -> Result<MappedRegion, GatewayError>;
}

/// Check a request against an endpoint's window.
///
/// # Returns: `Result<(), GatewayError>`
/// * `Ok(())` - `[offset, offset + length)` lies inside `window`
/// * `Err(GatewayError::InvalidArgument)` - `length` is zero
/// * `Err(GatewayError::OutOfRange)` - The range starts below or ends above the window
pub fn check_window(window: AddressWindow, offset: u64, length: u64) -> Result<(), GatewayError> {
    if length == 0 {
        return Err(GatewayError::InvalidArgument(
            "cannot map a zero-length range".into(),
        ));
    }
    if offset < window.base {
        return Err(GatewayError::OutOfRange {
            bound: WindowBound::Below,
            requested: offset,
            limit: window.base,
        });
    }
    match offset.checked_add(length) {
        Some(stop) if stop <= window.top => Ok(()),
        stop => Err(GatewayError::OutOfRange {
            bound: WindowBound::Above,
            requested: stop.unwrap_or(u64::MAX),
            limit: window.top,
        }),
    }
}

/// Validate a map request for `endpoint` and, if accepted, map the range with `mapper`.
///
/// # Arguments
///
/// * `endpoint` - The endpoint the request was made on
/// * `offset` - Physical address the mapping starts at
/// * `length` - Length of the mapping in bytes
/// * `mapper` - Collaborator that establishes the mapping
///
/// # Returns: `Result<MappedRegion, GatewayError>`
/// * `Ok(MappedRegion)` - Mapping of exactly `[offset, offset + length)`
/// * `Err(GatewayError::UnsupportedOperation)` - The endpoint has no window
/// * `Err(GatewayError::InvalidArgument)` - `length` is zero
/// * `Err(GatewayError::OutOfRange)` - The range leaves the window
pub fn validate_and_map(
    endpoint: &EndpointDescriptor,
    offset: u64,
    length: u64,
    mapper: &dyn PhysicalMapper,
) -> Result<MappedRegion, GatewayError> {
    let window = endpoint.window.ok_or_else(|| {
        GatewayError::UnsupportedOperation(format!("endpoint '{}' cannot be mapped", endpoint.name))
    })?;
    check_window(window, offset, length)?;
    trace!(
        "Mapping {length:#x} bytes at {offset:#x} through endpoint '{}'",
        endpoint.name
    );
    mapper.map(offset, length)
}

/// Mapper that only records the validated range.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrantMapper;

impl PhysicalMapper for GrantMapper {
    fn map(&self, physical_base: u64, length: u64) -> Result<MappedRegion, GatewayError> {
        debug!("Granted {length:#x} bytes at {physical_base:#x}");
        Ok(MappedRegion::granted(physical_base, length))
    }
}

/// Mapper backed by `/dev/mem`.
#[derive(Debug, Clone)]
pub struct DevMemMapper {
    device: PathBuf,
}

impl Default for DevMemMapper {
    fn default() -> Self {
        DevMemMapper::new(PathBuf::from(config::DEV_MEM))
    }
}

impl DevMemMapper {
    pub fn new(device: PathBuf) -> DevMemMapper {
        DevMemMapper { device }
    }
}

impl PhysicalMapper for DevMemMapper {
    fn map(&self, physical_base: u64, length: u64) -> Result<MappedRegion, GatewayError> {
        let view = DevMemView::open(&self.device, physical_base, length)?;
        info!("Mapped {length:#x} bytes of physical memory at {physical_base:#x}");
        Ok(MappedRegion {
            physical_base,
            length,
            view: Some(view),
        })
    }
}

/// An uncached `mmap` of `/dev/mem`.
#[derive(Debug)]
pub(crate) struct DevMemView {
    // start of the page-aligned mapping
    map_ptr: *mut libc::c_void,
    map_len: usize,
    // first byte of the requested range inside the mapping
    ptr: *mut u8,
}

// SAFETY: the view is only accessed through volatile loads and stores of whole words; the memory
// is device memory, not Rust-owned data.
unsafe impl Send for DevMemView {}
unsafe impl Sync for DevMemView {}

impl DevMemView {
    pub(crate) fn open(
        device: &Path,
        physical_base: u64,
        length: u64,
    ) -> Result<DevMemView, GatewayError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(device)
            .map_err(|e| GatewayError::IORead {
                file: device.into(),
                e,
            })?;
        let page_offset = physical_base % config::PAGE_SIZE;
        let map_base = physical_base - page_offset;
        let map_len = usize::try_from(length + page_offset).map_err(|_| {
            GatewayError::ResourceUnavailable(format!("cannot map {length:#x} bytes"))
        })?;
        let map_offset = libc::off_t::try_from(map_base).map_err(|_| {
            GatewayError::ResourceUnavailable(format!("{map_base:#x} exceeds the mmap offset range"))
        })?;

        // SAFETY: a fresh shared mapping of a file descriptor we own; the result is checked
        // against MAP_FAILED before use.
        let map_ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                map_offset,
            )
        };
        if map_ptr == libc::MAP_FAILED {
            return Err(GatewayError::ResourceUnavailable(format!(
                "mmap of {device:?} at {map_base:#x} failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        // SAFETY: page_offset < PAGE_SIZE <= map_len, so the result stays inside the mapping.
        let ptr = unsafe { (map_ptr as *mut u8).add(page_offset as usize) };
        Ok(DevMemView {
            map_ptr,
            map_len,
            ptr,
        })
    }

    pub(crate) fn read32(&self, offset: usize) -> u32 {
        // SAFETY: the caller bounds offset + 4 by the mapped length.
        unsafe { std::ptr::read_volatile(self.ptr.add(offset) as *const u32) }
    }

    pub(crate) fn write32(&self, offset: usize, value: u32) {
        // SAFETY: the caller bounds offset + 4 by the mapped length.
        unsafe { std::ptr::write_volatile(self.ptr.add(offset) as *mut u32, value) }
    }

    pub(crate) fn read64(&self, offset: usize) -> u64 {
        // SAFETY: the caller bounds offset + 8 by the mapped length and keeps it 8-byte aligned.
        unsafe { std::ptr::read_volatile(self.ptr.add(offset) as *const u64) }
    }

    pub(crate) fn write64(&self, offset: usize, value: u64) {
        // SAFETY: the caller bounds offset + 8 by the mapped length and keeps it 8-byte aligned.
        unsafe { std::ptr::write_volatile(self.ptr.add(offset) as *mut u64, value) }
    }
}

impl Drop for DevMemView {
    fn drop(&mut self) {
        // SAFETY: unmaps exactly the range returned by mmap in `open`.
        unsafe {
            libc::munmap(self.map_ptr, self.map_len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::EndpointId;
    use googletest::prelude::*;
    use rstest::*;

    const WINDOW: AddressWindow = AddressWindow::new(0x4000_0000, 0x8000_0000);

    fn endpoint(window: Option<AddressWindow>) -> EndpointDescriptor {
        EndpointDescriptor {
            id: EndpointId::BusWindow0,
            name: "bus-window-0",
            window,
        }
    }

    #[gtest]
    #[rstest]
    #[case::whole_window(0x4000_0000, 0x4000_0000)]
    #[case::first_page(0x4000_0000, 0x1000)]
    #[case::last_word(0x7FFF_FFFC, 4)]
    #[case::unaligned(0x4000_0123, 0x10)]
    fn test_accepts_ranges_inside_window(#[case] offset: u64, #[case] length: u64) {
        let region = validate_and_map(&endpoint(Some(WINDOW)), offset, length, &GrantMapper)
            .expect("mapping refused");
        expect_that!(region.physical_base(), eq(offset));
        expect_that!(region.length(), eq(length));
        expect_that!(region.page_index(), eq(offset / 4096));
        expect_that!(region.page_offset(), eq(offset % 4096));
    }

    #[gtest]
    #[rstest]
    #[case::below(0x3FFF_F000, 0x1000, "below")]
    #[case::straddles_base(0x3FFF_FFFC, 8, "below")]
    #[case::straddles_top(0x7FFF_FFFC, 8, "above")]
    #[case::past_top(0x8000_0000, 4, "above")]
    #[case::overflow(u64::MAX - 1, 4, "above")]
    fn test_rejects_ranges_outside_window(
        #[case] offset: u64,
        #[case] length: u64,
        #[case] bound: &str,
    ) {
        let result = validate_and_map(&endpoint(Some(WINDOW)), offset, length, &GrantMapper);
        expect_that!(
            result,
            err(displays_as(all!(
                contains_substring("GatewayError::OutOfRange"),
                contains_substring(format!("lies {bound}"))
            )))
        );
    }

    #[gtest]
    fn test_rejects_zero_length() {
        expect_that!(
            validate_and_map(&endpoint(Some(WINDOW)), 0x4000_0000, 0, &GrantMapper),
            err(displays_as(contains_substring("GatewayError::InvalidArgument")))
        );
    }

    #[gtest]
    fn test_endpoint_without_window_is_unsupported() {
        expect_that!(
            validate_and_map(&endpoint(None), 0x4000_0000, 4, &GrantMapper),
            err(displays_as(contains_substring("GatewayError::UnsupportedOperation")))
        );
    }

    #[gtest]
    fn test_granted_region_has_no_view() {
        let region = MappedRegion::granted(0x4000_0000, 4);
        expect_that!(
            region.read32(0),
            err(displays_as(contains_substring("GatewayError::UnsupportedOperation")))
        );
    }

    #[gtest]
    fn test_dev_mem_mapper_reports_missing_device() {
        let mapper = DevMemMapper::new(PathBuf::from("/nonexistent/mem"));
        expect_that!(
            mapper.map(0x4000_0000, 4096),
            err(displays_as(contains_substring("GatewayError::IORead")))
        );
    }
}
