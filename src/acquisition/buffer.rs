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

//! Acquisition buffer pair and the DMA allocator behind it.
//!
//! An [`AcquisitionBuffer`] owns two equally sized word buffers:
//! - the *source*, a [`DmaRegion`] the capture core writes into, with a physical address handed
//!   to the hardware;
//! - the *shadow*, a host-only copy refreshed on every interrupt and served to readers.
//!
//! Both sides are handled as words of the variant's DMA width so that every copy moves whole
//! 32-bit or 64-bit words. Byte views are native-endian.
//!
//! The daemon allocates sources with [`DevMemDmaAllocator`], an uncached `/dev/mem` view of a
//! reserved-memory carve-out. [`HeapDmaAllocator`] hands out plain host memory with addresses
//! from the same kind of pool, for simulation and tests.

use crate::error::GatewayError;
use crate::mapping::DevMemView;
use crate::platform::WordWidth;
use log::{debug, trace};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Word storage for one side of the buffer pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordBuffer {
    Narrow(Vec<u32>),
    Wide(Vec<u64>),
}

fn zeroed_words<T: Copy + Default>(count: usize) -> Result<Vec<T>, GatewayError> {
    let mut words = Vec::new();
    words.try_reserve_exact(count).map_err(|e| {
        GatewayError::ResourceUnavailable(format!("cannot allocate {count} words: {e}"))
    })?;
    words.resize(count, T::default());
    Ok(words)
}

impl WordBuffer {
    /// Allocate a zero-filled buffer of `size_bytes`, which must be a multiple of the word width.
    pub fn zeroed(size_bytes: usize, width: WordWidth) -> Result<WordBuffer, GatewayError> {
        check_size(size_bytes, width)?;
        let count = size_bytes / width.bytes();
        Ok(match width {
            WordWidth::Bits32 => WordBuffer::Narrow(zeroed_words(count)?),
            WordWidth::Bits64 => WordBuffer::Wide(zeroed_words(count)?),
        })
    }

    pub fn width(&self) -> WordWidth {
        match self {
            WordBuffer::Narrow(_) => WordWidth::Bits32,
            WordBuffer::Wide(_) => WordWidth::Bits64,
        }
    }

    pub fn len_bytes(&self) -> usize {
        match self {
            WordBuffer::Narrow(w) => w.len() * 4,
            WordBuffer::Wide(w) => w.len() * 8,
        }
    }

    /// Copy every word of `other` into `self`, returning the number of bytes moved.
    ///
    /// Both buffers belong to the same pair, so width and length always agree; a mismatch only
    /// copies the common prefix.
    pub fn copy_words_from(&mut self, other: &WordBuffer) -> usize {
        match (self, other) {
            (WordBuffer::Narrow(dst), WordBuffer::Narrow(src)) => {
                let n = dst.len().min(src.len());
                dst[..n].copy_from_slice(&src[..n]);
                n * 4
            }
            (WordBuffer::Wide(dst), WordBuffer::Wide(src)) => {
                let n = dst.len().min(src.len());
                dst[..n].copy_from_slice(&src[..n]);
                n * 8
            }
            _ => 0,
        }
    }

    /// Serialize up to `out.len()` bytes into `out`, returning how many were written.
    pub fn read_bytes(&self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len_bytes());
        match self {
            WordBuffer::Narrow(words) => {
                for (chunk, word) in out[..n].chunks_mut(4).zip(words) {
                    chunk.copy_from_slice(&word.to_ne_bytes()[..chunk.len()]);
                }
            }
            WordBuffer::Wide(words) => {
                for (chunk, word) in out[..n].chunks_mut(8).zip(words) {
                    chunk.copy_from_slice(&word.to_ne_bytes()[..chunk.len()]);
                }
            }
        }
        n
    }

    /// Overwrite the buffer from a byte view, returning how many bytes were taken from `data`.
    ///
    /// A trailing partial word keeps the bytes it already had past the end of `data`.
    pub fn write_bytes(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.len_bytes());
        match self {
            WordBuffer::Narrow(words) => {
                for (chunk, word) in data[..n].chunks(4).zip(words.iter_mut()) {
                    let mut bytes = word.to_ne_bytes();
                    bytes[..chunk.len()].copy_from_slice(chunk);
                    *word = u32::from_ne_bytes(bytes);
                }
            }
            WordBuffer::Wide(words) => {
                for (chunk, word) in data[..n].chunks(8).zip(words.iter_mut()) {
                    let mut bytes = word.to_ne_bytes();
                    bytes[..chunk.len()].copy_from_slice(chunk);
                    *word = u64::from_ne_bytes(bytes);
                }
            }
        }
        n
    }
}

/// Reject sizes that cannot be expressed in whole DMA words.
pub fn check_size(size_bytes: usize, width: WordWidth) -> Result<(), GatewayError> {
    if size_bytes == 0 || size_bytes % width.bytes() != 0 {
        return Err(GatewayError::InvalidArgument(format!(
            "buffer size {size_bytes} is not a non-zero multiple of the {}-byte DMA word",
            width.bytes()
        )));
    }
    Ok(())
}

#[derive(Debug)]
enum RegionMemory {
    Host(WordBuffer),
    Mapped {
        view: DevMemView,
        width: WordWidth,
        len: usize,
    },
}

/// Memory the capture core can write into directly.
#[derive(Debug)]
pub struct DmaRegion {
    memory: RegionMemory,
    physical_address: u64,
    _lease: Option<PoolLease>,
}

impl DmaRegion {
    /// Wrap host memory that has no pool lease, e.g. a region handed over by a test harness.
    pub fn new(words: WordBuffer, physical_address: u64) -> DmaRegion {
        DmaRegion {
            memory: RegionMemory::Host(words),
            physical_address,
            _lease: None,
        }
    }

    pub fn physical_address(&self) -> u64 {
        self.physical_address
    }

    pub fn width(&self) -> WordWidth {
        match &self.memory {
            RegionMemory::Host(words) => words.width(),
            RegionMemory::Mapped { width, .. } => *width,
        }
    }

    pub fn len_bytes(&self) -> usize {
        match &self.memory {
            RegionMemory::Host(words) => words.len_bytes(),
            RegionMemory::Mapped { len, .. } => *len,
        }
    }

    /// Copy the region word by word into `shadow`, returning the number of bytes moved.
    pub(crate) fn copy_into(&self, shadow: &mut WordBuffer) -> usize {
        let (view, width, len) = match &self.memory {
            RegionMemory::Host(words) => return shadow.copy_words_from(words),
            RegionMemory::Mapped { view, width, len } => (view, *width, *len),
        };
        match (shadow, width) {
            (WordBuffer::Narrow(dst), WordWidth::Bits32) => {
                let n = dst.len().min(len / 4);
                for (i, word) in dst[..n].iter_mut().enumerate() {
                    *word = view.read32(i * 4);
                }
                n * 4
            }
            (WordBuffer::Wide(dst), WordWidth::Bits64) => {
                let n = dst.len().min(len / 8);
                for (i, word) in dst[..n].iter_mut().enumerate() {
                    *word = view.read64(i * 8);
                }
                n * 8
            }
            _ => 0,
        }
    }

    /// Overwrite the start of the region from a byte view, returning how many bytes were taken.
    pub(crate) fn write_bytes(&mut self, data: &[u8]) -> usize {
        let (view, width, len) = match &mut self.memory {
            RegionMemory::Host(words) => return words.write_bytes(data),
            RegionMemory::Mapped { view, width, len } => (&*view, *width, *len),
        };
        let n = data.len().min(len);
        for (i, chunk) in data[..n].chunks(width.bytes()).enumerate() {
            let offset = i * width.bytes();
            match width {
                WordWidth::Bits32 => {
                    let mut bytes = view.read32(offset).to_ne_bytes();
                    bytes[..chunk.len()].copy_from_slice(chunk);
                    view.write32(offset, u32::from_ne_bytes(bytes));
                }
                WordWidth::Bits64 => {
                    let mut bytes = view.read64(offset).to_ne_bytes();
                    bytes[..chunk.len()].copy_from_slice(chunk);
                    view.write64(offset, u64::from_ne_bytes(bytes));
                }
            }
        }
        n
    }

    fn zero(&self) {
        if let RegionMemory::Mapped { view, len, .. } = &self.memory {
            for offset in (0..*len).step_by(4) {
                view.write32(offset, 0);
            }
        }
    }
}

/// Allocates DMA-capable source buffers.
pub trait DmaAllocator: Send + Sync {
    /// Allocate a zeroed region of `size_bytes` reachable by a device of the given width.
    ///
    /// # Returns: `Result<DmaRegion, GatewayError>`
    /// * `Ok(DmaRegion)` - Region whose physical address range fits the width's DMA mask
    /// * `Err(GatewayError::ResourceUnavailable)` - No memory, or nothing left below the mask
    /// * `Err(GatewayError::InvalidArgument)` - Size not a multiple of the word width
    fn allocate(&self, size_bytes: usize, width: WordWidth) -> Result<DmaRegion, GatewayError>;
}

#[derive(Debug)]
struct DmaPool {
    base: u64,
    size: u64,
    // (physical base, length) of every live lease, kept sorted by base
    leases: Mutex<Vec<(u64, u64)>>,
}

impl DmaPool {
    fn new(base: u64, size: u64) -> Arc<DmaPool> {
        Arc::new(DmaPool {
            base,
            size,
            leases: Mutex::new(Vec::new()),
        })
    }

    fn lease(
        self: &Arc<Self>,
        size_bytes: usize,
        page: u64,
        mask: u64,
    ) -> Result<PoolLease, GatewayError> {
        let len = (size_bytes as u64).div_ceil(page) * page;
        let base = self.reserve(len, mask)?;
        Ok(PoolLease {
            pool: Arc::clone(self),
            base,
        })
    }

    fn reserve(&self, len: u64, mask: u64) -> Result<u64, GatewayError> {
        let mut leases = self
            .leases
            .lock()
            .map_err(|_| GatewayError::Internal("DMA pool lock poisoned".into()))?;
        let end = self.base.saturating_add(self.size);
        let mut candidate = self.base;
        let mut slot = leases.len();
        for (i, (lease_base, lease_len)) in leases.iter().enumerate() {
            if candidate.saturating_add(len) <= *lease_base {
                slot = i;
                break;
            }
            candidate = lease_base + lease_len;
        }
        let last = candidate.saturating_add(len);
        if last > end || last - 1 > mask {
            return Err(GatewayError::ResourceUnavailable(format!(
                "no {len} byte range left in the DMA pool at {:#x} below mask {mask:#x}",
                self.base
            )));
        }
        leases.insert(slot, (candidate, len));
        trace!("DMA pool lease {candidate:#x}+{len:#x}");
        Ok(candidate)
    }

    fn release(&self, base: u64) {
        if let Ok(mut leases) = self.leases.lock() {
            leases.retain(|(b, _)| *b != base);
            trace!("DMA pool released {base:#x}");
        }
    }
}

#[derive(Debug)]
struct PoolLease {
    pool: Arc<DmaPool>,
    base: u64,
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.pool.release(self.base);
    }
}

/// Host-memory allocator whose physical addresses come from a reserved-memory carve-out.
///
/// Addresses are handed out first-fit, page aligned, from `[base, base + size)`. A lease is
/// returned to the pool when its [`DmaRegion`] is dropped. Nothing but the host writes into
/// these regions, so this allocator serves simulation and tests.
#[derive(Debug, Clone)]
pub struct HeapDmaAllocator {
    pool: Arc<DmaPool>,
    page: u64,
}

impl HeapDmaAllocator {
    pub fn new(base: u64, size: u64, page: u64) -> HeapDmaAllocator {
        HeapDmaAllocator {
            pool: DmaPool::new(base, size),
            page: page.max(1),
        }
    }

    /// Number of regions currently leased out of the pool.
    pub fn live_leases(&self) -> usize {
        self.pool.leases.lock().map(|l| l.len()).unwrap_or(0)
    }
}

impl DmaAllocator for HeapDmaAllocator {
    fn allocate(&self, size_bytes: usize, width: WordWidth) -> Result<DmaRegion, GatewayError> {
        check_size(size_bytes, width)?;
        // the lease is returned to the pool if the host allocation fails below
        let lease = self.pool.lease(size_bytes, self.page, width.dma_mask())?;
        let physical_address = lease.base;
        let words = WordBuffer::zeroed(size_bytes, width)?;
        debug!("Allocated {size_bytes} byte host DMA region at {physical_address:#x}");
        Ok(DmaRegion {
            memory: RegionMemory::Host(words),
            physical_address,
            _lease: Some(lease),
        })
    }
}

/// Allocator over a reserved-memory carve-out, mapped uncached through `/dev/mem`.
///
/// Leases are handed out like [`HeapDmaAllocator`]'s. Each region is a view of its own leased
/// physical range, so writes by the capture core land in it directly. Regions are zeroed before
/// they are returned.
#[derive(Debug, Clone)]
pub struct DevMemDmaAllocator {
    device: PathBuf,
    pool: Arc<DmaPool>,
    page: u64,
}

impl DevMemDmaAllocator {
    pub fn new(device: PathBuf, base: u64, size: u64, page: u64) -> DevMemDmaAllocator {
        DevMemDmaAllocator {
            device,
            pool: DmaPool::new(base, size),
            page: page.max(1),
        }
    }
}

impl DmaAllocator for DevMemDmaAllocator {
    fn allocate(&self, size_bytes: usize, width: WordWidth) -> Result<DmaRegion, GatewayError> {
        check_size(size_bytes, width)?;
        let lease = self.pool.lease(size_bytes, self.page, width.dma_mask())?;
        let physical_address = lease.base;
        if physical_address % width.bytes() as u64 != 0 {
            return Err(GatewayError::ResourceUnavailable(format!(
                "DMA pool address {physical_address:#x} is not {}-byte aligned",
                width.bytes()
            )));
        }
        let view = DevMemView::open(&self.device, physical_address, size_bytes as u64)?;
        let region = DmaRegion {
            memory: RegionMemory::Mapped {
                view,
                width,
                len: size_bytes,
            },
            physical_address,
            _lease: Some(lease),
        };
        region.zero();
        debug!(
            "Mapped {size_bytes} byte DMA region at {physical_address:#x} from {:?}",
            self.device
        );
        Ok(region)
    }
}

/// The source/shadow pair backing the data endpoint.
#[derive(Debug)]
pub struct AcquisitionBuffer {
    source: DmaRegion,
    shadow: WordBuffer,
    size_bytes: usize,
}

impl AcquisitionBuffer {
    /// Allocate a source region and an equally sized shadow.
    ///
    /// # Returns: `Result<AcquisitionBuffer, GatewayError>`
    /// * `Ok(AcquisitionBuffer)` - Both sides allocated, `size_bytes` long
    /// * `Err(GatewayError::ResourceUnavailable)` - Either allocation failed; nothing is kept
    /// * `Err(GatewayError::InvalidArgument)` - Size not a non-zero multiple of the word width
    pub fn allocate(
        allocator: &dyn DmaAllocator,
        size_bytes: usize,
        width: WordWidth,
    ) -> Result<AcquisitionBuffer, GatewayError> {
        check_size(size_bytes, width)?;
        let source = allocator.allocate(size_bytes, width)?;
        if source.len_bytes() != size_bytes || source.width() != width {
            return Err(GatewayError::ResourceUnavailable(format!(
                "allocator returned a {} byte region for a {size_bytes} byte request",
                source.len_bytes()
            )));
        }
        let shadow = WordBuffer::zeroed(size_bytes, width)?;
        Ok(AcquisitionBuffer {
            source,
            shadow,
            size_bytes,
        })
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn width(&self) -> WordWidth {
        self.shadow.width()
    }

    pub fn physical_address(&self) -> u64 {
        self.source.physical_address()
    }

    /// Copy the whole source into the shadow, returning the byte count moved.
    pub(crate) fn refresh_shadow(&mut self) -> usize {
        self.source.copy_into(&mut self.shadow)
    }

    /// Copy at most `out.len()` bytes of the shadow to `out`.
    pub(crate) fn read_shadow(&self, out: &mut [u8]) -> usize {
        self.shadow.read_bytes(out)
    }

    /// Stand in for the capture core writing into the source region.
    pub(crate) fn fill_source(&mut self, data: &[u8]) -> usize {
        self.source.write_bytes(data)
    }
}
