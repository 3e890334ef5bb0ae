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

/// The device-tree `compatible` property of the board, as exported by the kernel. Typically
/// `/sys/firmware/devicetree/base/compatible`. Holds a NUL separated list of strings.
pub static DEVICE_TREE_COMPATIBLE: &str = "/sys/firmware/devicetree/base/compatible";

/// The driver-decided location of fpga_manager objects. Typically `/sys/class/fpga_manager/`.
pub static FPGA_MANAGERS_DIR: &str = "/sys/class/fpga_manager/";

/// The fpga_manager device that receives uploaded bitstreams.
pub static FPGA_DEVICE_HANDLE: &str = "fpga0";

/// Directory searched by the kernel firmware loader. Uploaded bitstreams are staged here before
/// their name is handed to the fpga_manager.
pub static FIRMWARE_DIR: &str = "/lib/firmware/";

/// File name used when staging an uploaded bitstream in [`FIRMWARE_DIR`].
pub static BITSTREAM_IMAGE_NAME: &str = "ucube_bitstream.bin";

/// The Zynq-7000 fabric clock class exported by the devcfg driver. Each of the four PL clocks
/// lives at `<dir>/fclk<N>/set_rate`.
pub static FCLK_CLASS_DIR: &str = "/sys/class/fclk/";

/// The UIO device wired to the acquisition-complete interrupt of the capture core.
pub static UIO_DEVICE: &str = "/dev/uio0";

/// Physical memory used for uncached bus-window access.
pub static DEV_MEM: &str = "/dev/mem";

/// Well-known DBus name of the gateway service.
pub static DBUS_SERVICE_NAME: &str = "io.ucube.gateway";

/// Object path of the read-only status interface.
pub static DBUS_STATUS_PATH: &str = "/io/ucube/gateway/status";

/// Object path of the control interface.
pub static DBUS_CONTROL_PATH: &str = "/io/ucube/gateway/control";

/// Size of the acquisition buffer at attach time: 1024 32-bit samples.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 4;

/// Fixed capacity of the bitstream upload buffer.
pub const BITSTREAM_CAPACITY: usize = 16 * 1024 * 1024;

/// Base of the reserved-memory carve-out that backs acquisition buffers.
pub const DMA_POOL_BASE: u64 = 0x1000_0000;

/// Size of the reserved-memory carve-out that backs acquisition buffers.
pub const DMA_POOL_SIZE: u64 = 64 * 1024 * 1024;

/// Page granularity used for bus-window mapping arithmetic.
pub const PAGE_SIZE: u64 = 4096;

/// Number of fabric clocks on clock-managed platforms.
pub const CLOCK_COUNT: usize = 4;
