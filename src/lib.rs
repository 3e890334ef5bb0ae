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

//! Core of the ucube acquisition gateway.
//!
//! A capture core in the FPGA fabric writes samples into a DMA buffer and raises an interrupt when
//! a capture completes. This crate turns that device into four endpoints:
//!
//! - `data` (0): the latest acquisition snapshot, see [`acquisition`]
//! - `bus-window-0` (1) and `bus-window-1` (2): raw physical windows onto the fabric buses, see
//!   [`mapping`]
//! - `bitstream` (3): bitstream upload and programming, see [`reconfiguration`]
//!
//! plus a key/value [`configuration`] surface for clock rates and the buffer size. The hardware
//! generation, and with it the DMA word width, the bus windows and clock ownership, is resolved
//! once by [`platform`]. [`gateway::Gateway`] ties one attached device together.

pub mod acquisition;
pub mod config;
pub mod configuration;
pub mod endpoints;
pub mod error;
pub mod gateway;
pub mod mapping;
pub mod platform;
pub mod reconfiguration;
pub mod system_io;
