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

//! Read-only DBus interface, served at `/io/ucube/gateway/status`.
//!
//! `read` on the data endpoint clears the readiness flag as a side effect; everything else here
//! leaves the gateway untouched.

use crate::comm::dbus::{map_window_word, transfer_buffer};
use log::info;
use std::sync::Arc;
use ucubed::gateway::Gateway;
use zbus::{fdo, interface};

pub struct StatusInterface {
    pub gateway: Arc<Gateway>,
}

#[interface(name = "io.ucube.gateway.status")]
impl StatusInterface {
    /// Read up to `count` bytes from an endpoint.
    async fn read(&self, endpoint: u32, count: u32) -> Result<Vec<u8>, fdo::Error> {
        info!("read called on endpoint {endpoint} for {count} bytes");
        let mut buffer = transfer_buffer(&self.gateway, endpoint, count)?;
        let len = self.gateway.sessions().read(endpoint, &mut buffer)?;
        buffer.truncate(len);
        Ok(buffer)
    }

    async fn poll(&self, endpoint: u32) -> Result<u32, fdo::Error> {
        Ok(self.gateway.sessions().poll(endpoint)?.bits())
    }

    async fn get_config(&self, key: &str) -> Result<String, fdo::Error> {
        info!("get_config called with key: {key}");
        Ok(self.gateway.configuration().get(key)?)
    }

    async fn get_platform_variant(&self) -> Result<String, fdo::Error> {
        info!("get_platform_variant called");
        Ok(self.gateway.variant().to_string())
    }

    async fn get_bitstream_state(&self) -> Result<String, fdo::Error> {
        info!("get_bitstream_state called");
        Ok(self.gateway.bitstream_state()?.to_string())
    }

    /// Volatile 32-bit load from a physical address inside a bus window.
    async fn read_window_word(&self, endpoint: u32, address: u64) -> Result<u32, fdo::Error> {
        info!("read_window_word called on endpoint {endpoint} at {address:#x}");
        let region = map_window_word(&self.gateway, endpoint, address)?;
        Ok(region.read32(0)?)
    }
}
