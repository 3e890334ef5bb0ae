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

//! DBus interface for operations that change gateway or hardware state, served at
//! `/io/ucube/gateway/control`.

use crate::comm::dbus::map_window_word;
use log::{info, trace};
use std::sync::Arc;
use ucubed::gateway::Gateway;
use ucubed::mapping::{GrantMapper, validate_and_map};
use zbus::{fdo, interface};

pub struct ControlInterface {
    pub gateway: Arc<Gateway>,
}

#[interface(name = "io.ucube.gateway.control")]
impl ControlInterface {
    /// Write `data` at `offset` on an endpoint; returns the number of bytes accepted.
    async fn write(&self, endpoint: u32, offset: u64, data: Vec<u8>) -> Result<u64, fdo::Error> {
        trace!(
            "write called on endpoint {endpoint}: {} bytes at {offset}",
            data.len()
        );
        Ok(self.gateway.sessions().write(endpoint, offset, &data)? as u64)
    }

    async fn ioctl(&self, endpoint: u32, code: u32) -> Result<u64, fdo::Error> {
        info!("ioctl called on endpoint {endpoint} with code {code}");
        Ok(self.gateway.sessions().ioctl(endpoint, code)?)
    }

    /// Validate a mapping request for a caller that maps the window itself.
    ///
    /// Returns the page index and the offset within that page.
    async fn map_window(
        &self,
        endpoint: u32,
        offset: u64,
        length: u64,
    ) -> Result<(u64, u64), fdo::Error> {
        info!("map_window called on endpoint {endpoint}: {length:#x} bytes at {offset:#x}");
        let descriptor = self.gateway.sessions().descriptor(endpoint)?;
        let region = validate_and_map(&descriptor, offset, length, &GrantMapper)?;
        Ok((region.page_index(), region.page_offset()))
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<String, fdo::Error> {
        info!("set_config called with key: {key} and value: {value:?}");
        self.gateway.configuration().set(key, value)?;
        Ok(format!("{key} set to {}", value.trim()))
    }

    async fn reset_bitstream(&self) -> Result<String, fdo::Error> {
        info!("reset_bitstream called");
        self.gateway.reset_bitstream()?;
        Ok("Bitstream buffer reset".into())
    }

    /// Volatile 32-bit store to a physical address inside a bus window.
    async fn write_window_word(
        &self,
        endpoint: u32,
        address: u64,
        value: u32,
    ) -> Result<String, fdo::Error> {
        info!("write_window_word called on endpoint {endpoint}: {value:#x} to {address:#x}");
        let region = map_window_word(&self.gateway, endpoint, address)?;
        region.write32(0, value)?;
        Ok(format!("{value:#x} written to {address:#x}"))
    }
}
