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

//! The four endpoints and the registry that dispatches calls to them.
//!
//! | index | endpoint       | read               | write          | mmap           | ioctl                 | poll     |
//! |-------|----------------|--------------------|----------------|----------------|-----------------------|----------|
//! | 0     | `data`         | shadow snapshot    | inert          | unsupported    | `NEW_DATA_AVAILABLE`  | readable |
//! | 1     | `bus-window-0` | inert              | inert          | bus 0 window   | inert                 | empty    |
//! | 2     | `bus-window-1` | inert              | inert          | bus 1 window   | inert                 | empty    |
//! | 3     | `bitstream`    | `b'1'` / `b'0'`    | bounded append | unsupported    | `PROGRAM_FPGA`        | empty    |
//!
//! Every endpoint implements [`EndpointOps`]; the trait's default methods are the neutral results
//! returned for operations an endpoint does not take part in.

use crate::acquisition::AcquisitionChannel;
use crate::error::GatewayError;
use crate::mapping::{MappedRegion, PhysicalMapper, validate_and_map};
use crate::platform::{AddressWindow, Bus, VariantProfile};
use crate::reconfiguration::ReconfigurationController;
use log::{info, trace};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointId {
    Data = 0,
    BusWindow0 = 1,
    BusWindow1 = 2,
    Bitstream = 3,
}

impl TryFrom<u32> for EndpointId {
    type Error = GatewayError;

    fn try_from(index: u32) -> Result<Self, Self::Error> {
        match index {
            0 => Ok(EndpointId::Data),
            1 => Ok(EndpointId::BusWindow0),
            2 => Ok(EndpointId::BusWindow1),
            3 => Ok(EndpointId::Bitstream),
            _ => Err(GatewayError::InvalidArgument(format!(
                "no endpoint with index {index}"
            ))),
        }
    }
}

impl EndpointId {
    pub const ALL: [EndpointId; 4] = [
        EndpointId::Data,
        EndpointId::BusWindow0,
        EndpointId::BusWindow1,
        EndpointId::Bitstream,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            EndpointId::Data => "data",
            EndpointId::BusWindow0 => "bus-window-0",
            EndpointId::BusWindow1 => "bus-window-1",
            EndpointId::Bitstream => "bitstream",
        }
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Identity and mapping capability of an endpoint. Fixed at attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub id: EndpointId,
    pub name: &'static str,
    /// The physical window a caller may map, or `None` if the endpoint cannot be mapped.
    pub window: Option<AddressWindow>,
}

impl EndpointDescriptor {
    pub fn for_variant(id: EndpointId, profile: &VariantProfile) -> EndpointDescriptor {
        let window = match id {
            EndpointId::BusWindow0 => Some(profile.window(Bus::Bus0)),
            EndpointId::BusWindow1 => Some(profile.window(Bus::Bus1)),
            EndpointId::Data | EndpointId::Bitstream => None,
        };
        EndpointDescriptor {
            id,
            name: id.name(),
            window,
        }
    }

    pub fn is_mappable(&self) -> bool {
        self.window.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlCommand {
    /// Declared for the data endpoint but never implemented; answers `0`.
    GetBufferAddress = 1,
    NewDataAvailable = 2,
    ProgramFpga = 3,
}

impl TryFrom<u32> for IoctlCommand {
    type Error = GatewayError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(IoctlCommand::GetBufferAddress),
            2 => Ok(IoctlCommand::NewDataAvailable),
            3 => Ok(IoctlCommand::ProgramFpga),
            _ => Err(GatewayError::InvalidArgument(format!(
                "unsupported ioctl code {code}"
            ))),
        }
    }
}

/// Readiness bits reported by `poll`, using the `poll(2)` encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollMask(u32);

impl PollMask {
    pub const EMPTY: PollMask = PollMask(0);
    pub const READABLE: PollMask = PollMask((libc::POLLIN | libc::POLLRDNORM) as u32);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Operations an endpoint answers. Defaults are the neutral results.
pub trait EndpointOps: Send + Sync {
    fn descriptor(&self) -> &EndpointDescriptor;

    fn read(&self, _out: &mut [u8]) -> Result<usize, GatewayError> {
        Ok(0)
    }

    /// Upper bound on what one `read` can deliver right now.
    fn max_read_len(&self) -> Result<usize, GatewayError> {
        Ok(0)
    }

    fn write(&self, _offset: u64, _data: &[u8]) -> Result<usize, GatewayError> {
        Ok(0)
    }

    fn ioctl(&self, _command: IoctlCommand) -> Result<u64, GatewayError> {
        Ok(0)
    }

    fn mmap(&self, _offset: u64, _length: u64) -> Result<MappedRegion, GatewayError> {
        Err(GatewayError::UnsupportedOperation(format!(
            "endpoint '{}' cannot be mapped",
            self.descriptor().name
        )))
    }

    fn poll(&self) -> Result<PollMask, GatewayError> {
        Ok(PollMask::EMPTY)
    }
}

/// Endpoint 0: acquisition snapshots.
pub struct DataEndpoint {
    descriptor: EndpointDescriptor,
    channel: Arc<AcquisitionChannel>,
}

impl DataEndpoint {
    pub fn new(descriptor: EndpointDescriptor, channel: Arc<AcquisitionChannel>) -> Self {
        DataEndpoint {
            descriptor,
            channel,
        }
    }
}

impl EndpointOps for DataEndpoint {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    fn read(&self, out: &mut [u8]) -> Result<usize, GatewayError> {
        Ok(self.channel.read(out)?.len)
    }

    fn max_read_len(&self) -> Result<usize, GatewayError> {
        self.channel.size_bytes()
    }

    fn ioctl(&self, command: IoctlCommand) -> Result<u64, GatewayError> {
        match command {
            IoctlCommand::NewDataAvailable => Ok(u64::from(self.channel.is_ready()?)),
            IoctlCommand::GetBufferAddress | IoctlCommand::ProgramFpga => Ok(0),
        }
    }

    // busy-poll: always readable, a read returns the latest snapshot whether or not it is fresh
    fn poll(&self) -> Result<PollMask, GatewayError> {
        Ok(PollMask::READABLE)
    }
}

/// Endpoints 1 and 2: raw physical bus windows.
pub struct BusWindowEndpoint {
    descriptor: EndpointDescriptor,
    mapper: Arc<dyn PhysicalMapper>,
}

impl BusWindowEndpoint {
    pub fn new(descriptor: EndpointDescriptor, mapper: Arc<dyn PhysicalMapper>) -> Self {
        BusWindowEndpoint { descriptor, mapper }
    }
}

impl EndpointOps for BusWindowEndpoint {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    fn mmap(&self, offset: u64, length: u64) -> Result<MappedRegion, GatewayError> {
        validate_and_map(&self.descriptor, offset, length, self.mapper.as_ref())
    }
}

/// Endpoint 3: bitstream upload.
pub struct BitstreamEndpoint {
    descriptor: EndpointDescriptor,
    controller: Arc<ReconfigurationController>,
}

impl BitstreamEndpoint {
    pub fn new(descriptor: EndpointDescriptor, controller: Arc<ReconfigurationController>) -> Self {
        BitstreamEndpoint {
            descriptor,
            controller,
        }
    }
}

impl EndpointOps for BitstreamEndpoint {
    fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    fn read(&self, out: &mut [u8]) -> Result<usize, GatewayError> {
        let Some(first) = out.first_mut() else {
            return Ok(0);
        };
        *first = if self.controller.status()? { b'1' } else { b'0' };
        Ok(1)
    }

    fn max_read_len(&self) -> Result<usize, GatewayError> {
        Ok(1)
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<usize, GatewayError> {
        self.controller.append(offset, data)
    }

    /// `PROGRAM_FPGA` answers the number of bytes programmed.
    fn ioctl(&self, command: IoctlCommand) -> Result<u64, GatewayError> {
        match command {
            IoctlCommand::ProgramFpga => Ok(self.controller.program()? as u64),
            IoctlCommand::GetBufferAddress | IoctlCommand::NewDataAvailable => Ok(0),
        }
    }
}

/// Routes calls to the endpoint with the given index.
pub struct SessionRegistry {
    endpoints: Vec<Box<dyn EndpointOps>>,
}

impl SessionRegistry {
    /// Build the registry from one object per endpoint, in index order.
    pub fn new(endpoints: [Box<dyn EndpointOps>; 4]) -> SessionRegistry {
        SessionRegistry {
            endpoints: endpoints.into(),
        }
    }

    fn endpoint(&self, index: u32) -> Result<&dyn EndpointOps, GatewayError> {
        let id = EndpointId::try_from(index)?;
        self.endpoints
            .get(id as usize)
            .map(|e| e.as_ref())
            .ok_or_else(|| GatewayError::InvalidArgument(format!("endpoint '{id}' is not attached")))
    }

    pub fn descriptor(&self, index: u32) -> Result<EndpointDescriptor, GatewayError> {
        Ok(*self.endpoint(index)?.descriptor())
    }

    pub fn read(&self, index: u32, out: &mut [u8]) -> Result<usize, GatewayError> {
        self.endpoint(index)?.read(out)
    }

    pub fn max_read_len(&self, index: u32) -> Result<usize, GatewayError> {
        self.endpoint(index)?.max_read_len()
    }

    pub fn write(&self, index: u32, offset: u64, data: &[u8]) -> Result<usize, GatewayError> {
        self.endpoint(index)?.write(offset, data)
    }

    /// Dispatch a raw ioctl code. Unknown codes are rejected before any endpoint sees them.
    pub fn ioctl(&self, index: u32, code: u32) -> Result<u64, GatewayError> {
        let endpoint = self.endpoint(index)?;
        let command = IoctlCommand::try_from(code)?;
        trace!("ioctl {command:?} on '{}'", endpoint.descriptor().name);
        endpoint.ioctl(command)
    }

    pub fn mmap(&self, index: u32, offset: u64, length: u64) -> Result<MappedRegion, GatewayError> {
        let endpoint = self.endpoint(index)?;
        let region = endpoint.mmap(offset, length)?;
        info!(
            "Mapped {length:#x} bytes at {offset:#x} through '{}'",
            endpoint.descriptor().name
        );
        Ok(region)
    }

    pub fn poll(&self, index: u32) -> Result<PollMask, GatewayError> {
        self.endpoint(index)?.poll()
    }
}
