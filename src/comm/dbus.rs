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

pub mod control_interface;
pub mod status_interface;

use ucubed::error::GatewayError;
use ucubed::gateway::Gateway;
use ucubed::mapping::MappedRegion;

/// Map the single 32-bit word at `address` through a bus-window endpoint.
pub fn map_window_word(
    gateway: &Gateway,
    endpoint: u32,
    address: u64,
) -> Result<MappedRegion, GatewayError> {
    if address % 4 != 0 {
        return Err(GatewayError::InvalidArgument(format!(
            "address {address:#x} is not 32-bit aligned"
        )));
    }
    gateway.sessions().mmap(endpoint, address, 4)
}

/// Allocate a zeroed transfer buffer for a caller's read of up to `count` bytes.
///
/// The buffer never exceeds what the endpoint can deliver in one read.
pub fn transfer_buffer(
    gateway: &Gateway,
    endpoint: u32,
    count: u32,
) -> Result<Vec<u8>, GatewayError> {
    let limit = gateway.sessions().max_read_len(endpoint)?;
    let count = usize::try_from(count).map_or(limit, |count| count.min(limit));
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(count).map_err(|e| {
        GatewayError::ResourceUnavailable(format!("cannot allocate a {count} byte read: {e}"))
    })?;
    buffer.resize(count, 0);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::dbus::test_support::simulated_gateway;
    use googletest::prelude::*;
    use rstest::*;

    #[gtest]
    #[rstest]
    #[case::data_small(0, 16, 16)]
    #[case::data_oversized(0, u32::MAX, 4096)]
    #[case::bitstream_oversized(3, 256 * 1024 * 1024, 1)]
    #[case::bus_window(1, 4096, 0)]
    fn test_transfer_buffer_is_capped_by_endpoint(
        #[case] endpoint: u32,
        #[case] count: u32,
        #[case] expected: usize,
    ) {
        let gateway = simulated_gateway("xlnx,zynq-7000");
        let buffer = transfer_buffer(&gateway, endpoint, count).expect("transfer buffer");
        expect_that!(buffer.len(), eq(expected));
        expect_that!(buffer.capacity(), lt(8192));
    }

    #[gtest]
    fn test_transfer_buffer_rejects_unknown_endpoint() {
        let gateway = simulated_gateway("xlnx,zynq-7000");
        expect_that!(
            transfer_buffer(&gateway, 7, 16),
            err(displays_as(contains_substring("GatewayError::InvalidArgument")))
        );
    }
}

#[cfg(test)]
pub mod test_support {
    use std::sync::Arc;
    use ucubed::acquisition::buffer::HeapDmaAllocator;
    use ucubed::acquisition::interrupt::SoftwareInterruptLine;
    use ucubed::configuration::ExternalClocks;
    use ucubed::error::GatewayError;
    use ucubed::gateway::{Collaborators, Gateway};
    use ucubed::mapping::GrantMapper;
    use ucubed::reconfiguration::ReconfigurationService;

    struct AcceptingFabric;

    impl ReconfigurationService for AcceptingFabric {
        fn program(&self, _bitstream: &[u8]) -> Result<(), GatewayError> {
            Ok(())
        }

        fn is_operating(&self) -> Result<bool, GatewayError> {
            Ok(true)
        }
    }

    /// A 4 KiB gateway backed by host memory, with no real device behind it.
    pub fn simulated_gateway(compatible: &str) -> Arc<Gateway> {
        let collaborators = Collaborators {
            allocator: Box::new(HeapDmaAllocator::new(0x1000_0000, 0x10_0000, 4096)),
            interrupt_line: Box::new(SoftwareInterruptLine::new()),
            clocks: Box::new(ExternalClocks),
            reconfiguration: Box::new(AcceptingFabric),
            mapper: Arc::new(GrantMapper),
            buffer_size: 4096,
            bitstream_capacity: 4096,
        };
        Arc::new(Gateway::attach(compatible, collaborators).expect("simulated attach"))
    }
}
