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

//! One attached device.
//!
//! [`Gateway::attach`] resolves the platform variant, allocates the acquisition buffer, reserves
//! the bitstream buffer and builds the endpoint table. Everything the service surface needs
//! hangs off the returned [`Gateway`]; there is no process-wide state.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use ucubed::gateway::{Collaborators, Gateway};
//! # fn example(collaborators: Collaborators) -> Result<(), ucubed::error::GatewayError> {
//! let gateway = Gateway::attach("xlnx,zynqmp-zcu104\0xlnx,zynqmp\0", collaborators)?;
//! gateway.interrupt()?;
//! let mut snapshot = vec![0u8; 4096];
//! let len = gateway.sessions().read(0, &mut snapshot)?;
//! # Ok(())
//! # }
//! ```

use crate::acquisition::AcquisitionChannel;
use crate::acquisition::buffer::DmaAllocator;
use crate::acquisition::interrupt::InterruptLine;
use crate::configuration::{ClockService, ConfigurationRegistry, ExternalClocks};
use crate::endpoints::{
    BitstreamEndpoint, BusWindowEndpoint, DataEndpoint, EndpointDescriptor, EndpointId,
    SessionRegistry,
};
use crate::error::GatewayError;
use crate::mapping::PhysicalMapper;
use crate::platform::{ClockControl, PlatformVariant, select_variant};
use crate::reconfiguration::{BitstreamState, ReconfigurationController, ReconfigurationService};
use log::info;
use std::sync::Arc;

/// The external services a gateway is attached with.
pub struct Collaborators {
    pub allocator: Box<dyn DmaAllocator>,
    pub interrupt_line: Box<dyn InterruptLine>,
    /// Used only when the variant manages its clocks locally.
    pub clocks: Box<dyn ClockService>,
    pub reconfiguration: Box<dyn ReconfigurationService>,
    pub mapper: Arc<dyn PhysicalMapper>,
    pub buffer_size: usize,
    pub bitstream_capacity: usize,
}

pub struct Gateway {
    variant: PlatformVariant,
    channel: Arc<AcquisitionChannel>,
    reconfiguration: Arc<ReconfigurationController>,
    configuration: ConfigurationRegistry,
    sessions: SessionRegistry,
}

impl Gateway {
    /// Attach to the device described by a device-tree `compatible` property.
    ///
    /// # Returns: `Result<Gateway, GatewayError>`
    /// * `Ok(Gateway)` - Variant resolved and all buffers allocated
    /// * `Err(GatewayError::Discovery)` - The property names no supported variant
    /// * `Err(GatewayError::ResourceUnavailable)` - A buffer could not be allocated
    /// * `Err(GatewayError::InvalidArgument)` - `buffer_size` is not a whole number of DMA words
    pub fn attach(compatible: &str, collaborators: Collaborators) -> Result<Gateway, GatewayError> {
        let variant = select_variant(compatible)?;
        Gateway::attach_variant(variant, collaborators)
    }

    /// Attach with an already resolved variant.
    pub fn attach_variant(
        variant: PlatformVariant,
        collaborators: Collaborators,
    ) -> Result<Gateway, GatewayError> {
        let Collaborators {
            allocator,
            interrupt_line,
            clocks,
            reconfiguration,
            mapper,
            buffer_size,
            bitstream_capacity,
        } = collaborators;
        let profile = variant.profile();

        let channel = Arc::new(AcquisitionChannel::new(
            allocator,
            interrupt_line,
            buffer_size,
            profile.word_width,
        )?);
        let reconfiguration = Arc::new(ReconfigurationController::new(
            reconfiguration,
            bitstream_capacity,
        )?);
        let clocks: Box<dyn ClockService> = match profile.clock_control {
            ClockControl::Local => clocks,
            ClockControl::External => Box::new(ExternalClocks),
        };
        let configuration = ConfigurationRegistry::new(clocks, Arc::clone(&channel));

        let descriptor = |id| EndpointDescriptor::for_variant(id, profile);
        let sessions = SessionRegistry::new([
            Box::new(DataEndpoint::new(
                descriptor(EndpointId::Data),
                Arc::clone(&channel),
            )),
            Box::new(BusWindowEndpoint::new(
                descriptor(EndpointId::BusWindow0),
                Arc::clone(&mapper),
            )),
            Box::new(BusWindowEndpoint::new(
                descriptor(EndpointId::BusWindow1),
                mapper,
            )),
            Box::new(BitstreamEndpoint::new(
                descriptor(EndpointId::Bitstream),
                Arc::clone(&reconfiguration),
            )),
        ]);

        info!("Attached {variant} gateway with a {buffer_size} byte acquisition buffer");
        Ok(Gateway {
            variant,
            channel,
            reconfiguration,
            configuration,
            sessions,
        })
    }

    pub fn variant(&self) -> PlatformVariant {
        self.variant
    }

    /// Feed one acquisition-complete interrupt to the channel.
    pub fn interrupt(&self) -> Result<usize, GatewayError> {
        self.channel.on_interrupt()
    }

    pub fn channel(&self) -> &AcquisitionChannel {
        &self.channel
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn configuration(&self) -> &ConfigurationRegistry {
        &self.configuration
    }

    pub fn reconfiguration(&self) -> &ReconfigurationController {
        &self.reconfiguration
    }

    pub fn bitstream_state(&self) -> Result<BitstreamState, GatewayError> {
        self.reconfiguration.state()
    }

    /// Discard any partially uploaded bitstream.
    pub fn reset_bitstream(&self) -> Result<(), GatewayError> {
        self.reconfiguration.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::buffer::HeapDmaAllocator;
    use crate::acquisition::interrupt::SoftwareInterruptLine;
    use crate::mapping::GrantMapper;
    use googletest::prelude::*;
    use rstest::*;

    struct PanickingClocks;

    impl ClockService for PanickingClocks {
        fn rate(&self, _index: usize) -> std::result::Result<u64, GatewayError> {
            panic!("clocks are external on this variant")
        }

        fn set_rate(&self, _index: usize, _hz: u64) -> std::result::Result<(), GatewayError> {
            panic!("clocks are external on this variant")
        }
    }

    struct NoFabric;

    impl ReconfigurationService for NoFabric {
        fn program(&self, _bitstream: &[u8]) -> std::result::Result<(), GatewayError> {
            Err(GatewayError::DeviceState("no fabric".into()))
        }

        fn is_operating(&self) -> std::result::Result<bool, GatewayError> {
            Ok(false)
        }
    }

    fn collaborators(clocks: Box<dyn ClockService>, buffer_size: usize) -> Collaborators {
        Collaborators {
            allocator: Box::new(HeapDmaAllocator::new(0x1000_0000, 0x10_0000, 4096)),
            interrupt_line: Box::new(SoftwareInterruptLine::new()),
            clocks,
            reconfiguration: Box::new(NoFabric),
            mapper: Arc::new(GrantMapper),
            buffer_size,
            bitstream_capacity: 4096,
        }
    }

    #[gtest]
    #[rstest]
    #[case::narrow("xlnx,zynq-7000\0", PlatformVariant::Narrow)]
    #[case::wide("xlnx,zynqmp\0", PlatformVariant::Wide)]
    fn test_attach_resolves_variant(#[case] compatible: &str, #[case] expected: PlatformVariant) {
        let gateway = Gateway::attach(compatible, collaborators(Box::new(ExternalClocks), 4096))
            .expect("attach");
        expect_that!(gateway.variant(), eq(expected));
        expect_that!(gateway.channel().width(), eq(expected.profile().word_width));
    }

    #[gtest]
    fn test_attach_refuses_unknown_platform() {
        expect_that!(
            Gateway::attach("brcm,bcm2711\0", collaborators(Box::new(ExternalClocks), 4096)).err(),
            some(displays_as(contains_substring("GatewayError::Discovery")))
        );
    }

    #[gtest]
    fn test_wide_variant_never_touches_clock_service() {
        let gateway = Gateway::attach("xlnx,zynqmp", collaborators(Box::new(PanickingClocks), 4096))
            .expect("attach");
        gateway.configuration().set("clock_0", "100").expect("set");
        expect_that!(gateway.configuration().get("clock_0"), ok(eq("0\n")));
    }

    #[gtest]
    fn test_wide_variant_rejects_narrow_only_buffer_size() {
        expect_that!(
            Gateway::attach("xlnx,zynqmp", collaborators(Box::new(ExternalClocks), 4100)).err(),
            some(displays_as(contains_substring("GatewayError::InvalidArgument")))
        );
    }

    #[gtest]
    fn test_reset_bitstream_returns_to_idle() {
        let gateway = Gateway::attach("xlnx,zynq-7000", collaborators(Box::new(ExternalClocks), 4096))
            .expect("attach");
        gateway.sessions().write(3, 0, &[1; 16]).expect("write");
        expect_that!(gateway.bitstream_state(), ok(eq(&BitstreamState::Accumulating)));
        gateway.reset_bitstream().expect("reset");
        expect_that!(gateway.bitstream_state(), ok(eq(&BitstreamState::Idle)));
    }
}
