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

use googletest::prelude::*;
use rstest::*;
use std::sync::{Arc, Mutex};
use ucubed::acquisition::buffer::HeapDmaAllocator;
use ucubed::acquisition::interrupt::SoftwareInterruptLine;
use ucubed::config;
use ucubed::configuration::{ClockService, ExternalClocks};
use ucubed::endpoints::EndpointId;
use ucubed::error::GatewayError;
use ucubed::gateway::{Collaborators, Gateway};
use ucubed::mapping::GrantMapper;
use ucubed::reconfiguration::{BitstreamState, ReconfigurationService};

const DATA: u32 = EndpointId::Data as u32;
const BITSTREAM: u32 = EndpointId::Bitstream as u32;
const NEW_DATA_AVAILABLE: u32 = 2;
const PROGRAM_FPGA: u32 = 3;

/// Records every bitstream it is asked to program.
#[derive(Default)]
struct RecordingFabric {
    programmed: Mutex<Vec<Vec<u8>>>,
}

struct SharedFabric(Arc<RecordingFabric>);

impl ReconfigurationService for SharedFabric {
    fn program(&self, bitstream: &[u8]) -> std::result::Result<(), GatewayError> {
        self.0.programmed.lock().expect("lock").push(bitstream.to_vec());
        Ok(())
    }

    fn is_operating(&self) -> std::result::Result<bool, GatewayError> {
        Ok(!self.0.programmed.lock().expect("lock").is_empty())
    }
}

struct Attached {
    gateway: Gateway,
    fabric: Arc<RecordingFabric>,
}

fn attach(compatible: &str, clocks: Box<dyn ClockService>) -> Attached {
    let fabric = Arc::new(RecordingFabric::default());
    let gateway = Gateway::attach(
        compatible,
        Collaborators {
            allocator: Box::new(HeapDmaAllocator::new(
                config::DMA_POOL_BASE,
                config::DMA_POOL_SIZE,
                config::PAGE_SIZE,
            )),
            interrupt_line: Box::new(SoftwareInterruptLine::new()),
            clocks,
            reconfiguration: Box::new(SharedFabric(Arc::clone(&fabric))),
            mapper: Arc::new(GrantMapper),
            buffer_size: config::DEFAULT_BUFFER_SIZE,
            bitstream_capacity: 64 * 1024,
        },
    )
    .expect("attach");
    Attached { gateway, fabric }
}

#[gtest]
#[rstest]
#[case::narrow("xlnx,zynq-7000")]
#[case::wide("xlnx,zynqmp")]
fn test_resized_buffer_bounds_an_oversized_read(#[case] compatible: &str) {
    let Attached { gateway, .. } = attach(compatible, Box::new(ExternalClocks));
    gateway
        .configuration()
        .set("dma_buffer_size", "8192")
        .expect("resize");

    let pattern: Vec<u8> = (0..8192u32).map(|i| (i * 7 % 256) as u8).collect();
    gateway.channel().fill_source(&pattern).expect("fill");
    expect_that!(gateway.interrupt(), ok(eq(&8192)));

    let mut out = vec![0u8; 16384];
    let len = gateway.sessions().read(DATA, &mut out).expect("read");
    assert_that!(len, eq(8192));
    expect_that!(out[..len].to_vec(), eq(&pattern));
    expect_that!(gateway.sessions().ioctl(DATA, NEW_DATA_AVAILABLE), ok(eq(&0)));
}

#[gtest]
fn test_chunked_bitstream_reaches_service_whole() {
    let Attached { gateway, fabric } = attach("xlnx,zynq-7000", Box::new(ExternalClocks));
    let sessions = gateway.sessions();
    expect_that!(sessions.write(BITSTREAM, 0, &[0xAA; 100]), ok(eq(&100)));
    expect_that!(sessions.write(BITSTREAM, 100, &[0xBB; 200]), ok(eq(&200)));
    expect_that!(sessions.write(BITSTREAM, 300, &[0xCC; 50]), ok(eq(&50)));
    expect_that!(gateway.reconfiguration().cursor(), ok(eq(&350)));

    let mut status = [0u8; 1];
    sessions.read(BITSTREAM, &mut status).expect("status");
    expect_that!(status[0], eq(b'0'));

    expect_that!(sessions.ioctl(BITSTREAM, PROGRAM_FPGA), ok(eq(&350)));
    {
        let programmed = fabric.programmed.lock().expect("lock");
        assert_that!(programmed.len(), eq(1));
        expect_that!(programmed[0].len(), eq(350));
        expect_that!(programmed[0][0], eq(0xAA));
        expect_that!(programmed[0][150], eq(0xBB));
        expect_that!(programmed[0][349], eq(0xCC));
    }
    expect_that!(gateway.bitstream_state(), ok(eq(&BitstreamState::Ready)));

    sessions.read(BITSTREAM, &mut status).expect("status");
    expect_that!(status[0], eq(b'1'));
}

#[gtest]
fn test_bitstream_overflow_leaves_upload_intact() {
    let Attached { gateway, fabric } = attach("xlnx,zynqmp", Box::new(ExternalClocks));
    let sessions = gateway.sessions();
    sessions.write(BITSTREAM, 0, &[1; 1024]).expect("write");
    let capacity = gateway.reconfiguration().capacity() as u64;
    expect_that!(
        sessions.write(BITSTREAM, capacity - 10, &[2; 11]),
        err(displays_as(contains_substring("GatewayError::CapacityExceeded")))
    );
    expect_that!(gateway.reconfiguration().cursor(), ok(eq(&1024)));
    sessions.ioctl(BITSTREAM, PROGRAM_FPGA).expect("program");
    let programmed = fabric.programmed.lock().expect("lock");
    expect_that!(programmed[0].len(), eq(1024));
}

#[gtest]
#[rstest]
#[case::narrow_bus0("xlnx,zynq-7000", 1, 0x4000_0000, true)]
#[case::narrow_bus1_low("xlnx,zynq-7000", 2, 0x4000_0000, false)]
#[case::wide_bus0("xlnx,zynqmp", 1, 0x4_0000_0000, true)]
#[case::wide_rejects_narrow_address("xlnx,zynqmp", 1, 0x4000_0000, false)]
#[case::wide_bus1("xlnx,zynqmp", 2, 0x10_0000_0000, true)]
fn test_window_mapping_depends_on_variant(
    #[case] compatible: &str,
    #[case] endpoint: u32,
    #[case] address: u64,
    #[case] accepted: bool,
) {
    let Attached { gateway, .. } = attach(compatible, Box::new(ExternalClocks));
    let result = gateway.sessions().mmap(endpoint, address, 0x1000);
    expect_that!(result.is_ok(), eq(accepted));
}

#[gtest]
fn test_resize_under_concurrent_interrupts_and_reads() {
    let Attached { gateway, .. } = attach("xlnx,zynqmp", Box::new(ExternalClocks));
    let gateway = Arc::new(gateway);

    let interrupts = {
        let gateway = Arc::clone(&gateway);
        std::thread::spawn(move || {
            for round in 0u8..32 {
                gateway.channel().fill_source(&[round; 65536]).expect("fill");
                gateway.interrupt().expect("interrupt");
            }
        })
    };
    let resizer = {
        let gateway = Arc::clone(&gateway);
        std::thread::spawn(move || {
            for size in [8192, 16384, 4096, 32768, 8192] {
                gateway
                    .configuration()
                    .set("dma_buffer_size", &size.to_string())
                    .expect("resize");
            }
        })
    };
    let mut out = vec![0u8; 65536];
    for _ in 0..64 {
        let len = gateway.sessions().read(DATA, &mut out).expect("read");
        assert!(len <= 32768, "read {len} bytes past every buffer size");
        assert!(out[..len].iter().all(|b| *b == out[0]), "torn snapshot");
    }
    interrupts.join().expect("interrupt thread panicked");
    resizer.join().expect("resize thread panicked");
    expect_that!(gateway.channel().size_bytes(), ok(eq(&8192)));
}
