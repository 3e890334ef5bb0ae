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

//! ucube gateway daemon (ucubed).
//!
//! Attaches to the acquisition device and exposes its endpoints over DBus:
//! - **Service Name**: `io.ucube.gateway`
//! - **Status Interface**: `/io/ucube/gateway/status` - reads, polls and queries
//! - **Control Interface**: `/io/ucube/gateway/control` - writes, ioctls, mappings and configuration
//!
//! # Startup
//!
//! 1. Resolve the platform variant from the device-tree `compatible` property
//! 2. Open the UIO interrupt line and attach the gateway
//! 3. Start the interrupt loop on a blocking task
//! 4. Connect to the system bus and serve requests until terminated
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`, `error`
//!   or `off`). Defaults to `info`

use log::{error, info};
use std::error::Error;
use std::future::pending;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ucubed::acquisition::buffer::DevMemDmaAllocator;
use ucubed::acquisition::interrupt::UioInterruptLine;
use ucubed::config;
use ucubed::configuration::FclkClockService;
use ucubed::error::GatewayError;
use ucubed::gateway::{Collaborators, Gateway};
use ucubed::mapping::DevMemMapper;
use ucubed::platform::discover_variant;
use ucubed::reconfiguration::FpgaManagerService;
use zbus::connection;

mod comm;

use crate::comm::dbus::{control_interface::ControlInterface, status_interface::StatusInterface};

/// Wait for interrupts forever, refreshing the shadow buffer after each one.
///
/// Returns only when the UIO device fails.
fn interrupt_loop(line: Arc<UioInterruptLine>, gateway: Arc<Gateway>) -> GatewayError {
    if let Err(e) = line.rearm() {
        return e;
    }
    loop {
        let result = line
            .wait()
            .and_then(|_| gateway.interrupt())
            .and_then(|_| line.rearm());
        if let Err(e) = result {
            return e;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let variant = discover_variant()?;
    let line = Arc::new(UioInterruptLine::open(Path::new(config::UIO_DEVICE))?);
    let collaborators = Collaborators {
        allocator: Box::new(DevMemDmaAllocator::new(
            PathBuf::from(config::DEV_MEM),
            config::DMA_POOL_BASE,
            config::DMA_POOL_SIZE,
            config::PAGE_SIZE,
        )),
        interrupt_line: Box::new(Arc::clone(&line)),
        clocks: Box::new(FclkClockService::default()),
        reconfiguration: Box::new(FpgaManagerService::default()),
        mapper: Arc::new(DevMemMapper::new(PathBuf::from(config::DEV_MEM))),
        buffer_size: config::DEFAULT_BUFFER_SIZE,
        bitstream_capacity: config::BITSTREAM_CAPACITY,
    };
    let gateway = Arc::new(Gateway::attach_variant(variant, collaborators)?);

    let irq_gateway = Arc::clone(&gateway);
    tokio::task::spawn_blocking(move || {
        let e = interrupt_loop(line, irq_gateway);
        error!("Interrupt loop stopped: {e}");
    });

    let status_interface = StatusInterface {
        gateway: Arc::clone(&gateway),
    };
    let control_interface = ControlInterface { gateway };

    let _conn = connection::Builder::system()?
        .name(config::DBUS_SERVICE_NAME)?
        .serve_at(config::DBUS_STATUS_PATH, status_interface)?
        .serve_at(config::DBUS_CONTROL_PATH, control_interface)?
        .build()
        .await?;

    info!("Started {} dbus service", config::DBUS_SERVICE_NAME);
    pending::<()>().await;

    Ok(())
}
