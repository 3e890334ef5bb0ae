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

use log::error;
use std::fmt;
use std::path::PathBuf;
use zbus::fdo;

/// Which edge of an address window a rejected mapping request crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowBound {
    Below,
    Above,
}

impl fmt::Display for WindowBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowBound::Below => write!(f, "below"),
            WindowBound::Above => write!(f, "above"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("GatewayError::InvalidArgument: {0}")]
    InvalidArgument(String),
    #[error(
        "GatewayError::OutOfRange: requested address {requested:#x} lies {bound} the window limit {limit:#x}"
    )]
    OutOfRange {
        bound: WindowBound,
        requested: u64,
        limit: u64,
    },
    #[error("GatewayError::UnsupportedOperation: {0}")]
    UnsupportedOperation(String),
    #[error(
        "GatewayError::CapacityExceeded: writing {len} bytes at offset {offset} overflows the {capacity} byte buffer"
    )]
    CapacityExceeded {
        offset: u64,
        len: usize,
        capacity: usize,
    },
    #[error("GatewayError::TransferFault: {0}")]
    TransferFault(String),
    #[error("GatewayError::ResourceUnavailable: {0}")]
    ResourceUnavailable(String),
    #[error("GatewayError::Discovery: Could not resolve the platform variant: {0}")]
    Discovery(String),
    #[error("GatewayError::DeviceState: Device state is not as expected: {0}")]
    DeviceState(String),
    #[error("GatewayError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("GatewayError::IOWrite: An IO error occurred when writing to {file:?}: {e}")]
    IOWrite { file: PathBuf, e: std::io::Error },
    #[error("GatewayError::Internal: An Internal error occurred: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The errno-style status code reported to callers for this error. Distinct per class of
    /// failure; both IO variants share `EIO`.
    pub fn errno(&self) -> i32 {
        match self {
            GatewayError::InvalidArgument(..) => libc::EINVAL,
            GatewayError::OutOfRange { .. } => libc::ERANGE,
            GatewayError::UnsupportedOperation(..) => libc::EOPNOTSUPP,
            GatewayError::CapacityExceeded { .. } => libc::ENOSPC,
            GatewayError::TransferFault(..) => libc::EFAULT,
            GatewayError::ResourceUnavailable(..) => libc::ENOMEM,
            GatewayError::Discovery(..) => libc::ENODEV,
            GatewayError::DeviceState(..) => libc::EBUSY,
            GatewayError::IORead { .. } | GatewayError::IOWrite { .. } => libc::EIO,
            GatewayError::Internal(..) => libc::ENOTRECOVERABLE,
        }
    }
}

impl From<GatewayError> for fdo::Error {
    fn from(err: GatewayError) -> Self {
        error!("{err}");
        match err {
            GatewayError::InvalidArgument(..) => fdo::Error::InvalidArgs(err.to_string()),
            GatewayError::OutOfRange { .. } => fdo::Error::InvalidArgs(err.to_string()),
            GatewayError::UnsupportedOperation(..) => fdo::Error::NotSupported(err.to_string()),
            GatewayError::CapacityExceeded { .. } => fdo::Error::LimitsExceeded(err.to_string()),
            GatewayError::ResourceUnavailable(..) => fdo::Error::NoMemory(err.to_string()),
            GatewayError::TransferFault(..) => fdo::Error::IOError(err.to_string()),
            GatewayError::IORead { .. } => fdo::Error::IOError(err.to_string()),
            GatewayError::IOWrite { .. } => fdo::Error::IOError(err.to_string()),
            _ => fdo::Error::Failed(err.to_string()),
        }
    }
}
