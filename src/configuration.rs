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

//! Key/value configuration surface: fabric clock rates and the acquisition buffer size.
//!
//! | key               | get                          | set                              |
//! |-------------------|------------------------------|----------------------------------|
//! | `clock_0..clock_3`| rate in Hz from the clocks   | rate in Hz handed to the clocks  |
//! | `dma_buffer_size` | current buffer size in bytes | resizes the acquisition buffer   |
//!
//! Values are ASCII decimal. Reads end in a newline; writes may carry surrounding whitespace.

use crate::acquisition::AcquisitionChannel;
use crate::config;
use crate::error::GatewayError;
use crate::system_io::{fs_read_u64, fs_write};
use log::{info, trace};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// A configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Clock(usize),
    DmaBufferSize,
}

impl FromStr for ConfigKey {
    type Err = GatewayError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        if key == "dma_buffer_size" {
            return Ok(ConfigKey::DmaBufferSize);
        }
        key.strip_prefix("clock_")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n < config::CLOCK_COUNT && key.len() == "clock_".len() + 1)
            .map(ConfigKey::Clock)
            .ok_or_else(|| GatewayError::InvalidArgument(format!("unknown configuration key '{key}'")))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigKey::Clock(n) => write!(f, "clock_{n}"),
            ConfigKey::DmaBufferSize => write!(f, "dma_buffer_size"),
        }
    }
}

/// Parse an ASCII decimal value, tolerating surrounding whitespace.
pub fn parse_decimal(value: &str) -> Result<u64, GatewayError> {
    let trimmed = value.trim();
    trimmed.parse::<u64>().map_err(|_| {
        GatewayError::InvalidArgument(format!("'{trimmed}' is not an unsigned decimal number"))
    })
}

/// Fabric clock rates.
pub trait ClockService: Send + Sync {
    fn rate(&self, index: usize) -> Result<u64, GatewayError>;
    fn set_rate(&self, index: usize, hz: u64) -> Result<(), GatewayError>;
}

/// The Zynq-7000 `fclk` sysfs class: `<dir>/fclk<N>/set_rate` holds the rate in Hz.
#[derive(Debug, Clone)]
pub struct FclkClockService {
    class_dir: PathBuf,
}

impl Default for FclkClockService {
    fn default() -> Self {
        FclkClockService::new(PathBuf::from(config::FCLK_CLASS_DIR))
    }
}

impl FclkClockService {
    pub fn new(class_dir: PathBuf) -> FclkClockService {
        FclkClockService { class_dir }
    }

    fn rate_path(&self, index: usize) -> PathBuf {
        self.class_dir.join(format!("fclk{index}")).join("set_rate")
    }
}

impl ClockService for FclkClockService {
    fn rate(&self, index: usize) -> Result<u64, GatewayError> {
        fs_read_u64(&self.rate_path(index))
    }

    fn set_rate(&self, index: usize, hz: u64) -> Result<(), GatewayError> {
        fs_write(&self.rate_path(index), false, hz.to_string())?;
        info!("fclk{index} set to {hz} Hz");
        Ok(())
    }
}

/// Clocks owned by platform firmware: reads report `0`, writes are accepted and ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExternalClocks;

impl ClockService for ExternalClocks {
    fn rate(&self, _index: usize) -> Result<u64, GatewayError> {
        Ok(0)
    }

    fn set_rate(&self, index: usize, hz: u64) -> Result<(), GatewayError> {
        trace!("Ignoring clock_{index} = {hz}: clocks are managed externally");
        Ok(())
    }
}

pub struct ConfigurationRegistry {
    clocks: Box<dyn ClockService>,
    channel: Arc<AcquisitionChannel>,
    write_lock: Mutex<()>,
}

impl ConfigurationRegistry {
    pub fn new(clocks: Box<dyn ClockService>, channel: Arc<AcquisitionChannel>) -> Self {
        ConfigurationRegistry {
            clocks,
            channel,
            write_lock: Mutex::new(()),
        }
    }

    /// Current value of `key` as `"<n>\n"`.
    pub fn get(&self, key: &str) -> Result<String, GatewayError> {
        let value = match key.parse::<ConfigKey>()? {
            ConfigKey::Clock(n) => self.clocks.rate(n)?,
            ConfigKey::DmaBufferSize => self.channel.size_bytes()? as u64,
        };
        Ok(format!("{value}\n"))
    }

    /// Apply `value` to `key`.
    ///
    /// # Returns: `Result<(), GatewayError>`
    /// * `Ok(())` - Value applied
    /// * `Err(GatewayError::InvalidArgument)` - Unknown key, or a value that is not a decimal
    ///   number or not a valid buffer size
    /// * `Err(GatewayError::ResourceUnavailable)` - The resize could not allocate; nothing changed
    pub fn set(&self, key: &str, value: &str) -> Result<(), GatewayError> {
        let key = key.parse::<ConfigKey>()?;
        let value = parse_decimal(value)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| GatewayError::Internal("configuration lock poisoned".into()))?;
        match key {
            ConfigKey::Clock(n) => self.clocks.set_rate(n, value),
            ConfigKey::DmaBufferSize => {
                let size = usize::try_from(value).map_err(|_| {
                    GatewayError::InvalidArgument(format!("buffer size {value} is too large"))
                })?;
                self.channel.resize(size)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::buffer::HeapDmaAllocator;
    use crate::acquisition::interrupt::SoftwareInterruptLine;
    use crate::platform::WordWidth;
    use googletest::prelude::*;
    use rstest::*;

    #[derive(Default)]
    struct RecordingClocks {
        rates: Mutex<[u64; config::CLOCK_COUNT]>,
    }

    impl ClockService for Arc<RecordingClocks> {
        fn rate(&self, index: usize) -> std::result::Result<u64, GatewayError> {
            Ok(self.rates.lock().expect("lock")[index])
        }

        fn set_rate(&self, index: usize, hz: u64) -> std::result::Result<(), GatewayError> {
            self.rates.lock().expect("lock")[index] = hz;
            Ok(())
        }
    }

    fn channel() -> Arc<AcquisitionChannel> {
        Arc::new(
            AcquisitionChannel::new(
                Box::new(HeapDmaAllocator::new(0x1000_0000, 0x10_0000, 4096)),
                Box::new(SoftwareInterruptLine::new()),
                4096,
                WordWidth::Bits32,
            )
            .expect("channel"),
        )
    }

    #[fixture]
    fn clocks() -> Arc<RecordingClocks> {
        Arc::new(RecordingClocks::default())
    }

    #[gtest]
    #[rstest]
    #[case::clock_0("clock_0", ConfigKey::Clock(0))]
    #[case::clock_3("clock_3", ConfigKey::Clock(3))]
    #[case::buffer("dma_buffer_size", ConfigKey::DmaBufferSize)]
    fn test_parse_known_keys(#[case] key: &str, #[case] expected: ConfigKey) {
        expect_that!(key.parse::<ConfigKey>(), ok(eq(&expected)));
        expect_that!(expected.to_string(), eq(key));
    }

    #[gtest]
    #[rstest]
    #[case::out_of_range("clock_4")]
    #[case::leading_zero("clock_01")]
    #[case::no_index("clock_")]
    #[case::unknown("fclk0")]
    #[case::empty("")]
    fn test_parse_unknown_keys(#[case] key: &str) {
        expect_that!(
            key.parse::<ConfigKey>(),
            err(displays_as(contains_substring("GatewayError::InvalidArgument")))
        );
    }

    #[gtest]
    #[rstest]
    #[case::plain("100", 100)]
    #[case::newline("100000000\n", 100_000_000)]
    #[case::padded("  42 \t", 42)]
    fn test_parse_decimal(#[case] value: &str, #[case] expected: u64) {
        expect_that!(parse_decimal(value), ok(eq(&expected)));
    }

    #[gtest]
    #[rstest]
    #[case::negative("-1")]
    #[case::hex("0x10")]
    #[case::word("fast")]
    #[case::empty("")]
    fn test_parse_decimal_rejects(#[case] value: &str) {
        expect_that!(
            parse_decimal(value),
            err(displays_as(contains_substring("GatewayError::InvalidArgument")))
        );
    }

    #[gtest]
    #[rstest]
    fn test_clock_set_then_get(clocks: Arc<RecordingClocks>) {
        let registry = ConfigurationRegistry::new(Box::new(Arc::clone(&clocks)), channel());
        registry.set("clock_2", "50000000\n").expect("set");
        expect_that!(registry.get("clock_2"), ok(eq("50000000\n")));
        expect_that!(clocks.rates.lock().expect("lock")[2], eq(50_000_000));
    }

    #[gtest]
    #[rstest]
    fn test_malformed_value_leaves_clock_untouched(clocks: Arc<RecordingClocks>) {
        let registry = ConfigurationRegistry::new(Box::new(Arc::clone(&clocks)), channel());
        expect_that!(
            registry.set("clock_0", "12abc"),
            err(displays_as(contains_substring("GatewayError::InvalidArgument")))
        );
        expect_that!(registry.get("clock_0"), ok(eq("0\n")));
    }

    #[gtest]
    fn test_external_clocks_are_neutral() {
        let registry = ConfigurationRegistry::new(Box::new(ExternalClocks), channel());
        registry.set("clock_1", "200000000").expect("set");
        expect_that!(registry.get("clock_1"), ok(eq("0\n")));
    }

    #[gtest]
    fn test_buffer_size_set_resizes_channel() {
        let channel = channel();
        let registry = ConfigurationRegistry::new(Box::new(ExternalClocks), Arc::clone(&channel));
        expect_that!(registry.get("dma_buffer_size"), ok(eq("4096\n")));
        registry.set("dma_buffer_size", " 16384\n").expect("set");
        expect_that!(channel.size_bytes(), ok(eq(&16384)));
        expect_that!(registry.get("dma_buffer_size"), ok(eq("16384\n")));
    }

    #[gtest]
    fn test_buffer_size_must_be_whole_words() {
        let registry = ConfigurationRegistry::new(Box::new(ExternalClocks), channel());
        expect_that!(
            registry.set("dma_buffer_size", "4098"),
            err(displays_as(contains_substring("GatewayError::InvalidArgument")))
        );
        expect_that!(registry.get("dma_buffer_size"), ok(eq("4096\n")));
    }

    #[gtest]
    fn test_fclk_service_reads_and_writes_sysfs() {
        let dir = std::env::temp_dir().join(format!("ucubed-fclk-{}", std::process::id()));
        let clock = dir.join("fclk1");
        std::fs::create_dir_all(&clock).expect("create fclk dir");
        std::fs::write(clock.join("set_rate"), "100000000\n").expect("seed rate");

        let service = FclkClockService::new(dir);
        expect_that!(service.rate(1), ok(eq(&100_000_000)));
        service.set_rate(1, 125_000_000).expect("set_rate");
        expect_that!(service.rate(1), ok(eq(&125_000_000)));
    }

    #[gtest]
    fn test_fclk_service_missing_clock_fails() {
        let service = FclkClockService::new(PathBuf::from("/nonexistent/fclk"));
        expect_that!(
            service.rate(0),
            err(displays_as(contains_substring("GatewayError::IORead")))
        );
    }
}
