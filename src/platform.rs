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

//! Platform variant selection.
//!
//! The gateway supports two hardware generations. Which one is attached is decided exactly once,
//! from the device-tree `compatible` property, and resolved into a [`VariantProfile`] that carries
//! every constant the rest of the gateway needs: the DMA word width, the two bus windows a caller
//! may map, and whether the fabric clocks are settable from here.
//!
//! # Variants
//!
//! | variant | compatible        | DMA word | clocks   |
//! |---------|-------------------|----------|----------|
//! | Narrow  | `xlnx,zynq-7000`  | 32-bit   | local    |
//! | Wide    | `xlnx,zynqmp`     | 64-bit   | external |
//!
//! # Discovery
//!
//! The kernel exports the property at [`config::DEVICE_TREE_COMPATIBLE`] as a list of
//! NUL-terminated strings, most specific first, e.g. `"xlnx,zynqmp-zcu104\0xlnx,zynqmp\0"`. Each
//! entry is compared against the variant table; the first exact match wins. An absent property or
//! one matching neither variant refuses the attach with [`GatewayError::Discovery`].
//!
//! # Examples
//!
//! ```rust,no_run
//! # use ucubed::platform::{discover_variant, PlatformVariant};
//! # fn example() -> Result<(), ucubed::error::GatewayError> {
//! let variant = discover_variant()?;
//! println!("DMA words are {} bytes wide", variant.profile().word_width.bytes());
//! # Ok(())
//! # }
//! ```

use crate::config;
use crate::error::GatewayError;
use crate::system_io::fs_read;
use log::{info, trace};
use std::fmt;
use std::path::Path;

/// Width of a single DMA transfer word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordWidth {
    Bits32,
    Bits64,
}

impl WordWidth {
    pub const fn bytes(self) -> usize {
        match self {
            WordWidth::Bits32 => 4,
            WordWidth::Bits64 => 8,
        }
    }

    /// Highest physical address a device of this width can reach.
    pub const fn dma_mask(self) -> u64 {
        match self {
            WordWidth::Bits32 => u32::MAX as u64,
            WordWidth::Bits64 => u64::MAX,
        }
    }
}

/// A physical address range `[base, top)` a caller may map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressWindow {
    pub base: u64,
    pub top: u64,
}

impl AddressWindow {
    pub const fn new(base: u64, top: u64) -> Self {
        AddressWindow { base, top }
    }

    pub const fn len(&self) -> u64 {
        self.top - self.base
    }
}

/// Which of the two fabric buses a window belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bus {
    Bus0,
    Bus1,
}

/// Who owns the fabric clock rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockControl {
    /// Four clocks settable through the clock service.
    Local,
    /// Clock rates are fixed by firmware; get/set are neutral.
    External,
}

/// The constants a resolved variant hands to every other component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantProfile {
    pub word_width: WordWidth,
    pub bus_windows: [AddressWindow; 2],
    pub clock_control: ClockControl,
}

impl VariantProfile {
    pub fn window(&self, bus: Bus) -> AddressWindow {
        match bus {
            Bus::Bus0 => self.bus_windows[0],
            Bus::Bus1 => self.bus_windows[1],
        }
    }
}

const NARROW_PROFILE: VariantProfile = VariantProfile {
    word_width: WordWidth::Bits32,
    bus_windows: [
        AddressWindow::new(0x4000_0000, 0x8000_0000),
        AddressWindow::new(0x8000_0000, 0xC000_0000),
    ],
    clock_control: ClockControl::Local,
};

const WIDE_PROFILE: VariantProfile = VariantProfile {
    word_width: WordWidth::Bits64,
    bus_windows: [
        AddressWindow::new(0x4_0000_0000, 0x5_0000_0000),
        AddressWindow::new(0x10_0000_0000, 0x11_0000_0000),
    ],
    clock_control: ClockControl::External,
};

/// The hardware generation attached to this gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformVariant {
    Narrow,
    Wide,
}

impl PlatformVariant {
    pub const fn profile(self) -> &'static VariantProfile {
        match self {
            PlatformVariant::Narrow => &NARROW_PROFILE,
            PlatformVariant::Wide => &WIDE_PROFILE,
        }
    }

    /// The device-tree compatible entry that selects this variant.
    pub const fn compatible(self) -> &'static str {
        match self {
            PlatformVariant::Narrow => "xlnx,zynq-7000",
            PlatformVariant::Wide => "xlnx,zynqmp",
        }
    }
}

impl fmt::Display for PlatformVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformVariant::Narrow => write!(f, "narrow"),
            PlatformVariant::Wide => write!(f, "wide"),
        }
    }
}

const VARIANTS: [PlatformVariant; 2] = [PlatformVariant::Narrow, PlatformVariant::Wide];

/// Resolve a variant from a raw device-tree `compatible` property.
///
/// # Arguments
///
/// * `compatible` - The property contents; either a single string or a NUL separated list
///
/// # Returns: `Result<PlatformVariant, GatewayError>`
/// * `Ok(PlatformVariant)` - The variant of the first entry that exactly matches the table
/// * `Err(GatewayError::Discovery)` - Property empty or no entry matches
pub fn select_variant(compatible: &str) -> Result<PlatformVariant, GatewayError> {
    for entry in compatible.split('\0').map(str::trim).filter(|e| !e.is_empty()) {
        trace!("Trying compatible entry '{entry}'");
        if let Some(variant) = VARIANTS.iter().find(|v| v.compatible() == entry) {
            info!("Compatible entry '{entry}' selects the {variant} variant");
            return Ok(*variant);
        }
    }
    Err(GatewayError::Discovery(format!(
        "no known variant in compatible property {compatible:?}"
    )))
}

/// Read the board's device-tree `compatible` property.
///
/// # Returns: `Result<String, GatewayError>`
/// * `Ok(String)` - Property contents with the trailing NUL removed
/// * `Err(GatewayError::Discovery)` - The property does not exist or cannot be read
pub fn read_compatible_string(property_path: &Path) -> Result<String, GatewayError> {
    match fs_read(property_path) {
        Ok(s) => Ok(s.trim_end_matches('\0').to_string()),
        Err(e) => Err(GatewayError::Discovery(format!(
            "failed to read {property_path:?}: {e}"
        ))),
    }
}

/// Read [`config::DEVICE_TREE_COMPATIBLE`] and resolve the variant it names.
pub fn discover_variant() -> Result<PlatformVariant, GatewayError> {
    let compatible = read_compatible_string(Path::new(config::DEVICE_TREE_COMPATIBLE))?;
    select_variant(&compatible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use rstest::*;

    #[gtest]
    #[rstest]
    #[case::narrow_exact("xlnx,zynq-7000", PlatformVariant::Narrow)]
    #[case::wide_exact("xlnx,zynqmp", PlatformVariant::Wide)]
    #[case::narrow_list("digilent,zybo\0xlnx,zynq-7000\0", PlatformVariant::Narrow)]
    #[case::wide_list("xlnx,zynqmp-zcu104-revC\0xlnx,zynqmp-zcu104\0xlnx,zynqmp\0", PlatformVariant::Wide)]
    fn test_select_variant_matches(#[case] compatible: &str, #[case] expected: PlatformVariant) {
        expect_that!(select_variant(compatible), ok(eq(&expected)));
    }

    #[gtest]
    #[rstest]
    #[case::empty("")]
    #[case::only_nul("\0")]
    #[case::unknown("raspberrypi,4-model-b\0brcm,bcm2711\0")]
    #[case::prefix_only("xlnx,zynq")]
    #[case::case_sensitive("XLNX,ZYNQMP")]
    fn test_select_variant_refuses(#[case] compatible: &str) {
        expect_that!(
            select_variant(compatible),
            err(displays_as(contains_substring("GatewayError::Discovery")))
        );
    }

    #[gtest]
    fn test_missing_property_is_a_discovery_error() {
        expect_that!(
            read_compatible_string(Path::new("/nonexistent/devicetree/compatible")),
            err(displays_as(contains_substring("GatewayError::Discovery")))
        );
    }

    #[gtest]
    fn test_profiles_differ_in_width_and_clocks() {
        let narrow = PlatformVariant::Narrow.profile();
        let wide = PlatformVariant::Wide.profile();
        expect_that!(narrow.word_width.bytes(), eq(4));
        expect_that!(wide.word_width.bytes(), eq(8));
        expect_that!(narrow.clock_control, eq(ClockControl::Local));
        expect_that!(wide.clock_control, eq(ClockControl::External));
    }

    #[gtest]
    #[rstest]
    #[case::narrow(PlatformVariant::Narrow)]
    #[case::wide(PlatformVariant::Wide)]
    fn test_bus_windows_are_disjoint_and_reachable(#[case] variant: PlatformVariant) {
        let profile = variant.profile();
        let bus0 = profile.window(Bus::Bus0);
        let bus1 = profile.window(Bus::Bus1);
        expect_that!(bus0.base, lt(bus0.top));
        expect_that!(bus1.base, lt(bus1.top));
        expect_that!(bus0.top, le(bus1.base));
        expect_that!(bus1.top - 1, le(profile.word_width.dma_mask()));
    }

    #[gtest]
    fn test_wide_windows_sit_above_narrow_windows() {
        let narrow = PlatformVariant::Narrow.profile();
        let wide = PlatformVariant::Wide.profile();
        expect_that!(wide.window(Bus::Bus0).base, gt(narrow.window(Bus::Bus1).top));
    }
}
