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

//! Error wrapping helpers for the sysfs attributes the collaborators talk to.
//!
//! The clock, reconfiguration and discovery collaborators are all thin wrappers around kernel
//! attribute files. These helpers add trace logging and turn `std::io::Error` into
//! [`GatewayError::IORead`] / [`GatewayError::IOWrite`] carrying the offending path.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use ucubed::system_io::{fs_read, fs_write};
//! # use std::path::Path;
//! # fn example() -> Result<(), ucubed::error::GatewayError> {
//! let state = fs_read(Path::new("/sys/class/fpga_manager/fpga0/state"))?;
//! fs_write(Path::new("/sys/class/fclk/fclk0/set_rate"), false, "100000000")?;
//! # Ok(())
//! # }
//! ```

use crate::error::GatewayError;
use log::trace;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

/// Read the contents of a file to a String.
///
/// # Returns: `Result<String, GatewayError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(GatewayError::IORead)` - If the file cannot be read
pub fn fs_read(file_path: &Path) -> Result<String, GatewayError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf = String::new();
    OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf))
        .map_err(|e| GatewayError::IORead {
            file: file_path.into(),
            e,
        })?;
    trace!("Reading done");
    Ok(buf)
}

/// Write a string value to a file.
///
/// # Arguments
///
/// * `file_path` - Path to the file to write
/// * `create` - If `true`, create the file if it doesn't exist; sysfs attributes always exist so
///   callers writing to them pass `false`
/// * `value` - The string value to write
///
/// # Returns: `Result<(), GatewayError>`
/// * `Ok(())` - Write succeeded
/// * `Err(GatewayError::IOWrite)` - If the write fails
pub fn fs_write(file_path: &Path, create: bool, value: impl AsRef<str>) -> Result<(), GatewayError> {
    trace!(
        "Attempting to write {:?} to {:?}",
        value.as_ref(),
        file_path
    );
    OpenOptions::new()
        .create(create)
        .write(true)
        .truncate(create)
        .open(file_path)
        .and_then(|mut f| write!(f, "{}", value.as_ref()))
        .map_err(|e| GatewayError::IOWrite {
            file: file_path.into(),
            e,
        })?;
    trace!("Write done.");
    Ok(())
}

/// Write binary data to a file, truncating whatever was there before.
pub fn fs_write_bytes(file_path: &Path, create: bool, data: &[u8]) -> Result<(), GatewayError> {
    trace!("Attempting to write {} bytes to {:?}", data.len(), file_path);
    OpenOptions::new()
        .create(create)
        .write(true)
        .truncate(true)
        .open(file_path)
        .and_then(|mut f| f.write_all(data))
        .map_err(|e| GatewayError::IOWrite {
            file: file_path.into(),
            e,
        })?;
    trace!("Write done.");
    Ok(())
}

/// Read a sysfs attribute holding a single unsigned decimal value.
///
/// Trailing newlines and NUL terminators, which drivers commonly leave behind, are ignored.
pub fn fs_read_u64(file_path: &Path) -> Result<u64, GatewayError> {
    let contents = fs_read(file_path)?;
    let trimmed = contents.trim_end_matches('\0').trim();
    trimmed.parse::<u64>().map_err(|_| {
        GatewayError::InvalidArgument(format!(
            "{file_path:?} does not hold an unsigned decimal value: {trimmed:?}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use rstest::*;
    use std::path::PathBuf;

    fn scratch_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ucubed-system-io-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("failed to create scratch dir");
        dir.join(name)
    }

    #[gtest]
    #[rstest]
    #[case::not_found(
        "/nonexistent/ucubed/attr",
        err(displays_as(contains_substring("No such file or directory")))
    )]
    #[case::is_dir("/", err(displays_as(contains_substring("GatewayError::IORead"))))]
    fn test_fs_read_failures<M: for<'a> Matcher<&'a std::result::Result<String, GatewayError>>>(
        #[case] path_str: &str,
        #[case] condition: M,
    ) {
        let r = fs_read(Path::new(path_str));
        expect_that!(r, condition);
    }

    #[gtest]
    fn test_fs_write_then_read() {
        let file = scratch_file("write_then_read");
        fs_write(&file, true, "operating\n").expect("write failed");
        expect_that!(fs_read(&file), ok(eq("operating\n")));
    }

    #[gtest]
    fn test_fs_write_without_create_fails_on_missing_file() {
        let file = scratch_file("never_created");
        let _ = std::fs::remove_file(&file);
        expect_that!(
            fs_write(&file, false, "1"),
            err(displays_as(contains_substring("GatewayError::IOWrite")))
        );
    }

    #[gtest]
    fn test_fs_write_bytes_truncates() {
        let file = scratch_file("truncates");
        fs_write_bytes(&file, true, &[1, 2, 3, 4, 5]).expect("first write failed");
        fs_write_bytes(&file, true, &[9, 9]).expect("second write failed");
        expect_that!(std::fs::read(&file).expect("read back failed"), eq(&vec![9u8, 9]));
    }

    #[gtest]
    #[rstest]
    #[case::plain("100000000", 100_000_000)]
    #[case::newline("50000000\n", 50_000_000)]
    #[case::nul_terminated("25\0", 25)]
    fn test_fs_read_u64(#[case] contents: &str, #[case] expected: u64) {
        let file = scratch_file(&format!("u64_{expected}"));
        fs_write(&file, true, contents).expect("write failed");
        expect_that!(fs_read_u64(&file), ok(eq(&expected)));
    }

    #[gtest]
    fn test_fs_read_u64_rejects_garbage() {
        let file = scratch_file("u64_garbage");
        fs_write(&file, true, "fast").expect("write failed");
        expect_that!(
            fs_read_u64(&file),
            err(displays_as(contains_substring("GatewayError::InvalidArgument")))
        );
    }
}
