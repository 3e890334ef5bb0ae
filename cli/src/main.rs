//! `ucube`: command-line client for the ucubed gateway daemon.
//!
//! Every subcommand is a thin wrapper around one or more DBus calls to `io.ucube.gateway`;
//! nothing here touches the hardware directly.

mod config;
mod load;
mod map;
mod proxies;
mod read;
mod status;

use clap::{Parser, Subcommand, arg, command};
use log::debug;

/// Endpoint indices exposed by the daemon.
pub(crate) const DATA_ENDPOINT: u32 = 0;
pub(crate) const BITSTREAM_ENDPOINT: u32 = 3;

/// Parse a decimal or `0x`-prefixed hexadecimal number.
fn parse_number(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("{s:?} is not a number: {e}"))
}

fn parse_word(s: &str) -> Result<u32, String> {
    let value = parse_number(s)?;
    u32::try_from(value).map_err(|_| format!("{s:?} does not fit in 32 bits"))
}

#[derive(Parser, Debug)]
#[command(name = "ucube")]
#[command(bin_name = "ucube")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the platform variant, buffer size, data readiness and bitstream state
    Status,
    /// Read the latest acquisition snapshot
    Read {
        #[arg(
            long,
            help = "number of bytes to request; defaults to the configured dma_buffer_size"
        )]
        count: Option<u32>,
        #[arg(long, help = "write the raw bytes to this file instead of printing a hex dump")]
        output: Option<String>,
    },
    /// Upload a bitstream in chunks and program the fabric with it
    Load {
        file: String,
        #[arg(long = "chunk-size", default_value_t = 64 * 1024)]
        chunk_size: usize,
    },
    /// Read a configuration key (clock_0..clock_3, dma_buffer_size)
    Get { key: String },
    /// Write a configuration key
    Set { key: String, value: String },
    /// Validate a mapping of a bus window and report its page
    Map {
        #[arg(value_parser = clap::value_parser!(u32).range(0..=1))]
        bus: u32,
        #[arg(value_parser = parse_number)]
        offset: u64,
        #[arg(value_parser = parse_number)]
        length: u64,
    },
    /// Load one 32-bit word from a bus window
    Peek {
        #[arg(value_parser = clap::value_parser!(u32).range(0..=1))]
        bus: u32,
        #[arg(value_parser = parse_number)]
        address: u64,
    },
    /// Store one 32-bit word into a bus window
    Poke {
        #[arg(value_parser = clap::value_parser!(u32).range(0..=1))]
        bus: u32,
        #[arg(value_parser = parse_number)]
        address: u64,
        #[arg(value_parser = parse_word)]
        value: u32,
    },
    /// Discard a partially uploaded bitstream
    ResetBitstream,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    debug!("parsed cli command with {cli:?}");
    let result = match cli.command {
        Commands::Status => status::status_handler().await,
        Commands::Read { count, output } => read::read_handler(count, &output).await,
        Commands::Load { file, chunk_size } => load::load_handler(&file, chunk_size).await,
        Commands::Get { key } => config::get_handler(&key).await,
        Commands::Set { key, value } => config::set_handler(&key, &value).await,
        Commands::Map {
            bus,
            offset,
            length,
        } => map::map_handler(bus, offset, length).await,
        Commands::Peek { bus, address } => map::peek_handler(bus, address).await,
        Commands::Poke {
            bus,
            address,
            value,
        } => map::poke_handler(bus, address, value).await,
        Commands::ResetBitstream => load::reset_handler().await,
    };
    match result {
        Ok(msg) => println!("{msg}"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use rstest::*;

    #[gtest]
    #[rstest]
    #[case::decimal("4096", 4096)]
    #[case::hex("0x40000000", 0x4000_0000)]
    #[case::upper_hex("0X10", 16)]
    fn test_parse_number(#[case] input: &str, #[case] expected: u64) {
        expect_that!(parse_number(input), ok(eq(&expected)));
    }

    #[gtest]
    fn test_parse_number_rejects_garbage() {
        expect_that!(parse_number("0xfg"), err(contains_substring("is not a number")));
    }

    #[gtest]
    fn test_parse_word_rejects_wide_values() {
        expect_that!(parse_word("0x100000000"), err(contains_substring("32 bits")));
    }

    #[gtest]
    fn test_cli_parses_map() {
        let cli = Cli::try_parse_from(["ucube", "map", "1", "0x10000000000", "4096"])
            .expect("valid map command");
        let Commands::Map {
            bus,
            offset,
            length,
        } = cli.command
        else {
            panic!("parsed {:?}", cli.command);
        };
        expect_that!(bus, eq(1));
        expect_that!(offset, eq(0x100_0000_0000));
        expect_that!(length, eq(4096));
    }

    #[gtest]
    fn test_cli_rejects_third_bus() {
        expect_that!(
            Cli::try_parse_from(["ucube", "map", "2", "0", "4096"]).is_err(),
            eq(true)
        );
    }
}
