use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::{path::PathBuf, time::Duration};
use tokio_modbus::{Address, Quantity};

fn parse_address(s: &str) -> Result<Address, String> {
    let address =
        clap_num::maybe_hex::<u16>(s).map_err(|e| format!("Invalid register address format: {e}"))?;
    if address == 0 {
        return Err("Register addresses start at 1".to_string());
    }
    Ok(address)
}

fn parse_quantity(s: &str) -> Result<Quantity, String> {
    clap_num::number_range(s, 1, easygen_lib::session::MAX_READ_QUANTITY)
}

fn parse_unit_id(s: &str) -> Result<u8, String> {
    clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid unit id format: {e}"))
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Print the register catalog with the batch offset of every measurement.
    /// Does not connect to the controller.
    #[clap(verbatim_doc_comment)]
    List,

    /// Fetch all measurements in one request and print every named value.
    ReadAll,

    /// Fetch all measurements and print the value of one measurement name.
    /// Example: "Engine speed (RPM)".
    #[clap(verbatim_doc_comment)]
    ReadName {
        /// The measurement name as shown by the `list` command.
        name: String,
    },

    /// Fetch all measurements and print the value at one register address.
    ReadAddress {
        /// Register address (e.g. "50016" or "0xC360").
        #[arg(value_parser = parse_address)]
        address: Address,
    },

    /// Read a raw block of registers and print every value.
    ReadRange {
        /// First register address (e.g. "50001" or "0xC351").
        #[arg(value_parser = parse_address)]
        address: Address,
        /// Number of registers to read (1 to 125).
        #[arg(value_parser = parse_quantity)]
        count: Quantity,
    },

    /// Run in daemon mode: repeatedly fetch all measurements and print them
    /// to the standard output (console).
    #[clap(verbatim_doc_comment)]
    Daemon {
        /// Interval between two fetches (e.g., "10s", "1m")
        #[arg(value_parser = humantime::parse_duration, short = 'i', long, default_value = "5s")]
        poll_interval: Duration,
    },
}

const fn about_text() -> &'static str {
    "easYgen-1000 CLI - Read generator controller telemetry via Modbus TCP."
}

#[derive(Parser, Debug)]
#[command(name="easygen", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warnings only.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// YAML configuration file with connection settings.
    /// Command line options take precedence over the file.
    #[arg(global = true, short, long, verbatim_doc_comment)]
    pub config: Option<PathBuf>,

    /// Hostname or IP address of the controller.
    #[arg(global = true, long)]
    pub host: Option<String>,

    /// Modbus TCP port of the controller [default: 502].
    #[arg(global = true, short, long)]
    pub port: Option<u16>,

    /// Modbus I/O timeout for each request [default: 1s].
    /// Examples: "1s", "500ms".
    #[arg(global = true, long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Option<Duration>,

    /// Modbus unit id [default: 1].
    /// Only needed for gateways that remap unit ids.
    #[arg(global = true, long, value_parser = parse_unit_id, verbatim_doc_comment)]
    pub unit_id: Option<u8>,

    /// Read input registers (function 0x04) instead of holding registers (0x03).
    #[arg(global = true, long)]
    pub input_registers: bool,

    /// The command to execute.
    #[command(subcommand)]
    pub command: CliCommands,
}
