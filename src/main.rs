//! easYgen-1000 Telemetry CLI
//!
//! A command-line interface (CLI) application for reading telemetry from
//! easYgen-1000 generator controllers using Modbus TCP.
//!
//! This tool allows users to:
//! - List the known measurement registers and their batch offsets.
//! - Fetch all measurements in one request and print every named value.
//! - Print a single measurement by name or by register address.
//! - Read and print a raw block of registers.
//! - Run in a continuous daemon mode that polls the controller and prints
//!   all measurements to the console.
//!
//! The CLI leverages the `easygen_lib` crate for the register catalog, the
//! address mapping and the Modbus session.

use anyhow::{Context, Result};
use clap::Parser;
use easygen_lib::{
    catalog::Catalog,
    mapper::AddressMap,
    session::{Connector, Session},
    tokio_sync::TcpConnector,
};
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use std::panic;

mod commandline;
mod config;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

fn print_catalog(catalog: &Catalog) {
    let map = AddressMap::build(catalog);
    println!("Address  Offset  Measurement");
    for entry in catalog.iter() {
        let offset = map
            .offset_of_address(entry.address)
            .map_or_else(|| "-".to_string(), |offset| offset.to_string());
        println!("{:>7}  {:>6}  {}", entry.address, offset, entry.name);
    }
}

fn print_readings<C: Connector>(session: &Session<C>) {
    for (entry, value) in session.readings() {
        match value {
            Ok(value) => println!("{:>7}  {}: {}", entry.address, entry.name, value),
            Err(error) => println!("{:>7}  {}: n/a ({})", entry.address, entry.name, error),
        }
    }
}

fn print_batch<C: Connector>(session: &Session<C>) {
    let Some(batch) = session.batch() else {
        return;
    };
    let catalog = session.catalog();
    for (index, value) in batch.values().iter().enumerate() {
        let address = usize::from(batch.address()) + index;
        let name = u16::try_from(address)
            .ok()
            .and_then(|address| catalog.find_by_address(address))
            .map_or("", |entry| entry.name);
        println!("{address:>7}  {value:>5}  {name}");
    }
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    // 1. Initialize logging as early as possible
    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "easYgen CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    let catalog = Catalog::EASYGEN_1000;

    // 2. Listing the catalog works offline
    if args.command == commandline::CliCommands::List {
        print_catalog(&catalog);
        return Ok(());
    }

    // 3. Resolve connection settings
    let file_config = match &args.config {
        Some(path) => config::Config::load(path)?,
        None => config::Config::default(),
    };
    let settings = config::Settings::resolve(&args, file_config)?;
    debug!("Effective settings: {settings:?}");

    let mut session: Session<TcpConnector> =
        Session::new(settings.connector(), catalog).with_register_kind(settings.register_kind);

    // 4. Execute the command
    match &args.command {
        commandline::CliCommands::List => unreachable!("List should be handled earlier."),
        commandline::CliCommands::ReadAll => {
            info!("Executing: Read All Measurements");
            session.connected(|session| {
                session
                    .fetch_all()
                    .with_context(|| "Cannot fetch measurements")?;
                print_readings(session);
                Ok::<_, anyhow::Error>(())
            })?;
        }
        commandline::CliCommands::ReadName { name } => {
            info!("Executing: Read Measurement '{name}'");
            let value = session.connected(|session| {
                session
                    .fetch_all()
                    .with_context(|| "Cannot fetch measurements")?;
                session
                    .get_by_name(name)
                    .with_context(|| format!("Cannot read measurement '{name}'"))
            })?;
            println!("{name}: {value}");
        }
        commandline::CliCommands::ReadAddress { address } => {
            info!("Executing: Read Register {address}");
            let value = session.connected(|session| {
                session
                    .fetch_all()
                    .with_context(|| "Cannot fetch measurements")?;
                session
                    .get_by_address(*address)
                    .with_context(|| format!("Cannot read register {address}"))
            })?;
            let name = catalog
                .find_by_address(*address)
                .map_or("", |entry| entry.name);
            println!("{address} {name}: {value}");
        }
        commandline::CliCommands::ReadRange { address, count } => {
            info!("Executing: Read {count} Registers starting at {address}");
            session.connected(|session| {
                session
                    .fetch_range(*address, *count)
                    .with_context(|| format!("Cannot read {count} registers at {address}"))?;
                print_batch(session);
                Ok::<_, anyhow::Error>(())
            })?;
        }
        commandline::CliCommands::Daemon { poll_interval } => {
            info!("Starting daemon mode: interval={poll_interval:?}");
            loop {
                debug!("Daemon: Fetching measurements for stdout...");
                let result = session.connected(|session| {
                    session.fetch_all()?;
                    print_readings(session);
                    Ok::<_, easygen_lib::Error>(())
                });
                if let Err(error) = result {
                    error!("Cannot fetch measurements: {error}");
                }
                std::thread::sleep(*poll_interval);
            }
        }
    }

    Ok(())
}
