use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use jbdbms_lib::protocol::{Frame, Response};
use jbdbms_lib::serialport::JbdBms;
use log::*;
use std::{fmt::Debug, ops::Deref, panic};

mod commandline;

use commandline::{CliArgs, CliCommands, HexFrame};

fn logging_init(loglevel: LevelFilter) -> Result<LoggerHandle> {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .with_context(|| "Cannot init logging")?
        .start()
        .with_context(|| "Cannot start logging")?;

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    Ok(log_handle)
}

fn print_record<T: Debug + serde::Serialize>(label: &str, record: &T, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string(record).with_context(|| "Cannot serialize record")?
        );
    } else {
        println!("{label}: {record:?}");
    }
    Ok(())
}

fn decode_frame(frame: &HexFrame, json: bool) -> Result<()> {
    let frame = Frame::validate(&frame.0).with_context(|| "Invalid frame")?;
    match frame.decode().with_context(|| "Cannot decode frame")? {
        Response::BasicInfo(info) => print_record("Basic info", &info, json),
        Response::CellVoltages(cells) => print_record("Cell voltages", &cells, json),
    }
}

macro_rules! print_basic_info {
    ($bms:expr, $json:expr) => {
        print_record(
            "Basic info",
            &$bms
                .get_basic_info()
                .with_context(|| "Cannot get basic info")?,
            $json,
        )?
    };
}
macro_rules! print_cell_voltages {
    ($bms:expr, $json:expr) => {
        print_record(
            "Cell voltages",
            &$bms
                .get_cell_voltages()
                .with_context(|| "Cannot get cell voltages")?,
            $json,
        )?
    };
}

fn open_bms(args: &CliArgs) -> Result<JbdBms> {
    let mut bms = JbdBms::new(&args.device)
        .with_context(|| format!("Cannot open serial port '{}'", args.device))?;
    bms.set_timeout(args.timeout);
    Ok(bms)
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter())?;

    match &args.command {
        CliCommands::Decode { frame } => decode_frame(frame, args.json)?,
        CliCommands::BasicInfo => print_basic_info!(open_bms(&args)?, args.json),
        CliCommands::CellVoltages => print_cell_voltages!(open_bms(&args)?, args.json),
        CliCommands::All => {
            let mut bms = open_bms(&args)?;
            print_basic_info!(bms, args.json);
            print_cell_voltages!(bms, args.json);
        }
    }

    Ok(())
}
