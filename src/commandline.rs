use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::time::Duration;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

/// Raw bytes of a captured response frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HexFrame(pub Vec<u8>);

/// Parses frame bytes written as hex, one byte per token, e.g. `DD 04 00 ...`,
/// `0xDD,0x04,...` or `dd:04:...`.
pub fn parse_hex_frame(s: &str) -> Result<HexFrame, String> {
    let mut bytes = Vec::new();
    for token in s
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':')
        .filter(|token| !token.is_empty())
    {
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if digits.len() != 2 {
            return Err(format!("'{token}' is not a single hex byte"));
        }
        let byte = hex::decode(digits).map_err(|err| format!("invalid byte '{token}': {err}"))?;
        bytes.extend_from_slice(&byte);
    }
    if bytes.is_empty() {
        return Err(String::from("no bytes given"));
    }
    Ok(HexFrame(bytes))
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Show pack voltage, current, capacities, cycles, temperatures and status bitmaps
    BasicInfo,
    /// Show individual cell voltages
    CellVoltages,
    /// Show basic info followed by the cell voltages
    All,
    /// Validate and decode a captured response frame without opening the serial port
    Decode {
        /// Frame bytes in hex (e.g. "DD 04 00 04 0D 05 0D 06 FF D7 77")
        #[arg(value_parser = parse_hex_frame)]
        frame: HexFrame,
    },
}

const fn about_text() -> &'static str {
    "jbd bms command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Serial port device path (e.g., /dev/ttyUSB0 on Linux, COM1 on Windows)
    #[arg(short, long, default_value_t = default_device_name())]
    pub device: String,

    #[command(subcommand)]
    pub command: CliCommands,

    /// Window for receiving a response (e.g., "500ms", "1s", "2s 500ms")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "1s")]
    pub timeout: Duration,

    /// Print records as JSON instead of debug output
    #[arg(long)]
    pub json: bool,
}
