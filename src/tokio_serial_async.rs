//! Provides an asynchronous client for interacting with a JBD BMS
//! using Tokio and the `tokio-serial` crate for serial communication.
//!
//! This module is suitable for applications built on the Tokio runtime.
//!
//! # Example
//!
//! ```no_run
//! use jbdbms_lib::tokio_serial_async::{JbdBms, Error};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let mut bms = JbdBms::new("/dev/ttyUSB0")?;
//!     bms.set_timeout(Duration::from_millis(500));
//!
//!     let basic_info = bms.get_basic_info().await?;
//!     println!("Basic info: {:?}", basic_info);
//!
//!     let cell_voltages = bms.get_cell_voltages().await?;
//!     println!("Cell voltages: {:?}", cell_voltages);
//!
//!     Ok(())
//! }
//! ```

use crate::protocol::*;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt};

/// Errors specific to the asynchronous Tokio serial port client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error originating from the JBD BMS protocol layer.
    #[error("JBD error: {0}")]
    JbdError(#[from] crate::Error),
    /// An I/O error, typically from the serial port communication.
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    /// An error from the `tokio-serial` crate.
    #[error("Tokio serial error: {0}")]
    TokioSerial(#[from] tokio_serial::Error),
    /// An error indicating that a Tokio timeout elapsed during an I/O operation.
    #[error("Tokio timeout elapsed: {0}")]
    TokioElapsed(#[from] tokio::time::error::Elapsed),
}

/// A specialized `Result` type for operations within the `tokio_serial_async` module.
type Result<T> = std::result::Result<T, Error>;

/// Collects the bytes of one response from `reader` within `window`.
///
/// Stops early on end of stream, after [`MAX_FRAME_LENGTH`] bytes, or once the
/// frame length announced by the header has been received. An elapsed window is
/// not an error; whatever arrived so far is returned.
pub async fn collect_response<R: AsyncRead + Unpin>(
    reader: &mut R,
    window: Duration,
) -> std::io::Result<Vec<u8>> {
    let deadline = tokio::time::Instant::now() + window;
    let mut rx_buffer = Vec::with_capacity(MAX_FRAME_LENGTH);
    let mut chunk = [0; 64];

    while rx_buffer.len() < MAX_FRAME_LENGTH {
        let wanted = chunk.len().min(MAX_FRAME_LENGTH - rx_buffer.len());
        match tokio::time::timeout_at(deadline, reader.read(&mut chunk[..wanted])).await {
            Err(_) => {
                log::trace!("response window of {window:?} elapsed");
                break;
            }
            Ok(Ok(0)) => break,
            Ok(Ok(received)) => {
                rx_buffer.extend_from_slice(&chunk[..received]);
                if let Some(expected) = expected_frame_length(&rx_buffer) {
                    if rx_buffer.len() >= expected {
                        break;
                    }
                }
            }
            Ok(Err(err)) if err.kind() == ErrorKind::Interrupted => continue,
            Ok(Err(err)) => return Err(err),
        }
    }

    log::trace!("receive_bytes: {rx_buffer:02X?}");
    Ok(rx_buffer)
}

/// The main struct for interacting asynchronously with a JBD BMS using Tokio.
///
/// Each request drains stale input, sends the fixed request frame and collects
/// the reply within the configured window. Failed requests are not repeated.
#[derive(Debug)]
pub struct JbdBms {
    serial: tokio_serial::SerialStream,
    io_timeout: Duration,
}

impl JbdBms {
    /// Creates a new `JbdBms` instance for asynchronous communication.
    ///
    /// # Arguments
    ///
    /// * `port`: The path to the serial port device (e.g., `/dev/ttyUSB0` on Linux, `COM3` on Windows).
    pub fn new(port: &str) -> Result<Self> {
        Ok(Self {
            serial: tokio_serial::new(port, 9600)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()?,
            io_timeout: RESPONSE_TIMEOUT,
        })
    }

    /// Sets the window for writing a request and for collecting its response.
    pub fn set_timeout(&mut self, timeout: Duration) {
        log::trace!("set timeout to {timeout:?}");
        self.io_timeout = timeout;
    }

    async fn send_bytes(&mut self, tx_buffer: &[u8]) -> Result<()> {
        // A previous, timed-out response must not be read as the answer to this request.
        loop {
            let pending = self.serial.bytes_to_read()?;
            log::trace!("got {pending} pending bytes");
            if pending > 0 {
                let mut buf: Vec<u8> = vec![0; 64];
                let received =
                    tokio::time::timeout(self.io_timeout, self.serial.read(buf.as_mut_slice()))
                        .await??;
                log::trace!("{received} pending bytes consumed");
            } else {
                break;
            }
        }

        log::trace!("write bytes: {tx_buffer:02X?}");
        tokio::time::timeout(self.io_timeout, self.serial.write_all(tx_buffer)).await??;
        Ok(())
    }

    async fn send_and_receive(&mut self, tx_buffer: &[u8]) -> Result<Vec<u8>> {
        self.send_bytes(tx_buffer).await?;
        Ok(collect_response(&mut self.serial, self.io_timeout).await?)
    }

    /// Asynchronously retrieves the aggregate pack telemetry.
    pub async fn get_basic_info(&mut self) -> Result<BasicInfo> {
        log::trace!("get basic info");
        let rx_buffer = self.send_and_receive(&BasicInfo::request()).await?;
        Ok(BasicInfo::decode_response(&rx_buffer)?)
    }

    /// Asynchronously retrieves the voltage of each cell in mV.
    pub async fn get_cell_voltages(&mut self) -> Result<CellVoltages> {
        log::trace!("get cell voltages");
        let rx_buffer = self.send_and_receive(&CellVoltages::request()).await?;
        Ok(CellVoltages::decode_response(&rx_buffer)?)
    }
}
