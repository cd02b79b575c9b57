//! Provides a synchronous client for a JBD BMS using the `serialport` crate.
//!
//! # Example
//!
//! ```no_run
//! use jbdbms_lib::serialport::{JbdBms, Error};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Error> {
//!     let mut bms = JbdBms::new("/dev/ttyUSB0")?;
//!     bms.set_timeout(Duration::from_millis(500));
//!
//!     let basic_info = bms.get_basic_info()?;
//!     println!("Basic info: {:?}", basic_info);
//!
//!     let cell_voltages = bms.get_cell_voltages()?;
//!     println!("Cell voltages: {:?}", cell_voltages);
//!     Ok(())
//! }
//! ```

use crate::protocol::*;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// Read timeout of a single poll on the port while a response is collected.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Errors specific to the synchronous serial port client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The received frame was rejected by the protocol layer.
    #[error("JBD error: {0}")]
    JbdError(#[from] crate::Error),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Collects the bytes of one response from `reader`.
///
/// Reading stops when the `window` elapses, the reader reports end of stream,
/// [`MAX_FRAME_LENGTH`] bytes are buffered, or the header announces a frame length
/// that has been reached. Read timeouts within the window are not errors.
pub fn collect_response<R: Read + ?Sized>(
    reader: &mut R,
    window: Duration,
) -> std::io::Result<Vec<u8>> {
    let deadline = Instant::now() + window;
    let mut rx_buffer = Vec::with_capacity(MAX_FRAME_LENGTH);
    let mut chunk = [0; 64];

    while rx_buffer.len() < MAX_FRAME_LENGTH && Instant::now() < deadline {
        let wanted = chunk.len().min(MAX_FRAME_LENGTH - rx_buffer.len());
        match reader.read(&mut chunk[..wanted]) {
            Ok(0) => break,
            Ok(received) => {
                rx_buffer.extend_from_slice(&chunk[..received]);
                if let Some(expected) = expected_frame_length(&rx_buffer) {
                    if rx_buffer.len() >= expected {
                        break;
                    }
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(err) => return Err(err),
        }
    }

    log::trace!("receive_bytes: {rx_buffer:02X?}");
    Ok(rx_buffer)
}

/// Synchronous connection to a JBD BMS.
pub struct JbdBms {
    serial: Box<dyn serialport::SerialPort>,
    timeout: Duration,
}

impl std::fmt::Debug for JbdBms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JbdBms")
            .field("port", &self.serial.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl JbdBms {
    /// Opens `port` with 9600 baud, 8N1 and no flow control.
    pub fn new(port: &str) -> Result<Self> {
        Ok(Self {
            serial: serialport::new(port, 9600)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .flow_control(serialport::FlowControl::None)
                .timeout(POLL_INTERVAL)
                .open()?,
            timeout: RESPONSE_TIMEOUT,
        })
    }

    /// Sets the window within which a response has to be received.
    pub fn set_timeout(&mut self, timeout: Duration) {
        log::trace!("set timeout to {timeout:?}");
        self.timeout = timeout;
    }

    fn send_bytes(&mut self, tx_buffer: &[u8]) -> Result<()> {
        // a late reply to an earlier request must not be taken for this one
        loop {
            let pending = self.serial.bytes_to_read()?;
            if pending > 0 {
                log::trace!("Got {} pending bytes", pending);
                let mut buf = vec![0; 64];
                let received = self.serial.read(buf.as_mut_slice())?;
                log::trace!("Read {} pending bytes", received);
            } else {
                break;
            }
        }

        log::trace!("write bytes: {tx_buffer:02X?}");
        self.serial.write_all(tx_buffer)?;
        Ok(())
    }

    fn receive_bytes(&mut self) -> Result<Vec<u8>> {
        Ok(collect_response(&mut *self.serial, self.timeout)?)
    }

    /// Retrieves the aggregate pack telemetry.
    ///
    /// A reply of another type fails with [`crate::Error::ResponseMismatch`].
    pub fn get_basic_info(&mut self) -> Result<BasicInfo> {
        log::trace!("get basic info");
        self.send_bytes(&BasicInfo::request())?;
        Ok(BasicInfo::decode_response(&self.receive_bytes()?)?)
    }

    /// Retrieves the voltage of each cell in mV.
    pub fn get_cell_voltages(&mut self) -> Result<CellVoltages> {
        log::trace!("get cell voltages");
        self.send_bytes(&CellVoltages::request())?;
        Ok(CellVoltages::decode_response(&self.receive_bytes()?)?)
    }
}
