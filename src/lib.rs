#![cfg_attr(docsrs, feature(doc_cfg))]
//! # jbdbms_lib
//!
//! This crate decodes the UART protocol spoken by JBD style "smart BMS" controllers.
//! A host sends a fixed 7-byte request, the BMS answers with a framed response which is
//! validated and decoded into either [`protocol::BasicInfo`] or [`protocol::CellVoltages`].
//!
//! The protocol module is pure: it never touches a port and holds no state between calls.
//!
//! ```
//! use jbdbms_lib::protocol::{Frame, Response};
//!
//! let rx_buffer = [0xDD, 0x04, 0x00, 0x04, 0x0D, 0x05, 0x0D, 0x06, 0xFF, 0xD7, 0x77];
//! let frame = Frame::validate(&rx_buffer)?;
//! match frame.decode()? {
//!     Response::CellVoltages(cells) => assert_eq!(cells.voltages, vec![3333, 3334]),
//!     Response::BasicInfo(_) => unreachable!(),
//! }
//! # Ok::<(), jbdbms_lib::Error>(())
//! ```
//!
//! ## Features
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling the `jbdbms` command-line tool.
//!
//! ### Client Features
//! - `serialport`: Enables the **synchronous** client using the `serialport` crate.
//! - `tokio-serial-async`: Enables the **asynchronous** client using `tokio` and `tokio-serial`.
//!
//! ### Utility Features
//! - `serde`: Enables `serde` support for serializing/deserializing the decoded records.
//! - `bin-dependencies`: Enables all features required by the `jbdbms` binary executable.

/// Contains error types for the library.
mod error;
/// Frame validation and record decoding for the JBD BMS protocol.
pub mod protocol;

pub use error::{ChecksumStage, Error};

/// Synchronous client for JBD BMS communication.
#[cfg_attr(docsrs, doc(cfg(feature = "serialport")))]
#[cfg(feature = "serialport")]
pub mod serialport;

/// Asynchronous client for JBD BMS communication.
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-serial-async")))]
#[cfg(feature = "tokio-serial-async")]
pub mod tokio_serial_async;
