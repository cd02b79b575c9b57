use crate::{ChecksumStage, Error};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Window within which a complete response is expected after sending a request.
pub const RESPONSE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

pub const START_BYTE: u8 = 0xDD;
pub const END_BYTE: u8 = 0x77;
/// Second byte of every request, marks a register read.
pub const READ_MARKER: u8 = 0xA5;
pub const STATUS_OK: u8 = 0x00;

pub const REQUEST_LENGTH: usize = 7;
pub const HEADER_LENGTH: usize = 4;
pub const CHECKSUM_LENGTH: usize = 2;
/// Header, empty payload, checksum and end byte.
pub const MIN_FRAME_LENGTH: usize = HEADER_LENGTH + CHECKSUM_LENGTH + 1;
pub const MAX_FRAME_LENGTH: usize = MIN_FRAME_LENGTH + u8::MAX as usize;

/// Number of temperature slots in the basic info record.
pub const NTC_SLOTS: usize = 3;
pub const MAX_CELLS: usize = 6;
pub const RESERVED_LENGTH: usize = 9;
/// Payload length of a basic info response, without the checksum.
pub const BASIC_INFO_LENGTH: usize = 38;

macro_rules! read_bit {
    ($value:expr,$position:expr) => {
        ($value >> $position) & 1 != 0
    };
}

/// Computes the frame checksum: the 16-bit sum of status, length and payload bytes,
/// negated in two's complement. All arithmetic wraps.
pub fn checksum(status: u8, length: u8, payload: &[u8]) -> u16 {
    let sum = payload
        .iter()
        .fold(u16::from(status).wrapping_add(u16::from(length)), |sum, b| {
            sum.wrapping_add(u16::from(*b))
        });
    (!sum).wrapping_add(1)
}

/// Total frame length for a declared payload length.
pub fn frame_length(declared_length: u8) -> usize {
    HEADER_LENGTH + usize::from(declared_length) + CHECKSUM_LENGTH + 1
}

/// Returns the length the frame in `rx_buffer` will have once complete, as soon as
/// the header has been received.
pub fn expected_frame_length(rx_buffer: &[u8]) -> Option<usize> {
    if rx_buffer.len() >= HEADER_LENGTH && rx_buffer[0] == START_BYTE {
        Some(frame_length(rx_buffer[3]))
    } else {
        None
    }
}

fn read_u16(buffer: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buffer[offset], buffer[offset + 1]])
}

fn create_request(response_type: ResponseType) -> [u8; REQUEST_LENGTH] {
    let command = response_type.code();
    let checksum = checksum(command, 0x00, &[]).to_be_bytes();
    [
        START_BYTE,
        READ_MARKER,
        command,
        0x00,
        checksum[0],
        checksum[1],
        END_BYTE,
    ]
}

fn verify_record_checksum(calculated: u16, received: u16) -> Result<(), Error> {
    if calculated != received {
        log::warn!(
            "Invalid record checksum - calculated={:04X?} received={:04X?}",
            calculated,
            received
        );
        return Err(Error::ChecksumMismatch {
            stage: ChecksumStage::Record,
            calculated,
            received,
        });
    }
    Ok(())
}

/// Logical type of a response, taken from the second frame byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ResponseType {
    BasicInfo,
    CellVoltages,
    Unknown(u8),
}

impl ResponseType {
    pub fn code(&self) -> u8 {
        match self {
            ResponseType::BasicInfo => 0x03,
            ResponseType::CellVoltages => 0x04,
            ResponseType::Unknown(code) => *code,
        }
    }
}

impl From<u8> for ResponseType {
    fn from(code: u8) -> Self {
        match code {
            0x03 => ResponseType::BasicInfo,
            0x04 => ResponseType::CellVoltages,
            code => ResponseType::Unknown(code),
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResponseType::BasicInfo => write!(f, "basic info"),
            ResponseType::CellVoltages => write!(f, "cell voltages"),
            ResponseType::Unknown(code) => write!(f, "unknown (0x{code:02X})"),
        }
    }
}

/// A response frame that passed every wire level check.
///
/// Borrows the receive buffer; nothing outlives the buffer it was validated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    response_type: ResponseType,
    declared_length: u8,
    // payload followed by the two checksum bytes
    body: &'a [u8],
    checksum: u16,
}

impl<'a> Frame<'a> {
    /// Validates the bytes collected from the link.
    ///
    /// The checks run in a fixed order and stop at the first failure:
    /// minimum length, start byte, end byte, declared length, status,
    /// response type and finally the checksum.
    pub fn validate(rx_buffer: &'a [u8]) -> Result<Self, Error> {
        let received = rx_buffer.len();
        if received < MIN_FRAME_LENGTH {
            log::warn!("Incomplete frame - received={} bytes", received);
            return Err(Error::IncompleteFrame(received));
        }
        if rx_buffer[0] != START_BYTE {
            log::warn!("Invalid start byte - received={:02X?}", rx_buffer[0]);
            return Err(Error::InvalidStartByte(rx_buffer[0]));
        }
        if rx_buffer[received - 1] != END_BYTE {
            log::warn!("Invalid end byte - received={:02X?}", rx_buffer[received - 1]);
            return Err(Error::InvalidEndByte(rx_buffer[received - 1]));
        }

        let type_code = rx_buffer[1];
        let status = rx_buffer[2];
        let declared_length = rx_buffer[3];

        let expected = frame_length(declared_length);
        if received != expected {
            log::warn!(
                "Length mismatch - received={} expected={}",
                received,
                expected
            );
            return Err(Error::LengthMismatch { received, expected });
        }
        if status != STATUS_OK {
            log::warn!("Device status error - status={:02X?}", status);
            return Err(Error::DeviceStatusError(status));
        }
        let response_type = ResponseType::from(type_code);
        if let ResponseType::Unknown(code) = response_type {
            log::warn!("Unknown response type - type={:02X?}", code);
            return Err(Error::UnknownResponseType(code));
        }

        let payload_end = HEADER_LENGTH + usize::from(declared_length);
        let calculated = checksum(
            status,
            declared_length,
            &rx_buffer[HEADER_LENGTH..payload_end],
        );
        let transmitted = read_u16(rx_buffer, payload_end);
        if calculated != transmitted {
            log::warn!(
                "Invalid checksum - calculated={:04X?} received={:04X?} buffer={:02X?}",
                calculated,
                transmitted,
                rx_buffer
            );
            return Err(Error::ChecksumMismatch {
                stage: ChecksumStage::Frame,
                calculated,
                received: transmitted,
            });
        }

        log::trace!(
            "Valid frame - type={} length={}",
            response_type,
            declared_length
        );
        Ok(Self {
            response_type,
            declared_length,
            body: &rx_buffer[HEADER_LENGTH..payload_end + CHECKSUM_LENGTH],
            checksum: calculated,
        })
    }

    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }

    /// Payload length `N` as declared in the header.
    pub fn declared_length(&self) -> u8 {
        self.declared_length
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.body[..usize::from(self.declared_length)]
    }

    /// Payload together with the trailing checksum bytes, the region records are decoded from.
    pub fn body(&self) -> &'a [u8] {
        self.body
    }

    /// The checksum computed during validation.
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// Rejects a frame answering another request than the one of `expected` type.
    pub fn expect(self, expected: ResponseType) -> Result<Self, Error> {
        if self.response_type != expected {
            log::warn!(
                "Unexpected response - expected={} received={}",
                expected,
                self.response_type
            );
            return Err(Error::ResponseMismatch {
                expected,
                received: self.response_type,
            });
        }
        Ok(self)
    }

    pub fn decode(&self) -> Result<Response, Error> {
        Response::decode(
            self.response_type,
            self.body,
            self.declared_length,
            self.checksum,
        )
    }
}

/// A decoded response record.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Response {
    BasicInfo(BasicInfo),
    CellVoltages(CellVoltages),
}

impl Response {
    /// Decodes `body` (payload plus checksum bytes) as the record matching `response_type`.
    ///
    /// `checksum` is the value computed by [`Frame::validate`]; the record's own
    /// checksum field must agree with it.
    pub fn decode(
        response_type: ResponseType,
        body: &[u8],
        declared_length: u8,
        checksum: u16,
    ) -> Result<Self, Error> {
        match response_type {
            ResponseType::BasicInfo => Ok(Response::BasicInfo(BasicInfo::decode(body, checksum)?)),
            ResponseType::CellVoltages => Ok(Response::CellVoltages(CellVoltages::decode(
                body,
                declared_length,
                checksum,
            )?)),
            ResponseType::Unknown(code) => Err(Error::UnsupportedType(code)),
        }
    }
}

/// Manufacturing date packed into 16 bits: year since 2000, month and day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProductionDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl ProductionDate {
    pub fn from_raw(raw: u16) -> Self {
        Self {
            year: 2000 + (raw >> 9),
            month: ((raw >> 5) & 0x0F) as u8,
            day: (raw & 0x1F) as u8,
        }
    }
}

impl fmt::Display for ProductionDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Converts a temperature reading in 0.1 K to degree Celsius.
pub fn temperature_celsius(raw: u16) -> f32 {
    (i32::from(raw) - 2731) as f32 / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MosfetStatus {
    pub charging: bool,
    pub discharging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Protection {
    CellOvervoltage,
    CellUndervoltage,
    PackOvervoltage,
    PackUndervoltage,
    ChargeOvertemperature,
    ChargeUndertemperature,
    DischargeOvertemperature,
    DischargeUndertemperature,
    ChargeOvercurrent,
    DischargeOvercurrent,
    ShortCircuit,
    FrontEndIcError,
    SoftwareMosfetLock,
}

impl Protection {
    /// Decodes the protection status bitmap of a basic info record.
    pub fn decode(protection_status: u16) -> Vec<Self> {
        let mut result = Vec::new();

        macro_rules! ck_and_add {
            ($position:expr,$enum_type:expr) => {
                if read_bit!(protection_status, $position) {
                    result.push($enum_type);
                }
            };
        }

        ck_and_add!(0, Protection::CellOvervoltage);
        ck_and_add!(1, Protection::CellUndervoltage);
        ck_and_add!(2, Protection::PackOvervoltage);
        ck_and_add!(3, Protection::PackUndervoltage);
        ck_and_add!(4, Protection::ChargeOvertemperature);
        ck_and_add!(5, Protection::ChargeUndertemperature);
        ck_and_add!(6, Protection::DischargeOvertemperature);
        ck_and_add!(7, Protection::DischargeUndertemperature);
        ck_and_add!(8, Protection::ChargeOvercurrent);
        ck_and_add!(9, Protection::DischargeOvercurrent);
        ck_and_add!(10, Protection::ShortCircuit);
        ck_and_add!(11, Protection::FrontEndIcError);
        ck_and_add!(12, Protection::SoftwareMosfetLock);

        result
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protection::CellOvervoltage => write!(f, "Cell overvoltage protection"),
            Protection::CellUndervoltage => write!(f, "Cell undervoltage protection"),
            Protection::PackOvervoltage => write!(f, "Pack overvoltage protection"),
            Protection::PackUndervoltage => write!(f, "Pack undervoltage protection"),
            Protection::ChargeOvertemperature => write!(f, "Charging over temperature protection"),
            Protection::ChargeUndertemperature => {
                write!(f, "Charging low temperature protection")
            }
            Protection::DischargeOvertemperature => {
                write!(f, "Discharging over temperature protection")
            }
            Protection::DischargeUndertemperature => {
                write!(f, "Discharging low temperature protection")
            }
            Protection::ChargeOvercurrent => write!(f, "Charging overcurrent protection"),
            Protection::DischargeOvercurrent => write!(f, "Discharging overcurrent protection"),
            Protection::ShortCircuit => write!(f, "Short circuit protection"),
            Protection::FrontEndIcError => write!(f, "Front-end detection IC error"),
            Protection::SoftwareMosfetLock => write!(f, "Software locked MOSFET"),
        }
    }
}

/// Aggregate pack telemetry, response type 0x03.
///
/// Values are kept in the units the BMS sends them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BasicInfo {
    /// 10 mV
    pub total_voltage: u16,
    /// 10 mA, positive while charging
    pub current: i16,
    /// 10 mAh
    pub remaining_capacity: u16,
    /// 10 mAh
    pub nominal_capacity: u16,
    pub cycles: u16,
    /// Packed date, see [`ProductionDate::from_raw`]
    pub production_date: u16,
    /// One bit per cell
    pub balance_status: u32,
    pub protection_status: u16,
    pub software_version: u8,
    pub soc_percent: u8,
    pub mosfet_status: u8,
    /// Number of cells in series
    pub cell_count: u8,
    pub ntc_count: u8,
    /// Raw readings in 0.1 K, one per reported sensor, at most [`NTC_SLOTS`]
    pub temperatures: Vec<u16>,
    pub reserved: [u8; RESERVED_LENGTH],
    pub checksum: u16,
}

impl BasicInfo {
    pub fn request() -> [u8; REQUEST_LENGTH] {
        create_request(ResponseType::BasicInfo)
    }

    /// Validates `rx_buffer` as the answer to [`BasicInfo::request`] and decodes it.
    pub fn decode_response(rx_buffer: &[u8]) -> Result<Self, Error> {
        let frame = Frame::validate(rx_buffer)?.expect(ResponseType::BasicInfo)?;
        Self::decode(frame.body(), frame.checksum())
    }

    /// Decodes the payload and checksum bytes of a validated basic info frame.
    pub fn decode(body: &[u8], checksum: u16) -> Result<Self, Error> {
        if body.len() != BASIC_INFO_LENGTH + CHECKSUM_LENGTH {
            log::warn!(
                "Invalid basic info size - received={} expected={}",
                body.len().saturating_sub(CHECKSUM_LENGTH),
                BASIC_INFO_LENGTH
            );
            return Err(Error::PayloadSizeMismatch {
                received: body.len().saturating_sub(CHECKSUM_LENGTH),
                expected: BASIC_INFO_LENGTH,
            });
        }

        let ntc_count = body[22];
        if usize::from(ntc_count) > NTC_SLOTS {
            log::warn!(
                "BMS reports {} temperature sensors, only {} are transmitted",
                ntc_count,
                NTC_SLOTS
            );
        }
        let temperatures = (0..usize::from(ntc_count).min(NTC_SLOTS))
            .map(|n| read_u16(body, 23 + n * 2))
            .collect();
        let mut reserved = [0; RESERVED_LENGTH];
        reserved.copy_from_slice(&body[29..29 + RESERVED_LENGTH]);

        let info = Self {
            total_voltage: read_u16(body, 0),
            current: i16::from_be_bytes([body[2], body[3]]),
            remaining_capacity: read_u16(body, 4),
            nominal_capacity: read_u16(body, 6),
            cycles: read_u16(body, 8),
            production_date: read_u16(body, 10),
            balance_status: u32::from_be_bytes([body[12], body[13], body[14], body[15]]),
            protection_status: read_u16(body, 16),
            software_version: body[18],
            soc_percent: body[19],
            mosfet_status: body[20],
            cell_count: body[21],
            ntc_count,
            temperatures,
            reserved,
            checksum: read_u16(body, BASIC_INFO_LENGTH),
        };
        verify_record_checksum(checksum, info.checksum)?;
        log::trace!("Decoded basic info: {:?}", info);
        Ok(info)
    }

    /// Raw temperature readings in 0.1 K, one per reported sensor, at most [`NTC_SLOTS`].
    pub fn temperatures_raw(&self) -> &[u16] {
        &self.temperatures
    }

    pub fn temperatures_celsius(&self) -> Vec<f32> {
        self.temperatures_raw()
            .iter()
            .map(|raw| temperature_celsius(*raw))
            .collect()
    }

    pub fn date(&self) -> ProductionDate {
        ProductionDate::from_raw(self.production_date)
    }

    pub fn mosfets(&self) -> MosfetStatus {
        MosfetStatus {
            charging: read_bit!(self.mosfet_status, 0),
            discharging: read_bit!(self.mosfet_status, 1),
        }
    }

    /// Whether the zero based `cell` is currently balancing.
    pub fn is_balancing(&self, cell: u8) -> bool {
        cell < 32 && read_bit!(self.balance_status, cell)
    }

    pub fn protections(&self) -> Vec<Protection> {
        Protection::decode(self.protection_status)
    }
}

/// Per cell voltages in mV, response type 0x04.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellVoltages {
    pub voltages: Vec<u16>,
    pub checksum: u16,
}

impl CellVoltages {
    pub fn request() -> [u8; REQUEST_LENGTH] {
        create_request(ResponseType::CellVoltages)
    }

    /// Validates `rx_buffer` as the answer to [`CellVoltages::request`] and decodes it.
    pub fn decode_response(rx_buffer: &[u8]) -> Result<Self, Error> {
        let frame = Frame::validate(rx_buffer)?.expect(ResponseType::CellVoltages)?;
        Self::decode(frame.body(), frame.declared_length(), frame.checksum())
    }

    /// Decodes the payload and checksum bytes of a validated cell voltage frame.
    ///
    /// The cell count is `declared_length / 2`; odd lengths and more than
    /// [`MAX_CELLS`] cells are rejected.
    pub fn decode(body: &[u8], declared_length: u8, checksum: u16) -> Result<Self, Error> {
        let length = usize::from(declared_length);
        if length % 2 != 0 || length / 2 > MAX_CELLS {
            log::warn!("Malformed cell voltage payload - length={}", length);
            return Err(Error::MalformedCellPayload(declared_length));
        }
        if body.len() != length + CHECKSUM_LENGTH {
            log::warn!(
                "Invalid cell voltage size - received={} expected={}",
                body.len().saturating_sub(CHECKSUM_LENGTH),
                length
            );
            return Err(Error::PayloadSizeMismatch {
                received: body.len().saturating_sub(CHECKSUM_LENGTH),
                expected: length,
            });
        }

        let voltages: Vec<u16> = body[..length]
            .chunks_exact(2)
            .map(|cell| u16::from_be_bytes([cell[0], cell[1]]))
            .collect();
        for (n, voltage) in voltages.iter().enumerate() {
            log::trace!("Cell #{} mV={}", n + 1, voltage);
        }
        let cells = Self {
            voltages,
            checksum: read_u16(body, length),
        };
        verify_record_checksum(checksum, cells.checksum)?;
        Ok(cells)
    }

    pub fn volts(&self) -> Vec<f32> {
        self.voltages.iter().map(|mv| *mv as f32 / 1000.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_frame(type_code: u8, status: u8, payload: &[u8]) -> Vec<u8> {
        let length = payload.len() as u8;
        let mut frame = vec![START_BYTE, type_code, status, length];
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&checksum(status, length, payload).to_be_bytes());
        frame.push(END_BYTE);
        frame
    }

    fn basic_info_payload() -> Vec<u8> {
        let mut payload = vec![
            0x18, 0x20, // total voltage
            0xFF, 0x38, // current
            0x0F, 0xA0, // remaining capacity
            0x13, 0x88, // nominal capacity
            0x00, 0x05, // cycles
            0x4A, 0x21, // production date
            0x00, 0x00, 0x00, 0x05, // balance
            0x04, 0x01, // protection
            0x10, // software version
            0x50, // soc
            0x02, // mosfet
            0x04, // cells
            0x02, // ntc count
            0x0B, 0xA5, 0x0B, 0x9B, 0xAA, 0xAA, // ntc
        ];
        payload.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        payload
    }

    #[test]
    fn checksum_test() {
        assert_eq!(checksum(0x00, 0x00, &[]), 0x0000);
        assert_eq!(checksum(0x03, 0x00, &[]), 0xFFFD);
        assert_eq!(checksum(0x04, 0x00, &[]), 0xFFFC);
        assert_eq!(checksum(0x00, 0x04, &[0x0D, 0x05, 0x0D, 0x06]), 0xFFD7);
        // 257 * 0xFF = 0xFFFF, negated wraps to 1
        assert_eq!(checksum(0xFF, 0xFF, &[0xFF; 255]), 0x0001);
    }

    #[test]
    fn request_test() {
        assert_eq!(
            BasicInfo::request(),
            [0xDD, 0xA5, 0x03, 0x00, 0xFF, 0xFD, 0x77]
        );
        assert_eq!(
            CellVoltages::request(),
            [0xDD, 0xA5, 0x04, 0x00, 0xFF, 0xFC, 0x77]
        );
    }

    #[test]
    fn response_type_test() {
        assert_eq!(ResponseType::from(0x03), ResponseType::BasicInfo);
        assert_eq!(ResponseType::from(0x04), ResponseType::CellVoltages);
        assert_eq!(ResponseType::from(0xA5), ResponseType::Unknown(0xA5));
        assert_eq!(ResponseType::Unknown(0xA5).code(), 0xA5);
    }

    #[test]
    fn expected_frame_length_test() {
        assert_eq!(expected_frame_length(&[]), None);
        assert_eq!(expected_frame_length(&[0xDD, 0x03, 0x00]), None);
        assert_eq!(expected_frame_length(&[0xDC, 0x03, 0x00, 0x26]), None);
        assert_eq!(expected_frame_length(&[0xDD, 0x03, 0x00, 0x26]), Some(45));
        assert_eq!(expected_frame_length(&[0xDD, 0x04, 0x00, 0x00, 0x00]), Some(7));
    }

    #[test]
    fn basic_info_test() {
        let rx_buffer = build_frame(0x03, 0x00, &basic_info_payload());
        assert_eq!(rx_buffer.len(), 45);
        let frame = Frame::validate(&rx_buffer).unwrap();
        assert_eq!(frame.response_type(), ResponseType::BasicInfo);
        assert_eq!(frame.declared_length(), 38);
        assert_eq!(frame.payload(), &basic_info_payload()[..]);

        let info = match frame.decode().unwrap() {
            Response::BasicInfo(info) => info,
            other => panic!("unexpected response {other:?}"),
        };
        assert_eq!(info.total_voltage, 6176);
        assert_eq!(info.current, -200);
        assert_eq!(info.remaining_capacity, 4000);
        assert_eq!(info.nominal_capacity, 5000);
        assert_eq!(info.cycles, 5);
        assert_eq!(info.production_date, 0x4A21);
        assert_eq!(info.balance_status, 5);
        assert_eq!(info.protection_status, 0x0401);
        assert_eq!(info.software_version, 0x10);
        assert_eq!(info.soc_percent, 80);
        assert_eq!(info.mosfet_status, 0x02);
        assert_eq!(info.cell_count, 4);
        assert_eq!(info.ntc_count, 2);
        assert_eq!(info.temperatures_raw(), &[2981, 2971]);
        assert_eq!(info.temperatures_celsius(), vec![25.0, 24.0]);
        assert_eq!(info.reserved, [1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(info.checksum, frame.checksum());

        assert_eq!(
            info.mosfets(),
            MosfetStatus {
                charging: false,
                discharging: true
            }
        );
        assert!(info.is_balancing(0));
        assert!(!info.is_balancing(1));
        assert!(info.is_balancing(2));
        assert!(!info.is_balancing(40));
        assert_eq!(
            info.protections(),
            vec![Protection::CellOvervoltage, Protection::ShortCircuit]
        );
    }

    #[test]
    fn basic_info_ntc_count_exceeds_slots_test() {
        let mut payload = basic_info_payload();
        payload[22] = 5;
        let rx_buffer = build_frame(0x03, 0x00, &payload);
        let frame = Frame::validate(&rx_buffer).unwrap();
        let info = BasicInfo::decode(frame.body(), frame.checksum()).unwrap();
        assert_eq!(info.ntc_count, 5);
        assert_eq!(info.temperatures_raw(), &[2981, 2971, 0xAAAA]);
        assert_eq!(info.temperatures_celsius().len(), NTC_SLOTS);
    }

    #[test]
    fn basic_info_unreported_slots_hidden_test() {
        let mut payload = basic_info_payload();
        payload[22] = 1;
        let rx_buffer = build_frame(0x03, 0x00, &payload);
        let frame = Frame::validate(&rx_buffer).unwrap();
        let info = BasicInfo::decode(frame.body(), frame.checksum()).unwrap();
        assert_eq!(info.temperatures, vec![2981]);
        assert_eq!(info.temperatures_raw(), &[2981]);
        // the second and third slot carry data on the wire but no sensor is reported
        let debug = format!("{info:?}");
        assert!(debug.contains("temperatures: [2981]"));
        assert!(!debug.contains("2971"));
        assert!(!debug.contains(&0xAAAAu16.to_string()));
    }

    #[test]
    fn basic_info_without_sensors_test() {
        let mut payload = basic_info_payload();
        payload[22] = 0;
        let rx_buffer = build_frame(0x03, 0x00, &payload);
        let frame = Frame::validate(&rx_buffer).unwrap();
        let info = BasicInfo::decode(frame.body(), frame.checksum()).unwrap();
        assert!(info.temperatures_raw().is_empty());
    }

    #[test]
    fn basic_info_size_test() {
        let payload = &basic_info_payload()[..36];
        let rx_buffer = build_frame(0x03, 0x00, payload);
        let frame = Frame::validate(&rx_buffer).unwrap();
        assert!(matches!(
            frame.decode(),
            Err(Error::PayloadSizeMismatch {
                received: 36,
                expected: 38
            })
        ));
    }

    #[test]
    fn record_checksum_test() {
        let rx_buffer = build_frame(0x03, 0x00, &basic_info_payload());
        let frame = Frame::validate(&rx_buffer).unwrap();
        let calculated = frame.checksum() ^ 0x0001;
        assert_eq!(
            BasicInfo::decode(frame.body(), calculated),
            Err(Error::ChecksumMismatch {
                stage: ChecksumStage::Record,
                calculated,
                received: frame.checksum(),
            })
        );

        let rx_buffer = build_frame(0x04, 0x00, &[0x0D, 0x05]);
        let frame = Frame::validate(&rx_buffer).unwrap();
        assert!(matches!(
            CellVoltages::decode(frame.body(), 2, frame.checksum().wrapping_add(1)),
            Err(Error::ChecksumMismatch {
                stage: ChecksumStage::Record,
                ..
            })
        ));
    }

    #[test]
    fn cell_voltages_test() {
        let rx_buffer = [
            0xDD, 0x04, 0x00, 0x04, 0x0D, 0x05, 0x0D, 0x06, 0xFF, 0xD7, 0x77,
        ];
        let frame = Frame::validate(&rx_buffer).unwrap();
        assert_eq!(frame.response_type(), ResponseType::CellVoltages);
        let cells = match frame.decode().unwrap() {
            Response::CellVoltages(cells) => cells,
            other => panic!("unexpected response {other:?}"),
        };
        assert_eq!(cells.voltages, vec![3333, 3334]);
        assert_eq!(cells.checksum, 0xFFD7);
        assert_eq!(cells.volts(), vec![3.333, 3.334]);
    }

    #[test]
    fn cell_voltages_full_pack_test() {
        let payload = [
            0x0C, 0xE4, 0x0C, 0xE5, 0x0C, 0xE6, 0x0C, 0xE7, 0x0C, 0xE8, 0x0C, 0xE9,
        ];
        let rx_buffer = build_frame(0x04, 0x00, &payload);
        let frame = Frame::validate(&rx_buffer).unwrap();
        let cells = CellVoltages::decode(frame.body(), frame.declared_length(), frame.checksum())
            .unwrap();
        assert_eq!(cells.voltages, vec![3300, 3301, 3302, 3303, 3304, 3305]);

        let rx_buffer = build_frame(0x04, 0x00, &[]);
        let frame = Frame::validate(&rx_buffer).unwrap();
        assert_eq!(
            frame.decode().unwrap(),
            Response::CellVoltages(CellVoltages {
                voltages: vec![],
                checksum: 0x0000,
            })
        );
    }

    #[test]
    fn cell_voltages_odd_length_test() {
        let rx_buffer = build_frame(0x04, 0x00, &[0x0D, 0x05, 0x0D]);
        let frame = Frame::validate(&rx_buffer).unwrap();
        assert_eq!(frame.decode(), Err(Error::MalformedCellPayload(3)));
    }

    #[test]
    fn cell_voltages_too_many_cells_test() {
        let rx_buffer = build_frame(0x04, 0x00, &[0x0D; 14]);
        let frame = Frame::validate(&rx_buffer).unwrap();
        assert_eq!(frame.decode(), Err(Error::MalformedCellPayload(14)));
    }

    #[test]
    fn unsupported_type_test() {
        assert_eq!(
            Response::decode(ResponseType::Unknown(0x05), &[0xFF, 0xFB], 0, 0xFFFB),
            Err(Error::UnsupportedType(0x05))
        );
    }

    #[test]
    fn validate_errors_test() {
        let valid = build_frame(0x04, 0x00, &[0x0D, 0x05, 0x0D, 0x06]);
        assert!(Frame::validate(&valid).is_ok());

        assert_eq!(
            Frame::validate(&[0xDD, 0x03, 0x00, 0x77]),
            Err(Error::IncompleteFrame(4))
        );
        assert_eq!(Frame::validate(&[]), Err(Error::IncompleteFrame(0)));

        let mut rx_buffer = valid.clone();
        rx_buffer[0] = 0xDC;
        assert_eq!(
            Frame::validate(&rx_buffer),
            Err(Error::InvalidStartByte(0xDC))
        );

        let mut rx_buffer = valid.clone();
        let last = rx_buffer.len() - 1;
        rx_buffer[last] = 0x78;
        assert_eq!(Frame::validate(&rx_buffer), Err(Error::InvalidEndByte(0x78)));

        let mut rx_buffer = valid.clone();
        rx_buffer[3] = 6;
        assert_eq!(
            Frame::validate(&rx_buffer),
            Err(Error::LengthMismatch {
                received: 11,
                expected: 13
            })
        );

        let rx_buffer = build_frame(0x03, 0x80, &[]);
        assert_eq!(
            Frame::validate(&rx_buffer),
            Err(Error::DeviceStatusError(0x80))
        );

        let rx_buffer = build_frame(0x05, 0x00, &[0x01]);
        assert_eq!(
            Frame::validate(&rx_buffer),
            Err(Error::UnknownResponseType(0x05))
        );

        let mut rx_buffer = valid.clone();
        rx_buffer[8] ^= 0xFF;
        assert_eq!(
            Frame::validate(&rx_buffer),
            Err(Error::ChecksumMismatch {
                stage: ChecksumStage::Frame,
                calculated: 0xFFD7,
                received: 0x00D7,
            })
        );
    }

    #[test]
    fn validate_order_test() {
        // start byte is checked before end byte
        assert_eq!(
            Frame::validate(&[0x00, 0x03, 0x00, 0x00, 0xFF, 0xFD, 0x00]),
            Err(Error::InvalidStartByte(0x00))
        );
        // length before status
        assert_eq!(
            Frame::validate(&[0xDD, 0x03, 0x80, 0x01, 0xFF, 0x7F, 0x77]),
            Err(Error::LengthMismatch {
                received: 7,
                expected: 8
            })
        );
        // status before type
        let rx_buffer = build_frame(0x09, 0x01, &[]);
        assert_eq!(
            Frame::validate(&rx_buffer),
            Err(Error::DeviceStatusError(0x01))
        );
        // type before checksum
        let mut rx_buffer = build_frame(0x09, 0x00, &[]);
        rx_buffer[5] ^= 0x01;
        assert_eq!(
            Frame::validate(&rx_buffer),
            Err(Error::UnknownResponseType(0x09))
        );
    }

    #[test]
    fn expect_response_type_test() {
        let rx_buffer = build_frame(0x04, 0x00, &[0x0D, 0x05, 0x0D, 0x06]);
        let frame = Frame::validate(&rx_buffer).unwrap();
        assert_eq!(
            frame.expect(ResponseType::CellVoltages),
            Ok(frame)
        );
        assert_eq!(
            frame.expect(ResponseType::BasicInfo),
            Err(Error::ResponseMismatch {
                expected: ResponseType::BasicInfo,
                received: ResponseType::CellVoltages
            })
        );
    }

    #[test]
    fn decode_response_test() {
        let cell_frame = build_frame(0x04, 0x00, &[0x0D, 0x05, 0x0D, 0x06]);
        let basic_frame = build_frame(0x03, 0x00, &basic_info_payload());

        let cells = CellVoltages::decode_response(&cell_frame).unwrap();
        assert_eq!(cells.voltages, vec![3333, 3334]);
        let info = BasicInfo::decode_response(&basic_frame).unwrap();
        assert_eq!(info.ntc_count, 2);

        assert_eq!(
            BasicInfo::decode_response(&cell_frame),
            Err(Error::ResponseMismatch {
                expected: ResponseType::BasicInfo,
                received: ResponseType::CellVoltages
            })
        );
        assert_eq!(
            CellVoltages::decode_response(&basic_frame),
            Err(Error::ResponseMismatch {
                expected: ResponseType::CellVoltages,
                received: ResponseType::BasicInfo
            })
        );
        // frame validation runs before the type check
        assert_eq!(
            BasicInfo::decode_response(&cell_frame[..5]),
            Err(Error::IncompleteFrame(5))
        );
    }

    #[test]
    fn request_is_not_a_response_test() {
        // the request carries the command where a response carries its status
        assert_eq!(
            Frame::validate(&BasicInfo::request()),
            Err(Error::DeviceStatusError(0x03))
        );
    }

    #[test]
    fn single_bit_corruption_test() {
        let valid = build_frame(0x03, 0x00, &basic_info_payload());
        for byte in HEADER_LENGTH..HEADER_LENGTH + BASIC_INFO_LENGTH {
            for bit in 0..8 {
                let mut rx_buffer = valid.clone();
                rx_buffer[byte] ^= 1 << bit;
                assert!(
                    matches!(
                        Frame::validate(&rx_buffer),
                        Err(Error::ChecksumMismatch {
                            stage: ChecksumStage::Frame,
                            ..
                        })
                    ),
                    "corruption of byte {byte} bit {bit} not detected"
                );
            }
        }
    }

    #[test]
    fn production_date_test() {
        let date = ProductionDate::from_raw(0x4A21);
        assert_eq!(
            date,
            ProductionDate {
                year: 2000 + (0x4A21 >> 9),
                month: ((0x4A21 >> 5) & 0xF) as u8,
                day: (0x4A21 & 0x1F) as u8,
            }
        );
        assert_eq!(date.to_string(), "2037-01-01");

        let date = ProductionDate::from_raw((23 << 9) | (7 << 5) | 15);
        assert_eq!(date.to_string(), "2023-07-15");
    }

    #[test]
    fn temperature_test() {
        assert_eq!(temperature_celsius(2731), 0.0);
        assert_eq!(temperature_celsius(2981), 25.0);
        assert_eq!(temperature_celsius(2631), -10.0);
    }

    #[test]
    fn protection_test() {
        assert!(Protection::decode(0).is_empty());
        assert_eq!(
            Protection::decode(0x1300),
            vec![
                Protection::ChargeOvercurrent,
                Protection::DischargeOvercurrent,
                Protection::SoftwareMosfetLock
            ]
        );
        assert_eq!(Protection::decode(0xFFFF).len(), 13);
        assert_eq!(
            Protection::ShortCircuit.to_string(),
            "Short circuit protection"
        );
    }
}
