use crate::checksum;
use crate::error::Error;
use crate::prelude::*;

use enum_dispatch::*;
use nom_derive::{Nom, Parse};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::convert::TryFrom;

pub const MIN_RESPONSE_LEN: usize = 5;
pub const MAX_READ_COUNT: u16 = 125;
pub const MAX_WRITE_COUNT: usize = 123;

const EXCEPTION_BIT: u8 = 0x80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FunctionCode {
    ReadHoldingRegisters = 0x03,
    WriteMultipleRegisters = 0x10,
}

#[enum_dispatch]
pub trait FrameCommon {
    fn slave_id(&self) -> u8;
    fn function(&self) -> FunctionCode;
    fn register(&self) -> u16;
    fn count(&self) -> u16;
    /// The complete ADU, checksum included.
    fn bytes(&self) -> Vec<u8>;
}

#[enum_dispatch(FrameCommon)]
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    ReadHolding(ReadHolding),
    WriteMultiple(WriteMultiple),
}

fn check_slave_id(slave_id: u8) -> Result<(), Error> {
    if !(1..=247).contains(&slave_id) {
        return Err(Error::InvalidFrameArgument(format!(
            "slave id {} outside 1..=247",
            slave_id
        )));
    }
    Ok(())
}

// {{{ ReadHolding
#[derive(Clone, Debug, PartialEq)]
pub struct ReadHolding {
    slave_id: u8,
    register: u16,
    count: u16,
}

impl ReadHolding {
    pub fn new(slave_id: u8, register: u16, count: u16) -> Result<Self, Error> {
        check_slave_id(slave_id)?;
        if !(1..=MAX_READ_COUNT).contains(&count) {
            return Err(Error::InvalidFrameArgument(format!(
                "read count {} outside 1..={}",
                count, MAX_READ_COUNT
            )));
        }
        if u32::from(register) + u32::from(count) > 0x1_0000 {
            return Err(Error::InvalidFrameArgument(format!(
                "read of {} registers from {} runs past 65535",
                count, register
            )));
        }

        Ok(Self {
            slave_id,
            register,
            count,
        })
    }
}

impl FrameCommon for ReadHolding {
    fn slave_id(&self) -> u8 {
        self.slave_id
    }

    fn function(&self) -> FunctionCode {
        FunctionCode::ReadHoldingRegisters
    }

    fn register(&self) -> u16 {
        self.register
    }

    fn count(&self) -> u16 {
        self.count
    }

    fn bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(6);
        data.push(self.slave_id);
        data.push(self.function().into());
        data.extend_from_slice(&self.register.to_be_bytes());
        data.extend_from_slice(&self.count.to_be_bytes());

        checksum::append_crc(&data)
    }
} // }}}

// {{{ WriteMultiple
#[derive(Clone, Debug, PartialEq)]
pub struct WriteMultiple {
    slave_id: u8,
    register: u16,
    values: Vec<u16>,
}

impl WriteMultiple {
    pub fn new(slave_id: u8, register: u16, values: Vec<u16>) -> Result<Self, Error> {
        check_slave_id(slave_id)?;
        if values.is_empty() || values.len() > MAX_WRITE_COUNT {
            return Err(Error::InvalidFrameArgument(format!(
                "write of {} values outside 1..={}",
                values.len(),
                MAX_WRITE_COUNT
            )));
        }
        if u32::from(register) + values.len() as u32 > 0x1_0000 {
            return Err(Error::InvalidFrameArgument(format!(
                "write of {} registers from {} runs past 65535",
                values.len(),
                register
            )));
        }

        Ok(Self {
            slave_id,
            register,
            values,
        })
    }

    pub fn values(&self) -> &[u16] {
        &self.values
    }
}

impl FrameCommon for WriteMultiple {
    fn slave_id(&self) -> u8 {
        self.slave_id
    }

    fn function(&self) -> FunctionCode {
        FunctionCode::WriteMultipleRegisters
    }

    fn register(&self) -> u16 {
        self.register
    }

    fn count(&self) -> u16 {
        // bounded by MAX_WRITE_COUNT in new()
        self.values.len() as u16
    }

    fn bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(7 + self.values.len() * 2);
        data.push(self.slave_id);
        data.push(self.function().into());
        data.extend_from_slice(&self.register.to_be_bytes());
        data.extend_from_slice(&self.count().to_be_bytes());
        data.push((self.values.len() * 2) as u8);
        for value in &self.values {
            data.extend_from_slice(&value.to_be_bytes());
        }

        checksum::append_crc(&data)
    }
} // }}}

/// Contiguous span of holding registers read in one exchange.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedRegisterBlock {
    start: u16,
    values: Vec<u16>,
}

impl DecodedRegisterBlock {
    pub fn new(start: u16, values: Vec<u16>) -> Self {
        Self { start, values }
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn values(&self) -> &[u16] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at absolute `address`, if the block covers it.
    pub fn get(&self, address: u16) -> Option<u16> {
        let offset = address.checked_sub(self.start)?;
        self.values.get(usize::from(offset)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(i, v)| (self.start.wrapping_add(i as u16), *v))
    }
}

#[derive(Clone, Debug, PartialEq, Nom)]
#[nom(BigEndian)]
struct ResponseHeader {
    slave_id: u8,
    function: u8,
    byte_count: u8,
}

#[derive(Clone, Debug, PartialEq, Nom)]
#[nom(BigEndian)]
struct WriteEcho {
    slave_id: u8,
    function: u8,
    register: u16,
    count: u16,
}

/// Steps 1-4 of response validation: length, checksum, slave id, function.
fn validate_frame(slave_id: u8, function: FunctionCode, response: &[u8]) -> Result<(), Error> {
    if response.len() < MIN_RESPONSE_LEN {
        return Err(Error::ShortResponse {
            len: response.len(),
            min: MIN_RESPONSE_LEN,
        });
    }

    let (data, tail) = response.split_at(response.len() - 2);
    let received = checksum::wire_crc([tail[0], tail[1]]);
    let calculated = checksum::crc16(data);
    if received != calculated {
        return Err(Error::ChecksumMismatch {
            received,
            calculated,
        });
    }

    let (got_slave, got_function) = (response[0], response[1]);
    if got_slave != slave_id {
        return Err(Error::UnexpectedSlaveId {
            expected: slave_id,
            got: got_slave,
        });
    }

    let expected: u8 = function.into();
    if got_function != expected {
        if got_function & EXCEPTION_BIT != 0 {
            return Err(Error::DeviceException {
                function: got_function & !EXCEPTION_BIT,
                exception_code: response[2],
            });
        }
        return Err(Error::UnexpectedFunctionCode {
            expected,
            got: got_function,
        });
    }

    Ok(())
}

/// Validates a Read-Holding-Registers response and returns its registers
/// keyed from `register`. With `expected_count` set the byte count must
/// also match `2 * expected_count`.
pub fn decode_read_response(
    slave_id: u8,
    register: u16,
    expected_count: Option<u16>,
    response: &[u8],
) -> Result<DecodedRegisterBlock, Error> {
    validate_frame(slave_id, FunctionCode::ReadHoldingRegisters, response)?;

    let data = &response[..response.len() - 2];
    let (payload, header) = ResponseHeader::parse(data).map_err(|_| Error::ShortResponse {
        len: response.len(),
        min: MIN_RESPONSE_LEN,
    })?;

    let byte_count = usize::from(header.byte_count);
    let mismatch = || Error::RegisterCountMismatch {
        byte_count,
        payload_len: payload.len(),
        expected_registers: expected_count,
    };

    if byte_count != payload.len() || byte_count % 2 != 0 {
        return Err(mismatch());
    }
    if let Some(count) = expected_count {
        if byte_count != usize::from(count) * 2 {
            return Err(mismatch());
        }
    }

    let (_, values) = nom::multi::count(
        nom::number::complete::be_u16::<_, nom::error::Error<&[u8]>>,
        byte_count / 2,
    )(payload)
    .map_err(|_| mismatch())?;

    trace!(
        "decoded {} registers from {} (slave {})",
        values.len(),
        register,
        slave_id
    );

    Ok(DecodedRegisterBlock::new(register, values))
}

/// Validates a Write-Multiple-Registers response, which echoes the start
/// register and count of the request.
pub fn decode_write_response(request: &WriteMultiple, response: &[u8]) -> Result<(), Error> {
    validate_frame(
        request.slave_id(),
        FunctionCode::WriteMultipleRegisters,
        response,
    )?;

    let data = &response[..response.len() - 2];
    let (rest, echo) = WriteEcho::parse(data).map_err(|_| Error::ShortResponse {
        len: response.len(),
        min: 8,
    })?;
    if !rest.is_empty() {
        return Err(Error::RegisterCountMismatch {
            byte_count: rest.len(),
            payload_len: data.len(),
            expected_registers: Some(request.count()),
        });
    }

    if echo.register != request.register() {
        return Err(Error::UnexpectedStartRegister {
            expected: request.register(),
            got: echo.register,
        });
    }
    if echo.count != request.count() {
        return Err(Error::RegisterCountMismatch {
            byte_count: usize::from(echo.count) * 2,
            payload_len: request.values().len() * 2,
            expected_registers: Some(request.count()),
        });
    }

    Ok(())
}

impl TryFrom<&[u8]> for Request {
    type Error = anyhow::Error;

    /// Parses a request frame back from the wire (checksum verified).
    fn try_from(input: &[u8]) -> Result<Self> {
        if input.len() < 8 {
            bail!("request frame too short: {} bytes", input.len());
        }
        let (data, tail) = input.split_at(input.len() - 2);
        if checksum::wire_crc([tail[0], tail[1]]) != checksum::crc16(data) {
            bail!("request frame checksum mismatch");
        }

        let slave_id = data[0];
        let register = u16::from_be_bytes([data[2], data[3]]);
        let count = u16::from_be_bytes([data[4], data[5]]);

        let r = match FunctionCode::try_from(data[1])? {
            FunctionCode::ReadHoldingRegisters => {
                Request::ReadHolding(ReadHolding::new(slave_id, register, count)?)
            }
            FunctionCode::WriteMultipleRegisters => {
                let values = data
                    .get(7..)
                    .unwrap_or_default()
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect::<Vec<_>>();
                if values.len() != usize::from(count) {
                    bail!("write frame declares {} registers, carries {}", count, values.len());
                }
                Request::WriteMultiple(WriteMultiple::new(slave_id, register, values)?)
            }
        };

        Ok(r)
    }
}
