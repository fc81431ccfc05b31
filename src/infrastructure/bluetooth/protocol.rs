//! Binary record codec
//!
//! Decoders for the glucose profile characteristics and the RACP, and
//! encoders for the commands this crate writes. Every multi-byte field is
//! little-endian. Reads go through [`ByteReader`], which fails with
//! [`DecodeError::TooShort`] instead of running past the buffer.

use crate::domain::error::DecodeError;
use crate::domain::glucose::{
    BaseTime, Carbohydrate, CarbohydrateId, ConcentrationUnit, Exercise, GlucoseConcentration,
    GlucoseReading, GlucoseReadingContext, Health, Meal, Medication, MedicationId,
    MedicationUnit, SFloat, SampleLocation, SampleType, SensorStatus, Tester,
};
use crate::domain::racp::{OpCode, Operator, RacpCommand, RacpResponse, ResponseCode};
use crate::domain::uart::{CommandIcon, CommandKind, UartCommand};
use tracing::trace;

/// Glucose Measurement flag bits
pub mod measurement_flags {
    pub const TIME_OFFSET: u8 = 0x01;
    pub const CONCENTRATION: u8 = 0x02;
    /// Set: mol/L, clear: kg/L
    pub const UNIT_MOL_PER_L: u8 = 0x04;
    pub const SENSOR_STATUS: u8 = 0x08;
    pub const CONTEXT_FOLLOWS: u8 = 0x10;
}

/// Glucose Measurement Context flag bits
pub mod context_flags {
    pub const CARBOHYDRATE: u8 = 0x01;
    pub const MEAL: u8 = 0x02;
    pub const TESTER_HEALTH: u8 = 0x04;
    pub const EXERCISE: u8 = 0x08;
    pub const MEDICATION: u8 = 0x10;
    /// Set: litres, clear: kilograms
    pub const MEDICATION_UNIT_LITRES: u8 = 0x20;
    pub const HBA1C: u8 = 0x40;
    pub const EXTENDED_FLAGS: u8 = 0x80;
}

/// Bounds-checked little-endian cursor over a notification value
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::TooShort {
                expected: self.pos + n,
                actual: self.bytes.len(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_sfloat(&mut self) -> Result<SFloat, DecodeError> {
        Ok(SFloat::from_raw(self.read_u16()?))
    }

    /// Everything not consumed yet
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        rest
    }
}

fn require_len(bytes: &[u8], expected: usize) -> Result<(), DecodeError> {
    if bytes.len() < expected {
        return Err(DecodeError::TooShort {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Minimum length of a Glucose Measurement value with the given flags
///
/// ```text
/// [flags:1][seq:2][base time:7]          always         10
/// [time offset:2]                        TIME_OFFSET    +2
/// [concentration:2][type|location:1]     CONCENTRATION  +3
/// [sensor status:2]                      SENSOR_STATUS  +2
/// ```
pub fn glucose_reading_len(flags: u8) -> usize {
    use measurement_flags::*;

    let mut len = 1 + 2 + 7;
    if flags & TIME_OFFSET != 0 {
        len += 2;
    }
    if flags & CONCENTRATION != 0 {
        len += 3;
    }
    if flags & SENSOR_STATUS != 0 {
        len += 2;
    }
    len
}

/// Minimum length of a Glucose Measurement Context value with the given flags
///
/// ```text
/// [flags:1][seq:2]                       always          3
/// [extended flags:1]                     EXTENDED_FLAGS +1
/// [carb id:1][carb:2]                    CARBOHYDRATE   +3
/// [meal:1]                               MEAL           +1
/// [tester|health:1]                      TESTER_HEALTH  +1
/// [duration:2][intensity:1]              EXERCISE       +3
/// [medication id:1][medication:2]        MEDICATION     +3
/// [hba1c:2]                              HBA1C          +2
/// ```
pub fn glucose_context_len(flags: u8) -> usize {
    use context_flags::*;

    let mut len = 1 + 2;
    if flags & EXTENDED_FLAGS != 0 {
        len += 1;
    }
    if flags & CARBOHYDRATE != 0 {
        len += 3;
    }
    if flags & MEAL != 0 {
        len += 1;
    }
    if flags & TESTER_HEALTH != 0 {
        len += 1;
    }
    if flags & EXERCISE != 0 {
        len += 3;
    }
    if flags & MEDICATION != 0 {
        len += 3;
    }
    if flags & HBA1C != 0 {
        len += 2;
    }
    len
}

fn read_base_time(reader: &mut ByteReader<'_>) -> Result<BaseTime, DecodeError> {
    Ok(BaseTime {
        year: reader.read_u16()?,
        month: reader.read_u8()?,
        day: reader.read_u8()?,
        hours: reader.read_u8()?,
        minutes: reader.read_u8()?,
        seconds: reader.read_u8()?,
    })
}

/// Parse a Glucose Measurement (0x2A18) value
pub fn decode_glucose_reading(bytes: &[u8]) -> Result<GlucoseReading, DecodeError> {
    use measurement_flags::*;

    #[cfg(debug_assertions)]
    trace!("Raw measurement: {:02X?}", bytes);

    let mut reader = ByteReader::new(bytes);
    let flags = reader.read_u8()?;
    require_len(bytes, glucose_reading_len(flags))?;

    let sequence_number = reader.read_u16()?;
    let base_time = read_base_time(&mut reader)?;

    let time_offset = if flags & TIME_OFFSET != 0 {
        Some(reader.read_i16()?)
    } else {
        None
    };

    let concentration = if flags & CONCENTRATION != 0 {
        let value = reader.read_sfloat()?;
        let type_location = reader.read_u8()?;
        let unit = if flags & UNIT_MOL_PER_L != 0 {
            ConcentrationUnit::MolesPerLitre
        } else {
            ConcentrationUnit::KilogramsPerLitre
        };
        Some(GlucoseConcentration {
            value,
            unit,
            sample_type: SampleType::from_raw(type_location & 0x0F),
            location: SampleLocation::from_raw(type_location >> 4),
        })
    } else {
        None
    };

    let sensor_status = if flags & SENSOR_STATUS != 0 {
        Some(SensorStatus(reader.read_u16()?))
    } else {
        None
    };

    Ok(GlucoseReading {
        sequence_number,
        base_time,
        time_offset,
        concentration,
        sensor_status,
        context_follows: flags & CONTEXT_FOLLOWS != 0,
    })
}

/// Parse a Glucose Measurement Context (0x2A34) value
pub fn decode_glucose_context(bytes: &[u8]) -> Result<GlucoseReadingContext, DecodeError> {
    use context_flags::*;

    #[cfg(debug_assertions)]
    trace!("Raw context: {:02X?}", bytes);

    let mut reader = ByteReader::new(bytes);
    let flags = reader.read_u8()?;
    require_len(bytes, glucose_context_len(flags))?;

    let sequence_number = reader.read_u16()?;

    let extended_flags = if flags & EXTENDED_FLAGS != 0 {
        Some(reader.read_u8()?)
    } else {
        None
    };

    let carbohydrate = if flags & CARBOHYDRATE != 0 {
        Some(Carbohydrate {
            id: CarbohydrateId::from_raw(reader.read_u8()?),
            kilograms: reader.read_sfloat()?,
        })
    } else {
        None
    };

    let meal = if flags & MEAL != 0 {
        Some(Meal::from_raw(reader.read_u8()?))
    } else {
        None
    };

    let (tester, health) = if flags & TESTER_HEALTH != 0 {
        let byte = reader.read_u8()?;
        (
            Some(Tester::from_raw(byte & 0x0F)),
            Some(Health::from_raw(byte >> 4)),
        )
    } else {
        (None, None)
    };

    let exercise = if flags & EXERCISE != 0 {
        Some(Exercise {
            duration_secs: reader.read_u16()?,
            intensity_percent: reader.read_u8()?,
        })
    } else {
        None
    };

    let medication = if flags & MEDICATION != 0 {
        let id = MedicationId::from_raw(reader.read_u8()?);
        let amount = reader.read_sfloat()?;
        let unit = if flags & MEDICATION_UNIT_LITRES != 0 {
            MedicationUnit::Litres
        } else {
            MedicationUnit::Kilograms
        };
        Some(Medication { id, amount, unit })
    } else {
        None
    };

    let hba1c = if flags & HBA1C != 0 {
        Some(reader.read_sfloat()?)
    } else {
        None
    };

    Ok(GlucoseReadingContext {
        sequence_number,
        extended_flags,
        carbohydrate,
        meal,
        tester,
        health,
        exercise,
        medication,
        hba1c,
    })
}

/// Parse a RACP indication
///
/// ```text
/// [6 ResponseCode][operator][request op code][response code]
/// [5 NumberOfRecordsResponse][operator][count:u16]
/// ```
pub fn decode_racp_response(bytes: &[u8]) -> Result<RacpResponse, DecodeError> {
    let mut reader = ByteReader::new(bytes);
    let op_code = OpCode::try_from(reader.read_u8()?)?;
    let operator = Operator::try_from(reader.read_u8()?)?;

    match op_code {
        OpCode::ResponseCode => {
            require_len(bytes, 4)?;
            let request_op_code = OpCode::try_from(reader.read_u8()?)?;
            let response_code = ResponseCode::try_from(reader.read_u8()?)?;
            Ok(RacpResponse::ResponseCode {
                operator,
                request_op_code,
                response_code,
            })
        }
        OpCode::NumberOfRecordsResponse => Ok(RacpResponse::NumberOfRecords {
            operator,
            count: reader.read_u16()?,
        }),
        other => Err(DecodeError::UnexpectedOpCode(other)),
    }
}

/// `[op code][operator][operand...]`
pub fn encode_racp_command(command: &RacpCommand) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(2 + command.operand().len());
    bytes.push(command.op_code() as u8);
    bytes.push(command.operator() as u8);
    bytes.extend_from_slice(command.operand());
    bytes
}

/// Inverse of [`encode_racp_command`]; rejects pairs outside the
/// compatibility table
pub fn decode_racp_command(bytes: &[u8]) -> Result<RacpCommand, DecodeError> {
    let mut reader = ByteReader::new(bytes);
    let op_code = OpCode::try_from(reader.read_u8()?)?;
    let operator = Operator::try_from(reader.read_u8()?)?;
    let operand = reader.rest();
    RacpCommand::new(op_code, operator, operand)
        .map_err(|_| DecodeError::UnsupportedCommand { op_code, operator })
}

/// Bytes written to the UART RX characteristic for one command
pub fn encode_uart_command(command: &UartCommand) -> Vec<u8> {
    match command {
        UartCommand::Text { payload, .. } => payload.as_bytes().to_vec(),
        UartCommand::Data { payload, .. } => payload.clone(),
    }
}

/// Rebuild a command from its wire bytes. The kind and icon are not on the
/// wire and must be supplied.
pub fn decode_uart_command(
    kind: CommandKind,
    icon: CommandIcon,
    bytes: &[u8],
) -> Result<UartCommand, DecodeError> {
    match kind {
        CommandKind::Text => {
            let payload = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidText)?;
            Ok(UartCommand::Text {
                payload: payload.to_string(),
                icon,
            })
        }
        CommandKind::Data => Ok(UartCommand::Data {
            payload: bytes.to_vec(),
            icon,
        }),
    }
}
