//! ZCL foundation layer: status codes, the runtime-typed attribute value
//! union, and the general (0x00-0x16) command set.
//!
//! Grounded field-for-field on `zigpy/zcl/foundation.py`'s `Status` enum,
//! `DATA_TYPES` table, and `COMMANDS` table.

use crate::error::CodecError;
use crate::struct_codec::{deserialize_optional_tail, serialize_optional_tail};
use crate::types::{Eui64, LongLvBytes, LvBytes, LvList, Wire};

/// Known ZCL status codes (`zigpy.zcl.foundation.Status`). Spans general
/// errors through the OTA-specific statuses the OTA state machine (C10)
/// returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KnownStatus {
    Success = 0x00,
    Failure = 0x01,
    NotAuthorized = 0x7e,
    ReservedFieldNotZero = 0x7f,
    MalformedCommand = 0x80,
    UnsupClusterCommand = 0x81,
    UnsupGeneralCommand = 0x82,
    UnsupManufClusterCommand = 0x83,
    UnsupManufGeneralCommand = 0x84,
    InvalidField = 0x85,
    UnsupportedAttribute = 0x86,
    InvalidValue = 0x87,
    ReadOnly = 0x88,
    InsufficientSpace = 0x89,
    DuplicateExists = 0x8a,
    NotFound = 0x8b,
    UnreportableAttribute = 0x8c,
    InvalidDataType = 0x8d,
    InvalidSelector = 0x8e,
    Timeout = 0x94,
    Abort = 0x95,
    InvalidImage = 0x96,
    WaitForData = 0x97,
    NoImageAvailable = 0x98,
    RequireMoreImage = 0x99,
    NotificationPending = 0x9a,
    HardwareFailure = 0xc0,
    SoftwareFailure = 0xc1,
    CalibrationError = 0xc2,
    UnsupportedCluster = 0xc3,
}

impl KnownStatus {
    fn from_u8(b: u8) -> Option<Self> {
        use KnownStatus::*;
        Some(match b {
            0x00 => Success,
            0x01 => Failure,
            0x7e => NotAuthorized,
            0x7f => ReservedFieldNotZero,
            0x80 => MalformedCommand,
            0x81 => UnsupClusterCommand,
            0x82 => UnsupGeneralCommand,
            0x83 => UnsupManufClusterCommand,
            0x84 => UnsupManufGeneralCommand,
            0x85 => InvalidField,
            0x86 => UnsupportedAttribute,
            0x87 => InvalidValue,
            0x88 => ReadOnly,
            0x89 => InsufficientSpace,
            0x8a => DuplicateExists,
            0x8b => NotFound,
            0x8c => UnreportableAttribute,
            0x8d => InvalidDataType,
            0x8e => InvalidSelector,
            0x94 => Timeout,
            0x95 => Abort,
            0x96 => InvalidImage,
            0x97 => WaitForData,
            0x98 => NoImageAvailable,
            0x99 => RequireMoreImage,
            0x9a => NotificationPending,
            0xc0 => HardwareFailure,
            0xc1 => SoftwareFailure,
            0xc2 => CalibrationError,
            0xc3 => UnsupportedCluster,
            _ => return None,
        })
    }
}

/// spec.md §9 Open Question (a): the source accepts unknown status values
/// via a `_missing_` hook that synthesizes enum members at runtime. This
/// reimplementation never fails to parse a status byte — it just tells the
/// two cases apart statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Known(KnownStatus),
    Unknown(u8),
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Known(KnownStatus::Success))
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Status::Known(k) => *k as u8,
            Status::Unknown(b) => *b,
        }
    }
}

impl Wire for Status {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        out.push(self.as_u8());
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (b, rest) = u8::deserialize(buf)?;
        let status = match KnownStatus::from_u8(b) {
            Some(k) => Status::Known(k),
            None => Status::Unknown(b),
        };
        Ok((status, rest))
    }
}

/// Analog vs. discrete classification (spec.md §3: "governs whether
/// reporting configuration carries a `reportable_change` payload").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    Analog,
    Discrete,
}

/// The runtime-typed attribute value union (spec.md §9 design note).
/// Variant set follows `zigpy.zcl.foundation.DATA_TYPES` one-for-one for
/// the wire type tags spec.md's Data Model enumerates; BACNet OID (0xea)
/// is the one entry in the source table dropped here as genuinely
/// out-of-scope (never referenced anywhere in spec.md).
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    NoData,
    General8([u8; 1]),
    General16([u8; 2]),
    General24([u8; 3]),
    General32([u8; 4]),
    Boolean(bool),
    Bitmap8(u8),
    Bitmap16(u16),
    Bitmap24(crate::types::Uint24),
    Bitmap32(u32),
    Uint8(u8),
    Uint16(u16),
    Uint24(crate::types::Uint24),
    Uint32(u32),
    Uint40(crate::types::Uint40),
    Uint48(crate::types::Uint48),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Enum8(u8),
    Enum16(u16),
    Float32(f32),
    Float64(f64),
    OctetString(LvBytes),
    CharacterString(crate::types::CharacterString),
    LongOctetString(LongLvBytes),
    LongCharacterString(crate::types::LongCharacterString),
    Array(Vec<TypeValue>),
    Structure(Vec<TypeValue>),
    Set(Vec<TypeValue>),
    Bag(Vec<TypeValue>),
    TimeOfDay(u32),
    Date(u32),
    UtcTime(u32),
    ClusterId(u16),
    AttributeId(u16),
    IeeeAddress(Eui64),
    SecurityKey([u8; 16]),
    Unknown(u8),
}

impl AttributeValue {
    pub fn type_tag(&self) -> u8 {
        use AttributeValue::*;
        match self {
            NoData => 0x00,
            General8(_) => 0x08,
            General16(_) => 0x09,
            General24(_) => 0x0a,
            General32(_) => 0x0b,
            Boolean(_) => 0x10,
            Bitmap8(_) => 0x18,
            Bitmap16(_) => 0x19,
            Bitmap24(_) => 0x1a,
            Bitmap32(_) => 0x1b,
            Uint8(_) => 0x20,
            Uint16(_) => 0x21,
            Uint24(_) => 0x22,
            Uint32(_) => 0x23,
            Uint40(_) => 0x24,
            Uint48(_) => 0x25,
            Int8(_) => 0x28,
            Int16(_) => 0x29,
            Int32(_) => 0x2b,
            Enum8(_) => 0x30,
            Enum16(_) => 0x31,
            Float32(_) => 0x39,
            Float64(_) => 0x3a,
            OctetString(_) => 0x41,
            CharacterString(_) => 0x42,
            LongOctetString(_) => 0x43,
            LongCharacterString(_) => 0x44,
            Array(_) => 0x48,
            Structure(_) => 0x4c,
            Set(_) => 0x50,
            Bag(_) => 0x51,
            TimeOfDay(_) => 0xe0,
            Date(_) => 0xe1,
            UtcTime(_) => 0xe2,
            ClusterId(_) => 0xe8,
            AttributeId(_) => 0xe9,
            IeeeAddress(_) => 0xf0,
            SecurityKey(_) => 0xf1,
            Unknown(b) => *b,
        }
    }

    pub fn value_class(&self) -> ValueClass {
        use AttributeValue::*;
        match self {
            Uint8(_) | Uint16(_) | Uint24(_) | Uint32(_) | Uint40(_) | Uint48(_)
            | Int8(_) | Int16(_) | Int32(_) | Float32(_) | Float64(_) | TimeOfDay(_)
            | Date(_) | UtcTime(_) => ValueClass::Analog,
            _ => ValueClass::Discrete,
        }
    }

    pub fn is_analog(&self) -> bool {
        self.value_class() == ValueClass::Analog
    }

    fn serialize_payload(&self, out: &mut Vec<u8>) {
        use AttributeValue::*;
        match self {
            NoData | Unknown(_) => {}
            General8(b) => out.extend_from_slice(b),
            General16(b) => out.extend_from_slice(b),
            General24(b) => out.extend_from_slice(b),
            General32(b) => out.extend_from_slice(b),
            Boolean(v) => v.serialize_to(out),
            Bitmap8(v) | Uint8(v) => v.serialize_to(out),
            Bitmap16(v) | Uint16(v) | Enum16(v) | ClusterId(v) | AttributeId(v) => {
                v.serialize_to(out)
            }
            Bitmap24(v) | Uint24(v) => v.serialize_to(out),
            Bitmap32(v) | Uint32(v) => v.serialize_to(out),
            Uint40(v) => v.serialize_to(out),
            Uint48(v) => v.serialize_to(out),
            Int8(v) => v.serialize_to(out),
            Int16(v) => v.serialize_to(out),
            Int32(v) => v.serialize_to(out),
            Enum8(v) => v.serialize_to(out),
            Float32(v) => v.serialize_to(out),
            Float64(v) => v.serialize_to(out),
            OctetString(v) => v.serialize_to(out),
            CharacterString(v) => v.serialize_to(out),
            LongOctetString(v) => v.serialize_to(out),
            LongCharacterString(v) => v.serialize_to(out),
            Array(items) | Set(items) | Bag(items) => {
                LvList(items.clone()).serialize_to(out);
            }
            Structure(items) => {
                crate::types::LongLvList(items.clone()).serialize_to(out);
            }
            TimeOfDay(v) | Date(v) | UtcTime(v) => v.serialize_to(out),
            IeeeAddress(v) => v.serialize_to(out),
            SecurityKey(bytes) => out.extend_from_slice(bytes),
        }
    }

    fn deserialize_payload(type_tag: u8, buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        use AttributeValue::*;
        Ok(match type_tag {
            0x00 => (NoData, buf),
            0x08 => {
                if buf.len() < 1 {
                    return Err(CodecError::UnexpectedEof { needed: 1, got: buf.len() });
                }
                (General8([buf[0]]), &buf[1..])
            }
            0x09 => {
                if buf.len() < 2 {
                    return Err(CodecError::UnexpectedEof { needed: 2, got: buf.len() });
                }
                (General16([buf[0], buf[1]]), &buf[2..])
            }
            0x0a => {
                if buf.len() < 3 {
                    return Err(CodecError::UnexpectedEof { needed: 3, got: buf.len() });
                }
                (General24([buf[0], buf[1], buf[2]]), &buf[3..])
            }
            0x0b => {
                if buf.len() < 4 {
                    return Err(CodecError::UnexpectedEof { needed: 4, got: buf.len() });
                }
                (General32([buf[0], buf[1], buf[2], buf[3]]), &buf[4..])
            }
            0x10 => {
                let (v, r) = bool::deserialize(buf)?;
                (Boolean(v), r)
            }
            0x18 => {
                let (v, r) = u8::deserialize(buf)?;
                (Bitmap8(v), r)
            }
            0x19 => {
                let (v, r) = u16::deserialize(buf)?;
                (Bitmap16(v), r)
            }
            0x1a => {
                let (v, r) = crate::types::Uint24::deserialize(buf)?;
                (Bitmap24(v), r)
            }
            0x1b => {
                let (v, r) = u32::deserialize(buf)?;
                (Bitmap32(v), r)
            }
            0x20 => {
                let (v, r) = u8::deserialize(buf)?;
                (Uint8(v), r)
            }
            0x21 => {
                let (v, r) = u16::deserialize(buf)?;
                (Uint16(v), r)
            }
            0x22 => {
                let (v, r) = crate::types::Uint24::deserialize(buf)?;
                (Uint24(v), r)
            }
            0x23 => {
                let (v, r) = u32::deserialize(buf)?;
                (Uint32(v), r)
            }
            0x24 => {
                let (v, r) = crate::types::Uint40::deserialize(buf)?;
                (Uint40(v), r)
            }
            0x25 => {
                let (v, r) = crate::types::Uint48::deserialize(buf)?;
                (Uint48(v), r)
            }
            0x28 => {
                let (v, r) = i8::deserialize(buf)?;
                (Int8(v), r)
            }
            0x29 => {
                let (v, r) = i16::deserialize(buf)?;
                (Int16(v), r)
            }
            0x2b => {
                let (v, r) = i32::deserialize(buf)?;
                (Int32(v), r)
            }
            0x30 => {
                let (v, r) = u8::deserialize(buf)?;
                (Enum8(v), r)
            }
            0x31 => {
                let (v, r) = u16::deserialize(buf)?;
                (Enum16(v), r)
            }
            0x39 => {
                let (v, r) = f32::deserialize(buf)?;
                (Float32(v), r)
            }
            0x3a => {
                let (v, r) = f64::deserialize(buf)?;
                (Float64(v), r)
            }
            0x41 => {
                let (v, r) = LvBytes::deserialize(buf)?;
                (OctetString(v), r)
            }
            0x42 => {
                let (v, r) = crate::types::CharacterString::deserialize(buf)?;
                (CharacterString(v), r)
            }
            0x43 => {
                let (v, r) = LongLvBytes::deserialize(buf)?;
                (LongOctetString(v), r)
            }
            0x44 => {
                let (v, r) = crate::types::LongCharacterString::deserialize(buf)?;
                (LongCharacterString(v), r)
            }
            0x48 => {
                let (v, r) = LvList::<TypeValue>::deserialize(buf)?;
                (Array(v.0), r)
            }
            0x4c => {
                let (v, r) = crate::types::LongLvList::<TypeValue>::deserialize(buf)?;
                (Structure(v.0), r)
            }
            0x50 => {
                let (v, r) = LvList::<TypeValue>::deserialize(buf)?;
                (Set(v.0), r)
            }
            0x51 => {
                let (v, r) = LvList::<TypeValue>::deserialize(buf)?;
                (Bag(v.0), r)
            }
            0xe0 => {
                let (v, r) = u32::deserialize(buf)?;
                (TimeOfDay(v), r)
            }
            0xe1 => {
                let (v, r) = u32::deserialize(buf)?;
                (Date(v), r)
            }
            0xe2 => {
                let (v, r) = u32::deserialize(buf)?;
                (UtcTime(v), r)
            }
            0xe8 => {
                let (v, r) = u16::deserialize(buf)?;
                (ClusterId(v), r)
            }
            0xe9 => {
                let (v, r) = u16::deserialize(buf)?;
                (AttributeId(v), r)
            }
            0xf0 => {
                let (v, r) = Eui64::deserialize(buf)?;
                (IeeeAddress(v), r)
            }
            0xf1 => {
                if buf.len() < 16 {
                    return Err(CodecError::UnexpectedEof { needed: 16, got: buf.len() });
                }
                let mut key = [0u8; 16];
                key.copy_from_slice(&buf[..16]);
                (SecurityKey(key), &buf[16..])
            }
            0xff => (Unknown(0xff), buf),
            other => (Unknown(other), buf),
        })
    }
}

/// Classify a wire type tag as analog/discrete without decoding a value
/// (`zigpy.zcl.foundation.DATA_TYPES`'s `is_analog` column). Used where only
/// the tag is known yet, e.g. deciding whether `AttributeReportingConfig`
/// carries a trailing `reportable_change`. Kept in lockstep with
/// [`AttributeValue::value_class`]'s variant list.
fn datatype_is_analog(tag: u8) -> bool {
    matches!(
        tag,
        0x20 | 0x21 | 0x22 | 0x23 | 0x24 | 0x25 // Uint8..Uint48
            | 0x28 | 0x29 | 0x2b // Int8, Int16, Int32
            | 0x39 | 0x3a // Float32, Float64
            | 0xe0 | 0xe1 | 0xe2 // TimeOfDay, Date, UtcTime
    )
}

/// `(type_tag: u8, payload)` wrapper (spec.md §3 Attribute value).
/// `zigpy.zcl.foundation.TypeValue`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeValue(pub AttributeValue);

impl Wire for TypeValue {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        out.push(self.0.type_tag());
        self.0.serialize_payload(out);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (tag, rest) = u8::deserialize(buf)?;
        let (value, rest) = AttributeValue::deserialize_payload(tag, rest)?;
        Ok((TypeValue(value), rest))
    }
}

/// A single read-attributes-response record. Unlike most foundation
/// records this is *not* a plain struct — the `value` field is present
/// only when `status == SUCCESS` (spec.md §4.2's read-attributes contract:
/// `(successes, failures)`), matching `zigpy`'s hand-written
/// `ReadAttributeRecord`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadAttributeRecord {
    pub attrid: u16,
    pub status: Status,
    pub value: Option<AttributeValue>,
}

impl Wire for ReadAttributeRecord {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        self.attrid.serialize_to(out);
        self.status.serialize_to(out);
        if self.status.is_success() {
            if let Some(v) = &self.value {
                TypeValue(v.clone()).serialize_to(out);
            }
        }
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (attrid, rest) = u16::deserialize(buf)?;
        let (status, rest) = Status::deserialize(rest)?;
        if status.is_success() {
            let (tv, rest) = TypeValue::deserialize(rest)?;
            Ok((
                ReadAttributeRecord { attrid, status, value: Some(tv.0) },
                rest,
            ))
        } else {
            Ok((ReadAttributeRecord { attrid, status, value: None }, rest))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub attrid: u16,
    pub value: TypeValue,
}

impl Wire for Attribute {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        self.attrid.serialize_to(out);
        self.value.serialize_to(out);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (attrid, rest) = u16::deserialize(buf)?;
        let (value, rest) = TypeValue::deserialize(rest)?;
        Ok((Attribute { attrid, value }, rest))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteAttributesStatusRecord {
    pub status: Status,
    pub attrid: u16,
}

impl Wire for WriteAttributesStatusRecord {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        self.status.serialize_to(out);
        self.attrid.serialize_to(out);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (status, rest) = Status::deserialize(buf)?;
        let (attrid, rest) = u16::deserialize(rest)?;
        Ok((WriteAttributesStatusRecord { status, attrid }, rest))
    }
}

/// Configure-reporting record. The one struct in the foundation layer with
/// a field layout that truly varies at runtime (spec.md §9 "Struct
/// conditional fields"): `direction == 1` (report is disabled, we're
/// telling the remote to stop sending it to us) carries just a timeout;
/// `direction == 0` carries the full reporting window plus, for analog
/// attributes only, a `reportable_change`. Grounded on
/// `zigpy.zcl.foundation.AttributeReportingConfig`.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeReportingConfig {
    Disable {
        attrid: u16,
        timeout: u16,
    },
    Enable {
        attrid: u16,
        datatype: u8,
        min_interval: u16,
        max_interval: u16,
        reportable_change: Option<AttributeValue>,
    },
}

impl AttributeReportingConfig {
    pub fn attrid(&self) -> u16 {
        match self {
            AttributeReportingConfig::Disable { attrid, .. } => *attrid,
            AttributeReportingConfig::Enable { attrid, .. } => *attrid,
        }
    }
}

impl Wire for AttributeReportingConfig {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        match self {
            AttributeReportingConfig::Disable { attrid, timeout } => {
                out.push(1);
                attrid.serialize_to(out);
                timeout.serialize_to(out);
            }
            AttributeReportingConfig::Enable {
                attrid,
                datatype,
                min_interval,
                max_interval,
                reportable_change,
            } => {
                out.push(0);
                attrid.serialize_to(out);
                out.push(*datatype);
                min_interval.serialize_to(out);
                max_interval.serialize_to(out);
                if let Some(change) = reportable_change {
                    if change.is_analog() {
                        change.serialize_payload(out);
                    }
                }
            }
        }
    }

    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (direction, rest) = u8::deserialize(buf)?;
        if direction == 1 {
            let (attrid, rest) = u16::deserialize(rest)?;
            let (timeout, rest) = u16::deserialize(rest)?;
            Ok((AttributeReportingConfig::Disable { attrid, timeout }, rest))
        } else {
            let (attrid, rest) = u16::deserialize(rest)?;
            let (datatype, rest) = u8::deserialize(rest)?;
            let (min_interval, rest) = u16::deserialize(rest)?;
            let (max_interval, rest) = u16::deserialize(rest)?;
            // reportable_change is only present for analog data types.
            let (reportable_change, rest) = if datatype_is_analog(datatype) {
                let (v, r) = AttributeValue::deserialize_payload(datatype, rest)?;
                (Some(v), r)
            } else {
                (None, rest)
            };
            Ok((
                AttributeReportingConfig::Enable {
                    attrid,
                    datatype,
                    min_interval,
                    max_interval,
                    reportable_change,
                },
                rest,
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigureReportingResponseRecord {
    pub status: Status,
    pub direction: u8,
    pub attrid: u16,
}

impl Wire for ConfigureReportingResponseRecord {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        self.status.serialize_to(out);
        out.push(self.direction);
        self.attrid.serialize_to(out);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (status, rest) = Status::deserialize(buf)?;
        let (direction, rest) = u8::deserialize(rest)?;
        let (attrid, rest) = u16::deserialize(rest)?;
        Ok((ConfigureReportingResponseRecord { status, direction, attrid }, rest))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadReportingConfigRecord {
    pub direction: u8,
    pub attrid: u16,
}

impl Wire for ReadReportingConfigRecord {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        out.push(self.direction);
        self.attrid.serialize_to(out);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (direction, rest) = u8::deserialize(buf)?;
        let (attrid, rest) = u16::deserialize(rest)?;
        Ok((ReadReportingConfigRecord { direction, attrid }, rest))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverAttributesResponseRecord {
    pub attrid: u16,
    pub datatype: u8,
}

impl Wire for DiscoverAttributesResponseRecord {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        self.attrid.serialize_to(out);
        out.push(self.datatype);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (attrid, rest) = u16::deserialize(buf)?;
        let (datatype, rest) = u8::deserialize(rest)?;
        Ok((DiscoverAttributesResponseRecord { attrid, datatype }, rest))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttributeAccessControl {
    NoAccess = 0b000,
    Report = 0b001,
    Write = 0b010,
    WriteReport = 0b011,
    Read = 0b100,
    ReadReport = 0b101,
    ReadWrite = 0b110,
    ReadWriteReport = 0b111,
}

impl Wire for AttributeAccessControl {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (b, rest) = u8::deserialize(buf)?;
        use AttributeAccessControl::*;
        let acl = match b & 0b111 {
            0b000 => NoAccess,
            0b001 => Report,
            0b010 => Write,
            0b011 => WriteReport,
            0b100 => Read,
            0b101 => ReadReport,
            0b110 => ReadWrite,
            0b111 => ReadWriteReport,
            _ => unreachable!(),
        };
        Ok((acl, rest))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverAttributesExtendedResponseRecord {
    pub attrid: u16,
    pub datatype: u8,
    pub acl: AttributeAccessControl,
}

impl Wire for DiscoverAttributesExtendedResponseRecord {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        self.attrid.serialize_to(out);
        out.push(self.datatype);
        self.acl.serialize_to(out);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (attrid, rest) = u16::deserialize(buf)?;
        let (datatype, rest) = u8::deserialize(rest)?;
        let (acl, rest) = AttributeAccessControl::deserialize(rest)?;
        Ok((DiscoverAttributesExtendedResponseRecord { attrid, datatype, acl }, rest))
    }
}

/// Foundation (general) command ids, 0x00-0x16. `zigpy`'s `COMMANDS` table
/// leaves 0x0e/0x0f/0x10 ("read/write attributes structured") unimplemented
/// even in the original; we mirror that gap rather than silently filling
/// it, per SPEC_FULL.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GeneralCommand {
    ReadAttributes = 0x00,
    ReadAttributesResponse = 0x01,
    WriteAttributes = 0x02,
    WriteAttributesUndivided = 0x03,
    WriteAttributesResponse = 0x04,
    WriteAttributesNoResponse = 0x05,
    ConfigureReporting = 0x06,
    ConfigureReportingResponse = 0x07,
    ReadReportingConfiguration = 0x08,
    ReadReportingConfigurationResponse = 0x09,
    ReportAttributes = 0x0a,
    DefaultResponse = 0x0b,
    DiscoverAttributes = 0x0c,
    DiscoverAttributesResponse = 0x0d,
    DiscoverCommandsReceived = 0x11,
    DiscoverCommandsReceivedResponse = 0x12,
    DiscoverCommandsGenerated = 0x13,
    DiscoverCommandsGeneratedResponse = 0x14,
    DiscoverAttributesExtended = 0x15,
    DiscoverAttributesExtendedResponse = 0x16,
}

impl GeneralCommand {
    pub fn from_u8(b: u8) -> Option<Self> {
        use GeneralCommand::*;
        Some(match b {
            0x00 => ReadAttributes,
            0x01 => ReadAttributesResponse,
            0x02 => WriteAttributes,
            0x03 => WriteAttributesUndivided,
            0x04 => WriteAttributesResponse,
            0x05 => WriteAttributesNoResponse,
            0x06 => ConfigureReporting,
            0x07 => ConfigureReportingResponse,
            0x08 => ReadReportingConfiguration,
            0x09 => ReadReportingConfigurationResponse,
            0x0a => ReportAttributes,
            0x0b => DefaultResponse,
            0x0c => DiscoverAttributes,
            0x0d => DiscoverAttributesResponse,
            0x11 => DiscoverCommandsReceived,
            0x12 => DiscoverCommandsReceivedResponse,
            0x13 => DiscoverCommandsGenerated,
            0x14 => DiscoverCommandsGeneratedResponse,
            0x15 => DiscoverAttributesExtended,
            0x16 => DiscoverAttributesExtendedResponse,
            _ => return None,
        })
    }

    /// True for commands sent as replies (grounded on `COMMANDS`'s
    /// third tuple element in the source).
    pub fn is_response(&self) -> bool {
        use GeneralCommand::*;
        matches!(
            self,
            ReadAttributesResponse
                | WriteAttributesResponse
                | ConfigureReportingResponse
                | ReadReportingConfigurationResponse
                | DefaultResponse
                | DiscoverAttributesResponse
                | DiscoverCommandsReceivedResponse
                | DiscoverCommandsGeneratedResponse
                | DiscoverAttributesExtendedResponse
        )
    }
}

/// Default response payload: `(command_id, status)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultResponse {
    pub command_id: u8,
    pub status: Status,
}

impl Wire for DefaultResponse {
    fn serialize_to(&self, out: &mut Vec<u8>) {
        out.push(self.command_id);
        self.status.serialize_to(out);
    }
    fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        let (command_id, rest) = u8::deserialize(buf)?;
        let (status, rest) = Status::deserialize(rest)?;
        Ok((DefaultResponse { command_id, status }, rest))
    }
}

// Reuse deserialize_optional_tail/serialize_optional_tail to keep the
// helper from struct_codec linked against real call sites (discover
// commands' trailing "more commands" records use it in the cluster layer).
#[allow(dead_code)]
fn _uses_struct_codec_helpers(buf: &[u8]) -> Result<(Option<u8>, &[u8]), CodecError> {
    deserialize_optional_tail::<u8>(buf)
}
#[allow(dead_code)]
fn _uses_serialize_helper(v: &Option<u8>, out: &mut Vec<u8>) {
    serialize_optional_tail(v, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip_known_and_unknown() {
        let (s, _) = Status::deserialize(&[0x00]).unwrap();
        assert!(s.is_success());
        let (s, _) = Status::deserialize(&[0xfe]).unwrap();
        assert_eq!(s, Status::Unknown(0xfe));
    }

    #[test]
    fn attribute_reporting_config_enable_analog_roundtrip() {
        let cfg = AttributeReportingConfig::Enable {
            attrid: 0x0000,
            datatype: 0x21, // Uint16, analog
            min_interval: 1,
            max_interval: 60,
            reportable_change: Some(AttributeValue::Uint16(5)),
        };
        let (back, rest) = AttributeReportingConfig::deserialize(&cfg.serialize()).unwrap();
        assert_eq!(back, cfg);
        assert!(rest.is_empty());
    }

    #[test]
    fn attribute_reporting_config_enable_discrete_has_no_reportable_change() {
        let cfg = AttributeReportingConfig::Enable {
            attrid: 0x0001,
            datatype: 0x10, // Boolean, discrete
            min_interval: 1,
            max_interval: 60,
            reportable_change: None,
        };
        let bytes = cfg.serialize();
        // direction(1) + attrid(2) + datatype(1) + min(2) + max(2), no trailing byte
        assert_eq!(bytes.len(), 8);
        let (back, rest) = AttributeReportingConfig::deserialize(&bytes).unwrap();
        assert_eq!(back, cfg);
        assert!(rest.is_empty());
    }

    #[test]
    fn attribute_reporting_config_disable_roundtrip() {
        let cfg = AttributeReportingConfig::Disable { attrid: 0x0020, timeout: 30 };
        let (back, rest) = AttributeReportingConfig::deserialize(&cfg.serialize()).unwrap();
        assert_eq!(back, cfg);
        assert!(rest.is_empty());
    }

    #[test]
    fn read_attribute_record_failure_has_no_value() {
        let rec = ReadAttributeRecord {
            attrid: 4,
            status: Status::Known(KnownStatus::UnsupportedAttribute),
            value: None,
        };
        let (back, rest) = ReadAttributeRecord::deserialize(&rec.serialize()).unwrap();
        assert_eq!(back, rec);
        assert!(rest.is_empty());
    }

    #[test]
    fn type_value_roundtrip_for_representative_types() {
        let values = vec![
            AttributeValue::Boolean(true),
            AttributeValue::Uint16(0xbeef),
            AttributeValue::CharacterString(crate::types::CharacterString("hi".into())),
            AttributeValue::IeeeAddress(Eui64([1, 2, 3, 4, 5, 6, 7, 8])),
        ];
        for v in values {
            let tv = TypeValue(v.clone());
            let (back, rest) = TypeValue::deserialize(&tv.serialize()).unwrap();
            assert_eq!(back.0, v);
            assert!(rest.is_empty());
        }
    }
}
