//! C3 — Zigbee Cluster Library framing and codec.

pub mod foundation;

use crate::error::CodecError;
use crate::types::Wire;

/// ZCL frame header (spec.md §3 "ZCL frame header").
///
/// `frame_control` bit layout (matches `deconz_protocol::types::ZclFrame`,
/// which this supersedes at the stack layer — that type stays in
/// `deconz-protocol` for parsing the raw APS payload off the wire; this one
/// is the richer, cluster-aware header used once we know which cluster's
/// schema to apply):
/// - bits 0-1: frame type (0 = general/foundation, 1 = cluster-specific)
/// - bit 2: manufacturer-specific flag
/// - bit 3: direction (0 = client→server, 1 = server→client)
/// - bit 4: disable default response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameControl {
    pub cluster_specific: bool,
    pub manufacturer_specific: bool,
    pub direction_server_to_client: bool,
    pub disable_default_response: bool,
}

impl FrameControl {
    pub fn from_byte(b: u8) -> Self {
        FrameControl {
            cluster_specific: b & 0x01 != 0,
            manufacturer_specific: b & 0x04 != 0,
            direction_server_to_client: b & 0x08 != 0,
            disable_default_response: b & 0x10 != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut b = 0u8;
        if self.cluster_specific {
            b |= 0x01;
        }
        if self.manufacturer_specific {
            b |= 0x04;
        }
        if self.direction_server_to_client {
            b |= 0x08;
        }
        if self.disable_default_response {
            b |= 0x10;
        }
        b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZclHeader {
    pub frame_control: FrameControl,
    pub manufacturer_code: Option<u16>,
    pub tsn: u8,
    pub command_id: u8,
}

impl ZclHeader {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![self.frame_control.to_byte()];
        if let Some(code) = self.manufacturer_code {
            code.serialize_to(&mut out);
        }
        out.push(self.tsn);
        out.push(self.command_id);
        out
    }

    pub fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), CodecError> {
        if buf.is_empty() {
            return Err(CodecError::UnexpectedEof { needed: 3, got: 0 });
        }
        let frame_control = FrameControl::from_byte(buf[0]);
        let mut rest = &buf[1..];
        let manufacturer_code = if frame_control.manufacturer_specific {
            let (code, r) = u16::deserialize(rest)?;
            rest = r;
            Some(code)
        } else {
            None
        };
        if rest.len() < 2 {
            return Err(CodecError::UnexpectedEof { needed: 2, got: rest.len() });
        }
        let tsn = rest[0];
        let command_id = rest[1];
        Ok((
            ZclHeader { frame_control, manufacturer_code, tsn, command_id },
            &rest[2..],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip_with_manufacturer_code() {
        let hdr = ZclHeader {
            frame_control: FrameControl {
                cluster_specific: true,
                manufacturer_specific: true,
                direction_server_to_client: false,
                disable_default_response: false,
            },
            manufacturer_code: Some(0x1234),
            tsn: 7,
            command_id: 0x02,
        };
        let bytes = hdr.serialize();
        let (back, rest) = ZclHeader::deserialize(&bytes).unwrap();
        assert_eq!(back, hdr);
        assert!(rest.is_empty());
    }

    #[test]
    fn header_roundtrip_without_manufacturer_code() {
        let hdr = ZclHeader {
            frame_control: FrameControl {
                cluster_specific: false,
                manufacturer_specific: false,
                direction_server_to_client: true,
                disable_default_response: true,
            },
            manufacturer_code: None,
            tsn: 99,
            command_id: 0x0b,
        };
        let (back, rest) = ZclHeader::deserialize(&hdr.serialize()).unwrap();
        assert_eq!(back, hdr);
        assert!(rest.is_empty());
    }
}
