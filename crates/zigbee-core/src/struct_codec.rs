//! C2 — struct codec support.
//!
//! Structs in this stack are not declared through a derive macro (the
//! corpus has no proven declarative-struct crate for this shape of
//! conditional-field record; `deconz-protocol` hand-parses every struct by
//! cursor offset, which is the pattern followed here too). Instead, each
//! concrete struct type implements [`crate::types::Wire`] directly and uses
//! the helpers in this module for the two struct-specific behaviors spec.md
//! §4.1 calls out:
//!
//! - a field whose presence is conditional on an earlier field
//!   (`requires = predicate(partial_struct)`, grounded on
//!   `zigpy.zdo.types.MultiAddress` and `zcl.foundation.AttributeReportingConfig`);
//! - an optional *trailing* field that is absent, rather than an error, when
//!   input runs out before it (grounded on `zigpy.zdo.types.NodeDescriptor`'s
//!   tolerance of partially-populated descriptors, and the general
//!   `SizePrefixedSimpleDescriptor` "absent if the size prefix is zero"
//!   pattern).
//!
//! Concrete structs: see [`crate::zdo::NodeDescriptor`],
//! [`crate::zdo::SimpleDescriptor`], [`crate::zdo::MultiAddress`], and
//! [`crate::zcl::foundation::AttributeReportingConfig`].

use crate::error::CodecError;
use crate::types::Wire;

/// Deserialize a trailing optional field: `None` if `buf` is exhausted,
/// `Some(value)` otherwise. Per spec.md §4.1, exhaustion is only tolerated
/// for fields explicitly marked optional, and only once all non-optional
/// fields have been consumed — callers are responsible for only invoking
/// this after emitting every required field.
pub fn deserialize_optional_tail<T: Wire>(
    buf: &[u8],
) -> Result<(Option<T>, &[u8]), CodecError> {
    if buf.is_empty() {
        return Ok((None, buf));
    }
    let (value, rest) = T::deserialize(buf)?;
    Ok((Some(value), rest))
}

/// Serialize a trailing optional field: emits nothing if `None`.
pub fn serialize_optional_tail<T: Wire>(value: &Option<T>, out: &mut Vec<u8>) {
    if let Some(v) = value {
        v.serialize_to(out);
    }
}

/// Serialize a field only if `predicate` holds against the struct built so
/// far. Mirrors `zigpy`'s `StructField(requires=lambda s: ...)`: the
/// predicate closure captures whatever earlier fields it needs to inspect.
pub fn serialize_conditional<T: Wire>(value: &T, predicate: bool, out: &mut Vec<u8>) {
    if predicate {
        value.serialize_to(out);
    }
}

/// Struct-construction-time check that optional fields only follow
/// non-optional ones. Concrete struct `new`/builder constructors should
/// call this in a debug assertion over their own field-optionality list;
/// there is no single generic struct description to validate here since
/// structs are hand-coded, not declared through a shared macro.
pub fn assert_optional_fields_trail(optionality: &[bool]) -> Result<(), CodecError> {
    let mut seen_optional = false;
    for &is_optional in optionality {
        if is_optional {
            seen_optional = true;
        } else if seen_optional {
            return Err(CodecError::BadOptionalOrdering);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_tail_present() {
        let buf = 7u16.serialize();
        let (v, rest) = deserialize_optional_tail::<u16>(&buf).unwrap();
        assert_eq!(v, Some(7));
        assert!(rest.is_empty());
    }

    #[test]
    fn optional_tail_absent() {
        let (v, rest) = deserialize_optional_tail::<u16>(&[]).unwrap();
        assert_eq!(v, None);
        assert!(rest.is_empty());
    }

    #[test]
    fn optional_ordering_check() {
        assert!(assert_optional_fields_trail(&[false, false, true, true]).is_ok());
        assert!(assert_optional_fields_trail(&[false, true, false]).is_err());
    }
}
