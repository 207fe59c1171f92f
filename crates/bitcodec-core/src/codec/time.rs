//! `TIME` leaf codec (spec §4.2): at the wire level this is a UINT holding
//! epoch seconds; the only difference is the accepted literal grammar
//! (plain epoch-seconds integer or RFC 3339 UTC datetime), handled by
//! [`crate::time_util::parse_time_to_epoch_seconds`].

use crate::error::{CodecError, NodeContext};
use crate::time_util::parse_time_to_epoch_seconds;

use super::uint;

pub fn encode(value_str: &str, length_bits: u32, ctx: &NodeContext) -> Result<Vec<u8>, CodecError> {
    let epoch_seconds = parse_time_to_epoch_seconds(value_str)
        .map_err(|e| CodecError::encoding(ctx.clone(), format!("'{value_str}' is not a valid TIME literal: {e}")))?;
    if epoch_seconds < 0 {
        return Err(CodecError::encoding(ctx.clone(), format!("TIME value '{value_str}' predates the Unix epoch")));
    }
    uint::encode(&epoch_seconds.to_string(), length_bits, ctx)
}

/// Decodes to a plain epoch-seconds decimal string; callers that want an
/// RFC 3339 rendering convert separately (spec §4.9 compares TIME fields by
/// epoch-seconds value, not by literal string).
pub fn decode(bytes: &[u8], length_bits: u32) -> String {
    uint::decode(bytes, length_bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NodeContext {
        NodeContext::new("proto", "Header.timestamp", "timestamp")
    }

    #[test]
    fn encodes_plain_epoch_seconds() {
        let bytes = encode("1700000000", 32, &ctx()).unwrap();
        assert_eq!(decode(&bytes, 32), "1700000000");
    }

    #[test]
    fn encodes_rfc3339_datetime_to_same_wire_form_as_epoch_seconds() {
        let a = encode("1970-01-01T00:00:00Z", 32, &ctx()).unwrap();
        let b = encode("0", 32, &ctx()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_negative_epoch() {
        assert!(encode("-5", 32, &ctx()).is_err());
    }
}
