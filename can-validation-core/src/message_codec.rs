//! Signal payload codec
//!
//! Translates between logical signal values and the single payload byte this
//! system commits to. Values that do not fit the byte are rejected, never
//! truncated.

use crate::signals::{PayloadKind, SignalDefinition};
use crate::types::{CanMessage, Result, SignalValue, ValidationError};

/// Signal codec - encodes values into frames and decodes them back
pub struct SignalCodec;

impl SignalCodec {
    /// Build the frame carrying `value` for `signal`
    pub fn encode(signal: &SignalDefinition, value: &SignalValue) -> Result<CanMessage> {
        let byte = Self::encode_payload(signal, value)?;
        Ok(CanMessage::new(signal.can_id, vec![byte]))
    }

    /// Encode `value` into the payload byte
    pub fn encode_payload(signal: &SignalDefinition, value: &SignalValue) -> Result<u8> {
        match signal.payload.kind {
            PayloadKind::Enum => {
                let symbol = value.to_string();
                signal
                    .payload
                    .mapping
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(symbol.trim()))
                    .map(|(_, byte)| *byte)
                    .ok_or_else(|| {
                        let known: Vec<&str> = signal.payload.mapping.keys().map(String::as_str).collect();
                        ValidationError::InvalidValue(format!(
                            "Value {:?} is not valid for signal {} (expected one of {})",
                            symbol,
                            signal.name,
                            known.join(", ")
                        ))
                    })
            }
            PayloadKind::Unsigned => {
                let number = Self::integer(signal, value)?;
                u8::try_from(number).map_err(|_| {
                    ValidationError::InvalidValue(format!(
                        "Value {} is out of range 0..=255 for signal {}",
                        number, signal.name
                    ))
                })
            }
            PayloadKind::Signed => {
                let number = Self::integer(signal, value)?;
                i8::try_from(number).map(|v| v as u8).map_err(|_| {
                    ValidationError::InvalidValue(format!(
                        "Value {} is out of range -128..=127 for signal {}",
                        number, signal.name
                    ))
                })
            }
        }
    }

    /// Decode the value carried by `message`
    ///
    /// Fails only when the frame has no payload byte.
    pub fn decode(signal: &SignalDefinition, message: &CanMessage) -> Result<SignalValue> {
        let byte = message.first_byte().ok_or_else(|| {
            ValidationError::InvalidValue(format!(
                "Frame 0x{:X} for signal {} has an empty payload",
                message.can_id, signal.name
            ))
        })?;
        Ok(Self::decode_payload(signal, byte))
    }

    /// Decode a payload byte
    ///
    /// Enum bytes without a mapping entry decode to the raw number.
    pub fn decode_payload(signal: &SignalDefinition, byte: u8) -> SignalValue {
        match signal.payload.kind {
            PayloadKind::Enum => signal
                .payload
                .mapping
                .iter()
                .find(|(_, value)| **value == byte)
                .map(|(key, _)| SignalValue::Symbol(key.clone()))
                .unwrap_or(SignalValue::Integer(byte as i64)),
            PayloadKind::Unsigned => SignalValue::Integer(byte as i64),
            PayloadKind::Signed => SignalValue::Integer(byte as i8 as i64),
        }
    }

    fn integer(signal: &SignalDefinition, value: &SignalValue) -> Result<i64> {
        value.as_i64().ok_or_else(|| {
            ValidationError::InvalidValue(format!(
                "Value {:?} is not an integer for {} signal {}",
                value.to_string(),
                signal.payload.kind,
                signal.name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::PayloadDefinition;

    fn door() -> SignalDefinition {
        SignalDefinition::new(
            "Door",
            "body",
            0x100,
            PayloadDefinition::enumeration([("OPEN", 1), ("CLOSED", 0)]),
        )
    }

    #[test]
    fn test_enum_round_trip() {
        let signal = door();
        for symbol in ["OPEN", "CLOSED"] {
            let frame = SignalCodec::encode(&signal, &SignalValue::from(symbol)).unwrap();
            assert_eq!(frame.can_id, 0x100);
            assert_eq!(SignalCodec::decode(&signal, &frame).unwrap(), SignalValue::from(symbol));
        }
    }

    #[test]
    fn test_enum_encoding_is_case_insensitive() {
        let frame = SignalCodec::encode(&door(), &SignalValue::from("open")).unwrap();
        assert_eq!(frame.data, vec![0x01]);
    }

    #[test]
    fn test_enum_unknown_symbol_rejected() {
        let err = SignalCodec::encode(&door(), &SignalValue::from("AJAR")).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue(_)));
        assert!(err.to_string().contains("Door"));
    }

    #[test]
    fn test_enum_decode_first_match_wins_and_raw_fallback() {
        let signal = SignalDefinition::new(
            "Gear",
            "chassis",
            0x200,
            PayloadDefinition::enumeration([("PARK", 0), ("P", 0), ("DRIVE", 3)]),
        );
        assert_eq!(SignalCodec::decode_payload(&signal, 0), SignalValue::from("PARK"));
        assert_eq!(SignalCodec::decode_payload(&signal, 7), SignalValue::Integer(7));
    }

    #[test]
    fn test_unsigned_range() {
        let signal = SignalDefinition::new("Speed", "chassis", 0x201, PayloadDefinition::unsigned());
        for value in [0i64, 1, 127, 128, 255] {
            let byte = SignalCodec::encode_payload(&signal, &SignalValue::Integer(value)).unwrap();
            assert_eq!(SignalCodec::decode_payload(&signal, byte), SignalValue::Integer(value));
        }
        assert!(SignalCodec::encode_payload(&signal, &SignalValue::Integer(256)).is_err());
        assert!(SignalCodec::encode_payload(&signal, &SignalValue::Integer(-1)).is_err());
        assert_eq!(SignalCodec::encode_payload(&signal, &SignalValue::from("42")).unwrap(), 42);
        assert!(SignalCodec::encode_payload(&signal, &SignalValue::from("fast")).is_err());
    }

    #[test]
    fn test_signed_range() {
        let signal = SignalDefinition::new("Temp", "body", 0x101, PayloadDefinition::signed());
        for value in [-128i64, -1, 0, 1, 127] {
            let byte = SignalCodec::encode_payload(&signal, &SignalValue::Integer(value)).unwrap();
            assert_eq!(SignalCodec::decode_payload(&signal, byte), SignalValue::Integer(value));
        }
        assert_eq!(SignalCodec::encode_payload(&signal, &SignalValue::Integer(-1)).unwrap(), 0xFF);
        assert_eq!(SignalCodec::decode_payload(&signal, 0x80), SignalValue::Integer(-128));
        assert_eq!(SignalCodec::decode_payload(&signal, 0x7F), SignalValue::Integer(127));
        assert!(SignalCodec::encode_payload(&signal, &SignalValue::Integer(128)).is_err());
        assert!(SignalCodec::encode_payload(&signal, &SignalValue::Integer(-129)).is_err());
    }

    #[test]
    fn test_empty_payload_cannot_be_decoded() {
        let frame = CanMessage::new(0x100, Vec::new());
        assert!(SignalCodec::decode(&door(), &frame).is_err());
    }
}
