//! Traffic generator and consumer descriptions
//!
//! A generator describes how a source core produces packets for a stream; a
//! consumer describes how a sink core absorbs them. Each variant has a fixed
//! type tag and a payload encoder so the config serializer never needs to
//! know the shape of individual variants.

use serde::{Deserialize, Serialize};

use crate::error::{NetExpError, Result};

/// Width of the generator payload, the size of the largest variant
pub const GENERATOR_PAYLOAD_SIZE: usize = 4;

/// Type tag for [`Generator::Bernoulli`]
pub const GENERATOR_TAG_BERNOULLI: u32 = 0;

/// Packet generation scheme for a source core
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Generator {
    /// Each tick, emit one packet with the given probability
    Bernoulli { probability: f32 },
}

impl Generator {
    /// A Bernoulli generator, rejecting probabilities outside [0, 1]
    pub fn bernoulli(probability: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(NetExpError::InvalidParameter(format!(
                "Bernoulli probability {} is outside [0, 1]",
                probability
            )));
        }
        Ok(Generator::Bernoulli { probability })
    }

    /// Type tag written to the generator record
    pub fn type_tag(&self) -> u32 {
        match self {
            Generator::Bernoulli { .. } => GENERATOR_TAG_BERNOULLI,
        }
    }

    /// Payload bytes, zero-filled to [`GENERATOR_PAYLOAD_SIZE`]
    pub fn payload(&self) -> [u8; GENERATOR_PAYLOAD_SIZE] {
        let mut payload = [0u8; GENERATOR_PAYLOAD_SIZE];
        match self {
            Generator::Bernoulli { probability } => {
                payload[..4].copy_from_slice(&probability.to_le_bytes());
            }
        }
        payload
    }

    /// Rebuild a generator from its tag and payload
    pub fn from_record(tag: u32, payload: &[u8; GENERATOR_PAYLOAD_SIZE]) -> Result<Self> {
        match tag {
            GENERATOR_TAG_BERNOULLI => {
                let probability =
                    f32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
                Ok(Generator::Bernoulli { probability })
            }
            tag => Err(NetExpError::UnsupportedVariant {
                kind: "generator",
                tag,
            }),
        }
    }
}

/// Packet consumption scheme for a sink core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Consumer {
    /// Accept every packet as soon as it arrives
    #[default]
    Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bernoulli_payload() {
        let gen = Generator::bernoulli(0.1).unwrap();
        assert_eq!(gen.type_tag(), GENERATOR_TAG_BERNOULLI);
        assert_eq!(gen.payload(), 0.1f32.to_le_bytes());
        assert_eq!(
            Generator::from_record(gen.type_tag(), &gen.payload()).unwrap(),
            gen
        );
    }

    #[test]
    fn test_bernoulli_range() {
        assert!(Generator::bernoulli(0.0).is_ok());
        assert!(Generator::bernoulli(1.0).is_ok());
        assert!(Generator::bernoulli(1.5).is_err());
        assert!(Generator::bernoulli(-0.1).is_err());
        assert!(Generator::bernoulli(f32::NAN).is_err());
    }

    #[test]
    fn test_unknown_tag() {
        let err = Generator::from_record(7, &[0; GENERATOR_PAYLOAD_SIZE]).unwrap_err();
        assert!(matches!(
            err,
            NetExpError::UnsupportedVariant {
                kind: "generator",
                tag: 7
            }
        ));
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_string(&Generator::Bernoulli { probability: 0.5 }).unwrap();
        assert_eq!(json, r#"{"type":"bernoulli","probability":0.5}"#);
        let consumer: Consumer = serde_json::from_str(r#"{"type":"instant"}"#).unwrap();
        assert_eq!(consumer, Consumer::Instant);
    }
}
