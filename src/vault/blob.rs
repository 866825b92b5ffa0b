// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The sealed form of any sensitive payload.

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// AES-256-GCM output: ciphertext, the 96-bit nonce used, and the 128-bit tag.
///
/// Byte fields are base64 encoded when serialized so a blob can be stored
/// as a single JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub auth_tag: Vec<u8>,
}

impl EncryptedBlob {
    /// Total sealed size in bytes.
    pub fn len(&self) -> usize {
        self.ciphertext.len() + self.nonce.len() + self.auth_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

mod b64 {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&Base64::encode_string(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Base64::decode_vec(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_fields_as_base64() {
        let blob = EncryptedBlob {
            ciphertext: vec![1, 2, 3],
            nonce: vec![0; 12],
            auth_tag: vec![0xff; 16],
        };
        let json = serde_json::to_value(&blob).unwrap();
        assert_eq!(json["ciphertext"], "AQID");
        assert_eq!(blob.len(), 31);
    }

    #[test]
    fn rejects_invalid_base64() {
        let raw = r#"{"ciphertext":"!!","nonce":"","auth_tag":""}"#;
        assert!(serde_json::from_str::<EncryptedBlob>(raw).is_err());
    }
}
