use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Encode bytes as unpadded base64url into a `String`.
pub fn encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode an unpadded base64url string.
pub fn decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(data)
}

/// Serde module for encoding byte vectors as unpadded base64url strings.
pub mod bytes {
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        super::encode(data).serialize(serializer)
    }
}

#[cfg(test)]
mod test {
    #[test]
    fn encode_is_unpadded_urlsafe() {
        // 0xfb 0xff selects both '-' and '_' replacement characters
        assert_eq!(super::encode(&[0xfb, 0xff, 0x3e]), "-_8-");
        assert_eq!(super::encode(b"f"), "Zg");
        assert_eq!(super::encode(b""), "");
    }

    #[test]
    fn decode_roundtrip() {
        let data = b"\x00\x01\x02hello\xff";
        assert_eq!(super::decode(&super::encode(data)).unwrap(), data);
        assert!(super::decode("not base64url!").is_err());
    }
}
