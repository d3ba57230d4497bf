use crate::error::CodecError;

/// Applies the session XOR key to `bytes`, starting at `offset` within the
/// key. Pure and stateless: the caller always passes `offset = 0` when
/// ciphering a complete message, since the server applies the key
/// independently per message rather than as a rolling stream position.
///
/// Idempotent: `xor(key, xor(key, b, 0), 0) == b`.
pub fn xor(key: &[u8], bytes: &[u8], offset: usize) -> Result<Vec<u8>, CodecError> {
    if key.is_empty() {
        return Ok(bytes.to_vec());
    }

    let out: Vec<u8> = bytes
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ key[(i + offset) % key.len()])
        .collect();

    if out.len() != bytes.len() {
        return Err(CodecError::LengthMismatch {
            input: bytes.len(),
            output: out.len(),
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let key = b"abcd";
        let plain = b"hello, world! this spans more than one key length";
        let ciphered = xor(key, plain, 0).unwrap();
        assert_ne!(ciphered, plain);
        let restored = xor(key, &ciphered, 0).unwrap();
        assert_eq!(restored, plain);
    }

    #[test]
    fn empty_key_passes_through() {
        let plain = b"unciphered";
        assert_eq!(xor(&[], plain, 0).unwrap(), plain);
    }

    #[test]
    fn offset_shifts_the_key_window() {
        let key = b"xy";
        let plain = b"ab";
        let at_zero = xor(key, plain, 0).unwrap();
        let at_one = xor(key, plain, 1).unwrap();
        assert_ne!(at_zero, at_one);
    }
}
