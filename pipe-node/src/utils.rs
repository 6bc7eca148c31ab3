use anyhow::{bail, Result};

/// Encode the given u64 as an array of big-endian bytes.
pub fn encode_u64(val: u64) -> [u8; 8] {
    val.to_be_bytes()
}

/// Decode the given bytes as a u64.
pub fn decode_u64(val: &[u8]) -> Result<u64> {
    match val {
        [b0, b1, b2, b3, b4, b5, b6, b7] => Ok(u64::from_be_bytes([*b0, *b1, *b2, *b3, *b4, *b5, *b6, *b7])),
        _ => bail!("invalid byte array given to decode as u64, invalid len {} needed 8", val.len()),
    }
}

/// Encode the given bytes as base64 for transport in a JSON body.
pub fn encode_record(record: &[u8]) -> String {
    base64::encode(record)
}

/// Decode a base64 encoded record taken from a JSON body.
pub fn decode_record(record: &str) -> Result<Vec<u8>> {
    Ok(base64::decode(record)?)
}
