use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    let out = h.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

/// Lowercase hex digest, as carried in the canonical request message.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}
