//! Document identity: doc ids, content hashes, and permalinks.

use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::io::Read;

use crate::defaults;
use crate::error::Result;

const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a new document id: `D-YYYYMMDD-XXXXXXXX`.
///
/// The date component is the current UTC date; the suffix is a random
/// uppercase alphanumeric string. Ids are effectively unique but the
/// database still enforces uniqueness on insert.
pub fn generate_doc_id() -> String {
    let date = Utc::now().format("%Y%m%d");
    let mut rng = rand::thread_rng();
    let suffix: String = (0..defaults::DOC_ID_SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("D-{date}-{suffix}")
}

/// SHA-256 of a byte slice as 64 lowercase hex characters.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-256 of a reader, streamed in 64 KiB chunks.
pub fn sha256_hex_reader<R: Read>(mut reader: R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Build the stable permalink for a doc id: `<base>/id/<doc_id>`.
pub fn build_permalink(base_url: &str, doc_id: &str) -> String {
    format!("{}/id/{}", base_url.trim_end_matches('/'), doc_id)
}
