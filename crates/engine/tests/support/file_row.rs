//! Test-only fixture modeling a file-catalog row and its `(uid, hash)`
//! secondary index key, mirroring `fileT`'s row/index schema closely
//! enough to exercise the engine end to end without carrying a shipped
//! file-row API in the crate itself.

#![allow(dead_code)]

use common::FILE_ROW_SLOT_SIZE;
use sha2::{Digest, Sha256};

pub const FID_KEY_SIZE: u16 = 33;
pub const FID_ENTRY_SIZE: u16 = 41;

pub struct FileRow {
    pub uid: [u8; 16],
    pub hash: [u8; 16],
    pub size: i64,
    pub file_type: u8,
    pub created_at: i64,
}

impl FileRow {
    pub fn to_bytes(&self) -> [u8; FILE_ROW_SLOT_SIZE] {
        let mut buf = [0u8; FILE_ROW_SLOT_SIZE];
        buf[0..16].copy_from_slice(&self.uid);
        buf[16..32].copy_from_slice(&self.hash);
        buf[32..40].copy_from_slice(&self.size.to_le_bytes());
        buf[40] = self.file_type;
        buf[41..49].copy_from_slice(&self.created_at.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            uid: buf[0..16].try_into().unwrap(),
            hash: buf[16..32].try_into().unwrap(),
            size: i64::from_le_bytes(buf[32..40].try_into().unwrap()),
            file_type: buf[40],
            created_at: i64::from_le_bytes(buf[41..49].try_into().unwrap()),
        }
    }

    pub fn to_header(&self) -> FileHeader {
        FileHeader {
            id: hex_encode(&self.hash),
            size: self.size,
            file_type: mime_for(self.file_type).to_string(),
        }
    }
}

pub struct FileHeader {
    pub id: String,
    pub size: i64,
    pub file_type: String,
}

fn mime_for(code: u8) -> &'static str {
    match code {
        0 => "image/jpeg",
        1 => "image/png",
        2 => "image/gif",
        3 => "video/mp4",
        4 => "audio/mpeg",
        5 => "application/json",
        6 => "application/pdf",
        7 => "application/zip",
        8 => "application/tar",
        9 => "application/gz",
        10 => "application/msword",
        11 => "application/vnd.ms-excel",
        _ => "Unknown",
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Parses a fixed 32-character hex string into 16 bytes, for tests that
/// want a literal uid rather than a generated one.
pub fn parse_hex16(hex: &str) -> [u8; 16] {
    assert_eq!(hex.len(), 32, "expected a 32-character hex string");
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).unwrap();
    }
    out
}

/// Truncated sha256, matching this fixture's 16-byte hash width.
pub fn hash16(input: &[u8]) -> [u8; 16] {
    let digest = Sha256::digest(input);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

pub fn fid_key(uid: [u8; 16], hash: [u8; 16]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[0..16].copy_from_slice(&uid);
    out[16..32].copy_from_slice(&hash);
    out
}
