use md5::{Digest, Md5};
use std::io::ErrorKind;
use std::path::Path;

/// Hex MD5, the digest the installed-package database records per file.
pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}

/// Checksum of a file on disk, `None` if it does not exist.
pub fn file_checksum(path: &Path) -> std::io::Result<Option<String>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(md5_hex(&bytes))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}
