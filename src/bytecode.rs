//! This module contains the bytecode digest procedures used to fingerprint
//! deployed contract code.
//!
//! # Why the Body, Not the Whole Code
//!
//! The compiler appends a CBOR-encoded metadata blob to every contract's
//! deployed bytecode. The blob encodes, among other things, a hash of the
//! source text, so two compilations of semantically identical code can differ
//! in their trailing metadata alone. Comparisons that want to answer "is this
//! the same _code_" therefore hash the [`body`] of the bytecode, with the
//! metadata stripped.
//!
//! # Libraries
//!
//! A deployed Solidity library opens with a call-protection guard of the form
//! `PUSH20 <own address> ADDRESS EQ …`, meaning the library embeds its own
//! deployed address into its first twenty-one bytes. Hashing a library's code
//! as-is would make the digest depend on where it happens to be deployed, so
//! [`strip_library_address`] zeroes the embedded address first.

use sha3::{Digest, Keccak256};

use crate::constant::{ADDRESS_LENGTH_BYTES, METADATA_LENGTH_SUFFIX_BYTES, PUSH20_OPCODE};

/// Computes the keccak-256 digest of `bytes`, rendered as a `0x`-prefixed
/// hexadecimal string.
#[must_use]
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    format!("0x{}", hex::encode(hasher.finalize()))
}

/// Returns the portion of `bytes` that precedes the trailing CBOR metadata
/// blob.
///
/// The final two bytes of compiled bytecode encode the length of the metadata
/// that precedes them. When that length is implausible (longer than the code
/// itself), the bytecode is assumed to have been compiled without metadata
/// and is returned unchanged.
#[must_use]
pub fn body(bytes: &[u8]) -> &[u8] {
    if bytes.len() < METADATA_LENGTH_SUFFIX_BYTES {
        return bytes;
    }
    let suffix_start = bytes.len() - METADATA_LENGTH_SUFFIX_BYTES;
    let metadata_length = usize::from(bytes[suffix_start]) << 8 | usize::from(bytes[suffix_start + 1]);
    match suffix_start.checked_sub(metadata_length) {
        Some(body_end) => &bytes[..body_end],
        None => bytes,
    }
}

/// Computes the keccak-256 digest of the metadata-stripped body of `bytes`.
#[must_use]
pub fn body_digest(bytes: &[u8]) -> String {
    digest(body(bytes))
}

/// Extracts the constructor fragment of `creation` bytecode: the prefix that
/// runs at deployment time, before the `deployed` code that it returns.
///
/// If the deployed code cannot be found inside the creation code (which
/// happens when the constructor patches immutable values into the code it
/// returns), the whole creation bytecode is returned.
#[must_use]
pub fn constructor_fragment<'a>(creation: &'a [u8], deployed: &[u8]) -> &'a [u8] {
    if deployed.is_empty() {
        return creation;
    }
    creation
        .windows(deployed.len())
        .position(|window| window == deployed)
        .map_or(creation, |at| &creation[..at])
}

/// Checks whether `bytes` looks like deployed Solidity library code, i.e.
/// whether it opens with the `PUSH20 <own address>` call-protection guard.
#[must_use]
pub fn is_library(bytes: &[u8]) -> bool {
    bytes.first() == Some(&PUSH20_OPCODE) && bytes.len() > ADDRESS_LENGTH_BYTES
}

/// Returns a copy of `bytes` with the library's embedded self-address zeroed,
/// so that two deployments of the same library hash identically.
///
/// Bytecode that does not carry the library guard is returned unchanged.
#[must_use]
pub fn strip_library_address(bytes: &[u8]) -> Vec<u8> {
    let mut stripped = bytes.to_vec();
    if is_library(bytes) {
        stripped[1..=ADDRESS_LENGTH_BYTES].fill(0);
    }
    stripped
}

/// Decodes a hexadecimal bytecode string, with or without the `0x` prefix,
/// into bytes.
pub fn decode_hex(code: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(code.strip_prefix("0x").unwrap_or(code))
}

#[cfg(test)]
mod test {
    use super::{
        body,
        constructor_fragment,
        decode_hex,
        digest,
        is_library,
        strip_library_address,
    };

    #[test]
    fn strips_trailing_metadata() {
        // Three code bytes, four metadata bytes, and the two-byte length.
        let code = [0x60, 0x80, 0x60, 0xa1, 0x65, 0x7a, 0x7a, 0x00, 0x04];
        assert_eq!(body(&code), &[0x60, 0x80, 0x60]);
    }

    #[test]
    fn keeps_code_with_implausible_metadata_length() {
        let code = [0x60, 0x80, 0xff, 0xff];
        assert_eq!(body(&code), &code);
    }

    #[test]
    fn finds_the_constructor_prefix() {
        let deployed = [0xaa, 0xbb, 0xcc];
        let creation = [0x60, 0x80, 0xaa, 0xbb, 0xcc];
        assert_eq!(constructor_fragment(&creation, &deployed), &[0x60, 0x80]);
    }

    #[test]
    fn falls_back_to_whole_creation_code() {
        let deployed = [0xaa, 0xbb, 0xcc];
        let creation = [0x60, 0x80, 0xaa];
        assert_eq!(constructor_fragment(&creation, &deployed), &creation);
    }

    #[test]
    fn recognises_the_library_guard() {
        let mut code = vec![0x73];
        code.extend_from_slice(&[0x11; 20]);
        code.extend_from_slice(&[0x30, 0x14]);
        assert!(is_library(&code));
        assert!(!is_library(&[0x60, 0x80]));
    }

    #[test]
    fn library_digests_ignore_the_deployed_address() {
        let mut at_one = vec![0x73];
        at_one.extend_from_slice(&[0x11; 20]);
        at_one.extend_from_slice(&[0x30, 0x14, 0x52]);

        let mut at_two = vec![0x73];
        at_two.extend_from_slice(&[0x22; 20]);
        at_two.extend_from_slice(&[0x30, 0x14, 0x52]);

        assert_ne!(digest(&at_one), digest(&at_two));
        assert_eq!(
            digest(&strip_library_address(&at_one)),
            digest(&strip_library_address(&at_two))
        );
    }

    #[test]
    fn decodes_hex_with_and_without_prefix() {
        assert_eq!(decode_hex("0x6080").unwrap(), vec![0x60, 0x80]);
        assert_eq!(decode_hex("6080").unwrap(), vec![0x60, 0x80]);
    }
}
