//! Schema fingerprints
//!
//! A fingerprint is a digest over a schema's canonical form. The 64-bit
//! CRC-64-AVRO (Rabin) digest identifies writer schemas in message headers;
//! MD5 and SHA-256 are available for stores that need collision resistance.

use std::fmt;
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CodecError, Result};
use crate::schema::Schema;

/// Empty value of the CRC-64-AVRO polynomial
pub const RABIN_EMPTY: u64 = 0xc15d_213a_a4d7_a795;

const RABIN_TABLE: [u64; 256] = rabin_table();

const fn rabin_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut fp = i as u64;
        let mut j = 0;
        while j < 8 {
            fp = (fp >> 1) ^ (RABIN_EMPTY & (fp & 1).wrapping_neg());
            j += 1;
        }
        table[i] = fp;
        i += 1;
    }
    table
}

/// Compute the CRC-64-AVRO fingerprint of raw bytes
pub fn rabin(data: &[u8]) -> u64 {
    data.iter().fold(RABIN_EMPTY, |fp, &b| {
        (fp >> 8) ^ RABIN_TABLE[((fp ^ b as u64) & 0xff) as usize]
    })
}

/// Digest algorithm used for a fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintAlgorithm {
    /// 64-bit CRC-64-AVRO
    #[default]
    Rabin,
    /// 128-bit MD5
    Md5,
    /// 256-bit SHA-256
    Sha256,
}

impl FingerprintAlgorithm {
    /// Width of the digest in bytes
    pub fn width(&self) -> usize {
        match self {
            FingerprintAlgorithm::Rabin => 8,
            FingerprintAlgorithm::Md5 => 16,
            FingerprintAlgorithm::Sha256 => 32,
        }
    }
}

impl FromStr for FingerprintAlgorithm {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rabin" | "crc-64-avro" | "crc64" => Ok(FingerprintAlgorithm::Rabin),
            "md5" => Ok(FingerprintAlgorithm::Md5),
            "sha256" | "sha-256" => Ok(FingerprintAlgorithm::Sha256),
            other => Err(CodecError::invalid(format!("unknown fingerprint algorithm '{}'", other))),
        }
    }
}

/// A schema fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Fingerprint {
    Rabin(u64),
    Md5([u8; 16]),
    Sha256([u8; 32]),
}

impl Fingerprint {
    pub fn algorithm(&self) -> FingerprintAlgorithm {
        match self {
            Fingerprint::Rabin(_) => FingerprintAlgorithm::Rabin,
            Fingerprint::Md5(_) => FingerprintAlgorithm::Md5,
            Fingerprint::Sha256(_) => FingerprintAlgorithm::Sha256,
        }
    }

    /// Digest bytes as they appear on the wire. Rabin fingerprints are
    /// little-endian.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Fingerprint::Rabin(fp) => fp.to_le_bytes().to_vec(),
            Fingerprint::Md5(bytes) => bytes.to_vec(),
            Fingerprint::Sha256(bytes) => bytes.to_vec(),
        }
    }

    /// Rebuild a fingerprint from its wire bytes
    pub fn from_bytes(algorithm: FingerprintAlgorithm, bytes: &[u8]) -> Result<Self> {
        let width_error = || {
            CodecError::invalid(format!(
                "{:?} fingerprint needs {} bytes, got {}",
                algorithm,
                algorithm.width(),
                bytes.len()
            ))
        };
        match algorithm {
            FingerprintAlgorithm::Rabin => bytes
                .try_into()
                .map(|b| Fingerprint::Rabin(u64::from_le_bytes(b)))
                .map_err(|_| width_error()),
            FingerprintAlgorithm::Md5 => bytes.try_into().map(Fingerprint::Md5).map_err(|_| width_error()),
            FingerprintAlgorithm::Sha256 => bytes.try_into().map(Fingerprint::Sha256).map_err(|_| width_error()),
        }
    }

    /// Lowercase hex of the digest. Rabin fingerprints print as the 64-bit
    /// number, most significant digit first.
    pub fn to_hex(&self) -> String {
        match self {
            Fingerprint::Rabin(fp) => format!("{:016x}", fp),
            Fingerprint::Md5(bytes) => hex::encode(bytes),
            Fingerprint::Sha256(bytes) => hex::encode(bytes),
        }
    }

    /// Parse the output of [`Fingerprint::to_hex`]; the width selects the algorithm
    pub fn from_hex(s: &str) -> Result<Self> {
        let invalid = || CodecError::invalid(format!("'{}' is not a fingerprint", s));
        let bytes = hex::decode(s).map_err(|_| invalid())?;
        match bytes.len() {
            8 => {
                let mut number = [0u8; 8];
                number.copy_from_slice(&bytes);
                Ok(Fingerprint::Rabin(u64::from_be_bytes(number)))
            }
            16 => Fingerprint::from_bytes(FingerprintAlgorithm::Md5, &bytes),
            32 => Fingerprint::from_bytes(FingerprintAlgorithm::Sha256, &bytes),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Digest canonical bytes with the given algorithm
pub fn digest(canonical: &[u8], algorithm: FingerprintAlgorithm) -> Fingerprint {
    match algorithm {
        FingerprintAlgorithm::Rabin => Fingerprint::Rabin(rabin(canonical)),
        FingerprintAlgorithm::Md5 => Fingerprint::Md5(Md5::digest(canonical).into()),
        FingerprintAlgorithm::Sha256 => Fingerprint::Sha256(Sha256::digest(canonical).into()),
    }
}

/// Fingerprint a schema tree. Callers holding a [`SchemaEntry`](crate::SchemaEntry)
/// should use its memoized [`fingerprint`](crate::SchemaEntry::fingerprint) instead.
pub fn fingerprint(schema: &Schema, algorithm: FingerprintAlgorithm) -> Result<Fingerprint> {
    let canonical = crate::canonical::canonical_form(schema)?;
    Ok(digest(canonical.as_bytes(), algorithm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rabin_known_vectors() {
        assert_eq!(rabin(br#""null""#), 0x63dd_24e7_cc25_8f8a);
        assert_eq!(rabin(br#""boolean""#) as i64, -6970731678124411036);
        assert_eq!(rabin(br#""int""#), 8247732601305521295);
        assert_eq!(rabin(b""), RABIN_EMPTY);
    }

    #[test]
    fn test_crypto_digests() {
        let int = br#""int""#;
        assert_eq!(
            digest(int, FingerprintAlgorithm::Md5).to_hex(),
            "ef524ea1b91e73173d938ade36c1db32"
        );
        assert_eq!(
            digest(int, FingerprintAlgorithm::Sha256).to_hex(),
            "3f2b87a9fe7cc9b13835598c3981cd45e3e355309e5090aa0933d7becb6fba45"
        );
    }

    #[test]
    fn test_wire_bytes_are_little_endian() {
        let fp = Fingerprint::Rabin(0x0102_0304_0506_0708);
        assert_eq!(fp.to_bytes(), vec![8, 7, 6, 5, 4, 3, 2, 1]);
        let back = Fingerprint::from_bytes(FingerprintAlgorithm::Rabin, &fp.to_bytes()).unwrap();
        assert_eq!(back, fp);
        assert!(Fingerprint::from_bytes(FingerprintAlgorithm::Rabin, &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_hex_parsing() {
        let rabin = Fingerprint::Rabin(0x63dd_24e7_cc25_8f8a);
        assert_eq!(rabin.to_hex(), "63dd24e7cc258f8a");
        assert_eq!(Fingerprint::from_hex("63dd24e7cc258f8a").unwrap(), rabin);

        let md5 = digest(b"x", FingerprintAlgorithm::Md5);
        assert_eq!(Fingerprint::from_hex(&md5.to_hex()).unwrap(), md5);
        assert!(Fingerprint::from_hex("zz").is_err());
        assert!(Fingerprint::from_hex("abc").is_err());
        assert!(Fingerprint::from_hex("0102").is_err());

        let sha = digest(b"x", FingerprintAlgorithm::Sha256);
        assert_eq!(sha.to_hex().len(), 64);
        assert_eq!(Fingerprint::from_hex(&sha.to_hex()).unwrap(), sha);
        assert_eq!(
            Fingerprint::Md5([0xab; 16]).to_hex(),
            "abababababababababababababababab"
        );
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("rabin".parse::<FingerprintAlgorithm>().unwrap(), FingerprintAlgorithm::Rabin);
        assert_eq!("SHA256".parse::<FingerprintAlgorithm>().unwrap(), FingerprintAlgorithm::Sha256);
        assert!("crc32".parse::<FingerprintAlgorithm>().is_err());
    }
}
