//! Text hash lines for external cracking engines.
//!
//! A profile is written as one `$`-delimited line:
//!
//! ```text
//! $rar5$16$<salt hex>$<round log>$<iv hex>$8$<check hex>
//! ```
//!
//! Header-encrypted and per-entry profiles share this form. The IV field is
//! always present: an absent IV is written as 32 `0` digits, and that
//! placeholder reads back as "no IV".

use crate::crypto::{CryptoProfile, SIZE_INITV, SIZE_PSWCHECK, SIZE_SALT};
use crate::error::{RarError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const TAG: &str = "rar5";
const IV_PLACEHOLDER: &str = "00000000000000000000000000000000";

/// Line variants seen in the wild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashEncoding {
    /// Seven fields, no trailer.
    #[default]
    Standard,
    /// Standard plus a trailing `$0` field.
    TrailingZero,
}

/// Encode the salt / check pair of `profile`.
pub fn encode_hash(profile: &CryptoProfile, encoding: HashEncoding) -> Result<String> {
    let (salt, check) = profile.fast_check()?;
    let iv = profile
        .iv()
        .map_or_else(|| IV_PLACEHOLDER.to_string(), hex::encode);

    let mut line = format!(
        "${TAG}${}${}${}${}${}${}",
        SIZE_SALT,
        hex::encode(salt),
        profile.kdf_round_log,
        iv,
        SIZE_PSWCHECK,
        hex::encode(check),
    );
    if encoding == HashEncoding::TrailingZero {
        line.push_str("$0");
    }
    Ok(line)
}

/// A parsed hash line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashLine {
    pub profile: CryptoProfile,
    pub encoding: HashEncoding,
}

/// Parse a line produced by [`encode_hash`] or by another tool using the
/// same form.
pub fn decode_hash(line: &str) -> Result<HashLine> {
    let line = line.trim();
    let rest = line
        .strip_prefix('$')
        .ok_or(RarError::InvalidHash("missing leading '$'"))?;
    let fields: Vec<&str> = rest.split('$').collect();

    let encoding = match fields.len() {
        7 => HashEncoding::Standard,
        8 if fields[7] == "0" => HashEncoding::TrailingZero,
        8 => return Err(RarError::InvalidHash("unknown trailer")),
        _ => return Err(RarError::InvalidHash("wrong field count")),
    };

    if fields[0] != TAG {
        return Err(RarError::InvalidHash("not a rar5 hash"));
    }
    if fields[1] != SIZE_SALT.to_string() || fields[5] != SIZE_PSWCHECK.to_string() {
        return Err(RarError::InvalidHash("unexpected field length"));
    }

    let salt: [u8; SIZE_SALT] = decode_field(fields[2], "bad salt")?;
    let round_log: u8 = fields[3]
        .parse()
        .map_err(|_| RarError::InvalidHash("bad round count"))?;
    if round_log > crate::crypto::MAX_KDF_ROUND_LOG {
        return Err(RarError::InvalidHash("round count too large"));
    }
    let iv = if fields[4] == IV_PLACEHOLDER {
        None
    } else {
        Some(decode_field::<SIZE_INITV>(fields[4], "bad iv")?)
    };
    let check: [u8; SIZE_PSWCHECK] = decode_field(fields[6], "bad password check")?;

    let profile = CryptoProfile::new(Some(salt), Some(check))
        .with_iv(iv)
        .with_round_log(round_log);

    Ok(HashLine { profile, encoding })
}

fn decode_field<const N: usize>(field: &str, reason: &'static str) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    hex::decode_to_slice(field, &mut out).map_err(|_| RarError::InvalidHash(reason))?;
    Ok(out)
}

impl FromStr for HashLine {
    type Err = RarError;

    fn from_str(s: &str) -> Result<Self> {
        decode_hash(s)
    }
}

impl fmt::Display for HashLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = encode_hash(&self.profile, self.encoding).map_err(|_| fmt::Error)?;
        f.write_str(&line)
    }
}
