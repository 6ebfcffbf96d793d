//! primitive types shared by the session, the contract and the providers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SessionError};

/// decimals of the contract's base unit
pub const DECIMALS: u32 = 18;

/// one whole unit expressed in base units (10^18)
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// 20-byte account / contract address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// left-padded 32 byte word, as the contract abi expects
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }

    /// shortened form for display: 0x1234…abcd
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}…{}", &full[..6], &full[full.len() - 4..])
    }
}

impl FromStr for Address {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.len() != 40 {
            return Err(SessionError::InvalidAddress(s.to_string()));
        }

        let bytes = hex::decode(digits).map_err(|_| SessionError::InvalidAddress(s.to_string()))?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// token amount in base units
///
/// the contract only ever sees base units. user input and display go through
/// [`Amount::parse_units`] and [`Amount::format_units`], which scale by
/// [`DECIMALS`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_base_units(value: u128) -> Self {
        Self(value)
    }

    pub const fn base_units(self) -> u128 {
        self.0
    }

    /// whole units (1 -> 10^18 base units)
    pub const fn from_units(whole: u64) -> Self {
        Self(whole as u128 * UNIT)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// parse a human decimal ("1", "0.25", ".5") into base units
    pub fn parse_units(input: &str) -> Result<Self> {
        let s = input.trim();
        if s.is_empty() {
            return Err(SessionError::InvalidAmount("empty amount".into()));
        }

        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(SessionError::InvalidAmount(input.to_string()));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SessionError::InvalidAmount(input.to_string()));
        }
        if frac.len() > DECIMALS as usize {
            return Err(SessionError::InvalidAmount(format!(
                "{} has more than {} decimals",
                input, DECIMALS
            )));
        }

        let overflow = || SessionError::InvalidAmount(format!("{} is too large", input));

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let frac: u128 = if frac.is_empty() {
            0
        } else {
            format!("{:0<width$}", frac, width = DECIMALS as usize)
                .parse()
                .map_err(|_| overflow())?
        };

        whole
            .checked_mul(UNIT)
            .and_then(|w| w.checked_add(frac))
            .map(Amount)
            .ok_or_else(overflow)
    }

    /// format base units as a human decimal, always with a fractional part
    pub fn format_units(self) -> String {
        let whole = self.0 / UNIT;
        let frac = self.0 % UNIT;
        let frac = format!("{:0>width$}", frac, width = DECIMALS as usize);
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            format!("{}.0", whole)
        } else {
            format!("{}.{}", whole, frac)
        }
    }

    /// big-endian 32 byte word
    pub fn to_word(self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[16..].copy_from_slice(&self.0.to_be_bytes());
        word
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_units())
    }
}

/// file record stored by the contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    pub size: u64,
}

impl FileRecord {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// transaction hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TxHash(pub [u8; 32]);

impl FromStr for TxHash {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.trim().trim_start_matches("0x");
        let bytes = hex::decode(digits)?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SessionError::DecodingError(format!("bad tx hash: {}", s)))?;
        Ok(Self(hash))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self)
    }
}

/// confirmation of a single write call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}
