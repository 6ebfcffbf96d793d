//! contract interface descriptor and call data codec
//!
//! the vault contract is described by a static abi-style json document.
//! function selectors are derived from it (keccak256 of the canonical
//! signature), and the handful of argument/return shapes the vault uses are
//! encoded here:
//!
//! - `uint256`, `bool`, `address` words
//! - `string` (dynamic)
//! - `(string,uint256)[]` for the file list

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::{Result, SessionError};
use crate::types::{Address, Amount, FileRecord};

/// interface document of the deployed vault contract
pub const VAULT_INTERFACE: &str = r#"[
  {"type":"function","name":"getBalance","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
  {"type":"function","name":"deposit","inputs":[{"name":"_amount","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"},
  {"type":"function","name":"withdraw","inputs":[{"name":"_withdrawAmount","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"},
  {"type":"function","name":"transferOwnership","inputs":[{"name":"newOwner","type":"address"}],"outputs":[],"stateMutability":"nonpayable"},
  {"type":"function","name":"isOwner","inputs":[{"name":"account","type":"address"}],"outputs":[{"name":"","type":"bool"}],"stateMutability":"view"},
  {"type":"function","name":"lockTokens","inputs":[{"name":"_amount","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"},
  {"type":"function","name":"unlockTokens","inputs":[{"name":"_amount","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"},
  {"type":"function","name":"getFiles","inputs":[],"outputs":[{"name":"","type":"tuple[]","components":[{"name":"name","type":"string"},{"name":"size","type":"uint256"}]}],"stateMutability":"view"},
  {"type":"function","name":"addFile","inputs":[{"name":"_name","type":"string"},{"name":"_size","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"},
  {"type":"function","name":"removeFile","inputs":[{"name":"_index","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"}
]"#;

/// function names the session needs from the contract
pub mod functions {
    pub const GET_BALANCE: &str = "getBalance";
    pub const DEPOSIT: &str = "deposit";
    pub const WITHDRAW: &str = "withdraw";
    pub const TRANSFER_OWNERSHIP: &str = "transferOwnership";
    pub const IS_OWNER: &str = "isOwner";
    pub const LOCK_TOKENS: &str = "lockTokens";
    pub const UNLOCK_TOKENS: &str = "unlockTokens";
    pub const GET_FILES: &str = "getFiles";
    pub const ADD_FILE: &str = "addFile";
    pub const REMOVE_FILE: &str = "removeFile";

    pub const REQUIRED: [&str; 10] = [
        GET_BALANCE,
        DEPOSIT,
        WITHDRAW,
        TRANSFER_OWNERSHIP,
        IS_OWNER,
        LOCK_TOKENS,
        UNLOCK_TOKENS,
        GET_FILES,
        ADD_FILE,
        REMOVE_FILE,
    ];
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateMutability {
    Pure,
    View,
    #[default]
    Nonpayable,
    Payable,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Param>,
}

impl Param {
    /// canonical type as used in signatures; tuples expand to their components
    pub fn canonical_type(&self) -> String {
        match self.kind.strip_prefix("tuple") {
            Some(suffix) => {
                let inner: Vec<String> = self.components.iter().map(Param::canonical_type).collect();
                format!("({}){}", inner.join(","), suffix)
            }
            None => self.kind.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDescriptor {
    #[serde(rename = "type", default = "default_entry_type")]
    pub entry_type: String,
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Param>,
    #[serde(default)]
    pub outputs: Vec<Param>,
    #[serde(default)]
    pub state_mutability: StateMutability,
}

fn default_entry_type() -> String {
    "function".into()
}

impl FunctionDescriptor {
    pub fn signature(&self) -> String {
        let inputs: Vec<String> = self.inputs.iter().map(Param::canonical_type).collect();
        format!("{}({})", self.name, inputs.join(","))
    }

    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.signature().as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.state_mutability, StateMutability::View | StateMutability::Pure)
    }

    /// selector followed by the encoded arguments
    pub fn encode_call(&self, args: &[Token]) -> Result<Vec<u8>> {
        if args.len() != self.inputs.len() {
            return Err(SessionError::EncodingError(format!(
                "{} takes {} arguments, got {}",
                self.signature(),
                self.inputs.len(),
                args.len()
            )));
        }

        let mut data = self.selector().to_vec();
        data.extend(encode_tokens(args));
        Ok(data)
    }
}

/// parsed interface document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    functions: Vec<FunctionDescriptor>,
}

impl InterfaceDescriptor {
    pub fn parse(json: &str) -> Result<Self> {
        let entries: Vec<FunctionDescriptor> = serde_json::from_str(json)?;
        let functions = entries
            .into_iter()
            .filter(|entry| entry.entry_type == "function")
            .collect();
        Ok(Self { functions })
    }

    /// the vault interface, checked for every function the session calls
    pub fn vault() -> Result<Self> {
        let descriptor = Self::parse(VAULT_INTERFACE)?;
        descriptor.require(&functions::REQUIRED)?;
        Ok(descriptor)
    }

    pub fn function(&self, name: &str) -> Result<&FunctionDescriptor> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| SessionError::UnknownFunction(name.to_string()))
    }

    pub fn require(&self, names: &[&str]) -> Result<()> {
        for name in names {
            self.function(name)?;
        }
        Ok(())
    }

    pub fn functions(&self) -> &[FunctionDescriptor] {
        &self.functions
    }
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// abi value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Uint(u128),
    Bool(bool),
    Address(Address),
    String(String),
    Tuple(Vec<Token>),
    Array(Vec<Token>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        match self {
            Token::String(_) | Token::Array(_) => true,
            Token::Tuple(tokens) => tokens.iter().any(Token::is_dynamic),
            _ => false,
        }
    }

    fn head_len(&self) -> usize {
        match self {
            Token::Tuple(tokens) if !self.is_dynamic() => tokens.iter().map(Token::head_len).sum(),
            _ => 32,
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        match self {
            Token::Uint(value) => uint_word(*value).to_vec(),
            Token::Bool(value) => uint_word(*value as u128).to_vec(),
            Token::Address(address) => address.to_word().to_vec(),
            Token::String(s) => {
                let mut out = uint_word(s.len() as u128).to_vec();
                out.extend_from_slice(s.as_bytes());
                out.resize(32 + padded_len(s.len()), 0);
                out
            }
            Token::Tuple(tokens) => encode_tokens(tokens),
            Token::Array(tokens) => {
                let mut out = uint_word(tokens.len() as u128).to_vec();
                out.extend(encode_tokens(tokens));
                out
            }
        }
    }
}

impl From<Amount> for Token {
    fn from(amount: Amount) -> Self {
        Token::Uint(amount.base_units())
    }
}

impl From<Address> for Token {
    fn from(address: Address) -> Self {
        Token::Address(address)
    }
}

/// standard head/tail encoding of a token sequence
pub fn encode_tokens(tokens: &[Token]) -> Vec<u8> {
    let heads_len: usize = tokens.iter().map(Token::head_len).sum();
    let mut head = Vec::with_capacity(heads_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&uint_word((heads_len + tail.len()) as u128));
            tail.extend(token.encode_body());
        } else {
            head.extend(token.encode_body());
        }
    }

    head.extend(tail);
    head
}

fn uint_word(value: u128) -> [u8; 32] {
    Amount::from_base_units(value).to_word()
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(32) * 32
}

/// bounds-checked view over return data
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word(&self, at: usize) -> Result<&'a [u8]> {
        at.checked_add(32)
            .and_then(|end| self.data.get(at..end))
            .ok_or_else(|| {
                SessionError::DecodingError(format!(
                    "word at {} out of bounds ({} bytes)",
                    at,
                    self.data.len()
                ))
            })
    }

    fn uint_at(&self, at: usize) -> Result<u128> {
        let word = self.word(at)?;
        if word[..16].iter().any(|b| *b != 0) {
            return Err(SessionError::DecodingError(format!("uint at {} overflows u128", at)));
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(low))
    }

    fn usize_at(&self, at: usize) -> Result<usize> {
        let value = self.uint_at(at)?;
        usize::try_from(value)
            .ok()
            .filter(|v| *v <= self.data.len())
            .ok_or_else(|| SessionError::DecodingError(format!("offset/length {} at {} out of range", value, at)))
    }

    fn string_at(&self, at: usize) -> Result<String> {
        let len = self.usize_at(at)?;
        let start = at + 32;
        let bytes = self
            .data
            .get(start..start + len)
            .ok_or_else(|| SessionError::DecodingError(format!("string at {} truncated", at)))?;
        String::from_utf8(bytes.to_vec()).map_err(|e| SessionError::DecodingError(e.to_string()))
    }
}

pub fn decode_uint(data: &[u8]) -> Result<u128> {
    Reader::new(data).uint_at(0)
}

pub fn decode_amount(data: &[u8]) -> Result<Amount> {
    decode_uint(data).map(Amount::from_base_units)
}

pub fn decode_bool(data: &[u8]) -> Result<bool> {
    match decode_uint(data)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(SessionError::DecodingError(format!("invalid bool word {}", other))),
    }
}

/// decode a `(string,uint256)[]` return value
pub fn decode_files(data: &[u8]) -> Result<Vec<FileRecord>> {
    let reader = Reader::new(data);
    let array_at = reader.usize_at(0)?;
    let len = reader.usize_at(array_at)?;
    let base = array_at + 32;

    (0..len)
        .map(|i| {
            let tuple_at = base + reader.usize_at(base + i * 32)?;
            let name_at = tuple_at + reader.usize_at(tuple_at)?;
            let size = reader.uint_at(tuple_at + 32)?;
            let size = u64::try_from(size)
                .map_err(|_| SessionError::DecodingError(format!("file size {} overflows u64", size)))?;
            Ok(FileRecord {
                name: reader.string_at(name_at)?,
                size,
            })
        })
        .collect()
}

/// encode a file list the way the contract returns it
pub fn encode_files(files: &[FileRecord]) -> Vec<u8> {
    let entries = files
        .iter()
        .map(|f| Token::Tuple(vec![Token::String(f.name.clone()), Token::Uint(f.size as u128)]))
        .collect();
    encode_tokens(&[Token::Array(entries)])
}
