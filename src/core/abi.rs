// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Solidity ABI value model.
//!
//! App states and actions are opaque to the engine but typed: every app
//! declares its state encoding as a Solidity type string such as
//! `tuple(address to, uint256 amount)[]`. This module parses those strings
//! into [`ParamType`], checks [`Token`] values against them, and implements
//! the standard head/tail encoding plus the tightly packed form used by
//! commitment digests.

use crate::core::types::{address_to_word, u256_to_bytes, Address, H256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ABI errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AbiError {
    /// Type string could not be parsed.
    #[error("invalid type string: {0}")]
    InvalidType(String),
    /// Value does not match the declared type.
    #[error("value does not match type")]
    TypeMismatch,
    /// Encoded data ended early.
    #[error("buffer too short")]
    ShortBuffer,
    /// Encoded data is malformed (bad padding, offsets, utf8).
    #[error("invalid data")]
    InvalidData,
}

/// Solidity parameter type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    /// `address`
    Address,
    /// `bool`
    Bool,
    /// `uintN`
    Uint(usize),
    /// `intN` (two's complement word)
    Int(usize),
    /// `bytesN`
    FixedBytes(usize),
    /// `bytes`
    Bytes,
    /// `string`
    String,
    /// `T[]`
    Array(Box<ParamType>),
    /// `T[N]`
    FixedArray(Box<ParamType>, usize),
    /// `tuple(...)`
    Tuple(Vec<ParamType>),
}

/// ABI value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Token {
    /// `address`
    Address(Address),
    /// `bool`
    Bool(bool),
    /// `uintN`
    Uint(U256),
    /// `intN`, raw two's complement word.
    Int(U256),
    /// `bytesN`
    FixedBytes(Vec<u8>),
    /// `bytes`
    Bytes(Vec<u8>),
    /// `string`
    String(String),
    /// `T[]`
    Array(Vec<Token>),
    /// `T[N]`
    FixedArray(Vec<Token>),
    /// `tuple(...)`
    Tuple(Vec<Token>),
}

impl Token {
    /// `uint256` from a u64.
    pub fn uint(v: u64) -> Self {
        Token::Uint(U256::from(v))
    }

    /// `bytes32` from a hash.
    pub fn bytes32(h: &H256) -> Self {
        Token::FixedBytes(h.as_bytes().to_vec())
    }

    /// Address value, if this is an address.
    pub fn as_address(&self) -> Option<Address> {
        match self {
            Token::Address(a) => Some(*a),
            _ => None,
        }
    }

    /// Unsigned value, if this is a uint.
    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Token::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// Elements of an array, fixed array or tuple.
    pub fn as_sequence(&self) -> Option<&[Token]> {
        match self {
            Token::Array(v) | Token::FixedArray(v) | Token::Tuple(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the value matches `ty`.
    pub fn type_check(&self, ty: &ParamType) -> bool {
        match (self, ty) {
            (Token::Address(_), ParamType::Address) => true,
            (Token::Bool(_), ParamType::Bool) => true,
            (Token::Uint(v), ParamType::Uint(bits)) => v.bits() <= *bits,
            (Token::Int(_), ParamType::Int(_)) => true,
            (Token::FixedBytes(b), ParamType::FixedBytes(n)) => b.len() == *n,
            (Token::Bytes(_), ParamType::Bytes) => true,
            (Token::String(_), ParamType::String) => true,
            (Token::Array(items), ParamType::Array(inner)) => {
                items.iter().all(|t| t.type_check(inner))
            }
            (Token::FixedArray(items), ParamType::FixedArray(inner, n)) => {
                items.len() == *n && items.iter().all(|t| t.type_check(inner))
            }
            (Token::Tuple(items), ParamType::Tuple(types)) => {
                items.len() == types.len()
                    && items.iter().zip(types.iter()).all(|(t, ty)| t.type_check(ty))
            }
            _ => false,
        }
    }
}

/// keccak256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> H256 {
    H256(keccak_hash::keccak(data).0)
}

/// 4-byte function selector of a canonical signature, e.g. `setup(address[])`.
pub fn selector(signature: &str) -> [u8; 4] {
    let h = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&h.as_bytes()[..4]);
    out
}

/// Call data: selector followed by the encoded arguments.
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend_from_slice(&encode(args));
    out
}

/// Parse a Solidity type string. Component names inside tuples are accepted and dropped.
pub fn parse_param_type(s: &str) -> Result<ParamType, AbiError> {
    let mut p = TypeParser { s: s.as_bytes(), pos: 0 };
    let ty = p.parse_type()?;
    p.skip_ws();
    if p.pos != p.s.len() {
        return Err(AbiError::InvalidType(s.to_string()));
    }
    Ok(ty)
}

struct TypeParser<'a> {
    s: &'a [u8],
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn err(&self) -> AbiError {
        AbiError::InvalidType(String::from_utf8_lossy(self.s).into_owned())
    }

    fn peek(&self) -> Option<u8> {
        self.s.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: u8) -> Result<(), AbiError> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.err())
        }
    }

    fn ident(&mut self) -> &'a str {
        let s: &'a [u8] = self.s;
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.pos += 1;
        }
        std::str::from_utf8(&s[start..self.pos]).unwrap_or("")
    }

    fn parse_type(&mut self) -> Result<ParamType, AbiError> {
        self.skip_ws();
        let mut ty = if self.peek() == Some(b'(') {
            self.pos += 1;
            ParamType::Tuple(self.parse_components()?)
        } else {
            let id = self.ident();
            if id == "tuple" {
                self.expect(b'(')?;
                ParamType::Tuple(self.parse_components()?)
            } else {
                elementary(id).ok_or_else(|| self.err())?
            }
        };
        while self.peek() == Some(b'[') {
            self.pos += 1;
            let start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
            let digits = std::str::from_utf8(&self.s[start..self.pos]).unwrap_or("");
            self.expect(b']')?;
            ty = if digits.is_empty() {
                ParamType::Array(Box::new(ty))
            } else {
                let n = digits.parse::<usize>().map_err(|_| self.err())?;
                ParamType::FixedArray(Box::new(ty), n)
            };
        }
        Ok(ty)
    }

    fn parse_components(&mut self) -> Result<Vec<ParamType>, AbiError> {
        let mut out = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b')') {
            self.pos += 1;
            return Ok(out);
        }
        loop {
            let ty = self.parse_type()?;
            self.skip_ws();
            if matches!(self.peek(), Some(c) if c.is_ascii_alphabetic() || c == b'_') {
                let _name = self.ident();
                self.skip_ws();
            }
            out.push(ty);
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b')') => {
                    self.pos += 1;
                    return Ok(out);
                }
                _ => return Err(self.err()),
            }
        }
    }
}

fn elementary(id: &str) -> Option<ParamType> {
    match id {
        "address" => return Some(ParamType::Address),
        "bool" => return Some(ParamType::Bool),
        "string" => return Some(ParamType::String),
        "bytes" => return Some(ParamType::Bytes),
        "uint" => return Some(ParamType::Uint(256)),
        "int" => return Some(ParamType::Int(256)),
        _ => {}
    }
    let sized = |rest: &str, max: usize, step: usize| -> Option<usize> {
        let n = rest.parse::<usize>().ok()?;
        (n > 0 && n <= max && n % step == 0).then_some(n)
    };
    if let Some(rest) = id.strip_prefix("uint") {
        return sized(rest, 256, 8).map(ParamType::Uint);
    }
    if let Some(rest) = id.strip_prefix("int") {
        return sized(rest, 256, 8).map(ParamType::Int);
    }
    if let Some(rest) = id.strip_prefix("bytes") {
        return sized(rest, 32, 1).map(ParamType::FixedBytes);
    }
    None
}

fn word(v: usize) -> [u8; 32] {
    u256_to_bytes(&U256::from(v))
}

fn is_dynamic(t: &Token) -> bool {
    match t {
        Token::Bytes(_) | Token::String(_) | Token::Array(_) => true,
        Token::FixedArray(items) | Token::Tuple(items) => items.iter().any(is_dynamic),
        _ => false,
    }
}

fn static_len(t: &Token) -> usize {
    match t {
        Token::FixedArray(items) | Token::Tuple(items) => items.iter().map(static_len).sum(),
        _ => 32,
    }
}

fn pad_right(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
    let rem = data.len() % 32;
    if rem != 0 {
        out.extend(std::iter::repeat(0u8).take(32 - rem));
    }
}

fn encode_head_tail(tokens: &[Token]) -> Vec<u8> {
    let head_len: usize = tokens
        .iter()
        .map(|t| if is_dynamic(t) { 32 } else { static_len(t) })
        .sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for t in tokens {
        if is_dynamic(t) {
            head.extend_from_slice(&word(head_len + tail.len()));
            tail.extend_from_slice(&encode_token(t));
        } else {
            head.extend_from_slice(&encode_token(t));
        }
    }
    head.extend_from_slice(&tail);
    head
}

fn encode_token(t: &Token) -> Vec<u8> {
    match t {
        Token::Address(a) => address_to_word(a).to_vec(),
        Token::Bool(b) => word(usize::from(*b)).to_vec(),
        Token::Uint(v) | Token::Int(v) => u256_to_bytes(v).to_vec(),
        Token::FixedBytes(b) => {
            let mut out = Vec::with_capacity(32);
            pad_right(&mut out, &b[..b.len().min(32)]);
            if out.is_empty() {
                out.extend_from_slice(&[0u8; 32]);
            }
            out
        }
        Token::Bytes(b) => {
            let mut out = word(b.len()).to_vec();
            pad_right(&mut out, b);
            out
        }
        Token::String(s) => {
            let mut out = word(s.len()).to_vec();
            pad_right(&mut out, s.as_bytes());
            out
        }
        Token::Array(items) => {
            let mut out = word(items.len()).to_vec();
            out.extend_from_slice(&encode_head_tail(items));
            out
        }
        Token::FixedArray(items) | Token::Tuple(items) => encode_head_tail(items),
    }
}

/// Standard ABI encoding of a parameter list (`abi.encode(a, b, ...)`).
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    encode_head_tail(tokens)
}

fn is_dynamic_type(t: &ParamType) -> bool {
    match t {
        ParamType::Bytes | ParamType::String | ParamType::Array(_) => true,
        ParamType::FixedArray(inner, _) => is_dynamic_type(inner),
        ParamType::Tuple(ts) => ts.iter().any(is_dynamic_type),
        _ => false,
    }
}

fn static_size(t: &ParamType) -> usize {
    match t {
        ParamType::FixedArray(inner, n) => n.saturating_mul(static_size(inner)),
        ParamType::Tuple(ts) => ts.iter().map(static_size).sum(),
        _ => 32,
    }
}

fn read_word(data: &[u8], pos: usize) -> Result<&[u8], AbiError> {
    let end = pos.checked_add(32).ok_or(AbiError::ShortBuffer)?;
    data.get(pos..end).ok_or(AbiError::ShortBuffer)
}

fn read_usize(data: &[u8], pos: usize) -> Result<usize, AbiError> {
    let v = U256::from_big_endian(read_word(data, pos)?);
    if v > U256::from(data.len()) {
        return Err(AbiError::InvalidData);
    }
    Ok(v.low_u64() as usize)
}

fn decode_tuple(types: &[ParamType], data: &[u8], base: usize) -> Result<Vec<Token>, AbiError> {
    let mut out = Vec::with_capacity(types.len());
    let mut head = base;
    for ty in types {
        if is_dynamic_type(ty) {
            let offset = read_usize(data, head)?;
            let at = base.checked_add(offset).ok_or(AbiError::InvalidData)?;
            out.push(decode_at(ty, data, at)?);
            head += 32;
        } else {
            out.push(decode_at(ty, data, head)?);
            head = head.saturating_add(static_size(ty));
        }
    }
    Ok(out)
}

fn decode_sequence(
    inner: &ParamType,
    len: usize,
    data: &[u8],
    base: usize,
) -> Result<Vec<Token>, AbiError> {
    // Every element occupies at least one word of head space.
    let available = data.len().saturating_sub(base) / 32;
    if len > available && static_size(inner) != 0 {
        return Err(AbiError::ShortBuffer);
    }
    let types = vec![inner.clone(); len];
    decode_tuple(&types, data, base)
}

fn decode_at(ty: &ParamType, data: &[u8], pos: usize) -> Result<Token, AbiError> {
    match ty {
        ParamType::Address => {
            let w = read_word(data, pos)?;
            if w[..12].iter().any(|b| *b != 0) {
                return Err(AbiError::InvalidData);
            }
            Ok(Token::Address(Address::from_slice(&w[12..])))
        }
        ParamType::Bool => {
            let v = U256::from_big_endian(read_word(data, pos)?);
            if v > U256::one() {
                return Err(AbiError::InvalidData);
            }
            Ok(Token::Bool(v == U256::one()))
        }
        ParamType::Uint(bits) => {
            let v = U256::from_big_endian(read_word(data, pos)?);
            if v.bits() > *bits {
                return Err(AbiError::InvalidData);
            }
            Ok(Token::Uint(v))
        }
        ParamType::Int(_) => Ok(Token::Int(U256::from_big_endian(read_word(data, pos)?))),
        ParamType::FixedBytes(n) => {
            let w = read_word(data, pos)?;
            if w[*n..].iter().any(|b| *b != 0) {
                return Err(AbiError::InvalidData);
            }
            Ok(Token::FixedBytes(w[..*n].to_vec()))
        }
        ParamType::Bytes | ParamType::String => {
            let len = read_usize(data, pos)?;
            let start = pos + 32;
            let end = start.checked_add(len).ok_or(AbiError::InvalidData)?;
            let bytes = data.get(start..end).ok_or(AbiError::ShortBuffer)?.to_vec();
            if matches!(ty, ParamType::String) {
                String::from_utf8(bytes)
                    .map(Token::String)
                    .map_err(|_| AbiError::InvalidData)
            } else {
                Ok(Token::Bytes(bytes))
            }
        }
        ParamType::Array(inner) => {
            let len = read_usize(data, pos)?;
            decode_sequence(inner, len, data, pos + 32).map(Token::Array)
        }
        ParamType::FixedArray(inner, n) => {
            decode_sequence(inner, *n, data, pos).map(Token::FixedArray)
        }
        ParamType::Tuple(ts) => decode_tuple(ts, data, pos).map(Token::Tuple),
    }
}

/// Decode a parameter list.
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    decode_tuple(types, data, 0)
}

/// Decode exactly one value of `ty` (as produced by `abi.encode(value)`).
pub fn decode_single(ty: &ParamType, data: &[u8]) -> Result<Token, AbiError> {
    let mut out = decode(std::slice::from_ref(ty), data)?;
    out.pop().ok_or(AbiError::InvalidData)
}

/// Encode a single value after checking it against a type string.
pub fn encode_typed(encoding: &str, value: &Token) -> Result<Vec<u8>, AbiError> {
    let ty = parse_param_type(encoding)?;
    if !value.type_check(&ty) {
        return Err(AbiError::TypeMismatch);
    }
    Ok(encode(std::slice::from_ref(value)))
}

/// Tightly packed encoding (`abi.encodePacked`) for digest layouts.
#[derive(Clone, Debug, Default)]
pub struct Packed(Vec<u8>);

impl Packed {
    /// Empty buffer.
    pub fn new() -> Self {
        Self(Vec::with_capacity(128))
    }

    /// `bytes1`
    pub fn byte(mut self, b: u8) -> Self {
        self.0.push(b);
        self
    }

    /// `address` (20 bytes)
    pub fn address(mut self, a: &Address) -> Self {
        self.0.extend_from_slice(a.as_bytes());
        self
    }

    /// `address[]` (each element padded to a word).
    pub fn address_array(mut self, addrs: &[Address]) -> Self {
        for a in addrs {
            self.0.extend_from_slice(&address_to_word(a));
        }
        self
    }

    /// `uint256`
    pub fn uint256(mut self, v: &U256) -> Self {
        self.0.extend_from_slice(&u256_to_bytes(v));
        self
    }

    /// `bytes32`
    pub fn bytes32(mut self, h: &H256) -> Self {
        self.0.extend_from_slice(h.as_bytes());
        self
    }

    /// Raw `bytes`.
    pub fn bytes(mut self, b: &[u8]) -> Self {
        self.0.extend_from_slice(b);
        self
    }

    /// Packed bytes.
    pub fn finish(self) -> Vec<u8> {
        self.0
    }

    /// keccak256 of the packed bytes.
    pub fn keccak(self) -> H256 {
        keccak256(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matches_solidity_docs() {
        assert_eq!(hex::encode(selector("baz(uint32,bool)")), "cdcd77c0");
    }

    #[test]
    fn dynamic_call_matches_solidity_docs() {
        let mut b10 = b"1234567890".to_vec();
        b10.truncate(10);
        let data = encode_call(
            "f(uint256,uint32[],bytes10,bytes)",
            &[
                Token::uint(0x123),
                Token::Array(vec![Token::uint(0x456), Token::uint(0x789)]),
                Token::FixedBytes(b10),
                Token::Bytes(b"Hello, world!".to_vec()),
            ],
        );
        let expected = concat!(
            "8be65246",
            "0000000000000000000000000000000000000000000000000000000000000123",
            "0000000000000000000000000000000000000000000000000000000000000080",
            "3132333435363738393000000000000000000000000000000000000000000000",
            "00000000000000000000000000000000000000000000000000000000000000e0",
            "0000000000000000000000000000000000000000000000000000000000000002",
            "0000000000000000000000000000000000000000000000000000000000000456",
            "0000000000000000000000000000000000000000000000000000000000000789",
            "000000000000000000000000000000000000000000000000000000000000000d",
            "48656c6c6f2c20776f726c642100000000000000000000000000000000000000",
        );
        assert_eq!(hex::encode(data), expected);
    }

    #[test]
    fn parses_named_nested_tuples() {
        let ty = parse_param_type(
            "tuple(address[] tokenAddresses, tuple(address to, uint256 amount)[][] balances, bytes32[] activeApps)",
        )
        .unwrap();
        let coin = ParamType::Tuple(vec![ParamType::Address, ParamType::Uint(256)]);
        assert_eq!(
            ty,
            ParamType::Tuple(vec![
                ParamType::Array(Box::new(ParamType::Address)),
                ParamType::Array(Box::new(ParamType::Array(Box::new(coin)))),
                ParamType::Array(Box::new(ParamType::FixedBytes(32))),
            ])
        );
        assert!(parse_param_type("tuple(uint7 x)").is_err());
        assert!(parse_param_type("uint256 trailing junk").is_err());
    }

    #[test]
    fn decode_inverts_encode_for_nested_dynamic_value() {
        let ty = parse_param_type("tuple(tuple(address to, uint256 amount)[2] transfers, bytes note)").unwrap();
        let value = Token::Tuple(vec![
            Token::FixedArray(vec![
                Token::Tuple(vec![Token::Address(Address::repeat_byte(1)), Token::uint(7)]),
                Token::Tuple(vec![Token::Address(Address::repeat_byte(2)), Token::uint(9)]),
            ]),
            Token::Bytes(vec![0xab; 40]),
        ]);
        assert!(value.type_check(&ty));
        let bytes = encode(std::slice::from_ref(&value));
        assert_eq!(decode_single(&ty, &bytes).unwrap(), value);
    }

    #[test]
    fn rejects_dirty_address_padding() {
        let mut w = [0u8; 32];
        w[0] = 1;
        assert_eq!(decode_single(&ParamType::Address, &w), Err(AbiError::InvalidData));
    }
}
