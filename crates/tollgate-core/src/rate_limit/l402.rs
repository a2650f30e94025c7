//! L402 credential decoding
//!
//! Extracts the token identifier from an L402 credential so it can key
//! per-client rate limits. Nothing here verifies anything: the caller must
//! only trust the result for requests its authenticator already accepted.
//!
//! Supported carriers:
//! - `Authorization: L402 <base64 macaroon>[,<base64 macaroon>...]:<hex preimage>`
//!   (and the legacy `LSAT` scheme)
//! - `Grpc-Metadata-Macaroon: <hex macaroon>`
//! - `Macaroon: <hex macaroon>`

use std::fmt;

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::prelude::*;

/// Length of the payment hash in an identifier
pub const PAYMENT_HASH_LEN: usize = 32;

/// Length of the token ID in an identifier
pub const TOKEN_ID_LEN: usize = 32;

/// Length of a hex-encoded preimage
const PREIMAGE_HEX_LEN: usize = 64;

/// The only identifier version in use
const IDENTIFIER_VERSION_0: u16 = 0;

/// Serialized size of a version 0 identifier
const IDENTIFIER_V0_LEN: usize = 2 + PAYMENT_HASH_LEN + TOKEN_ID_LEN;

const MACAROON_V2: u8 = 2;
const FIELD_LOCATION: u64 = 1;
const FIELD_IDENTIFIER: u64 = 2;

const GRPC_MACAROON_HEADER: &str = "grpc-metadata-macaroon";
const MACAROON_HEADER: &str = "macaroon";

/// Unique per-credential token identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TokenId(pub [u8; TOKEN_ID_LEN]);

impl fmt::Display for TokenId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&hex::encode(self.0))
	}
}

/// Decoded macaroon identifier
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identifier {
	pub version: u16,
	pub payment_hash: [u8; PAYMENT_HASH_LEN],
	pub token_id: TokenId,
}

/// Decode a macaroon identifier (`version || payment_hash || token_id`)
pub fn decode_identifier(bytes: &[u8]) -> TgResult<Identifier> {
	let (version, rest) = bytes.split_first_chunk::<2>().ok_or(Error::Parse)?;
	let version = u16::from_be_bytes(*version);
	if version != IDENTIFIER_VERSION_0 {
		return Err(Error::ValidationError(format!("unknown identifier version {}", version)));
	}
	if bytes.len() < IDENTIFIER_V0_LEN {
		return Err(Error::Parse);
	}

	let (payment_hash, rest) = rest.split_first_chunk::<PAYMENT_HASH_LEN>().ok_or(Error::Parse)?;
	let (token_id, _) = rest.split_first_chunk::<TOKEN_ID_LEN>().ok_or(Error::Parse)?;

	Ok(Identifier { version, payment_hash: *payment_hash, token_id: TokenId(*token_id) })
}

/// Encode an identifier the way `decode_identifier` reads it
pub fn encode_identifier(identifier: &Identifier) -> Vec<u8> {
	let mut out = Vec::with_capacity(IDENTIFIER_V0_LEN);
	out.extend_from_slice(&identifier.version.to_be_bytes());
	out.extend_from_slice(&identifier.payment_hash);
	out.extend_from_slice(&identifier.token_id.0);
	out
}

/// Read an unsigned LEB128 varint
fn read_uvarint(data: &[u8]) -> TgResult<(u64, &[u8])> {
	let mut value = 0u64;
	for (i, byte) in data.iter().enumerate().take(10) {
		value |= u64::from(byte & 0x7f) << (7 * i);
		if byte & 0x80 == 0 {
			return Ok((value, &data[i + 1..]));
		}
	}
	Err(Error::Parse)
}

/// Read one `type, length, data` field of a v2 binary macaroon
fn read_field(data: &[u8]) -> TgResult<(u64, &[u8], &[u8])> {
	let (field_type, rest) = read_uvarint(data)?;
	let (len, rest) = read_uvarint(rest)?;
	let len = usize::try_from(len).map_err(|_| Error::Parse)?;
	if rest.len() < len {
		return Err(Error::Parse);
	}
	let (value, rest) = rest.split_at(len);
	Ok((field_type, value, rest))
}

/// Identifier of a v2 binary-encoded macaroon
///
/// Only the leading location/identifier fields are parsed; caveats and the
/// signature are never looked at.
pub fn macaroon_id(macaroon: &[u8]) -> TgResult<&[u8]> {
	let (&version, rest) = macaroon.split_first().ok_or(Error::Parse)?;
	if version != MACAROON_V2 {
		return Err(Error::ValidationError(format!("unsupported macaroon version {}", version)));
	}

	let (mut field_type, mut value, rest) = read_field(rest)?;
	if field_type == FIELD_LOCATION {
		(field_type, value, _) = read_field(rest)?;
	}
	if field_type != FIELD_IDENTIFIER {
		return Err(Error::Parse);
	}
	Ok(value)
}

/// Parse the value of an `Authorization: L402 ...` header into the first
/// macaroon's bytes
fn macaroon_from_authorization(value: &str) -> TgResult<Vec<u8>> {
	let credentials = value
		.strip_prefix("L402 ")
		.or_else(|| value.strip_prefix("LSAT "))
		.ok_or(Error::Parse)?
		.trim();
	let (macaroons, preimage) = credentials.rsplit_once(':').ok_or(Error::Parse)?;
	if preimage.len() != PREIMAGE_HEX_LEN || !preimage.bytes().all(|b| b.is_ascii_hexdigit()) {
		return Err(Error::ValidationError("invalid preimage".into()));
	}

	let first = macaroons.split(',').next().map(str::trim).unwrap_or_default();
	STANDARD.decode(first).map_err(|_| Error::Parse)
}

/// Extract the first macaroon carried by a request, in raw binary form
///
/// An `Authorization` header takes precedence: when present, the macaroon
/// headers are not consulted, even if no `Authorization` value parses.
pub fn macaroon_from_headers(headers: &HeaderMap) -> TgResult<Vec<u8>> {
	if headers.contains_key(header::AUTHORIZATION) {
		return headers
			.get_all(header::AUTHORIZATION)
			.iter()
			.filter_map(|value| value.to_str().ok())
			.find_map(|value| macaroon_from_authorization(value).ok())
			.ok_or_else(|| Error::ValidationError("invalid L402 authorization header".into()));
	}

	for name in [GRPC_MACAROON_HEADER, MACAROON_HEADER] {
		if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
			return hex::decode(value.trim()).map_err(|_| Error::Parse);
		}
	}

	Err(Error::ValidationError("no L402 credential in request".into()))
}

/// Token ID of the credential carried by a request
pub fn token_id_from_headers(headers: &HeaderMap) -> TgResult<TokenId> {
	let macaroon = macaroon_from_headers(headers)?;
	let identifier = decode_identifier(macaroon_id(&macaroon)?)?;
	Ok(identifier.token_id)
}


#[cfg(test)]
mod tests {
	use super::test_support::*;
	use super::*;
	use axum::http::HeaderValue;

	#[test]
	fn test_decode_identifier() {
		let identifier = identifier(0x42);
		let decoded = decode_identifier(&encode_identifier(&identifier)).unwrap();
		assert_eq!(decoded, identifier);
		assert_eq!(decoded.token_id.to_string(), "42".repeat(32));
	}

	#[test]
	fn test_decode_identifier_errors() {
		assert!(decode_identifier(&[]).is_err());
		assert!(decode_identifier(&[0, 0, 1, 2, 3]).is_err());

		let mut bytes = encode_identifier(&identifier(1));
		bytes[1] = 7;
		assert!(matches!(decode_identifier(&bytes), Err(Error::ValidationError(_))));
	}

	#[test]
	fn test_macaroon_id() {
		let with_location = macaroon_bytes(Some("example.com"), b"my-id");
		assert_eq!(macaroon_id(&with_location).unwrap(), b"my-id");

		let without_location = macaroon_bytes(None, b"other");
		assert_eq!(macaroon_id(&without_location).unwrap(), b"other");
	}

	#[test]
	fn test_macaroon_id_errors() {
		assert!(macaroon_id(&[]).is_err());
		assert!(macaroon_id(&[1, 2, 3]).is_err());
		// declared length runs past the end
		assert!(macaroon_id(&[MACAROON_V2, 2, 40, 1, 2]).is_err());
		// signature field where the identifier should be
		assert!(macaroon_id(&[MACAROON_V2, 6, 1, 0]).is_err());
	}

	#[test]
	fn test_read_uvarint() {
		assert_eq!(read_uvarint(&[0x05]).unwrap(), (5, &[][..]));
		assert_eq!(read_uvarint(&[0xac, 0x02, 0xff]).unwrap(), (300, &[0xff][..]));
		assert!(read_uvarint(&[0x80, 0x80]).is_err());
	}

	#[test]
	fn test_token_id_from_authorization() {
		let mut headers = HeaderMap::new();
		headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&authorization(7)).unwrap());

		let token_id = token_id_from_headers(&headers).unwrap();
		assert_eq!(token_id, TokenId([7; TOKEN_ID_LEN]));
	}

	#[test]
	fn test_token_id_from_legacy_scheme() {
		let value = authorization(9).replacen("L402", "LSAT", 1);
		let mut headers = HeaderMap::new();
		headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());

		assert_eq!(token_id_from_headers(&headers).unwrap(), TokenId([9; TOKEN_ID_LEN]));
	}

	#[test]
	fn test_token_id_from_grpc_metadata() {
		let id = encode_identifier(&identifier(3));
		let macaroon = macaroon_bytes(None, &id);
		let mut headers = HeaderMap::new();
		headers.insert(
			GRPC_MACAROON_HEADER,
			HeaderValue::from_str(&hex::encode(macaroon)).unwrap(),
		);

		assert_eq!(token_id_from_headers(&headers).unwrap(), TokenId([3; TOKEN_ID_LEN]));
	}

	#[test]
	fn test_malformed_authorization_shadows_macaroon_header() {
		let id = encode_identifier(&identifier(3));
		let mut headers = HeaderMap::new();
		headers.insert(
			MACAROON_HEADER,
			HeaderValue::from_str(&hex::encode(macaroon_bytes(None, &id))).unwrap(),
		);
		assert_eq!(token_id_from_headers(&headers).unwrap(), TokenId([3; TOKEN_ID_LEN]));

		headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
		assert!(matches!(token_id_from_headers(&headers), Err(Error::ValidationError(_))));

		headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&authorization(4)).unwrap());
		assert_eq!(token_id_from_headers(&headers).unwrap(), TokenId([4; TOKEN_ID_LEN]));
	}

	#[test]
	fn test_garbage_credentials() {
		let mut headers = HeaderMap::new();
		assert!(token_id_from_headers(&headers).is_err());

		headers.insert(header::AUTHORIZATION, HeaderValue::from_static("L402 garbage:token"));
		assert!(token_id_from_headers(&headers).is_err());

		headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
		assert!(token_id_from_headers(&headers).is_err());

		let bad_base64 = format!("L402 !!!notbase64:{}", "00".repeat(32));
		headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&bad_base64).unwrap());
		assert!(token_id_from_headers(&headers).is_err());
	}
}

// vim: ts=4
