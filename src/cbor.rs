//! Small helpers over `ciborium_ll` for the binary containers this crate persists (key
//! material, packed session keys, PBE envelopes).
//!
//! Everything is a definite-length array of simple items, so we don't need a full serde
//! round-trip, and keeping key bytes out of serde means they only ever land in buffers we
//! control (and zero).
use ciborium_ll::{Decoder, Encoder, Header};
use zeroize::Zeroizing;

use super::Error;

pub(crate) type CborEncoder<'a> = Encoder<&'a mut Vec<u8>>;
pub(crate) type CborDecoder<'a> = Decoder<&'a [u8]>;

pub(crate) fn write_array(enc: &mut CborEncoder<'_>, element: &str, len: usize) -> Result<(), Error> {
	enc.push(Header::Array(Some(len)))
		.map_err(|e| Error::encoding(element, e))
}

pub(crate) fn write_bytes(enc: &mut CborEncoder<'_>, element: &str, b: &[u8]) -> Result<(), Error> {
	enc.bytes(b, None).map_err(|e| Error::encoding(element, e))
}

pub(crate) fn write_text(enc: &mut CborEncoder<'_>, element: &str, s: &str) -> Result<(), Error> {
	enc.text(s, None).map_err(|e| Error::encoding(element, e))
}

pub(crate) fn write_u64(enc: &mut CborEncoder<'_>, element: &str, n: u64) -> Result<(), Error> {
	enc.push(Header::Positive(n))
		.map_err(|e| Error::encoding(element, e))
}

/// Read an array header, checking it holds exactly `expected` items.
pub(crate) fn read_array(
	dec: &mut CborDecoder<'_>,
	element: &str,
	expected: usize,
) -> Result<(), Error> {
	match dec.pull().map_err(|e| Error::decoding(element, e))? {
		Header::Array(Some(n)) if n == expected => Ok(()),
		Header::Array(_) => Err(Error::malformed(format!(
			"{element}: expected {expected} items"
		))),
		_ => Err(Error::malformed(format!("{element}: expected array"))),
	}
}

pub(crate) fn read_bytes(
	dec: &mut CborDecoder<'_>,
	element: &str,
) -> Result<Zeroizing<Vec<u8>>, Error> {
	let Header::Bytes(len) = dec.pull().map_err(|e| Error::decoding(element, e))? else {
		return Err(Error::malformed(format!("{element}: expected byte string")));
	};

	let mut out = Zeroizing::new(Vec::with_capacity(len.unwrap_or_default()));
	let mut buf = Zeroizing::new([0u8; 1024]);

	// CBOR's great, until you have to deal with segmented bytestrings...
	let mut segments = dec.bytes(len);
	while let Some(mut segment) = segments
		.pull()
		.map_err(|e| Error::decoding(element, e))?
	{
		while let Some(chunk) = segment
			.pull(&mut buf[..])
			.map_err(|e| Error::decoding(element, e))?
		{
			out.extend_from_slice(chunk);
		}
	}

	Ok(out)
}

pub(crate) fn read_text(dec: &mut CborDecoder<'_>, element: &str) -> Result<String, Error> {
	let Header::Text(len) = dec.pull().map_err(|e| Error::decoding(element, e))? else {
		return Err(Error::malformed(format!("{element}: expected text")));
	};

	let mut out = String::new();
	let mut buf = [0u8; 256];

	let mut segments = dec.text(len);
	while let Some(mut segment) = segments
		.pull()
		.map_err(|e| Error::decoding(element, e))?
	{
		while let Some(chunk) = segment
			.pull(&mut buf[..])
			.map_err(|e| Error::decoding(element, e))?
		{
			out.push_str(chunk);
		}
	}

	Ok(out)
}

pub(crate) fn read_u64(dec: &mut CborDecoder<'_>, element: &str) -> Result<u64, Error> {
	let Header::Positive(n) = dec.pull().map_err(|e| Error::decoding(element, e))? else {
		return Err(Error::malformed(format!("{element}: expected unsigned integer")));
	};

	Ok(n)
}

/// Encode a flat array of byte strings, which is how all key material is stored.
pub(crate) fn encode_byte_strings(
	element: &str,
	items: &[&[u8]],
) -> Result<Zeroizing<Vec<u8>>, Error> {
	let mut v = Zeroizing::new(Vec::new());
	let mut enc = Encoder::from(&mut *v);

	write_array(&mut enc, element, items.len())?;
	for item in items {
		write_bytes(&mut enc, element, item)?;
	}

	Ok(v)
}

/// Decode a flat array of exactly `expected` byte strings.
pub(crate) fn decode_byte_strings(
	element: &str,
	b: &[u8],
	expected: usize,
) -> Result<Vec<Zeroizing<Vec<u8>>>, Error> {
	let mut dec = Decoder::from(b);

	read_array(&mut dec, element, expected)?;
	(0..expected).map(|_| read_bytes(&mut dec, element)).collect()
}
