//! Drives a key's streams to produce or consume a whole artifact.
//!
//! Every artifact is `[FORMAT_VERSION][key hash][body...][tag]`.  When encrypting, the bytes the
//! cipher emits go both to the output and into the MAC, so the tag covers exactly what was
//! sent (header included).  When decrypting, the trailing tag is held back from the cipher and
//! checked once everything else has been through.
use std::io::{Read, Write};
use zeroize::Zeroizing;

use super::{Error, Key, KeyHash, key_hash::KEY_HASH_SIZE, stream::Streams};

/// The version byte every artifact starts with.
pub const FORMAT_VERSION: u8 = 0;

/// Length of the `[version][key hash]` header.
pub const HEADER_SIZE: usize = 1 + KEY_HASH_SIZE;

const CHUNK_SIZE: usize = 4096;

pub(crate) fn header(key_hash: &KeyHash) -> [u8; HEADER_SIZE] {
	let mut h = [0u8; HEADER_SIZE];
	h[0] = FORMAT_VERSION;
	h[1..].copy_from_slice(key_hash.as_bytes());
	h
}

/// Split an artifact into its key hash, raw header, and everything after the header.
pub(crate) fn parse_header(artifact: &[u8]) -> Result<(KeyHash, &[u8], &[u8]), Error> {
	if artifact.len() < HEADER_SIZE {
		tracing::debug!(len = artifact.len(), "artifact shorter than a header");
		return Err(Error::InvalidCryptoData);
	}

	if artifact[0] != FORMAT_VERSION {
		tracing::debug!(version = artifact[0], "unsupported format version");
		return Err(Error::InvalidCryptoData);
	}

	let (header, body) = artifact.split_at(HEADER_SIZE);
	Ok((KeyHash::try_from(&header[1..])?, header, body))
}

pub(crate) struct EncryptingPipeline<'k, W: Write> {
	streams: Streams<'k>,
	sink: W,
	chunk: Vec<u8>,
}

impl<'k, W: Write> EncryptingPipeline<'k, W> {
	pub(crate) fn new(key: &'k Key, mut sink: W) -> Result<Self, Error> {
		let header = header(&key.key_hash());
		let mut streams = key.encrypting_streams(&header)?;

		sink.write_all(&header)?;
		if let Some(mac) = streams.mac.as_mut() {
			mac.update(&header)?;
		}

		Ok(Self {
			streams,
			sink,
			chunk: Vec::new(),
		})
	}

	pub(crate) fn write(&mut self, data: &[u8]) -> Result<(), Error> {
		let Some(cipher) = self.streams.cipher.as_mut() else {
			return Err(Error::InvalidCryptoData);
		};

		self.chunk.clear();
		cipher.write(data, &mut self.chunk)?;
		self.emit()
	}

	pub(crate) fn finish(mut self) -> Result<W, Error> {
		let Some(cipher) = self.streams.cipher.as_mut() else {
			return Err(Error::InvalidCryptoData);
		};

		self.chunk.clear();
		cipher.finish(&mut self.chunk)?;
		self.emit()?;

		if let Some(mac) = self.streams.mac.as_mut() {
			mac.seal()?;
			self.sink.write_all(mac.hash_value())?;
		}

		self.sink.flush()?;
		Ok(self.sink)
	}

	fn emit(&mut self) -> Result<(), Error> {
		if let Some(mac) = self.streams.mac.as_mut() {
			mac.update(&self.chunk)?;
		}
		self.sink.write_all(&self.chunk)?;

		Ok(())
	}
}

/// Plaintext is collected rather than streamed out, as none of it may be released before the
/// tag has been checked.
pub(crate) struct DecryptingPipeline<'k> {
	streams: Streams<'k>,
	tag_len: usize,
	held: Vec<u8>,
	plaintext: Zeroizing<Vec<u8>>,
}

impl<'k> DecryptingPipeline<'k> {
	pub(crate) fn new(mut streams: Streams<'k>, header: &[u8]) -> Result<Self, Error> {
		if let Some(mac) = streams.mac.as_mut() {
			mac.update(header)?;
		}

		Ok(Self {
			tag_len: streams.tag_len(),
			streams,
			held: Vec::new(),
			plaintext: Zeroizing::new(Vec::new()),
		})
	}

	pub(crate) fn write(&mut self, data: &[u8]) -> Result<(), Error> {
		self.held.extend_from_slice(data);
		if self.held.len() <= self.tag_len {
			return Ok(());
		}

		let body: Vec<u8> = self.held.drain(..self.held.len() - self.tag_len).collect();

		if let Some(mac) = self.streams.mac.as_mut() {
			mac.update(&body)?;
		}
		if let Some(cipher) = self.streams.cipher.as_mut() {
			cipher.write(&body, &mut self.plaintext)?;
		}

		Ok(())
	}

	pub(crate) fn finish(mut self) -> Result<Zeroizing<Vec<u8>>, Error> {
		// Both checks always run, so a padding failure looks just like a tag failure
		let cipher_ok = match self.streams.cipher.as_mut() {
			Some(cipher) => cipher.finish(&mut self.plaintext).is_ok(),
			None => false,
		};

		let tag_ok = match self.streams.mac.as_mut() {
			Some(mac) => mac.verify_signature(&self.held)? && self.held.len() == self.tag_len,
			None => true,
		};

		if cipher_ok && tag_ok {
			Ok(self.plaintext)
		} else {
			tracing::debug!(cipher_ok, tag_ok, "Decryption failed");
			Err(Error::InvalidCryptoData)
		}
	}
}

/// Encrypt everything `reader` produces with `key`, writing the artifact to `writer`.
#[tracing::instrument(level = "trace", skip_all, fields(key_hash = %key.key_hash()))]
pub(crate) fn encrypt_stream<W: Write>(
	key: &Key,
	mut reader: impl Read,
	writer: W,
) -> Result<W, Error> {
	let mut pipeline = EncryptingPipeline::new(key, writer)?;
	let mut buf = Zeroizing::new(vec![0u8; CHUNK_SIZE]);

	loop {
		let n = reader.read(&mut buf)?;
		if n == 0 {
			break;
		}
		pipeline.write(&buf[..n])?;
	}

	pipeline.finish()
}

pub(crate) fn encrypt(key: &Key, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
	encrypt_stream(key, plaintext, Vec::new())
}

fn decrypt_with(key: &Key, header: &[u8], body: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
	let mut pipeline = DecryptingPipeline::new(key.decrypting_streams(header)?, header)?;
	for chunk in body.chunks(CHUNK_SIZE) {
		pipeline.write(chunk)?;
	}
	pipeline.finish()
}

/// Decrypt `ciphertext` with whichever of the keys `candidates` offers for its key hash.
///
/// Candidates are tried in the order given.  If there aren't any, the body still goes through
/// a decoy MAC before failing, so an unknown key is indistinguishable from a bad tag.
#[tracing::instrument(level = "trace", skip_all)]
pub(crate) fn decrypt<'k>(
	candidates: impl FnOnce(&KeyHash) -> Vec<&'k Key>,
	ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, Error> {
	let (key_hash, header, body) = parse_header(ciphertext)?;
	let keys = candidates(&key_hash);

	if keys.is_empty() {
		tracing::debug!(%key_hash, "No key matches ciphertext");
		let mut pipeline = DecryptingPipeline::new(Streams::decoy(), header)?;
		for chunk in body.chunks(CHUNK_SIZE) {
			pipeline.write(chunk)?;
		}
		return pipeline.finish();
	}

	for key in keys {
		tracing::debug!(%key_hash, "Decrypting");
		match decrypt_with(key, header, body) {
			Ok(plaintext) => return Ok(plaintext),
			Err(e) => tracing::debug!(%key_hash, %e, "Candidate key did not decrypt"),
		}
	}

	Err(Error::InvalidCryptoData)
}
