//! The byte-stream building blocks that every artifact is produced and consumed by.
//!
//! A [`FinishingStream`] transforms bytes (encrypting or decrypting them) as they're written,
//! and flushes whatever it's still holding on [`FinishingStream::finish`].  A
//! [`VerifyingStream`] is a finishing stream that *consumes* bytes, to produce a tag or
//! signature over them.
use super::Error;

mod aead;
mod asymmetric;
mod digest;
mod dummy;
mod hmac;
mod symmetric;

pub(crate) use self::aead::AeadStream;
pub(crate) use self::asymmetric::{AsymmetricStream, RsaKey};
pub(crate) use self::digest::{DigestStream, SignKey, VerifyKey};
pub(crate) use self::dummy::DummyStream;
pub(crate) use self::hmac::{HmacStream, TAG_SIZE as HMAC_TAG_SIZE};
pub(crate) use self::symmetric::{BLOCK_SIZE, SymmetricStream};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
	Encrypt,
	Decrypt,
}

pub trait FinishingStream {
	/// Push `input` through the stream, appending whatever it produces to `output`.
	///
	/// # Errors
	///
	/// Fails with [`Error::StreamFinished`] if called after [`FinishingStream::finish`].
	fn write(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), Error>;

	/// Flush any buffered data (final block, padding, tag) into `output`.  Only the first call
	/// does anything.
	fn finish(&mut self, output: &mut Vec<u8>) -> Result<(), Error>;
}

pub trait VerifyingStream: FinishingStream {
	/// How many bytes of tag/signature the caller should expect.
	fn tag_len(&self) -> usize;

	/// The computed tag or signature; empty until the stream is finished, and always empty for
	/// streams that can only check signatures.
	fn hash_value(&self) -> &[u8];

	/// Finish the stream (if that hasn't happened already) and check `candidate` against what
	/// was computed.
	fn verify_signature(&mut self, candidate: &[u8]) -> Result<bool, Error>;

	/// Feed bytes in; verifying streams never produce output of their own.
	fn update(&mut self, input: &[u8]) -> Result<(), Error> {
		self.write(input, &mut Vec::new())
	}

	fn seal(&mut self) -> Result<(), Error> {
		self.finish(&mut Vec::new())
	}
}

/// The streams a key provides for one encrypt or decrypt operation.
///
/// `cipher` is absent only for the decoy pipeline run when no key matched; `mac` is absent for
/// ciphers that authenticate themselves (or don't authenticate at all, like RSA).
pub(crate) struct Streams<'k> {
	pub(crate) cipher: Option<Box<dyn FinishingStream + 'k>>,
	pub(crate) mac: Option<Box<dyn VerifyingStream + 'k>>,
}

impl<'k> Streams<'k> {
	pub(crate) fn cipher_only(cipher: impl FinishingStream + 'k) -> Self {
		Self {
			cipher: Some(Box::new(cipher)),
			mac: None,
		}
	}

	pub(crate) fn authenticated(
		cipher: impl FinishingStream + 'k,
		mac: impl VerifyingStream + 'k,
	) -> Self {
		Self {
			cipher: Some(Box::new(cipher)),
			mac: Some(Box::new(mac)),
		}
	}

	pub(crate) fn decoy() -> Self {
		Self {
			cipher: None,
			mac: Some(Box::new(DummyStream::new())),
		}
	}

	/// Length of the trailing tag the pipeline must withhold from the cipher.
	pub(crate) fn tag_len(&self) -> usize {
		self.mac.as_ref().map(|m| m.tag_len()).unwrap_or(0)
	}
}
