use std::io::{Read, Write};

use super::{Decrypt, Encrypt, Error, KeyPurpose, KeySet, keyring::KeyRing, pipeline};

/// Encrypts with the primary key of a key set.
///
/// Works with symmetric key sets, and with public (or private) RSA key sets, in which case only
/// the holder of the private key can decrypt.
#[derive(Debug)]
pub struct Encrypter {
	ring: KeyRing,
}

impl Encrypter {
	/// Load the keys out of `keyset`.
	///
	/// # Errors
	///
	/// [`Error::InvalidKeySet`] if `keyset` isn't for encryption, or any of its keys can't be
	/// read.
	#[tracing::instrument(level = "debug", skip(keyset))]
	pub fn new(keyset: impl KeySet) -> Result<Self, Error> {
		Ok(Self {
			ring: KeyRing::load(
				&keyset,
				&[KeyPurpose::Encrypt, KeyPurpose::DecryptAndEncrypt],
			)?,
		})
	}
}

impl Encrypt for Encrypter {
	#[tracing::instrument(level = "debug", skip_all, fields(name = %self.ring.metadata().name))]
	fn encrypt(&self, plaintext: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
		pipeline::encrypt(self.ring.primary()?, plaintext.as_ref())
	}

	#[tracing::instrument(level = "debug", skip_all, fields(name = %self.ring.metadata().name))]
	fn encrypt_stream<W: Write>(&self, reader: impl Read, writer: W) -> Result<W, Error> {
		pipeline::encrypt_stream(self.ring.primary()?, reader, writer)
	}
}

/// Encrypts with the primary key of a key set, and decrypts with any of its primary or active
/// keys.
#[derive(Debug)]
pub struct Crypter {
	ring: KeyRing,
}

impl Crypter {
	/// Load the keys out of `keyset`.
	///
	/// # Errors
	///
	/// [`Error::InvalidKeySet`] if `keyset` isn't for decryption, or any of its keys can't be
	/// read.
	#[tracing::instrument(level = "debug", skip(keyset))]
	pub fn new(keyset: impl KeySet) -> Result<Self, Error> {
		Ok(Self {
			ring: KeyRing::load(&keyset, &[KeyPurpose::DecryptAndEncrypt])?,
		})
	}

	/// Also try inactive keys when decrypting, for getting at old data after a key has been
	/// retired.
	pub fn allow_inactive(mut self, allow: bool) -> Self {
		self.ring.set_allow_inactive(allow);
		self
	}

	pub(crate) fn decrypt_secret(
		&self,
		ciphertext: &[u8],
	) -> Result<zeroize::Zeroizing<Vec<u8>>, Error> {
		pipeline::decrypt(|h| self.ring.candidates(h), ciphertext)
	}
}

impl Encrypt for Crypter {
	#[tracing::instrument(level = "debug", skip_all, fields(name = %self.ring.metadata().name))]
	fn encrypt(&self, plaintext: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
		pipeline::encrypt(self.ring.primary()?, plaintext.as_ref())
	}

	#[tracing::instrument(level = "debug", skip_all, fields(name = %self.ring.metadata().name))]
	fn encrypt_stream<W: Write>(&self, reader: impl Read, writer: W) -> Result<W, Error> {
		pipeline::encrypt_stream(self.ring.primary()?, reader, writer)
	}
}

impl Decrypt for Crypter {
	#[tracing::instrument(level = "debug", skip_all, fields(name = %self.ring.metadata().name))]
	fn decrypt(&self, ciphertext: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
		let mut plaintext = self.decrypt_secret(ciphertext.as_ref())?;
		Ok(std::mem::take(&mut *plaintext))
	}
}
