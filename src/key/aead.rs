use secrecy::{ExposeSecret as _, SecretSlice};
use zeroize::Zeroizing;

use super::{Error, Key, KeyHash, Material, random_bytes};
use crate::{
	cbor,
	stream::{AeadStream, Streams},
};

/// Size of the GCM authentication tag.
pub(crate) const TAG_SIZE: usize = 16;

/// AES-GCM, where the cipher authenticates itself and no separate MAC key is needed.
pub(crate) struct AeadKey {
	aes: SecretSlice<u8>,
}

impl AeadKey {
	pub(crate) fn from_bytes(aes: &[u8]) -> Result<Self, Error> {
		if !matches!(aes.len(), 16 | 24 | 32) {
			return Err(Error::invalid_key(format!("{} byte AES key", aes.len())));
		}

		Ok(Self {
			aes: aes.to_vec().into(),
		})
	}

	fn aes_bytes(&self) -> &[u8] {
		self.aes.expose_secret()
	}

	pub(crate) fn size(&self) -> usize {
		self.aes_bytes().len() * 8
	}

	pub(crate) fn hash(&self) -> KeyHash {
		KeyHash::of_length_prefixed([self.aes_bytes()])
	}

	pub(crate) fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, Error> {
		cbor::encode_byte_strings("AEAD key", &[self.aes_bytes()])
	}

	pub(crate) fn encrypting_streams(&self, header: &[u8]) -> Result<Streams<'_>, Error> {
		Ok(Streams::cipher_only(AeadStream::encryptor(
			self.aes_bytes(),
			header,
		)?))
	}

	pub(crate) fn decrypting_streams(&self, header: &[u8]) -> Result<Streams<'_>, Error> {
		Ok(Streams::cipher_only(AeadStream::decryptor(
			self.aes_bytes(),
			header,
		)?))
	}
}

pub(crate) fn generate(size: usize) -> Result<Key, Error> {
	Ok(Key::new(Material::AesAead(AeadKey::from_bytes(
		&random_bytes(size / 8),
	)?)))
}

pub(crate) fn read(b: &[u8]) -> Result<Key, Error> {
	let parts = cbor::decode_byte_strings("AEAD key", b, 1)?;

	Ok(Key::new(Material::AesAead(AeadKey::from_bytes(&parts[0])?)))
}
