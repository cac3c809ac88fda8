use secrecy::{ExposeSecret as _, SecretSlice};
use zeroize::Zeroizing;

use super::{Error, Key, KeyHash, Material, hmac::HmacKey, random_bytes};
use crate::{
	cbor,
	stream::{HmacStream, Streams, SymmetricStream},
};

/// AES-CBC, authenticated with the HMAC-SHA1 key that travels with it.
pub(crate) struct AesKey {
	aes: SecretSlice<u8>,
	hmac: HmacKey,
}

impl AesKey {
	pub(crate) fn from_parts(aes: &[u8], hmac: &[u8]) -> Result<Self, Error> {
		if !matches!(aes.len(), 16 | 24 | 32) {
			return Err(Error::invalid_key(format!("{} byte AES key", aes.len())));
		}
		if hmac.len() != 32 {
			return Err(Error::invalid_key(format!("{} byte HMAC key", hmac.len())));
		}

		Ok(Self {
			aes: aes.to_vec().into(),
			hmac: HmacKey::from_bytes(hmac),
		})
	}

	pub(crate) fn aes_bytes(&self) -> &[u8] {
		self.aes.expose_secret()
	}

	pub(crate) fn hmac_bytes(&self) -> &[u8] {
		self.hmac.expose()
	}

	pub(crate) fn size(&self) -> usize {
		self.aes_bytes().len() * 8
	}

	pub(crate) fn hash(&self) -> KeyHash {
		// Keyed on both halves, with only the AES half length-prefixed
		let aes = self.aes_bytes();
		let mut material = Zeroizing::new(Vec::with_capacity(4 + aes.len() + 32));
		material.extend_from_slice(&(aes.len() as u32).to_be_bytes());
		material.extend_from_slice(aes);
		material.extend_from_slice(self.hmac_bytes());

		KeyHash::of_raw(&material)
	}

	pub(crate) fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, Error> {
		cbor::encode_byte_strings("AES key", &[self.aes_bytes(), self.hmac_bytes()])
	}

	pub(crate) fn encrypting_streams(&self) -> Result<Streams<'_>, Error> {
		Ok(Streams::authenticated(
			SymmetricStream::encryptor(self.aes_bytes(), None, false)?,
			HmacStream::new(self.hmac_bytes())?,
		))
	}

	pub(crate) fn decrypting_streams(&self) -> Result<Streams<'_>, Error> {
		Ok(Streams::authenticated(
			SymmetricStream::decryptor(self.aes_bytes(), None)?,
			HmacStream::new(self.hmac_bytes())?,
		))
	}
}

pub(crate) fn generate(size: usize) -> Result<Key, Error> {
	let aes = random_bytes(size / 8);
	let hmac = HmacKey::random();

	Ok(Key::new(Material::Aes(AesKey::from_parts(
		&aes,
		hmac.expose(),
	)?)))
}

pub(crate) fn read(b: &[u8]) -> Result<Key, Error> {
	let parts = cbor::decode_byte_strings("AES key", b, 2)?;

	Ok(Key::new(Material::Aes(AesKey::from_parts(
		&parts[0], &parts[1],
	)?)))
}
