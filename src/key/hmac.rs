use secrecy::{ExposeSecret as _, SecretSlice};
use zeroize::Zeroizing;

use super::{Error, Key, KeyHash, Material, random_bytes};
use crate::{cbor, stream::HmacStream};

pub(crate) const TAG_SIZE: usize = crate::stream::HMAC_TAG_SIZE;

const SIZE: usize = 256;

/// An HMAC-SHA1 key.  AES keys carry one of these too, to authenticate their ciphertexts.
pub(crate) struct HmacKey {
	key: SecretSlice<u8>,
}

impl HmacKey {
	pub(crate) fn random() -> Self {
		Self::from_bytes(&random_bytes(SIZE / 8))
	}

	pub(crate) fn from_bytes(b: &[u8]) -> Self {
		Self { key: b.to_vec().into() }
	}

	pub(crate) fn expose(&self) -> &[u8] {
		self.key.expose_secret()
	}

	pub(crate) fn size(&self) -> usize {
		self.expose().len() * 8
	}

	pub(crate) fn hash(&self) -> KeyHash {
		KeyHash::of_raw(self.expose())
	}

	pub(crate) fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, Error> {
		cbor::encode_byte_strings("HMAC key", &[self.expose()])
	}

	pub(crate) fn stream(&self) -> Result<HmacStream, Error> {
		HmacStream::new(self.expose())
	}
}

pub(crate) fn generate(_size: usize) -> Result<Key, Error> {
	Ok(Key::new(Material::HmacSha1(HmacKey::random())))
}

pub(crate) fn read(b: &[u8]) -> Result<Key, Error> {
	let parts = cbor::decode_byte_strings("HMAC key", b, 1)?;

	Ok(Key::new(Material::HmacSha1(HmacKey::from_bytes(&parts[0]))))
}
