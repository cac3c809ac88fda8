//! Key material, and the streams each kind of key builds for the operations it supports.
use rand::{RngCore as _, rng};
use std::sync::OnceLock;
use zeroize::{Zeroize as _, Zeroizing};

use super::{Error, KeyHash, KeyType, stream::Streams, stream::VerifyingStream};

pub(crate) mod aead;
pub(crate) mod aes;
pub(crate) mod dsa;
pub(crate) mod hmac;
pub(crate) mod rsa;

pub(crate) enum Material {
	Aes(aes::AesKey),
	HmacSha1(hmac::HmacKey),
	AesAead(aead::AeadKey),
	RsaPrivate(rsa::RsaPrivKey),
	RsaPublic(rsa::RsaPubKey),
	DsaPrivate(dsa::DsaPrivKey),
	DsaPublic(dsa::DsaPubKey),
}

/// A single cryptographic key of one of the supported [`KeyType`]s.
///
/// Secret material is zeroed when the key is dropped.
pub struct Key {
	material: Material,
	hash: OnceLock<KeyHash>,
}

impl std::fmt::Debug for Key {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Key")
			.field("type", &self.key_type())
			.field("size", &self.size())
			.field("hash", &self.key_hash())
			.finish()
	}
}

impl Key {
	pub(crate) fn new(material: Material) -> Self {
		Self {
			material,
			hash: OnceLock::new(),
		}
	}

	/// Create a new random key of the given type.
	///
	/// A `size` of `0` means "the default size for this type".
	///
	/// # Errors
	///
	/// [`Error::InvalidKey`] if `size` isn't one of the sizes `key_type` allows, or if the
	/// type is a public key (those come from [`Key::public_key`]).
	#[tracing::instrument(level = "debug")]
	pub fn generate(key_type: KeyType, size: usize) -> Result<Self, Error> {
		let size = if size == 0 {
			key_type.default_size()
		} else {
			size
		};

		if !key_type.is_acceptable_size(size) {
			return Err(Error::invalid_key(format!(
				"{size} is not a valid size for {key_type} keys"
			)));
		}

		let key = (key_type.info().generate)(size)?;
		tracing::debug!(key_hash = %key.key_hash(), "Generated key");
		Ok(key)
	}

	/// Load a key of the given type from its serialised form.
	///
	/// `bytes` is zeroed before this returns, whether or not the key could be read.
	#[tracing::instrument(level = "trace", skip(bytes))]
	pub fn read(key_type: KeyType, bytes: &mut [u8]) -> Result<Self, Error> {
		let key = (key_type.info().read)(bytes);
		bytes.zeroize();

		let key = key?;
		if !key_type.is_acceptable_size(key.size()) {
			return Err(Error::invalid_key(format!(
				"{} is not a valid size for {key_type} keys",
				key.size()
			)));
		}

		Ok(key)
	}

	/// Serialise the key; feed the result back to [`Key::read`] to get the key back.
	pub fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, Error> {
		match &self.material {
			Material::Aes(k) => k.to_bytes(),
			Material::HmacSha1(k) => k.to_bytes(),
			Material::AesAead(k) => k.to_bytes(),
			Material::RsaPrivate(k) => k.to_bytes(),
			Material::RsaPublic(k) => k.to_bytes(),
			Material::DsaPrivate(k) => k.to_bytes(),
			Material::DsaPublic(k) => k.to_bytes(),
		}
	}

	pub fn key_type(&self) -> KeyType {
		match &self.material {
			Material::Aes(_) => KeyType::Aes,
			Material::HmacSha1(_) => KeyType::HmacSha1,
			Material::AesAead(_) => KeyType::AesAead,
			Material::RsaPrivate(_) => KeyType::RsaPrivate,
			Material::RsaPublic(_) => KeyType::RsaPublic,
			Material::DsaPrivate(_) => KeyType::DsaPrivate,
			Material::DsaPublic(_) => KeyType::DsaPublic,
		}
	}

	/// Key size, in bits.
	pub fn size(&self) -> usize {
		match &self.material {
			Material::Aes(k) => k.size(),
			Material::HmacSha1(k) => k.size(),
			Material::AesAead(k) => k.size(),
			Material::RsaPrivate(k) => k.public.size(),
			Material::RsaPublic(k) => k.size(),
			Material::DsaPrivate(k) => k.public.size(),
			Material::DsaPublic(k) => k.size(),
		}
	}

	/// The identifier written into the header of everything this key produces.
	///
	/// Computed on first use, from public material only; a private key has the same hash as
	/// its public key.
	pub fn key_hash(&self) -> KeyHash {
		*self.hash.get_or_init(|| match &self.material {
			Material::Aes(k) => k.hash(),
			Material::HmacSha1(k) => k.hash(),
			Material::AesAead(k) => k.hash(),
			Material::RsaPrivate(k) => k.public.hash(),
			Material::RsaPublic(k) => k.hash(),
			Material::DsaPrivate(k) => k.public.hash(),
			Material::DsaPublic(k) => k.hash(),
		})
	}

	/// The public half of an asymmetric private key.
	pub fn public_key(&self) -> Option<Key> {
		match &self.material {
			Material::RsaPrivate(k) => Some(Key::new(Material::RsaPublic(k.public.clone()))),
			Material::DsaPrivate(k) => Some(Key::new(Material::DsaPublic(k.public.clone()))),
			_ => None,
		}
	}

	pub(crate) fn material(&self) -> &Material {
		&self.material
	}

	/// Streams for producing an artifact whose header is `header`.
	pub(crate) fn encrypting_streams(&self, header: &[u8]) -> Result<Streams<'_>, Error> {
		match &self.material {
			Material::Aes(k) => k.encrypting_streams(),
			Material::AesAead(k) => k.encrypting_streams(header),
			Material::RsaPrivate(k) => Ok(k.public.encrypting_streams()),
			Material::RsaPublic(k) => Ok(k.encrypting_streams()),
			_ => Err(self.unsupported("encryption")),
		}
	}

	pub(crate) fn decrypting_streams(&self, header: &[u8]) -> Result<Streams<'_>, Error> {
		match &self.material {
			Material::Aes(k) => k.decrypting_streams(),
			Material::AesAead(k) => k.decrypting_streams(header),
			Material::RsaPrivate(k) => Ok(k.decrypting_streams()),
			_ => Err(self.unsupported("decryption")),
		}
	}

	pub(crate) fn signing_stream(&self) -> Result<Box<dyn VerifyingStream + '_>, Error> {
		match &self.material {
			Material::HmacSha1(k) => Ok(Box::new(k.stream()?)),
			Material::RsaPrivate(k) => Ok(Box::new(k.signing_stream())),
			Material::DsaPrivate(k) => Ok(Box::new(k.signing_stream())),
			_ => Err(self.unsupported("signing")),
		}
	}

	pub(crate) fn verifying_stream(&self) -> Result<Box<dyn VerifyingStream + '_>, Error> {
		match &self.material {
			Material::HmacSha1(k) => Ok(Box::new(k.stream()?)),
			Material::RsaPrivate(k) => Ok(Box::new(k.public.verifying_stream())),
			Material::RsaPublic(k) => Ok(Box::new(k.verifying_stream())),
			Material::DsaPrivate(k) => Ok(Box::new(k.public.verifying_stream())),
			Material::DsaPublic(k) => Ok(Box::new(k.verifying_stream())),
			_ => Err(self.unsupported("verification")),
		}
	}

	fn unsupported(&self, what: &str) -> Error {
		Error::invalid_key(format!("{} keys cannot be used for {what}", self.key_type()))
	}
}

pub(crate) fn random_bytes(len: usize) -> Zeroizing<Vec<u8>> {
	let mut b = Zeroizing::new(vec![0u8; len]);
	rng().fill_bytes(&mut b);
	b
}

pub(crate) fn cannot_generate_public(_size: usize) -> Result<Key, Error> {
	Err(Error::invalid_key(
		"public keys are derived from a private key, not generated",
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_util::init;

	#[test]
	fn default_size_is_used_for_zero() {
		init();
		let key = Key::generate(KeyType::Aes, 0).unwrap();

		assert_eq!(128, key.size());
		assert_eq!(KeyType::Aes, key.key_type());
	}

	#[test]
	fn unlisted_sizes_are_rejected() {
		init();

		assert!(matches!(
			Key::generate(KeyType::Aes, 512),
			Err(Error::InvalidKey(_))
		));
		assert!(matches!(
			Key::generate(KeyType::HmacSha1, 128),
			Err(Error::InvalidKey(_))
		));
		assert!(matches!(
			Key::generate(KeyType::RsaPublic, 0),
			Err(Error::InvalidKey(_))
		));
	}

	#[test]
	fn read_scrubs_its_input() {
		init();
		let key = Key::generate(KeyType::Aes, 256).unwrap();
		let mut bytes = key.to_bytes().unwrap();

		let loaded = Key::read(KeyType::Aes, &mut bytes).unwrap();

		assert!(bytes.iter().all(|&b| b == 0));
		assert_eq!(key.key_hash(), loaded.key_hash());
	}

	#[test]
	fn read_scrubs_even_on_failure() {
		init();
		let mut garbage = vec![0xa5u8; 40];

		assert!(Key::read(KeyType::HmacSha1, &mut garbage).is_err());
		assert!(garbage.iter().all(|&b| b == 0));
	}

	#[test]
	fn read_rejects_the_wrong_type() {
		init();
		let key = Key::generate(KeyType::HmacSha1, 0).unwrap();
		let mut bytes = key.to_bytes().unwrap();

		assert!(Key::read(KeyType::Aes, &mut bytes).is_err());
	}

	#[test]
	fn hash_is_stable() {
		init();
		let key = Key::generate(KeyType::HmacSha1, 0).unwrap();
		let first = key.key_hash();
		let mut bytes = key.to_bytes().unwrap();
		let reread = Key::read(KeyType::HmacSha1, &mut bytes).unwrap();

		assert_eq!(first, key.key_hash());
		assert_eq!(first, reread.key_hash());
	}

	#[test]
	fn symmetric_keys_have_no_public_half() {
		init();

		assert!(Key::generate(KeyType::Aes, 0).unwrap().public_key().is_none());
	}
}
