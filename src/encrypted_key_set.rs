use zeroize::Zeroizing;

use super::{Crypter, Error, KeyMetadata, KeySet};

/// A key set whose key data is stored encrypted with another key set's keys.
///
/// Owns both the wrapped key set and the [`Crypter`] that unwraps it.
#[derive(Debug)]
pub struct EncryptedKeySet<K> {
	inner: K,
	crypter: Crypter,
}

impl<K: KeySet> EncryptedKeySet<K> {
	pub fn new(inner: K, crypter: Crypter) -> Self {
		Self { inner, crypter }
	}
}

impl<K: KeySet> KeySet for EncryptedKeySet<K> {
	fn metadata(&self) -> Result<KeyMetadata, Error> {
		let mut metadata = self.inner.metadata()?;
		metadata.encrypted = false;

		Ok(metadata)
	}

	#[tracing::instrument(level = "trace", skip(self))]
	fn key_data(&self, version: u32) -> Result<Zeroizing<Vec<u8>>, Error> {
		let data = self.inner.key_data(version)?;
		if !self.inner.metadata()?.encrypted {
			return Ok(data);
		}

		self.crypter.decrypt_secret(&data)
	}
}
