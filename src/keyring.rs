use super::{Error, Key, KeyHash, KeyMetadata, KeyPurpose, KeySet, KeyStatus, KeyVersion};

/// The keys of a key set, loaded and ready for use by one of the operation types.
pub(crate) struct KeyRing {
	metadata: KeyMetadata,
	/// In canonical order (primary first).
	keys: Vec<(KeyVersion, Key)>,
	allow_inactive: bool,
}

impl std::fmt::Debug for KeyRing {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("KeyRing")
			.field("name", &self.metadata.name)
			.field("purpose", &self.metadata.purpose)
			.field("keys", &self.keys)
			.field("allow_inactive", &self.allow_inactive)
			.finish()
	}
}

impl KeyRing {
	/// Read every version out of `keyset`, checking that its purpose is one of `purposes`.
	#[tracing::instrument(level = "trace", skip(keyset))]
	pub(crate) fn load(keyset: &impl KeySet, purposes: &[KeyPurpose]) -> Result<Self, Error> {
		let metadata = keyset.metadata()?;
		metadata.validate()?;

		if !purposes.contains(&metadata.purpose) {
			return Err(Error::invalid_key_set(format!(
				"key set {:?} is for {}",
				metadata.name, metadata.purpose
			)));
		}

		if metadata.encrypted {
			return Err(Error::invalid_key_set(format!(
				"key set {:?} is encrypted, and needs unwrapping first",
				metadata.name
			)));
		}

		let mut keys = Vec::with_capacity(metadata.versions.len());
		for version in metadata.sorted_versions() {
			let mut data = keyset.key_data(version.version_number)?;
			let key = Key::read(metadata.key_type, &mut data).map_err(|e| {
				Error::invalid_key_set(format!("version {}: {e}", version.version_number))
			})?;
			tracing::trace!(version = version.version_number, status = %version.status, key_hash = %key.key_hash(), "Loaded key");

			keys.push((version.clone(), key));
		}

		Ok(Self {
			metadata,
			keys,
			allow_inactive: false,
		})
	}

	pub(crate) fn metadata(&self) -> &KeyMetadata {
		&self.metadata
	}

	pub(crate) fn set_allow_inactive(&mut self, allow: bool) {
		self.allow_inactive = allow;
	}

	/// The key used for all new ciphertexts and signatures.
	pub(crate) fn primary(&self) -> Result<&Key, Error> {
		self.keys
			.iter()
			.find(|(v, _)| v.status == KeyStatus::Primary)
			.map(|(_, k)| k)
			.ok_or(Error::MissingPrimaryKey)
	}

	/// Every usable key whose hash is `key_hash`, in the order they should be tried.
	pub(crate) fn candidates(&self, key_hash: &KeyHash) -> Vec<&Key> {
		self.keys
			.iter()
			.filter(|(v, _)| self.allow_inactive || v.status != KeyStatus::Inactive)
			.filter(|(_, k)| k.key_hash() == *key_hash)
			.map(|(_, k)| k)
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{KeyType, MemoryKeySet, test_util::init};

	fn keyset() -> MemoryKeySet {
		let mut ks = MemoryKeySet::new("ring", KeyPurpose::DecryptAndEncrypt, KeyType::Aes).unwrap();
		ks.generate_key(KeyStatus::Inactive, 0).unwrap();
		ks.generate_key(KeyStatus::Active, 0).unwrap();
		ks.generate_key(KeyStatus::Primary, 0).unwrap();
		ks
	}

	#[test]
	fn primary_is_found() {
		init();
		let ks = keyset();
		let ring = KeyRing::load(&ks, &[KeyPurpose::DecryptAndEncrypt]).unwrap();
		let mut data = ks.key_data(3).unwrap();

		assert_eq!(
			Key::read(KeyType::Aes, &mut data).unwrap().key_hash(),
			ring.primary().unwrap().key_hash()
		);
	}

	#[test]
	fn no_primary() {
		init();
		let mut ks = keyset();
		ks.set_status(3, KeyStatus::Active).unwrap();
		let ring = KeyRing::load(&ks, &[KeyPurpose::DecryptAndEncrypt]).unwrap();

		assert!(matches!(ring.primary(), Err(Error::MissingPrimaryKey)));
	}

	#[test]
	fn inactive_keys_need_permission() {
		init();
		let ks = keyset();
		let mut data = ks.key_data(1).unwrap();
		let inactive = Key::read(KeyType::Aes, &mut data).unwrap().key_hash();

		let mut ring = KeyRing::load(&ks, &[KeyPurpose::DecryptAndEncrypt]).unwrap();
		assert!(ring.candidates(&inactive).is_empty());

		ring.set_allow_inactive(true);
		assert_eq!(1, ring.candidates(&inactive).len());
	}

	#[test]
	fn wrong_purpose() {
		init();

		assert!(matches!(
			KeyRing::load(&keyset(), &[KeyPurpose::SignAndVerify]),
			Err(Error::InvalidKeySet(_))
		));
	}

	#[test]
	fn encrypted_key_sets_must_be_unwrapped() {
		init();
		let mut ks = MemoryKeySet::new("ring", KeyPurpose::DecryptAndEncrypt, KeyType::Aes).unwrap();
		ks.set_encrypted(true).unwrap();

		assert!(matches!(
			KeyRing::load(&ks, &[KeyPurpose::DecryptAndEncrypt]),
			Err(Error::InvalidKeySet(_))
		));
	}

	#[test]
	fn unreadable_key_data_is_a_bad_key_set() {
		init();
		let mut ks = keyset();
		ks.add_key_data(vec![1, 2, 3], KeyStatus::Active).unwrap();

		let Err(Error::InvalidKeySet(msg)) = KeyRing::load(&ks, &[KeyPurpose::DecryptAndEncrypt])
		else {
			panic!("garbage key data was accepted");
		};
		assert!(msg.starts_with("version 4:"), "{msg}");
	}
}
