use secrecy::SecretString;
use std::collections::BTreeMap;
use zeroize::Zeroizing;

use super::{
	Encrypt, Error, Key, KeyMetadata, KeyPurpose, KeyStatus, KeyType, KeyVersion, PbeKeyStore,
};

/// A source of keys: the metadata describing a set of key versions, and the stored bytes for
/// each version.
///
/// Root key sets own their bytes; layered key sets (like [`crate::EncryptedKeySet`] and
/// [`crate::PbeKeySet`]) wrap another key set and unwrap its bytes on the way through.  Code
/// that consumes a `KeySet` can't tell the difference.
pub trait KeySet: Send + Sync {
	fn metadata(&self) -> Result<KeyMetadata, Error>;

	/// The stored bytes for `version`.
	///
	/// # Errors
	///
	/// [`Error::InvalidKeySet`] if there is no such version.
	fn key_data(&self, version: u32) -> Result<Zeroizing<Vec<u8>>, Error>;
}

impl<K: KeySet + ?Sized> KeySet for &K {
	fn metadata(&self) -> Result<KeyMetadata, Error> {
		(**self).metadata()
	}

	fn key_data(&self, version: u32) -> Result<Zeroizing<Vec<u8>>, Error> {
		(**self).key_data(version)
	}
}

impl<K: KeySet + ?Sized> KeySet for Box<K> {
	fn metadata(&self) -> Result<KeyMetadata, Error> {
		(**self).metadata()
	}

	fn key_data(&self, version: u32) -> Result<Zeroizing<Vec<u8>>, Error> {
		(**self).key_data(version)
	}
}

/// A key set held entirely in memory, along with the operations needed to rotate its keys.
pub struct MemoryKeySet {
	metadata: KeyMetadata,
	data: BTreeMap<u32, Zeroizing<Vec<u8>>>,
}

impl std::fmt::Debug for MemoryKeySet {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemoryKeySet")
			.field("metadata", &self.metadata)
			.finish_non_exhaustive()
	}
}

impl MemoryKeySet {
	/// An empty key set.
	///
	/// # Errors
	///
	/// [`Error::InvalidKeySet`] if `key_type` can't be used for `purpose`.
	pub fn new(
		name: impl Into<String>,
		purpose: KeyPurpose,
		key_type: KeyType,
	) -> Result<Self, Error> {
		let metadata = KeyMetadata::new(name, purpose, key_type);
		metadata.validate()?;

		Ok(Self {
			metadata,
			data: BTreeMap::new(),
		})
	}

	/// Reassemble a key set from previously stored metadata and key data.
	pub fn from_parts(
		metadata: KeyMetadata,
		data: impl IntoIterator<Item = (u32, Vec<u8>)>,
	) -> Result<Self, Error> {
		metadata.validate()?;
		let data: BTreeMap<u32, Zeroizing<Vec<u8>>> = data
			.into_iter()
			.map(|(v, d)| (v, Zeroizing::new(d)))
			.collect();

		if let Some(v) = metadata
			.versions
			.iter()
			.find(|v| !data.contains_key(&v.version_number))
		{
			return Err(Error::invalid_key_set(format!(
				"no key data for version {}",
				v.version_number
			)));
		}

		Ok(Self { metadata, data })
	}

	/// Generate a fresh key of the key set's type, and add it.  A `size` of `0` picks the
	/// type's default.
	#[tracing::instrument(level = "debug", skip(self), fields(name = %self.metadata.name))]
	pub fn generate_key(&mut self, status: KeyStatus, size: usize) -> Result<u32, Error> {
		let key = Key::generate(self.metadata.key_type, size)?;
		self.add_key(&key, status)
	}

	/// Add `key` as a new version, returning the version number it was given.
	///
	/// Adding a new primary demotes the existing primary (if any) to active.
	///
	/// # Errors
	///
	/// [`Error::InvalidKeySet`] if `key` is the wrong type, or the key set stores encrypted
	/// key data (see [`MemoryKeySet::add_encrypted_key`] and [`MemoryKeySet::add_pbe_key`]).
	pub fn add_key(&mut self, key: &Key, status: KeyStatus) -> Result<u32, Error> {
		self.check_type(key)?;
		if self.metadata.encrypted {
			return Err(Error::invalid_key_set(
				"key set is encrypted, so plaintext keys can't be added",
			));
		}

		self.insert(key.to_bytes()?, status)
	}

	/// Add `key` encrypted with `encrypter`, so the key set can later be read through an
	/// [`crate::EncryptedKeySet`].
	pub fn add_encrypted_key(
		&mut self,
		key: &Key,
		status: KeyStatus,
		encrypter: &impl Encrypt,
	) -> Result<u32, Error> {
		self.check_type(key)?;
		self.require_encrypted()?;

		let wrapped = encrypter.encrypt(&*key.to_bytes()?)?;
		self.insert(Zeroizing::new(wrapped), status)
	}

	/// Add `key` encrypted under a password, so the key set can later be read through a
	/// [`crate::PbeKeySet`].
	pub fn add_pbe_key(
		&mut self,
		key: &Key,
		status: KeyStatus,
		password: &SecretString,
		iteration_count: u32,
	) -> Result<u32, Error> {
		self.check_type(key)?;
		self.require_encrypted()?;

		let store = PbeKeyStore::encrypt_key_data(&key.to_bytes()?, password, iteration_count)?;
		self.insert(Zeroizing::new(store.to_bytes()?), status)
	}

	/// Add already-serialised (and possibly already-encrypted) key data as a new version.
	pub fn add_key_data(&mut self, data: Vec<u8>, status: KeyStatus) -> Result<u32, Error> {
		self.insert(Zeroizing::new(data), status)
	}

	/// Change the status of `version`.  Promoting a version to primary demotes the existing
	/// primary to active.
	#[tracing::instrument(level = "debug", skip(self), fields(name = %self.metadata.name))]
	pub fn set_status(&mut self, version: u32, status: KeyStatus) -> Result<(), Error> {
		if self.metadata.version(version).is_none() {
			return Err(unknown_version(version));
		}

		if status == KeyStatus::Primary {
			self.demote_primary();
		}
		if let Some(v) = self.metadata.version_mut(version) {
			v.status = status;
		}

		Ok(())
	}

	/// Remove `version` for good.  Only inactive versions may be removed.
	#[tracing::instrument(level = "debug", skip(self), fields(name = %self.metadata.name))]
	pub fn remove(&mut self, version: u32) -> Result<(), Error> {
		match self.metadata.version(version) {
			None => return Err(unknown_version(version)),
			Some(v) if v.status != KeyStatus::Inactive => {
				return Err(Error::invalid_key_set(format!(
					"version {version} is {}; only inactive versions can be removed",
					v.status
				)));
			}
			Some(_) => (),
		}

		self.metadata.versions.retain(|v| v.version_number != version);
		self.data.remove(&version);

		Ok(())
	}

	/// Mark whether this key set's data is encrypted.  Only possible while it's empty.
	pub fn set_encrypted(&mut self, encrypted: bool) -> Result<(), Error> {
		if !self.metadata.versions.is_empty() {
			return Err(Error::invalid_key_set(
				"can't change encryption of a key set that already has keys",
			));
		}
		self.metadata.encrypted = encrypted;

		Ok(())
	}

	fn check_type(&self, key: &Key) -> Result<(), Error> {
		if key.key_type() != self.metadata.key_type {
			return Err(Error::invalid_key_set(format!(
				"{} key in a {} key set",
				key.key_type(),
				self.metadata.key_type
			)));
		}

		Ok(())
	}

	fn require_encrypted(&self) -> Result<(), Error> {
		if !self.metadata.encrypted {
			return Err(Error::invalid_key_set("key set is not marked as encrypted"));
		}

		Ok(())
	}

	fn demote_primary(&mut self) {
		for v in &mut self.metadata.versions {
			if v.status == KeyStatus::Primary {
				v.status = KeyStatus::Active;
			}
		}
	}

	fn insert(&mut self, data: Zeroizing<Vec<u8>>, status: KeyStatus) -> Result<u32, Error> {
		let version = self.metadata.next_version_number()?;

		if status == KeyStatus::Primary {
			self.demote_primary();
		}
		self.metadata.versions.push(KeyVersion::new(version, status));
		self.data.insert(version, data);
		tracing::debug!(name = %self.metadata.name, version, %status, "Added key version");

		Ok(version)
	}
}

fn unknown_version(version: u32) -> Error {
	Error::invalid_key_set(format!("no version {version}"))
}

impl KeySet for MemoryKeySet {
	fn metadata(&self) -> Result<KeyMetadata, Error> {
		Ok(self.metadata.clone())
	}

	fn key_data(&self, version: u32) -> Result<Zeroizing<Vec<u8>>, Error> {
		self.data
			.get(&version)
			.cloned()
			.ok_or_else(|| unknown_version(version))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_util::init;

	fn statuses(ks: &MemoryKeySet) -> Vec<(u32, KeyStatus)> {
		ks.metadata
			.versions
			.iter()
			.map(|v| (v.version_number, v.status))
			.collect()
	}

	#[test]
	fn new_primary_demotes_old_one() {
		init();
		let mut ks = MemoryKeySet::new("test", KeyPurpose::DecryptAndEncrypt, KeyType::Aes).unwrap();

		assert_eq!(1, ks.generate_key(KeyStatus::Primary, 0).unwrap());
		assert_eq!(2, ks.generate_key(KeyStatus::Primary, 0).unwrap());

		assert_eq!(
			vec![(1, KeyStatus::Active), (2, KeyStatus::Primary)],
			statuses(&ks)
		);
	}

	#[test]
	fn promotion_and_demotion() {
		init();
		let mut ks = MemoryKeySet::new("test", KeyPurpose::SignAndVerify, KeyType::HmacSha1).unwrap();
		ks.generate_key(KeyStatus::Primary, 0).unwrap();
		ks.generate_key(KeyStatus::Active, 0).unwrap();

		ks.set_status(2, KeyStatus::Primary).unwrap();
		ks.set_status(1, KeyStatus::Inactive).unwrap();

		assert_eq!(
			vec![(1, KeyStatus::Inactive), (2, KeyStatus::Primary)],
			statuses(&ks)
		);
		assert!(matches!(
			ks.set_status(7, KeyStatus::Active),
			Err(Error::InvalidKeySet(_))
		));
	}

	#[test]
	fn only_inactive_versions_can_be_removed() {
		init();
		let mut ks = MemoryKeySet::new("test", KeyPurpose::DecryptAndEncrypt, KeyType::Aes).unwrap();
		ks.generate_key(KeyStatus::Primary, 0).unwrap();

		assert!(matches!(ks.remove(1), Err(Error::InvalidKeySet(_))));

		ks.set_status(1, KeyStatus::Inactive).unwrap();
		ks.remove(1).unwrap();

		assert!(ks.metadata.versions.is_empty());
		assert!(matches!(ks.key_data(1), Err(Error::InvalidKeySet(_))));
	}

	#[test]
	fn removed_version_numbers_are_not_reused() {
		init();
		let mut ks = MemoryKeySet::new("test", KeyPurpose::DecryptAndEncrypt, KeyType::Aes).unwrap();
		ks.generate_key(KeyStatus::Inactive, 0).unwrap();
		ks.generate_key(KeyStatus::Primary, 0).unwrap();
		ks.remove(1).unwrap();

		assert_eq!(3, ks.generate_key(KeyStatus::Active, 0).unwrap());
	}

	#[test]
	fn wrong_key_type_is_refused() {
		init();
		let mut ks = MemoryKeySet::new("test", KeyPurpose::DecryptAndEncrypt, KeyType::Aes).unwrap();
		let key = Key::generate(KeyType::HmacSha1, 0).unwrap();

		assert!(matches!(
			ks.add_key(&key, KeyStatus::Primary),
			Err(Error::InvalidKeySet(_))
		));
	}

	#[test]
	fn purpose_must_suit_the_key_type() {
		init();

		assert!(matches!(
			MemoryKeySet::new("test", KeyPurpose::SignAndVerify, KeyType::Aes),
			Err(Error::InvalidKeySet(_))
		));
	}

	#[test]
	fn from_parts_wants_data_for_every_version() {
		init();
		let mut ks = MemoryKeySet::new("test", KeyPurpose::DecryptAndEncrypt, KeyType::Aes).unwrap();
		ks.generate_key(KeyStatus::Primary, 0).unwrap();
		let metadata = ks.metadata().unwrap();

		assert!(matches!(
			MemoryKeySet::from_parts(metadata.clone(), []),
			Err(Error::InvalidKeySet(_))
		));

		let data = ks.key_data(1).unwrap().to_vec();
		let rebuilt = MemoryKeySet::from_parts(metadata, [(1, data)]).unwrap();
		assert_eq!(ks.key_data(1).unwrap(), rebuilt.key_data(1).unwrap());
	}

	#[test]
	fn encryption_flag_is_fixed_once_keys_exist() {
		init();
		let mut ks = MemoryKeySet::new("test", KeyPurpose::DecryptAndEncrypt, KeyType::Aes).unwrap();
		ks.set_encrypted(true).unwrap();

		let key = Key::generate(KeyType::Aes, 0).unwrap();
		assert!(matches!(
			ks.add_key(&key, KeyStatus::Primary),
			Err(Error::InvalidKeySet(_))
		));

		ks.add_key_data(vec![1, 2, 3], KeyStatus::Primary).unwrap();
		assert!(matches!(
			ks.set_encrypted(false),
			Err(Error::InvalidKeySet(_))
		));
	}

	#[test]
	fn version_numbers_run_out() {
		init();
		let mut ks = MemoryKeySet::new("test", KeyPurpose::DecryptAndEncrypt, KeyType::Aes).unwrap();
		ks.generate_key(KeyStatus::Primary, 0).unwrap();
		let data = ks.key_data(1).unwrap().to_vec();

		let mut metadata = KeyMetadata::new("test", KeyPurpose::DecryptAndEncrypt, KeyType::Aes);
		metadata
			.versions
			.push(KeyVersion::new(u32::MAX, KeyStatus::Primary));
		let mut ks = MemoryKeySet::from_parts(metadata, [(u32::MAX, data)]).unwrap();

		assert!(matches!(
			ks.generate_key(KeyStatus::Active, 0),
			Err(Error::InvalidKeySet(_))
		));
		assert!(matches!(
			ks.add_key_data(vec![1, 2, 3], KeyStatus::Active),
			Err(Error::InvalidKeySet(_))
		));
		assert_eq!(1, ks.metadata().unwrap().versions.len());
	}
}
