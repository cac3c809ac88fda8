use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeSet, fmt, str::FromStr};

use super::{Error, KeyPurpose, KeyType};

/// Where a key version is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyStatus {
	/// Used for all new encryptions/signatures, and for decryption/verification.
	#[serde(rename = "PRIMARY")]
	Primary,
	/// Only used for decryption/verification.
	#[serde(rename = "ACTIVE")]
	Active,
	/// Kept around, but not used unless inactive keys are explicitly allowed.
	#[serde(rename = "INACTIVE")]
	Inactive,
}

impl KeyStatus {
	pub fn tag(self) -> &'static str {
		match self {
			KeyStatus::Primary => "PRIMARY",
			KeyStatus::Active => "ACTIVE",
			KeyStatus::Inactive => "INACTIVE",
		}
	}

	fn rank(self) -> u8 {
		match self {
			KeyStatus::Primary => 0,
			KeyStatus::Active => 1,
			KeyStatus::Inactive => 2,
		}
	}
}

impl fmt::Display for KeyStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.tag())
	}
}

impl FromStr for KeyStatus {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Error> {
		[KeyStatus::Primary, KeyStatus::Active, KeyStatus::Inactive]
			.into_iter()
			.find(|st| st.tag() == s)
			.ok_or_else(|| Error::invalid_key_set(format!("unknown key status {s:?}")))
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVersion {
	#[serde(rename = "versionNumber")]
	pub version_number: u32,
	pub status: KeyStatus,
	pub exportable: bool,
}

impl KeyVersion {
	pub fn new(version_number: u32, status: KeyStatus) -> Self {
		Self {
			version_number,
			status,
			exportable: false,
		}
	}

	/// The order in which candidate keys are tried.
	///
	/// Primary comes first, then active, then inactive; within a status, newer versions come
	/// before older ones.
	pub fn canonical_cmp(&self, other: &Self) -> Ordering {
		self.status
			.rank()
			.cmp(&other.status.rank())
			.then_with(|| other.version_number.cmp(&self.version_number))
	}
}

/// Everything about a key set except the keys themselves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
	pub name: String,
	pub purpose: KeyPurpose,
	#[serde(rename = "type")]
	pub key_type: KeyType,
	/// When set, the data for each version is itself ciphertext, not key material.
	pub encrypted: bool,
	pub versions: Vec<KeyVersion>,
}

impl KeyMetadata {
	pub fn new(name: impl Into<String>, purpose: KeyPurpose, key_type: KeyType) -> Self {
		Self {
			name: name.into(),
			purpose,
			key_type,
			encrypted: false,
			versions: Vec::new(),
		}
	}

	pub fn primary(&self) -> Option<&KeyVersion> {
		self.versions.iter().find(|v| v.status == KeyStatus::Primary)
	}

	pub fn version(&self, version_number: u32) -> Option<&KeyVersion> {
		self.versions
			.iter()
			.find(|v| v.version_number == version_number)
	}

	pub(crate) fn version_mut(&mut self, version_number: u32) -> Option<&mut KeyVersion> {
		self.versions
			.iter_mut()
			.find(|v| v.version_number == version_number)
	}

	/// Versions in the order they should be tried when looking for a key.
	pub fn sorted_versions(&self) -> Vec<&KeyVersion> {
		let mut v: Vec<&KeyVersion> = self.versions.iter().collect();
		v.sort_by(|a, b| a.canonical_cmp(b));
		v
	}

	/// # Errors
	///
	/// [`Error::InvalidKeySet`] if the highest version number is already `u32::MAX`.
	pub fn next_version_number(&self) -> Result<u32, Error> {
		self.versions
			.iter()
			.map(|v| v.version_number)
			.max()
			.unwrap_or(0)
			.checked_add(1)
			.ok_or_else(|| Error::invalid_key_set("version numbers exhausted"))
	}

	/// Check the structural rules every key set must follow.
	#[tracing::instrument(level = "trace", skip(self), fields(name = %self.name))]
	pub fn validate(&self) -> Result<(), Error> {
		if !self.key_type.supports(self.purpose) {
			return Err(Error::invalid_key_set(format!(
				"{} keys cannot be used for {}",
				self.key_type, self.purpose
			)));
		}

		if self
			.versions
			.iter()
			.filter(|v| v.status == KeyStatus::Primary)
			.count() > 1
		{
			return Err(Error::invalid_key_set("more than one primary version"));
		}

		let mut seen = BTreeSet::new();
		for v in &self.versions {
			if v.version_number == 0 {
				return Err(Error::invalid_key_set("version numbers start at 1"));
			}
			if !seen.insert(v.version_number) {
				return Err(Error::invalid_key_set(format!(
					"duplicate version {}",
					v.version_number
				)));
			}
		}

		Ok(())
	}

	pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
		let mut v = Vec::new();
		ciborium::into_writer(self, &mut v)
			.map_err(|e| Error::invalid_key_set(format!("could not encode metadata: {e}")))?;
		Ok(v)
	}

	pub fn from_bytes(b: &[u8]) -> Result<Self, Error> {
		let metadata: Self = ciborium::from_reader(b)
			.map_err(|e| Error::invalid_key_set(format!("could not decode metadata: {e}")))?;
		metadata.validate()?;
		Ok(metadata)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn v(n: u32, status: KeyStatus) -> KeyVersion {
		KeyVersion::new(n, status)
	}

	#[test]
	fn primary_sorts_first() {
		let mut versions = vec![
			v(3, KeyStatus::Active),
			v(1, KeyStatus::Primary),
			v(4, KeyStatus::Inactive),
			v(2, KeyStatus::Active),
		];
		versions.sort_by(|a, b| a.canonical_cmp(b));

		assert_eq!(
			vec![1, 3, 2, 4],
			versions
				.iter()
				.map(|v| v.version_number)
				.collect::<Vec<_>>()
		);
	}

	#[test]
	fn newest_first_within_status() {
		assert_eq!(
			Ordering::Less,
			v(7, KeyStatus::Inactive).canonical_cmp(&v(6, KeyStatus::Inactive))
		);
		assert_eq!(
			Ordering::Less,
			v(1, KeyStatus::Active).canonical_cmp(&v(9, KeyStatus::Inactive))
		);
	}

	#[test]
	fn two_primaries_is_invalid() {
		let mut md = KeyMetadata::new("test", KeyPurpose::DecryptAndEncrypt, KeyType::Aes);
		md.versions.push(v(1, KeyStatus::Primary));
		md.versions.push(v(2, KeyStatus::Primary));

		assert!(matches!(md.validate(), Err(Error::InvalidKeySet(_))));
	}

	#[test]
	fn purpose_must_suit_type() {
		let md = KeyMetadata::new("test", KeyPurpose::SignAndVerify, KeyType::Aes);

		assert!(matches!(md.validate(), Err(Error::InvalidKeySet(_))));
	}

	#[test]
	fn survives_encoding() {
		let mut md = KeyMetadata::new("test", KeyPurpose::SignAndVerify, KeyType::RsaPrivate);
		md.versions.push(v(1, KeyStatus::Active));
		md.versions.push(v(2, KeyStatus::Primary));
		md.encrypted = true;

		assert_eq!(md, KeyMetadata::from_bytes(&md.to_bytes().unwrap()).unwrap());
		assert_eq!(3, md.next_version_number().unwrap());
		assert_eq!(2, md.primary().unwrap().version_number);
	}

	#[test]
	fn unknown_type_tag_is_rejected() {
		let md = KeyMetadata::new("test", KeyPurpose::DecryptAndEncrypt, KeyType::Aes);
		let mut bytes = md.to_bytes().unwrap();

		// "AES" is the only place these three bytes turn up
		let pos = bytes
			.windows(3)
			.position(|w| w == b"AES")
			.unwrap();
		bytes[pos..pos + 3].copy_from_slice(b"XYZ");

		assert!(matches!(
			KeyMetadata::from_bytes(&bytes),
			Err(Error::InvalidKeySet(_))
		));
	}
}
