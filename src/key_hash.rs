use sha1::{Digest as _, Sha1};

/// Number of bytes of key hash carried in every artifact header.
pub const KEY_HASH_SIZE: usize = 4;

type Kh = [u8; KEY_HASH_SIZE];

/// A short identifier for a key, derived from its public (or otherwise identifying) material.
///
/// Every ciphertext and signature starts with the hash of the key that produced it, so the
/// right key can be found again without trial decryption.
#[allow(clippy::derived_hash_with_manual_eq)] // k1 == k2 => hash(k1) == hash(k2) will hold
#[derive(Clone, Copy, Debug, Hash)]
#[repr(transparent)]
pub struct KeyHash(Kh);

impl KeyHash {
	pub fn as_bytes(&self) -> &Kh {
		&self.0
	}

	/// Hash a sequence of key components, each prefixed with its big-endian `u32` length.
	pub(crate) fn of_length_prefixed<'a>(components: impl IntoIterator<Item = &'a [u8]>) -> Self {
		let mut h = Sha1::new();

		for c in components {
			h.update((c.len() as u32).to_be_bytes());
			h.update(c);
		}

		Self::truncate(&h.finalize())
	}

	/// Hash key material as one unprefixed blob.
	pub(crate) fn of_raw(material: &[u8]) -> Self {
		Self::truncate(&Sha1::digest(material))
	}

	fn truncate(digest: &[u8]) -> Self {
		let mut kh: Kh = Default::default();
		kh.copy_from_slice(&digest[..KEY_HASH_SIZE]);
		Self(kh)
	}
}

impl From<Kh> for KeyHash {
	fn from(kh: Kh) -> Self {
		Self(kh)
	}
}

impl TryFrom<&[u8]> for KeyHash {
	type Error = super::Error;

	fn try_from(b: &[u8]) -> Result<Self, Self::Error> {
		Ok(Self(b.try_into().map_err(|_| super::Error::InvalidCryptoData)?))
	}
}

impl PartialEq for KeyHash {
	fn eq(&self, other: &Self) -> bool {
		constant_time_eq::constant_time_eq_n(&self.0, &other.0)
	}
}

impl Eq for KeyHash {}

impl std::fmt::Display for KeyHash {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for b in &self.0 {
			f.write_fmt(format_args!("{b:02x}"))?;
		}

		Ok(())
	}
}

/// Big-endian magnitude with leading zero bytes removed, as key hashes expect.
pub(crate) fn strip_leading_zeros(b: &[u8]) -> &[u8] {
	let first = b.iter().position(|&x| x != 0).unwrap_or(b.len());
	&b[first..]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn length_prefix_is_part_of_the_hash() {
		let a = KeyHash::of_length_prefixed([&b"ab"[..], &b"c"[..]]);
		let b = KeyHash::of_length_prefixed([&b"a"[..], &b"bc"[..]]);

		assert_ne!(a, b);
	}

	#[test]
	fn raw_hash_is_sha1_prefix() {
		// SHA1("abc") = a9993e36...
		assert_eq!("a9993e36", KeyHash::of_raw(b"abc").to_string());
	}

	#[test]
	fn stripping() {
		assert_eq!(&[1u8, 0][..], strip_leading_zeros(&[0, 0, 1, 0]));
		assert!(strip_leading_zeros(&[0, 0]).is_empty());
	}
}
