use hmac::{
	Hmac,
	digest::{KeyInit as _, generic_array::GenericArray},
};
use sha1::Sha1;

use super::{Error, FinishingStream, HmacStream, VerifyingStream};

// Deliberately unrelated to any real key; one SHA-1 block long
const DECOY_KEY: [u8; 64] = [0x5c; 64];

/// A stand-in for a real MAC/signature stream, used when no key matches an artifact's header.
///
/// It does the same HMAC work over the same bytes a real key would, and then always fails
/// verification.  Callers run the whole operation through it, so "we don't know that key"
/// takes the same path as "that tag is wrong".  Only the MAC work is mirrored; cipher work is
/// not.
pub(crate) struct DummyStream {
	inner: HmacStream,
}

impl DummyStream {
	pub(crate) fn new() -> Self {
		Self {
			inner: HmacStream::from_mac(Hmac::<Sha1>::new(GenericArray::from_slice(&DECOY_KEY))),
		}
	}
}

impl FinishingStream for DummyStream {
	fn write(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), Error> {
		self.inner.write(input, output)
	}

	fn finish(&mut self, output: &mut Vec<u8>) -> Result<(), Error> {
		self.inner.finish(output)
	}
}

impl VerifyingStream for DummyStream {
	fn tag_len(&self) -> usize {
		self.inner.tag_len()
	}

	fn hash_value(&self) -> &[u8] {
		&[]
	}

	fn verify_signature(&mut self, candidate: &[u8]) -> Result<bool, Error> {
		let _ = self.inner.verify_signature(candidate)?;

		Ok(false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn never_verifies_even_its_own_tag() {
		let mut real = HmacStream::new(&DECOY_KEY).unwrap();
		real.update(b"anything").unwrap();
		real.seal().unwrap();

		let mut dummy = DummyStream::new();
		dummy.update(b"anything").unwrap();

		assert!(!dummy.verify_signature(real.hash_value()).unwrap());
		assert!(dummy.hash_value().is_empty());
		assert_eq!(real.tag_len(), dummy.tag_len());
	}
}
