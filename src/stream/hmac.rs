use hmac::{Hmac, Mac as _};
use sha1::Sha1;

use super::{Error, FinishingStream, VerifyingStream};

pub(crate) const TAG_SIZE: usize = 20;

/// HMAC-SHA1 over everything written.
pub(crate) struct HmacStream {
	mac: Option<Hmac<Sha1>>,
	tag: Vec<u8>,
}

impl HmacStream {
	pub(crate) fn new(key: &[u8]) -> Result<Self, Error> {
		Ok(Self {
			mac: Some(
				Hmac::<Sha1>::new_from_slice(key)
					.map_err(|_| Error::invalid_key("unusable HMAC key"))?,
			),
			tag: Vec::new(),
		})
	}

	pub(crate) fn from_mac(mac: Hmac<Sha1>) -> Self {
		Self {
			mac: Some(mac),
			tag: Vec::new(),
		}
	}
}

impl FinishingStream for HmacStream {
	fn write(&mut self, input: &[u8], _output: &mut Vec<u8>) -> Result<(), Error> {
		let Some(mac) = self.mac.as_mut() else {
			return Err(Error::StreamFinished);
		};
		mac.update(input);

		Ok(())
	}

	fn finish(&mut self, _output: &mut Vec<u8>) -> Result<(), Error> {
		if let Some(mac) = self.mac.take() {
			self.tag = mac.finalize().into_bytes().to_vec();
		}

		Ok(())
	}
}

impl VerifyingStream for HmacStream {
	fn tag_len(&self) -> usize {
		TAG_SIZE
	}

	fn hash_value(&self) -> &[u8] {
		&self.tag
	}

	fn verify_signature(&mut self, candidate: &[u8]) -> Result<bool, Error> {
		self.seal()?;

		if candidate.len() < TAG_SIZE {
			return Ok(false);
		}

		Ok(constant_time_eq::constant_time_eq(
			&candidate[..TAG_SIZE],
			&self.tag,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rfc2202_case_2() {
		let mut s = HmacStream::new(b"Jefe").unwrap();
		s.update(b"what do ya want ").unwrap();
		s.update(b"for nothing?").unwrap();
		s.seal().unwrap();

		assert_eq!(
			"effcdf6ae5eb2fa2d27416d5f184df9c259a7c79",
			s.hash_value()
				.iter()
				.map(|b| format!("{b:02x}"))
				.collect::<String>()
		);
	}

	#[test]
	fn verify_finishes_implicitly() {
		let mut signer = HmacStream::new(&[5u8; 32]).unwrap();
		signer.update(b"data").unwrap();
		signer.seal().unwrap();
		let tag = signer.hash_value().to_vec();

		let mut verifier = HmacStream::new(&[5u8; 32]).unwrap();
		verifier.update(b"data").unwrap();
		assert!(verifier.verify_signature(&tag).unwrap());

		let mut wrong = HmacStream::new(&[5u8; 32]).unwrap();
		wrong.update(b"date").unwrap();
		assert!(!wrong.verify_signature(&tag).unwrap());
	}

	#[test]
	fn short_candidates_never_match() {
		let mut s = HmacStream::new(&[5u8; 32]).unwrap();
		s.update(b"data").unwrap();
		assert!(!s.verify_signature(&[]).unwrap());
	}
}
