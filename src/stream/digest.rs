use dsa::signature::{DigestSigner as _, DigestVerifier as _, SignatureEncoding as _};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::{Digest as _, Sha1};

use super::{Error, FinishingStream, VerifyingStream};

/// The private half of a signature key, for streams that make signatures.
#[derive(Clone, Copy)]
pub(crate) enum SignKey<'k> {
	Rsa(&'k RsaPrivateKey),
	Dsa(&'k dsa::SigningKey),
}

/// The public half of a signature key.  Every digest stream has one, since checking is always
/// done with the public key.
#[derive(Clone, Copy)]
pub(crate) enum VerifyKey<'k> {
	Rsa(&'k RsaPublicKey),
	Dsa(&'k dsa::VerifyingKey),
}

/// A SHA-1 digest of everything written, signed (or checked) with a public-key scheme when the
/// stream finishes.
pub(crate) struct DigestStream<'k> {
	signer: Option<SignKey<'k>>,
	verifier: VerifyKey<'k>,
	digest: Sha1,
	finished: bool,
	signature: Vec<u8>,
	tag_len: usize,
}

impl<'k> DigestStream<'k> {
	pub(crate) fn verifying(verifier: VerifyKey<'k>, tag_len: usize) -> Self {
		Self {
			signer: None,
			verifier,
			digest: Sha1::new(),
			finished: false,
			signature: Vec::new(),
			tag_len,
		}
	}

	pub(crate) fn signing(signer: SignKey<'k>, verifier: VerifyKey<'k>, tag_len: usize) -> Self {
		Self {
			signer: Some(signer),
			..Self::verifying(verifier, tag_len)
		}
	}

	fn check(&self, digest: Sha1, candidate: &[u8]) -> bool {
		match self.verifier {
			VerifyKey::Rsa(k) => k
				.verify(Pkcs1v15Sign::new::<Sha1>(), &digest.finalize(), candidate)
				.is_ok(),
			VerifyKey::Dsa(k) => dsa::Signature::try_from(candidate)
				.and_then(|sig| k.verify_digest(digest, &sig))
				.is_ok(),
		}
	}
}

fn sign(signer: SignKey<'_>, digest: Sha1) -> Result<Vec<u8>, Error> {
	match signer {
		SignKey::Rsa(k) => k
			.sign(Pkcs1v15Sign::new::<Sha1>(), &digest.finalize())
			.map_err(|e| {
				tracing::debug!(%e, "RSA signing failed");
				Error::InvalidCryptoData
			}),
		SignKey::Dsa(k) => {
			let sig: dsa::Signature = k.try_sign_digest(digest).map_err(|e| {
				tracing::debug!(%e, "DSA signing failed");
				Error::InvalidCryptoData
			})?;
			Ok(sig.to_vec())
		}
	}
}

impl FinishingStream for DigestStream<'_> {
	fn write(&mut self, input: &[u8], _output: &mut Vec<u8>) -> Result<(), Error> {
		if self.finished {
			return Err(Error::StreamFinished);
		}
		self.digest.update(input);

		Ok(())
	}

	fn finish(&mut self, _output: &mut Vec<u8>) -> Result<(), Error> {
		if !self.finished {
			self.finished = true;
			if let Some(signer) = self.signer {
				self.signature = sign(signer, self.digest.clone())?;
			}
		}

		Ok(())
	}
}

impl VerifyingStream for DigestStream<'_> {
	fn tag_len(&self) -> usize {
		self.tag_len
	}

	fn hash_value(&self) -> &[u8] {
		&self.signature
	}

	fn verify_signature(&mut self, candidate: &[u8]) -> Result<bool, Error> {
		self.seal()?;

		Ok(self.check(self.digest.clone(), candidate))
	}
}
