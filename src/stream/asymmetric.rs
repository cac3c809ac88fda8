use rsa::{Oaep, RsaPrivateKey, RsaPublicKey, rand_core::OsRng, traits::PublicKeyParts as _};
use sha1::Sha1;
use zeroize::Zeroizing;

use super::{Error, FinishingStream};

// OAEP with SHA-1 costs two digests plus two bytes of every block
const OAEP_OVERHEAD: usize = 2 * 20 + 2;

pub(crate) enum RsaKey<'k> {
	Encrypt(&'k RsaPublicKey),
	Decrypt(&'k RsaPrivateKey),
}

/// RSA-OAEP over a single block.
///
/// Everything written is collected, and the one RSA operation happens when the stream is
/// finished.  Anything longer than a block is refused rather than silently split.
pub(crate) struct AsymmetricStream<'k> {
	key: RsaKey<'k>,
	buffer: Zeroizing<Vec<u8>>,
	finished: bool,
}

impl<'k> AsymmetricStream<'k> {
	pub(crate) fn new(key: RsaKey<'k>) -> Self {
		Self {
			key,
			buffer: Zeroizing::new(Vec::new()),
			finished: false,
		}
	}

	fn limit(&self) -> usize {
		match self.key {
			RsaKey::Encrypt(k) => k.size().saturating_sub(OAEP_OVERHEAD),
			RsaKey::Decrypt(k) => k.size(),
		}
	}
}

impl FinishingStream for AsymmetricStream<'_> {
	fn write(&mut self, input: &[u8], _output: &mut Vec<u8>) -> Result<(), Error> {
		if self.finished {
			return Err(Error::StreamFinished);
		}

		if self.buffer.len() + input.len() > self.limit() {
			return Err(match self.key {
				RsaKey::Encrypt(_) => Error::malformed("plaintext does not fit in one RSA block"),
				RsaKey::Decrypt(_) => Error::InvalidCryptoData,
			});
		}
		self.buffer.extend_from_slice(input);

		Ok(())
	}

	fn finish(&mut self, output: &mut Vec<u8>) -> Result<(), Error> {
		if self.finished {
			return Ok(());
		}
		self.finished = true;

		match self.key {
			RsaKey::Encrypt(k) => {
				let ciphertext = k
					.encrypt(&mut OsRng, Oaep::new::<Sha1>(), &self.buffer)
					.map_err(|e| {
						tracing::debug!(%e, "RSA encryption failed");
						Error::InvalidCryptoData
					})?;
				output.extend_from_slice(&ciphertext);
			}
			RsaKey::Decrypt(k) => {
				let plaintext = Zeroizing::new(
					k.decrypt(Oaep::new::<Sha1>(), &self.buffer)
						.map_err(|_| Error::InvalidCryptoData)?,
				);
				output.extend_from_slice(&plaintext);
			}
		}

		self.buffer.clear();
		Ok(())
	}
}
