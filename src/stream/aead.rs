use aes::Aes192;
use aes_gcm::{
	Aes128Gcm, Aes256Gcm, AesGcm, KeyInit as _, Nonce,
	aead::{Aead as _, Payload},
};
use rand::{RngCore as _, rng};
use typenum::U12;
use zeroize::Zeroizing;

use super::{Direction, Error, FinishingStream};

pub(crate) const NONCE_SIZE: usize = 12;

enum Gcm {
	Aes128(Aes128Gcm),
	Aes192(AesGcm<Aes192, U12>),
	Aes256(Aes256Gcm),
}

impl Gcm {
	fn new(key: &[u8]) -> Result<Self, Error> {
		let bad = |_| Error::InvalidCryptoData;

		Ok(match key.len() {
			16 => Self::Aes128(Aes128Gcm::new_from_slice(key).map_err(bad)?),
			24 => Self::Aes192(AesGcm::new_from_slice(key).map_err(bad)?),
			32 => Self::Aes256(Aes256Gcm::new_from_slice(key).map_err(bad)?),
			n => return Err(Error::invalid_key(format!("{n} byte AES key"))),
		})
	}

	fn seal(&self, nonce: &[u8], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
		let nonce = Nonce::<U12>::from_slice(nonce);
		let payload = Payload { msg, aad };

		match self {
			Self::Aes128(c) => c.encrypt(nonce, payload),
			Self::Aes192(c) => c.encrypt(nonce, payload),
			Self::Aes256(c) => c.encrypt(nonce, payload),
		}
	}

	fn open(&self, nonce: &[u8], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
		let nonce = Nonce::<U12>::from_slice(nonce);
		let payload = Payload { msg, aad };

		match self {
			Self::Aes128(c) => c.decrypt(nonce, payload),
			Self::Aes192(c) => c.decrypt(nonce, payload),
			Self::Aes256(c) => c.decrypt(nonce, payload),
		}
	}
}

/// AES-GCM, authenticating the artifact header as associated data.
///
/// GCM only releases plaintext once the whole message has been checked, so this stream holds
/// everything until it is finished.  The nonce is emitted as soon as encryption starts.
pub(crate) struct AeadStream {
	direction: Direction,
	gcm: Gcm,
	aad: Vec<u8>,
	nonce: [u8; NONCE_SIZE],
	started: bool,
	finished: bool,
	buffer: Zeroizing<Vec<u8>>,
}

impl AeadStream {
	pub(crate) fn encryptor(key: &[u8], aad: &[u8]) -> Result<Self, Error> {
		let mut nonce = [0u8; NONCE_SIZE];
		rng().fill_bytes(&mut nonce);

		Self::new(Direction::Encrypt, key, aad, nonce)
	}

	pub(crate) fn decryptor(key: &[u8], aad: &[u8]) -> Result<Self, Error> {
		Self::new(Direction::Decrypt, key, aad, [0u8; NONCE_SIZE])
	}

	fn new(
		direction: Direction,
		key: &[u8],
		aad: &[u8],
		nonce: [u8; NONCE_SIZE],
	) -> Result<Self, Error> {
		Ok(Self {
			direction,
			gcm: Gcm::new(key)?,
			aad: aad.to_vec(),
			nonce,
			started: false,
			finished: false,
			buffer: Zeroizing::new(Vec::new()),
		})
	}

	fn start(&mut self, output: &mut Vec<u8>) {
		if !self.started {
			self.started = true;
			if self.direction == Direction::Encrypt {
				output.extend_from_slice(&self.nonce);
			}
		}
	}
}

impl FinishingStream for AeadStream {
	fn write(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), Error> {
		if self.finished {
			return Err(Error::StreamFinished);
		}
		self.start(output);
		self.buffer.extend_from_slice(input);

		Ok(())
	}

	fn finish(&mut self, output: &mut Vec<u8>) -> Result<(), Error> {
		if self.finished {
			return Ok(());
		}
		self.start(output);
		self.finished = true;

		match self.direction {
			Direction::Encrypt => {
				let ciphertext = self
					.gcm
					.seal(&self.nonce, &self.buffer, &self.aad)
					.map_err(|_| Error::InvalidCryptoData)?;
				output.extend_from_slice(&ciphertext);
			}
			Direction::Decrypt => {
				if self.buffer.len() < NONCE_SIZE {
					return Err(Error::InvalidCryptoData);
				}
				let (nonce, ciphertext) = self.buffer.split_at(NONCE_SIZE);
				let plaintext = Zeroizing::new(
					self.gcm
						.open(nonce, ciphertext, &self.aad)
						.map_err(|_| {
							tracing::debug!("GCM tag mismatch");
							Error::InvalidCryptoData
						})?,
				);
				output.extend_from_slice(&plaintext);
			}
		}

		self.buffer.clear();
		Ok(())
	}
}
