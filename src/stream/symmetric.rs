use aes::{Aes128, Aes192, Aes256, Block};
use cbc::cipher::{BlockDecryptMut as _, BlockEncryptMut as _, KeyIvInit as _};
use rand::{RngCore as _, rng};
use zeroize::Zeroizing;

use super::{Direction, Error, FinishingStream};

pub(crate) const BLOCK_SIZE: usize = 16;

enum Cbc {
	Enc128(cbc::Encryptor<Aes128>),
	Enc192(cbc::Encryptor<Aes192>),
	Enc256(cbc::Encryptor<Aes256>),
	Dec128(cbc::Decryptor<Aes128>),
	Dec192(cbc::Decryptor<Aes192>),
	Dec256(cbc::Decryptor<Aes256>),
}

impl Cbc {
	fn new(direction: Direction, key: &[u8], iv: &[u8]) -> Result<Self, Error> {
		let bad = |_| Error::InvalidCryptoData;

		Ok(match (direction, key.len()) {
			(Direction::Encrypt, 16) => Self::Enc128(cbc::Encryptor::new_from_slices(key, iv).map_err(bad)?),
			(Direction::Encrypt, 24) => Self::Enc192(cbc::Encryptor::new_from_slices(key, iv).map_err(bad)?),
			(Direction::Encrypt, 32) => Self::Enc256(cbc::Encryptor::new_from_slices(key, iv).map_err(bad)?),
			(Direction::Decrypt, 16) => Self::Dec128(cbc::Decryptor::new_from_slices(key, iv).map_err(bad)?),
			(Direction::Decrypt, 24) => Self::Dec192(cbc::Decryptor::new_from_slices(key, iv).map_err(bad)?),
			(Direction::Decrypt, 32) => Self::Dec256(cbc::Decryptor::new_from_slices(key, iv).map_err(bad)?),
			(_, n) => return Err(Error::invalid_key(format!("{n} byte AES key"))),
		})
	}

	/// Transform `blocks` in place; its length must be a multiple of the block size.
	fn apply(&mut self, blocks: &mut [u8]) {
		for chunk in blocks.chunks_exact_mut(BLOCK_SIZE) {
			let block = Block::from_mut_slice(chunk);
			match self {
				Self::Enc128(c) => c.encrypt_block_mut(block),
				Self::Enc192(c) => c.encrypt_block_mut(block),
				Self::Enc256(c) => c.encrypt_block_mut(block),
				Self::Dec128(c) => c.decrypt_block_mut(block),
				Self::Dec192(c) => c.decrypt_block_mut(block),
				Self::Dec256(c) => c.decrypt_block_mut(block),
			}
		}
	}
}

/// AES-CBC with PKCS#7 padding, processed a block at a time as data arrives.
///
/// Unless running in ciphertext-only mode, the IV travels in-band: it is emitted ahead of the
/// first ciphertext block when encrypting, and taken off the front of the input when
/// decrypting.
pub(crate) struct SymmetricStream<'k> {
	direction: Direction,
	key: &'k [u8],
	iv: Vec<u8>,
	ciphertext_only: bool,
	cipher: Option<Cbc>,
	started: bool,
	finished: bool,
	pending: Zeroizing<Vec<u8>>,
}

impl<'k> SymmetricStream<'k> {
	/// An encrypting stream, using `iv` if given or a fresh random one otherwise.
	pub(crate) fn encryptor(
		key: &'k [u8],
		iv: Option<[u8; BLOCK_SIZE]>,
		ciphertext_only: bool,
	) -> Result<Self, Error> {
		let iv = iv.unwrap_or_else(|| {
			let mut iv = [0u8; BLOCK_SIZE];
			rng().fill_bytes(&mut iv);
			iv
		});

		Ok(Self {
			direction: Direction::Encrypt,
			key,
			cipher: Some(Cbc::new(Direction::Encrypt, key, &iv)?),
			iv: iv.to_vec(),
			ciphertext_only,
			started: false,
			finished: false,
			pending: Zeroizing::new(Vec::new()),
		})
	}

	/// A decrypting stream.  Supplying `iv` puts the stream in ciphertext-only mode; otherwise
	/// the IV is read from the head of the input.
	pub(crate) fn decryptor(key: &'k [u8], iv: Option<[u8; BLOCK_SIZE]>) -> Result<Self, Error> {
		let cipher = iv
			.map(|iv| Cbc::new(Direction::Decrypt, key, &iv))
			.transpose()?;

		Ok(Self {
			direction: Direction::Decrypt,
			key,
			iv: iv.map(|iv| iv.to_vec()).unwrap_or_default(),
			ciphertext_only: cipher.is_some(),
			cipher,
			started: false,
			finished: false,
			pending: Zeroizing::new(Vec::new()),
		})
	}

	fn start(&mut self, output: &mut Vec<u8>) {
		if !self.started {
			self.started = true;
			if self.direction == Direction::Encrypt && !self.ciphertext_only {
				output.extend_from_slice(&self.iv);
			}
		}
	}

	fn write_encrypt(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), Error> {
		let Some(cipher) = self.cipher.as_mut() else {
			return Err(Error::InvalidCryptoData);
		};

		self.pending.extend_from_slice(input);
		let full = self.pending.len() - self.pending.len() % BLOCK_SIZE;
		cipher.apply(&mut self.pending[..full]);
		output.extend_from_slice(&self.pending[..full]);
		self.pending.drain(..full);

		Ok(())
	}

	fn write_decrypt(&mut self, mut input: &[u8], output: &mut Vec<u8>) -> Result<(), Error> {
		if self.cipher.is_none() {
			let take = (BLOCK_SIZE - self.iv.len()).min(input.len());
			self.iv.extend_from_slice(&input[..take]);
			input = &input[take..];

			if self.iv.len() < BLOCK_SIZE {
				return Ok(());
			}
			self.cipher = Some(Cbc::new(Direction::Decrypt, self.key, &self.iv)?);
		}

		let Some(cipher) = self.cipher.as_mut() else {
			return Err(Error::InvalidCryptoData);
		};

		self.pending.extend_from_slice(input);

		// The last block (complete or not) stays behind, as it carries the padding
		if self.pending.len() > BLOCK_SIZE {
			let n = (self.pending.len() - 1) / BLOCK_SIZE * BLOCK_SIZE;
			cipher.apply(&mut self.pending[..n]);
			output.extend_from_slice(&self.pending[..n]);
			self.pending.drain(..n);
		}

		Ok(())
	}

	fn finish_encrypt(&mut self, output: &mut Vec<u8>) -> Result<(), Error> {
		let Some(cipher) = self.cipher.as_mut() else {
			return Err(Error::InvalidCryptoData);
		};

		let pad = BLOCK_SIZE - self.pending.len() % BLOCK_SIZE;
		let len = self.pending.len() + pad;
		self.pending.resize(len, pad as u8);
		cipher.apply(&mut self.pending[..]);
		output.extend_from_slice(&self.pending);
		self.pending.clear();

		Ok(())
	}

	fn finish_decrypt(&mut self, output: &mut Vec<u8>) -> Result<(), Error> {
		let Some(cipher) = self.cipher.as_mut() else {
			tracing::debug!("ciphertext ended before the IV did");
			return Err(Error::InvalidCryptoData);
		};

		if self.pending.len() != BLOCK_SIZE {
			tracing::debug!(len = self.pending.len(), "ciphertext is not a whole number of blocks");
			return Err(Error::InvalidCryptoData);
		}

		cipher.apply(&mut self.pending[..]);

		let pad = self.pending[BLOCK_SIZE - 1] as usize;
		let padding_ok = (1..=BLOCK_SIZE).contains(&pad)
			&& self.pending[BLOCK_SIZE - pad..]
				.iter()
				.fold(0u8, |acc, &b| acc | (b ^ pad as u8))
				== 0;

		if !padding_ok {
			tracing::debug!("bad padding");
			self.pending.clear();
			return Err(Error::InvalidCryptoData);
		}

		output.extend_from_slice(&self.pending[..BLOCK_SIZE - pad]);
		self.pending.clear();

		Ok(())
	}
}

impl FinishingStream for SymmetricStream<'_> {
	fn write(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), Error> {
		if self.finished {
			return Err(Error::StreamFinished);
		}
		self.start(output);

		match self.direction {
			Direction::Encrypt => self.write_encrypt(input, output),
			Direction::Decrypt => self.write_decrypt(input, output),
		}
	}

	fn finish(&mut self, output: &mut Vec<u8>) -> Result<(), Error> {
		if self.finished {
			return Ok(());
		}
		self.start(output);
		self.finished = true;

		match self.direction {
			Direction::Encrypt => self.finish_encrypt(output),
			Direction::Decrypt => self.finish_decrypt(output),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const KEY: [u8; 16] = [7u8; 16];

	fn encrypt_in_pieces(plaintext: &[u8], piece: usize) -> Vec<u8> {
		let mut enc = SymmetricStream::encryptor(&KEY, None, false).unwrap();
		let mut out = Vec::new();
		for p in plaintext.chunks(piece.max(1)) {
			enc.write(p, &mut out).unwrap();
		}
		enc.finish(&mut out).unwrap();
		out
	}

	fn decrypt_in_pieces(ciphertext: &[u8], piece: usize) -> Result<Vec<u8>, Error> {
		let mut dec = SymmetricStream::decryptor(&KEY, None)?;
		let mut out = Vec::new();
		for p in ciphertext.chunks(piece) {
			dec.write(p, &mut out)?;
		}
		dec.finish(&mut out)?;
		Ok(out)
	}

	#[test]
	fn iv_is_emitted_first() {
		let mut enc = SymmetricStream::encryptor(&KEY, Some([9u8; 16]), false).unwrap();
		let mut out = Vec::new();
		enc.write(b"abc", &mut out).unwrap();

		assert_eq!(vec![9u8; 16], out);

		enc.finish(&mut out).unwrap();
		assert_eq!(32, out.len());
	}

	#[test]
	fn piece_size_does_not_matter() {
		let plaintext: Vec<u8> = (0..100u8).collect();
		let ciphertext = encrypt_in_pieces(&plaintext, 7);

		// IV + 7 blocks (100 bytes rounds up to 112)
		assert_eq!(16 + 112, ciphertext.len());

		for piece in [1, 5, 16, 17, 1000] {
			assert_eq!(plaintext, decrypt_in_pieces(&ciphertext, piece).unwrap());
		}
	}

	#[test]
	fn block_aligned_plaintext_gets_a_full_padding_block() {
		let ciphertext = encrypt_in_pieces(&[1u8; 32], 32);

		assert_eq!(16 + 48, ciphertext.len());
		assert_eq!(vec![1u8; 32], decrypt_in_pieces(&ciphertext, 64).unwrap());
	}

	#[test]
	fn empty_plaintext() {
		let ciphertext = encrypt_in_pieces(b"", 1);

		assert_eq!(32, ciphertext.len());
		assert!(decrypt_in_pieces(&ciphertext, 3).unwrap().is_empty());
	}

	#[test]
	fn ciphertext_only_mode_carries_no_iv() {
		let iv = [3u8; 16];
		let mut enc = SymmetricStream::encryptor(&KEY, Some(iv), true).unwrap();
		let mut ct = Vec::new();
		enc.write(b"nested key data", &mut ct).unwrap();
		enc.finish(&mut ct).unwrap();

		assert_eq!(16, ct.len());

		let mut dec = SymmetricStream::decryptor(&KEY, Some(iv)).unwrap();
		let mut pt = Vec::new();
		dec.write(&ct, &mut pt).unwrap();
		dec.finish(&mut pt).unwrap();

		assert_eq!(b"nested key data".to_vec(), pt);
	}

	#[test]
	fn truncated_ciphertext_fails() {
		let ciphertext = encrypt_in_pieces(b"hello, world!", 4);

		assert!(matches!(
			decrypt_in_pieces(&ciphertext[..ciphertext.len() - 1], 4),
			Err(Error::InvalidCryptoData)
		));
		assert!(matches!(
			decrypt_in_pieces(&ciphertext[..10], 4),
			Err(Error::InvalidCryptoData)
		));
	}

	#[test]
	fn writing_after_finish_is_refused() {
		let mut enc = SymmetricStream::encryptor(&KEY, None, false).unwrap();
		let mut out = Vec::new();
		enc.finish(&mut out).unwrap();

		assert!(matches!(
			enc.write(b"late", &mut out),
			Err(Error::StreamFinished)
		));
	}
}
