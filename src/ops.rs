use std::io::{Read, Write};

use super::Error;

/// Anything that can produce ciphertexts.
pub trait Encrypt {
	/// Encrypt `plaintext` with the primary key.
	///
	/// # Errors
	///
	/// [`Error::MissingPrimaryKey`] if there is no key to encrypt with, or
	/// [`Error::Malformed`] if the plaintext is too long for the key (only possible with
	/// RSA).
	fn encrypt(&self, plaintext: impl AsRef<[u8]>) -> Result<Vec<u8>, Error>;

	/// Encrypt everything `reader` produces, writing the ciphertext to `writer` as it's made.
	///
	/// Hands `writer` back once the ciphertext is complete.
	fn encrypt_stream<W: Write>(&self, reader: impl Read, writer: W) -> Result<W, Error>;
}

/// Anything that can open ciphertexts.
pub trait Decrypt {
	/// Decrypt and authenticate a ciphertext made by any usable key.
	///
	/// # Errors
	///
	/// [`Error::InvalidCryptoData`] for anything that isn't a ciphertext we can open, whether
	/// that's because it was tampered with, truncated, or made with a key we don't have.  No
	/// further detail is given, on purpose.
	fn decrypt(&self, ciphertext: impl AsRef<[u8]>) -> Result<Vec<u8>, Error>;

	/// Decrypt everything `reader` produces into `writer`.
	///
	/// Nothing is written until the whole ciphertext has been authenticated.
	fn decrypt_stream<W: Write>(&self, mut reader: impl Read, mut writer: W) -> Result<W, Error> {
		let mut ciphertext = Vec::new();
		reader.read_to_end(&mut ciphertext)?;

		let plaintext = zeroize::Zeroizing::new(self.decrypt(ciphertext)?);
		writer.write_all(&plaintext)?;
		writer.flush()?;

		Ok(writer)
	}
}
