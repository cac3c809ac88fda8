//! Key data encrypted under a password.
//!
//! A key is derived from the password with PBKDF2, and the key data is encrypted with AES-CBC in
//! ciphertext-only mode; the salt and IV travel in the envelope rather than the ciphertext.
//! There's no MAC in the envelope, so a wrong password shows up either as bad padding or, once
//! in a while, as garbage that fails to parse as a key.
use parking_lot::Mutex;
use secrecy::{ExposeSecret as _, SecretString};
use std::{fmt, str::FromStr};
use zeroize::Zeroizing;

use super::{
	Error, KeyMetadata, KeySet, cbor,
	key::random_bytes,
	stream::{BLOCK_SIZE, FinishingStream as _, SymmetricStream},
};

/// Iteration count used when the caller doesn't have an opinion.
pub const DEFAULT_ITERATION_COUNT: u32 = 4096;

const SALT_SIZE: usize = 16;

/// The cipher key data is encrypted with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PbeCipherType {
	Aes128,
}

/// The PRF PBKDF2 uses to turn the password into a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PbeHashType {
	HmacSha1,
	HmacSha256,
}

impl PbeCipherType {
	pub fn tag(self) -> &'static str {
		match self {
			PbeCipherType::Aes128 => "AES128",
		}
	}

	fn key_size(self) -> usize {
		match self {
			PbeCipherType::Aes128 => 16,
		}
	}
}

impl PbeHashType {
	pub fn tag(self) -> &'static str {
		match self {
			PbeHashType::HmacSha1 => "HMAC_SHA1",
			PbeHashType::HmacSha256 => "HMAC_SHA256",
		}
	}

	fn derive(self, password: &[u8], salt: &[u8], rounds: u32, out: &mut [u8]) {
		match self {
			PbeHashType::HmacSha1 => pbkdf2::pbkdf2_hmac::<sha1::Sha1>(password, salt, rounds, out),
			PbeHashType::HmacSha256 => {
				pbkdf2::pbkdf2_hmac::<sha2::Sha256>(password, salt, rounds, out)
			}
		}
	}
}

impl fmt::Display for PbeCipherType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.tag())
	}
}

impl fmt::Display for PbeHashType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.tag())
	}
}

impl FromStr for PbeCipherType {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Error> {
		match s {
			"AES128" => Ok(PbeCipherType::Aes128),
			_ => Err(Error::invalid_key_set(format!("unknown PBE cipher {s:?}"))),
		}
	}
}

impl FromStr for PbeHashType {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Error> {
		[PbeHashType::HmacSha1, PbeHashType::HmacSha256]
			.into_iter()
			.find(|h| h.tag() == s)
			.ok_or_else(|| Error::invalid_key_set(format!("unknown PBE hmac {s:?}")))
	}
}

/// A password-encrypted key, along with everything (bar the password) needed to decrypt it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PbeKeyStore {
	pub cipher: PbeCipherType,
	pub hmac: PbeHashType,
	pub iteration_count: u32,
	pub salt: Vec<u8>,
	pub iv: [u8; BLOCK_SIZE],
	pub key: Vec<u8>,
}

impl PbeKeyStore {
	/// Encrypt `key_data` under `password`, with a fresh salt and IV.
	///
	/// # Errors
	///
	/// [`Error::InvalidKeySet`] if `iteration_count` is zero.
	#[tracing::instrument(level = "debug", skip(key_data, password))]
	pub fn encrypt_key_data(
		key_data: &[u8],
		password: &SecretString,
		iteration_count: u32,
	) -> Result<Self, Error> {
		Self::encrypt_key_data_with(
			key_data,
			password,
			iteration_count,
			PbeCipherType::Aes128,
			PbeHashType::HmacSha1,
		)
	}

	/// As [`PbeKeyStore::encrypt_key_data`], picking the cipher and PRF.
	pub fn encrypt_key_data_with(
		key_data: &[u8],
		password: &SecretString,
		iteration_count: u32,
		cipher: PbeCipherType,
		hmac: PbeHashType,
	) -> Result<Self, Error> {
		if iteration_count == 0 {
			return Err(Error::invalid_key_set("PBE iteration count must be positive"));
		}

		let salt = random_bytes(SALT_SIZE).to_vec();
		let mut iv = [0u8; BLOCK_SIZE];
		iv.copy_from_slice(&random_bytes(BLOCK_SIZE));

		let derived = derive(cipher, hmac, password, &salt, iteration_count);
		let mut stream = SymmetricStream::encryptor(&derived, Some(iv), true)?;
		let mut key = Vec::new();
		stream.write(key_data, &mut key)?;
		stream.finish(&mut key)?;

		Ok(Self {
			cipher,
			hmac,
			iteration_count,
			salt,
			iv,
			key,
		})
	}

	/// Recover the key data with `password`.
	///
	/// # Errors
	///
	/// [`Error::InvalidCryptoData`] if the password is (detectably) wrong.
	#[tracing::instrument(level = "debug", skip_all, fields(cipher = %self.cipher, hmac = %self.hmac))]
	pub fn decrypt_key_data(&self, password: &SecretString) -> Result<Zeroizing<Vec<u8>>, Error> {
		let derived = derive(
			self.cipher,
			self.hmac,
			password,
			&self.salt,
			self.iteration_count,
		);

		let mut stream = SymmetricStream::decryptor(&derived, Some(self.iv))?;
		let mut out = Zeroizing::new(Vec::new());
		stream.write(&self.key, &mut out)?;
		stream.finish(&mut out)?;

		Ok(out)
	}

	/// Encode as `[cipher, hmac, iterationCount, salt, iv, key]`.
	pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
		let mut v = Vec::new();
		let mut enc = ciborium_ll::Encoder::from(&mut v);

		cbor::write_array(&mut enc, "PBE key store", 6)?;
		cbor::write_text(&mut enc, "PBE cipher", self.cipher.tag())?;
		cbor::write_text(&mut enc, "PBE hmac", self.hmac.tag())?;
		cbor::write_u64(&mut enc, "PBE iteration count", self.iteration_count.into())?;
		cbor::write_bytes(&mut enc, "PBE salt", &self.salt)?;
		cbor::write_bytes(&mut enc, "PBE IV", &self.iv)?;
		cbor::write_bytes(&mut enc, "PBE key", &self.key)?;

		Ok(v)
	}

	/// Decode the output of [`PbeKeyStore::to_bytes`].
	///
	/// # Errors
	///
	/// [`Error::InvalidKeySet`] if the cipher or hmac isn't one we know, otherwise
	/// [`Error::Decoding`] or [`Error::Malformed`] for anything else wrong with the encoding.
	pub fn from_bytes(b: &[u8]) -> Result<Self, Error> {
		let mut dec = ciborium_ll::Decoder::from(b);

		cbor::read_array(&mut dec, "PBE key store", 6)?;
		let cipher: PbeCipherType = cbor::read_text(&mut dec, "PBE cipher")?.parse()?;
		let hmac: PbeHashType = cbor::read_text(&mut dec, "PBE hmac")?.parse()?;
		let iteration_count = u32::try_from(cbor::read_u64(&mut dec, "PBE iteration count")?)
			.map_err(|_| Error::malformed("PBE iteration count out of range"))?;
		let salt = cbor::read_bytes(&mut dec, "PBE salt")?.to_vec();
		let iv: [u8; BLOCK_SIZE] = cbor::read_bytes(&mut dec, "PBE IV")?
			.as_slice()
			.try_into()
			.map_err(|_| Error::malformed("PBE IV is not one block long"))?;
		let key = cbor::read_bytes(&mut dec, "PBE key")?.to_vec();

		if iteration_count == 0 {
			return Err(Error::invalid_key_set("PBE iteration count must be positive"));
		}

		Ok(Self {
			cipher,
			hmac,
			iteration_count,
			salt,
			iv,
			key,
		})
	}
}

fn derive(
	cipher: PbeCipherType,
	hmac: PbeHashType,
	password: &SecretString,
	salt: &[u8],
	rounds: u32,
) -> Zeroizing<Vec<u8>> {
	let mut key = Zeroizing::new(vec![0u8; cipher.key_size()]);
	hmac.derive(password.expose_secret().as_bytes(), salt, rounds, &mut key);
	key
}

type Prompt = Box<dyn Fn() -> SecretString + Send + Sync>;

/// A key set whose key data is stored as [`PbeKeyStore`]s, and is decrypted on the way out.
///
/// The password is asked for the first time it's needed, and remembered until the key set is
/// dropped.
pub struct PbeKeySet<K> {
	inner: K,
	prompt: Prompt,
	password: Mutex<Option<SecretString>>,
}

impl<K> fmt::Debug for PbeKeySet<K> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PbeKeySet").finish_non_exhaustive()
	}
}

impl<K: KeySet> PbeKeySet<K> {
	/// Wrap `inner`, getting the password from `prompt` when it's first needed.
	pub fn new(inner: K, prompt: impl Fn() -> SecretString + Send + Sync + 'static) -> Self {
		Self {
			inner,
			prompt: Box::new(prompt),
			password: Mutex::new(None),
		}
	}
}

impl<K: KeySet> KeySet for PbeKeySet<K> {
	fn metadata(&self) -> Result<KeyMetadata, Error> {
		let mut metadata = self.inner.metadata()?;
		metadata.encrypted = false;

		Ok(metadata)
	}

	#[tracing::instrument(level = "trace", skip(self))]
	fn key_data(&self, version: u32) -> Result<Zeroizing<Vec<u8>>, Error> {
		let data = self.inner.key_data(version)?;
		if !self.inner.metadata()?.encrypted {
			return Ok(data);
		}

		let store = PbeKeyStore::from_bytes(&data)?;
		let mut password = self.password.lock();
		let password = password.get_or_insert_with(|| (self.prompt)());

		store.decrypt_key_data(password)
	}
}
