use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{Error, Key, key};

/// The kinds of key this crate knows how to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyType {
	#[serde(rename = "AES")]
	Aes,
	#[serde(rename = "HMAC_SHA1")]
	HmacSha1,
	#[serde(rename = "DSA_PRIV")]
	DsaPrivate,
	#[serde(rename = "DSA_PUB")]
	DsaPublic,
	#[serde(rename = "RSA_PRIV")]
	RsaPrivate,
	#[serde(rename = "RSA_PUB")]
	RsaPublic,
	/// AES-GCM.  Not part of the original set of key types, so other implementations may not
	/// read these artifacts.
	#[serde(rename = "AES_AEAD")]
	AesAead,
}

/// What a key set may be used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPurpose {
	#[serde(rename = "ENCRYPT")]
	Encrypt,
	#[serde(rename = "DECRYPT_AND_ENCRYPT")]
	DecryptAndEncrypt,
	#[serde(rename = "SIGN_AND_VERIFY")]
	SignAndVerify,
	#[serde(rename = "VERIFY")]
	Verify,
}

/// How long the tag/signature a key produces is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputSize {
	Fixed(usize),
	/// One modulus worth of bytes, as with RSA.
	KeySize,
}

/// Static description of a [`KeyType`].
#[derive(Debug)]
pub struct KeyTypeInfo {
	pub tag: &'static str,
	/// Valid key sizes, in bits.  The first entry is the default.
	pub sizes: &'static [usize],
	pub output_size: OutputSize,
	pub purposes: &'static [KeyPurpose],
	pub(crate) generate: fn(usize) -> Result<Key, Error>,
	pub(crate) read: fn(&[u8]) -> Result<Key, Error>,
}

use KeyPurpose::{DecryptAndEncrypt, Encrypt, SignAndVerify, Verify};

static AES: KeyTypeInfo = KeyTypeInfo {
	tag: "AES",
	sizes: &[128, 192, 256],
	output_size: OutputSize::Fixed(key::hmac::TAG_SIZE),
	purposes: &[DecryptAndEncrypt],
	generate: key::aes::generate,
	read: key::aes::read,
};

static HMAC_SHA1: KeyTypeInfo = KeyTypeInfo {
	tag: "HMAC_SHA1",
	sizes: &[256],
	output_size: OutputSize::Fixed(key::hmac::TAG_SIZE),
	purposes: &[SignAndVerify],
	generate: key::hmac::generate,
	read: key::hmac::read,
};

static DSA_PRIV: KeyTypeInfo = KeyTypeInfo {
	tag: "DSA_PRIV",
	sizes: &[1024],
	output_size: OutputSize::Fixed(key::dsa::SIGNATURE_SIZE),
	purposes: &[SignAndVerify],
	generate: key::dsa::generate,
	read: key::dsa::read_private,
};

static DSA_PUB: KeyTypeInfo = KeyTypeInfo {
	tag: "DSA_PUB",
	sizes: &[1024],
	output_size: OutputSize::Fixed(key::dsa::SIGNATURE_SIZE),
	purposes: &[Verify],
	generate: key::cannot_generate_public,
	read: key::dsa::read_public,
};

static RSA_PRIV: KeyTypeInfo = KeyTypeInfo {
	tag: "RSA_PRIV",
	sizes: &[2048, 4096, 1024],
	output_size: OutputSize::KeySize,
	purposes: &[DecryptAndEncrypt, SignAndVerify],
	generate: key::rsa::generate,
	read: key::rsa::read_private,
};

static RSA_PUB: KeyTypeInfo = KeyTypeInfo {
	tag: "RSA_PUB",
	sizes: &[2048, 4096, 1024],
	output_size: OutputSize::KeySize,
	purposes: &[Encrypt, Verify],
	generate: key::cannot_generate_public,
	read: key::rsa::read_public,
};

static AES_AEAD: KeyTypeInfo = KeyTypeInfo {
	tag: "AES_AEAD",
	sizes: &[256, 192, 128],
	output_size: OutputSize::Fixed(key::aead::TAG_SIZE),
	purposes: &[DecryptAndEncrypt],
	generate: key::aead::generate,
	read: key::aead::read,
};

impl KeyType {
	/// Every supported key type.
	pub const ALL: [KeyType; 7] = [
		KeyType::Aes,
		KeyType::HmacSha1,
		KeyType::DsaPrivate,
		KeyType::DsaPublic,
		KeyType::RsaPrivate,
		KeyType::RsaPublic,
		KeyType::AesAead,
	];

	pub fn info(self) -> &'static KeyTypeInfo {
		match self {
			KeyType::Aes => &AES,
			KeyType::HmacSha1 => &HMAC_SHA1,
			KeyType::DsaPrivate => &DSA_PRIV,
			KeyType::DsaPublic => &DSA_PUB,
			KeyType::RsaPrivate => &RSA_PRIV,
			KeyType::RsaPublic => &RSA_PUB,
			KeyType::AesAead => &AES_AEAD,
		}
	}

	pub fn tag(self) -> &'static str {
		self.info().tag
	}

	pub fn default_size(self) -> usize {
		self.info().sizes[0]
	}

	pub fn is_acceptable_size(self, size: usize) -> bool {
		self.info().sizes.contains(&size)
	}

	/// The length of the tag or signature produced by a key of this type and size, in bytes.
	pub fn output_size(self, size: usize) -> usize {
		match self.info().output_size {
			OutputSize::Fixed(n) => n,
			OutputSize::KeySize => size / 8,
		}
	}

	pub fn supports(self, purpose: KeyPurpose) -> bool {
		self.info().purposes.contains(&purpose)
	}
}

impl fmt::Display for KeyType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.tag())
	}
}

impl FromStr for KeyType {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Error> {
		KeyType::ALL
			.into_iter()
			.find(|t| t.tag() == s)
			.ok_or_else(|| Error::invalid_key_set(format!("unknown key type {s:?}")))
	}
}

impl KeyPurpose {
	pub fn tag(self) -> &'static str {
		match self {
			KeyPurpose::Encrypt => "ENCRYPT",
			KeyPurpose::DecryptAndEncrypt => "DECRYPT_AND_ENCRYPT",
			KeyPurpose::SignAndVerify => "SIGN_AND_VERIFY",
			KeyPurpose::Verify => "VERIFY",
		}
	}
}

impl fmt::Display for KeyPurpose {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.tag())
	}
}

impl FromStr for KeyPurpose {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Error> {
		[Encrypt, DecryptAndEncrypt, SignAndVerify, Verify]
			.into_iter()
			.find(|p| p.tag() == s)
			.ok_or_else(|| Error::invalid_key_set(format!("unknown key purpose {s:?}")))
	}
}
