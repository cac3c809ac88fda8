use rsa::{
	BigUint, RsaPrivateKey, RsaPublicKey,
	rand_core::OsRng,
	traits::{PrivateKeyParts as _, PublicKeyParts as _},
};
use zeroize::Zeroizing;

use super::{Error, Key, KeyHash, Material};
use crate::{
	cbor,
	key_hash::strip_leading_zeros,
	stream::{AsymmetricStream, DigestStream, RsaKey, SignKey, Streams, VerifyKey},
};

#[derive(Clone)]
pub(crate) struct RsaPubKey {
	key: RsaPublicKey,
}

impl RsaPubKey {
	pub(crate) fn size(&self) -> usize {
		self.key.size() * 8
	}

	pub(crate) fn hash(&self) -> KeyHash {
		let n = self.key.n().to_bytes_be();
		let e = self.key.e().to_bytes_be();

		KeyHash::of_length_prefixed([strip_leading_zeros(&n), strip_leading_zeros(&e)])
	}

	pub(crate) fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, Error> {
		cbor::encode_byte_strings(
			"RSA public key",
			&[&self.key.n().to_bytes_be(), &self.key.e().to_bytes_be()],
		)
	}

	pub(crate) fn encrypting_streams(&self) -> Streams<'_> {
		Streams::cipher_only(AsymmetricStream::new(RsaKey::Encrypt(&self.key)))
	}

	pub(crate) fn verifying_stream(&self) -> DigestStream<'_> {
		DigestStream::verifying(VerifyKey::Rsa(&self.key), self.key.size())
	}
}

pub(crate) struct RsaPrivKey {
	key: RsaPrivateKey,
	pub(crate) public: RsaPubKey,
}

impl RsaPrivKey {
	fn new(key: RsaPrivateKey) -> Self {
		Self {
			public: RsaPubKey {
				key: key.to_public_key(),
			},
			key,
		}
	}

	pub(crate) fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, Error> {
		let primes = self.key.primes();
		if primes.len() != 2 {
			return Err(Error::invalid_key("only two-prime RSA keys are supported"));
		}

		let n = self.key.n().to_bytes_be();
		let e = self.key.e().to_bytes_be();
		let d = Zeroizing::new(self.key.d().to_bytes_be());
		let p = Zeroizing::new(primes[0].to_bytes_be());
		let q = Zeroizing::new(primes[1].to_bytes_be());

		cbor::encode_byte_strings("RSA private key", &[&n, &e, &d, &p, &q])
	}

	pub(crate) fn decrypting_streams(&self) -> Streams<'_> {
		Streams::cipher_only(AsymmetricStream::new(RsaKey::Decrypt(&self.key)))
	}

	pub(crate) fn signing_stream(&self) -> DigestStream<'_> {
		DigestStream::signing(
			SignKey::Rsa(&self.key),
			VerifyKey::Rsa(&self.public.key),
			self.key.size(),
		)
	}
}

#[tracing::instrument(level = "trace")]
pub(crate) fn generate(size: usize) -> Result<Key, Error> {
	let key = RsaPrivateKey::new(&mut OsRng, size)
		.map_err(|e| Error::invalid_key(format!("RSA key generation failed: {e}")))?;

	Ok(Key::new(Material::RsaPrivate(RsaPrivKey::new(key))))
}

pub(crate) fn read_private(b: &[u8]) -> Result<Key, Error> {
	let parts = cbor::decode_byte_strings("RSA private key", b, 5)?;
	let [n, e, d, p, q] = [0, 1, 2, 3, 4].map(|i| BigUint::from_bytes_be(&parts[i]));

	let key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
		.map_err(|e| Error::invalid_key(format!("bad RSA private key: {e}")))?;

	Ok(Key::new(Material::RsaPrivate(RsaPrivKey::new(key))))
}

pub(crate) fn read_public(b: &[u8]) -> Result<Key, Error> {
	let parts = cbor::decode_byte_strings("RSA public key", b, 2)?;

	let key = RsaPublicKey::new(
		BigUint::from_bytes_be(&parts[0]),
		BigUint::from_bytes_be(&parts[1]),
	)
	.map_err(|e| Error::invalid_key(format!("bad RSA public key: {e}")))?;

	Ok(Key::new(Material::RsaPublic(RsaPubKey { key })))
}
