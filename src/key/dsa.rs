use dsa::{BigUint, Components, KeySize, SigningKey, VerifyingKey};
use rsa::rand_core::OsRng;
use zeroize::Zeroizing;

use super::{Error, Key, KeyHash, Material};
use crate::{
	cbor,
	key_hash::strip_leading_zeros,
	stream::{DigestStream, SignKey, VerifyKey},
};

/// Upper bound on a DER-encoded signature with a 160-bit `q`.
pub(crate) const SIGNATURE_SIZE: usize = 48;

#[derive(Clone)]
pub(crate) struct DsaPubKey {
	key: VerifyingKey,
}

impl DsaPubKey {
	pub(crate) fn size(&self) -> usize {
		self.key.components().p().bits()
	}

	pub(crate) fn hash(&self) -> KeyHash {
		let [p, q, g, y] = self.parts();

		KeyHash::of_length_prefixed([
			strip_leading_zeros(&p),
			strip_leading_zeros(&q),
			strip_leading_zeros(&g),
			strip_leading_zeros(&y),
		])
	}

	fn parts(&self) -> [Vec<u8>; 4] {
		let c = self.key.components();

		[
			c.p().to_bytes_be(),
			c.q().to_bytes_be(),
			c.g().to_bytes_be(),
			self.key.y().to_bytes_be(),
		]
	}

	pub(crate) fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, Error> {
		let [p, q, g, y] = self.parts();

		cbor::encode_byte_strings("DSA public key", &[&p, &q, &g, &y])
	}

	pub(crate) fn verifying_stream(&self) -> DigestStream<'_> {
		DigestStream::verifying(VerifyKey::Dsa(&self.key), SIGNATURE_SIZE)
	}
}

pub(crate) struct DsaPrivKey {
	key: SigningKey,
	pub(crate) public: DsaPubKey,
}

impl DsaPrivKey {
	fn new(key: SigningKey) -> Self {
		Self {
			public: DsaPubKey {
				key: key.verifying_key().clone(),
			},
			key,
		}
	}

	pub(crate) fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>, Error> {
		let [p, q, g, y] = self.public.parts();
		let x = Zeroizing::new(self.key.x().to_bytes_be());

		cbor::encode_byte_strings("DSA private key", &[&p, &q, &g, &y, &x])
	}

	pub(crate) fn signing_stream(&self) -> DigestStream<'_> {
		DigestStream::signing(
			SignKey::Dsa(&self.key),
			VerifyKey::Dsa(&self.public.key),
			SIGNATURE_SIZE,
		)
	}
}

#[allow(deprecated)] // 1024-bit DSA is all the format has ever defined
#[tracing::instrument(level = "trace")]
pub(crate) fn generate(_size: usize) -> Result<Key, Error> {
	let components = Components::generate(&mut OsRng, KeySize::DSA_1024_160);
	let key = SigningKey::generate(&mut OsRng, components);

	Ok(Key::new(Material::DsaPrivate(DsaPrivKey::new(key))))
}

fn verifying_key(parts: &[Zeroizing<Vec<u8>>]) -> Result<VerifyingKey, Error> {
	let [p, q, g, y] = [0, 1, 2, 3].map(|i| BigUint::from_bytes_be(&parts[i]));

	let components = Components::from_components(p, q, g)
		.map_err(|e| Error::invalid_key(format!("bad DSA parameters: {e}")))?;

	VerifyingKey::from_components(components, y)
		.map_err(|e| Error::invalid_key(format!("bad DSA public key: {e}")))
}

pub(crate) fn read_private(b: &[u8]) -> Result<Key, Error> {
	let parts = cbor::decode_byte_strings("DSA private key", b, 5)?;
	let public = verifying_key(&parts[..4])?;

	let key = SigningKey::from_components(public, BigUint::from_bytes_be(&parts[4]))
		.map_err(|e| Error::invalid_key(format!("bad DSA private key: {e}")))?;

	Ok(Key::new(Material::DsaPrivate(DsaPrivKey::new(key))))
}

pub(crate) fn read_public(b: &[u8]) -> Result<Key, Error> {
	let parts = cbor::decode_byte_strings("DSA public key", b, 4)?;

	Ok(Key::new(Material::DsaPublic(DsaPubKey {
		key: verifying_key(&parts)?,
	})))
}
