//! Signing and verification, in three flavours:
//!
//! * plain signatures: `[header][signature]`, over `data || FORMAT_VERSION`;
//! * attached signatures, which carry the signed message with them:
//!   `[header][u32 message length][message][signature]`, where the signature also covers some
//!   optional "hidden" data that both sides know but isn't sent;
//! * timeout signatures, which stop verifying after an expiry time:
//!   `[header][i64 expiry, in milliseconds since the epoch][signature]`.
use super::{
	Error, KeyHash, KeyPurpose, KeySet,
	keyring::KeyRing,
	pipeline::{FORMAT_VERSION, header, parse_header},
	stream::{DummyStream, VerifyingStream},
};

const LENGTH_SIZE: usize = 4;
const EXPIRY_SIZE: usize = 8;

/// Signs with the primary key of a key set, and verifies with any of its primary or active
/// keys.
#[derive(Debug)]
pub struct Signer {
	ring: KeyRing,
}

impl Signer {
	/// Load the keys out of `keyset`.
	///
	/// # Errors
	///
	/// [`Error::InvalidKeySet`] if `keyset` isn't for signing, or any of its keys can't be read.
	#[tracing::instrument(level = "debug", skip(keyset))]
	pub fn new(keyset: impl KeySet) -> Result<Self, Error> {
		Ok(Self {
			ring: KeyRing::load(&keyset, &[KeyPurpose::SignAndVerify])?,
		})
	}

	/// Sign `data`, returning a signature to be sent alongside it.
	#[tracing::instrument(level = "debug", skip_all, fields(name = %self.ring.metadata().name))]
	pub fn sign(&self, data: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
		self.produce(&[data.as_ref()], &[])
	}

	/// Sign `message`, returning a blob containing both the message and the signature.
	///
	/// `hidden` is covered by the signature but left out of the blob; the verifier has to supply
	/// the same `hidden` data.
	#[tracing::instrument(level = "debug", skip_all, fields(name = %self.ring.metadata().name))]
	pub fn attached_sign(
		&self,
		message: impl AsRef<[u8]>,
		hidden: impl AsRef<[u8]>,
	) -> Result<Vec<u8>, Error> {
		let message = message.as_ref();
		let hidden = hidden.as_ref();

		self.produce(
			&[&len_prefix(hidden)?, hidden, message],
			&[&len_prefix(message)?, message],
		)
	}

	/// Sign `data`, such that the signature stops verifying once `expiry` (milliseconds since
	/// the Unix epoch) has passed.
	#[tracing::instrument(level = "debug", skip(self, data), fields(name = %self.ring.metadata().name))]
	pub fn timeout_sign(&self, data: impl AsRef<[u8]>, expiry: i64) -> Result<Vec<u8>, Error> {
		let expiry = expiry.to_be_bytes();

		self.produce(&[&expiry, data.as_ref()], &[&expiry])
	}

	#[tracing::instrument(level = "debug", skip_all, fields(name = %self.ring.metadata().name))]
	pub fn verify(&self, data: impl AsRef<[u8]>, signature: impl AsRef<[u8]>) -> Result<(), Error> {
		verify(&self.ring, data.as_ref(), signature.as_ref())
	}

	#[tracing::instrument(level = "debug", skip_all, fields(name = %self.ring.metadata().name))]
	pub fn attached_verify(
		&self,
		signed: impl AsRef<[u8]>,
		hidden: impl AsRef<[u8]>,
	) -> Result<Vec<u8>, Error> {
		attached_verify(&self.ring, signed.as_ref(), hidden.as_ref())
	}

	#[tracing::instrument(level = "debug", skip_all, fields(name = %self.ring.metadata().name))]
	pub fn timeout_verify(
		&self,
		data: impl AsRef<[u8]>,
		signature: impl AsRef<[u8]>,
		now: impl FnOnce() -> i64,
	) -> Result<(), Error> {
		timeout_verify(&self.ring, data.as_ref(), signature.as_ref(), now)
	}

	/// Write `[header][prefix...][signature over signed... || FORMAT_VERSION]`.
	fn produce(&self, signed: &[&[u8]], prefix: &[&[u8]]) -> Result<Vec<u8>, Error> {
		let key = self.ring.primary()?;
		let mut stream = key.signing_stream()?;

		for part in signed {
			stream.update(part)?;
		}
		stream.update(&[FORMAT_VERSION])?;
		stream.seal()?;

		let mut out = header(&key.key_hash()).to_vec();
		for part in prefix {
			out.extend_from_slice(part);
		}
		out.extend_from_slice(stream.hash_value());

		Ok(out)
	}
}

/// Verifies signatures made with any primary or active key of a key set.
///
/// Works with public key sets, so signatures can be checked by those who can't make them.
#[derive(Debug)]
pub struct Verifier {
	ring: KeyRing,
}

impl Verifier {
	/// Load the keys out of `keyset`.
	///
	/// # Errors
	///
	/// [`Error::InvalidKeySet`] if `keyset` isn't for verification, or any of its keys can't be
	/// read.
	#[tracing::instrument(level = "debug", skip(keyset))]
	pub fn new(keyset: impl KeySet) -> Result<Self, Error> {
		Ok(Self {
			ring: KeyRing::load(&keyset, &[KeyPurpose::SignAndVerify, KeyPurpose::Verify])?,
		})
	}

	/// Also accept signatures from inactive keys.
	pub fn allow_inactive(mut self, allow: bool) -> Self {
		self.ring.set_allow_inactive(allow);
		self
	}

	/// Check `signature` over `data`.
	///
	/// # Errors
	///
	/// [`Error::InvalidCryptoData`] if the signature doesn't verify, for whatever reason.
	#[tracing::instrument(level = "debug", skip_all, fields(name = %self.ring.metadata().name))]
	pub fn verify(&self, data: impl AsRef<[u8]>, signature: impl AsRef<[u8]>) -> Result<(), Error> {
		verify(&self.ring, data.as_ref(), signature.as_ref())
	}

	/// Check an attached signature, and return the message it carries.
	#[tracing::instrument(level = "debug", skip_all, fields(name = %self.ring.metadata().name))]
	pub fn attached_verify(
		&self,
		signed: impl AsRef<[u8]>,
		hidden: impl AsRef<[u8]>,
	) -> Result<Vec<u8>, Error> {
		attached_verify(&self.ring, signed.as_ref(), hidden.as_ref())
	}

	/// Check a timeout signature, using `now` (milliseconds since the Unix epoch) as the
	/// current time.
	#[tracing::instrument(level = "debug", skip_all, fields(name = %self.ring.metadata().name))]
	pub fn timeout_verify(
		&self,
		data: impl AsRef<[u8]>,
		signature: impl AsRef<[u8]>,
		now: impl FnOnce() -> i64,
	) -> Result<(), Error> {
		timeout_verify(&self.ring, data.as_ref(), signature.as_ref(), now)
	}
}

/// The message inside an attached signature, *without* checking the signature.
pub fn attached_data(signed: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
	let (_, _, body) = parse_header(signed.as_ref())?;
	let (message, _) = split_attached(body)?;

	Ok(message.to_vec())
}

fn len_prefix(b: &[u8]) -> Result<[u8; LENGTH_SIZE], Error> {
	u32::try_from(b.len())
		.map(u32::to_be_bytes)
		.map_err(|_| Error::malformed("signed data longer than 4GiB"))
}

fn split_attached(body: &[u8]) -> Result<(&[u8], &[u8]), Error> {
	let Some((len, rest)) = body.split_first_chunk::<LENGTH_SIZE>() else {
		return Err(Error::InvalidCryptoData);
	};
	let len = u32::from_be_bytes(*len) as usize;

	if rest.len() < len {
		tracing::debug!(len, available = rest.len(), "attached message overruns signature");
		return Err(Error::InvalidCryptoData);
	}

	Ok(rest.split_at(len))
}

fn verify(ring: &KeyRing, data: &[u8], signature: &[u8]) -> Result<(), Error> {
	let (key_hash, _, sig) = parse_header(signature)?;

	check(ring, &key_hash, &[data], sig)
}

fn attached_verify(ring: &KeyRing, signed: &[u8], hidden: &[u8]) -> Result<Vec<u8>, Error> {
	let (key_hash, _, body) = parse_header(signed)?;
	let (message, sig) = split_attached(body)?;

	check(
		ring,
		&key_hash,
		&[&len_prefix(hidden)?, hidden, message],
		sig,
	)?;

	Ok(message.to_vec())
}

fn timeout_verify(
	ring: &KeyRing,
	data: &[u8],
	signature: &[u8],
	now: impl FnOnce() -> i64,
) -> Result<(), Error> {
	let (key_hash, _, body) = parse_header(signature)?;
	let Some((expiry, sig)) = body.split_first_chunk::<EXPIRY_SIZE>() else {
		return Err(Error::InvalidCryptoData);
	};

	let current = now();
	if i64::from_be_bytes(*expiry) < current {
		tracing::debug!(
			expiry = i64::from_be_bytes(*expiry),
			current,
			"Signature has expired"
		);
		return Err(Error::InvalidCryptoData);
	}

	check(ring, &key_hash, &[expiry, data], sig)
}

/// Check `sig` over `signed || FORMAT_VERSION` against every candidate key for `key_hash`.
///
/// With no candidates the data still goes through a decoy MAC, so an unknown key can't be told
/// apart from a bad signature.
fn check(ring: &KeyRing, key_hash: &KeyHash, signed: &[&[u8]], sig: &[u8]) -> Result<(), Error> {
	let candidates = ring.candidates(key_hash);

	if candidates.is_empty() {
		tracing::debug!(%key_hash, "No key matches signature");
		let mut decoy = DummyStream::new();
		feed(&mut decoy, signed)?;
		decoy.verify_signature(sig)?;

		return Err(Error::InvalidCryptoData);
	}

	for key in candidates {
		let mut stream = key.verifying_stream()?;
		feed(stream.as_mut(), signed)?;

		if stream.verify_signature(sig)? {
			return Ok(());
		}
		tracing::debug!(%key_hash, "Candidate key did not verify");
	}

	Err(Error::InvalidCryptoData)
}

fn feed(stream: &mut dyn VerifyingStream, signed: &[&[u8]]) -> Result<(), Error> {
	for part in signed {
		stream.update(part)?;
	}
	stream.update(&[FORMAT_VERSION])
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{HEADER_SIZE, Key, KeyStatus, KeyType, MemoryKeySet, test_util::init};
	use std::sync::OnceLock;
	use zeroize::Zeroizing;

	const DATA: &[u8] = b"This is some test data";

	// DSA parameter generation is slow, so the tests share one key
	fn dsa_key() -> Key {
		static DSA: OnceLock<Zeroizing<Vec<u8>>> = OnceLock::new();

		let mut b = DSA
			.get_or_init(|| {
				Key::generate(KeyType::DsaPrivate, 0)
					.unwrap()
					.to_bytes()
					.unwrap()
			})
			.to_vec();
		Key::read(KeyType::DsaPrivate, &mut b).unwrap()
	}

	fn keyset(key_type: KeyType, size: usize) -> MemoryKeySet {
		let mut ks = MemoryKeySet::new("sign", KeyPurpose::SignAndVerify, key_type).unwrap();
		if key_type == KeyType::DsaPrivate {
			ks.add_key(&dsa_key(), KeyStatus::Primary).unwrap();
		} else {
			ks.generate_key(KeyStatus::Primary, size).unwrap();
		}
		ks
	}

	fn signers() -> Vec<(KeyType, Signer)> {
		[
			(KeyType::HmacSha1, 0),
			(KeyType::RsaPrivate, 1024),
			(KeyType::DsaPrivate, 0),
		]
		.into_iter()
		.map(|(t, size)| (t, Signer::new(keyset(t, size)).unwrap()))
		.collect()
	}

	fn assert_invalid<T: std::fmt::Debug>(r: Result<T, Error>) {
		assert!(matches!(r, Err(Error::InvalidCryptoData)), "{r:?}");
	}

	#[test]
	fn sign_and_verify() {
		init();

		for (key_type, signer) in signers() {
			let sig = signer.sign(DATA).unwrap();

			signer.verify(DATA, &sig).unwrap();
			assert_invalid(signer.verify(b"This is some test dat", &sig));

			let mut forged = sig.clone();
			let last = forged.len() - 1;
			forged[last] ^= 1;
			assert_invalid(signer.verify(DATA, &forged));

			if key_type == KeyType::HmacSha1 {
				assert_eq!(HEADER_SIZE + 20, sig.len());
			}
		}
	}

	#[test]
	fn rsa_signature_is_one_modulus_long() {
		init();
		let signer = Signer::new(keyset(KeyType::RsaPrivate, 1024)).unwrap();

		assert_eq!(HEADER_SIZE + 128, signer.sign(DATA).unwrap().len());
	}

	#[test]
	fn public_keys_verify() {
		init();

		for private in [Key::generate(KeyType::RsaPrivate, 1024).unwrap(), dsa_key()] {
			let key_type = private.key_type();
			let public = private.public_key().unwrap();

			let mut privset = MemoryKeySet::new("priv", KeyPurpose::SignAndVerify, key_type).unwrap();
			privset.add_key(&private, KeyStatus::Primary).unwrap();
			let mut pubset = MemoryKeySet::new("pub", KeyPurpose::Verify, public.key_type()).unwrap();
			pubset.add_key(&public, KeyStatus::Primary).unwrap();

			let sig = Signer::new(&privset).unwrap().sign(DATA).unwrap();

			Verifier::new(&pubset).unwrap().verify(DATA, &sig).unwrap();
		}
	}

	#[test]
	fn unknown_key_fails_like_a_bad_signature() {
		init();
		let sig = Signer::new(keyset(KeyType::HmacSha1, 0))
			.unwrap()
			.sign(DATA)
			.unwrap();
		let other = Verifier::new(keyset(KeyType::HmacSha1, 0)).unwrap();

		assert_invalid(other.verify(DATA, &sig));
		assert_invalid(other.verify(DATA, &sig[..3]));
	}

	#[test]
	fn attached() {
		init();

		for (_, signer) in signers() {
			let signed = signer.attached_sign(DATA, b"").unwrap();

			assert_eq!(DATA, signer.attached_verify(&signed, b"").unwrap());
			assert_eq!(DATA, attached_data(&signed).unwrap());
			assert_eq!(DATA, &signed[HEADER_SIZE + 4..HEADER_SIZE + 4 + DATA.len()]);
		}
	}

	#[test]
	fn attached_hidden_data_must_match() {
		init();
		let signer = Signer::new(keyset(KeyType::HmacSha1, 0)).unwrap();
		let signed = signer.attached_sign(DATA, b"nonce").unwrap();

		assert_eq!(DATA, signer.attached_verify(&signed, b"nonce").unwrap());
		assert_invalid(signer.attached_verify(&signed, b"other"));
		assert_invalid(signer.attached_verify(&signed, b""));
	}

	#[test]
	fn attached_message_cannot_be_swapped() {
		init();
		let signer = Signer::new(keyset(KeyType::HmacSha1, 0)).unwrap();
		let mut signed = signer.attached_sign(DATA, b"").unwrap();
		signed[HEADER_SIZE + 4] ^= 0x20;

		assert_invalid(signer.attached_verify(&signed, b""));
	}

	#[test]
	fn attached_length_overrun() {
		init();
		let signer = Signer::new(keyset(KeyType::HmacSha1, 0)).unwrap();
		let mut signed = signer.attached_sign(DATA, b"").unwrap();
		signed[HEADER_SIZE] = 0xff;

		assert_invalid(signer.attached_verify(&signed, b""));
		assert_invalid(attached_data(&signed));
	}

	#[test]
	fn timeout() {
		init();
		let expiry = 1_700_000_000_000;

		for (_, signer) in signers() {
			let sig = signer.timeout_sign(DATA, expiry).unwrap();

			signer.timeout_verify(DATA, &sig, || expiry - 1).unwrap();
			signer.timeout_verify(DATA, &sig, || expiry).unwrap();
			assert_invalid(signer.timeout_verify(DATA, &sig, || expiry + 1));
			assert_invalid(signer.timeout_verify(b"other", &sig, || expiry - 1));
		}
	}

	#[test]
	fn timeout_expiry_cannot_be_extended() {
		init();
		let signer = Signer::new(keyset(KeyType::HmacSha1, 0)).unwrap();
		let mut sig = signer.timeout_sign(DATA, 1000).unwrap();
		sig[HEADER_SIZE] = 0x7f;

		assert_invalid(signer.timeout_verify(DATA, &sig, || 2000));
	}

	#[test]
	fn rotation() {
		init();
		let mut ks = keyset(KeyType::HmacSha1, 0);
		let old = Signer::new(&ks).unwrap().sign(DATA).unwrap();

		ks.generate_key(KeyStatus::Primary, 0).unwrap();
		let signer = Signer::new(&ks).unwrap();
		let new = signer.sign(DATA).unwrap();

		assert_ne!(old[..HEADER_SIZE], new[..HEADER_SIZE]);
		signer.verify(DATA, &old).unwrap();

		ks.set_status(1, KeyStatus::Inactive).unwrap();
		assert_invalid(Verifier::new(&ks).unwrap().verify(DATA, &old));
		Verifier::new(&ks)
			.unwrap()
			.allow_inactive(true)
			.verify(DATA, &old)
			.unwrap();
	}

	#[test]
	fn verify_only_key_sets_cannot_sign() {
		init();
		let private = dsa_key();
		let mut pubset = MemoryKeySet::new("pub", KeyPurpose::Verify, KeyType::DsaPublic).unwrap();
		pubset
			.add_key(&private.public_key().unwrap(), KeyStatus::Primary)
			.unwrap();

		assert!(matches!(Signer::new(&pubset), Err(Error::InvalidKeySet(_))));
	}
}
