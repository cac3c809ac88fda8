//! Hybrid ("envelope") encryption.
//!
//! The originator makes up a fresh symmetric key, packs it, and encrypts the packed key to the
//! recipient's public key; that ciphertext is the *session material*.  Whoever holds the
//! matching private key can accept the material and recover the symmetric key.  From then on,
//! both sides encrypt and decrypt with the symmetric key alone.
use std::{
	fmt,
	io::{Read, Write},
	sync::Arc,
};
use zeroize::Zeroizing;

use super::{
	Crypter, Decrypt, Encrypt, Error, Key, KeyType, Signer, Verifier, cbor,
	key::{Material, aes::AesKey},
	pipeline,
};

/// Serialises a symmetric key for transport inside session material.
pub trait KeyPacker: Send + Sync + fmt::Debug {
	fn pack(&self, key: &Key) -> Result<Zeroizing<Vec<u8>>, Error>;

	/// # Errors
	///
	/// [`Error::Malformed`] (or a codec error) if `packed` isn't something this packer made.
	fn unpack(&self, packed: &[u8]) -> Result<Key, Error>;
}

/// Packs an AES key as `u32 count || (u32 length || bytes)*`, holding the AES key then its HMAC
/// key.  Only usable with [`KeyType::Aes`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AesHmacKeyPacker;

impl KeyPacker for AesHmacKeyPacker {
	fn pack(&self, key: &Key) -> Result<Zeroizing<Vec<u8>>, Error> {
		let Material::Aes(k) = key.material() else {
			return Err(Error::invalid_key(format!(
				"{} keys cannot be packed as AES+HMAC",
				key.key_type()
			)));
		};

		let mut out = Zeroizing::new(Vec::new());
		out.extend_from_slice(&2u32.to_be_bytes());
		for part in [k.aes_bytes(), k.hmac_bytes()] {
			out.extend_from_slice(&(part.len() as u32).to_be_bytes());
			out.extend_from_slice(part);
		}

		Ok(out)
	}

	fn unpack(&self, packed: &[u8]) -> Result<Key, Error> {
		let (count, mut rest) = take_u32(packed)?;
		if count != 2 {
			return Err(Error::malformed(format!(
				"packed AES key has {count} parts, not 2"
			)));
		}

		let mut parts = Vec::with_capacity(2);
		for _ in 0..2 {
			let (len, tail) = take_u32(rest)?;
			let len = len as usize;
			if tail.len() < len {
				return Err(Error::malformed("packed AES key is truncated"));
			}
			let (part, tail) = tail.split_at(len);
			parts.push(part);
			rest = tail;
		}

		if !rest.is_empty() {
			return Err(Error::malformed("trailing data after packed AES key"));
		}

		Ok(Key::new(Material::Aes(AesKey::from_parts(parts[0], parts[1])?)))
	}
}

fn take_u32(b: &[u8]) -> Result<(u32, &[u8]), Error> {
	let Some((n, rest)) = b.split_first_chunk::<4>() else {
		return Err(Error::malformed("packed key is truncated"));
	};

	Ok((u32::from_be_bytes(*n), rest))
}

/// Packs any symmetric key as the CBOR array `[type, size, key]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CborKeyPacker;

impl KeyPacker for CborKeyPacker {
	fn pack(&self, key: &Key) -> Result<Zeroizing<Vec<u8>>, Error> {
		let key_type = key.key_type();
		check_session_type(key_type)?;
		let material = key.to_bytes()?;

		let mut out = Zeroizing::new(Vec::new());
		let mut enc = ciborium_ll::Encoder::from(&mut *out);
		cbor::write_array(&mut enc, "packed key", 3)?;
		cbor::write_text(&mut enc, "packed key type", key_type.tag())?;
		cbor::write_u64(&mut enc, "packed key size", key.size() as u64)?;
		cbor::write_bytes(&mut enc, "packed key material", &material)?;

		Ok(out)
	}

	fn unpack(&self, packed: &[u8]) -> Result<Key, Error> {
		let mut dec = ciborium_ll::Decoder::from(packed);
		cbor::read_array(&mut dec, "packed key", 3)?;

		let key_type: KeyType = cbor::read_text(&mut dec, "packed key type")?.parse()?;
		check_session_type(key_type)?;
		let size = cbor::read_u64(&mut dec, "packed key size")?;
		let mut material = cbor::read_bytes(&mut dec, "packed key material")?;

		let key = Key::read(key_type, &mut material)?;
		if key.size() as u64 != size {
			return Err(Error::malformed(format!(
				"packed key claims {size} bits, but has {}",
				key.size()
			)));
		}

		Ok(key)
	}
}

fn check_session_type(key_type: KeyType) -> Result<(), Error> {
	match key_type {
		KeyType::Aes | KeyType::AesAead => Ok(()),
		other => Err(Error::invalid_key(format!(
			"{other} keys cannot be used as session keys"
		))),
	}
}

/// How session keys are made and packed.
#[derive(Clone, Debug)]
pub struct SessionOptions {
	pub key_type: KeyType,
	/// In bits; `0` for the type's default.
	pub key_size: usize,
	pub packer: Arc<dyn KeyPacker>,
}

impl Default for SessionOptions {
	fn default() -> Self {
		Self {
			key_type: KeyType::AesAead,
			key_size: 0,
			packer: Arc::new(CborKeyPacker),
		}
	}
}

impl SessionOptions {
	/// AES-CBC+HMAC session keys, packed with [`AesHmacKeyPacker`].
	pub fn aes_hmac() -> Self {
		Self {
			key_type: KeyType::Aes,
			key_size: 0,
			packer: Arc::new(AesHmacKeyPacker),
		}
	}
}

/// What the originator sends to the acceptor to set up a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionMaterial {
	/// The packed session key, encrypted to the acceptor.
	pub material: Vec<u8>,
	/// The originator's signature over `material`, if they signed it.
	pub signature: Option<Vec<u8>>,
}

/// One end of an established session.
#[derive(Debug)]
pub struct SessionCrypter {
	key: Key,
}

impl SessionCrypter {
	/// Start a session, making session material that `encrypter`'s counterpart can accept.
	///
	/// With a `signer`, the material is signed too, so the acceptor can check who it came from.
	#[tracing::instrument(level = "debug", skip(encrypter, signer))]
	pub fn originate(
		encrypter: &impl Encrypt,
		options: &SessionOptions,
		signer: Option<&Signer>,
	) -> Result<(Self, SessionMaterial), Error> {
		check_session_type(options.key_type)?;

		let key = Key::generate(options.key_type, options.key_size)?;
		let packed = options.packer.pack(&key)?;
		let material = encrypter.encrypt(&*packed)?;
		let signature = signer.map(|s| s.sign(&material)).transpose()?;
		tracing::debug!(key_hash = %key.key_hash(), signed = signature.is_some(), "Session originated");

		Ok((
			Self { key },
			SessionMaterial {
				material,
				signature,
			},
		))
	}

	/// Join a session, by recovering the session key from `material`.
	///
	/// With a `verifier`, the material must carry a valid signature.
	///
	/// # Errors
	///
	/// [`Error::InvalidCryptoData`] if the material can't be decrypted or unpacked, or its
	/// signature is missing or bad.
	#[tracing::instrument(level = "debug", skip(crypter, material, verifier))]
	pub fn accept(
		crypter: &Crypter,
		material: &SessionMaterial,
		options: &SessionOptions,
		verifier: Option<&Verifier>,
	) -> Result<Self, Error> {
		if let Some(verifier) = verifier {
			let Some(signature) = material.signature.as_ref() else {
				tracing::debug!("Session material is unsigned");
				return Err(Error::InvalidCryptoData);
			};
			verifier.verify(&material.material, signature)?;
		}

		let packed = crypter.decrypt_secret(&material.material)?;
		let key = options
			.packer
			.unpack(&packed)
			.and_then(|key| check_session_type(key.key_type()).map(|()| key))
			.map_err(|e| {
				tracing::debug!(%e, "Session key could not be unpacked");
				Error::InvalidCryptoData
			})?;
		tracing::debug!(key_hash = %key.key_hash(), "Session accepted");

		Ok(Self { key })
	}
}

impl Encrypt for SessionCrypter {
	#[tracing::instrument(level = "debug", skip_all)]
	fn encrypt(&self, plaintext: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
		pipeline::encrypt(&self.key, plaintext.as_ref())
	}

	#[tracing::instrument(level = "debug", skip_all)]
	fn encrypt_stream<W: Write>(&self, reader: impl Read, writer: W) -> Result<W, Error> {
		pipeline::encrypt_stream(&self.key, reader, writer)
	}
}

impl Decrypt for SessionCrypter {
	#[tracing::instrument(level = "debug", skip_all)]
	fn decrypt(&self, ciphertext: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
		let mut plaintext = pipeline::decrypt(
			|h| {
				if *h == self.key.key_hash() {
					vec![&self.key]
				} else {
					vec![]
				}
			},
			ciphertext.as_ref(),
		)?;

		Ok(std::mem::take(&mut *plaintext))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{KeyPurpose, KeyStatus, MemoryKeySet, test_util::init};

	const DATA: &[u8] = b"This is some test data";

	struct Party {
		encrypter: crate::Encrypter,
		crypter: Crypter,
	}

	fn party() -> Party {
		let private = Key::generate(KeyType::RsaPrivate, 1024).unwrap();

		let mut privset =
			MemoryKeySet::new("private", KeyPurpose::DecryptAndEncrypt, KeyType::RsaPrivate)
				.unwrap();
		privset.add_key(&private, KeyStatus::Primary).unwrap();
		let mut pubset = MemoryKeySet::new("public", KeyPurpose::Encrypt, KeyType::RsaPublic).unwrap();
		pubset
			.add_key(&private.public_key().unwrap(), KeyStatus::Primary)
			.unwrap();

		Party {
			encrypter: crate::Encrypter::new(&pubset).unwrap(),
			crypter: Crypter::new(&privset).unwrap(),
		}
	}

	fn signing_keys() -> MemoryKeySet {
		let mut ks = MemoryKeySet::new("sig", KeyPurpose::SignAndVerify, KeyType::HmacSha1).unwrap();
		ks.generate_key(KeyStatus::Primary, 0).unwrap();
		ks
	}

	#[test]
	fn session_round_trip() {
		init();
		let bob = party();

		for options in [SessionOptions::default(), SessionOptions::aes_hmac()] {
			let (alice, material) = SessionCrypter::originate(&bob.encrypter, &options, None).unwrap();
			let bob_end = SessionCrypter::accept(&bob.crypter, &material, &options, None).unwrap();

			let ct = alice.encrypt(DATA).unwrap();
			assert_eq!(DATA, bob_end.decrypt(&ct).unwrap());

			let reply = bob_end.encrypt(b"and back").unwrap();
			assert_eq!(b"and back".to_vec(), alice.decrypt(&reply).unwrap());
		}
	}

	#[test]
	fn other_session_material_cannot_decrypt() {
		init();
		let bob = party();
		let options = SessionOptions::default();

		let (alice, _) = SessionCrypter::originate(&bob.encrypter, &options, None).unwrap();
		let (_, eve_material) = SessionCrypter::originate(&bob.encrypter, &options, None).unwrap();
		let bob_end = SessionCrypter::accept(&bob.crypter, &eve_material, &options, None).unwrap();

		let ct = alice.encrypt(DATA).unwrap();
		assert!(matches!(bob_end.decrypt(&ct), Err(Error::InvalidCryptoData)));
	}

	#[test]
	fn material_for_someone_else_cannot_be_accepted() {
		init();
		let bob = party();
		let carol = party();
		let options = SessionOptions::default();

		let (_, material) = SessionCrypter::originate(&bob.encrypter, &options, None).unwrap();

		assert!(matches!(
			SessionCrypter::accept(&carol.crypter, &material, &options, None),
			Err(Error::InvalidCryptoData)
		));
	}

	#[test]
	fn signed_material() {
		init();
		let bob = party();
		let options = SessionOptions::default();
		let keys = signing_keys();
		let signer = Signer::new(&keys).unwrap();
		let verifier = Verifier::new(&keys).unwrap();

		let (alice, material) =
			SessionCrypter::originate(&bob.encrypter, &options, Some(&signer)).unwrap();
		let bob_end =
			SessionCrypter::accept(&bob.crypter, &material, &options, Some(&verifier)).unwrap();

		assert_eq!(DATA, bob_end.decrypt(alice.encrypt(DATA).unwrap()).unwrap());
	}

	#[test]
	fn bad_or_missing_signature_is_refused() {
		init();
		let bob = party();
		let options = SessionOptions::default();
		let signer = Signer::new(signing_keys()).unwrap();
		let verifier = Verifier::new(signing_keys()).unwrap();

		let (_, mut material) =
			SessionCrypter::originate(&bob.encrypter, &options, Some(&signer)).unwrap();
		assert!(matches!(
			SessionCrypter::accept(&bob.crypter, &material, &options, Some(&verifier)),
			Err(Error::InvalidCryptoData)
		));

		material.signature = None;
		assert!(matches!(
			SessionCrypter::accept(&bob.crypter, &material, &options, Some(&verifier)),
			Err(Error::InvalidCryptoData)
		));
	}

	#[test]
	fn packers_reject_foreign_keys() {
		init();
		let hmac = Key::generate(KeyType::HmacSha1, 0).unwrap();
		let aead = Key::generate(KeyType::AesAead, 0).unwrap();

		assert!(matches!(CborKeyPacker.pack(&hmac), Err(Error::InvalidKey(_))));
		assert!(matches!(AesHmacKeyPacker.pack(&aead), Err(Error::InvalidKey(_))));
		assert!(matches!(
			SessionCrypter::originate(
				&party().encrypter,
				&SessionOptions {
					key_type: KeyType::HmacSha1,
					..SessionOptions::default()
				},
				None
			),
			Err(Error::InvalidKey(_))
		));
	}

	#[test]
	fn aes_hmac_packing_layout() {
		init();
		let key = Key::generate(KeyType::Aes, 192).unwrap();
		let packed = AesHmacKeyPacker.pack(&key).unwrap();

		assert_eq!(4 + 4 + 24 + 4 + 32, packed.len());
		assert_eq!(&[0u8, 0, 0, 2, 0, 0, 0, 24], &packed[..8]);
		assert_eq!(
			key.key_hash(),
			AesHmacKeyPacker.unpack(&packed).unwrap().key_hash()
		);
		assert!(matches!(
			AesHmacKeyPacker.unpack(&packed[..packed.len() - 1]),
			Err(Error::Malformed(_))
		));
	}

	#[test]
	fn cbor_packing_keeps_type_and_size() {
		init();

		for (key_type, size) in [(KeyType::Aes, 256), (KeyType::AesAead, 128)] {
			let key = Key::generate(key_type, size).unwrap();
			let unpacked = CborKeyPacker
				.unpack(&CborKeyPacker.pack(&key).unwrap())
				.unwrap();

			assert_eq!(key_type, unpacked.key_type());
			assert_eq!(size, unpacked.size());
			assert_eq!(key.key_hash(), unpacked.key_hash());
		}
	}

	#[test]
	fn mismatched_packer_is_invalid_crypto_data() {
		init();
		let bob = party();

		let (_, material) =
			SessionCrypter::originate(&bob.encrypter, &SessionOptions::default(), None).unwrap();
		assert!(matches!(
			SessionCrypter::accept(&bob.crypter, &material, &SessionOptions::aes_hmac(), None),
			Err(Error::InvalidCryptoData)
		));

		let (_, material) =
			SessionCrypter::originate(&bob.encrypter, &SessionOptions::aes_hmac(), None).unwrap();
		assert!(matches!(
			SessionCrypter::accept(&bob.crypter, &material, &SessionOptions::default(), None),
			Err(Error::InvalidCryptoData)
		));
	}
}
