//! Versioned, self-describing encryption and signatures, with key rotation built in.
//!
//! Keys live in a [`KeySet`]: a list of numbered versions of one [`KeyType`], each with a
//! [`KeyStatus`].  New ciphertexts and signatures always use the *primary* version; decryption
//! and verification will use any primary or active version.  Every artifact starts with a
//! short hash of the key that made it, so the right key is found without any guessing, and old
//! data stays readable while keys are rotated.
//!
//! The operation types are built from a key set:
//!
//! * [`Encrypter`] and [`Crypter`] for encryption (AES-CBC with HMAC-SHA1, AES-GCM, or RSA-OAEP);
//! * [`Signer`] and [`Verifier`] for signatures (HMAC-SHA1, RSA, or DSA), including attached and
//!   time-limited signatures;
//! * [`SessionCrypter`] for hybrid encryption: a fresh symmetric key, sent to the other side
//!   encrypted with their public key.
//!
//! Key sets can be layered: an [`EncryptedKeySet`] stores its keys encrypted with another key
//! set, and a [`PbeKeySet`] stores them encrypted under a password.
//!
//! ```
//! use keyczar::{Crypter, Decrypt as _, Encrypt as _, KeyPurpose, KeyStatus, KeyType, MemoryKeySet};
//!
//! let mut keyset = MemoryKeySet::new("example", KeyPurpose::DecryptAndEncrypt, KeyType::Aes)?;
//! keyset.generate_key(KeyStatus::Primary, 256)?;
//!
//! let crypter = Crypter::new(&keyset)?;
//! let ciphertext = crypter.encrypt(b"This is some test data")?;
//!
//! assert_eq!(b"This is some test data".to_vec(), crypter.decrypt(&ciphertext)?);
//! # Ok::<(), keyczar::Error>(())
//! ```
//!
//! Anything that fails to decrypt or verify, for whatever reason, fails with
//! [`Error::InvalidCryptoData`], and nothing more is said about why.
mod cbor;
mod crypter;
mod encrypted_key_set;
mod error;
mod key;
mod key_hash;
mod key_type;
mod keyring;
mod keyset;
mod metadata;
mod ops;
mod pbe;
mod pipeline;
mod session;
mod signer;
mod stream;

#[cfg(test)]
mod test_util;

pub use ::ciborium;

pub use crypter::{Crypter, Encrypter};
pub use encrypted_key_set::EncryptedKeySet;
pub use error::Error;
pub use key::Key;
pub use key_hash::{KEY_HASH_SIZE, KeyHash};
pub use key_type::{KeyPurpose, KeyType, KeyTypeInfo, OutputSize};
pub use keyset::{KeySet, MemoryKeySet};
pub use metadata::{KeyMetadata, KeyStatus, KeyVersion};
pub use ops::{Decrypt, Encrypt};
pub use pbe::{DEFAULT_ITERATION_COUNT, PbeCipherType, PbeHashType, PbeKeySet, PbeKeyStore};
pub use pipeline::{FORMAT_VERSION, HEADER_SIZE};
pub use session::{
	AesHmacKeyPacker, CborKeyPacker, KeyPacker, SessionCrypter, SessionMaterial, SessionOptions,
};
pub use signer::{Signer, Verifier, attached_data};
