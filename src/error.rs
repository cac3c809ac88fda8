#[derive(Debug, thiserror::Error, thiserror_ext::Construct)]
#[non_exhaustive]
pub enum Error {
	/// Malformed, forged or otherwise undecryptable/unverifiable data.
	///
	/// This deliberately carries no detail: an unknown key hash and a bad tag look identical.
	#[error("invalid crypto data")]
	InvalidCryptoData,

	#[error("invalid key set: {0}")]
	InvalidKeySet(String),

	#[error("invalid key: {0}")]
	InvalidKey(String),

	#[error("key set has no primary key")]
	MissingPrimaryKey,

	#[error("decoding failure on {element}: {cause:?}")]
	Decoding {
		element: String,
		cause: ciborium_ll::Error<std::io::Error>,
	},

	#[error("encoding failure on {element}: {cause}")]
	Encoding {
		element: String,
		cause: std::io::Error,
	},

	#[error("stream already finished")]
	StreamFinished,

	#[error("malformed {0}")]
	Malformed(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}
