use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Instance id was empty at open time.
    #[error("instance id cannot be empty")]
    EmptyId,

    /// Encryption key exceeds the 16-byte limit.
    #[error("encryption key cannot be longer than 16 bytes (got {0})")]
    EncryptionKeyTooLong(usize),

    /// The data file is encrypted but no key was supplied.
    #[error("store is encrypted but no encryption key was provided")]
    KeyRequired,

    /// A key was supplied for a data file that is not encrypted.
    #[error("an encryption key was provided but the store is not encrypted")]
    KeyUnexpected,

    /// The data file was written by a newer format revision.
    #[error("unsupported data file format version {0}")]
    UnsupportedVersion(u16),

    /// A record key is too large to encode.
    #[error("key is too large to store ({0} bytes)")]
    KeyTooLarge(usize),

    /// On-disk data failed a structural or checksum validation.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// Key derivation or AEAD failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
