//! Append-only, mmap-backed typed key-value storage.
//!
//! Each instance is one memory-mapped data file holding a CRC-protected
//! record log. The live key set is replayed into memory on open, writes
//! append to the log, and `trim` compacts it back down to the live
//! records. Values can be encrypted (scrypt + XChaCha20-Poly1305), and a
//! multi-process mode coordinates several processes over one file with
//! advisory locks.
//!
//! # Quick start
//!
//! ```no_run
//! use mmkv_core::{OpenOptions, Store};
//!
//! # fn main() -> mmkv_core::Result<()> {
//! let store = Store::open(OpenOptions::new("user", "./data"))?;
//!
//! store.set("name", "Alice")?;
//! store.set("logged-in", true)?;
//!
//! assert_eq!(store.get_string("name")?.as_deref(), Some("Alice"));
//! assert_eq!(store.get_bool("logged-in")?, Some(true));
//!
//! store.delete("logged-in")?;
//! store.trim()?;
//! # Ok(())
//! # }
//! ```

mod config;
mod crypto;
mod error;
mod format;
mod lock;
mod mapfile;
mod registry;
mod store;
mod value;

pub use config::{Mode, OpenOptions};
pub use error::{Error, Result};
pub use store::Store;
pub use value::Value;
