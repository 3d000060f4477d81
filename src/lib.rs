//! Node.js bindings for the MMKV-style storage engine.
//!
//! This module exposes the `mmkv-core` API to Node.js via NAPI-RS.

#![deny(clippy::all)]

use napi::bindgen_prelude::{Buffer, Either4};
use napi_derive::napi;

use std::sync::Arc;

use mmkv_core::{Mode, OpenOptions, Store, Value};

/// Storage root used when the caller does not pass a path.
const DEFAULT_ROOT: &str = "mmkv";

/// Convert a JavaScript value accepted by `set` to an engine Value.
fn js_to_value(value: Either4<bool, f64, String, Buffer>) -> Value {
    match value {
        Either4::A(b) => Value::Bool(b),
        Either4::B(n) => Value::F64(n),
        Either4::C(s) => Value::String(s),
        Either4::D(buf) => Value::Bytes(buf.to_vec()),
    }
}

/// Convert an mmkv-core error to a napi Error.
fn to_napi_err(e: mmkv_core::Error) -> napi::Error {
    napi::Error::from_reason(format!("{}", e))
}

/// Process model for an instance.
#[napi(string_enum)]
pub enum MmkvMode {
    SingleProcess,
    MultiProcess,
}

impl From<MmkvMode> for Mode {
    fn from(mode: MmkvMode) -> Self {
        match mode {
            MmkvMode::SingleProcess => Mode::SingleProcess,
            MmkvMode::MultiProcess => Mode::MultiProcess,
        }
    }
}

/// Configuration for opening an instance.
#[napi(object)]
pub struct MmkvOptions {
    /// Instance identifier; one data file per id.
    pub id: String,
    /// Storage root directory. Defaults to `./mmkv`.
    pub path: Option<String>,
    /// Optional encryption key, at most 16 bytes.
    pub encryption_key: Option<String>,
    /// Process model. Defaults to single-process.
    pub mode: Option<MmkvMode>,
}

/// MMKV instance handle.
///
/// This is the main entry point for interacting with a store from Node.js.
#[napi]
pub struct Mmkv {
    inner: Arc<Store>,
}

#[napi]
impl Mmkv {
    /// Open (or create) the instance with the given id.
    #[napi(factory)]
    pub fn open(options: MmkvOptions) -> napi::Result<Self> {
        let mut opts = OpenOptions::new(
            options.id,
            options.path.as_deref().unwrap_or(DEFAULT_ROOT),
        );
        if let Some(mode) = options.mode {
            opts = opts.mode(mode.into());
        }
        if let Some(key) = options.encryption_key {
            opts = opts.encryption_key(key);
        }
        let inner = Store::open(opts).map_err(to_napi_err)?;
        Ok(Self { inner })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store a value. Accepts a boolean, number, string or Buffer.
    #[napi]
    pub fn set(&self, key: String, value: Either4<bool, f64, String, Buffer>) -> napi::Result<()> {
        self.inner.set(&key, js_to_value(value)).map_err(to_napi_err)
    }

    /// Remove a key. A no-op when the key is absent.
    #[napi]
    pub fn delete(&self, key: String) -> napi::Result<()> {
        self.inner.delete(&key).map_err(to_napi_err)
    }

    /// Remove every key.
    #[napi(js_name = "deleteAll")]
    pub fn delete_all(&self) -> napi::Result<()> {
        self.inner.clear().map_err(to_napi_err)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a boolean value, or null when absent or of another type.
    #[napi(js_name = "getBoolean")]
    pub fn get_boolean(&self, key: String) -> napi::Result<Option<bool>> {
        self.inner.get_bool(&key).map_err(to_napi_err)
    }

    /// Get a number value, or null when absent or of another type.
    #[napi(js_name = "getNumber")]
    pub fn get_number(&self, key: String) -> napi::Result<Option<f64>> {
        self.inner.get_f64(&key).map_err(to_napi_err)
    }

    /// Get a string value, or null when absent or of another type.
    #[napi(js_name = "getString")]
    pub fn get_string(&self, key: String) -> napi::Result<Option<String>> {
        self.inner.get_string(&key).map_err(to_napi_err)
    }

    /// Get a Buffer value, or null when absent or of another type.
    #[napi(js_name = "getBuffer")]
    pub fn get_buffer(&self, key: String) -> napi::Result<Option<Buffer>> {
        Ok(self
            .inner
            .get_bytes(&key)
            .map_err(to_napi_err)?
            .map(Buffer::from))
    }

    /// Whether a key exists.
    #[napi]
    pub fn contains(&self, key: String) -> napi::Result<bool> {
        self.inner.has(&key).map_err(to_napi_err)
    }

    /// All keys, in no particular order.
    #[napi(js_name = "getAllKeys")]
    pub fn get_all_keys(&self) -> napi::Result<Vec<String>> {
        self.inner.keys().map_err(to_napi_err)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Change the encryption key; omitting the key removes encryption.
    #[napi]
    pub fn recrypt(&self, key: Option<String>) -> napi::Result<()> {
        self.inner.rekey(key.as_deref()).map_err(to_napi_err)
    }

    /// Drop the in-memory cache and compact the data file.
    #[napi]
    pub fn trim(&self) -> napi::Result<()> {
        self.inner.clear_cache();
        self.inner.trim().map_err(to_napi_err)
    }

    /// Drop the in-memory cache; the next access reloads from disk.
    #[napi(js_name = "clearMemoryCache")]
    pub fn clear_memory_cache(&self) {
        self.inner.clear_cache();
    }

    /// Committed size of the data file in bytes.
    #[napi(getter)]
    pub fn size(&self) -> napi::Result<u32> {
        self.inner
            .actual_size()
            .map(|n| n as u32)
            .map_err(to_napi_err)
    }
}
