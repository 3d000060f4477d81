//! Process-wide instance registry.
//!
//! Opening the same data file twice must hand back the same instance, so
//! the registry keys live stores by canonical file path and holds them
//! weakly: dropping the last handle closes the store.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::OpenOptions;
use crate::error::Result;
use crate::store::Store;

static INSTANCES: Lazy<Mutex<HashMap<PathBuf, Weak<Store>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub(crate) fn get_or_open(options: OpenOptions) -> Result<Arc<Store>> {
    options.validate()?;
    fs::create_dir_all(&options.dir)?;
    let path = options.dir.canonicalize()?.join(options.file_name());

    let mut instances = INSTANCES.lock();
    instances.retain(|_, weak| weak.strong_count() > 0);
    if let Some(existing) = instances.get(&path).and_then(Weak::upgrade) {
        debug!(id = %existing.id(), "reusing live store instance");
        return Ok(existing);
    }
    let store = Arc::new(Store::open_uncached(options, path.clone())?);
    instances.insert(path, Arc::downgrade(&store));
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_file_shares_one_instance() {
        let dir = tempfile::tempdir().unwrap();
        let a = Store::open(OpenOptions::new("shared", dir.path())).unwrap();
        let b = Store::open(OpenOptions::new("shared", dir.path())).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = Store::open(OpenOptions::new("other", dir.path())).unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn dropped_instances_are_reopened_fresh() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(OpenOptions::new("cycle", dir.path())).unwrap();
            store.set("k", "v").unwrap();
        }
        let store = Store::open(OpenOptions::new("cycle", dir.path())).unwrap();
        assert_eq!(store.get_string("k").unwrap().as_deref(), Some("v"));
    }
}
