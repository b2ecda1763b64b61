//! Connection pooling: sources are shared between cursors referencing
//! the same locator, and actually closed only when the last reference
//! is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::driver::{self, VectorSource};
use crate::errors::Result;

struct PoolEntry {
    source: Arc<dyn VectorSource>,
    refcount: usize,
}

static POOL: OnceLock<Mutex<HashMap<String, PoolEntry>>> = OnceLock::new();

fn pool() -> &'static Mutex<HashMap<String, PoolEntry>> {
    POOL.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Acquire the connection for `key`, opening it through `open` on first
/// use. Callers hold the driver lock; the pool's own lock nests inside
/// it.
pub fn acquire(
    key: &str,
    open: impl FnOnce() -> Result<Arc<dyn VectorSource>>,
) -> Result<Arc<dyn VectorSource>> {
    let mut entries = pool().lock().unwrap_or_else(|p| p.into_inner());
    if let Some(entry) = entries.get_mut(key) {
        entry.refcount += 1;
        log::trace!("pool: reusing `{key}` (refcount {})", entry.refcount);
        return Ok(Arc::clone(&entry.source));
    }
    let source = open()?;
    entries.insert(
        key.to_owned(),
        PoolEntry {
            source: Arc::clone(&source),
            refcount: 1,
        },
    );
    Ok(source)
}

/// Release one reference to `key`, closing the connection when the
/// count reaches zero. The close re-takes the driver lock, so callers
/// must not hold it here.
pub fn release(key: &str) {
    let closing = {
        let mut entries = pool().lock().unwrap_or_else(|p| p.into_inner());
        let last_reference = match entries.get_mut(key) {
            Some(entry) if entry.refcount > 1 => {
                entry.refcount -= 1;
                false
            }
            Some(_) => true,
            None => false,
        };
        if last_reference {
            entries.remove(key).map(|e| e.source)
        } else {
            None
        }
    };
    if let Some(source) = closing {
        log::debug!("pool: closing `{key}`");
        let _guard = driver::lock();
        drop(source);
    }
}

/// Number of live pooled connections.
pub fn active_connections() -> usize {
    pool().lock().unwrap_or_else(|p| p.into_inner()).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SourceLayer;
    use crate::errors::ShapeStreamError;

    struct FakeSource;

    impl VectorSource for FakeSource {
        fn layer_count(&self) -> usize {
            0
        }
        fn layer_by_index(&self, _index: usize) -> Option<Box<dyn SourceLayer>> {
            None
        }
        fn layer_by_name(&self, _name: &str) -> Option<Box<dyn SourceLayer>> {
            None
        }
        fn execute_sql(&self, query: &str) -> Result<Box<dyn SourceLayer>> {
            Err(ShapeStreamError::Filter(query.to_owned()))
        }
    }

    #[test]
    fn test_refcounted_sharing_and_deferred_close() {
        let key = "pool-test-shared";
        let mut opens = 0;
        let first = acquire(key, || {
            opens += 1;
            Ok(Arc::new(FakeSource))
        })
        .unwrap();
        let second = acquire(key, || {
            opens += 1;
            Ok(Arc::new(FakeSource))
        })
        .unwrap();
        assert_eq!(opens, 1);
        assert!(Arc::ptr_eq(&first, &second));

        release(key);
        // Still pooled: one reference remains.
        let third = acquire(key, || {
            opens += 1;
            Ok(Arc::new(FakeSource))
        })
        .unwrap();
        assert_eq!(opens, 1);
        drop(third);
        release(key);
        release(key);

        // All references gone: the next acquire reopens.
        let _fourth = acquire(key, || {
            opens += 1;
            Ok(Arc::new(FakeSource))
        })
        .unwrap();
        assert_eq!(opens, 2);
        release(key);
    }

    #[test]
    fn test_failed_open_leaves_no_entry() {
        let key = "pool-test-failing";
        let result = acquire(key, || {
            Err(ShapeStreamError::Resource("nope".to_owned()))
        });
        assert!(result.is_err());
        let reopened = acquire(key, || Ok(Arc::new(FakeSource)));
        assert!(reopened.is_ok());
        release(key);
    }
}
