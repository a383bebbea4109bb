//! Process-wide descriptor cache keyed by type identity.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use super::declaration::ModelDeclaration;
use super::descriptor::ModelDescriptor;

static DESCRIPTORS: LazyLock<RwLock<HashMap<TypeId, Arc<ModelDescriptor>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Look up the descriptor for `T`, deriving it on first use.
///
/// Derivation happens under the write lock with a second lookup, so
/// concurrent first use derives each type once. Association targets
/// and embedded declarations are resolved through function pointers
/// and never re-enter the cache while the lock is held.
pub fn describe<T: 'static>(declare: fn() -> ModelDeclaration) -> Arc<ModelDescriptor> {
    let key = TypeId::of::<T>();
    if let Some(found) = DESCRIPTORS.read().get(&key) {
        return Arc::clone(found);
    }

    let mut map = DESCRIPTORS.write();
    Arc::clone(
        map.entry(key)
            .or_insert_with(|| Arc::new(ModelDescriptor::derive(&declare()))),
    )
}

/// Number of cached descriptors.
pub fn cached_count() -> usize {
    DESCRIPTORS.read().len()
}
