// Implementations of the restriction storage traits.

pub mod cached_store;
pub mod in_memory;
pub mod sqlite_store;

pub use cached_store::CachedRestrictionStore;
pub use in_memory::InMemoryRestrictionStore;
pub use sqlite_store::SqliteRestrictionStore;
