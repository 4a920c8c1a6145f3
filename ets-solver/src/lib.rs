#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

/**
 * These are the components: spline expansion, allocation, conservation,
 * mix weights and the sensitivity composer.
 */
mod impls;
pub use impls::*;

/**
 * These are the numerical helpers and error types the components share.
 */
mod types;
pub use types::*;

// We use non-std collections here for their ordering semantics and performance
pub(crate) type Map<K, V> = ets_core::models::Map<K, V>;
pub(crate) type Set<T> = indexmap::IndexSet<T, rustc_hash::FxBuildHasher>;
