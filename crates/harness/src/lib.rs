pub mod bench;

pub use bench::{catalog_registry, catalog_schema, MemoryRegistry, TestBench};
