pub mod pg;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use pg::PgStore;
pub use traits::ContentStore;

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryStore;
