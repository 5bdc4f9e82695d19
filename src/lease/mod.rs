// Lease slot storage
//
// A lease slot holds at most one `LeaseRecord`. Backends:
// - `MemoryLeaseStore`: in-process, with fault injection for tests
// - `FileLeaseStore`: one lock file per slot in a shared directory

pub mod file;
pub mod memory;
pub mod record;
pub mod store;

pub use file::FileLeaseStore;
pub use memory::MemoryLeaseStore;
pub use record::LeaseRecord;
pub use store::{LeaseStore, StoreResult};
