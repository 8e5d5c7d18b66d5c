pub mod driver;
pub mod locks;
pub mod options;
pub mod persistence;
pub mod query;
pub mod replicated;
mod scan;

pub use driver::Driver;
pub use locks::LockRegistry;
pub use options::{Options, Placement, ScanPolicy};
pub use replicated::ReplicatedDriver;
