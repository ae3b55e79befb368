pub mod local;
pub mod memory;

pub use local::LocalVfs;
pub use memory::MemoryVfs;
