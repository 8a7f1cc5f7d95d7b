pub mod key_store;
pub mod platform_store;
pub mod task_store;

pub use key_store::{KeyStore, MemoryKeyStore};
pub use platform_store::{MemoryPlatformStore, PlatformStore};
pub use task_store::{MemoryTaskStore, TaskStore, TerminalUpdate};
