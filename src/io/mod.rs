pub mod fs_store;
pub mod lock;
pub mod memory_store;
pub mod settings_io;
pub mod store;
pub mod vault;
pub mod watcher;

pub use fs_store::FsDocuments;
pub use memory_store::MemoryDocuments;
pub use store::{ContextResolver, DocumentStore, EntityStore, NoteStore, StoreError};
pub use vault::Vault;
