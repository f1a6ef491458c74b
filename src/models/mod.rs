pub mod backend;
pub mod catalog;
pub mod handle;
pub mod llama_server;
pub mod manager;
mod timer;

pub use backend::{BackendLoader, ChatHandler, ChatRequest, ChatResponse, ModelBackend};
pub use catalog::{ImageBackendFamily, ModelCatalogEntry, ModelSource, ModelType, RemoteSource};
pub use handle::ModelRuntimeHandle;
pub use llama_server::LlamaServerLoader;
pub use manager::ModelLifecycleManager;
