pub mod chunking;
pub mod embeddings;
pub mod providers;
pub mod registry;

pub use embeddings::EmbeddingService;
pub use registry::{ClientRegistry, ProviderConfig, ProviderKind};

pub mod prelude {
    pub use crate::embeddings::EmbeddingService;
    pub use crate::registry::{ClientRegistry, ProviderConfig, ProviderKind};
    pub use nb_core::{ChatProvider, EmbeddingProvider, Error, Result};
}
