pub mod memory;
pub mod vector;

pub use memory::{MemoryArticleStore, MemoryProfileStore, MemoryReportStore, MemorySourceStore};
pub use vector::{cosine_similarity, DistanceMetric, QueryHit, VectorEntity, VectorEntityStore, VectorStore};

pub mod prelude {
    pub use crate::memory::*;
    pub use crate::vector::{DistanceMetric, QueryHit, VectorStore};
    pub use nb_core::{ArticleStore, ProfileStore, ReportStore, SourceStore};
}
