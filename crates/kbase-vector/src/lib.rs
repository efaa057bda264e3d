#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod backend;
pub mod degrade;
pub mod lance;
pub mod memory;

pub use backend::{
    cosine_similarity, similarity_to_score, PointRecord, QueryFilter, ScoredPoint, VectorBackend,
};
pub use degrade::DegradingBackend;
pub use lance::LanceBackend;
pub use memory::MemoryBackend;
