// Topic-modeling aggregation core: backend contract, normalization,
// assignment, cross-source aggregation, and result composition.

pub mod aggregate;
pub mod assign;
pub mod compose;
pub mod document;
pub mod error;
pub mod normalize;
pub mod traits;

pub use compose::{ResultKey, TopicModelResult};
pub use document::Document;
pub use error::PipelineError;
pub use traits::{Algorithm, TopicBackend};
