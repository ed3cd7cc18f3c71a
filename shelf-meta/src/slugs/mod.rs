//! Taxonomy slug resolution and the unknown-term review queue

pub mod mappings;
pub mod resolver;
pub mod review_queue;

pub use mappings::{SourceMapping, SubjectMappings};
pub use resolver::{MatchType, ResolveOptions, SlugResolution, SlugResolver};
pub use review_queue::{ReviewQueue, ReviewQueueEntry, UnknownSubject};
