//! Podcast generation: the job runner (C11) and its durable queue (C12).
//!
//! A dedicated background-job crate depending directly on persistence
//! rather than an abstracted trait, since spec §4.12 ties queue durability
//! to "the same database that stores `PodcastJob`".

pub mod blob_store;
pub mod fsm;
pub mod job_runner;
pub mod queue;
pub mod script_parser;
pub mod stitch;
pub mod voice_resolution;

pub use blob_store::{BlobStore, BlobStoreError, InMemoryBlobStore};
pub use fsm::JobFsm;
pub use job_runner::JobRunnerDeps;
pub use queue::{JobQueue, ProgressEvent, QueueDeps};
pub use script_parser::{parse as parse_script, serialize as serialize_script, ScriptParseError, Speaker, Turn};
