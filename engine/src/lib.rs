pub mod error;
pub mod generator;
pub mod loader;
pub mod match_object;
pub mod matcher;
pub mod registry;
pub mod samples;
pub mod session;
pub mod spec;

pub use error::EngineError;
pub use loader::{FsLoader, MemoryLoader, SourceLoader};
pub use match_object::{MatchContent, MatchObject, Position};
pub use registry::{ConstructRef, FileId, MAX_DEPTH, Registry, SymbolTable};
pub use samples::{Sample, SampleStore};
pub use session::{Session, SessionOptions};
pub use spec::Spec;
