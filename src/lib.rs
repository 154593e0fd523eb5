pub mod artifacts;
pub mod assemble;
pub mod chain;
pub mod command;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod script;

pub use artifacts::ArtifactNaming;
pub use assemble::ClipAssembler;
pub use command::{GenerationJob, Generator};
pub use config::{DreamConfig, VideoConfig};
pub use error::{DreamError, DreamResult};
pub use pipeline::{DreamRun, RunOptions, RunSummary};
pub use process::{CommandRunner, Invocation, SystemRunner};
pub use script::{LogicalLine, ScriptInterpreter};
