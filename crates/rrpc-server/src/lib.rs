//! The server dispatch engine: polling loop, fragment reassembly hand-off,
//! per-request worker offloading, and reply/error/stream-terminator
//! emission.

mod engine;
mod registry;
mod sink;
mod worker;

pub use engine::{BuildError, ServerEngine, ServerEngineBuilder};
pub use registry::{DuplicateService, Handler, ServiceRegistry, StreamingHandler, UnaryHandler};
pub use sink::{ChannelStreamSink, ServerStreamSink};
