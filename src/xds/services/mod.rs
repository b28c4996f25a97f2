mod discovery;
pub mod stream;

pub use discovery::{DeltaResponseStream, DiscoveryServer, ResponseStream};
pub use stream::{run_stream_loop, StreamScope};
