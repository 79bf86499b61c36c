pub mod mock_media;
pub mod mock_transport;

pub use mock_media::*;
pub use mock_signaling::*;
pub use mock_transport::*;
pub use test_peer::*;
