pub mod decoder;
pub mod framer;

pub use decoder::{EventDecoder, WireEvent};
pub use framer::LineFramer;
