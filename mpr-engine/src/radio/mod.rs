//! Internet radio input: ICY header/metadata parsing, HTTP connection and
//! the feed cycle that moves stream bytes into the decoder.

pub mod feeder;
pub mod icy;
pub mod stream;

pub use feeder::{feed, FeedOutcome, RadioFrameCursor};
pub use icy::{IcyHeaders, IcyMetadata};
