pub mod codec;
pub mod distributed;
pub mod error;
pub mod filter;
pub mod image;
pub mod output;
pub mod stats;
