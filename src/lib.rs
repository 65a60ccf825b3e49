//! Build a chat-formatted R1 dataset of coded-message decoding puzzles.
//!
//! Rows of the labeled source dataset (decoder image, coded message, character
//! mapping, decoded message) are wrapped in a system / user / assistant
//! conversation, encoded under a fixed schema, split into train and test, and
//! written as Hub-layout parquet shards that can be pushed to the Hub.

pub mod card;
pub mod error;
pub mod example;
pub mod frame;
pub mod hub;
pub mod mapping;
pub mod messages;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod secrets;
pub mod source;
pub mod split;

pub use error::{Error, Result};
