//! Response Generator Traits
//!
//! The text-generation step is opaque to the conductor: something turns a
//! prompt into an ordered sequence of text units. This trait is the seam
//! where a real model, a canned demo or a test script plugs in.
//!
//! # Design Philosophy
//!
//! A generator only produces units. Publishing, accumulation, cancellation
//! and persistence all belong to the stream producer, so a generator never
//! needs to know about sessions or the store. A unit stream that yields an
//! `Err` ends generation; the producer turns that into the fixed
//! user-facing error message.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::GenerationError;

/// Ordered text units of one response
pub type UnitStream = BoxStream<'static, Result<String, GenerationError>>;

/// Produces a response for a prompt, one unit at a time
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Generator name for logs
    fn name(&self) -> &str;

    /// Start generating a response for `prompt`
    ///
    /// Failing here is treated like a fault on the first unit.
    async fn generate(&self, prompt: &str) -> Result<UnitStream, GenerationError>;
}

/// Split text into word units
///
/// Every word but the last carries one trailing space, so concatenating the
/// units gives the words joined by single spaces.
#[must_use]
pub fn word_units(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let last = words.len().saturating_sub(1);
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            if i < last {
                format!("{word} ")
            } else {
                (*word).to_string()
            }
        })
        .collect()
}
