//! Response Generators
//!
//! Pluggable producers of response text behind the [`ResponseGenerator`]
//! trait.
//!
//! # Available Generators
//!
//! - **WordGenerator**: echoes the prompt word by word
//! - **CannedResponder**: keyword-selected demo answers with simulated latency
//!
//! # Usage
//!
//! ```ignore
//! use stream_conductor::backend::{CannedResponder, ResponseGenerator};
//!
//! let generator = CannedResponder::new();
//! let units = generator.generate("how does streaming work?").await?;
//! ```

mod canned;
mod traits;
mod words;

pub use canned::{CannedResponder, CannedTopic, DEFAULT_WORD_DELAY};
pub use traits::{word_units, ResponseGenerator, UnitStream};
pub use words::WordGenerator;
