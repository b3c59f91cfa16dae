//! Word Generator
//!
//! Streams the prompt itself back word by word. Useful wherever the text is
//! already known (replaying a stored answer, tests) and as the simplest
//! possible generator.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::traits::{word_units, ResponseGenerator, UnitStream};
use crate::error::GenerationError;

/// Echoes the prompt as word units
#[derive(Clone, Debug, Default)]
pub struct WordGenerator {
    unit_delay: Duration,
}

impl WordGenerator {
    /// Create a generator that yields units immediately
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate generation latency before each unit
    #[must_use]
    pub fn with_unit_delay(mut self, unit_delay: Duration) -> Self {
        self.unit_delay = unit_delay;
        self
    }
}

#[async_trait]
impl ResponseGenerator for WordGenerator {
    fn name(&self) -> &str {
        "words"
    }

    async fn generate(&self, prompt: &str) -> Result<UnitStream, GenerationError> {
        Ok(delayed_units(word_units(prompt), self.unit_delay))
    }
}

/// Turn a list of units into a stream, sleeping `delay` before each one
pub(crate) fn delayed_units(units: Vec<String>, delay: Duration) -> UnitStream {
    futures::stream::iter(units)
        .then(move |unit| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(unit)
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echoes_prompt_as_words() {
        let generator = WordGenerator::new();
        let units: Vec<_> = generator
            .generate("one two three")
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(
            units,
            vec![Ok("one ".to_string()), Ok("two ".to_string()), Ok("three".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_prompt_yields_nothing() {
        let units: Vec<_> = WordGenerator::new()
            .generate("")
            .await
            .unwrap()
            .collect()
            .await;
        assert!(units.is_empty());
    }

    #[tokio::test]
    async fn test_unit_delay() {
        let generator = WordGenerator::new().with_unit_delay(Duration::from_millis(20));
        let started = std::time::Instant::now();
        let count = generator.generate("a b c").await.unwrap().count().await;
        assert_eq!(count, 3);
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}
