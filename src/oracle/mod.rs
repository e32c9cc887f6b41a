//! Decision oracle: the vision model that picks the next action.

mod openai;
pub mod prompt;

pub use openai::ChatCompletionsOracle;

use async_trait::async_trait;

use crate::capture::Observation;
use crate::Result;

/// What the oracle is shown for one decision.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub prompt: String,
    /// Annotated, cropped screenshot as base64 PNG.
    pub image_base64: String,
}

impl DecisionRequest {
    pub fn new(prompt: String, observation: &Observation) -> Self {
        Self {
            prompt,
            image_base64: observation.image_base64(),
        }
    }
}

/// Answers a prompt plus screenshot with free text. The text is expected
/// to hold a fenced JSON block; parsing happens in [`crate::action`].
#[async_trait(?Send)]
pub trait Oracle {
    async fn decide(&mut self, request: &DecisionRequest) -> Result<String>;
}

#[async_trait(?Send)]
impl<O: Oracle + ?Sized> Oracle for Box<O> {
    async fn decide(&mut self, request: &DecisionRequest) -> Result<String> {
        (**self).decide(request).await
    }
}
