// Topic analysis: query a fitted model and label its topics.
//
// TopicAnalyser borrows a model and its vocabulary; the caller owns both.
// Labelling goes through the TopicInterpreter trait. AzureInterpreter
// calls an Azure OpenAI chat deployment.

pub mod analyser;
pub mod azure;
pub mod interpret;

use anyhow::Result;
use tracing::warn;

use crate::config::Config;
use azure::AzureInterpreter;
use interpret::{NoopInterpreter, TopicInterpreter};

/// Pick the interpreter for this configuration. Without Azure OpenAI
/// settings this is the NoopInterpreter, which refuses every request.
pub fn create_interpreter(config: &Config) -> Result<Box<dyn TopicInterpreter>> {
    match config.require_interpreter() {
        Ok(()) => Ok(Box::new(AzureInterpreter::new(config.azure())?)),
        Err(e) => {
            warn!(error = %e, "Topic interpreter not configured");
            Ok(Box::new(NoopInterpreter))
        }
    }
}
