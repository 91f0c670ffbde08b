//! Generation backends and collaborator traits.

pub mod gemini;
pub mod manager;
pub mod ollama;
pub mod oracle;
pub mod traits;

pub use gemini::GeminiClient;
pub use manager::GenerationManager;
pub use ollama::OllamaClient;
pub use oracle::TemplateOracle;
pub use traits::{
    GenerateRequest, RelevanceOracle, RelevanceOracleDyn, ReplyGenerator, ReplyGeneratorDyn,
};
