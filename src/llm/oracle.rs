//! Relevance oracle built on the generation backend.
//!
//! Asks the LLM whether the bot should join the conversation using the
//! character's should-respond template, and parses a RESPOND/IGNORE verdict.

use crate::character::Character;
use crate::error::Result;
use crate::llm::traits::{GenerateRequest, RelevanceOracle, ReplyGeneratorDyn};
use std::sync::Arc;

/// Oracle that renders the should-respond template and asks the generator.
pub struct TemplateOracle {
    generator: Arc<dyn ReplyGeneratorDyn>,
    character: Arc<Character>,
}

impl TemplateOracle {
    pub fn new(generator: Arc<dyn ReplyGeneratorDyn>, character: Arc<Character>) -> Self {
        Self {
            generator,
            character,
        }
    }
}

impl RelevanceOracle for TemplateOracle {
    async fn is_relevant(&self, platform: Option<&str>, rendered_history: &str) -> Result<bool> {
        let prompt = self
            .character
            .should_respond_prompt(platform, rendered_history)?;
        let request = GenerateRequest::new(prompt);
        let verdict = self.generator.generate(&request).await?;
        Ok(parse_verdict(&verdict))
    }
}

/// Interpret the model's verdict. Anything that isn't a clear "respond"
/// counts as "not relevant"; the gate stays closed on ambiguity.
fn parse_verdict(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    let first_line = lowered.lines().next().unwrap_or("");

    if first_line.contains("ignore") || first_line.contains("stop") {
        return false;
    }
    first_line.contains("respond")
        || first_line.starts_with("yes")
        || first_line.starts_with("true")
}

#[cfg(test)]
mod tests {
    use super::{parse_verdict, TemplateOracle};
    use crate::character::Character;
    use crate::llm::traits::{GenerateRequest, RelevanceOracle, ReplyGenerator};
    use std::collections::HashMap;
    use std::sync::Arc;

    struct AlwaysRespond;

    impl ReplyGenerator for AlwaysRespond {
        async fn generate(&self, _request: &GenerateRequest) -> crate::Result<String> {
            Ok("RESPOND".to_string())
        }
    }

    fn telegram_only_character() -> Arc<Character> {
        let mut templates = HashMap::new();
        templates.insert(
            "telegram_should_respond".to_string(),
            "{history}\nShould {character_name} reply?".to_string(),
        );
        Arc::new(Character {
            name: "Shiller".to_string(),
            username: String::new(),
            personality: String::new(),
            clients: vec!["telegram".to_string()],
            templates,
        })
    }

    #[tokio::test]
    async fn test_platform_selects_qualified_template() {
        let oracle = TemplateOracle::new(Arc::new(AlwaysRespond), telegram_only_character());
        let verdict = oracle
            .is_relevant(Some("telegram"), "User: gm")
            .await
            .unwrap();
        assert!(verdict);
    }

    #[tokio::test]
    async fn test_missing_template_for_platform_is_an_error() {
        let oracle = TemplateOracle::new(Arc::new(AlwaysRespond), telegram_only_character());
        assert!(oracle.is_relevant(None, "User: gm").await.is_err());
        assert!(oracle.is_relevant(Some("discord"), "User: gm").await.is_err());
    }

    #[test]
    fn test_parse_verdict_respond() {
        assert!(parse_verdict("RESPOND"));
        assert!(parse_verdict("  respond\n"));
        assert!(parse_verdict("Yes, this is relevant."));
        assert!(parse_verdict("true"));
    }

    #[test]
    fn test_parse_verdict_ignore() {
        assert!(!parse_verdict("IGNORE"));
        assert!(!parse_verdict("stop"));
        assert!(!parse_verdict("No"));
    }

    #[test]
    fn test_parse_verdict_ignore_beats_respond() {
        // Models sometimes echo both options; ambiguity keeps the gate shut.
        assert!(!parse_verdict("IGNORE (not RESPOND)"));
    }

    #[test]
    fn test_parse_verdict_unrecognized_is_false() {
        assert!(!parse_verdict(""));
        assert!(!parse_verdict("The conversation seems lively."));
    }

    #[test]
    fn test_parse_verdict_only_first_line_counts() {
        assert!(!parse_verdict("Hmm.\nRESPOND"));
    }
}
