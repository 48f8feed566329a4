//! Prompt assembly.

use chatrs_core::{ChatMessage, Prompt};

/// Default system directive. `{language}` is replaced with the session's
/// response language.
pub const DEFAULT_DIRECTIVE_TEMPLATE: &str =
    "You are a helpful assistant. Answer all questions to the best of your ability in {language}.";

const LANGUAGE_PLACEHOLDER: &str = "{language}";

/// Combines the system directive and the trimmed history into a [`Prompt`].
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    template: String,
}

impl PromptAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::with_template(DEFAULT_DIRECTIVE_TEMPLATE)
    }

    #[must_use]
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Render the directive for `language`. The language is substituted
    /// verbatim; any string is accepted.
    #[must_use]
    pub fn directive(&self, language: &str) -> String {
        self.template.replace(LANGUAGE_PLACEHOLDER, language)
    }

    #[must_use]
    pub fn assemble(&self, trimmed: Vec<ChatMessage>, language: &str) -> Prompt {
        Prompt {
            system_directive: self.directive(language),
            messages: trimmed,
        }
    }
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new()
    }
}
