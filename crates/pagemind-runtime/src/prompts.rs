//! Task prompt templates

/// Language summaries and translations are written in unless configured
pub const DEFAULT_LANGUAGE: &str = "Japanese";

/// Builds the summarize and translate prompts for one target language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    language: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE)
    }
}

impl PromptTemplates {
    pub fn new(language: impl Into<String>) -> Self {
        let language = language.into();
        let language = match language.trim() {
            "" => DEFAULT_LANGUAGE.to_string(),
            trimmed => trimmed.to_string(),
        };
        Self { language }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Summarization prompt; `text` is embedded verbatim
    pub fn summarize(&self, text: &str) -> String {
        format!(
            "Summarize the following text concisely in {}:\n\n{}\n\nSummary:",
            self.language, text
        )
    }

    /// Translation prompt; `text` is embedded verbatim
    pub fn translate(&self, text: &str) -> String {
        format!(
            "Translate the following text into natural {}:\n\n{}\n\n{} translation:",
            self.language, text, self.language
        )
    }

    /// Line recorded in the conversation when the user asks for a translation
    pub fn translate_request_line(&self, text: &str) -> String {
        format!("Please translate \"{}\" into {}", text, self.language)
    }
}

/// Wrap a typed chat message the way the popup sends it
pub fn chat_prompt(message: &str) -> String {
    format!("Human: {message}\nAssistant:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_embeds_text_verbatim() {
        let text = "  Line one.\n\nLine two with {braces} and \"quotes\"  ";
        let prompt = PromptTemplates::default().summarize(text);
        assert!(prompt.contains(text));
        assert!(prompt.contains("in Japanese"));
        assert!(prompt.ends_with("Summary:"));
    }

    #[test]
    fn test_translate_uses_language() {
        let prompt = PromptTemplates::new("French").translate("hello");
        assert_eq!(
            prompt,
            "Translate the following text into natural French:\n\nhello\n\nFrench translation:"
        );
    }

    #[test]
    fn test_blank_language_falls_back() {
        assert_eq!(PromptTemplates::new("  ").language(), DEFAULT_LANGUAGE);
    }

    #[test]
    fn test_chat_prompt() {
        assert_eq!(chat_prompt("hi"), "Human: hi\nAssistant:");
    }
}
