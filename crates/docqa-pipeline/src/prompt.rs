use docqa_core::{Error, Result};

use docqa_vector::SearchHit;

const CONTEXT: &str = "{context}";
const QUESTION: &str = "{question}";

/// Prompt text with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT, QUESTION] {
            if !template.contains(placeholder) {
                return Err(Error::Configuration(format!("prompt template has no {placeholder} placeholder")));
            }
        }
        Ok(Self { template })
    }

    /// Substitute in one pass so placeholder text inside the context or the
    /// question is left alone.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(CONTEXT) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION) {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

/// Matched chunk texts in search order, separated by a blank line.
pub fn build_context(hits: &[SearchHit]) -> String {
    hits.iter().map(|h| h.chunk.content.as_str()).collect::<Vec<_>>().join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_both_placeholders_once() {
        let t = PromptTemplate::new("C: {context}\nQ: {question} {x}").unwrap();
        assert_eq!(t.render("ctx {question}", "why?"), "C: ctx {question}\nQ: why? {x}");
    }

    #[test]
    fn missing_placeholder_is_configuration_error() {
        let err = PromptTemplate::new("Answer: {question}").unwrap_err();
        assert_eq!(err.kind(), docqa_core::ErrorKind::Configuration);
    }

    #[test]
    fn default_template_is_valid() {
        assert!(PromptTemplate::new(docqa_core::config::DEFAULT_PROMPT_TEMPLATE).is_ok());
    }
}
