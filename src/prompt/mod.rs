//! Prompt templates
//!
//! Minimal `{variable}` substitution, just enough for the synthesis loop and
//! the prompt-sizing arithmetic. Rendering a template with a variable left
//! unbound substitutes the empty string, which is exactly what the sizer
//! needs to measure a template's fixed token cost.

mod defaults;
mod helper;

pub use defaults::{
    keyword_extract_prompt, query_keyword_extract_prompt, refine_prompt, step_decompose_prompt,
    text_qa_prompt,
};
pub use helper::PromptHelper;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static VARIABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z][a-z0-9_]*)\}").unwrap());

/// A prompt template with `{snake_case}` variables and partial binding.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
    partial_vars: BTreeMap<String, String>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            partial_vars: BTreeMap::new(),
        }
    }

    /// Bind a variable ahead of time; later `format` calls may fill the rest.
    pub fn partial(mut self, key: &str, value: impl Into<String>) -> Self {
        self.partial_vars.insert(key.to_string(), value.into());
        self
    }

    /// Variables referenced by the template, in order of first appearance.
    pub fn input_variables(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for caps in VARIABLE_RE.captures_iter(&self.template) {
            let name = caps[1].to_string();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }

    /// Render the template. Unbound variables become empty strings.
    pub fn format(&self, vars: &[(&str, &str)]) -> String {
        VARIABLE_RE
            .replace_all(&self.template, |caps: &regex::Captures<'_>| {
                let name = &caps[1];
                vars.iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| v.to_string())
                    .or_else(|| self.partial_vars.get(name).cloned())
                    .unwrap_or_default()
            })
            .into_owned()
    }

    /// Render with every unbound variable empty; used to measure the fixed
    /// token cost of a template.
    pub fn empty_format(&self) -> String {
        self.format(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_substitutes_variables() {
        let prompt = PromptTemplate::new("Q: {query_str}\nContext: {context_str}");
        let out = prompt.format(&[("query_str", "why?"), ("context_str", "because")]);
        assert_eq!(out, "Q: why?\nContext: because");
    }

    #[test]
    fn test_partial_binding_survives_format() {
        let prompt = PromptTemplate::new("{query_str} / {existing_answer}")
            .partial("query_str", "what happened?");
        let out = prompt.format(&[("existing_answer", "nothing")]);
        assert_eq!(out, "what happened? / nothing");
    }

    #[test]
    fn test_unbound_variables_render_empty() {
        let prompt = PromptTemplate::new("a{context_str}b");
        assert_eq!(prompt.empty_format(), "ab");
    }

    #[test]
    fn test_input_variables_in_order() {
        let prompt = PromptTemplate::new("{query_str} {context_str} {query_str}");
        assert_eq!(prompt.input_variables(), vec!["query_str", "context_str"]);
    }
}
