//! Prompt templates
//!
//! Templates use `{name}` placeholders. Unknown placeholders are left as is.

use serde::{Deserialize, Serialize};

/// Prompts used for answering and for query refinement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSet {
    /// System prompt for answer generation
    pub system: String,
    /// User prompt; placeholders `{context}` and `{query}`
    pub user_template: String,
    /// System prompt for sub-query generation
    pub refinement_system: String,
    /// Refinement prompt; placeholders `{query}`, `{gaps}`, `{retrieved}`, `{previous}`
    pub refinement_template: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: "You are an expert assistant that answers questions based on provided context.\n\
                     - Use only information from the provided context\n\
                     - If the context doesn't contain enough information, say so\n\
                     - Cite sources by their [Source n] marker when making claims\n\
                     - Be concise but thorough"
                .to_string(),
            user_template: "Based on the following context, please answer the question.\n\n\
                            Context:\n{context}\n\n\
                            Question: {query}\n\n\
                            Answer:"
                .to_string(),
            refinement_system: "You write search queries. Reply with a single query on one line."
                .to_string(),
            refinement_template: "Based on the initial query and the documents retrieved so far, \
                                  write one more specific search query that would find additional \
                                  relevant information.\n\n\
                                  Initial query: {query}\n\
                                  Aspects not yet covered: {gaps}\n\
                                  Already retrieved: {retrieved}\n\
                                  Queries already issued: {previous}\n\n\
                                  Search query:"
                .to_string(),
        }
    }
}

impl PromptSet {
    /// Final user prompt with the rendered context block
    pub fn render_user(&self, context: &str, query: &str) -> String {
        render(&self.user_template, &[("context", context), ("query", query)])
    }

    /// Refinement prompt for the next sub-query
    pub fn render_refinement(
        &self,
        query: &str,
        gaps: &[String],
        retrieved: &[String],
        previous: &[String],
    ) -> String {
        let gaps = if gaps.is_empty() {
            "none identified".to_string()
        } else {
            gaps.join(", ")
        };
        let retrieved = if retrieved.is_empty() {
            "nothing".to_string()
        } else {
            retrieved.join("; ")
        };
        let previous = previous.join("; ");

        render(
            &self.refinement_template,
            &[
                ("query", query),
                ("gaps", &gaps),
                ("retrieved", &retrieved),
                ("previous", &previous),
            ],
        )
    }
}

/// Substitute `{key}` placeholders in one pass, so substituted text is never re-scanned
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let replaced = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });

        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
