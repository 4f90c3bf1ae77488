//! Parsing of model replies.
//!
//! The persona asks the model for `{"textResponse": "...", "shops": [...]}`.
//! Models do not always comply, so anything that is not such an object is
//! taken verbatim as the reply text.

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// A generated reply, ready to be shown and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantReply {
    /// Text shown to the visitor.
    pub text: String,

    /// Shop names the model listed alongside the text, in its order.
    pub shops: Vec<String>,

    /// Whether the model returned the structured format.
    pub structured: bool,
}

#[derive(Deserialize)]
struct WireReply {
    #[serde(rename = "textResponse", alias = "text_response", alias = "response")]
    text_response: String,

    #[serde(default)]
    shops: Vec<WireShop>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireShop {
    Name(String),
    Named {
        #[serde(alias = "title")]
        name: String,
    },
}

impl AssistantReply {
    /// A plain-text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            shops: Vec::new(),
            structured: false,
        }
    }

    /// Parse raw model output. Blank output is an error.
    pub fn parse(raw: &str) -> Result<Self, GenerationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GenerationError::MalformedOutput("empty reply".to_string()));
        }

        let structured = json_object(trimmed)
            .and_then(|json| serde_json::from_str::<WireReply>(json).ok());
        if let Some(reply) = structured {
            let text = reply.text_response.trim().to_string();
            if text.is_empty() {
                return Err(GenerationError::MalformedOutput("empty textResponse".to_string()));
            }
            let shops = reply
                .shops
                .into_iter()
                .map(|shop| match shop {
                    WireShop::Name(name) | WireShop::Named { name } => name.trim().to_string(),
                })
                .filter(|name| !name.is_empty())
                .collect();
            return Ok(Self {
                text,
                shops,
                structured: true,
            });
        }

        Ok(Self::text(trimmed))
    }
}

/// The outermost `{...}` span, ignoring code fences and surrounding prose.
fn json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
