//! Prompt assembly.

use std::fmt::Write as _;

use mall_catalog::ShopRecord;
use mall_conversation::{ConversationTurn, Role};
use serde::{Deserialize, Serialize};

/// Rendered in place of the history block on a fresh thread.
pub const NO_HISTORY_MARKER: &str = "(no previous conversation)";

/// Rendered in place of the context block when no shop matched.
pub const NO_CONTEXT_MARKER: &str = "(no matching stores)";

/// Default persona: a concierge at the mall's information kiosks.
pub const DEFAULT_PERSONA: &str = "\
You are Sam, the mall's friendly digital concierge, answering visitors at the information kiosks.

You help visitors:
1. Find shops, restaurants, services and facilities, and say where they are.
2. Pick shops that match what they are looking for.
3. Consider alternatives when what they asked for is not available.
4. With general questions, politely and conversationally.

Only use the stores listed in the context. Never invent store names, locations or promotions; \
send the visitor to the concierge counter when the context does not answer the question.
Introduce yourself only when there is no previous conversation.";

const RESPONSE_FORMAT: &str = "\
Respond in JSON only, in this format:
{\"textResponse\": \"<your answer to the visitor>\", \"shops\": [\"<store name>\", ...]}
List in \"shops\" the stores from the context that your answer mentions, in context order.";

/// Everything the model sees for one turn. Built fresh per turn and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptEnvelope {
    /// System instructions.
    pub persona: String,

    /// Most recent turns of the thread, oldest first.
    pub history: Vec<ConversationTurn>,

    /// Shops to ground the answer on, in rank order.
    pub context: Vec<ShopRecord>,

    /// Index into `context` of the shop the visitor referred to.
    pub focus: Option<usize>,

    /// The visitor's new message.
    pub utterance: String,
}

impl PromptEnvelope {
    /// Assemble an envelope, keeping only the last `window` turns of
    /// `history`.
    pub fn new(
        persona: impl Into<String>,
        history: &[ConversationTurn],
        window: usize,
        context: Vec<ShopRecord>,
        focus: Option<usize>,
        utterance: impl Into<String>,
    ) -> Self {
        let start = history.len().saturating_sub(window);
        let focus = focus.filter(|f| *f < context.len());
        Self {
            persona: persona.into(),
            history: history[start..].to_vec(),
            context,
            focus,
            utterance: utterance.into(),
        }
    }

    /// The shop the visitor referred to, if any.
    pub fn focused_shop(&self) -> Option<&ShopRecord> {
        self.focus.and_then(|f| self.context.get(f))
    }

    /// Render the prompt text sent to the generation service.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(self.persona.trim_end());
        out.push_str("\n\nThis is the conversation history:\n");
        if self.history.is_empty() {
            out.push_str(NO_HISTORY_MARKER);
            out.push('\n');
        } else {
            for turn in &self.history {
                let speaker = match turn.role {
                    Role::User => "visitor",
                    Role::Assistant => "assistant",
                };
                let _ = writeln!(out, "{speaker}:\n{}\n", turn.content.trim());
            }
        }

        let _ = write!(out, "\nThis is the new visitor query:\n{}\n", self.utterance.trim());

        out.push_str("\nContext (stores of the mall):\n");
        if self.context.is_empty() {
            out.push_str(NO_CONTEXT_MARKER);
            out.push('\n');
        }
        for (position, shop) in self.context.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", position + 1, render_shop(shop));
        }

        if let Some(shop) = self.focused_shop() {
            let _ = writeln!(
                out,
                "\nThe visitor is asking about store {} from the earlier suggestions: {}.",
                self.focus.map_or(0, |f| f + 1),
                shop.name
            );
        }

        out.push('\n');
        out.push_str(RESPONSE_FORMAT);
        out
    }
}

fn render_shop(shop: &ShopRecord) -> String {
    let mut line = format!(
        "{} | Category: {} | Location: {}",
        shop.name,
        shop.category(),
        shop.location
    );
    if !shop.keywords.is_empty() {
        let _ = write!(line, " | Keywords: {}", shop.keywords.join(", "));
    }
    if !shop.description.is_empty() {
        let _ = write!(line, " | Description: {}", shop.description);
    }
    line
}
