// src/formatting.rs

use crate::core::Event;

/// Discord embed limits.
pub const MAX_TITLE_CHARS: usize = 256;
pub const MAX_BODY_CHARS: usize = 4096;

/// Renders an event into the title and body of a notification.
pub trait EventFormatter: Send + Sync {
    fn title(&self, event: &Event) -> String;
    fn body(&self, event: &Event) -> String;
}

/// A formatter producing Markdown suitable for chat webhooks.
///
/// The title is `[SEVERITY] message`; the body lists the context as sorted
/// `key: value` lines followed by the exception text in a fenced block.
#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    max_title_chars: usize,
    max_body_chars: usize,
}

impl MarkdownFormatter {
    pub fn new(max_title_chars: usize, max_body_chars: usize) -> Self {
        Self {
            max_title_chars,
            max_body_chars,
        }
    }

    fn format_context(&self, event: &Event) -> Vec<String> {
        event
            .context()
            .iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(text) => format!("{}: {}", key, text),
                other => format!("{}: {}", key, other),
            })
            .collect()
    }
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new(MAX_TITLE_CHARS, MAX_BODY_CHARS)
    }
}

impl EventFormatter for MarkdownFormatter {
    fn title(&self, event: &Event) -> String {
        let title = format!("[{}] {}", event.severity(), event.message());
        truncate(&title, self.max_title_chars)
    }

    fn body(&self, event: &Event) -> String {
        let mut sections = Vec::new();
        let context_lines = self.format_context(event);
        if !context_lines.is_empty() {
            sections.push(context_lines.join("\n"));
        }
        if let Some(trace) = event.exception_text() {
            sections.push(format!("```\n{}\n```", trace.trim_end()));
        }
        truncate(&sections.join("\n\n"), self.max_body_chars)
    }
}

/// Cuts `text` to at most `max` characters, marking the cut with an ellipsis.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
