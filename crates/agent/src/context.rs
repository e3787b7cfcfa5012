use browsepilot_core::page::{FormInfo, PageContext, PageElement};
use std::collections::VecDeque;

const TRUNCATION_MARKER: &str = "\n\n[context truncated to fit the token budget]";
const MAX_ELEMENTS: usize = 20;
const MAX_FORMS: usize = 2;
const MAX_HISTORY: usize = 5;

/// Renders a page snapshot into the bounded text block the oracle sees.
/// The budget is in tokens, approximated as one token per three bytes of
/// text; output never exceeds `max_tokens * 3` bytes plus the fixed
/// truncation marker.
pub struct ContextCompressor {
    max_tokens: usize,
    history: VecDeque<PageContext>,
}

impl ContextCompressor {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            history: VecDeque::new(),
        }
    }

    pub fn render(&mut self, context: &PageContext) -> String {
        let mut parts: Vec<String> = Vec::new();

        parts.push(format!("URL: {}", context.url));
        parts.push(format!("Title: {}", context.title));

        if context.has_modal {
            let hint = context
                .modal_hint
                .as_deref()
                .unwrap_or("Interact with the elements inside it.");
            parts.push(format!("\nMODAL DIALOG OPEN! {}", hint));
        }

        if !context.elements.is_empty() {
            let shown = &context.elements[..context.elements.len().min(MAX_ELEMENTS)];
            parts.push(format!(
                "\nElements ({}){}:",
                shown.len(),
                if context.has_modal { " [inside modal]" } else { "" }
            ));
            parts.push(format_elements(shown));
        }

        if !context.forms.is_empty() {
            parts.push("\nForms:".to_string());
            parts.push(format_forms(&context.forms[..context.forms.len().min(MAX_FORMS)]));
        }

        self.remember(context.clone());

        self.truncate_to_budget(parts.join("\n"))
    }

    /// Deterministic cut at the last full line within the byte budget, so a
    /// selector token is never split in half. The marker compensates for the
    /// lost tail.
    fn truncate_to_budget(&self, text: String) -> String {
        let max_bytes = self.max_tokens * 3;
        if text.len() <= max_bytes {
            return text;
        }

        let mut cut = max_bytes;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        // Back up to the previous line break when one exists in range.
        if let Some(newline) = text[..cut].rfind('\n') {
            cut = newline;
        }
        format!("{}{}", &text[..cut], TRUNCATION_MARKER)
    }

    fn remember(&mut self, context: PageContext) {
        self.history.push_back(context);
        if self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }

    /// Compressed trail of recently seen pages. Advisory only; not fed back
    /// to the oracle by default.
    pub fn navigation_history(&self) -> String {
        if self.history.is_empty() {
            return "No navigation history".to_string();
        }
        self.history
            .iter()
            .enumerate()
            .map(|(i, ctx)| format!("{}. {} ({})", i + 1, ctx.title, ctx.url))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

fn format_elements(elements: &[PageElement]) -> String {
    elements
        .iter()
        .map(|el| {
            let attrs: Vec<String> = el
                .attributes
                .iter()
                .filter(|(_, v)| !v.is_empty() && v.len() < 50)
                .map(|(k, v)| format!("{}=\"{}\"", k, v))
                .collect();
            let attr_str = if attrs.is_empty() {
                String::new()
            } else {
                format!(" ({})", attrs.join(" "))
            };
            format!(
                "[{}] <{}> \"{}\"{} -> selector: {}",
                el.index, el.tag, el.text, attr_str, el.selector
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_forms(forms: &[FormInfo]) -> String {
    forms
        .iter()
        .map(|form| {
            let fields = if form.fields.is_empty() {
                "  (no fields)".to_string()
            } else {
                form.fields
                    .iter()
                    .map(|f| {
                        format!(
                            "  - {} ({}){} -> {}",
                            if f.name.is_empty() { "unnamed" } else { &f.name },
                            if f.field_type.is_empty() { "text" } else { &f.field_type },
                            if f.required { " *required*" } else { "" },
                            f.selector
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            let method = if form.method.is_empty() { "GET".to_string() } else { form.method.to_uppercase() };
            format!("Form {} [{}]:\n{}", form.index, method, fields)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
