use browsepilot_core::action::BrowserAction;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Derived per action, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityVerdict {
    pub risk_level: RiskLevel,
    pub reason: String,
    pub requires_confirmation: bool,
}

impl SecurityVerdict {
    fn low() -> Self {
        Self {
            risk_level: RiskLevel::Low,
            reason: String::new(),
            requires_confirmation: false,
        }
    }
}

/// Page facts the classifier needs beyond the action itself.
#[derive(Debug, Clone, Default)]
pub struct PageMeta {
    pub url: String,
    /// Visible text of the element being clicked, when known.
    pub element_text: Option<String>,
}

/// One entry in a rule family: a case-insensitive pattern and the severity
/// it assigns. Families are ordered most-severe-first and the first match
/// within a family wins, so a payment URL is critical even though it would
/// also match a generic pattern further down.
struct Rule {
    pattern: Regex,
    level: RiskLevel,
    reason: &'static str,
}

fn rule(pattern: &str, level: RiskLevel, reason: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(&format!("(?i){}", pattern)).expect("static rule pattern"),
        level,
        reason,
    }
}

static URL_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"payment|checkout|pay/", RiskLevel::Critical, "Payment page"),
        rule(r"delete|remove|cancel|terminate", RiskLevel::High, "Deletion/cancellation page"),
        rule(
            r"order/confirm|purchase|buy|unsubscribe|close.?account",
            RiskLevel::Medium,
            "Potentially dangerous URL",
        ),
    ]
});

static ELEMENT_TEXT_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"\bpay\b|buy|purchase|place.?order", RiskLevel::Critical, "Payment/purchase button"),
        rule(
            r"delete|remove|cancel|unsubscribe|terminate",
            RiskLevel::High,
            "Deletion/cancellation button",
        ),
        rule(
            r"confirm|submit|send.?money|transfer",
            RiskLevel::Medium,
            "Confirmation button",
        ),
    ]
});

static FIELD_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(r"card.?number|cvv|credit.?card|card", RiskLevel::Critical, "Card data field"),
        rule(r"password|\bpin\b", RiskLevel::High, "Password field"),
        rule(r"\bssn\b|passport|expir", RiskLevel::Medium, "Sensitive data field"),
    ]
});

/// Heuristic risk scoring for proposed actions. A closed, ordered rule list:
/// nothing fuzzier than case-insensitive regex tests, so each rule is
/// independently unit-testable.
#[derive(Default)]
pub struct SecurityClassifier;

impl SecurityClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Score an action against the URL, element-text and field rule
    /// families. When several families fire, the verdict carries the
    /// maximum severity and the reason from the highest-severity source.
    /// Confirmation is required at high or critical.
    pub fn classify(&self, action: &BrowserAction, meta: &PageMeta) -> SecurityVerdict {
        let mut verdict = SecurityVerdict::low();

        match action {
            BrowserAction::Navigate { url } => {
                if let Some((level, reason)) = match_family(&URL_RULES, url) {
                    raise(&mut verdict, level, format!("{}: {}", reason, url));
                }
            }
            BrowserAction::Click { .. } => {
                let text = meta.element_text.as_deref().unwrap_or("");
                if let Some((level, reason)) = match_family(&ELEMENT_TEXT_RULES, text) {
                    raise(&mut verdict, level, format!("{}: \"{}\"", reason, text));
                }
            }
            BrowserAction::TypeText { selector, .. } => {
                if let Some((level, reason)) = match_family(&FIELD_RULES, selector) {
                    raise(&mut verdict, level, format!("{}: {}", reason, selector));
                }
            }
            _ => {}
        }

        // Being on a critical page raises the bar for anything done there.
        if !meta.url.is_empty() {
            if let Some((RiskLevel::Critical, reason)) = match_family(&URL_RULES, &meta.url) {
                raise(
                    &mut verdict,
                    RiskLevel::High,
                    format!("Current page is sensitive ({}): {}", reason, meta.url),
                );
            }
        }

        verdict.requires_confirmation = verdict.risk_level >= RiskLevel::High;
        verdict
    }

    /// Human-readable confirmation prompt for the UI.
    pub fn format_warning(&self, verdict: &SecurityVerdict, action: &BrowserAction) -> String {
        let level = match verdict.risk_level {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        format!(
            "SECURITY WARNING\n\nRisk level: {}\nReason: {}\nAction: {}\n\nProceed?",
            level,
            verdict.reason,
            action.describe()
        )
    }
}

fn match_family(rules: &[Rule], input: &str) -> Option<(RiskLevel, &'static str)> {
    if input.is_empty() {
        return None;
    }
    rules
        .iter()
        .find(|r| r.pattern.is_match(input))
        .map(|r| (r.level, r.reason))
}

/// Severity only ever goes up; the reason follows the highest source.
fn raise(verdict: &mut SecurityVerdict, level: RiskLevel, reason: String) {
    if level > verdict.risk_level {
        verdict.risk_level = level;
        verdict.reason = reason;
    }
}
