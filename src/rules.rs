//! Ordered keyword rules that pick a canned reply for an utterance.
//!
//! A [`RuleTable`] is evaluated top to bottom against the lowercased
//! utterance and the first matching rule wins. Every table ends with
//! exactly one `always` rule so selection never comes back empty.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::responder::{Reply, Responder};

pub const SELL_PROCESS_RESPONSE: &str = "To sell your license, start by clicking the 'Sell My Licenses' button at the top of our page. You'll be guided through our 3-step process: Upload your license details, receive a valuation, and get paid. It's that simple!";

pub const LICENSE_TYPES_RESPONSE: &str = "We purchase a wide range of software licenses including Microsoft, Adobe, Autodesk, VMware, Oracle, and many cloud service providers. If you're unsure about your specific license, just share the details with us and we'll let you know.";

pub const TURNAROUND_RESPONSE: &str = "The entire process typically takes 2-3 business days from submission to payment. You'll receive a valuation within 24 hours, and once you accept, payment is processed within 1-2 business days.";

pub const SECURITY_RESPONSE: &str = "Absolutely! Security is our top priority. We use bank-grade encryption for all transactions, and your personal information is protected according to strict data privacy standards. We never share your information with third parties without your consent.";

pub const FALLBACK_RESPONSE: &str = "Thanks for your question. To provide you with the most accurate information, one of our specialists will reach out to you shortly. If you'd like an immediate response, please try one of our example questions or call us at +1 (555) 123-4567.";

/// Keyword test over a normalized utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Substring test; `"type"` also matches `"types"`.
    Contains { keyword: String },
    All { of: Vec<Condition> },
    Any { of: Vec<Condition> },
    Always,
}

impl Condition {
    pub fn contains(keyword: impl Into<String>) -> Self {
        Condition::Contains {
            keyword: keyword.into(),
        }
    }

    pub fn all(of: impl IntoIterator<Item = Condition>) -> Self {
        Condition::All {
            of: of.into_iter().collect(),
        }
    }

    pub fn any(of: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Any {
            of: of.into_iter().collect(),
        }
    }

    /// `text` must already be normalized.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Condition::Contains { keyword } => text.contains(keyword.as_str()),
            Condition::All { of } => of.iter().all(|c| c.matches(text)),
            Condition::Any { of } => of.iter().any(|c| c.matches(text)),
            Condition::Always => true,
        }
    }

    fn normalize(self) -> Result<Self> {
        Ok(match self {
            Condition::Contains { keyword } => {
                if keyword.trim().is_empty() {
                    return Err(ChatError::InvalidRules("empty keyword".into()));
                }
                Condition::Contains {
                    keyword: keyword.to_lowercase(),
                }
            }
            Condition::All { of } => Condition::All {
                of: normalize_list("all", of)?,
            },
            Condition::Any { of } => Condition::Any {
                of: normalize_list("any", of)?,
            },
            Condition::Always => Condition::Always,
        })
    }
}

fn normalize_list(op: &str, of: Vec<Condition>) -> Result<Vec<Condition>> {
    if of.is_empty() {
        return Err(ChatError::InvalidRules(format!("empty `{op}` list")));
    }
    of.into_iter().map(Condition::normalize).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub when: Condition,
    pub response: String,
}

impl Rule {
    pub fn new(id: impl Into<String>, when: Condition, response: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            when,
            response: response.into(),
        }
    }
}

/// Lowercase only; punctuation is kept.
pub fn normalize(utterance: &str) -> String {
    utterance.to_lowercase()
}

#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
    fallback: Rule,
}

impl RuleTable {
    /// Validate and build a table. The last rule must be the only `always`
    /// rule.
    pub fn new(rules: Vec<Rule>) -> Result<Self> {
        let mut rules = rules
            .into_iter()
            .map(|rule| {
                if rule.response.trim().is_empty() {
                    return Err(ChatError::InvalidRules(format!(
                        "rule `{}` has an empty response",
                        rule.id
                    )));
                }
                Ok(Rule {
                    when: rule.when.normalize()?,
                    ..rule
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let fallback = rules
            .pop()
            .ok_or_else(|| ChatError::InvalidRules("rule table is empty".into()))?;
        if fallback.when != Condition::Always {
            return Err(ChatError::InvalidRules(format!(
                "last rule `{}` must be an `always` fallback",
                fallback.id
            )));
        }
        if let Some(early) = rules.iter().find(|r| r.when == Condition::Always) {
            return Err(ChatError::InvalidRules(format!(
                "fallback rule `{}` must be last",
                early.id
            )));
        }

        Ok(Self { rules, fallback })
    }

    /// First matching rule for `utterance`, or the fallback.
    pub fn select(&self, utterance: &str) -> &Rule {
        let text = normalize(utterance);
        self.rules
            .iter()
            .find(|rule| rule.when.matches(&text))
            .unwrap_or(&self.fallback)
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> + '_ {
        self.rules.iter().chain(std::iter::once(&self.fallback))
    }

    pub fn len(&self) -> usize {
        self.rules.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            rules: vec![
                Rule::new(
                    "sell_process",
                    Condition::all([Condition::contains("sell"), Condition::contains("license")]),
                    SELL_PROCESS_RESPONSE,
                ),
                Rule::new(
                    "license_types",
                    Condition::any([
                        Condition::contains("type"),
                        Condition::all([
                            Condition::contains("what"),
                            Condition::contains("license"),
                        ]),
                    ]),
                    LICENSE_TYPES_RESPONSE,
                ),
                Rule::new(
                    "turnaround",
                    Condition::any([
                        Condition::contains("long"),
                        Condition::contains("time"),
                        Condition::contains("take"),
                    ]),
                    TURNAROUND_RESPONSE,
                ),
                Rule::new(
                    "security",
                    Condition::any([
                        Condition::contains("secure"),
                        Condition::contains("safe"),
                        Condition::contains("privacy"),
                    ]),
                    SECURITY_RESPONSE,
                ),
            ],
            fallback: Rule::new("fallback", Condition::Always, FALLBACK_RESPONSE),
        }
    }
}

#[async_trait]
impl Responder for RuleTable {
    async fn respond(&self, utterance: &str) -> Reply {
        let rule = self.select(utterance);
        Reply {
            rule_id: rule.id.clone(),
            text: rule.response.clone(),
        }
    }
}
