//! Frustration and surface-affect lexicons.
//!
//! Lexicons are first-class configuration: the analyzer never hard-codes
//! keyword lists. The defaults here are a workable English starter set
//! that operators replace per deployment.

use serde::{Deserialize, Serialize};

use crate::error::{HandoffError, Result};

/// One weighted category of frustration indicators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexiconCategory {
    /// Category name, surfaced on assessments as an indicator.
    pub name: String,
    /// Score contribution per hit, in frustration-score points.
    pub weight: f64,
    /// Case-insensitive phrases matched against the utterance.
    pub terms: Vec<String>,
}

/// The curated frustration lexicon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrustrationLexicon {
    /// Weighted categories.
    pub categories: Vec<LexiconCategory>,
}

impl FrustrationLexicon {
    pub(super) fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(HandoffError::ConfigInvalid {
                reason: "frustration lexicon has no categories".into(),
            });
        }
        for cat in &self.categories {
            if cat.terms.is_empty() {
                return Err(HandoffError::ConfigInvalid {
                    reason: format!("lexicon category {} has no terms", cat.name),
                });
            }
            if cat.weight <= 0.0 {
                return Err(HandoffError::ConfigInvalid {
                    reason: format!("lexicon category {} has non-positive weight", cat.name),
                });
            }
        }
        Ok(())
    }

    /// The category marking an explicit request for a human, if present.
    pub fn escalation_category(&self) -> Option<&LexiconCategory> {
        self.categories
            .iter()
            .find(|c| c.name == "explicit_escalation_request")
    }
}

impl Default for FrustrationLexicon {
    fn default() -> Self {
        Self {
            categories: vec![
                LexiconCategory {
                    name: "profanity".into(),
                    weight: 2.5,
                    terms: vec![
                        "damn".into(),
                        "hell".into(),
                        "crap".into(),
                        "bullshit".into(),
                    ],
                },
                LexiconCategory {
                    name: "exasperation".into(),
                    weight: 1.5,
                    terms: vec![
                        "ridiculous".into(),
                        "unacceptable".into(),
                        "fed up".into(),
                        "sick of".into(),
                        "worst".into(),
                        "useless".into(),
                        "again and again".into(),
                        "how many times".into(),
                    ],
                },
                LexiconCategory {
                    name: "threat_to_leave".into(),
                    weight: 3.0,
                    terms: vec![
                        "cancel my account".into(),
                        "switch to".into(),
                        "take my business".into(),
                        "never using".into(),
                        "close my account".into(),
                    ],
                },
                LexiconCategory {
                    name: "explicit_escalation_request".into(),
                    weight: 3.5,
                    terms: vec![
                        "speak to a manager".into(),
                        "want a manager".into(),
                        "talk to a human".into(),
                        "real person".into(),
                        "supervisor".into(),
                        "escalate".into(),
                    ],
                },
            ],
        }
    }
}

/// Marker lists behind the response-quality rubric.
///
/// Consumed by the quality gate's dimension scoring and by the chatbot
/// confidence heuristic. Like the frustration lexicon, these are
/// operator-tunable data, not code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricLexicon {
    /// Phrases that signal the model declined or failed to answer.
    pub refusal: Vec<String>,
    /// Softeners that weaken factual confidence.
    pub hedging: Vec<String>,
    /// Courtesy and empathy markers.
    pub empathy: Vec<String>,
}

impl RubricLexicon {
    pub(super) fn validate(&self) -> Result<()> {
        for (name, list) in [
            ("refusal", &self.refusal),
            ("hedging", &self.hedging),
            ("empathy", &self.empathy),
        ] {
            if list.is_empty() {
                return Err(HandoffError::ConfigInvalid {
                    reason: format!("rubric lexicon {name} list is empty"),
                });
            }
        }
        Ok(())
    }
}

impl Default for RubricLexicon {
    fn default() -> Self {
        Self {
            refusal: vec![
                "i can't".into(),
                "i cannot".into(),
                "i don't know".into(),
                "i'm unable".into(),
                "i am unable".into(),
                "i'm not able".into(),
                "as an ai".into(),
            ],
            hedging: vec![
                "might be".into(),
                "maybe".into(),
                "not sure".into(),
                "i think".into(),
            ],
            empathy: vec![
                "sorry".into(),
                "apologize".into(),
                "understand".into(),
                "happy to help".into(),
                "glad to help".into(),
                "thank you".into(),
            ],
        }
    }
}

/// Lexicons for the chatbot's surface-affect scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectLexicon {
    /// Urgency markers.
    pub urgency: Vec<String>,
    /// Frustration markers (coarser than the analyzer lexicon).
    pub frustration: Vec<String>,
    /// Politeness markers.
    pub politeness: Vec<String>,
}

impl Default for AffectLexicon {
    fn default() -> Self {
        Self {
            urgency: vec![
                "urgent".into(),
                "immediately".into(),
                "right now".into(),
                "asap".into(),
                "today".into(),
            ],
            frustration: vec![
                "frustrated".into(),
                "annoyed".into(),
                "angry".into(),
                "ridiculous".into(),
                "unacceptable".into(),
            ],
            politeness: vec![
                "please".into(),
                "thank you".into(),
                "thanks".into(),
                "appreciate".into(),
                "kindly".into(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lexicon_validates() {
        FrustrationLexicon::default().validate().unwrap();
    }

    #[test]
    fn default_has_escalation_category() {
        let lexicon = FrustrationLexicon::default();
        let cat = lexicon.escalation_category().unwrap();
        assert!(cat.terms.iter().any(|t| t.contains("manager")));
    }

    #[test]
    fn empty_category_rejected() {
        let lexicon = FrustrationLexicon {
            categories: vec![LexiconCategory {
                name: "empty".into(),
                weight: 1.0,
                terms: vec![],
            }],
        };
        assert!(lexicon.validate().is_err());
    }

    #[test]
    fn non_positive_weight_rejected() {
        let lexicon = FrustrationLexicon {
            categories: vec![LexiconCategory {
                name: "bad".into(),
                weight: 0.0,
                terms: vec!["term".into()],
            }],
        };
        assert!(lexicon.validate().is_err());
    }

    #[test]
    fn lexicon_toml_roundtrip() {
        let lexicon = FrustrationLexicon::default();
        let toml = toml::to_string(&lexicon).unwrap();
        let parsed: FrustrationLexicon = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.categories.len(), lexicon.categories.len());
    }

    #[test]
    fn default_rubric_validates() {
        RubricLexicon::default().validate().unwrap();
    }

    #[test]
    fn rubric_rejects_empty_lists() {
        let rubric = RubricLexicon {
            refusal: vec![],
            ..RubricLexicon::default()
        };
        let err = rubric.validate().unwrap_err();
        assert!(err.to_string().contains("refusal"));

        let rubric = RubricLexicon {
            empathy: vec![],
            ..RubricLexicon::default()
        };
        assert!(rubric.validate().is_err());
    }

    #[test]
    fn rubric_toml_roundtrip() {
        let rubric = RubricLexicon::default();
        let toml = toml::to_string(&rubric).unwrap();
        let parsed: RubricLexicon = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.refusal, rubric.refusal);
        assert_eq!(parsed.hedging, rubric.hedging);
        assert_eq!(parsed.empathy, rubric.empathy);
    }
}
