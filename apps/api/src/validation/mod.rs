//! Diagnostics over structured resume data.
//!
//! Every configured rule runs, in any order, and none of them mutates the
//! input. A failing rule is a diagnostic, not an error: the caller still gets
//! the data back alongside the results.

pub mod handlers;
pub mod rules;

use serde::{Deserialize, Serialize};

use crate::models::ResumeData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    ContactCompleteness,
    WorkExperience,
    Education,
    Skills,
}

impl RuleKind {
    pub const ALL: [RuleKind; 4] = [
        RuleKind::ContactCompleteness,
        RuleKind::WorkExperience,
        RuleKind::Education,
        RuleKind::Skills,
    ];

    /// Weight in the completeness score.
    pub fn weight(self) -> f64 {
        match self {
            RuleKind::ContactCompleteness => 0.30,
            RuleKind::WorkExperience => 0.35,
            RuleKind::Education => 0.15,
            RuleKind::Skills => 0.20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSeverity {
    Info,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub rule: RuleKind,
    pub severity: ValidationSeverity,
    pub is_valid: bool,
    pub message: String,
    pub suggestions: Vec<String>,
}

impl ValidationResult {
    pub fn valid(rule: RuleKind, message: impl Into<String>) -> Self {
        Self {
            rule,
            severity: ValidationSeverity::Info,
            is_valid: true,
            message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn invalid(
        rule: RuleKind,
        severity: ValidationSeverity,
        message: impl Into<String>,
        suggestions: Vec<String>,
    ) -> Self {
        Self {
            rule,
            severity,
            is_valid: false,
            message: message.into(),
            suggestions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSettings {
    pub rules: Vec<RuleKind>,
    /// Skill counts above this are flagged as likely noise.
    pub max_skills: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            rules: RuleKind::ALL.to_vec(),
            max_skills: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub results: Vec<ValidationResult>,
    /// Weighted over the configured rules, 0.0 – 1.0.
    pub completeness_score: f64,
    pub all_valid: bool,
    pub warning_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ResumeValidator {
    settings: ValidationSettings,
}

impl ResumeValidator {
    pub fn new(settings: ValidationSettings) -> Self {
        Self { settings }
    }

    /// One result per configured rule; no rule short-circuits another.
    pub fn validate(&self, data: &ResumeData) -> Vec<ValidationResult> {
        self.settings
            .rules
            .iter()
            .map(|rule| match rule {
                RuleKind::ContactCompleteness => rules::contact_completeness(data),
                RuleKind::WorkExperience => rules::work_experience(data),
                RuleKind::Education => rules::education(data),
                RuleKind::Skills => rules::skills(data, self.settings.max_skills),
            })
            .collect()
    }

    pub fn report(&self, data: &ResumeData) -> ValidationReport {
        let results = self.validate(data);

        let total_weight: f64 = self.settings.rules.iter().map(|r| r.weight()).sum();
        let weighted: f64 = self
            .settings
            .rules
            .iter()
            .map(|r| r.weight() * rules::section_score(*r, data, self.settings.max_skills))
            .sum();
        let completeness_score = if total_weight > 0.0 {
            (weighted / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };

        ValidationReport {
            all_valid: results.iter().all(|r| r.is_valid),
            warning_count: results
                .iter()
                .filter(|r| !r.is_valid && r.severity == ValidationSeverity::Warning)
                .count(),
            completeness_score,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resume::{ContactInfo, Education, WorkExperience};

    fn complete_resume() -> ResumeData {
        ResumeData {
            contact: ContactInfo {
                name: Some("Jane Doe".to_string()),
                email: Some("jane@example.com".to_string()),
                phone: Some("+1 555 0100".to_string()),
                ..ContactInfo::default()
            },
            summary: None,
            experience: vec![WorkExperience {
                title: "Senior Engineer".to_string(),
                company: "Acme".to_string(),
                ..WorkExperience::default()
            }],
            education: vec![Education {
                institution: "TU Berlin".to_string(),
                ..Education::default()
            }],
            skills: vec!["Rust".to_string(), "PostgreSQL".to_string()],
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = RuleKind::ALL.iter().map(|r| r.weight()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_every_rule_runs_on_empty_resume() {
        let results = ResumeValidator::default().validate(&ResumeData::default());
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| !r.is_valid));
        assert!(results.iter().all(|r| !r.suggestions.is_empty()));
    }

    #[test]
    fn test_complete_resume_scores_full() {
        let report = ResumeValidator::default().report(&complete_resume());
        assert!(report.all_valid);
        assert_eq!(report.warning_count, 0);
        assert!((report.completeness_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_resume_score() {
        let mut data = complete_resume();
        data.education.clear();
        data.skills.clear();
        let report = ResumeValidator::default().report(&data);
        assert!(!report.all_valid);
        // contact 0.30 + experience 0.35
        assert!((report.completeness_score - 0.65).abs() < 1e-9);
        assert_eq!(report.warning_count, 1);
    }

    #[test]
    fn test_configured_rule_subset() {
        let validator = ResumeValidator::new(ValidationSettings {
            rules: vec![RuleKind::Skills],
            max_skills: 1,
        });
        let results = validator.validate(&complete_resume());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, RuleKind::Skills);
        assert!(!results[0].is_valid);
    }

    #[test]
    fn test_validation_does_not_mutate() {
        let data = complete_resume();
        let before = serde_json::to_value(&data).unwrap();
        ResumeValidator::default().report(&data);
        assert_eq!(serde_json::to_value(&data).unwrap(), before);
    }
}
