use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::resume::{is_present, ResumeData};
use crate::validation::{RuleKind, ValidationResult, ValidationSeverity};

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[A-Za-z]{2,}$").expect("valid regex"));

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email.trim())
}

/// Name, e-mail and phone presence, plus e-mail shape.
pub fn contact_completeness(data: &ResumeData) -> ValidationResult {
    let contact = &data.contact;
    let mut missing = Vec::new();
    let mut suggestions = Vec::new();

    if !is_present(&contact.name) {
        missing.push("name");
        suggestions.push("Add your full name at the top of the resume".to_string());
    }
    if !is_present(&contact.email) {
        missing.push("email");
        suggestions.push("Add an e-mail address recruiters can reach you at".to_string());
    }
    if !is_present(&contact.phone) {
        missing.push("phone");
        suggestions.push("Add a phone number".to_string());
    }

    let malformed_email = contact
        .email
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .is_some_and(|e| !is_valid_email(e));
    if malformed_email {
        suggestions.push("Check the e-mail address; it does not look valid".to_string());
    }

    if missing.is_empty() && !malformed_email {
        return ValidationResult::valid(RuleKind::ContactCompleteness, "Contact information is complete");
    }

    let severity = if malformed_email || missing.iter().any(|f| *f == "name" || *f == "email") {
        ValidationSeverity::Warning
    } else {
        ValidationSeverity::Info
    };
    let message = match (missing.is_empty(), malformed_email) {
        (true, _) => "E-mail address is malformed".to_string(),
        (false, false) => format!("Missing contact fields: {}", missing.join(", ")),
        (false, true) => format!("Missing contact fields: {}; e-mail address is malformed", missing.join(", ")),
    };
    ValidationResult::invalid(RuleKind::ContactCompleteness, severity, message, suggestions)
}

/// At least one position, each with a title and a company.
pub fn work_experience(data: &ResumeData) -> ValidationResult {
    if data.experience.is_empty() {
        return ValidationResult::invalid(
            RuleKind::WorkExperience,
            ValidationSeverity::Warning,
            "No work experience found",
            vec!["Add at least one position with title, company and dates".to_string()],
        );
    }

    let incomplete: Vec<usize> = data
        .experience
        .iter()
        .enumerate()
        .filter(|(_, e)| e.title.trim().is_empty() || e.company.trim().is_empty())
        .map(|(i, _)| i + 1)
        .collect();

    if incomplete.is_empty() {
        return ValidationResult::valid(
            RuleKind::WorkExperience,
            format!("{} position(s) with title and company", data.experience.len()),
        );
    }

    let positions = incomplete
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    ValidationResult::invalid(
        RuleKind::WorkExperience,
        ValidationSeverity::Warning,
        format!("{} position(s) lack a title or company", incomplete.len()),
        vec![format!("Fill in the job title and company for position(s) {positions}")],
    )
}

pub fn education(data: &ResumeData) -> ValidationResult {
    if data.education.iter().any(|e| !e.institution.trim().is_empty()) {
        return ValidationResult::valid(RuleKind::Education, "Education section present");
    }
    ValidationResult::invalid(
        RuleKind::Education,
        ValidationSeverity::Info,
        "No education found",
        vec!["Add your degree, institution and graduation year if relevant to the role".to_string()],
    )
}

/// Empty skill lists are a problem; very long ones are usually extraction noise.
pub fn skills(data: &ResumeData, max_skills: usize) -> ValidationResult {
    let count = data.skills.iter().filter(|s| !s.trim().is_empty()).count();
    if count == 0 {
        return ValidationResult::invalid(
            RuleKind::Skills,
            ValidationSeverity::Warning,
            "No skills listed",
            vec!["Add a skills section with the tools and technologies you use".to_string()],
        );
    }
    if count > max_skills {
        return ValidationResult::invalid(
            RuleKind::Skills,
            ValidationSeverity::Warning,
            format!("{count} skills listed; more than {max_skills} usually means extraction noise"),
            vec![format!("Keep the {max_skills} most relevant skills and remove fragments")],
        );
    }
    ValidationResult::valid(RuleKind::Skills, format!("{count} skill(s) listed"))
}

/// Section score in 0.0 – 1.0 used by the weighted completeness score.
pub fn section_score(rule: RuleKind, data: &ResumeData, max_skills: usize) -> f64 {
    match rule {
        RuleKind::ContactCompleteness => {
            let contact = &data.contact;
            let email_ok = contact.email.as_deref().is_some_and(is_valid_email);
            let present = [is_present(&contact.name), email_ok, is_present(&contact.phone)];
            present.iter().filter(|p| **p).count() as f64 / present.len() as f64
        }
        RuleKind::WorkExperience => {
            if data.experience.is_empty() {
                return 0.0;
            }
            let complete = data
                .experience
                .iter()
                .filter(|e| !e.title.trim().is_empty() && !e.company.trim().is_empty())
                .count();
            complete as f64 / data.experience.len() as f64
        }
        RuleKind::Education => {
            if data.education.iter().any(|e| !e.institution.trim().is_empty()) {
                1.0
            } else {
                0.0
            }
        }
        RuleKind::Skills => match data.skills.iter().filter(|s| !s.trim().is_empty()).count() {
            0 => 0.0,
            n if n > max_skills => 0.5,
            _ => 1.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resume::{ContactInfo, WorkExperience};

    fn contact(name: Option<&str>, email: Option<&str>, phone: Option<&str>) -> ResumeData {
        ResumeData {
            contact: ContactInfo {
                name: name.map(str::to_string),
                email: email.map(str::to_string),
                phone: phone.map(str::to_string),
                ..ContactInfo::default()
            },
            ..ResumeData::default()
        }
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("jane.doe@example.com"));
        assert!(is_valid_email(" jane@mail.co.uk "));
        assert!(!is_valid_email("jane@localhost"));
        assert!(!is_valid_email("jane at example.com"));
    }

    #[test]
    fn test_contact_complete() {
        let r = contact_completeness(&contact(Some("Jane Doe"), Some("jane@example.com"), Some("+1 555 0100")));
        assert!(r.is_valid);
        assert!(r.suggestions.is_empty());
    }

    #[test]
    fn test_missing_phone_is_info() {
        let r = contact_completeness(&contact(Some("Jane Doe"), Some("jane@example.com"), None));
        assert!(!r.is_valid);
        assert_eq!(r.severity, ValidationSeverity::Info);
        assert!(r.message.contains("phone"));
    }

    #[test]
    fn test_missing_email_is_warning() {
        let r = contact_completeness(&contact(Some("Jane Doe"), Some("  "), Some("555")));
        assert_eq!(r.severity, ValidationSeverity::Warning);
        assert!(r.message.contains("email"));
    }

    #[test]
    fn test_malformed_email_flagged() {
        let r = contact_completeness(&contact(Some("Jane"), Some("jane@@example"), Some("555")));
        assert!(!r.is_valid);
        assert_eq!(r.message, "E-mail address is malformed");
    }

    #[test]
    fn test_experience_requires_title_and_company() {
        let mut data = ResumeData::default();
        assert!(!work_experience(&data).is_valid);

        data.experience = vec![
            WorkExperience {
                title: "Engineer".to_string(),
                company: "Acme".to_string(),
                ..WorkExperience::default()
            },
            WorkExperience {
                title: "Intern".to_string(),
                ..WorkExperience::default()
            },
        ];
        let r = work_experience(&data);
        assert!(!r.is_valid);
        assert!(r.suggestions[0].contains("position(s) 2"));
        assert!((section_score(RuleKind::WorkExperience, &data, 100) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_skills_bounds() {
        let mut data = ResumeData::default();
        assert!(!skills(&data, 100).is_valid);

        data.skills = vec!["Rust".to_string(), "SQL".to_string()];
        assert!(skills(&data, 100).is_valid);

        data.skills = (0..101).map(|i| format!("skill{i}")).collect();
        let r = skills(&data, 100);
        assert!(!r.is_valid);
        assert!(r.message.contains("noise"));
        assert_eq!(section_score(RuleKind::Skills, &data, 100), 0.5);
    }

    #[test]
    fn test_education_is_info() {
        let r = education(&ResumeData::default());
        assert_eq!(r.severity, ValidationSeverity::Info);
        assert!(!r.is_valid);
    }
}
