//! Regex-matches a query against per-category pattern sets to decide
//! whether it must stay local and how sensitive it is.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    Public,
    Sensitive,
    Private,
    Confidential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyCategory {
    None,
    Ssn,
    CreditCard,
    Password,
    MedicalInfo,
    FinancialAccount,
    PersonalAddress,
    Biometric,
}

fn category_level(category: PrivacyCategory) -> PrivacyLevel {
    use PrivacyCategory::*;
    match category {
        None => PrivacyLevel::Public,
        Ssn | CreditCard | Biometric => PrivacyLevel::Confidential,
        Password | FinancialAccount | MedicalInfo => PrivacyLevel::Private,
        PersonalAddress => PrivacyLevel::Sensitive,
    }
}

fn patterns() -> &'static HashMap<PrivacyCategory, Vec<Regex>> {
    static PATTERNS: OnceLock<HashMap<PrivacyCategory, Vec<Regex>>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let mut map: HashMap<PrivacyCategory, Vec<Regex>> = HashMap::new();
        map.insert(
            PrivacyCategory::Ssn,
            vec![Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap()],
        );
        map.insert(
            PrivacyCategory::CreditCard,
            vec![
                Regex::new(r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b").unwrap(),
                Regex::new(r"(?i)\bcard number\b").unwrap(),
            ],
        );
        map.insert(
            PrivacyCategory::Password,
            vec![Regex::new(r"(?i)\b(password|passcode|pin code)\b").unwrap()],
        );
        map.insert(
            PrivacyCategory::MedicalInfo,
            vec![Regex::new(
                r"(?i)\b(diagnosis|prescription|medical record|hiv|cancer|therapy session)\b",
            )
            .unwrap()],
        );
        map.insert(
            PrivacyCategory::FinancialAccount,
            vec![Regex::new(r"(?i)\b(bank account|routing number|account balance|iban)\b").unwrap()],
        );
        map.insert(
            PrivacyCategory::PersonalAddress,
            vec![Regex::new(
                r"(?i)\b\d{1,5}\s+\w+(\s\w+){0,3}\s(street|st|avenue|ave|road|rd|drive|dr|lane|ln)\b",
            )
            .unwrap()],
        );
        map.insert(
            PrivacyCategory::Biometric,
            vec![Regex::new(r"(?i)\b(fingerprint|retina scan|facial recognition|dna sample)\b").unwrap()],
        );
        map
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyClassification {
    pub level: PrivacyLevel,
    pub categories: Vec<PrivacyCategory>,
    pub confidence: f64,
    pub should_stay_local: bool,
    pub reason: String,
}

pub struct PrivacyClassifier {
    strict_mode: bool,
}

impl Default for PrivacyClassifier {
    fn default() -> Self {
        Self { strict_mode: false }
    }
}

impl PrivacyClassifier {
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    pub fn classify(&self, query: &str) -> PrivacyClassification {
        let mut matched_categories: Vec<PrivacyCategory> = Vec::new();
        let mut total_matches = 0usize;

        for (category, patterns) in patterns() {
            let matches: usize = patterns.iter().filter(|re| re.is_match(query)).count();
            if matches > 0 {
                matched_categories.push(*category);
                total_matches += matches;
            }
        }

        let level = matched_categories
            .iter()
            .map(|c| category_level(*c))
            .max()
            .unwrap_or(PrivacyLevel::Public);

        let confidence = if matched_categories.is_empty() {
            0.0
        } else {
            (0.5 + 0.1 * total_matches as f64).min(0.95)
        };

        let should_stay_local = self.is_sensitive(level)
            && (matches!(level, PrivacyLevel::Private | PrivacyLevel::Confidential)
                || (self.strict_mode && level == PrivacyLevel::Sensitive));

        let reason = if matched_categories.is_empty() {
            "no sensitive patterns detected".to_string()
        } else {
            format!(
                "matched categories: {matched_categories:?}, level={level:?}"
            )
        };

        PrivacyClassification {
            level,
            categories: matched_categories,
            confidence,
            should_stay_local,
            reason,
        }
    }

    fn is_sensitive(&self, level: PrivacyLevel) -> bool {
        level != PrivacyLevel::Public
    }

    pub fn must_stay_local(&self, query: &str) -> bool {
        self.classify(query).should_stay_local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssn_is_confidential_and_stays_local() {
        let classifier = PrivacyClassifier::default();
        let result = classifier.classify("My SSN is 123-45-6789");
        assert_eq!(result.level, PrivacyLevel::Confidential);
        assert!(result.should_stay_local);
    }

    #[test]
    fn plain_query_is_public() {
        let classifier = PrivacyClassifier::default();
        let result = classifier.classify("What is the capital of France?");
        assert_eq!(result.level, PrivacyLevel::Public);
        assert!(!result.should_stay_local);
    }

    #[test]
    fn strict_mode_forces_sensitive_local() {
        let classifier = PrivacyClassifier::new(true);
        let result = classifier.classify("My address is 123 Main Street");
        assert_eq!(result.level, PrivacyLevel::Sensitive);
        assert!(result.should_stay_local);
    }
}
