//! Presentation-label lookups for formats and categories. Pure tables,
//! no logic; the UI layer picks the language tag.

use serde::{Deserialize, Serialize};

use crate::export::FormatTag;
use crate::models::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    English,
    French,
}

impl Language {
    /// Parse a BCP-47-ish tag, defaulting to English for anything unknown.
    pub fn from_tag(tag: &str) -> Self {
        match tag.split(['-', '_']).next().unwrap_or("") {
            "fr" => Language::French,
            _ => Language::English,
        }
    }
}

/// Display name for an export format.
pub fn get_export_format_name(format: FormatTag, language: Language) -> &'static str {
    match (format, language) {
        (FormatTag::StructuredBackup, Language::English) => "Structured Backup",
        (FormatTag::StructuredBackup, Language::French) => "Sauvegarde structurée",
        (FormatTag::TabularExtract, Language::English) => "Tabular Extract",
        (FormatTag::TabularExtract, Language::French) => "Extrait tabulaire",
        (FormatTag::ClinicalDocument, Language::English) => "Clinical Document",
        (FormatTag::ClinicalDocument, Language::French) => "Document clinique",
        (FormatTag::InteropBundle, Language::English) => "Interoperability Bundle",
        (FormatTag::InteropBundle, Language::French) => "Paquet d'interopérabilité",
    }
}

/// Display name for a record category.
pub fn get_category_name(category: Category, language: Language) -> &'static str {
    match (category, language) {
        (Category::Profile, Language::English) => "Profile",
        (Category::Profile, Language::French) => "Profil",
        (Category::Labs, Language::English) => "Lab Results",
        (Category::Labs, Language::French) => "Résultats de laboratoire",
        (Category::Medications, Language::English) => "Medications",
        (Category::Medications, Language::French) => "Médicaments",
        (Category::Conditions, Language::English) => "Conditions",
        (Category::Conditions, Language::French) => "Diagnostics",
        (Category::Procedures, Language::English) => "Procedures",
        (Category::Procedures, Language::French) => "Interventions",
        (Category::Allergies, Language::English) => "Allergies",
        (Category::Allergies, Language::French) => "Allergies",
        (Category::Immunizations, Language::English) => "Immunizations",
        (Category::Immunizations, Language::French) => "Vaccinations",
        (Category::Vitals, Language::English) => "Vital Signs",
        (Category::Vitals, Language::French) => "Signes vitaux",
        (Category::Imaging, Language::English) => "Imaging Studies",
        (Category::Imaging, Language::French) => "Imagerie médicale",
        (Category::Timeline, Language::English) => "Timeline Events",
        (Category::Timeline, Language::French) => "Chronologie",
        (Category::Notes, Language::English) => "Notes",
        (Category::Notes, Language::French) => "Notes",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tag_parsing() {
        assert_eq!(Language::from_tag("fr"), Language::French);
        assert_eq!(Language::from_tag("fr-CA"), Language::French);
        assert_eq!(Language::from_tag("en-US"), Language::English);
        assert_eq!(Language::from_tag("de"), Language::English);
        assert_eq!(Language::from_tag(""), Language::English);
    }

    #[test]
    fn every_category_has_labels_in_both_languages() {
        for category in Category::ALL {
            assert!(!get_category_name(category, Language::English).is_empty());
            assert!(!get_category_name(category, Language::French).is_empty());
        }
    }

    #[test]
    fn format_names_localized() {
        assert_eq!(
            get_export_format_name(FormatTag::StructuredBackup, Language::French),
            "Sauvegarde structurée"
        );
        assert_eq!(
            get_export_format_name(FormatTag::TabularExtract, Language::English),
            "Tabular Extract"
        );
    }
}
