//! Applicant-supplied application data and submission validation.
//!
//! Validation is a pure function over the current field values producing a
//! field-name → message map; submission succeeds iff the map is empty. It is
//! re-run on every submission attempt and has no side effects on failure.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form application fields. Everything is optional at rest — the form
/// is saved incrementally — and `validate` decides what a complete
/// submission requires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationForm {
    pub name: Option<String>,
    pub preferred_name: Option<String>,
    pub gender: Option<String>,
    /// Code of conduct agreement.
    pub agree_conduct: bool,
    /// Data sharing agreement.
    pub agree_data: bool,
    /// Photo release agreement.
    pub agree_photos: bool,
    pub major: Option<String>,
    /// Year classification (freshman, sophomore, ...).
    pub classification: Option<String>,
    /// Expected graduation term.
    pub graduation_term: Option<String>,
    pub hackathons_attended: Option<u32>,
    /// How the applicant heard about the event.
    pub referrer: Option<String>,
    pub excited_about: Option<String>,
    pub website: Option<String>,
    pub dietary_restrictions: Option<Vec<String>>,
    pub resume_url: Option<String>,
}

/// Field-name → human-readable error map. `BTreeMap` keeps the output
/// deterministic for clients and tests.
pub type FieldErrors = BTreeMap<&'static str, String>;

fn missing(errors: &mut FieldErrors, field: &'static str, message: &str) {
    errors.insert(field, message.to_string());
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}

/// Minimal syntactic URL check: an http(s) scheme followed by a non-empty
/// host containing a dot. Deliberately permissive beyond that.
fn looks_like_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split('/').next().unwrap_or("");
            !host.is_empty() && host.contains('.') && !host.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Validate the form for submission.
///
/// Returns an empty map iff the application is complete enough to submit.
pub fn validate(form: &ApplicationForm) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if is_blank(&form.name) {
        missing(&mut errors, "name", "Please tell us your name.");
    }
    if is_blank(&form.preferred_name) {
        missing(
            &mut errors,
            "preferred_name",
            "Please tell us what to call you.",
        );
    }
    if form.gender.is_none() {
        missing(&mut errors, "gender", "Please select a gender option.");
    }
    if !form.agree_conduct {
        missing(
            &mut errors,
            "agree_conduct",
            "You must agree to the code of conduct.",
        );
    }
    if !form.agree_data {
        missing(
            &mut errors,
            "agree_data",
            "You must agree to the data sharing policy.",
        );
    }
    if !form.agree_photos {
        missing(
            &mut errors,
            "agree_photos",
            "You must agree to the photo release.",
        );
    }
    if is_blank(&form.major) {
        missing(&mut errors, "major", "Please tell us your major.");
    }
    if form.classification.is_none() {
        missing(
            &mut errors,
            "classification",
            "Please select your classification.",
        );
    }
    if form.graduation_term.is_none() {
        missing(
            &mut errors,
            "graduation_term",
            "Please select your expected graduation term.",
        );
    }
    if form.hackathons_attended.is_none() {
        missing(
            &mut errors,
            "hackathons_attended",
            "Please tell us how many hackathons you've attended.",
        );
    }
    if form.referrer.is_none() {
        missing(
            &mut errors,
            "referrer",
            "Please tell us how you heard about us.",
        );
    }
    if is_blank(&form.excited_about) {
        missing(
            &mut errors,
            "excited_about",
            "Please tell us what you're excited about.",
        );
    }
    if let Some(website) = form.website.as_deref() {
        if !website.trim().is_empty() && !looks_like_url(website.trim()) {
            missing(
                &mut errors,
                "website",
                "Website must be a valid http(s) URL.",
            );
        }
    }
    if form.dietary_restrictions.is_none() {
        missing(
            &mut errors,
            "dietary_restrictions",
            "Please select your dietary restrictions (or none).",
        );
    }

    errors
}
