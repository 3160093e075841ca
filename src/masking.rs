//! Redaction of personal and payment identifiers before they reach logs.

use regex::Regex;
use std::sync::LazyLock;

static CPF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{3})\.([0-9]{3})\.([0-9]{3})-([0-9]{2})$").expect("valid CPF pattern")
});

static CNPJ_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{2})\.([0-9]{3})\.([0-9]{3})/([0-9]{4})-([0-9]{2})$").expect("valid CNPJ pattern")
});

static CARD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"^([0-9]{4})([0-9]{4})([0-9]{4})([0-9]{4})$").expect("valid card pattern")
    });

/// Returns a partially redacted copy of `data` when it matches a known format.
///
/// - punctuated CPF `123.456.789-00` becomes `123.XXX.XXX-XX`
/// - punctuated CNPJ `12.345.678/0001-00` becomes `12.XXX.XXX/XXXX-XX`
/// - a 16-digit card number (whitespace ignored) becomes `1234-XXXX-XXXX-3456`
///
/// Anything else is returned unchanged.
pub fn mask_sensitive_data(data: &str) -> String {
    if CPF_PATTERN.is_match(data) {
        return CPF_PATTERN.replace(data, "$1.XXX.XXX-XX").into_owned();
    }

    if CNPJ_PATTERN.is_match(data) {
        return CNPJ_PATTERN
            .replace(data, "$1.XXX.XXX/XXXX-XX")
            .into_owned();
    }

    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    if CARD_PATTERN.is_match(&compact) {
        return CARD_PATTERN
            .replace(&compact, "$1-XXXX-XXXX-$4")
            .into_owned();
    }

    data.to_string()
}

/// Same as [`mask_sensitive_data`], passing `None` through.
pub fn mask_optional(data: Option<&str>) -> Option<String> {
    data.map(mask_sensitive_data)
}

/// Masks a CPF/CNPJ for the audit trail.
///
/// Bare 11-digit CPFs and 14-digit CNPJs are punctuated first so the stored
/// value is always redacted, whatever form the seller typed.
pub fn mask_document(document: &str) -> String {
    let trimmed = document.trim();
    let all_digits = !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit());

    if all_digits && trimmed.len() == 11 {
        return mask_sensitive_data(&format_cpf(trimmed));
    }
    if all_digits && trimmed.len() == 14 {
        return mask_sensitive_data(&format_cnpj(trimmed));
    }

    mask_sensitive_data(trimmed)
}

/// Keeps only the ASCII digits of a document.
pub fn document_digits(document: &str) -> String {
    document.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn format_cpf(digits: &str) -> String {
    format!(
        "{}.{}.{}-{}",
        &digits[0..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..11]
    )
}

fn format_cnpj(digits: &str) -> String {
    format!(
        "{}.{}.{}/{}-{}",
        &digits[0..2],
        &digits[2..5],
        &digits[5..8],
        &digits[8..12],
        &digits[12..14]
    )
}
