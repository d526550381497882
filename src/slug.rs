//! URL-safe slugs for map titles.

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Converts free text into a lowercase, hyphen-separated slug.
///
/// Accents are stripped through NFD decomposition, every character that is not an
/// ASCII letter, digit, underscore, whitespace or hyphen is dropped, and runs of
/// whitespace, underscores and hyphens collapse into a single hyphen.
pub fn slugify(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();

    let mut slug = String::with_capacity(cleaned.len());
    let mut pending_separator = false;
    for c in cleaned.chars() {
        if c.is_whitespace() || c == '_' || c == '-' {
            pending_separator = true;
            continue;
        }
        if pending_separator && !slug.is_empty() {
            slug.push('-');
        }
        pending_separator = false;
        slug.push(c);
    }
    slug
}

/// A slug is URL-safe when slugifying it is a no-op and it is not empty.
pub fn is_url_safe(slug: &str) -> bool {
    !slug.is_empty() && slugify(slug) == slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_and_dashes_are_dropped() {
        assert_eq!(slugify("Downtown Tour — 2024!"), "downtown-tour-2024");
    }

    #[test]
    fn accents_are_stripped() {
        assert_eq!(slugify("Carte de Lille Métropole"), "carte-de-lille-metropole");
        assert_eq!(slugify("Île-de-France"), "ile-de-france");
    }

    #[test]
    fn separators_collapse_and_edges_are_trimmed() {
        assert_eq!(slugify("  --Hello__World  -- "), "hello-world");
    }

    #[test]
    fn symbols_only_yield_empty_slug() {
        assert_eq!(slugify("!!! ???"), "");
        assert!(!is_url_safe(""));
    }

    #[test]
    fn url_safety_check() {
        assert!(is_url_safe("roubaix-2024"));
        assert!(!is_url_safe("Roubaix 2024"));
        assert!(!is_url_safe("-roubaix"));
    }
}
