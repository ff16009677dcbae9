//! Deterministic cache key derivation.
//!
//! A stable catalog id is always preferred; titles only back the key when the
//! host cannot supply one. Tests (and the persistent store) rely on this
//! derivation never changing, so it is spelled out here rather than reusing
//! whatever hash the standard library happens to ship.

use crate::types::TrailerQuery;

/// Lowercase, fold Latin diacritics to ASCII, drop punctuation, collapse
/// whitespace. `"Amélie: Le Fabuleux Destin"` -> `"amelie le fabuleux destin"`.
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_was_space = true;
    for ch in title.chars() {
        for folded in fold_char(ch) {
            if folded.is_alphanumeric() {
                out.extend(folded.to_lowercase());
                last_was_space = false;
            } else if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Tokens of the normalized title, for containment checks.
pub fn title_tokens(title: &str) -> Vec<String> {
    normalize_title(title)
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

/// Derive the store key for a query: `cat:<catalog id>` when available, else
/// a normalized-title hash qualified by year and kind so remakes and series
/// adaptations do not collide.
pub fn derive_key(query: &TrailerQuery) -> String {
    if let Some(id) = &query.catalog_id {
        return format!("cat:{id}");
    }
    let normalized = normalize_title(&query.title);
    let year = query
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "x".to_string());
    let kind = if query.is_series { "tv" } else { "mv" };
    format!("ttl:{:016x}:{year}:{kind}", fnv1a64(normalized.as_bytes()))
}

/// FNV-1a, 64-bit. Small, dependency-free, and stable across releases.
fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Fold one character to its ASCII base form where a common Latin mapping
/// exists; other characters pass through unchanged.
fn fold_char(ch: char) -> impl Iterator<Item = char> {
    let folded: &'static str = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "a",
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => "i",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => "o",
        'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => "u",
        'ý' | 'ÿ' | 'Ý' => "y",
        'ñ' | 'Ñ' => "n",
        'ç' | 'Ç' => "c",
        'ß' => "ss",
        'æ' | 'Æ' => "ae",
        'œ' | 'Œ' => "oe",
        _ => return Fold::Keep(ch),
    };
    Fold::Mapped(folded.chars())
}

enum Fold {
    Keep(char),
    Mapped(std::str::Chars<'static>),
}

impl Iterator for Fold {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        match self {
            Fold::Keep(ch) => {
                let ch = *ch;
                *self = Fold::Mapped("".chars());
                Some(ch)
            }
            Fold::Mapped(chars) => chars.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_folds_case_punctuation_and_diacritics() {
        assert_eq!(
            normalize_title("Amélie: Le Fabuleux   Destin!"),
            "amelie le fabuleux destin"
        );
        assert_eq!(normalize_title("WALL·E"), "wall e");
    }

    #[test]
    fn catalog_id_wins_over_title() {
        let query = TrailerQuery::movie("Heat").with_catalog_id("tmdb:949");
        assert_eq!(derive_key(&query), "cat:tmdb:949");
    }

    #[test]
    fn title_keys_are_stable_and_year_qualified() {
        let a = TrailerQuery::movie("Heat").with_year(1995);
        let b = TrailerQuery::movie("HEAT!").with_year(1995);
        let c = TrailerQuery::movie("Heat").with_year(2024);

        assert_eq!(derive_key(&a), derive_key(&b));
        assert_ne!(derive_key(&a), derive_key(&c));
    }

    #[test]
    fn series_and_movie_keys_differ() {
        let movie = TrailerQuery::movie("Fargo").with_year(1996);
        let mut series = TrailerQuery::movie("Fargo").with_year(1996);
        series.is_series = true;
        assert_ne!(derive_key(&movie), derive_key(&series));
    }
}
