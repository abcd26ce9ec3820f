//! Google-style search strings
//!
//! ```text
//! word1 word2        both words
//! word1 OR word2     either word
//! "word1 word2"      the phrase
//! -word1             not the word
//! ```
//!
//! `OR` is greedy: `a b OR c d` means a, then (b or c), then d.

use super::clauses::{clean_pattern, or_clause};

/// Parsed search. Each good group needs at least one match; no bad may
/// match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoogleSearch {
    pub goods: Vec<Vec<String>>,
    pub bads: Vec<String>,
}

impl GoogleSearch {
    pub fn is_blank(&self) -> bool {
        self.goods.is_empty() && self.bads.is_empty()
    }
}

static_regex!(bad_phrase_re, r#"^-"([^"]+)"( |$)"#);
static_regex!(bad_word_re, r"^-(\S+)( |$)");
static_regex!(good_group_re, r#"^(("[^"]+"|\S+)( OR ("[^"]+"|\S+))*)( |$)"#);
static_regex!(or_phrase_re, r#"^"([^"]+)"( OR |$)"#);
static_regex!(or_word_re, r"^(\S+)( OR |$)");

pub fn google_parse(pattern: &str) -> GoogleSearch {
    let mut search = GoogleSearch::default();
    let squeezed = pattern.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut rest = squeezed.as_str();

    while !rest.is_empty() {
        if let Some(caps) = bad_phrase_re()
            .captures(rest)
            .or_else(|| bad_word_re().captures(rest))
        {
            search.bads.push(caps[1].to_string());
            rest = &rest[caps[0].len()..];
        } else if let Some(caps) = good_group_re().captures(rest) {
            let mut group = &caps[1];
            let mut alternatives = Vec::new();
            while let Some(alt) = or_phrase_re()
                .captures(group)
                .or_else(|| or_word_re().captures(group))
            {
                alternatives.push(alt[1].to_string());
                group = &group[alt[0].len()..];
                if group.is_empty() {
                    break;
                }
            }
            search.goods.push(alternatives);
            rest = &rest[caps[0].len()..];
        } else {
            break;
        }
    }
    search
}

/// One AND-joined condition describing `search` against `field`. Empty
/// when the search is blank.
pub fn google_conditions(search: &GoogleSearch, field: &str) -> String {
    let mut ands: Vec<String> = search
        .goods
        .iter()
        .map(|good| {
            let alternatives: Vec<String> = good
                .iter()
                .map(|s| format!("{} LIKE '%{}%'", field, clean_pattern(s)))
                .collect();
            or_clause(&alternatives)
        })
        .collect();
    ands.extend(
        search
            .bads
            .iter()
            .map(|bad| format!("{} NOT LIKE '%{}%'", field, clean_pattern(bad))),
    );
    ands.join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_is_greedy() {
        let search = google_parse("a b OR c d");
        assert_eq!(
            search.goods,
            vec![vec!["a".to_string()], vec!["b".into(), "c".into()], vec!["d".to_string()]]
        );
        assert!(search.bads.is_empty());
    }

    #[test]
    fn test_phrases_and_negation() {
        let search = google_parse(r#"agaricus OR amanita -amanitarita -"deadly poison" "big cap""#);
        assert_eq!(
            search.goods,
            vec![vec!["agaricus".to_string(), "amanita".into()], vec!["big cap".to_string()]]
        );
        assert_eq!(search.bads, vec!["amanitarita".to_string(), "deadly poison".into()]);
    }

    #[test]
    fn test_blank() {
        assert!(google_parse("   ").is_blank());
    }

    #[test]
    fn test_conditions() {
        let search = google_parse("foo OR bar* -baz");
        assert_eq!(
            google_conditions(&search, "observations.notes"),
            "(observations.notes LIKE '%foo%' OR observations.notes LIKE '%bar%%') \
             AND observations.notes NOT LIKE '%baz%'"
        );
        assert_eq!(google_conditions(&GoogleSearch::default(), "x"), "");
    }
}
