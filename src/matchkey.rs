//! Fuzzy match-title parsing and canonical match key construction.
//!
//! The OCR'd title line is matched against an ordered list of patterns; the
//! first match wins. Keywords tolerate up to three character edits, and the
//! trailing ordinal may contain letters the OCR engine confuses with digits.

/// Letters that stand in for digits in OCR output.
fn is_ordinal_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, 'Z' | 'S' | 'O')
}

/// Substitute OCR-confusable letters back to their digit values and parse.
fn fix_digits(text: &str) -> Option<u32> {
    let fixed: String = text
        .chars()
        .map(|c| match c {
            'Z' => '2',
            'S' => '5',
            'O' => '0',
            other => other,
        })
        .collect();
    fixed.parse().ok()
}

/// Levenshtein (edit) distance: the minimum number of single-character
/// insertions, deletions, or substitutions to turn `a` into `b`.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }
    let mut prev_row: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr_row: Vec<usize> = vec![0; b_chars.len() + 1];
    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = if a_char == b_char { 0 } else { 1 };
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }
    prev_row[b_chars.len()]
}

/// Maximum keyword edit distance accepted by a pattern.
const MAX_EDITS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompLevel {
    Test,
    Practice,
    Qualification,
    Octofinal,
    Quarterfinal,
    Semifinal,
    Final,
    OvertimeFinal,
}

/// One fuzzy title pattern: a keyword phrase, the competition level it maps
/// to, and whether it names a tiebreaker match.
struct MatchIdPattern {
    keyword: &'static str,
    level: CompLevel,
    tiebreaker: bool,
    has_ordinal: bool,
}

impl MatchIdPattern {
    const fn new(keyword: &'static str, level: CompLevel, tiebreaker: bool) -> MatchIdPattern {
        MatchIdPattern {
            keyword,
            level,
            tiebreaker,
            has_ordinal: true,
        }
    }

    /// Match the title against this pattern: the leading words must be within
    /// MAX_EDITS of the keyword, and when the pattern captures an ordinal the
    /// next word must consist entirely of digit-like characters.
    /// Returns the raw ordinal text ("" for ordinal-less patterns).
    fn try_match<'a>(&self, title: &'a str) -> Option<&'a str> {
        let words: Vec<&str> = title.split_whitespace().collect();
        let nkeyword = self.keyword.split_whitespace().count();
        if words.len() < nkeyword {
            return None;
        }
        let head = words[..nkeyword].join(" ");
        if levenshtein(&head, self.keyword) > MAX_EDITS {
            return None;
        }
        if !self.has_ordinal {
            return Some("");
        }
        match words.get(nkeyword) {
            Some(word) if !word.is_empty() && word.chars().all(is_ordinal_char) => Some(word),
            _ => None,
        }
    }
}

/// Ordinal printed on the overlay -> (set, match) position in the bracket.
const QF_BRACKET_ELIM_MAPPING: [(u32, u32); 8] = [
    (1, 1),
    (2, 1),
    (3, 1),
    (4, 1),
    (1, 2),
    (2, 2),
    (3, 2),
    (4, 2),
];

const SF_BRACKET_ELIM_MAPPING: [(u32, u32); 4] = [(1, 1), (2, 1), (1, 2), (2, 2)];

fn qf_bracket(ordinal: u32) -> Option<(u32, u32)> {
    QF_BRACKET_ELIM_MAPPING
        .get(ordinal.checked_sub(1)? as usize)
        .copied()
}

fn sf_bracket(ordinal: u32) -> Option<(u32, u32)> {
    SF_BRACKET_ELIM_MAPPING
        .get(ordinal.checked_sub(1)? as usize)
        .copied()
}

/// Resolves an OCR'd match title to a canonical match key.
///
/// Patterns are evaluated strictly in list order and the first match wins;
/// the order encodes priority and must not be rearranged for a "better"
/// match. Unresolvable titles yield None, never an error.
pub struct MatchKeyResolver {
    patterns: Vec<MatchIdPattern>,
}

impl Default for MatchKeyResolver {
    fn default() -> Self {
        MatchKeyResolver::new()
    }
}

impl MatchKeyResolver {
    pub fn new() -> MatchKeyResolver {
        use CompLevel::*;
        let patterns = vec![
            MatchIdPattern {
                keyword: "Test Match",
                level: Test,
                tiebreaker: false,
                has_ordinal: false,
            },
            MatchIdPattern::new("Practice", Practice, false),
            MatchIdPattern::new("Qualification", Qualification, false),
            MatchIdPattern::new("Octofinal", Octofinal, false),
            MatchIdPattern::new("Octofinal Tiebreaker", Octofinal, true),
            MatchIdPattern::new("Quarterfinal", Quarterfinal, false),
            MatchIdPattern::new("Quarterfinal Tiebreaker", Quarterfinal, true),
            MatchIdPattern::new("Semifinal", Semifinal, false),
            MatchIdPattern::new("Semifinal Tiebreaker", Semifinal, true),
            MatchIdPattern::new("Final", Final, false),
            MatchIdPattern::new("Overtime", OvertimeFinal, false),
            // Einstein round titles alias onto the semifinal/final levels.
            MatchIdPattern::new("Einstein", Semifinal, false),
            MatchIdPattern::new("Einstein Final", Final, false),
            MatchIdPattern::new("Einstein Final Tiebreaker", Final, true),
        ];
        MatchKeyResolver { patterns }
    }

    /// Resolve a raw title to a canonical match key, or None when no pattern
    /// matches (or the ordinal falls outside its bracket table).
    pub fn resolve(&self, raw_title: &str) -> Option<String> {
        for pattern in &self.patterns {
            let ordinal_text = match pattern.try_match(raw_title) {
                Some(text) => text,
                None => continue,
            };
            return self.build_key(pattern, ordinal_text);
        }
        None
    }

    fn build_key(&self, pattern: &MatchIdPattern, ordinal_text: &str) -> Option<String> {
        use CompLevel::*;
        if pattern.level == Test {
            return Some("test".to_string());
        }
        let ordinal = fix_digits(ordinal_text)?;
        match pattern.level {
            Practice => Some(format!("pm{}", ordinal)),
            Qualification => Some(format!("qm{}", ordinal)),
            // TODO: route octofinals through a bracket table once one exists
            Octofinal => Some(format!("ef{}", ordinal)),
            Quarterfinal => {
                let (set, mut m) = qf_bracket(ordinal)?;
                if pattern.tiebreaker {
                    m = 3;
                }
                Some(format!("qf{}m{}", set, m))
            }
            Semifinal => {
                let (set, mut m) = sf_bracket(ordinal)?;
                if pattern.tiebreaker {
                    m = 3;
                }
                Some(format!("sf{}m{}", set, m))
            }
            Final => Some(format!("f1m{}", ordinal)),
            OvertimeFinal => Some(format!("f1m{}", ordinal + 3)),
            Test => unreachable!(),
        }
    }
}
