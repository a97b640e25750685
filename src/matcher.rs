use nucleo_matcher::pattern::{CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Matcher, Utf32Str};

/// Approximate substring similarity, a whole number in `[0, 100]`.
///
/// The shorter string is compared against every window of the longer one of
/// the same length, using the normalized Indel similarity
/// `200 * lcs / (len_a + len_b)`; the best window wins. The result is rounded
/// half-to-even, so 90.47 scores 90.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };

    if short.is_empty() {
        return 0.0;
    }

    let window = short.len();
    let mut best = 0.0;
    for start in 0..=(long.len() - window) {
        let score = ratio(short, &long[start..start + window]);
        if score > best {
            best = score;
            if best >= 100.0 {
                break;
            }
        }
    }
    best.round_ties_even()
}

fn ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(a, b) as f64 / total as f64
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diagonal = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Case-insensitive fuzzy filter used by search. An empty filter matches everything.
pub fn fuzzy_matches(filter: &str, name: &str, threshold: f64) -> bool {
    if filter.is_empty() {
        return true;
    }
    partial_ratio(&filter.to_lowercase(), &name.to_lowercase()) > threshold
}

/// Ranks completion candidates for the search bar.
pub struct FuzzyMatcher {
    matcher: Matcher,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FuzzyMatcher {
    pub fn new() -> Self {
        Self {
            matcher: Matcher::new(nucleo_matcher::Config::DEFAULT),
        }
    }

    /// Best-scoring candidates first; ties keep their input order.
    pub fn rank<'a, I>(&mut self, query: &str, candidates: I) -> Vec<(&'a str, u32)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let pattern = Pattern::parse(query, CaseMatching::Ignore, Normalization::Smart);
        let mut buf = Vec::new();

        let mut scored: Vec<(&str, u32)> = candidates
            .into_iter()
            .filter_map(|candidate| {
                let haystack = Utf32Str::new(candidate, &mut buf);
                pattern.score(haystack, &mut self.matcher).map(|score| (candidate, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored
    }
}
