//! String similarity helpers

/// Levenshtein edit distance counted in characters
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Edit-distance similarity between two strings, `1 - distance / max_len`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Similarity {
    pub distance: usize,
    pub max_len: usize,
}

impl Similarity {
    /// Compare two strings; `None` when either side is empty
    pub fn between(a: &str, b: &str) -> Option<Self> {
        if a.is_empty() || b.is_empty() {
            return None;
        }

        Some(Self {
            distance: levenshtein(a, b),
            max_len: a.chars().count().max(b.chars().count()),
        })
    }

    /// Similarity in `[0.0, 1.0]`
    pub fn ratio(&self) -> f64 {
        1.0 - self.distance as f64 / self.max_len as f64
    }

    /// Whether the similarity is at least `percent` / 100, compared exactly
    pub fn at_least(&self, percent: usize) -> bool {
        (self.max_len - self.distance) * 100 >= percent * self.max_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_levenshtein_counts_characters() {
        // Cyrillic letters are multi-byte but single edits
        assert_eq!(levenshtein("маркет", "маркот"), 1);
    }

    #[test]
    fn test_similarity_ratio() {
        assert_eq!(Similarity::between("acme", "acme").unwrap().ratio(), 1.0);
        assert_eq!(Similarity::between("abcd", "abcx").unwrap().ratio(), 0.75);
        assert!(Similarity::between("", "acme").is_none());
    }

    #[test]
    fn test_at_least_is_exact_on_boundaries() {
        // one edit in five characters is exactly 0.8
        let sim = Similarity::between("acme1", "acme2").unwrap();
        assert!(sim.at_least(80));
        assert!(!sim.at_least(81));
    }
}
