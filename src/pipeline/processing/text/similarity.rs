/// Scores how alike two strings are, from 0 (nothing shared) to 100 (identical)
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Edit-distance ratio: `100 * (1 - levenshtein / longer_length)`
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinRatio;

impl SimilarityScorer for LevenshteinRatio {
    fn score(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 100.0;
        }

        let len1 = a.chars().count();
        let len2 = b.chars().count();
        if len1 == 0 || len2 == 0 {
            return 0.0;
        }

        let max_len = len1.max(len2);
        let distance = levenshtein_distance(a, b);
        100.0 * (1.0 - distance as f64 / max_len as f64)
    }
}

/// Levenshtein distance over chars, two-row formulation
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let chars1: Vec<char> = s1.chars().collect();
    let chars2: Vec<char> = s2.chars().collect();

    let mut previous: Vec<usize> = (0..=chars2.len()).collect();
    let mut current = vec![0; chars2.len() + 1];

    for (i, c1) in chars1.iter().enumerate() {
        current[0] = i + 1;
        for (j, c2) in chars2.iter().enumerate() {
            let cost = if c1 == c2 { 0 } else { 1 };
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[chars2.len()]
}
