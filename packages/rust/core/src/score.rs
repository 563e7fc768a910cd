//! Heuristic scores derived from analysis metrics.

use redraft_shared::{Metrics, Scores};

/// Title lengths (in characters) that carry no SEO penalty.
pub const TITLE_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 20..=65;

/// Below this word count the document is considered thin.
pub const MIN_WORDS: usize = 250;

/// Above this word count the document is considered long for readers.
pub const MAX_WORDS: usize = 1600;

/// Score the metrics. Each deduction applies at most once; results stay in `0..=100`.
pub fn score(metrics: &Metrics) -> Scores {
    let mut seo: i64 = 100;
    if !TITLE_LENGTH_RANGE.contains(&metrics.title_length) {
        seo -= 15;
    }
    if metrics.word_count < MIN_WORDS {
        seo -= 10;
    }
    if metrics.headings_count == 0 {
        seo -= 15;
    }

    let missing = i64::try_from(metrics.missing_alt_count).unwrap_or(i64::MAX);
    let a11y = 100 - missing.saturating_mul(10).min(40);

    let mut ux: i64 = 100;
    if metrics.word_count > MAX_WORDS {
        ux -= 10;
    }
    if metrics.headings_count < 2 {
        ux -= 10;
    }

    Scores {
        seo: clamp(seo),
        a11y: clamp(a11y),
        ux: clamp(ux),
    }
}

fn clamp(value: i64) -> u32 {
    value.clamp(0, 100) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Metrics with no deduction triggered.
    fn healthy() -> Metrics {
        Metrics {
            title_length: 40,
            word_count: 800,
            headings_count: 3,
            ..Metrics::default()
        }
    }

    #[test]
    fn healthy_document_scores_full() {
        let scores = score(&healthy());
        assert_eq!((scores.seo, scores.a11y, scores.ux), (100, 100, 100));
    }

    #[test]
    fn title_length_boundaries() {
        for (len, expected) in [(19, 85), (20, 100), (65, 100), (66, 85), (0, 85)] {
            let metrics = Metrics {
                title_length: len,
                ..healthy()
            };
            assert_eq!(score(&metrics).seo, expected, "title length {len}");
        }
    }

    #[test]
    fn word_count_boundaries() {
        let at = |word_count| score(&Metrics { word_count, ..healthy() });
        assert_eq!(at(249).seo, 90);
        assert_eq!(at(250).seo, 100);
        assert_eq!(at(1600).ux, 100);
        assert_eq!(at(1601).ux, 90);
    }

    #[test]
    fn heading_deductions() {
        let none = score(&Metrics {
            headings_count: 0,
            ..healthy()
        });
        assert_eq!(none.seo, 85);
        assert_eq!(none.ux, 90);

        let one = score(&Metrics {
            headings_count: 1,
            ..healthy()
        });
        assert_eq!(one.seo, 100);
        assert_eq!(one.ux, 90);
    }

    #[test]
    fn missing_alt_penalty_is_capped() {
        let at = |missing_alt_count| {
            score(&Metrics {
                missing_alt_count,
                ..healthy()
            })
            .a11y
        };
        assert_eq!(at(0), 100);
        assert_eq!(at(1), 90);
        assert_eq!(at(3), 70);
        assert_eq!(at(4), 60);
        assert_eq!(at(30), 60);
        assert_eq!(at(usize::MAX), 60);
    }

    #[test]
    fn all_seo_deductions_stack() {
        let scores = score(&Metrics::default());
        assert_eq!(scores.seo, 60);
        assert_eq!(scores.ux, 90);
        assert_eq!(scores.a11y, 100);
    }
}
