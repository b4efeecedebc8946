//! Turning per-frame output scores into text.

use ndarray::ArrayView2;

use crate::config::OutputSymbol;

/// Greedy CTC decoding: best symbol per frame, repeats collapsed, reserved symbols dropped.
///
/// `scores` has shape `(frames, symbols.len())`.
pub fn greedy_ctc_decode(scores: ArrayView2<'_, f32>, symbols: &[OutputSymbol]) -> String {
    let mut text = String::new();
    let mut previous: Option<usize> = None;

    for frame in scores.rows() {
        let mut best = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (i, &score) in frame.iter().enumerate() {
            if score > best_score {
                best_score = score;
                best = i;
            }
        }

        if Some(best) != previous
            && let Some(OutputSymbol::Character(c)) = symbols.get(best)
        {
            text.push(*c);
        }
        previous = Some(best);
    }

    text
}

/// Levenshtein distance between the characters of two strings.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = diagonal + usize::from(ca != *cb);
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(row[j + 1] + 1);
        }
    }

    row[b.len()]
}
