//! Guess evaluation and scoring.

/// Edit distance at or below which a wrong guess counts as close.
pub const CLOSE_THRESHOLD: usize = 2;

/// Points for any correct guess.
pub const BASE_SCORE: i32 = 100;

/// Largest speed bonus, earned by guessing with the full timer left.
pub const MAX_TIME_BONUS: i32 = 50;

/// How a guess compares to the word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Exact,
    Close,
    Wrong,
}

/// Compares a guess to the word, ignoring case and surrounding
/// whitespace.
pub fn evaluate(guess: &str, word: &str) -> Verdict {
    let guess = guess.trim().to_lowercase();
    let word = word.trim().to_lowercase();
    if guess == word {
        return Verdict::Exact;
    }
    if levenshtein(&guess, &word) <= CLOSE_THRESHOLD {
        Verdict::Close
    } else {
        Verdict::Wrong
    }
}

/// Levenshtein distance over Unicode scalar values.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `100 + floor(50 × remaining / turn_timer)`, at most 150.
pub fn score_for(remaining_secs: u32, turn_timer_secs: u32) -> i32 {
    if turn_timer_secs == 0 {
        return BASE_SCORE;
    }
    let bonus = u64::from(remaining_secs) * MAX_TIME_BONUS as u64 / u64::from(turn_timer_secs);
    BASE_SCORE + (bonus as i32).min(MAX_TIME_BONUS)
}
