//! One drawer's turn: word choice, guessing, and exactly-once completion.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};

use scribble_protocol::{PlayerId, Word};
use scribble_timer::CountdownTimer;

/// Phase of a [`Turn`].
///
/// ```text
/// Selecting → Guessing → Complete
///     └──────────────────→ Complete   (drawer left, no words)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Selecting,
    Guessing,
    Complete,
}

const COMPLETE: u32 = 1 << 31;
const COUNT_MASK: u32 = COMPLETE - 1;

/// Correct-guess count and the turn-complete flag packed in one word.
///
/// Bit 31 is the flag; the low bits are the count. Both change together
/// in a single compare-and-swap, so exactly one caller ever observes the
/// transition to complete.
#[derive(Debug, Default)]
pub struct TurnProgress(AtomicU32);

impl TurnProgress {
    /// Counts one more correct guess.
    ///
    /// Returns the new count and whether this guess completed the turn
    /// (count reached `required`), or `None` if the turn was already
    /// complete and the guess is not counted.
    pub fn record_correct(&self, required: usize) -> Option<(u32, bool)> {
        let required = u32::try_from(required).unwrap_or(COUNT_MASK);
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current & COMPLETE != 0 {
                return None;
            }
            let count = (current & COUNT_MASK) + 1;
            let completes = count >= required;
            let next = if completes { count | COMPLETE } else { count };
            match self.0.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some((count, completes)),
                Err(actual) => current = actual,
            }
        }
    }

    /// Marks the turn complete. Returns `true` only for the call that set
    /// the flag.
    pub fn try_complete(&self) -> bool {
        self.0.fetch_or(COMPLETE, Ordering::AcqRel) & COMPLETE == 0
    }

    pub fn is_complete(&self) -> bool {
        self.0.load(Ordering::Acquire) & COMPLETE != 0
    }

    pub fn correct_count(&self) -> u32 {
        self.0.load(Ordering::Acquire) & COUNT_MASK
    }
}

/// State of the current turn.
#[derive(Debug)]
pub struct Turn {
    /// Increases with every turn of a session; timer callbacks carry it so
    /// a late callback from a replaced turn is ignored.
    pub generation: u64,
    pub drawer: PlayerId,
    pub word: Option<Word>,
    /// Letters revealed so far, left to right.
    pub revealed: Vec<char>,
    pub phase: TurnPhase,
    pub select_timer: CountdownTimer,
    pub guess_timer: Option<CountdownTimer>,
    /// Players who guessed correctly, including any who left since.
    pub guessed: HashSet<PlayerId>,
    pub progress: TurnProgress,
}

impl Turn {
    pub fn new(generation: u64, drawer: PlayerId, select_timer: CountdownTimer) -> Self {
        Self {
            generation,
            drawer,
            word: None,
            revealed: Vec::new(),
            phase: TurnPhase::Selecting,
            select_timer,
            guess_timer: None,
            guessed: HashSet::new(),
            progress: TurnProgress::default(),
        }
    }

    /// Moves to the guess phase with `word`.
    pub fn begin_guessing(&mut self, word: Word, guess_timer: CountdownTimer) {
        self.select_timer.stop();
        self.word = Some(word);
        self.phase = TurnPhase::Guessing;
        self.guess_timer = Some(guess_timer);
    }

    /// The one check for whether guesses are accepted: the turn is in the
    /// guess phase and its guess timer has neither expired nor been
    /// stopped.
    pub fn is_guessing(&self) -> bool {
        self.phase == TurnPhase::Guessing
            && !self.progress.is_complete()
            && self
                .guess_timer
                .as_ref()
                .is_some_and(|t| !t.state().is_terminal())
    }

    /// Seconds left to guess. A guess timer that has not ticked yet counts
    /// as full.
    pub fn guess_remaining(&self, turn_timer: u32) -> u32 {
        match &self.guess_timer {
            Some(t) if t.is_running() => t.remaining_secs(),
            Some(t) if !t.state().is_terminal() => turn_timer,
            _ => 0,
        }
    }

    /// Length of the chosen word in characters, 0 before one is chosen.
    pub fn word_length(&self) -> usize {
        self.word.as_ref().map_or(0, |w| w.word.chars().count())
    }

    /// Stops both timers and marks the turn complete.
    pub fn finish(&mut self) {
        self.select_timer.stop();
        if let Some(t) = &self.guess_timer {
            t.stop();
        }
        self.progress.try_complete();
        self.phase = TurnPhase::Complete;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use scribble_timer::TimerKind;

    use super::*;

    fn word(w: &str) -> Word {
        Word { id: 1, word: w.into(), category: "test".into() }
    }

    fn turn() -> Turn {
        let select = CountdownTimer::new(TimerKind::SelectWord, Duration::from_secs(10));
        Turn::new(1, PlayerId::from("p0"), select)
    }

    #[test]
    fn test_record_correct_completes_at_required() {
        let progress = TurnProgress::default();
        assert_eq!(progress.record_correct(3), Some((1, false)));
        assert_eq!(progress.record_correct(3), Some((2, false)));
        assert_eq!(progress.record_correct(3), Some((3, true)));
        assert!(progress.is_complete());
        assert_eq!(progress.record_correct(3), None);
        assert_eq!(progress.correct_count(), 3);
    }

    #[test]
    fn test_try_complete_only_first_call_wins() {
        let progress = TurnProgress::default();
        assert!(progress.try_complete());
        assert!(!progress.try_complete());
        assert_eq!(progress.record_correct(1), None);
    }

    #[test]
    fn test_record_correct_exactly_one_completion_across_threads() {
        let progress = Arc::new(TurnProgress::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let progress = Arc::clone(&progress);
                std::thread::spawn(move || progress.record_correct(8))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let completions = results
            .iter()
            .filter(|r| matches!(r, Some((_, true))))
            .count();
        assert_eq!(completions, 1);
        assert_eq!(progress.correct_count(), 8);
        assert!(!progress.try_complete());
    }

    #[test]
    fn test_new_turn_is_selecting() {
        let turn = turn();
        assert_eq!(turn.phase, TurnPhase::Selecting);
        assert!(!turn.is_guessing());
        assert_eq!(turn.word_length(), 0);
    }

    #[test]
    fn test_is_guessing_follows_guess_timer() {
        let mut turn = turn();
        let guess = CountdownTimer::new(TimerKind::Guess, Duration::from_secs(15));
        turn.begin_guessing(word("café"), guess.clone());

        assert!(turn.is_guessing());
        assert_eq!(turn.word_length(), 4);
        assert_eq!(turn.guess_remaining(15), 15);

        guess.stop();
        assert!(!turn.is_guessing());
        assert_eq!(turn.guess_remaining(15), 0);
    }

    #[test]
    fn test_finish_stops_timers_and_completes() {
        let mut turn = turn();
        let guess = CountdownTimer::new(TimerKind::Guess, Duration::from_secs(15));
        turn.begin_guessing(word("apple"), guess.clone());

        turn.finish();

        assert_eq!(turn.phase, TurnPhase::Complete);
        assert!(turn.progress.is_complete());
        assert!(guess.state().is_terminal());
        assert!(turn.select_timer.state().is_terminal());
    }
}
