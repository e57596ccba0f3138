//! Word sources.

use rand::seq::SliceRandom;
use scribble_protocol::Word;

/// Supplies candidate words for the drawer.
///
/// Implementations do not track which words a session already used; the
/// session asks for extra words and filters them itself.
pub trait WordProvider: Send + Sync + 'static {
    /// Up to `count` random words, from `category` if given.
    fn random_words(&self, category: Option<&str>, count: usize) -> Vec<Word>;
}

const BUILT_IN: &[(&str, &[&str])] = &[
    ("animals", &[
        "elephant", "giraffe", "penguin", "kangaroo", "octopus", "squirrel", "dolphin",
        "hedgehog", "flamingo", "tortoise",
    ]),
    ("food", &[
        "pizza", "banana", "pancake", "broccoli", "sandwich", "popcorn", "pineapple",
        "cupcake", "spaghetti", "avocado",
    ]),
    ("objects", &[
        "umbrella", "scissors", "lighthouse", "telescope", "backpack", "candle", "ladder",
        "guitar", "bicycle", "hammock",
    ]),
    ("places", &[
        "volcano", "castle", "desert", "island", "library", "airport", "waterfall",
        "igloo", "pyramid", "stadium",
    ]),
];

/// In-memory word list.
#[derive(Debug, Clone)]
pub struct StaticWordProvider {
    words: Vec<Word>,
}

impl StaticWordProvider {
    /// Uses exactly `words`.
    pub fn new(words: Vec<Word>) -> Self {
        Self { words }
    }

    /// One word per entry in `words`, all in category `category`.
    pub fn from_list<S: AsRef<str>>(category: &str, words: &[S]) -> Self {
        let words = words
            .iter()
            .zip(1..)
            .map(|(w, id)| Word {
                id,
                word: w.as_ref().to_owned(),
                category: category.to_owned(),
            })
            .collect();
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for StaticWordProvider {
    /// The built-in list.
    fn default() -> Self {
        let words = BUILT_IN
            .iter()
            .flat_map(|(category, words)| words.iter().map(move |w| (*category, *w)))
            .zip(1..)
            .map(|((category, word), id)| Word {
                id,
                word: word.to_owned(),
                category: category.to_owned(),
            })
            .collect();
        Self { words }
    }
}

impl WordProvider for StaticWordProvider {
    fn random_words(&self, category: Option<&str>, count: usize) -> Vec<Word> {
        let mut pool: Vec<Word> = self
            .words
            .iter()
            .filter(|w| category.is_none_or(|c| w.category == c))
            .cloned()
            .collect();
        pool.shuffle(&mut rand::rng());
        pool.truncate(count);
        pool
    }
}
