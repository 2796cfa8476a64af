//! Secret selection: a compiled-in category → word-list table and a uniform
//! draw over it. The impostor is told only the category; everyone else gets
//! the word.

use rand::seq::IndexedRandom;

pub const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Animals",
        &[
            "elephant", "penguin", "octopus", "giraffe", "hedgehog", "dolphin", "kangaroo",
            "flamingo", "raccoon", "chameleon", "walrus", "beaver",
        ],
    ),
    (
        "Food",
        &[
            "pancake", "sushi", "burrito", "meatball", "croissant", "popcorn", "lasagna",
            "waffle", "dumpling", "pretzel", "avocado", "ramen",
        ],
    ),
    (
        "Places",
        &[
            "lighthouse", "airport", "volcano", "library", "carnival", "glacier", "subway",
            "vineyard", "castle", "desert", "harbor", "jungle",
        ],
    ),
    (
        "Objects",
        &[
            "umbrella", "telescope", "stapler", "hammock", "compass", "lantern", "scissors",
            "backpack", "keyboard", "mirror", "anchor", "candle",
        ],
    ),
    (
        "Jobs",
        &[
            "firefighter", "astronaut", "plumber", "magician", "lifeguard", "librarian",
            "detective", "barista", "pilot", "chef", "dentist", "beekeeper",
        ],
    ),
    (
        "Sports",
        &[
            "bowling", "archery", "surfing", "fencing", "curling", "volleyball", "karate",
            "rowing", "badminton", "skiing", "darts", "cricket",
        ],
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub category: String,
    pub word: String,
}

/// Draw one (category, word) pair uniformly at random.
pub fn pick_secret() -> Secret {
    let mut rng = rand::rng();
    let (category, words) = CATEGORIES
        .choose(&mut rng)
        .expect("category table is not empty");
    let word = words.choose(&mut rng).expect("word list is not empty");
    Secret {
        category: (*category).to_string(),
        word: (*word).to_string(),
    }
}
