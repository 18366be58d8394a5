//! Cosmetic nickname generation.

use rand::Rng;
use rand::seq::SliceRandom;

use super::Topic;

/// Source of display nicknames. Pure from the lobby's point of view.
pub trait NicknameProvider: Send + Sync + std::fmt::Debug {
    /// Produces a nickname, optionally themed after `topic_hint`.
    fn generate(&self, topic_hint: Option<&Topic>) -> String;
}

struct Theme {
    topic: &'static str,
    adjectives: &'static [&'static str],
    nouns: &'static [&'static str],
}

const FALLBACK_THEME: Theme = Theme {
    topic: "random",
    adjectives: &["Mystery", "Silent", "Hidden"],
    nouns: &["Stranger", "Anon", "Ghost"],
};

const THEMES: &[Theme] = &[
    Theme {
        topic: "gaming",
        adjectives: &["Shadow", "Pixel", "Cyber"],
        nouns: &["Gamer", "Warrior", "Ninja"],
    },
    Theme {
        topic: "movies",
        adjectives: &["Cinematic", "Action", "Fantasy"],
        nouns: &["Buff", "Critic", "Star"],
    },
    Theme {
        topic: "music",
        adjectives: &["Melodic", "Electric", "Funky"],
        nouns: &["Vibes", "Beat", "Diva"],
    },
    Theme {
        topic: "tech",
        adjectives: &["Binary", "Quantum", "Cyber"],
        nouns: &["Coder", "Bot", "Hacker"],
    },
    FALLBACK_THEME,
];

/// Adjective + noun + number nicknames themed per topic, e.g. `PixelNinja42`.
///
/// Unknown topics use the `random` theme.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThemedNicknames;

impl NicknameProvider for ThemedNicknames {
    fn generate(&self, topic_hint: Option<&Topic>) -> String {
        let theme = topic_hint
            .and_then(|hint| THEMES.iter().find(|t| t.topic == hint.as_str()))
            .unwrap_or(&FALLBACK_THEME);
        let mut rng = rand::thread_rng();
        let adjective = theme.adjectives.choose(&mut rng).copied().unwrap_or("Anon");
        let noun = theme.nouns.choose(&mut rng).copied().unwrap_or("Stranger");
        let number: u16 = rng.gen_range(1..=999);
        format!("{adjective}{noun}{number}")
    }
}
