use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    /// Levels 1-3 easy, 4-7 medium, 8-12 hard, 13+ expert.
    pub fn for_level(level: u32) -> Difficulty {
        match level {
            0..=3 => Difficulty::Easy,
            4..=7 => Difficulty::Medium,
            8..=12 => Difficulty::Hard,
            _ => Difficulty::Expert,
        }
    }
}

/// Supplies target words. Implementations must be read-only so a single
/// source can be shared by every room.
pub trait WordSource {
    /// A word of the given difficulty, avoiding `exclude` when possible.
    fn random_word(&self, difficulty: Difficulty, exclude: &[String], rng: &mut dyn RngCore) -> String;
}

const EASY: &[&str] = &[
    "cat", "dog", "sun", "run", "hat", "map", "cup", "red", "box", "fox", "pen", "jam", "bed",
    "sky", "top", "web", "key", "ice", "owl", "bus", "fig", "net", "row", "zip",
];

const MEDIUM: &[&str] = &[
    "planet", "garden", "rocket", "silver", "bridge", "candle", "forest", "jacket", "marble",
    "pepper", "rabbit", "saddle", "tunnel", "violet", "window", "yellow", "anchor", "basket",
    "copper", "dragon",
];

const HARD: &[&str] = &[
    "labyrinth", "whirlwind", "chocolate", "avalanche", "symphony", "quarantine", "hurricane",
    "telescope", "cathedral", "brilliant", "adventure", "porcelain", "crocodile", "xylophone",
    "algorithm", "nightmare",
];

const EXPERT: &[&str] = &[
    "onomatopoeia", "quintessential", "juxtaposition", "serendipitous", "idiosyncratic",
    "conscientious", "mischievousness", "bureaucratically", "incomprehensible",
    "phosphorescence", "perpendicular", "rhythmically",
];

/// In-memory word lists, one per difficulty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordBank {
    pub easy: Vec<String>,
    pub medium: Vec<String>,
    pub hard: Vec<String>,
    pub expert: Vec<String>,
}

impl Default for WordBank {
    fn default() -> Self {
        let owned = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        Self {
            easy: owned(EASY),
            medium: owned(MEDIUM),
            hard: owned(HARD),
            expert: owned(EXPERT),
        }
    }
}

impl WordBank {
    /// Load lists from `{"easy": [...], "medium": [...], "hard": [...], "expert": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let bank: WordBank = serde_json::from_str(json).map_err(|e| e.to_string())?;
        for difficulty in [
            Difficulty::Easy,
            Difficulty::Medium,
            Difficulty::Hard,
            Difficulty::Expert,
        ] {
            if bank.list(difficulty).is_empty() {
                return Err(format!("{:?} word list is empty", difficulty));
            }
        }
        Ok(bank)
    }

    pub fn list(&self, difficulty: Difficulty) -> &[String] {
        match difficulty {
            Difficulty::Easy => &self.easy,
            Difficulty::Medium => &self.medium,
            Difficulty::Hard => &self.hard,
            Difficulty::Expert => &self.expert,
        }
    }
}

impl WordSource for WordBank {
    fn random_word(&self, difficulty: Difficulty, exclude: &[String], rng: &mut dyn RngCore) -> String {
        let all = self.list(difficulty);
        let fresh: Vec<&String> = all.iter().filter(|w| !exclude.contains(w)).collect();
        let pool: Vec<&String> = if fresh.is_empty() {
            all.iter().collect()
        } else {
            fresh
        };
        if pool.is_empty() {
            return String::new();
        }
        pool[rng.gen_range(0..pool.len())].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn difficulty_thresholds() {
        assert_eq!(Difficulty::for_level(1), Difficulty::Easy);
        assert_eq!(Difficulty::for_level(3), Difficulty::Easy);
        assert_eq!(Difficulty::for_level(4), Difficulty::Medium);
        assert_eq!(Difficulty::for_level(7), Difficulty::Medium);
        assert_eq!(Difficulty::for_level(8), Difficulty::Hard);
        assert_eq!(Difficulty::for_level(12), Difficulty::Hard);
        assert_eq!(Difficulty::for_level(13), Difficulty::Expert);
        assert_eq!(Difficulty::for_level(99), Difficulty::Expert);
    }

    #[test]
    fn random_word_comes_from_requested_list() {
        let bank = WordBank::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..50 {
            let word = bank.random_word(Difficulty::Hard, &[], &mut rng);
            assert!(bank.hard.contains(&word));
        }
    }

    #[test]
    fn random_word_avoids_excluded_words() {
        let bank = WordBank::from_json(
            r#"{"easy":["cat","dog","sun"],"medium":["planet"],"hard":["labyrinth"],"expert":["onomatopoeia"]}"#,
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let exclude = vec!["cat".to_string(), "dog".to_string()];
        for _ in 0..20 {
            assert_eq!(bank.random_word(Difficulty::Easy, &exclude, &mut rng), "sun");
        }
    }

    #[test]
    fn exhausted_list_falls_back_to_all_words() {
        let bank = WordBank::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let word = bank.random_word(Difficulty::Expert, &bank.expert.clone(), &mut rng);
        assert!(bank.expert.contains(&word));
    }

    #[test]
    fn empty_list_rejected() {
        let result = WordBank::from_json(r#"{"easy":[],"medium":["a"],"hard":["b"],"expert":["c"]}"#);
        assert!(result.is_err());
    }
}
