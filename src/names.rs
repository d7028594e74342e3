use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "aged", "ancient", "autumn", "billowing", "bitter", "black", "blue", "bold", "broad",
    "broken", "calm", "cold", "cool", "crimson", "curly", "damp", "dark", "dawn", "delicate",
    "divine", "dry", "empty", "falling", "fancy", "flat", "floral", "fragrant", "frosty",
    "gentle", "green", "hidden", "holy", "icy", "jolly", "late", "lingering", "little",
    "lively", "long", "lucky", "misty", "morning", "muddy", "old", "orange", "patient", "plain",
    "polished", "proud", "purple", "quiet", "rapid", "red", "restless", "rough", "round",
    "royal", "shiny", "shy", "silent", "small", "snowy", "soft", "solitary", "sparkling",
    "spring", "square", "steep", "still", "summer", "super", "sweet", "throbbing", "tight",
    "tiny", "twilight", "wandering", "weathered", "white", "wild", "winter", "wispy",
    "withered", "yellow", "young",
];

const NOUNS: &[&str] = &[
    "art", "band", "bar", "base", "bird", "block", "boat", "box", "bread", "breeze", "brook",
    "bush", "butterfly", "cake", "cell", "cherry", "cloud", "credit", "darkness", "dawn", "dew",
    "disk", "dream", "dust", "feather", "field", "fire", "firefly", "flower", "fog", "forest",
    "frog", "frost", "glade", "glitter", "grass", "hall", "hat", "haze", "heart", "hill",
    "king", "lab", "lake", "leaf", "limit", "math", "meadow", "mode", "moon", "morning",
    "mountain", "mouse", "mud", "night", "paper", "pine", "poetry", "pond", "queen", "rain",
    "recipe", "resonance", "rice", "river", "salad", "scene", "sea", "shadow", "shape",
    "silence", "sky", "smoke", "snow", "snowflake", "sound", "star", "sun", "sunset", "surf",
    "term", "thunder", "tooth", "tree", "truth", "union", "unit", "violet", "voice", "water",
    "waterfall", "wave", "wildflower", "wind", "wood",
];

/// Picks an `adjective-noun` pair. Whether the name is free is for the store to decide.
pub fn generate_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("quiet");
    let noun = NOUNS.choose(rng).copied().unwrap_or("river");
    format!("{adjective}-{noun}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_names_are_adjective_noun_pairs() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let name = generate_name(&mut rng);
            let (adjective, noun) = name.split_once('-').unwrap();
            assert!(ADJECTIVES.contains(&adjective), "{name}");
            assert!(NOUNS.contains(&noun), "{name}");
        }
    }

    #[test]
    fn same_seed_gives_same_name() {
        let first = generate_name(&mut StdRng::seed_from_u64(42));
        let second = generate_name(&mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);
    }
}
