//! ** idgen module **
//! Namespace and helper for stable v5 uuids of generated games.
use std::collections::BTreeMap;

use uuid::Uuid;

pub const NAMESPACE_GAME: Uuid = uuid::uuid!("5b0d7f3e-8a51-4c2e-9d7b-3f6e1a2c9b84");

/// Derive a game's uuid from its generation seeds, so equal seeds give equal ids.
pub fn game_uuid(seeds: &BTreeMap<String, u64>) -> Uuid {
    let token = seeds
        .iter()
        .map(|(concern, seed)| format!("{concern}={seed}"))
        .collect::<Vec<_>>()
        .join(";");
    Uuid::new_v5(&NAMESPACE_GAME, token.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_seeds_give_equal_ids() {
        let seeds: BTreeMap<String, u64> = [("map".to_string(), 1), ("quest".to_string(), 2)].into_iter().collect();
        assert_eq!(game_uuid(&seeds), game_uuid(&seeds.clone()));
        let mut other = seeds.clone();
        other.insert("quest".into(), 3);
        assert_ne!(game_uuid(&seeds), game_uuid(&other));
        assert_eq!(game_uuid(&seeds).get_version_num(), 5);
    }
}
