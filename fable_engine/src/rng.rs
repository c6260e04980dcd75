//! Seeded randomness, one generator per concern.
//!
//! A root seed fans out into per-concern seeds so that changing, say, the quest logic
//! never shifts the map that a seed produces.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Concerns that draw their own random stream.
pub const CONCERNS: [&str; 4] = ["map", "objects", "quest", "grammar"];

#[derive(Debug, Clone)]
pub struct RandomGenerator {
    root: u64,
    seeds: BTreeMap<String, u64>,
    rngs: BTreeMap<String, StdRng>,
    spawner: StdRng,
}

impl RandomGenerator {
    /// Derive one seed per concern from `root`.
    pub fn new(root: u64) -> Self {
        let mut spawner = StdRng::seed_from_u64(root);
        let seeds: BTreeMap<String, u64> = CONCERNS
            .iter()
            .map(|concern| ((*concern).to_string(), spawner.random()))
            .collect();
        Self::from_seeds(root, seeds, spawner)
    }

    /// Rebuild a generator from previously recorded seeds (e.g. a game's metadata).
    /// Concerns missing from `seeds` are derived from `root`.
    pub fn with_seeds(root: u64, seeds: &BTreeMap<String, u64>) -> Self {
        let mut generator = Self::new(root);
        for (concern, seed) in seeds {
            generator.seeds.insert(concern.clone(), *seed);
            generator.rngs.insert(concern.clone(), StdRng::seed_from_u64(*seed));
        }
        generator
    }

    fn from_seeds(root: u64, seeds: BTreeMap<String, u64>, spawner: StdRng) -> Self {
        let rngs = seeds
            .iter()
            .map(|(concern, seed)| (concern.clone(), StdRng::seed_from_u64(*seed)))
            .collect();
        Self {
            root,
            seeds,
            rngs,
            spawner,
        }
    }

    pub fn root(&self) -> u64 {
        self.root
    }

    /// The seed of every concern.
    pub fn seeds(&self) -> &BTreeMap<String, u64> {
        &self.seeds
    }

    /// The generator owned by `concern`, created on first use for unknown concerns.
    pub fn rng(&mut self, concern: &str) -> &mut StdRng {
        let spawner = &mut self.spawner;
        let seeds = &mut self.seeds;
        self.rngs.entry(concern.to_string()).or_insert_with(|| {
            let seed = spawner.random();
            seeds.insert(concern.to_string(), seed);
            StdRng::seed_from_u64(seed)
        })
    }

    /// A fresh generator tree seeded from this one, for nested generation.
    pub fn next(&mut self) -> RandomGenerator {
        RandomGenerator::new(self.spawner.random())
    }
}
