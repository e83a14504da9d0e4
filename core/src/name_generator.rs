//! Deterministic party name generation for synthetic traffic.
//!
//! All generation is deterministic (same stream seed = same names).
//! RULE: No curated name contains a default watchlist alias as a
//! substring, so only deliberately injected names produce sanctions hits.

use crate::rng::StreamRng;

pub struct NameGenerator;

impl NameGenerator {
    pub fn generate_full_name(rng: &mut StreamRng) -> String {
        let first = Self::pick(rng, FIRST_NAMES);
        let last = Self::pick(rng, LAST_NAMES);
        format!("{first} {last}")
    }

    /// "Prefix Industry Suffix" or "LastName Industry Suffix".
    pub fn generate_business_name(rng: &mut StreamRng) -> String {
        let lead = if rng.chance(0.5) {
            Self::pick(rng, BUSINESS_PREFIXES)
        } else {
            Self::pick(rng, LAST_NAMES)
        };
        let industry = Self::pick(rng, BUSINESS_INDUSTRIES);
        let suffix = Self::pick(rng, BUSINESS_SUFFIXES);
        format!("{lead} {industry} {suffix}")
    }

    fn pick(rng: &mut StreamRng, names: &'static [&'static str]) -> &'static str {
        rng.pick(names).copied().unwrap_or("Unknown")
    }
}

const FIRST_NAMES: &[&str] = &[
    "James", "Robert", "Michael", "William", "David", "Richard", "Joseph", "Thomas",
    "Charles", "Daniel", "Matthew", "Anthony", "Mark", "Steven", "Paul", "Kevin",
    "Brian", "George", "Edward", "Jason", "Ryan", "Jacob", "Nicholas", "Eric",
    "Mary", "Patricia", "Jennifer", "Linda", "Barbara", "Elizabeth", "Susan", "Jessica",
    "Sarah", "Karen", "Lisa", "Nancy", "Margaret", "Sandra", "Ashley", "Emily",
    "Donna", "Michelle", "Carol", "Amanda", "Melissa", "Laura", "Amy", "Anna",
    "Wei", "Hiroshi", "Priya", "Arjun", "Fatima", "Omar", "Sofia", "Mateo",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis",
    "Rodriguez", "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Taylor",
    "Thomas", "Moore", "Jackson", "Martin", "Lee", "Thompson", "White", "Harris",
    "Sanchez", "Clark", "Lewis", "Robinson", "Walker", "Young", "Allen", "King",
    "Wright", "Scott", "Torres", "Nguyen", "Hill", "Flores", "Adams", "Nelson",
    "Baker", "Hall", "Rivera", "Campbell", "Mitchell", "Carter", "Roberts", "Tanaka",
    "Patel", "Kim", "Chen", "Singh", "Haddad", "Novak", "Kowalski", "Silva",
];

const BUSINESS_PREFIXES: &[&str] = &[
    "Summit", "Pioneer", "Atlas", "Harbor", "Keystone", "Evergreen", "Liberty", "Northwind",
    "Silverline", "Bluewater", "Ironwood", "Lakeside", "Cornerstone", "Redwood", "Sunrise", "Granite",
];

const BUSINESS_INDUSTRIES: &[&str] = &[
    "Logistics", "Consulting", "Manufacturing", "Trading", "Software", "Foods", "Textiles", "Holdings",
    "Imports", "Construction", "Dental", "Marine", "Energy", "Analytics", "Printing", "Supply",
];

const BUSINESS_SUFFIXES: &[&str] = &["LLC", "Inc", "Ltd", "Group", "Partners", "Co", "GmbH", "SA"];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{RngBank, StreamSlot};

    #[test]
    fn same_stream_same_names() {
        let mut a = RngBank::new(11).for_stream(StreamSlot::Customers);
        let mut b = RngBank::new(11).for_stream(StreamSlot::Customers);
        for _ in 0..20 {
            assert_eq!(NameGenerator::generate_full_name(&mut a), NameGenerator::generate_full_name(&mut b));
        }
    }

    #[test]
    fn curated_lists_avoid_default_aliases() {
        let all = FIRST_NAMES
            .iter()
            .chain(LAST_NAMES)
            .chain(BUSINESS_PREFIXES)
            .chain(BUSINESS_INDUSTRIES)
            .chain(BUSINESS_SUFFIXES);
        for name in all {
            let lower = name.to_lowercase();
            assert!(!lower.contains("rea"), "{name} contains a watchlist alias");
            assert!(!lower.contains("entity"), "{name} contains a watchlist alias");
        }
    }
}
