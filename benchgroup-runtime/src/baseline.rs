//! Reference tests that put other results in relation to the machine they ran on.
//!
//! Each function declares one test into the currently open group, so they can
//! be mixed into any suite. [`baseline_bundle_basic`] declares all of them in a
//! group of their own.

use std::collections::BTreeMap;
use std::hint::black_box;

use serde_json::json;

use crate::suite::{Context, DeclarationError, Phase, Suite};

pub const BASIC_BUNDLE: &str = "baseline: basic bundle";

fn context(key: &str, value: serde_json::Value) -> Context {
    Context::from([(key.to_string(), value)])
}

/// An empty counting loop.
pub fn baseline_for(suite: &mut Suite) -> Result<(), DeclarationError> {
    suite.speed("for", || {
        for i in 0..1000 {
            black_box(i);
        }
    })
}

/// Cloning a vector of 200 integers.
pub fn baseline_vec_clone(suite: &mut Suite) -> Result<(), DeclarationError> {
    let values: Vec<u32> = (0..200).collect();

    suite.test_with_context(
        "vec clone",
        context("len", json!(values.len())),
        vec![Phase::new(move || {
            black_box(values.clone());
        })],
    )
}

struct Link {
    value: Option<u32>,
    next: Option<Box<Link>>,
}

/// Looking up a key through a chain of five links where only the last one holds it.
pub fn baseline_walk_chain(suite: &mut Suite) -> Result<(), DeclarationError> {
    let mut chain = Link {
        value: Some(40),
        next: None,
    };
    for _ in 0..4 {
        chain = Link {
            value: None,
            next: Some(Box::new(chain)),
        };
    }

    suite.test_with_context(
        "walk chain",
        context("depth", json!(5)),
        vec![Phase::new(move || {
            let mut link = black_box(&chain);
            while link.value.is_none() {
                match &link.next {
                    Some(next) => link = &**next,
                    None => break,
                }
            }
            black_box(link.value);
        })],
    )
}

/// Cloning a map of eight entries.
pub fn baseline_map_clone(suite: &mut Suite) -> Result<(), DeclarationError> {
    let map: BTreeMap<&'static str, u32> = [
        ("test_a", 1),
        ("test_b", 2),
        ("test_c", 3),
        ("test_d", 4),
        ("test_e", 5),
        ("test_f", 6),
        ("test_g", 7),
        ("test_h", 8),
    ]
    .into();

    suite.test_with_context(
        "map clone",
        context("entries", json!(map.len())),
        vec![Phase::new(move || {
            black_box(map.clone());
        })],
    )
}

const PRIMES: [f64; 9] = [2.0, 3.0, 5.0, 7.0, 11.0, 13.0, 17.0, 19.0, 23.0];

/// A chain of floating point remainders.
pub fn baseline_modulo(suite: &mut Suite) -> Result<(), DeclarationError> {
    let mut i = 0.0;
    suite.speed("modulo", move || {
        let mut d = 5007.4 + i;
        i += 1.0;
        for prime in PRIMES {
            d %= black_box(prime);
        }
        black_box(d);
    })
}

/// The same chain with additions.
pub fn baseline_addition(suite: &mut Suite) -> Result<(), DeclarationError> {
    let mut i = 0.0;
    suite.speed("addition", move || {
        let mut d = 5007.4 + i;
        i += 1.0;
        for prime in PRIMES {
            d += black_box(prime);
        }
        black_box(d);
    })
}

/// Declare every baseline test in a group named [`BASIC_BUNDLE`].
pub fn baseline_bundle_basic(suite: &mut Suite) -> Result<(), DeclarationError> {
    suite.group(BASIC_BUNDLE, |s| {
        baseline_for(s)?;
        baseline_vec_clone(s)?;
        baseline_walk_chain(s)?;
        baseline_map_clone(s)?;
        baseline_modulo(s)?;
        baseline_addition(s)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_declares_all_baselines() {
        let mut suite = Suite::new();
        baseline_bundle_basic(&mut suite).unwrap();

        let group = suite.forest()[0].as_group().unwrap();
        assert_eq!(group.title(), BASIC_BUNDLE);

        let titles: Vec<_> = group.children().iter().map(|node| node.title()).collect();
        assert_eq!(
            titles,
            vec!["for", "vec clone", "walk chain", "map clone", "modulo", "addition"]
        );
    }

    #[test]
    fn test_baselines_need_an_open_group() {
        let mut suite = Suite::new();
        assert!(matches!(
            baseline_for(&mut suite),
            Err(DeclarationError::Placement { .. })
        ));
    }

    #[test]
    fn test_context_describes_inputs() {
        let mut suite = Suite::new();
        baseline_bundle_basic(&mut suite).unwrap();

        let group = suite.forest()[0].as_group().unwrap();
        let vec_clone = group.children()[1].as_test().unwrap();
        assert_eq!(vec_clone.context()["len"], json!(200));
    }
}
