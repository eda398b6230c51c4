//! Suites bundled with the CLI, registered through `#[suite]`.

use std::collections::{BTreeMap, HashMap};
use std::hint::black_box;

use benchgroup_macros::suite;
use benchgroup_runtime::{Context, DeclarationError, Phase, Suite};

const ITEMS: u64 = 1_000;

#[suite]
fn collections(suite: &mut Suite) -> Result<(), DeclarationError> {
    suite.group("collections", |s| {
        s.group("vec", |s| {
            s.speed("push", || {
                let mut values = Vec::new();
                for i in 0..ITEMS {
                    values.push(i);
                }
                black_box(values);
            })?;
            s.speed("with_capacity", || {
                let mut values = Vec::with_capacity(ITEMS as usize);
                for i in 0..ITEMS {
                    values.push(i);
                }
                black_box(values);
            })?;
            s.speed("collect", || {
                black_box((0..ITEMS).collect::<Vec<_>>());
            })
        })?;

        s.group("maps", |s| {
            s.speed("hashmap insert", || {
                let mut map = HashMap::new();
                for i in 0..ITEMS {
                    map.insert(i, i);
                }
                black_box(map);
            })?;
            s.speed("btreemap insert", || {
                let mut map = BTreeMap::new();
                for i in 0..ITEMS {
                    map.insert(i, i);
                }
                black_box(map);
            })
        })
    })
}

#[suite(name = "strings")]
fn string_building(suite: &mut Suite) -> Result<(), DeclarationError> {
    let words: Vec<String> = (0..64).map(|i| format!("word{i}")).collect();
    let context = Context::from([("words".to_string(), serde_json::json!(words.len()))]);

    suite.group("strings", |s| {
        let joined = words.clone();
        s.test_with_context(
            "join",
            context.clone(),
            vec![Phase::new(move || {
                black_box(joined.join(" "));
            })],
        )?;

        let pushed = words.clone();
        s.test_with_context(
            "push_str",
            context,
            vec![Phase::new(move || {
                let mut text = String::new();
                for word in &pushed {
                    text.push_str(word);
                    text.push(' ');
                }
                black_box(text);
            })],
        )
    })
}
