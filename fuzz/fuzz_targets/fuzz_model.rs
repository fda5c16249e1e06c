#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate arbitrary;
extern crate intent_log;
extern crate uuid;

use std::collections::HashMap;

use arbitrary::Arbitrary;

use intent_log::{BincodeReader, Config as LogConfig, PageContainer, PageReference};

const TEST_DIR: &str = "testing_data_directories";
const REFERENCES: u8 = 16;
const VALUE_MAX_SZ: usize = 16;

type Page = Vec<u8>;

#[derive(Debug)]
struct Config(LogConfig);

impl<'a> Arbitrary<'a> for Config {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let path = std::path::Path::new(TEST_DIR)
            .join("fuzz")
            .join(uuid::Uuid::new_v4().to_string())
            .into();

        let zstd_compression_level = if u.int_in_range(1..=10).unwrap_or(1) < 5 {
            None
        } else {
            Some(u.int_in_range(1..=9).unwrap_or(3))
        };

        Ok(Config(LogConfig {
            path,
            capacity: u.int_in_range(1..=8).unwrap_or(2),
            zstd_compression_level,
            ..Default::default()
        }))
    }
}

fn page(u: &mut arbitrary::Unstructured<'_>) -> Page {
    let len: u8 = u.int_in_range(0..=VALUE_MAX_SZ as u8).unwrap_or(0);
    u.bytes(len as usize).unwrap_or(&[1, 2, 3]).to_vec()
}

#[derive(Debug)]
enum Op {
    Put(u8, Page, Page),
    Get(u8),
    Modify(u8, u8),
    Remove(u8),
    Clear,
}

impl<'a> Arbitrary<'a> for Op {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let reference = u.int_in_range(0..=REFERENCES - 1).unwrap_or(0);
        let choice = u.int_in_range(0..=4).unwrap_or(0);

        Ok(match choice {
            0 => Op::Put(reference, page(u), page(u)),
            1 => Op::Get(reference),
            2 => Op::Modify(reference, Arbitrary::arbitrary(u).unwrap_or(0)),
            3 => Op::Remove(reference),
            4 => Op::Clear,
            _ => unreachable!(),
        })
    }
}

fuzz_target!(|args: (Config, [Op; 16])| {
    let (config, ops) = args;

    let mut log = config.0.open::<Page>().unwrap();
    let refs: Vec<PageReference> = (0..REFERENCES).map(|_| PageReference::new()).collect();
    let mut model: HashMap<u8, PageContainer<Page>> = HashMap::new();

    for op in ops {
        match op {
            Op::Put(k, complete, modified) => {
                let container = PageContainer::new(complete, modified);
                log.put(&refs[k as usize], container.clone()).unwrap();
                model.insert(k, container);
            }
            Op::Get(k) => {
                let actual = log.get(&refs[k as usize], &BincodeReader).unwrap();
                assert_eq!(actual, model.get(&k));
            }
            Op::Modify(k, byte) => {
                if let Some(container) = log.get_mut(&refs[k as usize], &BincodeReader).unwrap() {
                    container.modified_mut().unwrap().push(byte);
                    model.get_mut(&k).unwrap().modified_mut().unwrap().push(byte);
                } else {
                    assert!(!model.contains_key(&k));
                }
            }
            Op::Remove(k) => {
                log.remove(&refs[k as usize]);
                model.remove(&k);
            }
            Op::Clear => {
                // resident entries are dropped, spilled ones stay
                for k in 0..REFERENCES {
                    if log.contains(&refs[k as usize]) {
                        model.remove(&k);
                    }
                }
                log.clear();
            }
        }

        assert!(log.used_entries() <= log.capacity());
        assert_eq!(log.used_entries() + log.spilled_entries(), model.len());
    }

    for (k, expected) in &model {
        let actual = log.get(&refs[*k as usize], &BincodeReader).unwrap();
        assert_eq!(actual, Some(expected));
    }

    log.close().unwrap();

    std::fs::remove_dir_all(&config.0.path).unwrap();
});
