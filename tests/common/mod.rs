#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering::SeqCst};

use serde::{Deserialize, Serialize};

use intent_log::{Config, IntentLog, PageContainer};

const TEST_DIR: &str = "testing_data_directories";

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A stand-in for an engine page: a page number and some
/// record payloads.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub number: u64,
    pub records: Vec<Vec<u8>>,
}

pub fn page(number: u64) -> Page {
    Page {
        number,
        records: vec![number.to_le_bytes().to_vec(); (number % 4) as usize],
    }
}

pub fn container(number: u64) -> PageContainer<Page> {
    let mut modified = page(number);
    modified.records.push(vec![0xFA; 7]);
    PageContainer::new(page(number), modified)
}

pub fn test_path(name: &str) -> PathBuf {
    let subdir = format!("{}_{}", name, TEST_COUNTER.fetch_add(1, SeqCst));
    std::path::Path::new(TEST_DIR)
        .join(format!("{}", std::process::id()))
        .join(subdir)
}

pub fn with_log<F: FnOnce(&mut IntentLog<Page>)>(config: Config, f: F) {
    setup_logger();

    let _ = std::fs::remove_dir_all(&config.path);

    let mut log = config.open().unwrap();

    f(&mut log);

    log.close().unwrap();

    std::fs::remove_dir_all(config.path).unwrap();
}

pub fn with_capacity<F: FnOnce(&mut IntentLog<Page>)>(capacity: usize, f: F) {
    let config = Config {
        path: test_path("log"),
        capacity,
        ..Default::default()
    };

    with_log(config, f)
}

pub fn setup_logger() {
    use std::io::Write;

    fn tn() -> String {
        std::thread::current()
            .name()
            .unwrap_or("unknown")
            .to_owned()
    }

    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{:05} {:20} {:10} {}",
                record.level(),
                tn(),
                record.module_path().unwrap().split("::").last().unwrap(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info);

    if let Ok(env) = std::env::var("RUST_LOG") {
        builder.parse_filters(&env);
    }

    let _r = builder.try_init();
}
