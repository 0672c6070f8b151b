//! Shared test fixtures.
#![allow(dead_code)]

use shardcsv::*;
use std::sync::Arc;

pub const BUCKET: &str = "data";

/// Store holding `objects` in the `data` bucket, returned with their identifiers.
pub fn store_with(objects: &[(&str, &[u8])]) -> (FakeObjectStore, Vec<String>) {
    let store = FakeObjectStore::new();
    let mut names = Vec::new();
    for (key, data) in objects {
        store.put_object(BUCKET, key, data);
        names.push(format!("s3://{BUCKET}/{key}"));
    }
    (store, names)
}

pub fn string_fields(names: &[&str]) -> Vec<FieldDef> {
    names.iter().map(|n| FieldDef::string(*n)).collect()
}

pub fn as_strings(rows: &[Row]) -> Vec<Vec<Option<String>>> {
    rows.iter().map(Row::to_strings).collect()
}

pub fn read_all(config: &CsvInputConfig, store: &FakeObjectStore) -> Result<Vec<Row>> {
    let mut input = CsvInput::new(config.clone(), Arc::new(store.clone()))?;
    input.rows().collect()
}

/// Rows read by every worker of a partitioned read, in worker order.
pub fn read_workers(
    config: &CsvInputConfig,
    store: &FakeObjectStore,
    workers: usize,
) -> Result<Vec<Vec<Row>>> {
    let config = CsvInputConfig {
        running_in_parallel: true,
        ..config.clone()
    };
    (0..workers)
        .map(|worker| {
            let mut input =
                CsvInput::new(config.clone(), Arc::new(store.clone()))?.with_worker(worker, workers);
            input.rows().collect()
        })
        .collect()
}

/// Small deterministic generator, good enough to vary test data.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    pub fn below(&mut self, n: u64) -> usize {
        usize::try_from(self.next() % n).unwrap()
    }

    /// A word of 0 to `max_len` characters picked from `alphabet`.
    pub fn word(&mut self, alphabet: &[u8], max_len: u64) -> String {
        let len = self.below(max_len + 1);
        (0..len)
            .map(|_| char::from(alphabet[self.below(alphabet.len() as u64)]))
            .collect()
    }
}
