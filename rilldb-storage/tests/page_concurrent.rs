// Copyright 2026 RillDB Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Concurrent page workloads: many writers and readers on one page with
//! compaction running underneath them.

use std::sync::Arc;
use std::thread;

use rilldb_core::{Column, Row, Schema, SortKey, Value, ValueType};
use rilldb_storage::page::DEFAULT_DELTA_CHAIN_LENGTH;
use rilldb_storage::{
    BufferPool, LockManagerKind, Options, PageOps, TxnManager, TxnType, VersionedPage,
};

fn point_schema() -> Arc<Schema> {
    Arc::new(
        Schema::new(
            vec![
                Column::new(0, "point_id", ValueType::Int64),
                Column::new(1, "point_type", ValueType::Int32),
                Column::new(2, "value", ValueType::String),
            ],
            0,
            2,
        )
        .unwrap(),
    )
}

fn row(schema: &Schema, id: i64, ty: i32, value: &str) -> Row {
    Row::encode(
        &[
            Value::Int64(id),
            Value::Int32(ty),
            Value::String(value.into()),
        ],
        schema,
    )
    .unwrap()
}

fn key(schema: &Schema, id: i64, ty: i32) -> SortKey {
    SortKey::from_values(&[Value::Int64(id), Value::Int32(ty)], schema).unwrap()
}

fn value_of(view_row: &Row, schema: &Schema) -> String {
    match view_row.get(2, schema).unwrap() {
        Value::String(s) => s,
        other => panic!("unexpected value {other:?}"),
    }
}

#[test]
fn test_concurrent_writers_converge_under_compaction() {
    let worker_count = 8;
    let epochs = 30u64;
    let schema = point_schema();
    let page = Arc::new(VersionedPage::default());

    let mut handles = Vec::new();
    for index in 0..worker_count {
        let page = Arc::clone(&page);
        let schema = Arc::clone(&schema);
        handles.push(thread::spawn(move || {
            let opts = Options::new();
            let sk = key(&schema, index, 0);
            for epoch in 0..epochs {
                let ts = epoch * 3;
                // insert
                page.set_row(row(&schema, index, 0, "hello"), ts, &opts)
                    .unwrap();
                let view = page.get_row(&sk, ts, &opts).unwrap();
                assert_eq!(value_of(&view.row, &schema), "hello");
                // update
                page.set_row(row(&schema, index, 0, "world"), ts + 1, &opts)
                    .unwrap();
                let view = page.get_row(&sk, ts + 1, &opts).unwrap();
                assert_eq!(value_of(&view.row, &schema), "world");
                // delete
                page.delete_row(&sk, ts + 2, &opts).unwrap();
                assert!(page.get_row(&sk, ts + 2, &opts).unwrap_err().is_not_found());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(page.delta_chain_len() <= DEFAULT_DELTA_CHAIN_LENGTH);

    // final state per key is the last delete
    let opts = Options::new();
    for index in 0..worker_count {
        let sk = key(&schema, index, 0);
        assert!(page
            .get_row(&sk, epochs * 3, &opts)
            .unwrap_err()
            .is_not_found());
        // and the last update is still visible at its timestamp
        let last_update = (epochs - 1) * 3 + 1;
        let view = page.get_row(&sk, last_update, &opts).unwrap();
        assert_eq!(value_of(&view.row, &schema), "world");
    }
}

#[test]
fn test_readers_see_consistent_snapshots_during_writes() {
    let schema = point_schema();
    let page = Arc::new(VersionedPage::default());
    let opts = Options::new();

    // a stable version every reader must keep resolving
    page.set_row(row(&schema, 0, 0, "stable"), 1, &opts).unwrap();

    let writer = {
        let page = Arc::clone(&page);
        let schema = Arc::clone(&schema);
        thread::spawn(move || {
            let opts = Options::new();
            for ts in 2..500u64 {
                page.set_row(row(&schema, 0, 0, &format!("v{ts}")), ts, &opts)
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let page = Arc::clone(&page);
            let schema = Arc::clone(&schema);
            thread::spawn(move || {
                let opts = Options::new();
                let sk = key(&schema, 0, 0);
                for _ in 0..2000 {
                    let view = page.get_row(&sk, 1, &opts).unwrap();
                    assert_eq!(view.ts, 1);
                    assert_eq!(value_of(&view.row, &schema), "stable");
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert!(page.delta_chain_len() <= DEFAULT_DELTA_CHAIN_LENGTH);
}

#[test]
fn test_concurrent_transactions_on_disjoint_keys_all_commit() {
    let worker_count = 8;
    let manager = Arc::new(TxnManager::new());
    let schema = point_schema();
    let opts = Options::new()
        .with_buffer_pool(Arc::new(BufferPool::new()))
        .with_schema(Arc::clone(&schema));

    let mut handles = Vec::new();
    for index in 0..worker_count {
        let manager = Arc::clone(&manager);
        let schema = Arc::clone(&schema);
        let opts = opts.clone();
        handles.push(thread::spawn(move || {
            let mut txn = manager.begin(TxnType::ReadWrite, LockManagerKind::Centralized);
            txn.set_row(
                "points",
                row(&schema, index, 0, &format!("w{index}")),
                &opts,
            )
            .unwrap();
            txn.commit(&opts).unwrap()
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut reader = manager.begin(TxnType::ReadWrite, LockManagerKind::Centralized);
    for index in 0..worker_count {
        let view = reader
            .get_row("points", &key(&schema, index, 0), &opts)
            .unwrap();
        assert_eq!(value_of(&view.row, &schema), format!("w{index}"));
    }
}

#[test]
fn test_contended_key_has_exactly_one_winner() {
    let manager = Arc::new(TxnManager::new());
    let schema = point_schema();
    let opts = Options::new()
        .with_buffer_pool(Arc::new(BufferPool::new()))
        .with_schema(Arc::clone(&schema));

    // seed
    {
        let mut txn = manager.begin(TxnType::ReadWrite, LockManagerKind::Centralized);
        txn.set_row("points", row(&schema, 0, 0, "seed"), &opts)
            .unwrap();
        txn.commit(&opts).unwrap();
    }

    let barrier = Arc::new(std::sync::Barrier::new(2));
    let mut handles = Vec::new();
    for label in ["a", "b"] {
        let manager = Arc::clone(&manager);
        let schema = Arc::clone(&schema);
        let opts = opts.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let mut txn = manager.begin(TxnType::ReadWrite, LockManagerKind::Centralized);
            let sk = key(&schema, 0, 0);
            txn.get_row("points", &sk, &opts).unwrap();
            barrier.wait();
            if txn.set_row("points", row(&schema, 0, 0, label), &opts).is_err() {
                return false;
            }
            txn.commit(&opts).is_ok()
        }));
    }
    let outcomes: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(
        outcomes.iter().filter(|&&won| won).count(),
        1,
        "exactly one of two conflicting transactions must commit"
    );
}
