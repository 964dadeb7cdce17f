use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hound_abi::{DataId, DeviceId, Record};

use super::Queue;

fn env(payload: u64) -> Arc<Record> {
    Arc::new(Record::new(
        DataId::new(1),
        DeviceId::new(0),
        0,
        (0, 0),
        payload.to_le_bytes().to_vec(),
    ))
}

fn payload_of(env: &Arc<Record>) -> u64 {
    u64::from_le_bytes(env.data.clone().try_into().unwrap())
}

#[test]
fn push_pop_in_order() {
    let q = Queue::new(4);
    for i in 1..=3u64 {
        q.push(env(i));
    }
    let out = q.pop_records_nowait(3);
    assert_eq!(out.first_seqno, 0);
    assert_eq!(out.records.len(), 3);
    let values: Vec<u64> = out.records.iter().map(payload_of).collect();
    assert_eq!(values, vec![1, 2, 3]);
}

/// §8 scenario 2: queue length 4, push payloads 1..=10, pop_nowait 4.
/// Expect 7,8,9,10 with first-seqno 6 (0-indexed pushes: seqnos 0..9, the
/// oldest 6 are evicted, seqnos 6..9 survive).
#[test]
fn overflow_evicts_oldest() {
    let q = Queue::new(4);
    for i in 1..=10u64 {
        q.push(env(i));
    }
    let out = q.pop_records_nowait(4);
    assert_eq!(out.first_seqno, 6);
    let values: Vec<u64> = out.records.iter().map(payload_of).collect();
    assert_eq!(values, vec![7, 8, 9, 10]);
}

/// §8 scenario 3: resize without flush preserves surviving records' order.
#[test]
fn resize_without_flush_preserves_order() {
    let q = Queue::new(5);
    for i in 1..=3u64 {
        q.push(env(i));
    }
    // rotate the ring so the logical front isn't at physical index 0
    let rotated = q.pop_records_nowait(2);
    assert_eq!(rotated.records.len(), 2);
    for i in 4..=5u64 {
        q.push(env(i));
    }
    q.resize(7, false);
    let out = q.pop_records_nowait(3);
    let values: Vec<u64> = out.records.iter().map(payload_of).collect();
    assert_eq!(values, vec![3, 4, 5]);
}

#[test]
fn resize_with_flush_drops_everything() {
    let q = Queue::new(4);
    for i in 1..=3u64 {
        q.push(env(i));
    }
    q.resize(2, true);
    assert_eq!(q.len(), 0);
    let out = q.pop_records_nowait(10);
    assert!(out.records.is_empty());
}

#[test]
fn pop_bytes_nowait_never_splits_a_record() {
    let q = Queue::new(4);
    for i in 1..=3u64 {
        q.push(env(i)); // each payload is 8 bytes
    }
    let out = q.pop_bytes_nowait(20);
    // 2 records fit (16 bytes); a 3rd would exceed the 20-byte budget.
    assert_eq!(out.records.len(), 2);
}

#[test]
fn blocked_reader_is_woken_by_interrupt() {
    let q = Arc::new(Queue::new(4));
    let reader = {
        let q = q.clone();
        thread::spawn(move || q.pop_records_blocking(1))
    };
    thread::sleep(Duration::from_millis(20));
    q.interrupt();
    let out = reader.join().unwrap();
    assert!(out.interrupted);
    assert!(out.records.is_empty());
}

#[test]
fn blocked_reader_wakes_on_push() {
    let q = Arc::new(Queue::new(4));
    let reader = {
        let q = q.clone();
        thread::spawn(move || q.pop_records_blocking(1))
    };
    thread::sleep(Duration::from_millis(20));
    q.push(env(42));
    let out = reader.join().unwrap();
    assert!(!out.interrupted);
    assert_eq!(out.records.len(), 1);
    assert_eq!(payload_of(&out.records[0]), 42);
}
