//! Integration tests for the literal conflict/lifecycle scenarios the
//! batcher and versioned-memory protocol are designed against.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use stm_core::{AllocOutcome, Region, StmConfig};

fn small_region() -> std::sync::Arc<Region> {
    Region::create(16, 8, StmConfig::default()).unwrap()
}

#[test]
fn single_writer_then_reader_observes_write() {
    let region = small_region();
    let start = region.start_address();

    let writer = region.begin(false);
    assert!(writer.write(&[0xAA; 16], start));
    assert!(writer.end());

    let reader = region.begin(true);
    let mut buf = [0u8; 16];
    assert!(reader.read(start, &mut buf));
    assert!(reader.end());

    assert_eq!(buf, [0xAA; 16]);
}

// S2 and S3 drive their two writers from separate threads, as the real
// reference harness (and `stm_testkit::run_concurrent_writers`) does. A
// conflicting writer's `write` self-aborts by calling into
// `Batcher::end`, which blocks until its epoch commits (see
// `Transaction::write`'s doc comment) — unless it happens to be the
// epoch's last departure, that commit only happens when the *other*
// writer reaches its own `end`. Driving both writers sequentially on one
// thread would mean the losing writer's blocked `write` call never
// returns, because the thread never reaches the winner's `end` call.

#[test]
fn concurrent_writers_exactly_one_commits_the_conflicting_word() {
    let region = Region::create(8, 8, StmConfig::default().batch_size(2)).unwrap();
    let start = region.start_address();

    let (go_tx, go_rx) = mpsc::channel::<()>();
    let (result_tx, result_rx) = mpsc::channel::<bool>();

    let region2 = std::sync::Arc::clone(&region);
    let t2_handle = thread::spawn(move || {
        let t2 = region2.begin(false);
        go_rx.recv().unwrap();
        // Conflicts with t1's write; blocks inside the self-abort until
        // t1's `end` commits the epoch.
        let wrote = t2.write(&[2; 8], start);
        result_tx.send(wrote).unwrap();
        let _ = t2.end();
    });

    // Give t2 a chance to be admitted into the same epoch before t1 writes.
    thread::sleep(Duration::from_millis(20));

    let t1 = region.begin(false);
    assert!(t1.write(&[1; 8], start));
    go_tx.send(()).unwrap();
    // Give t2 a chance to reach its blocked `write` before t1 commits.
    thread::sleep(Duration::from_millis(20));
    assert!(t1.end());

    assert!(!result_rx.recv_timeout(Duration::from_secs(5)).unwrap());
    t2_handle.join().unwrap();

    let reader = region.begin(true);
    let mut buf = [0u8; 8];
    assert!(reader.read(start, &mut buf));
    assert!(reader.end());
    assert_eq!(buf, [1; 8]);
}

#[test]
fn read_lock_blocks_a_concurrent_write() {
    let region = Region::create(8, 8, StmConfig::default().batch_size(2)).unwrap();
    let start = region.start_address();

    let (go_tx, go_rx) = mpsc::channel::<()>();
    let (result_tx, result_rx) = mpsc::channel::<bool>();

    let region2 = std::sync::Arc::clone(&region);
    let t2_handle = thread::spawn(move || {
        let t2 = region2.begin(false);
        go_rx.recv().unwrap();
        let wrote = t2.write(&[1; 8], start);
        result_tx.send(wrote).unwrap();
        let _ = t2.end();
    });

    thread::sleep(Duration::from_millis(20));

    let t1 = region.begin(false);
    let mut buf = [0u8; 8];
    assert!(t1.read(start, &mut buf));
    go_tx.send(()).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert!(t1.end());

    assert!(!result_rx.recv_timeout(Duration::from_secs(5)).unwrap());
    t2_handle.join().unwrap();
}

#[test]
fn a_writer_reads_back_its_own_uncommitted_write() {
    let region = small_region();
    let start = region.start_address();

    let t1 = region.begin(false);
    assert!(t1.write(&[7; 16], start));
    let mut buf = [0u8; 16];
    assert!(t1.read(start, &mut buf));
    assert_eq!(buf, [7; 16]);
    assert!(t1.end());
}

#[test]
fn aborted_allocation_unlinks_the_segment() {
    let region = small_region();

    let t1 = region.begin(false);
    let AllocOutcome::Success(p) = t1.alloc(32).unwrap() else {
        panic!("expected a successful allocation");
    };
    assert!(t1.abort());

    let t3 = region.begin(true);
    let mut buf = [0u8; 32];
    assert!(!t3.read(p, &mut buf));
    assert!(t3.end());
}

#[test]
fn allocate_commit_read_then_free_lifecycle() {
    let region = small_region();

    let t1 = region.begin(false);
    let AllocOutcome::Success(p) = t1.alloc(8).unwrap() else {
        panic!("expected a successful allocation");
    };
    assert!(t1.write(&[1, 2, 3, 4, 5, 6, 7, 8], p));
    assert!(t1.end());

    let t2 = region.begin(true);
    let mut buf = [0u8; 8];
    assert!(t2.read(p, &mut buf));
    assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
    assert!(t2.end());

    let t3 = region.begin(false);
    assert!(t3.free(p));
    assert!(t3.end());

    let t4 = region.begin(true);
    let mut buf = [0u8; 8];
    assert!(!t4.read(p, &mut buf));
    assert!(t4.end());
}

#[test]
fn a_third_writer_waits_for_the_batch_to_drain() {
    let region = Region::create(8, 8, StmConfig::default().batch_size(2)).unwrap();

    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = std::sync::Arc::new(std::sync::Mutex::new(release_rx));

    let spawn_holder = |region: std::sync::Arc<Region>, release_rx: std::sync::Arc<std::sync::Mutex<mpsc::Receiver<()>>>| {
        thread::spawn(move || {
            let tx = region.begin(false);
            release_rx.lock().unwrap().recv().unwrap();
            assert!(tx.end());
        })
    };

    let h1 = spawn_holder(std::sync::Arc::clone(&region), std::sync::Arc::clone(&release_rx));
    let h2 = spawn_holder(std::sync::Arc::clone(&region), std::sync::Arc::clone(&release_rx));

    // Give both holder threads a chance to be admitted before the third tries.
    thread::sleep(Duration::from_millis(50));

    let (admitted_tx, admitted_rx) = mpsc::channel();
    let region_for_third = std::sync::Arc::clone(&region);
    let third = thread::spawn(move || {
        let tx = region_for_third.begin(false);
        admitted_tx.send(()).unwrap();
        assert!(tx.end());
    });

    // The third writer must not be admitted while both slots are held.
    assert!(admitted_rx.recv_timeout(Duration::from_millis(100)).is_err());

    release_tx.send(()).unwrap();
    release_tx.send(()).unwrap();

    admitted_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("third writer admitted after the batch drained");

    h1.join().unwrap();
    h2.join().unwrap();
    third.join().unwrap();
}
