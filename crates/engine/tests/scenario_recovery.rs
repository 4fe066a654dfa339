mod support;

use common::PageType;
use engine::{Database, IndexSlot};
use tempfile::NamedTempFile;

#[test]
fn reopening_after_an_unflushed_crash_replays_every_committed_transaction() {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();

    let first_pid;
    let last_pid;
    {
        let db = Database::open(&path).unwrap();
        let index = db.open_index(IndexSlot::FileTime, 9, 17).unwrap();

        let mut pids = Vec::new();
        for i in 0u64..50 {
            let trx = db.begin();
            let trx_id = trx.trx_id();
            let pid = db.claim(trx_id, 72, PageType::FileFixedRow).unwrap();
            db.insert(trx_id, pid, 72, &[i as u8; 72]).unwrap();
            let mut key = vec![0u8; 8];
            key.copy_from_slice(&i.to_be_bytes());
            index.insert(&key, &pid.to_bytes(), db.wal(), trx_id).unwrap();
            trx.commit().unwrap();
            pids.push(pid);
        }
        first_pid = pids[0];
        last_pid = pids[49];
        // `db` is dropped here without calling `close`, leaving whatever
        // never made it past the buffer cache unflushed.
    }

    let db2 = Database::open(&path).unwrap();
    assert_eq!(db2.recovered_transactions(), 50);

    let index2 = db2.open_index(IndexSlot::FileTime, 9, 17).unwrap();
    assert!(index2.get(&0u64.to_be_bytes()).unwrap().is_some());
    assert!(index2.get(&49u64.to_be_bytes()).unwrap().is_some());

    assert_eq!(db2.get(first_pid, 72).unwrap(), vec![0u8; 72]);
    assert_eq!(db2.get(last_pid, 72).unwrap(), vec![49u8; 72]);
}
