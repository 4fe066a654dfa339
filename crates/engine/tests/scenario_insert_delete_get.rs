mod support;

use common::PageType;
use engine::{Database, IndexSlot};
use support::file_row::{fid_key, parse_hex16, FileRow, FID_ENTRY_SIZE, FID_KEY_SIZE};
use tempfile::NamedTempFile;

#[test]
fn deleting_a_row_removes_it_from_both_the_page_and_the_index() {
    let tmp = NamedTempFile::new().unwrap();
    let db = Database::open(tmp.path()).unwrap();
    let index = db.open_index(IndexSlot::FileId, FID_KEY_SIZE, FID_ENTRY_SIZE).unwrap();

    let uid = parse_hex16("11111111111111111111111111111111");
    let hash = parse_hex16("22222222222222222222222222222222");
    let row = FileRow {
        uid,
        hash,
        size: 10,
        file_type: 6,
        created_at: 1,
    };
    let key = fid_key(uid, hash);

    let pid = {
        let trx = db.begin();
        let trx_id = trx.trx_id();
        let pid = db.claim(trx_id, 72, PageType::FileFixedRow).unwrap();
        db.insert(trx_id, pid, 72, &row.to_bytes()).unwrap();
        index.insert(&key, &pid.to_bytes(), db.wal(), trx_id).unwrap();
        trx.commit().unwrap();
        pid
    };
    assert!(index.get(&key).unwrap().is_some());

    let trx = db.begin();
    let trx_id = trx.trx_id();
    index.delete(&key, db.wal(), trx_id).unwrap();
    db.delete(trx_id, pid, 72).unwrap();
    trx.commit().unwrap();

    assert!(index.get(&key).unwrap().is_none());
}
