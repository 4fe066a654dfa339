mod support;

use btree::{InternalNode, LeafNode, NodeHeader};
use common::{PageType, NODE_HEADER_LEN};
use engine::{Database, IndexSlot};
use support::file_row::{fid_key, FID_ENTRY_SIZE, FID_KEY_SIZE};
use tempfile::NamedTempFile;

#[test]
fn two_hundred_inserts_split_into_a_multi_leaf_tree_with_an_internal_root() {
    let tmp = NamedTempFile::new().unwrap();
    let db = Database::open(tmp.path()).unwrap();
    let index = db.open_index(IndexSlot::FileId, FID_KEY_SIZE, FID_ENTRY_SIZE).unwrap();

    for i in 0u32..200 {
        let uid = i.to_be_bytes();
        let mut uid16 = [0u8; 16];
        uid16[12..16].copy_from_slice(&uid);
        let hash = support::file_row::hash16(&uid16);
        let key = fid_key(uid16, hash);

        let trx = db.begin();
        let trx_id = trx.trx_id();
        index
            .insert(&key, &common::PageId::new(i as u64).to_bytes(), db.wal(), trx_id)
            .unwrap();
        trx.commit().unwrap();
    }

    let root_id = index.root_id().unwrap();
    let root_page = db.store().read_page(root_id).unwrap();
    let root_header = NodeHeader::decode(&root_page.body[..NODE_HEADER_LEN]).unwrap();
    assert_eq!(root_header.ty, PageType::IndexInternal);

    let mut node_id = root_id;
    let mut node_header = root_header;
    let mut leaf_id = loop {
        if node_header.ty == PageType::IndexLeaf {
            break node_id;
        }
        let page = db.store().read_page(node_id).unwrap();
        let node = InternalNode::decode(&page.body[NODE_HEADER_LEN..], node_header).unwrap();
        node_id = *node.children.first().unwrap();
        let next_page = db.store().read_page(node_id).unwrap();
        node_header = NodeHeader::decode(&next_page.body[..NODE_HEADER_LEN]).unwrap();
    };

    let mut leaf_count = 0;
    loop {
        let page = db.store().read_page(leaf_id).unwrap();
        let header = NodeHeader::decode(&page.body[..NODE_HEADER_LEN]).unwrap();
        let leaf = LeafNode::decode(&page.body[NODE_HEADER_LEN..], header).unwrap();
        leaf_count += 1;
        if leaf.next == 0 {
            break;
        }
        leaf_id = leaf.next;
    }

    assert!(leaf_count >= 3, "expected at least 3 leaves, found {leaf_count}");
}
