//! Tree Invariant Tests
//!
//! Structural invariants of the three ordered trees:
//! - In-order traversal is always sorted, duplicates included
//! - AVL stays balanced under adversarial insertion orders
//! - Red-Black coloring and black-height hold after every insert
//! - The unbalanced BST degrades exactly as expected (it is the baseline)

use ratedb::filter::RatingIndex;
use ratedb::tree::{AvlTree, BinarySearchTree, RedBlackTree};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

fn record(rating: f64) -> serde_json::Value {
    json!({ "overall_rating": rating })
}

/// Mixed insertion order with duplicates, the shape real rating data has.
fn sample_ratings() -> Vec<f64> {
    vec![5.0, 3.0, 8.5, 3.0, 1.0, 9.5, 4.5, 3.0, 7.0, 2.5, 4.5, 6.0]
}

fn fill<T: RatingIndex>(index: &mut T, ratings: &[f64]) {
    for &r in ratings {
        index.insert(r, record(r)).unwrap();
    }
}

// =============================================================================
// Shared Ordering Invariants
// =============================================================================

/// All three trees produce the same sorted key sequence for the same input.
#[test]
fn test_inorder_agrees_across_trees() {
    let ratings = sample_ratings();

    let mut bst = BinarySearchTree::new();
    let mut avl = AvlTree::new();
    let mut rbt = RedBlackTree::new();
    fill(&mut bst, &ratings);
    fill(&mut avl, &ratings);
    fill(&mut rbt, &ratings);

    let mut expected = ratings.clone();
    expected.sort_by(f64::total_cmp);

    assert_eq!(bst.keys_in_order(), expected);
    assert_eq!(avl.keys_in_order(), expected);
    assert_eq!(rbt.keys_in_order(), expected);
}

/// Duplicate keys are all retained and all findable, in every tree.
#[test]
fn test_duplicates_retained_everywhere() {
    let ratings = sample_ratings();

    let mut bst = BinarySearchTree::new();
    let mut avl = AvlTree::new();
    let mut rbt = RedBlackTree::new();
    fill(&mut bst, &ratings);
    fill(&mut avl, &ratings);
    fill(&mut rbt, &ratings);

    for tree in [&bst as &dyn RatingIndex, &avl, &rbt] {
        assert_eq!(tree.get_size(), ratings.len());
        assert_eq!(tree.search(3.0).len(), 3);
        assert_eq!(tree.search(4.5).len(), 2);
        assert_eq!(tree.search(99.0).len(), 0);
    }
}

// =============================================================================
// Balance Invariants
// =============================================================================

/// Sorted insertion turns the plain BST into a chain: height equals size.
#[test]
fn test_bst_degenerates_on_sorted_input() {
    let mut bst = BinarySearchTree::new();
    for i in 0..200 {
        bst.insert(i as f64, record(i as f64)).unwrap();
    }
    assert_eq!(bst.get_height(), 200);
}

/// The AVL tree absorbs the same sorted input at logarithmic height.
#[test]
fn test_avl_stays_balanced_on_sorted_input() {
    let mut avl = AvlTree::new();
    for i in 0..1024 {
        avl.insert(i as f64, record(i as f64)).unwrap();
    }
    assert!(avl.is_balanced());
    // 1.44 * log2(1024) rounds to 15; sequential fill stays well below
    assert!(avl.get_height() <= 15, "height = {}", avl.get_height());
}

/// AVL balance survives descending and zig-zag insertion orders too.
#[test]
fn test_avl_balanced_under_adversarial_orders() {
    let mut descending = AvlTree::new();
    for i in (0..512).rev() {
        descending.insert(i as f64, record(i as f64)).unwrap();
    }
    assert!(descending.is_balanced());

    let mut zigzag = AvlTree::new();
    for i in 0..256 {
        zigzag.insert(i as f64, record(i as f64)).unwrap();
        zigzag
            .insert((1000 - i) as f64, record((1000 - i) as f64))
            .unwrap();
    }
    assert!(zigzag.is_balanced());
}

/// Red-Black invariants hold after every single insertion.
#[test]
fn test_red_black_invariants_after_each_insert() {
    let mut rbt = RedBlackTree::new();
    for i in 0..512 {
        rbt.insert(i as f64, record(i as f64)).unwrap();
        assert!(
            rbt.black_height().is_some(),
            "red-black violation after insert {}",
            i
        );
    }
    // height <= 2 * log2(n + 1)
    assert!(rbt.get_height() <= 18, "height = {}", rbt.get_height());
}

/// Duplicate-heavy input keeps both balanced trees valid.
#[test]
fn test_balanced_trees_with_duplicate_heavy_input() {
    let mut avl = AvlTree::new();
    let mut rbt = RedBlackTree::new();
    for i in 0..300 {
        let rating = (i % 3) as f64;
        avl.insert(rating, record(rating)).unwrap();
        rbt.insert(rating, record(rating)).unwrap();
    }
    assert!(avl.is_balanced());
    assert!(rbt.black_height().is_some());
    assert_eq!(avl.search(0.0).len(), 100);
    assert_eq!(rbt.search(0.0).len(), 100);
}

// =============================================================================
// Degenerate-Shape Robustness
// =============================================================================

/// A 50k-node BST chain is traversed and dropped without stack overflow.
#[test]
fn test_deep_bst_chain_survives_traversal_and_drop() {
    let mut bst = BinarySearchTree::new();
    for i in 0..50_000 {
        bst.insert(i as f64, json!({ "i": i })).unwrap();
    }
    assert_eq!(bst.get_height(), 50_000);
    assert_eq!(bst.get_range(0.0, 9.0).len(), 10);
    assert_eq!(bst.get_top_k(1)[0]["i"], json!(49_999));
    drop(bst);
}

// =============================================================================
// Freeze Semantics
// =============================================================================

/// After freeze, every tree rejects insertion but keeps answering queries.
#[test]
fn test_freeze_is_read_only_not_read_nothing() {
    let mut bst = BinarySearchTree::new();
    let mut avl = AvlTree::new();
    let mut rbt = RedBlackTree::new();
    for tree in [&mut bst as &mut dyn RatingIndex, &mut avl, &mut rbt] {
        fill_dyn(tree);
        tree.freeze();
        assert!(tree.is_frozen());
        assert!(tree.insert(2.0, record(2.0)).is_err());
        assert_eq!(tree.search(5.0).len(), 1);
    }
}

fn fill_dyn(index: &mut dyn RatingIndex) {
    for &r in &[5.0, 3.0, 1.0] {
        index.insert(r, record(r)).unwrap();
    }
}
