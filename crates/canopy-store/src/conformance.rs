//! Behaviour every [`BackingStore`] must share, run against each engine.

use std::time::Instant;

use crate::traits::BackingStore;

pub(crate) async fn exercise(store: &dyn BackingStore) {
    // Records
    assert_eq!(store.get("resources", "/d").await.unwrap(), None);
    assert!(!store.exists("resources", "/d").await.unwrap());

    store.put("resources", "/d", b"one".to_vec()).await.unwrap();
    assert!(store.exists("resources", "/d").await.unwrap());
    assert_eq!(
        store.get("resources", "/d").await.unwrap(),
        Some(b"one".to_vec())
    );

    store.put("resources", "/d", b"two".to_vec()).await.unwrap();
    assert_eq!(
        store.get("resources", "/d").await.unwrap(),
        Some(b"two".to_vec())
    );

    // Same id in another table is a different record.
    assert!(!store.exists("completeness", "/d").await.unwrap());

    assert!(store.delete("resources", "/d").await.unwrap());
    assert!(!store.delete("resources", "/d").await.unwrap());
    assert!(!store.exists("resources", "/d").await.unwrap());

    store
        .put_as_of("completeness", "RESOURCE:/d", b"{}".to_vec(), Instant::now())
        .await
        .unwrap();
    assert!(store.exists("completeness", "RESOURCE:/d").await.unwrap());
    assert!(store.delete("completeness", "RESOURCE:/d").await.unwrap());

    // Sets
    assert!(store.members("children", "/d").await.unwrap().is_empty());
    for member in ["/d/c", "/d/a", "/d/b", "/d/a"] {
        store.add_member("children", "/d", member).await.unwrap();
    }
    assert_eq!(
        store.members("children", "/d").await.unwrap(),
        vec!["/d/a", "/d/b", "/d/c"]
    );
    assert!(store.members("children", "/e").await.unwrap().is_empty());
    assert!(store.members("type_index", "/d").await.unwrap().is_empty());

    assert!(store.remove_member("children", "/d", "/d/b").await.unwrap());
    assert!(!store.remove_member("children", "/d", "/d/b").await.unwrap());
    assert_eq!(
        store.members("children", "/d").await.unwrap(),
        vec!["/d/a", "/d/c"]
    );

    assert_eq!(store.clear_members("children", "/d").await.unwrap(), 2);
    assert_eq!(store.clear_members("children", "/d").await.unwrap(), 0);
    assert!(store.members("children", "/d").await.unwrap().is_empty());

    assert!(!store.backend_name().is_empty());
}
