// Copyright 2026 the crawler authors.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::collections::HashSet;

use store::{DiscoveredFile, ErrorType, NewUser};

/// All scenarios share one `SqliteStore` instance rooted at a tempfile path
/// fixed before config is first loaded, so they run as ordered steps of a
/// single test rather than parallel tests racing on the same file.
#[tokio::test]
async fn sqlite_store_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("crawler.sqlite");
    std::env::set_var("DB_SQLITE_PATH", db_path.to_str().unwrap());
    std::env::set_var("DB_BACKEND", "sqlite");

    let store = store::connect();
    store.provision().await.unwrap();

    // Users.
    store
        .add_user(NewUser {
            user_id: "google:u1".into(),
            email: "u1@example.com".into(),
            name: "U1".into(),
            provider: "google".into(),
        })
        .await
        .unwrap();
    let user = store.get_user("google:u1").await.unwrap().unwrap();
    assert_eq!(user.user_id, "google:u1");
    let by_key = store.get_user_by_api_key(&user.api_key).await.unwrap();
    assert!(by_key.is_some());

    // Sites and dueness.
    store.add_site("example.com", "google:u1", 24).await.unwrap();
    let due = store.get_due_sites().await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].site_url, "example.com");

    store.update_site_last_processed("example.com", "google:u1").await.unwrap();
    let due_after = store.get_due_sites().await.unwrap();
    assert!(due_after.is_empty(), "just-processed site should not be due again immediately");

    // diff_site_files: discover two files under one schema map.
    let discovered = vec![
        DiscoveredFile { file_url: "https://example.com/a.json".into(), content_type: Some("schema.org".into()) },
        DiscoveredFile { file_url: "https://example.com/b.json".into(), content_type: Some("schema.org".into()) },
    ];
    let (added, removed) = store
        .diff_site_files("example.com", "google:u1", "https://example.com/schema_map.xml", &discovered)
        .await
        .unwrap();
    assert_eq!(added.len(), 2);
    assert!(removed.is_empty());

    // Re-running the same discovery yields no net changes.
    let (added2, removed2) = store
        .diff_site_files("example.com", "google:u1", "https://example.com/schema_map.xml", &discovered)
        .await
        .unwrap();
    assert!(added2.is_empty());
    assert!(removed2.is_empty());

    // Tombstone b.json, leaving only a.json.
    let one_file = vec![discovered[0].clone()];
    let (added3, removed3) = store
        .diff_site_files("example.com", "google:u1", "https://example.com/schema_map.xml", &one_file)
        .await
        .unwrap();
    assert!(added3.is_empty());
    assert_eq!(removed3, vec!["https://example.com/b.json".to_string()]);

    let files = store.list_site_files("example.com", "google:u1").await.unwrap();
    assert_eq!(files.len(), 1, "tombstoned file should not show up as active");

    // Reactivating b.json updates schema_map and flips is_active back on.
    let (added4, _removed4) = store
        .diff_site_files("example.com", "google:u1", "https://example.com/schema_map.xml", &discovered)
        .await
        .unwrap();
    assert_eq!(added4, vec!["https://example.com/b.json".to_string()]);
    let files_after = store.list_site_files("example.com", "google:u1").await.unwrap();
    assert_eq!(files_after.len(), 2);

    // diff_file_ids: first extraction.
    let file_url = "https://example.com/a.json";
    let mut ids: HashSet<String> = HashSet::new();
    ids.insert("a".to_string());
    ids.insert("b".to_string());
    let (added_ids, removed_ids) = store.diff_file_ids(file_url, "google:u1", &ids).await.unwrap();
    assert_eq!(added_ids.len(), 2);
    assert!(removed_ids.is_empty());
    assert_eq!(store.ref_count("a", "google:u1").await.unwrap(), 1);

    // Identical payload produces zero net diff.
    let (added_ids2, removed_ids2) = store.diff_file_ids(file_url, "google:u1", &ids).await.unwrap();
    assert!(added_ids2.is_empty());
    assert!(removed_ids2.is_empty());

    // Remove "b", add "c".
    let mut ids2: HashSet<String> = HashSet::new();
    ids2.insert("a".to_string());
    ids2.insert("c".to_string());
    let (added_ids3, removed_ids3) = store.diff_file_ids(file_url, "google:u1", &ids2).await.unwrap();
    assert_eq!(added_ids3, vec!["c".to_string()]);
    assert_eq!(removed_ids3, vec!["b".to_string()]);
    assert_eq!(store.ref_count("b", "google:u1").await.unwrap(), 0);

    // Wildcard delete path: empty new_ids clears everything for the file.
    let (added_ids4, removed_ids4) = store
        .diff_file_ids(file_url, "google:u1", &HashSet::new())
        .await
        .unwrap();
    assert!(added_ids4.is_empty());
    assert_eq!(removed_ids4.len(), 2);
    assert!(store.list_file_ids(file_url, "google:u1").await.unwrap().is_empty());

    // Errors: log then clear.
    store
        .log_error(file_url, "google:u1", ErrorType::ExtractionFailed, "boom", Some("details"))
        .await
        .unwrap();
    store.clear_errors(file_url, "google:u1").await.unwrap();

    // remove_site hard-deletes files and ids, returning the removed file URLs.
    let removed_files = store.remove_site("example.com", "google:u1").await.unwrap();
    assert_eq!(removed_files.len(), 2);
    assert!(store.list_site_files("example.com", "google:u1").await.unwrap().is_empty());
}
