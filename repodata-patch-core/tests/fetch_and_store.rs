use mockito::Server;
use repodata_patch_core::config::ChannelConfig;
use repodata_patch_core::contract::{IndexProvider, InstructionsStore};
use repodata_patch_core::fetch::CachedIndexProvider;
use repodata_patch_core::patch::compute_instructions;
use repodata_patch_core::rules::RuleTables;
use repodata_patch_core::store::FileInstructionsStore;
use repodata_patch_core::subdir::Subdir;
use tempfile::tempdir;

const INDEX_BODY: &str = r#"{
    "repodata_version": 1,
    "info": {"subdir": "noarch"},
    "packages": {
        "r-base-3.4.1-0.tar.bz2": {
            "name": "r-base", "version": "3.4.1", "build_number": 0,
            "depends": ["zlib"], "md5": "d41d8cd98f00b204e9800998ecf8427e"
        }
    }
}"#;

#[tokio::test]
async fn test_downloads_index_and_writes_sorted_clone() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/pro/noarch/repodata.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(INDEX_BODY)
        .expect(1)
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let provider = CachedIndexProvider::new(
        dir.path().to_path_buf(),
        ChannelConfig {
            name: "pro".to_string(),
            alias: server.url(),
        },
    );

    let repodata = provider.fetch_index(Subdir::Noarch).await.expect("download should succeed");
    assert_eq!(repodata.packages.len(), 1);

    let clone = std::fs::read_to_string(provider.cache_path(Subdir::Noarch)).unwrap();
    let info = clone.find("\"info\"").unwrap();
    let packages = clone.find("\"packages\"").unwrap();
    let version = clone.find("\"repodata_version\"").unwrap();
    assert!(info < packages && packages < version, "clone keys should be sorted");
    assert!(clone.contains("\n  \"info\": {"));

    // Second fetch is served from the clone.
    let again = provider.fetch_index(Subdir::Noarch).await.unwrap();
    assert_eq!(again.packages.len(), 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_http_error_is_propagated() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/pro/win-32/repodata.json")
        .with_status(404)
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let provider = CachedIndexProvider::new(
        dir.path().to_path_buf(),
        ChannelConfig {
            name: "pro".to_string(),
            alias: server.url(),
        },
    );

    assert!(provider.fetch_index(Subdir::Win32).await.is_err());
    assert!(!provider.cache_path(Subdir::Win32).exists());
}

#[tokio::test]
async fn test_store_writes_stable_instructions_file() {
    let dir = tempdir().unwrap();
    let repodata = serde_json::from_str(INDEX_BODY).unwrap();
    let rules = RuleTables::r_channel().unwrap();
    let instructions = compute_instructions(&repodata, Subdir::Linux64, &rules).unwrap();

    let store = FileInstructionsStore::new(dir.path().to_path_buf());
    let path = store.store(Subdir::Linux64, &instructions).await.unwrap();

    assert_eq!(path, dir.path().join("linux-64").join("patch_instructions.json"));
    let written = std::fs::read_to_string(&path).unwrap();
    let expected = r#"{
  "packages": {
    "r-base-3.4.1-0.tar.bz2": {
      "depends": [
        "zlib",
        "_r-mutex 1.* anacondar_1"
      ]
    }
  },
  "patch_instructions_version": 1,
  "remove": [
    "r-nloptr-1.0.4-r3.2.2_1.tar.bz2"
  ],
  "revoke": []
}
"#;
    assert_eq!(written, expected);
}
