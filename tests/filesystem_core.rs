mod common;

use common::{open_params, Fixture};
use smb_filesystem_core::disposition::CreateDisposition;

#[tokio::test]
async fn write_then_read_back_round_trips_through_the_driver() {
    let fixture = Fixture::new();

    let (id, file) =
        fixture.tree.open("/greeting.txt", &open_params("/greeting.txt", CreateDisposition::OpenIf)).await.unwrap();
    assert_eq!(file.size(), 0);

    fixture.tree.device.disk.write_file(&file, 0, b"hello, share").await.unwrap();
    assert_eq!(file.size(), 12);

    let mut buf = [0u8; 5];
    let n = fixture.tree.device.disk.read_file(&file, 7, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"share");

    fixture.tree.remove_file(id).await.unwrap();
    assert_eq!(fixture.tree.open_file_count(), 0);
}

#[tokio::test]
async fn opening_a_missing_file_without_create_fails() {
    let fixture = Fixture::new();
    let err = fixture.tree.open("/missing.txt", &open_params("/missing.txt", CreateDisposition::Open)).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn create_then_open_existing_does_not_truncate() {
    let fixture = Fixture::new();
    let (id, file) =
        fixture.tree.open("/a.txt", &open_params("/a.txt", CreateDisposition::Create)).await.unwrap();
    fixture.tree.device.disk.write_file(&file, 0, b"persisted").await.unwrap();
    fixture.tree.remove_file(id).await.unwrap();

    let (_, reopened) = fixture.tree.open("/a.txt", &open_params("/a.txt", CreateDisposition::OpenIf)).await.unwrap();
    assert_eq!(reopened.size(), 9);
}

#[tokio::test]
async fn directories_list_their_children_through_start_search() {
    let fixture = Fixture::new();
    fixture
        .tree
        .device
        .disk
        .create_directory("/docs", &open_params("/docs", CreateDisposition::Create))
        .await
        .unwrap();
    let (id, _) = fixture.tree.open("/docs/readme.txt", &open_params("/docs/readme.txt", CreateDisposition::Create)).await.unwrap();
    fixture.tree.remove_file(id).await.unwrap();

    let mut search = fixture.tree.device.disk.start_search("/docs/*", 0).await.unwrap();
    assert_eq!(search.next_file_name().unwrap().as_deref(), Some("readme.txt"));
    assert_eq!(search.next_file_name().unwrap(), None);
}
