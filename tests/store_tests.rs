// Integration tests for the drop store and cloud sync
//
// These tests drive the store through its handle, with a JSON repository in
// a temporary directory and an in-memory remote standing in for the cloud.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hearhere_mini::cloud::{CloudMirror, RemoteDrop, RemoteError, RemoteSource};
use hearhere_mini::drops::{AudioDrop, AudioRef, Coordinate, MergePolicy};
use hearhere_mini::storage::{AudioStorage, DropRepository, JsonDropRepository};
use hearhere_mini::store::{DropEvent, DropStore, StoreHandle, SyncError};
use hearhere_mini::RecordingResult;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use uuid::Uuid;

/// In-memory remote collection
#[derive(Default)]
struct MemoryRemote {
    drops: Mutex<Vec<RemoteDrop>>,
    saved: Mutex<Vec<(AudioDrop, Vec<u8>)>>,
    failing: Mutex<bool>,
}

impl MemoryRemote {
    fn with_drops(drops: Vec<RemoteDrop>) -> Arc<Self> {
        Arc::new(Self {
            drops: Mutex::new(drops),
            ..Default::default()
        })
    }

    fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    fn saved(&self) -> Vec<(AudioDrop, Vec<u8>)> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteSource for MemoryRemote {
    async fn fetch_all(&self) -> Result<Vec<RemoteDrop>, RemoteError> {
        if *self.failing.lock().unwrap() {
            return Err(RemoteError::Request("connection reset".to_string()));
        }
        Ok(self.drops.lock().unwrap().clone())
    }

    async fn save(&self, drop: &AudioDrop, audio: &[u8]) -> Result<(), RemoteError> {
        if *self.failing.lock().unwrap() {
            return Err(RemoteError::Rejected("quota exceeded".to_string()));
        }
        self.saved.lock().unwrap().push((drop.clone(), audio.to_vec()));
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct Fixture {
    _temp_dir: TempDir,
    drops_path: std::path::PathBuf,
    storage: AudioStorage,
}

impl Fixture {
    fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let drops_path = temp_dir.path().join("drops.json");
        let storage = AudioStorage::new(temp_dir.path().join("audio"));
        storage.ensure_dir()?;

        Ok(Self {
            _temp_dir: temp_dir,
            drops_path,
            storage,
        })
    }

    fn open(&self) -> (StoreHandle, tokio::task::JoinHandle<()>) {
        let repository = JsonDropRepository::new(&self.drops_path);
        StoreHandle::spawn(DropStore::open(Box::new(repository), MergePolicy::RemoteWins))
    }

    fn saved_on_disk(&self) -> Result<Vec<AudioDrop>> {
        JsonDropRepository::new(&self.drops_path).load_all()
    }
}

fn drop_at(id: u128, secs: i64, filename: &str) -> AudioDrop {
    AudioDrop::with_id(
        Uuid::from_u128(id),
        Utc.timestamp_opt(secs, 0).unwrap(),
        Coordinate::new(51.5, -0.12),
        3.0,
        AudioRef::file(filename),
    )
}

#[tokio::test]
async fn test_add_persists_and_notifies() -> Result<()> {
    let fixture = Fixture::new()?;
    let (handle, _task) = fixture.open();
    let mut events = handle.subscribe();

    let drop = drop_at(1, 100, "drop-1.wav");
    assert!(handle.add(drop.clone()).await?);
    assert!(!handle.add(drop.clone()).await?, "Duplicate id should be ignored");

    assert_eq!(handle.snapshot().await?, vec![drop.clone()]);
    assert_eq!(handle.get(drop.id).await?, Some(drop.clone()));
    assert_eq!(fixture.saved_on_disk()?, vec![drop.clone()]);
    assert_eq!(events.recv().await?, DropEvent::Added { id: drop.id });

    Ok(())
}

#[tokio::test]
async fn test_record_turns_clip_into_drop() -> Result<()> {
    let fixture = Fixture::new()?;
    let (handle, _task) = fixture.open();

    let recording = RecordingResult {
        id: Uuid::new_v4(),
        file_path: fixture.storage.base_dir().join("drop-20261019T074300.000Z.wav"),
        filename: "drop-20261019T074300.000Z.wav".to_string(),
        duration_sec: 12.5,
    };
    let coordinate = Coordinate::new(40.7, -74.0);

    let drop = handle.record(&recording, coordinate).await?;

    assert_eq!(drop.id, recording.id);
    assert_eq!(drop.coordinate, coordinate);
    assert_eq!(drop.duration_sec, 12.5);
    assert_eq!(drop.audio, AudioRef::file("drop-20261019T074300.000Z.wav"));
    assert_eq!(handle.snapshot().await?, vec![drop]);

    Ok(())
}

#[tokio::test]
async fn test_remove_and_nearby() -> Result<()> {
    let fixture = Fixture::new()?;
    let (handle, _task) = fixture.open();

    let here = drop_at(1, 100, "a.wav");
    let elsewhere = AudioDrop::new(Coordinate::new(-33.9, 151.2), 1.0, AudioRef::file("b.wav"));
    handle.add(here.clone()).await?;
    handle.add(elsewhere.clone()).await?;

    assert_eq!(handle.nearby(Coordinate::new(51.5, -0.12), 100.0).await?, vec![here.clone()]);

    let mut events = handle.subscribe();
    assert_eq!(handle.remove(here.id).await?, Some(here.clone()));
    assert_eq!(handle.remove(here.id).await?, None);
    assert_eq!(events.recv().await?, DropEvent::Removed { id: here.id });
    assert_eq!(fixture.saved_on_disk()?, vec![elsewhere]);

    Ok(())
}

#[tokio::test]
async fn test_collection_survives_restart() -> Result<()> {
    let fixture = Fixture::new()?;

    let (handle, task) = fixture.open();
    let drops = vec![drop_at(1, 100, "a.wav"), drop_at(2, 200, "b.wav")];
    for drop in &drops {
        handle.add(drop.clone()).await?;
    }
    drop(handle);
    task.await?;

    let (handle, _task) = fixture.open();
    assert_eq!(handle.snapshot().await?, drops);

    Ok(())
}

#[tokio::test]
async fn test_sync_merges_and_materializes_assets() -> Result<()> {
    let fixture = Fixture::new()?;
    let (handle, _task) = fixture.open();

    let local = drop_at(1, 100, "drop-1.wav");
    handle.add(local.clone()).await?;

    let remote = MemoryRemote::with_drops(vec![
        RemoteDrop::with_asset(drop_at(2, 50, "drop-2.wav"), b"remote audio".to_vec()),
        RemoteDrop::new(drop_at(3, 150, "drop-3.wav")),
    ]);
    let cloud = CloudMirror::new(remote.clone(), fixture.storage.clone());

    let mut events = handle.subscribe();
    let report = handle.sync(&cloud).await?.expect("cloud is enabled");

    assert_eq!(report.fetched, 2);
    assert_eq!(report.total, 3);
    assert!(report.changed);
    assert_eq!(events.recv().await?, DropEvent::Reconciled { total: 3 });

    let ids: Vec<u128> = handle.snapshot().await?.iter().map(|d| d.id.as_u128()).collect();
    assert_eq!(ids, vec![2, 1, 3]);
    assert_eq!(fixture.storage.read("drop-2.wav")?, b"remote audio".to_vec());
    assert_eq!(fixture.saved_on_disk()?.len(), 3);

    // Same remote again: nothing changes
    let again = handle.sync(&cloud).await?.expect("cloud is enabled");
    assert!(!again.changed);
    assert_eq!(again.total, 3);

    Ok(())
}

#[tokio::test]
async fn test_sync_keeps_existing_audio_file() -> Result<()> {
    let fixture = Fixture::new()?;
    let (handle, _task) = fixture.open();
    std::fs::write(fixture.storage.base_dir().join("drop-2.wav"), b"local audio")?;

    let remote = MemoryRemote::with_drops(vec![RemoteDrop::with_asset(
        drop_at(2, 50, "drop-2.wav"),
        b"remote audio".to_vec(),
    )]);
    let cloud = CloudMirror::new(remote, fixture.storage.clone());

    handle.sync(&cloud).await?;

    assert_eq!(fixture.storage.read("drop-2.wav")?, b"local audio".to_vec());

    Ok(())
}

#[tokio::test]
async fn test_sync_skips_drops_with_unusable_filenames() -> Result<()> {
    let fixture = Fixture::new()?;
    let (handle, _task) = fixture.open();

    let remote = MemoryRemote::with_drops(vec![
        RemoteDrop::with_asset(drop_at(2, 50, "drop-2.wav"), b"good audio".to_vec()),
        RemoteDrop::with_asset(drop_at(3, 60, "../evil.wav"), b"evil audio".to_vec()),
        RemoteDrop::new(drop_at(4, 70, "../../etc/passwd")),
    ]);
    let cloud = CloudMirror::new(remote, fixture.storage.clone());

    let report = handle.sync(&cloud).await?.expect("cloud is enabled");

    assert_eq!(report.fetched, 1);
    assert_eq!(report.total, 1);
    assert_eq!(fixture.storage.read("drop-2.wav")?, b"good audio".to_vec());
    assert!(!fixture.storage.base_dir().parent().unwrap().join("evil.wav").exists());

    let stored: Vec<Option<String>> = fixture
        .saved_on_disk()?
        .iter()
        .map(|d| d.audio.filename().map(str::to_string))
        .collect();
    assert_eq!(stored, vec![Some("drop-2.wav".to_string())]);

    Ok(())
}

#[tokio::test]
async fn test_sync_fails_when_audio_cannot_be_written() -> Result<()> {
    let fixture = Fixture::new()?;
    let (handle, _task) = fixture.open();

    let local = drop_at(1, 100, "drop-1.wav");
    handle.add(local.clone()).await?;

    // The audio directory path is taken by a regular file
    let blocked = fixture.drops_path.with_file_name("blocked");
    std::fs::write(&blocked, b"not a directory")?;
    let storage = AudioStorage::new(&blocked);

    let remote = MemoryRemote::with_drops(vec![
        RemoteDrop::new(drop_at(2, 50, "drop-2.wav")),
        RemoteDrop::with_asset(drop_at(3, 60, "drop-3.wav"), b"audio".to_vec()),
    ]);
    let cloud = CloudMirror::new(remote, storage);

    let result = handle.sync(&cloud).await;

    assert!(matches!(
        result,
        Err(SyncError::Remote(RemoteError::Materialize(_)))
    ));
    assert_eq!(handle.snapshot().await?, vec![local.clone()]);
    assert_eq!(fixture.saved_on_disk()?, vec![local]);

    Ok(())
}

#[tokio::test]
async fn test_failed_sync_leaves_collection_untouched() -> Result<()> {
    let fixture = Fixture::new()?;
    let (handle, _task) = fixture.open();

    let local = drop_at(1, 100, "drop-1.wav");
    handle.add(local.clone()).await?;

    let remote = MemoryRemote::with_drops(vec![RemoteDrop::new(drop_at(2, 50, "drop-2.wav"))]);
    remote.set_failing(true);
    let cloud = CloudMirror::new(remote, fixture.storage.clone());

    let result = handle.sync(&cloud).await;

    assert!(matches!(result, Err(SyncError::Remote(RemoteError::Request(_)))));
    assert_eq!(handle.snapshot().await?, vec![local.clone()]);
    assert_eq!(fixture.saved_on_disk()?, vec![local]);

    Ok(())
}

#[tokio::test]
async fn test_disabled_cloud_is_a_noop() -> Result<()> {
    let fixture = Fixture::new()?;
    let (handle, _task) = fixture.open();
    let cloud = CloudMirror::disabled(fixture.storage.clone());

    let drop = drop_at(1, 100, "drop-1.wav");
    handle.add(drop.clone()).await?;

    assert!(!cloud.is_enabled());
    assert_eq!(handle.sync(&cloud).await?, None);
    assert!(cloud.save(&drop).await.is_ok());
    assert_eq!(cloud.push_all(&[drop]).await, 0);

    Ok(())
}

#[tokio::test]
async fn test_push_all_sends_audio_bytes() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture.storage.materialize("drop-1.wav", b"clip one")?;

    let remote = MemoryRemote::with_drops(Vec::new());
    let cloud = CloudMirror::new(remote.clone(), fixture.storage.clone());

    let on_disk = drop_at(1, 100, "drop-1.wav");
    let inline = AudioDrop::new(Coordinate::new(0.0, 0.0), 1.0, AudioRef::inline(vec![7, 7]));
    let missing = drop_at(3, 300, "drop-3.wav");

    let pushed = cloud.push_all(&[on_disk.clone(), inline.clone(), missing]).await;
    assert_eq!(pushed, 2, "Drop without local audio cannot be pushed");

    let mut saved = remote.saved();
    saved.sort_by_key(|(drop, _)| drop.created_at);
    assert_eq!(saved.len(), 2);
    assert!(saved.contains(&(on_disk, b"clip one".to_vec())));
    assert!(saved.contains(&(inline, vec![7, 7])));

    remote.set_failing(true);
    assert_eq!(cloud.push_all(&[drop_at(1, 100, "drop-1.wav")]).await, 0);

    Ok(())
}
