use pathex_cache::{prune_stale_releases, ArtifactCache, CacheError, CacheKey};
use pathex_core::{EntityId, Format, ProfileSet, QualityRange};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn key(owner: &str, format: Format) -> CacheKey {
    let profiles = ProfileSet::new(["modern", "standard"], "modern").unwrap();
    CacheKey::new(
        EntityId::parse(owner).unwrap(),
        profiles.resolve(Some("standard")).unwrap(),
        format,
        QualityRange::default().parse(Some(4)).unwrap(),
    )
}

#[test]
fn concurrent_misses_converge_on_one_complete_file() {
    let tmp = TempDir::new().unwrap();
    let cache = Arc::new(ArtifactCache::open(tmp.path(), 90).unwrap());
    let key = key("R-HSA-100", Format::Png);
    let renders = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        let key = key.clone();
        let renders = renders.clone();
        handles.push(thread::spawn(move || {
            let artifact = cache
                .lookup_or_render::<_, CacheError>(Some(&key), Format::Png, || {
                    renders.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![42; 64 * 1024])
                })
                .unwrap();
            artifact.read().unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.join().unwrap(), vec![42; 64 * 1024]);
    }

    assert!(renders.load(Ordering::SeqCst) >= 1);
    let dir = cache.path_for(&key).parent().unwrap().to_path_buf();
    let names: Vec<String> = fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["R-HSA-100-q4.png".to_string()]);
}

#[test]
fn decorated_renders_never_touch_the_release_tree() {
    let tmp = TempDir::new().unwrap();
    let cache = ArtifactCache::open(tmp.path(), 90).unwrap();
    let mut renders = 0;

    for _ in 0..2 {
        let artifact = cache
            .lookup_or_render::<_, CacheError>(None, Format::Svg, || {
                renders += 1;
                Ok(b"<svg/>".to_vec())
            })
            .unwrap();
        assert!(artifact.is_ephemeral());
    }
    assert_eq!(renders, 2);
    assert_eq!(fs::read_dir(cache.release_dir()).unwrap().count(), 0);
    assert_eq!(fs::read_dir(cache.scratch_dir()).unwrap().count(), 0);
}

#[test]
fn bumping_the_release_starts_cold_and_prunes_the_old_tree() {
    let tmp = TempDir::new().unwrap();
    let old = ArtifactCache::open(tmp.path(), 89).unwrap();
    let key = key("R-HSA-7", Format::Sbgn);
    old.put(&key, b"<sbgn/>").unwrap();

    let current = ArtifactCache::open(tmp.path(), 90).unwrap();
    assert!(current.get(&key).is_none());

    let report = prune_stale_releases(tmp.path(), current.release()).unwrap();
    assert_eq!(report.removed_releases, vec![89]);
    assert!(!old.release_dir().exists());
    assert!(current.release_dir().exists());
}
