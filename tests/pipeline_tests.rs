//! End-to-end tests for the command pipeline.

use imagedups::commands::{CommandError, CommandSet, Pipeline, RunOptions};
use imagedups::duplicates::{binary_duplicates, similar_groups, Threshold};
use imagedups::hashing::HasherConfig;
use imagedups::output::JsonReporter;
use imagedups::scanner::{AlgorithmError, AlgorithmRegistry, Fingerprint, HashAlgorithm};
use imagedups::store::HashStore;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// One-byte fingerprint taken from the first byte of the file. Files starting
/// with `!` cannot be hashed.
#[derive(Default)]
struct FirstByte {
    calls: AtomicUsize,
}

impl HashAlgorithm for FirstByte {
    fn name(&self) -> &str {
        "firstbyte"
    }

    fn compute(&self, path: &Path) -> Result<Fingerprint, AlgorithmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes = fs::read(path)
            .map_err(|e| AlgorithmError::LoadError(path.to_path_buf(), image::ImageError::IoError(e)))?;
        if bytes.first() == Some(&b'!') {
            return Err(AlgorithmError::InvalidEncoding {
                algorithm: "firstbyte".to_string(),
                value: path.display().to_string(),
            });
        }
        Ok(Fingerprint::from_bytes(vec![bytes.first().copied().unwrap_or(0)]))
    }
}

struct Fixture {
    _dir: TempDir,
    pics: PathBuf,
    db: PathBuf,
}

fn fixture(files: &[(&str, &[u8])]) -> Fixture {
    let dir = tempdir().unwrap();
    let pics = dir.path().join("pics");
    fs::create_dir_all(&pics).unwrap();
    for (name, content) in files {
        let path = pics.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    let db = dir.path().join("test.hashdb");
    Fixture {
        _dir: dir,
        pics,
        db,
    }
}

fn run(
    store: HashStore,
    db: &Path,
    algorithm: Arc<dyn HashAlgorithm>,
    commands: CommandSet,
    options: &RunOptions,
) -> (HashStore, serde_json::Value) {
    let mut out = Vec::new();
    let mut reporter = JsonReporter::new(&mut out, false);
    let mut pipeline = Pipeline::new(store, db.to_path_buf(), algorithm, &mut reporter)
        .with_hasher_config(HasherConfig::default().with_threads(2));
    pipeline.run(commands, options).unwrap();
    let store = pipeline.into_store();
    let report = serde_json::from_slice(&out).unwrap();
    (store, report)
}

fn snapshot_json(db: &Path) -> String {
    let mut text = String::new();
    flate2::read::GzDecoder::new(fs::File::open(db).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    text
}

fn hash_only() -> CommandSet {
    CommandSet {
        hash: true,
        ..CommandSet::default()
    }
}

#[test]
fn test_binary_and_perceptual_passes() {
    // a and b identical; c differs from them in 4 of 8 bits
    let fx = fixture(&[
        ("a.png", &[0x00, 1, 2, 3]),
        ("b.png", &[0x00, 1, 2, 3]),
        ("c.png", &[0x0F, 9, 9, 9]),
    ]);
    let options = RunOptions {
        path: Some(fx.pics.clone()),
        threshold: Threshold::new(80.0).unwrap(),
        ..RunOptions::default()
    };
    let (store, report) = run(
        HashStore::new(),
        &fx.db,
        Arc::new(FirstByte::default()),
        CommandSet::default(),
        &options,
    );

    assert_eq!(store.len(), 2);
    let binary = report["binary"].as_array().unwrap();
    assert_eq!(binary.len(), 1);
    let paths: Vec<&str> = binary[0]["paths"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap())
        .collect();
    assert!(paths[0].ends_with("a.png"));
    assert!(paths[1].ends_with("b.png"));

    let similar = report["similar"].as_array().unwrap();
    assert!(similar.iter().all(|group| {
        !group["seed"].as_str().unwrap().ends_with("c.png")
            && group["members"]
                .as_array()
                .unwrap()
                .iter()
                .all(|m| !m["path"].as_str().unwrap().ends_with("c.png"))
    }));
}

#[test]
fn test_hashing_twice_is_idempotent() {
    let fx = fixture(&[("a.png", b"one"), ("b.png", b"two"), ("sub/c.png", b"three")]);
    let algorithm = Arc::new(FirstByte::default());
    let options = RunOptions {
        path: Some(fx.pics.clone()),
        recursive: true,
        ..RunOptions::default()
    };

    let (store, _) = run(HashStore::new(), &fx.db, algorithm.clone(), hash_only(), &options);
    let first = snapshot_json(&fx.db);
    assert_eq!(algorithm.calls.load(Ordering::SeqCst), 3);

    let (_, _) = run(store, &fx.db, algorithm.clone(), hash_only(), &options);
    assert_eq!(snapshot_json(&fx.db), first);
    assert_eq!(algorithm.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_renamed_file_reuses_fingerprint_across_runs() {
    let fx = fixture(&[("before.png", b"pixels")]);
    let algorithm = Arc::new(FirstByte::default());
    let options = RunOptions {
        path: Some(fx.pics.clone()),
        ..RunOptions::default()
    };

    run(HashStore::new(), &fx.db, algorithm.clone(), hash_only(), &options);
    fs::rename(fx.pics.join("before.png"), fx.pics.join("after.png")).unwrap();

    // Fresh process: reload from disk, cleanup drops the old name, hash re-attaches
    let store = HashStore::load(&fx.db).unwrap();
    let commands = CommandSet {
        hash: true,
        cleanup: true,
        ..CommandSet::default()
    };
    let (store, report) = run(store, &fx.db, algorithm.clone(), commands, &options);

    assert_eq!(algorithm.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.len(), 1);
    let aliases: Vec<_> = store.records()[0].aliases.iter().collect();
    assert_eq!(aliases, vec![&fx.pics.join("after.png")]);
    assert!(report["removed"][0]["path"]
        .as_str()
        .unwrap()
        .ends_with("before.png"));
}

#[test]
fn test_remove_and_prune_end_to_end() {
    let fx = fixture(&[("old/a.png", b"a"), ("old/sub/b.png", b"b"), ("keep/c.png", b"c")]);
    let algorithm = Arc::new(FirstByte::default());
    let options = RunOptions {
        path: Some(fx.pics.clone()),
        recursive: true,
        ..RunOptions::default()
    };
    let (store, _) = run(HashStore::new(), &fx.db, algorithm.clone(), hash_only(), &options);
    assert_eq!(store.len(), 3);

    let remove = CommandSet {
        remove: true,
        ..CommandSet::default()
    };
    let options = RunOptions {
        path: Some(fx.pics.join("old")),
        recursive: true,
        ..RunOptions::default()
    };
    let (store, report) = run(store, &fx.db, algorithm.clone(), remove, &options);
    assert_eq!(report["removed"].as_array().unwrap().len(), 2);
    assert_eq!(store.len(), 3);
    assert_eq!(HashStore::load(&fx.db).unwrap().len(), 3);

    let prune = CommandSet {
        prune: true,
        ..CommandSet::default()
    };
    let (store, report) = run(store, &fx.db, algorithm, prune, &RunOptions::default());
    assert_eq!(report["pruned"], 2);
    assert_eq!(store.len(), 1);
    assert_eq!(HashStore::load(&fx.db).unwrap().len(), 1);
}

#[test]
fn test_hash_without_path_uses_known_directories() {
    let fx = fixture(&[("a.png", b"a")]);
    let algorithm = Arc::new(FirstByte::default());
    let options = RunOptions {
        path: Some(fx.pics.clone()),
        ..RunOptions::default()
    };
    let (store, _) = run(HashStore::new(), &fx.db, algorithm.clone(), hash_only(), &options);

    fs::write(fx.pics.join("new.png"), b"n").unwrap();
    let (store, _) = run(store, &fx.db, algorithm, hash_only(), &RunOptions::default());
    assert_eq!(store.len(), 2);
}

#[test]
fn test_sample_query() {
    let fx = fixture(&[("a.png", &[0x00]), ("b.png", &[0x01]), ("far.png", &[0xFF])]);
    let algorithm: Arc<dyn HashAlgorithm> = Arc::new(FirstByte::default());
    let sample = fx.pics.join("a.png");

    let options = RunOptions {
        path: Some(fx.pics.clone()),
        sample: Some(sample.clone()),
        threshold: Threshold::new(85.0).unwrap(),
        ..RunOptions::default()
    };
    let (_, report) = run(
        HashStore::new(),
        &fx.db,
        algorithm,
        CommandSet::default(),
        &options,
    );

    let matches = report["query"]["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 2);
    assert!(matches[0]["path"].as_str().unwrap().ends_with("a.png"));
    assert_eq!(matches[0]["distance"], 0.0);
    assert!(matches[1]["path"].as_str().unwrap().ends_with("b.png"));
    assert!(report["similar"].as_array().unwrap().is_empty());
}

#[test]
fn test_real_images_in_different_formats_group_together() {
    let dir = tempdir().unwrap();
    let pics = dir.path().join("pics");
    fs::create_dir_all(&pics).unwrap();

    let gradient = image::RgbImage::from_fn(64, 64, |x, y| image::Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
    gradient.save(pics.join("gradient.png")).unwrap();
    gradient.save(pics.join("gradient.tiff")).unwrap();

    let registry = AlgorithmRegistry::with_defaults();
    let dct = registry.get("dct").unwrap();
    let db = dir.path().join("real.hashdb");
    let options = RunOptions {
        path: Some(pics.clone()),
        ..RunOptions::default()
    };
    let (store, _) = run(HashStore::new(), &db, dct.clone(), hash_only(), &options);

    // Different bytes, so two records; same pixels, so distance 0
    assert_eq!(store.len(), 2);
    assert!(binary_duplicates(&store).is_empty());
    let groups = similar_groups(&store, dct.as_ref(), Threshold::new(100.0).unwrap());
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].members[0].distance, 0.0);
}

#[test]
fn test_failed_batch_saves_progress_before_the_failure() {
    let fx = fixture(&[("1.png", b"ok-1"), ("2.png", b"!bad"), ("3.png", b"ok-3")]);
    let options = RunOptions {
        path: Some(fx.pics.clone()),
        ..RunOptions::default()
    };

    let mut out = Vec::new();
    let mut reporter = JsonReporter::new(&mut out, false);
    let mut pipeline = Pipeline::new(
        HashStore::new(),
        fx.db.clone(),
        Arc::new(FirstByte::default()),
        &mut reporter,
    )
    .with_hasher_config(HasherConfig::default().with_threads(2));
    let err = pipeline.run(hash_only(), &options).unwrap_err();
    drop(pipeline);

    assert!(matches!(
        err.downcast_ref::<CommandError>(),
        Some(CommandError::HashingIncomplete { failed: 1, total: 1, .. })
    ));
    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(report["removed"].as_array().unwrap().is_empty());

    let saved = HashStore::load(&fx.db).unwrap();
    assert_eq!(saved.len(), 3);
    let fingerprint_of = |name: &str| {
        saved
            .records()
            .iter()
            .find(|r| r.aliases.contains(&fx.pics.join(name)))
            .map(|r| r.fingerprint("firstbyte").map(str::to_string))
            .unwrap()
    };
    assert_eq!(fingerprint_of("1.png"), Some("6F".to_string()));
    assert_eq!(fingerprint_of("2.png"), None);
    assert_eq!(fingerprint_of("3.png"), None);
}
