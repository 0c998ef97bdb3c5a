use imagedups::duplicates::{similar_groups, Threshold};
use imagedups::scanner::perceptual::hamming_distance;
use imagedups::scanner::{checksum_file, AlgorithmRegistry, ChecksumMode, Fingerprint};
use imagedups::store::{lifecycle, HashRecord, HashStore};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn arb_record() -> impl Strategy<Value = HashRecord> {
    (
        prop::collection::btree_set("/[a-z]{1,3}/[a-z]{1,5}\\.png", 0..4),
        prop::collection::btree_map("[a-z]{2,8}", "[0-9A-F]{16}", 0..3),
    )
        .prop_map(|(aliases, fingerprints)| HashRecord {
            aliases: aliases.into_iter().map(PathBuf::from).collect::<BTreeSet<_>>(),
            fingerprints: fingerprints.into_iter().collect::<BTreeMap<_, _>>(),
            ..HashRecord::default()
        })
}

proptest! {
    #[test]
    fn test_distance_symmetric_and_normalized(
        a in prop::collection::vec(any::<u8>(), 8),
        b in prop::collection::vec(any::<u8>(), 8),
    ) {
        let a = Fingerprint::from_bytes(a);
        let b = Fingerprint::from_bytes(b);
        let d = hamming_distance(&a, &b);
        prop_assert_eq!(d, hamming_distance(&b, &a));
        prop_assert!((0.0..=1.0).contains(&d));
        prop_assert_eq!(hamming_distance(&a, &a), 0.0);
    }

    #[test]
    fn test_encode_decode_round_trip(bytes in prop::collection::vec(any::<u8>(), 1..32)) {
        let registry = AlgorithmRegistry::with_defaults();
        for name in registry.names() {
            let alg = registry.get(name).unwrap();
            let fp = Fingerprint::from_bytes(bytes.clone());
            prop_assert_eq!(alg.decode(&alg.encode(&fp)).unwrap(), fp);
        }
    }

    #[test]
    fn test_snapshot_round_trip(records in prop::collection::vec(arb_record(), 0..12)) {
        let store = HashStore::from_records(records);
        let restored = HashStore::deserialize(&store.serialize().unwrap()).unwrap();
        prop_assert_eq!(restored.records(), store.records());
    }

    #[test]
    fn test_threshold_boundary_inclusive(bits in 0u32..=64) {
        let distance = f64::from(bits) / 64.0;
        let threshold = Threshold::new((1.0 - distance) * 100.0).unwrap();
        prop_assert!(threshold.accepts(distance));
    }

    #[test]
    fn test_prune_keeps_every_live_record(records in prop::collection::vec(arb_record(), 0..12)) {
        let live = records.iter().filter(|r| !r.aliases.is_empty()).count();
        let mut store = HashStore::from_records(records);
        let before = store.len();
        let pruned = lifecycle::prune(&mut store);
        prop_assert_eq!(store.len(), live);
        prop_assert_eq!(pruned, before - live);
        prop_assert!(store.records().iter().all(|r| !r.aliases.is_empty()));
    }

    #[test]
    fn test_groups_are_disjoint(values in prop::collection::vec(any::<u8>(), 0..20), percent in 0.0f64..=100.0) {
        let records: Vec<HashRecord> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut record = HashRecord::new(PathBuf::from(format!("/p/{i:03}.png")));
                record.fingerprints.insert("dct".to_string(), format!("{v:02X}"));
                record
            })
            .collect();
        let store = HashStore::from_records(records);
        let dct = AlgorithmRegistry::with_defaults().get("dct").unwrap();
        let threshold = Threshold::new(percent).unwrap();

        let mut seen = BTreeSet::new();
        for group in similar_groups(&store, dct.as_ref(), threshold) {
            prop_assert!(!group.members.is_empty());
            for path in group.paths() {
                prop_assert!(seen.insert(path));
            }
            for member in &group.members {
                prop_assert!(threshold.accepts(member.distance));
            }
        }
    }

    #[test]
    fn test_fast_checksum_only_reads_prefix(
        prefix in prop::collection::vec(any::<u8>(), 512),
        tail_a in prop::collection::vec(any::<u8>(), 0..64),
        tail_b in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        fs::write(&a, [prefix.as_slice(), tail_a.as_slice()].concat()).unwrap();
        fs::write(&b, [prefix.as_slice(), tail_b.as_slice()].concat()).unwrap();

        prop_assert_eq!(
            checksum_file(&a, ChecksumMode::Fast).unwrap(),
            checksum_file(&b, ChecksumMode::Fast).unwrap()
        );
    }
}
