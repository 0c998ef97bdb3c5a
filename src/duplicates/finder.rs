//! Binary and perceptual duplicate search over a [`HashStore`].
//!
//! All functions respect the store's path scope: only records with an alias
//! under the scope are considered, and only those aliases are reported.

use std::path::Path;

use super::groups::{BinaryDuplicateSet, SimilarGroup, SimilarMember, Threshold};
use crate::scanner::{Fingerprint, HashAlgorithm};
use crate::store::HashStore;

/// A record prepared for perceptual comparison.
struct Candidate<'a> {
    first_alias: &'a Path,
    aliases: Vec<&'a Path>,
    fingerprint: Fingerprint,
}

/// Records holding the same content under more than one visible path.
#[must_use]
pub fn binary_duplicates(store: &HashStore) -> Vec<BinaryDuplicateSet> {
    store
        .scoped_records()
        .filter_map(|(id, record)| {
            let paths = store.visible_aliases(record);
            (paths.len() > 1).then(|| BinaryDuplicateSet {
                record: id,
                paths: paths.into_iter().map(Path::to_path_buf).collect(),
            })
        })
        .collect()
}

/// In-scope records with a decodable fingerprint for `algorithm`.
fn candidates<'a>(store: &'a HashStore, algorithm: &dyn HashAlgorithm) -> Vec<Candidate<'a>> {
    let mut candidates: Vec<Candidate<'a>> = store
        .scoped_records()
        .filter_map(|(id, record)| {
            let encoded = record.fingerprint(algorithm.name())?;
            let fingerprint = match algorithm.decode(encoded) {
                Ok(fp) => fp,
                Err(e) => {
                    log::warn!("Skipping record #{}: {}", id.index(), e);
                    return None;
                }
            };
            let aliases = store.visible_aliases(record);
            let first_alias = *aliases.first()?;
            Some(Candidate {
                first_alias,
                aliases,
                fingerprint,
            })
        })
        .collect();
    candidates.sort_by(|a, b| a.first_alias.cmp(b.first_alias));
    candidates
}

/// Group perceptually similar images.
///
/// Candidates are visited in order of their first visible alias. Each
/// unassigned candidate seeds a group; every later unassigned candidate
/// within `threshold` of the seed joins it. Each record contributes one
/// path, its first visible alias. Groups with no members besides the seed
/// are dropped.
#[must_use]
pub fn similar_groups(
    store: &HashStore,
    algorithm: &dyn HashAlgorithm,
    threshold: Threshold,
) -> Vec<SimilarGroup> {
    let candidates = candidates(store, algorithm);
    let mut assigned = vec![false; candidates.len()];
    let mut groups = Vec::new();

    for (i, seed) in candidates.iter().enumerate() {
        if assigned[i] {
            continue;
        }
        assigned[i] = true;

        let mut members = Vec::new();
        for (j, other) in candidates.iter().enumerate().skip(i + 1) {
            if assigned[j] {
                continue;
            }
            let distance = algorithm.distance(&seed.fingerprint, &other.fingerprint);
            if threshold.accepts(distance) {
                assigned[j] = true;
                members.push(SimilarMember {
                    path: other.first_alias.to_path_buf(),
                    distance,
                });
            }
        }

        if !members.is_empty() {
            groups.push(SimilarGroup {
                seed: seed.first_alias.to_path_buf(),
                members,
            });
        }
    }

    log::debug!(
        "Grouped {} candidates into {} similar groups",
        candidates.len(),
        groups.len()
    );
    groups
}

/// Find every visible alias similar to `sample`.
///
/// Results are sorted by distance, then by path.
#[must_use]
pub fn query(
    store: &HashStore,
    algorithm: &dyn HashAlgorithm,
    sample: &Fingerprint,
    threshold: Threshold,
) -> Vec<SimilarMember> {
    let mut matches: Vec<SimilarMember> = candidates(store, algorithm)
        .into_iter()
        .filter_map(|candidate| {
            let distance = algorithm.distance(sample, &candidate.fingerprint);
            threshold.accepts(distance).then(|| {
                candidate.aliases.into_iter().map(move |path| SimilarMember {
                    path: path.to_path_buf(),
                    distance,
                })
            })
        })
        .flatten()
        .collect();
    matches.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.path.cmp(&b.path))
    });
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::HashRecord;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    /// Fake algorithm over 8-bit fingerprints.
    struct Bits;

    impl HashAlgorithm for Bits {
        fn name(&self) -> &str {
            "bits"
        }

        fn compute(&self, _path: &Path) -> Result<Fingerprint, crate::scanner::AlgorithmError> {
            Ok(Fingerprint::from_bytes(vec![0]))
        }
    }

    fn record(aliases: &[&str], bits: Option<u8>) -> HashRecord {
        let mut fingerprints = BTreeMap::new();
        if let Some(bits) = bits {
            fingerprints.insert("bits".to_string(), format!("{bits:02X}"));
        }
        HashRecord {
            aliases: aliases.iter().map(PathBuf::from).collect(),
            fingerprints,
            ..HashRecord::default()
        }
    }

    fn t(percent: f64) -> Threshold {
        Threshold::new(percent).unwrap()
    }

    #[test]
    fn test_binary_duplicates() {
        let store = HashStore::from_records(vec![
            record(&["/p/a.png", "/p/b.png"], None),
            record(&["/p/c.png"], None),
            record(&[], None),
        ]);
        let sets = binary_duplicates(&store);
        assert_eq!(sets.len(), 1);
        assert_eq!(
            sets[0].paths,
            vec![PathBuf::from("/p/a.png"), PathBuf::from("/p/b.png")]
        );
    }

    #[test]
    fn test_binary_duplicates_respect_scope() {
        let mut store = HashStore::from_records(vec![record(
            &["/p/a.png", "/q/a.png"],
            None,
        )]);
        assert_eq!(binary_duplicates(&store).len(), 1);
        store.filter_by_path(Path::new("/p"));
        assert!(binary_duplicates(&store).is_empty());
    }

    #[test]
    fn test_similar_groups_seeded_and_non_transitive() {
        // a-b differ by 1 bit, b-c by 1 bit, a-c by 2 bits
        let store = HashStore::from_records(vec![
            record(&["/c.png"], Some(0b0000_0011)),
            record(&["/a.png"], Some(0b0000_0000)),
            record(&["/b.png"], Some(0b0000_0001)),
        ]);

        // Max distance 1/8: b joins a's group, c is 2/8 from a and stays out
        let groups = similar_groups(&store, &Bits, t(87.5));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].seed, PathBuf::from("/a.png"));
        assert_eq!(groups[0].members.len(), 1);
        assert_eq!(groups[0].members[0].path, PathBuf::from("/b.png"));
        assert_eq!(groups[0].members[0].distance, 0.125);
    }

    #[test]
    fn test_similar_groups_boundary_inclusive() {
        let store = HashStore::from_records(vec![
            record(&["/a.png"], Some(0b0000_0000)),
            record(&["/b.png"], Some(0b0000_0011)),
        ]);
        assert_eq!(similar_groups(&store, &Bits, t(75.0)).len(), 1);
        assert!(similar_groups(&store, &Bits, t(75.1)).is_empty());
    }

    #[test]
    fn test_similar_groups_skip_records_without_fingerprint() {
        let store = HashStore::from_records(vec![
            record(&["/a.png"], Some(0)),
            record(&["/b.png"], None),
        ]);
        assert!(similar_groups(&store, &Bits, t(0.0)).is_empty());
    }

    #[test]
    fn test_similar_groups_one_alias_per_record() {
        let store = HashStore::from_records(vec![
            record(&["/a.png", "/a-copy.png"], Some(0)),
            record(&["/b.png"], Some(0)),
        ]);
        let groups = similar_groups(&store, &Bits, t(100.0));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].seed, PathBuf::from("/a-copy.png"));
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn test_corrupt_fingerprint_is_skipped() {
        let mut bad = record(&["/bad.png"], None);
        bad.fingerprints.insert("bits".to_string(), "zz".to_string());
        let store = HashStore::from_records(vec![
            bad,
            record(&["/a.png"], Some(0)),
            record(&["/b.png"], Some(0)),
        ]);
        let groups = similar_groups(&store, &Bits, t(100.0));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].seed, PathBuf::from("/a.png"));
    }

    #[test]
    fn test_query_sorted_by_distance_then_path() {
        let store = HashStore::from_records(vec![
            record(&["/z.png", "/y.png"], Some(0b0000_0001)),
            record(&["/exact.png"], Some(0)),
            record(&["/far.png"], Some(0xFF)),
        ]);
        let sample = Fingerprint::from_bytes(vec![0]);
        let matches = query(&store, &Bits, &sample, t(80.0));
        let paths: Vec<_> = matches.iter().map(|m| m.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/exact.png"),
                PathBuf::from("/y.png"),
                PathBuf::from("/z.png"),
            ]
        );
        assert_eq!(matches[0].distance, 0.0);
        assert_eq!(matches[1].distance, 0.125);
    }

    #[test]
    fn test_query_respects_scope() {
        let mut store = HashStore::from_records(vec![
            record(&["/p/a.png", "/q/a.png"], Some(0)),
            record(&["/q/b.png"], Some(0)),
        ]);
        store.filter_by_path(Path::new("/p"));
        let matches = query(&store, &Bits, &Fingerprint::from_bytes(vec![0]), t(100.0));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path, PathBuf::from("/p/a.png"));
    }
}
