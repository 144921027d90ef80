//! Conformance of all three index kinds to the shared contract.

use lodestone_core::{IndexConfig, IndexKind, LodestoneId, Metadata, Value};
use lodestone_index::{build_index, VectorIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const KINDS: [IndexKind; 3] = [IndexKind::Linear, IndexKind::Ivf, IndexKind::Nsw];

fn random_unit(rng: &mut StdRng, dimension: usize) -> Vec<f32> {
    loop {
        let mut v: Vec<f32> = (0..dimension).map(|_| rng.random::<f32>() - 0.5).collect();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-6 {
            for x in v.iter_mut() {
                *x /= norm;
            }
            return v;
        }
    }
}

fn populated(kind: IndexKind, count: usize, seed: u64) -> (Box<dyn VectorIndex>, Vec<(LodestoneId, Vec<f32>)>) {
    // Wider IVF probing keeps the top-k assertions independent of how
    // k-means happens to split a uniform cloud.
    let config = IndexConfig {
        ivf_n_probes: 3,
        ..IndexConfig::default()
    };
    let mut index = build_index(kind, &config);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut entries = Vec::new();
    for _ in 0..count {
        let id = LodestoneId::new();
        let v = random_unit(&mut rng, 16);
        index.add(id, v.clone(), Metadata::new()).unwrap();
        entries.push((id, v));
    }
    (index, entries)
}

#[test]
fn every_kind_answers_queries_after_build() {
    for kind in KINDS {
        let (mut index, entries) = populated(kind, 50, 11);
        index.build().unwrap();
        assert_eq!(index.len(), 50);
        assert_eq!(index.dimension(), Some(16));

        let (id, v) = &entries[20];
        let results = index.query(v, 5);
        assert_eq!(results.len(), 5, "short results for {kind:?}");
        assert_eq!(results[0].id, *id, "self-query missed for {kind:?}");

        for pair in results.windows(2) {
            assert!(
                pair[0].ranking_cmp(&pair[1]).is_le(),
                "unsorted results for {kind:?}"
            );
        }
    }
}

#[test]
fn every_kind_removes_idempotently() {
    for kind in KINDS {
        let (mut index, entries) = populated(kind, 20, 12);
        let victim = entries[3].0;
        index.remove(victim);
        index.remove(victim);
        assert_eq!(index.len(), 19, "double remove miscounted for {kind:?}");

        let results = index.query(&entries[3].1, 19);
        assert!(
            results.iter().all(|p| p.id != victim),
            "removed id still surfaces for {kind:?}"
        );
    }
}

#[test]
fn every_kind_replaces_on_re_add() {
    for kind in KINDS {
        let (mut index, entries) = populated(kind, 10, 13);
        let (id, _) = entries[0];
        let mut rng = StdRng::seed_from_u64(14);
        let replacement = random_unit(&mut rng, 16);
        index.add(id, replacement.clone(), Metadata::new()).unwrap();

        assert_eq!(index.len(), 10, "re-add changed size for {kind:?}");
        let results = index.query(&replacement, 1);
        assert_eq!(results[0].id, id, "replacement not found for {kind:?}");
        assert!(results[0].score > 0.999);
    }
}

#[test]
fn every_kind_keeps_metadata_snapshots() {
    for kind in KINDS {
        let (mut index, entries) = populated(kind, 5, 15);
        let (id, _) = entries[2];

        let mut metadata = Metadata::new();
        metadata.insert("stage".into(), Value::from("draft"));
        index.update(id, None, Some(metadata)).unwrap();

        let snapshot = index.metadata(&id).unwrap();
        assert_eq!(snapshot.get("stage").unwrap().as_str(), Some("draft"));
        // Untouched entries keep their (empty) snapshot.
        assert!(index.metadata(&entries[0].0).unwrap().is_empty());
    }
}

#[test]
fn every_kind_locks_dimension_on_first_insert() {
    for kind in KINDS {
        let mut index = build_index(kind, &IndexConfig::default());
        let mut rng = StdRng::seed_from_u64(16);
        index
            .add(LodestoneId::new(), random_unit(&mut rng, 16), Metadata::new())
            .unwrap();

        let err = index
            .add(LodestoneId::new(), random_unit(&mut rng, 8), Metadata::new())
            .unwrap_err();
        assert!(err.is_dimension_mismatch(), "no lock for {kind:?}");
        assert_eq!(index.len(), 1);
    }
}

#[test]
fn every_kind_rejects_invalid_vectors() {
    for kind in KINDS {
        let mut index = build_index(kind, &IndexConfig::default());
        let zero = vec![0.0f32; 16];
        assert!(index.add(LodestoneId::new(), zero, Metadata::new()).is_err());
        let nan = vec![f32::NAN; 16];
        assert!(index.add(LodestoneId::new(), nan, Metadata::new()).is_err());
        assert_eq!(index.len(), 0);
    }
}

#[test]
fn build_is_repeatable_for_every_kind() {
    for kind in KINDS {
        let (mut index, entries) = populated(kind, 30, 17);
        index.build().unwrap();
        index.build().unwrap();
        assert_eq!(index.len(), 30);
        let results = index.query(&entries[0].1, 3);
        assert_eq!(results.len(), 3);
    }
}
