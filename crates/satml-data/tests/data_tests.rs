// Tests for satml-data: MAT containers, SAT windows, samplers, loaders

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use satml_core::{Error, NdArray};
use satml_data::{
    Compose, DataLoader, Dataset, Image, InfiniteSampler, LoaderConfig, MatFile, MatWriter,
    Normalize, PartitionBounds, Phase, PrefetchLoader, RandomSampler, SatDataset, ScaleToUnit,
    SequentialSampler, Transform,
};

// Synthetic SAT containers

/// A 1×1×1×N container whose single pixel holds the column index and whose
/// label for column j is `j % k`.
fn column_container(n: usize, k: usize) -> MatFile {
    let x: Vec<f32> = (0..n).map(|j| j as f32).collect();
    let mut y = vec![0.0f64; k * n];
    for j in 0..n {
        y[j * k + j % k] = 1.0;
    }
    let mut mat = MatFile::new();
    mat.insert("train_x", NdArray::from_vec(x.clone(), (1, 1, 1, n)).unwrap());
    mat.insert("train_y", NdArray::from_vec(y.clone(), (k, n)).unwrap());
    mat.insert("test_x", NdArray::from_vec(x, (1, 1, 1, n)).unwrap());
    mat.insert("test_y", NdArray::from_vec(y, (k, n)).unwrap());
    mat
}

/// A 28×28×4 uint8 container in the SAT-4 layout.
fn sat4_container(n: usize) -> MatFile {
    let (h, w, c, k) = (28, 28, 4, 4);
    let x: Vec<u8> = (0..h * w * c * n).map(|i| (i % 256) as u8).collect();
    let mut y = vec![0u8; k * n];
    for j in 0..n {
        y[j * k + (j + 1) % k] = 1;
    }
    let mut mat = MatFile::new();
    mat.insert("train_x", NdArray::from_vec(x.clone(), (h, w, c, n)).unwrap());
    mat.insert("train_y", NdArray::from_vec(y.clone(), (k, n)).unwrap());
    mat.insert("test_x", NdArray::from_vec(x, (h, w, c, n)).unwrap());
    mat.insert("test_y", NdArray::from_vec(y, (k, n)).unwrap());
    mat
}

// InfiniteSampler tests

proptest! {
    #[test]
    fn prop_first_n_draws_are_a_permutation(n in 1usize..200, seed in any::<u64>()) {
        let s = InfiniteSampler::seeded(n, seed).unwrap();
        let mut first: Vec<usize> = s.take(n).collect();
        first.sort_unstable();
        prop_assert_eq!(first, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn prop_draws_stay_in_range(n in 1usize..100, seed in any::<u64>()) {
        let s = InfiniteSampler::seeded(n, seed).unwrap();
        for idx in s.take(5 * n) {
            prop_assert!(idx < n);
        }
    }

    #[test]
    fn prop_aligned_blocks_are_permutations(n in 1usize..50, seed in any::<u64>()) {
        let draws: Vec<usize> = InfiniteSampler::seeded(n, seed).unwrap().take(4 * n + 1).collect();
        for block in draws[1..].chunks(n) {
            let set: HashSet<usize> = block.iter().copied().collect();
            prop_assert_eq!(set.len(), n);
        }
    }
}

#[test]
fn test_sampler_rejects_empty_range() {
    assert!(matches!(InfiniteSampler::new(0), Err(Error::InvalidArgument(_))));
    assert!(matches!(InfiniteSampler::from_len(-3), Err(Error::InvalidArgument(_))));
    assert!(matches!(InfiniteSampler::from_len(0), Err(Error::InvalidArgument(_))));
}

#[test]
fn test_sampler_single_element() {
    let s = InfiniteSampler::new(1).unwrap();
    assert!(s.take(10).all(|i| i == 0));
}

#[test]
fn test_os_seeded_sampler_is_still_a_permutation() {
    let mut first: Vec<usize> = InfiniteSampler::new(64).unwrap().take(64).collect();
    first.sort_unstable();
    assert_eq!(first, (0..64).collect::<Vec<_>>());
}

#[test]
fn test_seeded_samplers_agree() {
    let a: Vec<usize> = InfiniteSampler::seeded(20, 11).unwrap().take(100).collect();
    let b: Vec<usize> = InfiniteSampler::seeded(20, 11).unwrap().take(100).collect();
    assert_eq!(a, b);
}

#[test]
fn test_finite_samplers() {
    assert_eq!(SequentialSampler::new(4).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    let mut r: Vec<usize> = RandomSampler::new(30, Some(5)).collect();
    assert_eq!(r.len(), 30);
    r.sort_unstable();
    assert_eq!(r, (0..30).collect::<Vec<_>>());
}

// SatDataset tests

#[test]
fn test_default_bounds_on_full_container() {
    let mat = column_container(50_000, 6);
    let b = PartitionBounds::default();
    let train = SatDataset::from_container(&mat, Phase::Train, b, None).unwrap();
    let val = SatDataset::from_container(&mat, Phase::Val, b, None).unwrap();
    let test = SatDataset::from_container(&mat, Phase::Test, b, None).unwrap();

    assert_eq!(train.len(), 30_000);
    assert_eq!(val.len(), 10_000);
    assert_eq!(test.len(), 50_000);

    for i in [0, 1, 4_321, 9_999] {
        let s = val.get(i).unwrap();
        assert_eq!(s.image.data, vec![(30_000 + i) as f32]);
        assert_eq!(s.label, (30_000 + i) % 6);
        assert_eq!(val.source_column(i), Some(30_000 + i));
    }
    assert_eq!(train.get(29_999).unwrap().image.data, vec![29_999.0]);
}

#[test]
fn test_short_container_gives_short_val_window() {
    let mat = column_container(35_000, 4);
    let val = SatDataset::from_container(&mat, Phase::Val, PartitionBounds::default(), None)
        .unwrap();
    assert_eq!(val.len(), 5_000);

    let tiny = column_container(100, 4);
    let val = SatDataset::from_container(&tiny, Phase::Val, PartitionBounds::default(), None)
        .unwrap();
    assert!(val.is_empty());
}

#[test]
fn test_sat4_images_are_channel_first() {
    let mat = sat4_container(5);
    let ds = SatDataset::from_container(&mat, Phase::Test, PartitionBounds::default(), None)
        .unwrap();
    assert_eq!(ds.image_shape(), [4, 28, 28]);
    assert_eq!(ds.num_classes(), 4);

    let s = ds.get(2).unwrap();
    assert_eq!(s.image.shape, [4, 28, 28]);
    assert_eq!(s.label, 3);

    // pixel (h=5, w=7, c=2) of image 2 in the column-major source
    let src = mat.get("test_x").unwrap();
    let expected = src.get_f64(&[5, 7, 2, 2]).unwrap() as f32;
    assert_eq!(s.image.data[2 * 28 * 28 + 5 * 28 + 7], expected);
}

#[test]
fn test_label_is_row_of_the_one() {
    let (k, n) = (6, 3);
    let mut y = vec![0.0f64; k * n];
    y[2] = 1.0; // column 0, row 2
    y[k + 5] = 1.0; // column 1, row 5
    y[2 * k] = 1.0; // column 2, row 0
    let mut mat = MatFile::new();
    mat.insert("test_x", NdArray::from_vec(vec![0u8; n], (1, 1, 1, n)).unwrap());
    mat.insert("test_y", NdArray::from_vec(y, (k, n)).unwrap());

    let ds = SatDataset::from_container(&mat, Phase::Test, PartitionBounds::default(), None)
        .unwrap();
    assert_eq!(ds.labels().unwrap(), vec![2, 5, 0]);
    assert_eq!(ds.class_counts().unwrap(), vec![1, 0, 1, 0, 0, 1]);
}

#[test]
fn test_all_zero_label_column_fails() {
    let mut mat = MatFile::new();
    mat.insert("test_x", NdArray::from_vec(vec![0u8; 2], (1, 1, 1, 2)).unwrap());
    mat.insert(
        "test_y",
        NdArray::from_vec(vec![1.0f64, 0.0, 0.0, 0.0], (2, 2)).unwrap(),
    );
    let ds = SatDataset::from_container(&mat, Phase::Test, PartitionBounds::default(), None)
        .unwrap();
    assert!(ds.get(0).is_ok());
    assert!(matches!(
        ds.get(1),
        Err(Error::LabelDecode { index: 1, column: 1 })
    ));
}

#[test]
fn test_out_of_range_index() {
    let mat = column_container(20, 3);
    let ds = SatDataset::from_container(
        &mat,
        Phase::Val,
        PartitionBounds::new(10, 15).unwrap(),
        None,
    )
    .unwrap();
    assert_eq!(ds.len(), 5);
    assert!(matches!(ds.get(5), Err(Error::Index { index: 5, len: 5 })));
}

#[test]
fn test_transform_applies_on_access() {
    let mat = sat4_container(2);
    let plain =
        SatDataset::from_container(&mat, Phase::Test, PartitionBounds::default(), None).unwrap();
    let steps: Vec<Box<dyn Transform>> =
        vec![Box::new(ScaleToUnit), Box::new(Normalize::uniform(0.5, 0.5))];
    let t = Compose::new(steps);
    let scaled = SatDataset::from_container(
        &mat,
        Phase::Test,
        PartitionBounds::default(),
        Some(Box::new(t)),
    )
    .unwrap();

    let a = plain.get(1).unwrap();
    let b = scaled.get(1).unwrap();
    assert_eq!(a.label, b.label);
    for (&raw, &norm) in a.image.data.iter().zip(&b.image.data) {
        assert!(((raw / 255.0 - 0.5) / 0.5 - norm).abs() < 1e-6);
    }
}

#[test]
fn test_missing_array_is_a_load_error() {
    let mut mat = column_container(4, 2);
    mat.take("test_y");
    let err = SatDataset::from_container(&mat, Phase::Test, PartitionBounds::default(), None)
        .unwrap_err();
    assert!(matches!(err, Error::DataLoad { .. }));
}

#[test]
fn test_mismatched_counts_are_a_load_error() {
    let mut mat = MatFile::new();
    mat.insert("train_x", NdArray::from_vec(vec![0u8; 3], (1, 1, 1, 3)).unwrap());
    mat.insert("train_y", NdArray::from_vec(vec![1u8; 4], (1, 4)).unwrap());
    let err = SatDataset::from_container(&mat, Phase::Train, PartitionBounds::default(), None)
        .unwrap_err();
    assert!(matches!(err, Error::DataLoad { .. }));
}

// On-disk containers

#[test]
fn test_load_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sat-4-full.mat");
    let src = sat4_container(6);
    let mut writer = MatWriter::new();
    for name in ["train_x", "train_y", "test_x", "test_y"] {
        writer = writer.add(name, src.get(name).unwrap());
    }
    writer.write(&path).unwrap();

    let test = SatDataset::load(&path, Phase::Test, None).unwrap();
    assert_eq!(test.len(), 6);
    assert_eq!(test.get(0).unwrap().label, 1);

    let val = SatDataset::builder(&path)
        .phase(Phase::Val)
        .bounds(PartitionBounds::new(4, 6).unwrap())
        .transform(ScaleToUnit)
        .build()
        .unwrap();
    assert_eq!(val.len(), 2);
    assert_eq!(val.name(), "SAT-val");
    assert!(val.get(1).unwrap().image.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
}

#[test]
fn test_load_compressed_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sat-6-full.mat");
    let src = column_container(12, 6);
    let mut writer = MatWriter::new();
    for name in ["train_x", "train_y", "test_x", "test_y"] {
        writer = writer.add(name, src.get(name).unwrap());
    }
    std::fs::write(&path, writer.to_compressed_bytes().unwrap()).unwrap();

    let train = SatDataset::builder(&path)
        .bounds(PartitionBounds::new(8, 10).unwrap())
        .build()
        .unwrap();
    assert_eq!(train.len(), 8);
    assert_eq!(train.get(7).unwrap().label, 1);
}

#[test]
fn test_missing_file_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.mat");
    match SatDataset::load(&path, Phase::Train, None) {
        Err(Error::DataLoad { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected DataLoad, got {other:?}"),
    }
}

// DataLoader tests

#[test]
fn test_dataloader_batch_shapes() {
    let mat = sat4_container(10);
    let ds = SatDataset::from_container(&mat, Phase::Test, PartitionBounds::default(), None)
        .unwrap();
    let config = LoaderConfig::default().batch_size(4);
    let loader = DataLoader::new(&ds, SequentialSampler::new(ds.len()), config).unwrap();
    assert_eq!(loader.num_batches(), Some(2));

    let batches: Vec<_> = loader.map(|b| b.unwrap()).collect();
    assert_eq!(batches.len(), 2); // trailing 2 dropped
    assert_eq!(batches[0].shape, [4, 4, 28, 28]);
    assert_eq!(batches[1].labels, vec![1, 2, 3, 0]);
}

#[test]
fn test_dataloader_keeps_partial_batch() {
    let mat = column_container(10, 2);
    let ds = SatDataset::from_container(&mat, Phase::Test, PartitionBounds::default(), None)
        .unwrap();
    let config = LoaderConfig::default().batch_size(4).drop_last(false);
    let loader = DataLoader::new(&ds, SequentialSampler::new(10), config).unwrap();
    assert_eq!(loader.num_batches(), Some(3));
    let sizes: Vec<usize> = loader.map(|b| b.unwrap().len()).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
}

#[test]
fn test_dataloader_parallel_matches_sequential() {
    let mat = sat4_container(16);
    let ds = SatDataset::from_container(&mat, Phase::Test, PartitionBounds::default(), None)
        .unwrap();
    let seq = DataLoader::new(
        &ds,
        RandomSampler::new(16, Some(3)),
        LoaderConfig::default().batch_size(8),
    )
    .unwrap();
    let par = DataLoader::new(
        &ds,
        RandomSampler::new(16, Some(3)),
        LoaderConfig::default().batch_size(8).num_workers(4),
    )
    .unwrap();
    let a: Vec<_> = seq.map(|b| b.unwrap()).collect();
    let b: Vec<_> = par.map(|b| b.unwrap()).collect();
    assert_eq!(a, b);
}

#[test]
fn test_dataloader_with_infinite_sampler_never_ends() {
    let mat = column_container(30, 3);
    let ds = SatDataset::from_container(
        &mat,
        Phase::Train,
        PartitionBounds::new(7, 20).unwrap(),
        None,
    )
    .unwrap();
    let sampler = InfiniteSampler::seeded(ds.len(), 1).unwrap();
    let loader = DataLoader::new(&ds, sampler, LoaderConfig::default().batch_size(5)).unwrap();
    assert_eq!(loader.num_batches(), None);

    let mut seen = HashSet::new();
    for batch in loader.take(50) {
        let batch = batch.unwrap();
        assert_eq!(batch.len(), 5);
        seen.extend(batch.images.iter().map(|&v| v as usize));
    }
    assert_eq!(seen, (0..7).collect::<HashSet<usize>>());
}

#[test]
fn test_dataloader_rejects_zero_batch() {
    let ds = SatDataset::from_container(
        &column_container(3, 2),
        Phase::Test,
        PartitionBounds::default(),
        None,
    )
    .unwrap();
    let r = DataLoader::new(&ds, SequentialSampler::new(3), LoaderConfig::default().batch_size(0));
    assert!(matches!(r, Err(Error::InvalidArgument(_))));
}

// PrefetchLoader tests

#[test]
fn test_prefetch_loader_delivers_batches() {
    let mat = sat4_container(12);
    let ds: Arc<dyn Dataset> = Arc::new(
        SatDataset::from_container(&mat, Phase::Test, PartitionBounds::default(), None).unwrap(),
    );
    let sampler = InfiniteSampler::seeded(ds.len(), 9).unwrap();
    let config = LoaderConfig::default().batch_size(3).num_workers(2);
    let mut loader = PrefetchLoader::spawn(ds, sampler, config).unwrap();

    for _ in 0..10 {
        let batch = loader.next().unwrap().unwrap();
        assert_eq!(batch.shape, [3, 4, 28, 28]);
        assert!(batch.labels.iter().all(|&l| l < 4));
    }
}

#[test]
fn test_prefetch_loader_surfaces_errors() {
    struct Broken;
    impl Dataset for Broken {
        fn len(&self) -> usize {
            4
        }
        fn get(&self, index: usize) -> satml_core::Result<satml_data::Sample> {
            if index == 2 {
                return Err(Error::LabelDecode { index, column: index });
            }
            Ok(satml_data::Sample {
                image: Image::new(vec![0.0], [1, 1, 1]),
                label: 0,
            })
        }
        fn image_shape(&self) -> [usize; 3] {
            [1, 1, 1]
        }
    }

    let config = LoaderConfig::default().batch_size(2);
    let results: Vec<_> =
        PrefetchLoader::spawn(Arc::new(Broken), SequentialSampler::new(4), config)
            .unwrap()
            .collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(Error::LabelDecode { index: 2, .. })));
}
