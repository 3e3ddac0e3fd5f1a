//! Filesystem backend integration tests.
//!
//! Tests verify:
//! - Generated levels land on disk as readable zarr v2 arrays
//! - Composed chunks persist and reopen from the output image group
//! - Sources stored under a `data.zarr/0` image group are found
//! - Compressed source arrays are rejected when setting a composition
//! - Bases with non-numbered dataset paths are refused untouched

use ngff_pyramid::array::SpatialShape;
use ngff_pyramid::compose::IMAGE_GROUP;
use ngff_pyramid::metadata::{ArrayMetadata, MultiscaleAttributes, OME_XML, ZARRAY, ZATTRS};
use ngff_pyramid::store::join_path;
use ngff_pyramid::{
    ChunkRequest, ChunkStore, CompositionEntry, CompositionError, CompositionMap,
    CompositorOptions, FilesystemStorage, GenerateError, GeneratorOptions, PoolExecutor,
    PyramidCompositor, PyramidGenerator, PyramidStorage, Region, StoreError,
};

use super::test_utils::{create_source, fill_level, planar_descriptor, temp_root, u16_values};

#[tokio::test]
async fn test_generate_on_disk() {
    let root = temp_root("generate");
    let storage = FilesystemStorage::new(root.clone());
    let base = storage
        .create("image", &planar_descriptor(64, 96, 32, 1))
        .await
        .unwrap();
    fill_level(&base, 0, |_, _, _, _| 77).await;

    let generator = PyramidGenerator::open(
        storage.clone(),
        "image",
        PoolExecutor::new(2),
        GeneratorOptions::default(),
    )
    .await
    .unwrap();
    generator.generate_pyramid(2).await.unwrap();

    // Level discovery goes through the written .zattrs
    let attrs = std::fs::read(root.join("image").join(ZATTRS)).unwrap();
    let attrs: MultiscaleAttributes = serde_json::from_slice(&attrs).unwrap();
    assert_eq!(attrs.dataset_paths(), vec!["0", "1", "2"]);

    let reopened = storage.open("image").await.unwrap();
    let descriptor = reopened.descriptor();
    assert_eq!(descriptor.level_count(), 3);
    assert_eq!(descriptor.level(2), Some(SpatialShape::planar(16, 24)));

    let level = descriptor.level(2).unwrap();
    let data = reopened.read_region(2, 0, &Region::full(level)).await.unwrap();
    assert!(u16_values(&data).iter().all(|&v| v == 77));

    let zarray = std::fs::read(root.join("image/2").join(ZARRAY)).unwrap();
    let zarray: ArrayMetadata = serde_json::from_slice(&zarray).unwrap();
    assert_eq!(zarray.shape, vec![1, 1, 16, 24]);
    assert_eq!(zarray.chunks, vec![1, 1, 32, 32]);
    assert_eq!(zarray.dtype, "<u2");
    assert_eq!(zarray.separator(), "/");
    assert!(root.join("image/2/0/0/0/0").is_file());

    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn test_compose_on_disk() {
    let root = temp_root("compose");
    let storage = FilesystemStorage::new(root.clone());
    let descriptor = planar_descriptor(64, 100, 64, 1);
    create_source(&storage, "sources/a", &descriptor, |_, _, _, _| 1).await;
    create_source(&storage, "sources/b", &descriptor, |_, _, _, _| 2).await;

    let map = CompositionMap::new(vec![
        CompositionEntry::offset(0, "sources/a", 0, 0),
        CompositionEntry::offset(0, "sources/b", 0, 100),
    ])
    .unwrap();
    let compositor = PyramidCompositor::new(storage.clone(), "out", CompositorOptions::default());
    compositor.set_composition(map).await.unwrap();

    assert!(root.join("out").join(OME_XML).is_file());
    assert!(root.join("out/data.zarr/0").join(ZATTRS).is_file());

    let response = compositor
        .get_chunk(ChunkRequest::new(0, 0, 0, 0))
        .await
        .unwrap();
    assert_eq!(response.chunk.extent, SpatialShape::planar(64, 200));
    let values = u16_values(&response.chunk.data);
    assert_eq!(values[99], 1);
    assert_eq!(values[100], 2);

    let output = storage.open(&compositor.image_path()).await.unwrap();
    let stored = output.read_chunk(&response.chunk.key).await.unwrap().unwrap();
    assert_eq!(stored, response.chunk.data);

    compositor.reset_composition().await.unwrap();
    assert!(!root.join("out").exists());
    assert!(root.join("sources/a").exists());

    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn test_source_image_group_is_preferred() {
    let root = temp_root("nested");
    let storage = FilesystemStorage::new(root.clone());
    let descriptor = planar_descriptor(32, 32, 32, 2);
    let nested = join_path("converted", IMAGE_GROUP);
    create_source(&storage, &nested, &descriptor, |_, _, _, _| 5).await;
    let attrs = MultiscaleAttributes::for_pyramid(&descriptor, "converted", None, None);
    storage
        .write_document(
            &nested,
            ZATTRS,
            serde_json::to_vec(&attrs).unwrap().into(),
        )
        .await
        .unwrap();

    let map = CompositionMap::new(vec![CompositionEntry::offset(0, "converted", 0, 0)]).unwrap();
    let compositor = PyramidCompositor::new(storage, "out", CompositorOptions::default());
    let composed = compositor.set_composition(map).await.unwrap();
    assert_eq!(composed.level_count(), 2);

    let response = compositor
        .get_chunk(ChunkRequest::new(1, 0, 0, 0))
        .await
        .unwrap();
    assert!(u16_values(&response.chunk.data).iter().all(|&v| v == 5));

    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn test_compressed_source_is_rejected() {
    let root = temp_root("compressed");
    std::fs::create_dir_all(root.join("blosc/0")).unwrap();
    std::fs::write(
        root.join("blosc/0").join(ZARRAY),
        r#"{"zarr_format": 2, "shape": [1, 1, 16, 16], "chunks": [1, 1, 16, 16],
            "dtype": "<u2", "compressor": {"id": "blosc", "cname": "lz4"},
            "fill_value": 0, "order": "C", "filters": null}"#,
    )
    .unwrap();

    let storage = FilesystemStorage::new(root.clone());
    let map = CompositionMap::new(vec![CompositionEntry::offset(0, "blosc", 0, 0)]).unwrap();
    let compositor = PyramidCompositor::new(storage, "out", CompositorOptions::default());
    let err = compositor.set_composition(map).await.unwrap_err();
    match err {
        CompositionError::SourceUnavailable { path, source } => {
            assert_eq!(path, "blosc");
            assert!(matches!(
                source,
                StoreError::UnsupportedCompressor { ref compressor, .. } if compressor == "blosc"
            ));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!root.join("out").exists());

    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn test_named_base_dataset_is_refused() {
    let root = temp_root("named-base");
    let storage = FilesystemStorage::new(root.clone());
    let descriptor = planar_descriptor(16, 16, 16, 1);
    let base = storage.create("image", &descriptor).await.unwrap();
    fill_level(&base, 0, |_, _, _, _| 7).await;
    std::fs::rename(root.join("image/0"), root.join("image/s0")).unwrap();

    let mut attrs = MultiscaleAttributes::for_pyramid(&descriptor, "image", None, None);
    attrs.multiscales[0].datasets[0].path = "s0".to_string();
    let attrs = serde_json::to_vec(&attrs).unwrap();
    std::fs::write(root.join("image").join(ZATTRS), &attrs).unwrap();

    let result = PyramidGenerator::open(
        storage.clone(),
        "image",
        PoolExecutor::new(1),
        GeneratorOptions::default(),
    )
    .await;
    assert!(matches!(
        result,
        Err(GenerateError::Store(StoreError::InvalidMetadata { .. }))
    ));

    // Base is left exactly as it was
    assert!(!root.join("image/0").exists());
    assert_eq!(std::fs::read(root.join("image").join(ZATTRS)).unwrap(), attrs);
    let reopened = storage.open("image").await.unwrap();
    let level = reopened.descriptor().level(0).unwrap();
    let data = reopened.read_region(0, 0, &Region::full(level)).await.unwrap();
    assert!(u16_values(&data).iter().all(|&v| v == 7));

    let _ = std::fs::remove_dir_all(&root);
}
