//! Composition engine integration tests.
//!
//! Tests verify:
//! - Chunks straddling two sources are assembled from both
//! - Built chunks are cached and concurrent requests share one build
//! - Request validation and its error precedence
//! - Failed builds are not cached
//! - Reset, re-set and rejected maps
//! - The auxiliary file layout under the output root

use std::sync::Arc;
use std::time::Duration;

use ngff_pyramid::array::{ChunkShape, DataType, PyramidDescriptor, SpatialShape};
use ngff_pyramid::compose::IMAGE_GROUP;
use ngff_pyramid::metadata::{MultiscaleAttributes, OME_XML, ZATTRS, ZGROUP};
use ngff_pyramid::{
    CacheOutcome, ChunkRequest, ChunkStore, CompositionEntry, CompositionError, CompositionMap,
    CompositorOptions, MemoryStorage, PoolExecutor, PyramidCompositor, PyramidStorage, Region,
    SerialExecutor,
};

use super::test_utils::{create_source, planar_descriptor, u16_values, FlakyStorage};

fn options(chunk: u64) -> CompositorOptions {
    CompositorOptions {
        chunk_shape: ChunkShape::new(1, chunk, chunk),
        ..CompositorOptions::default()
    }
}

/// Two 256x400 sources side by side on channel 0. Source `a` holds its
/// column index, `b` holds 1000 plus its column index.
async fn side_by_side(storage: &MemoryStorage, levels: usize) -> CompositionMap {
    let descriptor = planar_descriptor(256, 400, 128, levels);
    create_source(storage, "sources/a", &descriptor, |_, _, _, x| x as u16).await;
    create_source(storage, "sources/b", &descriptor, |_, _, _, x| 1000 + x as u16).await;
    CompositionMap::new(vec![
        CompositionEntry::offset(0, "sources/a", 0, 0),
        CompositionEntry::offset(0, "sources/b", 0, 400),
    ])
    .unwrap()
}

// =============================================================================
// Chunk Assembly
// =============================================================================

#[tokio::test]
async fn test_chunk_straddling_two_sources() {
    let storage = MemoryStorage::new();
    let map = side_by_side(&storage, 1).await;
    let compositor = PyramidCompositor::new(storage.clone(), "out", options(256));

    let descriptor = compositor.set_composition(map).await.unwrap();
    assert_eq!(descriptor.level(0), Some(SpatialShape::planar(256, 800)));
    assert_eq!(descriptor.channels(), 1);

    // Columns 256..512: 256..400 come from a, 400..512 from b
    let response = compositor
        .get_chunk(ChunkRequest::new(0, 0, 0, 1))
        .await
        .unwrap();
    assert_eq!(response.outcome, CacheOutcome::Built);
    assert_eq!(response.chunk.extent, SpatialShape::planar(256, 256));

    let values = u16_values(&response.chunk.data);
    for row in [0usize, 100, 255] {
        for col in 0..256usize {
            let global = 256 + col as u16;
            let expected = if global < 400 { global } else { 1000 + global - 400 };
            assert_eq!(values[row * 256 + col], expected, "row {} col {}", row, col);
        }
    }

    // The built chunk is persisted in the output store
    let output = storage.store(&compositor.image_path()).await.unwrap();
    let stored = output
        .read_chunk(&response.chunk.key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, response.chunk.data);
}

#[tokio::test]
async fn test_region_across_placement_boundary() {
    let storage = MemoryStorage::new();
    let descriptor = planar_descriptor(64, 512, 64, 1);
    create_source(&storage, "a", &descriptor, |_, _, _, _| 1).await;
    create_source(&storage, "b", &descriptor, |_, _, _, _| 2).await;

    // Same channel: pixels 400..656 come from a below 512 and b above
    let map = CompositionMap::new(vec![
        CompositionEntry::offset(0, "a", 0, 0),
        CompositionEntry::offset(0, "b", 0, 512),
    ])
    .unwrap();
    let compositor = Arc::new(PyramidCompositor::new(storage.clone(), "out", options(256)));
    compositor.set_composition(map).await.unwrap();
    compositor.materialize(&SerialExecutor, Some(0)).await.unwrap();

    let output = storage.store(&compositor.image_path()).await.unwrap();
    let region = Region::new([0, 0, 400], [1, 64, 656]);
    let values = u16_values(&output.read_region(0, 0, &region).await.unwrap());
    for row in [0usize, 63] {
        for col in 0..256usize {
            let expected = if 400 + col < 512 { 1 } else { 2 };
            assert_eq!(values[row * 256 + col], expected, "row {} col {}", row, col);
        }
    }

    // Separate channels: each channel only sees its own source
    let map = CompositionMap::new(vec![
        CompositionEntry::offset(0, "a", 0, 0),
        CompositionEntry::offset(1, "b", 0, 512),
    ])
    .unwrap();
    compositor.set_composition(map).await.unwrap();
    let first = compositor.get_chunk(ChunkRequest::new(0, 0, 0, 2)).await.unwrap();
    let second = compositor.get_chunk(ChunkRequest::new(0, 1, 0, 2)).await.unwrap();
    assert!(u16_values(&first.chunk.data).iter().all(|&v| v == 0));
    assert!(u16_values(&second.chunk.data).iter().all(|&v| v == 2));
}

#[tokio::test]
async fn test_boundary_chunk_is_truncated() {
    let storage = MemoryStorage::new();
    let map = side_by_side(&storage, 1).await;
    let compositor = PyramidCompositor::new(storage, "out", options(256));
    compositor.set_composition(map).await.unwrap();

    // 800 = 3 * 256 + 32
    let response = compositor
        .get_chunk(ChunkRequest::new(0, 0, 0, 3))
        .await
        .unwrap();
    assert_eq!(response.chunk.extent, SpatialShape::planar(256, 32));
    let values = u16_values(&response.chunk.data);
    assert_eq!(values.len(), 256 * 32);
    assert_eq!(values[0], 1000 + 768 - 400);
}

#[tokio::test]
async fn test_downsampled_level_uses_source_levels() {
    let storage = MemoryStorage::new();
    let map = side_by_side(&storage, 2).await;
    let compositor = PyramidCompositor::new(storage, "out", options(256));

    let descriptor = compositor.set_composition(map).await.unwrap();
    assert_eq!(descriptor.level_count(), 2);
    assert_eq!(descriptor.level(1), Some(SpatialShape::planar(128, 400)));

    // At level 1, b starts at column 200
    let response = compositor
        .get_chunk(ChunkRequest::new(1, 0, 0, 0))
        .await
        .unwrap();
    let values = u16_values(&response.chunk.data);
    assert_eq!(values[199], 199);
    assert_eq!(values[200], 1000);
    assert_eq!(values[255], 1055);
}

#[tokio::test]
async fn test_uncovered_area_reads_zero() {
    let storage = MemoryStorage::new();
    let descriptor = planar_descriptor(64, 64, 64, 1);
    create_source(&storage, "a", &descriptor, |_, _, _, _| 7).await;
    create_source(&storage, "b", &descriptor, |_, _, _, _| 9).await;
    let map = CompositionMap::new(vec![
        CompositionEntry::offset(0, "a", 0, 0),
        CompositionEntry::offset(0, "b", 64, 64),
    ])
    .unwrap();
    let compositor = PyramidCompositor::new(storage, "out", options(128));
    compositor.set_composition(map).await.unwrap();

    let response = compositor
        .get_chunk(ChunkRequest::new(0, 0, 0, 0))
        .await
        .unwrap();
    let values = u16_values(&response.chunk.data);
    assert_eq!(values[0], 7);
    assert_eq!(values[100], 0); // row 0, col 100
    assert_eq!(values[100 * 128 + 10], 0); // row 100, col 10
    assert_eq!(values[100 * 128 + 100], 9);
}

#[tokio::test]
async fn test_grid_composition() {
    let storage = MemoryStorage::new();
    let descriptor = planar_descriptor(100, 100, 64, 1);
    let mut cells = std::collections::HashMap::new();
    for row in 0..2u32 {
        for col in 0..2u32 {
            let path = format!("grid/{}_{}", row, col);
            let value = (row * 2 + col + 1) as u16;
            create_source(&storage, &path, &descriptor, move |_, _, _, _| value).await;
            cells.insert((col, row, 0), path);
        }
    }
    let map = CompositionMap::from_grid(cells).unwrap();
    assert!(map.is_grid());

    let compositor = PyramidCompositor::new(storage, "out", options(256));
    let descriptor = compositor.set_composition(map).await.unwrap();
    assert_eq!(descriptor.level(0), Some(SpatialShape::planar(200, 200)));

    let response = compositor
        .get_chunk(ChunkRequest::new(0, 0, 0, 0))
        .await
        .unwrap();
    let values = u16_values(&response.chunk.data);
    assert_eq!(values[50 * 200 + 50], 1);
    assert_eq!(values[50 * 200 + 150], 2);
    assert_eq!(values[150 * 200 + 50], 3);
    assert_eq!(values[150 * 200 + 150], 4);
}

#[tokio::test]
async fn test_source_channel_selection() {
    let storage = MemoryStorage::new();
    let descriptor = PyramidDescriptor::from_base(
        SpatialShape::planar(32, 32),
        2,
        ChunkShape::new(1, 32, 32),
        DataType::UInt16,
        1,
    );
    create_source(&storage, "multi", &descriptor, |_, c, _, _| 10 + c as u16).await;
    let map = CompositionMap::new(vec![
        CompositionEntry::offset(0, "multi", 0, 0).with_source_channel(1),
        CompositionEntry::offset(1, "multi", 0, 0),
    ])
    .unwrap();

    let compositor = PyramidCompositor::new(storage, "out", options(32));
    let descriptor = compositor.set_composition(map).await.unwrap();
    assert_eq!(descriptor.channels(), 2);

    let first = compositor.get_chunk(ChunkRequest::new(0, 0, 0, 0)).await.unwrap();
    let second = compositor.get_chunk(ChunkRequest::new(0, 1, 0, 0)).await.unwrap();
    assert!(u16_values(&first.chunk.data).iter().all(|&v| v == 11));
    assert!(u16_values(&second.chunk.data).iter().all(|&v| v == 10));
}

// =============================================================================
// Caching
// =============================================================================

#[tokio::test]
async fn test_second_request_is_cache_hit() {
    let storage = MemoryStorage::new();
    let map = side_by_side(&storage, 1).await;
    let compositor = PyramidCompositor::new(storage.clone(), "out", options(256));
    compositor.set_composition(map).await.unwrap();

    let request = ChunkRequest::new(0, 0, 0, 1);
    let first = compositor.get_chunk(request).await.unwrap();
    let reads = compositor.source_read_count().await;
    assert_eq!(reads, 2);

    let second = compositor.get_chunk(request).await.unwrap();
    assert!(second.cache_hit());
    assert_eq!(second.chunk, first.chunk);
    assert_eq!(compositor.source_read_count().await, reads);

    let output = storage.store(&compositor.image_path()).await.unwrap();
    assert_eq!(output.write_count(), 1);
    assert_eq!(compositor.cache_len().await, 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_build() {
    let storage = FlakyStorage::new();
    let descriptor = planar_descriptor(128, 128, 128, 1);
    create_source(&storage, "src", &descriptor, |_, _, y, x| (y + x) as u16).await;
    let map = CompositionMap::new(vec![CompositionEntry::offset(0, "src", 0, 0)]).unwrap();

    let compositor = Arc::new(PyramidCompositor::new(storage.clone(), "out", options(128)));
    compositor.set_composition(map).await.unwrap();
    storage.set_read_delay(Duration::from_millis(50));
    let reads_before = storage.chunk_reads();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let compositor = compositor.clone();
        handles.push(tokio::spawn(async move {
            compositor
                .get_chunk(ChunkRequest::new(0, 0, 0, 0))
                .await
                .unwrap()
        }));
    }

    let mut built = 0;
    let mut data = Vec::new();
    for handle in handles {
        let response = handle.await.unwrap();
        if response.outcome == CacheOutcome::Built {
            built += 1;
        }
        data.push(response.chunk.data);
    }

    assert_eq!(built, 1);
    assert!(data.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(compositor.source_read_count().await, 1);
    assert_eq!(storage.chunk_reads() - reads_before, 1);

    let output = storage.inner().store(&compositor.image_path()).await.unwrap();
    assert_eq!(output.write_count(), 1);
}

#[tokio::test]
async fn test_failed_build_is_not_cached() {
    let storage = FlakyStorage::new();
    let descriptor = planar_descriptor(64, 64, 64, 1);
    create_source(&storage, "src", &descriptor, |_, _, _, _| 5).await;
    let map = CompositionMap::new(vec![CompositionEntry::offset(0, "src", 0, 0)]).unwrap();

    let compositor = PyramidCompositor::new(storage.clone(), "out", options(64));
    compositor.set_composition(map).await.unwrap();

    storage.set_fail_reads(true);
    let request = ChunkRequest::new(0, 0, 0, 0);
    let err = compositor.get_chunk(request).await.unwrap_err();
    assert!(matches!(err, CompositionError::Source { ref path, .. } if path == "src"));
    assert_eq!(compositor.cache_len().await, 0);

    storage.set_fail_reads(false);
    let response = compositor.get_chunk(request).await.unwrap();
    assert_eq!(response.outcome, CacheOutcome::Built);
    assert!(u16_values(&response.chunk.data).iter().all(|&v| v == 5));
}

#[tokio::test]
async fn test_materialize_builds_every_chunk_once() {
    let storage = MemoryStorage::new();
    let map = side_by_side(&storage, 2).await;
    let compositor = Arc::new(PyramidCompositor::new(storage.clone(), "out", options(256)));
    let descriptor = compositor.set_composition(map).await.unwrap();

    compositor
        .get_chunk(ChunkRequest::new(0, 0, 0, 0))
        .await
        .unwrap();

    // Level 0: 1x4 chunks, level 1: 1x2 chunks
    let built = compositor
        .materialize(&PoolExecutor::new(4), None)
        .await
        .unwrap();
    assert_eq!(built, 5);
    assert_eq!(compositor.cache_len().await, 6);

    let again = compositor.materialize(&SerialExecutor, None).await.unwrap();
    assert_eq!(again, 0);

    let output = storage.store(&compositor.image_path()).await.unwrap();
    let total: usize = (0..descriptor.level_count())
        .map(|l| descriptor.chunk_keys(l).len())
        .sum();
    assert_eq!(output.chunk_count().await, total);
}

#[tokio::test]
async fn test_materialize_rejects_missing_level() {
    let storage = MemoryStorage::new();
    let map = side_by_side(&storage, 2).await;
    let compositor = Arc::new(PyramidCompositor::new(storage, "out", options(256)));
    let descriptor = compositor.set_composition(map).await.unwrap();

    let level = descriptor.level_count();
    let err = compositor
        .materialize(&SerialExecutor, Some(level))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CompositionError::LevelOutOfRange { level: l, max_level } if l == level && max_level == level - 1
    ));
    assert_eq!(compositor.cache_len().await, 0);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_get_chunk_without_composition() {
    let compositor = PyramidCompositor::new(MemoryStorage::new(), "out", options(256));
    let err = compositor
        .get_chunk(ChunkRequest::new(0, 0, 0, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, CompositionError::NotConfigured));

    let err = compositor.create_auxiliary_files().await.unwrap_err();
    assert!(matches!(err, CompositionError::NotConfigured));
}

#[tokio::test]
async fn test_request_validation_order() {
    let storage = MemoryStorage::new();
    let map = side_by_side(&storage, 2).await;
    let compositor = PyramidCompositor::new(storage, "out", options(256));
    compositor.set_composition(map).await.unwrap();

    // Level is checked before channel and grid position
    let err = compositor
        .get_chunk(ChunkRequest::new(5, 9, 99, 99))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CompositionError::LevelOutOfRange {
            level: 5,
            max_level: 1
        }
    ));

    let err = compositor
        .get_chunk(ChunkRequest::new(1, 9, 99, 99))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CompositionError::ChannelOutOfRange {
            channel: 9,
            channels: 1
        }
    ));

    let err = compositor
        .get_chunk(ChunkRequest::new(1, 0, 0, 2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CompositionError::ChunkOutOfBounds {
            grid_y: 1,
            grid_x: 2,
            ..
        }
    ));

    let err = compositor
        .get_chunk(ChunkRequest::new(0, 0, 0, 0).with_z(1))
        .await
        .unwrap_err();
    assert!(matches!(err, CompositionError::ChunkOutOfBounds { .. }));
    assert_eq!(compositor.cache_len().await, 0);
}

#[tokio::test]
async fn test_missing_source_is_unavailable() {
    let compositor = PyramidCompositor::new(MemoryStorage::new(), "out", options(256));
    let map = CompositionMap::new(vec![CompositionEntry::offset(0, "nowhere", 0, 0)]).unwrap();
    let err = compositor.set_composition(map).await.unwrap_err();
    assert!(matches!(err, CompositionError::SourceUnavailable { ref path, .. } if path == "nowhere"));
    assert!(compositor.descriptor().await.is_none());
}

#[tokio::test]
async fn test_source_overlapping_output_is_rejected() {
    let storage = MemoryStorage::new();
    let descriptor = planar_descriptor(64, 64, 64, 1);
    create_source(&storage, "out/src", &descriptor, |_, _, _, _| 9).await;

    let cases = [("out", "out/src"), ("out", "out"), ("work/out", "work")];
    for (output, source) in cases {
        let compositor = PyramidCompositor::new(storage.clone(), output, options(64));
        let map = CompositionMap::new(vec![CompositionEntry::offset(0, source, 0, 0)]).unwrap();
        let err = compositor.set_composition(map).await.unwrap_err();
        assert!(
            matches!(err, CompositionError::InvalidComposition { .. }),
            "output {} source {}: {:?}",
            output,
            source,
            err
        );
        assert!(compositor.descriptor().await.is_none());
    }

    // The source under the output path survives
    let source = storage.open("out/src").await.unwrap();
    let data = source
        .read_region(0, 0, &Region::full(SpatialShape::planar(64, 64)))
        .await
        .unwrap();
    assert!(u16_values(&data).iter().all(|&v| v == 9));
}

#[tokio::test]
async fn test_inconsistent_sources_are_rejected() {
    let storage = MemoryStorage::new();
    let descriptor = planar_descriptor(64, 64, 64, 3);
    create_source(&storage, "a", &descriptor, |_, _, _, _| 1).await;
    create_source(&storage, "b", &descriptor, |_, _, _, _| 2).await;
    let bytes = PyramidDescriptor::from_base(
        SpatialShape::planar(64, 64),
        1,
        ChunkShape::new(1, 64, 64),
        DataType::UInt8,
        1,
    );
    storage.create("bytes", &bytes).await.unwrap();

    let compositor = PyramidCompositor::new(storage, "out", options(64));
    let cases = [
        // Overlapping entries on one channel
        vec![
            CompositionEntry::offset(0, "a", 0, 0),
            CompositionEntry::offset(0, "b", 32, 32),
        ],
        // Offset not divisible by 2^(levels-1) = 4
        vec![CompositionEntry::offset(0, "a", 0, 66)],
        // Mixed data types
        vec![
            CompositionEntry::offset(0, "a", 0, 0),
            CompositionEntry::offset(1, "bytes", 0, 0),
        ],
        // Source channel out of range
        vec![CompositionEntry::offset(0, "a", 0, 0).with_source_channel(3)],
    ];
    for entries in cases {
        let map = CompositionMap::new(entries).unwrap();
        let err = compositor.set_composition(map).await.unwrap_err();
        assert!(
            matches!(err, CompositionError::InvalidComposition { .. }),
            "unexpected error {:?}",
            err
        );
    }
    assert!(compositor.descriptor().await.is_none());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_reset_forces_rebuild() {
    let storage = MemoryStorage::new();
    let map = side_by_side(&storage, 1).await;
    let compositor = PyramidCompositor::new(storage.clone(), "out", options(256));
    compositor.set_composition(map.clone()).await.unwrap();

    let request = ChunkRequest::new(0, 0, 0, 0);
    compositor.get_chunk(request).await.unwrap();
    assert!(storage.exists("out").await);

    compositor.reset_composition().await.unwrap();
    assert!(!storage.exists("out").await);
    assert_eq!(compositor.cache_len().await, 0);
    let err = compositor.get_chunk(request).await.unwrap_err();
    assert!(matches!(err, CompositionError::NotConfigured));

    // Resetting twice is fine
    compositor.reset_composition().await.unwrap();

    compositor.set_composition(map).await.unwrap();
    let response = compositor.get_chunk(request).await.unwrap();
    assert_eq!(response.outcome, CacheOutcome::Built);
}

#[tokio::test]
async fn test_rejected_map_keeps_previous_composition() {
    let storage = MemoryStorage::new();
    let map = side_by_side(&storage, 1).await;
    let compositor = PyramidCompositor::new(storage, "out", options(256));
    let descriptor = compositor.set_composition(map).await.unwrap();

    let request = ChunkRequest::new(0, 0, 0, 1);
    compositor.get_chunk(request).await.unwrap();

    let bad = CompositionMap::new(vec![CompositionEntry::offset(0, "missing", 0, 0)]).unwrap();
    assert!(compositor.set_composition(bad).await.is_err());

    assert_eq!(compositor.descriptor().await, Some(descriptor));
    assert!(compositor.get_chunk(request).await.unwrap().cache_hit());
}

#[tokio::test]
async fn test_set_composition_replaces_previous() {
    let storage = MemoryStorage::new();
    let map = side_by_side(&storage, 1).await;
    let compositor = PyramidCompositor::new(storage.clone(), "out", options(256));
    compositor.set_composition(map).await.unwrap();
    compositor
        .get_chunk(ChunkRequest::new(0, 0, 0, 2))
        .await
        .unwrap();

    let single = CompositionMap::new(vec![CompositionEntry::offset(0, "sources/a", 0, 0)]).unwrap();
    let descriptor = compositor.set_composition(single).await.unwrap();
    assert_eq!(descriptor.level(0), Some(SpatialShape::planar(256, 400)));
    assert_eq!(compositor.cache_len().await, 0);

    let output = storage.store(&compositor.image_path()).await.unwrap();
    assert_eq!(output.chunk_count().await, 0);

    let err = compositor
        .get_chunk(ChunkRequest::new(0, 0, 0, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, CompositionError::ChunkOutOfBounds { .. }));
}

// =============================================================================
// Auxiliary Files
// =============================================================================

#[tokio::test]
async fn test_auxiliary_file_layout() {
    let storage = MemoryStorage::new();
    let map = side_by_side(&storage, 2).await;
    let options = CompositorOptions {
        name: "mosaic".to_string(),
        channel_names: vec!["DAPI".to_string()],
        ..options(256)
    };
    let compositor = PyramidCompositor::new(storage.clone(), "out", options);
    compositor.set_composition(map).await.unwrap();
    assert_eq!(compositor.image_path(), format!("out/{}", IMAGE_GROUP));

    for path in ["out", "out/data.zarr", "out/data.zarr/0"] {
        let group = storage.document(path, ZGROUP).await.unwrap();
        let group: serde_json::Value = serde_json::from_slice(&group).unwrap();
        assert_eq!(group["zarr_format"], 2, "{}", path);
    }

    let xml = storage.document("out", OME_XML).await.unwrap();
    let xml = String::from_utf8(xml.to_vec()).unwrap();
    assert!(xml.contains(r#"SizeX="800""#));
    assert!(xml.contains(r#"SizeY="256""#));
    assert!(xml.contains(r#"Type="uint16""#));
    assert!(xml.contains(r#"Name="DAPI""#));

    let attrs = storage.document("out/data.zarr/0", ZATTRS).await.unwrap();
    let attrs: MultiscaleAttributes = serde_json::from_slice(&attrs).unwrap();
    assert_eq!(attrs.multiscales.len(), 1);
    assert_eq!(attrs.multiscales[0].name.as_deref(), Some("mosaic"));
    assert_eq!(attrs.dataset_paths(), vec!["0".to_string(), "1".to_string()]);

    // Writing again leaves the same documents in place
    compositor.create_auxiliary_files().await.unwrap();
    assert!(storage.document("out", OME_XML).await.is_some());
}
