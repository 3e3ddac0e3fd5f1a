//! Block-mean reduction.

use bytes::Bytes;

use crate::array::{decode_elements, dispatch_dtype, encode_elements, DataType, Element, SpatialShape};

/// Reduce a dense `(z, y, x)` block by averaging every `factor`-sized cube.
///
/// `input` holds `extent` voxels of `dtype`. The output has
/// `ceil(extent / factor)` voxels per axis; cubes cut off by the block
/// boundary average only the voxels present. Integer results are rounded
/// half away from zero and saturate at the type's range.
pub fn reduce_mean(dtype: DataType, input: &[u8], extent: SpatialShape, factor: u64) -> Bytes {
    dispatch_dtype!(dtype, T => {
        let values: Vec<T> = decode_elements(input);
        Bytes::from(encode_elements(&mean_blocks(&values, extent, factor)))
    })
}

/// Output extent of [`reduce_mean`].
pub fn reduced_extent(extent: SpatialShape, factor: u64) -> SpatialShape {
    SpatialShape::new(
        extent.z.div_ceil(factor),
        extent.y.div_ceil(factor),
        extent.x.div_ceil(factor),
    )
}

fn mean_blocks<T: Element>(values: &[T], extent: SpatialShape, factor: u64) -> Vec<T> {
    let out = reduced_extent(extent, factor);
    let mut sums = vec![0f64; out.voxels() as usize];
    let mut counts = vec![0u64; out.voxels() as usize];

    let (ny, nx) = (extent.y as usize, extent.x as usize);
    let (oy_len, ox_len) = (out.y as usize, out.x as usize);
    let f = factor as usize;

    for z in 0..extent.z as usize {
        let oz = z / f;
        for y in 0..ny {
            let row = (z * ny + y) * nx;
            let out_row = (oz * oy_len + y / f) * ox_len;
            for x in 0..nx {
                let o = out_row + x / f;
                sums[o] += values[row + x].to_f64();
                counts[o] += 1;
            }
        }
    }

    sums.iter()
        .zip(&counts)
        .map(|(&sum, &count)| T::from_mean(sum / count as f64))
        .collect()
}
