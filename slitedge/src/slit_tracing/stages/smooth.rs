//! Smoothing along the spectral axis.

use rayon::prelude::*;

use crate::common::Buffer2;
use crate::slit_tracing::constants::ROWS_PER_CHUNK;

/// Moving average of length `width` along each column (i.e. across rows),
/// with mirror boundaries. Edges run roughly along the spectral axis, so this
/// suppresses noise without blurring them spatially.
pub(crate) fn smooth(image: &Buffer2<f32>, width: usize) -> Buffer2<f32> {
    let w = image.width();
    let h = image.height();
    if width <= 1 || h < 2 {
        return image.clone();
    }

    let before = (width / 2) as isize;
    let after = (width - width / 2) as isize;
    let norm = 1.0 / width as f32;

    let mut out = Buffer2::new_default(w, h);
    out.pixels_mut()
        .par_chunks_mut(w * ROWS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let y_start = chunk_idx * ROWS_PER_CHUNK;
            for (local_y, row) in chunk.chunks_mut(w).enumerate() {
                let y = (y_start + local_y) as isize;
                row.fill(0.0);
                for dy in -before..after {
                    let src = image.row(mirror(y + dy, h));
                    for (o, &v) in row.iter_mut().zip(src) {
                        *o += v;
                    }
                }
                for o in row.iter_mut() {
                    *o *= norm;
                }
            }
        });
    out
}

/// Reflect `i` about the border samples without repeating them
/// (`d c b | a b c d | c b a`).
#[inline]
pub(crate) fn mirror(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let i = i.rem_euclid(period);
    if i >= n as isize {
        (period - i) as usize
    } else {
        i as usize
    }
}
