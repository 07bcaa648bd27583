// Mask-driven background reconstruction.
//
// Both methods only ever write pixels whose mask bit is set.

use image::{Rgba, RgbaImage};
use ndarray::Array2;
use rayon::prelude::*;

use crate::core::errors::{ErasureError, ErasureResult};

const NEIGHBOURS_4: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Fill masked pixels from the boundary inward.
///
/// Each pass fills every masked pixel touching the known area with an
/// inverse-distance weighted mean of the known pixels within `radius`, then
/// promotes that layer to known. Layers are computed in parallel and
/// committed together, so the result does not depend on scan order.
pub(crate) fn fast_march(img: &mut RgbaImage, mask: &Array2<bool>, radius: u32) -> ErasureResult<()> {
    let (w, h) = img.dimensions();
    let mut known = mask.mapv(|m| !m);
    if !known.iter().any(|&k| k) {
        return Err(ErasureError::NoKnownPixels);
    }

    let mut queued = Array2::<bool>::from_elem((h as usize, w as usize), false);
    let mut frontier: Vec<(u32, u32)> = Vec::new();
    for ((y, x), &m) in mask.indexed_iter() {
        if m && touches_known(&known, x as i64, y as i64) {
            queued[[y, x]] = true;
            frontier.push((x as u32, y as u32));
        }
    }

    let radius = radius.max(1) as i64;
    while !frontier.is_empty() {
        let filled: Vec<Rgba<u8>> = {
            let src: &RgbaImage = img;
            let known_ref = &known;
            frontier
                .par_iter()
                .map(|&(x, y)| weighted_known_mean(src, known_ref, x as i64, y as i64, radius))
                .collect()
        };

        for (&(x, y), px) in frontier.iter().zip(filled) {
            img.put_pixel(x, y, px);
            known[[y as usize, x as usize]] = true;
        }

        let mut next = Vec::new();
        for &(x, y) in &frontier {
            for (dx, dy) in NEIGHBOURS_4 {
                let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let idx = [ny as usize, nx as usize];
                if mask[idx] && !known[idx] && !queued[idx] {
                    queued[idx] = true;
                    next.push((nx as u32, ny as u32));
                }
            }
        }
        frontier = next;
    }

    Ok(())
}

/// Harmonic fill: a boundary-inward initialisation refined by Jacobi
/// iterations of the 4-neighbour average, with the unmasked pixels held
/// fixed as boundary values.
pub(crate) fn diffuse(
    img: &mut RgbaImage,
    mask: &Array2<bool>,
    radius: u32,
    iterations: u32,
) -> ErasureResult<()> {
    fast_march(img, mask, radius)?;

    let (w, h) = img.dimensions();
    let masked: Vec<(u32, u32)> = mask
        .indexed_iter()
        .filter(|(_, &m)| m)
        .map(|((y, x), _)| (x as u32, y as u32))
        .collect();
    if masked.is_empty() {
        return Ok(());
    }

    let mut slot = Array2::<usize>::from_elem((h as usize, w as usize), usize::MAX);
    for (i, &(x, y)) in masked.iter().enumerate() {
        slot[[y as usize, x as usize]] = i;
    }

    let mut values: Vec<[f32; 4]> = masked
        .iter()
        .map(|&(x, y)| to_f32(img.get_pixel(x, y)))
        .collect();

    for _ in 0..iterations {
        let src: &RgbaImage = img;
        let (slot_ref, prev) = (&slot, &values);
        values = masked
            .par_iter()
            .map(|&(x, y)| {
                let mut acc = [0.0f32; 4];
                let mut n = 0.0f32;
                for (dx, dy) in NEIGHBOURS_4 {
                    let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                        continue;
                    }
                    let s = slot_ref[[ny as usize, nx as usize]];
                    let v = if s == usize::MAX {
                        to_f32(src.get_pixel(nx as u32, ny as u32))
                    } else {
                        prev[s]
                    };
                    for c in 0..4 {
                        acc[c] += v[c];
                    }
                    n += 1.0;
                }
                acc.map(|v| v / n.max(1.0))
            })
            .collect();
    }

    for (&(x, y), v) in masked.iter().zip(&values) {
        img.put_pixel(x, y, from_f32(*v));
    }
    Ok(())
}

/// Paint `bbox` with the mean colour of the unmasked one-pixel ring around it,
/// white if the ring has no such pixels. Masked pixels only.
pub(crate) fn solid_fill(img: &mut RgbaImage, original: &RgbaImage, mask: &Array2<bool>, bbox: [i32; 4]) {
    let colour = border_colour(original, mask, bbox).unwrap_or(Rgba([255, 255, 255, 255]));
    let [x1, y1, x2, y2] = bbox;
    for y in y1.max(0)..y2.min(img.height() as i32) {
        for x in x1.max(0)..x2.min(img.width() as i32) {
            if mask[[y as usize, x as usize]] {
                img.put_pixel(x as u32, y as u32, colour);
            }
        }
    }
}

fn border_colour(img: &RgbaImage, mask: &Array2<bool>, bbox: [i32; 4]) -> Option<Rgba<u8>> {
    let (w, h) = (img.width() as i32, img.height() as i32);
    let [x1, y1, x2, y2] = bbox;
    let mut acc = [0.0f32; 4];
    let mut n = 0.0f32;

    let mut sample = |x: i32, y: i32| {
        if x < 0 || y < 0 || x >= w || y >= h || mask[[y as usize, x as usize]] {
            return;
        }
        let v = to_f32(img.get_pixel(x as u32, y as u32));
        for c in 0..4 {
            acc[c] += v[c];
        }
        n += 1.0;
    };

    for x in (x1 - 1)..=x2 {
        sample(x, y1 - 1);
        sample(x, y2);
    }
    for y in y1..y2 {
        sample(x1 - 1, y);
        sample(x2, y);
    }

    (n > 0.0).then(|| from_f32(acc.map(|v| v / n)))
}

fn touches_known(known: &Array2<bool>, x: i64, y: i64) -> bool {
    let (h, w) = known.dim();
    NEIGHBOURS_4.iter().any(|&(dx, dy)| {
        let (nx, ny) = (x + dx, y + dy);
        nx >= 0 && ny >= 0 && (nx as usize) < w && (ny as usize) < h && known[[ny as usize, nx as usize]]
    })
}

fn weighted_known_mean(img: &RgbaImage, known: &Array2<bool>, x: i64, y: i64, radius: i64) -> Rgba<u8> {
    let (h, w) = known.dim();
    let mut acc = [0.0f32; 4];
    let mut total = 0.0f32;

    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let d2 = dx * dx + dy * dy;
            if d2 == 0 || d2 > radius * radius {
                continue;
            }
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx as usize >= w || ny as usize >= h || !known[[ny as usize, nx as usize]] {
                continue;
            }
            let weight = 1.0 / d2 as f32;
            let v = to_f32(img.get_pixel(nx as u32, ny as u32));
            for c in 0..4 {
                acc[c] += v[c] * weight;
            }
            total += weight;
        }
    }

    if total == 0.0 {
        // unreachable for frontier pixels, which always touch a known pixel
        return *img.get_pixel(x as u32, y as u32);
    }
    from_f32(acc.map(|v| v / total))
}

fn to_f32(p: &Rgba<u8>) -> [f32; 4] {
    [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
}

fn from_f32(v: [f32; 4]) -> Rgba<u8> {
    Rgba(v.map(|c| c.round().clamp(0.0, 255.0) as u8))
}
