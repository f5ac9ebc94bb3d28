//! Geometry helpers codecs depend on: crop, Lanczos resize and coalesce.
//!
//! These are deliberately small. Cropping and resizing serve the read-side
//! `extract` option and pyramid TIFF levels; coalescing flattens animated
//! sequences with differing page offsets before they are handed to a
//! frame-oriented delegate.
//!
//! Resizing is separable (horizontal pass, then vertical) with rows
//! processed in parallel via rayon. Colormapped images come back as
//! direct class; the CMYK black channel in the index array is resampled
//! like any other channel.

use rayon::prelude::*;

use crate::colorspace::Colorspace;
use crate::error::{Error, Result};
use crate::geometry::RectangleInfo;
use crate::image::Image;
use crate::list::ImageList;
use crate::pixel::PixelPacket;
use crate::quantum::{Quantum, QUANTUM_RANGE};

/// Lanczos lobes.
const LANCZOS_SUPPORT: f32 = 3.0;

/// Copies a region into a new image. The region is clipped to the image.
pub fn crop(image: &Image, region: RectangleInfo) -> Result<Image> {
    let clipped = region
        .clip_to(image.columns(), image.rows())
        .ok_or_else(|| {
            Error::invalid_region(
                region.x.max(0) as usize,
                region.y.max(0) as usize,
                region.width,
                region.height,
                image.columns(),
                image.rows(),
            )
        })?;
    let mut out = image.clone_with_extent(clipped.width, clipped.height)?;
    let (x0, y0) = (clipped.x as usize, clipped.y as usize);
    for y in 0..clipped.height {
        let src = (y0 + y) * image.columns() + x0;
        let dst = y * clipped.width;
        out.pixels_mut()[dst..dst + clipped.width]
            .copy_from_slice(&image.pixels()[src..src + clipped.width]);
        if !image.indexes().is_empty() {
            out.indexes_mut()[dst..dst + clipped.width]
                .copy_from_slice(&image.indexes()[src..src + clipped.width]);
        }
    }
    out.page = RectangleInfo::new(clipped.width, clipped.height, 0, 0);
    Ok(out)
}

#[inline]
fn lanczos_weight(x: f32) -> f32 {
    let ax = x.abs();
    if ax < 1e-8 {
        1.0
    } else if ax < LANCZOS_SUPPORT {
        let pi_x = std::f32::consts::PI * ax;
        let pi_x_a = pi_x / LANCZOS_SUPPORT;
        (pi_x.sin() / pi_x) * (pi_x_a.sin() / pi_x_a)
    } else {
        0.0
    }
}

/// Contributions of source samples to one destination sample.
fn contributions(src_len: usize, dst_len: usize) -> Vec<(usize, Vec<f32>)> {
    let scale = src_len as f32 / dst_len as f32;
    let blur = scale.max(1.0);
    let support = LANCZOS_SUPPORT * blur;
    (0..dst_len)
        .map(|d| {
            let center = (d as f32 + 0.5) * scale - 0.5;
            let left = ((center - support).floor().max(0.0)) as usize;
            let right = ((center + support).ceil().max(0.0) as usize).min(src_len - 1);
            let mut weights: Vec<f32> = (left..=right)
                .map(|s| lanczos_weight((s as f32 - center) / blur))
                .collect();
            let sum: f32 = weights.iter().sum();
            if sum.abs() > f32::EPSILON {
                for w in &mut weights {
                    *w /= sum;
                }
            }
            (left, weights)
        })
        .collect()
}

const CHANNELS: usize = 5;

fn to_planes(image: &Image) -> Vec<[f32; CHANNELS]> {
    let indexes = image.indexes();
    let cmyk = image.colorspace() == Colorspace::Cmyk;
    image
        .pixels()
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let k = if cmyk { indexes.get(i).copied().unwrap_or(0.0) } else { 0.0 };
            [p.red, p.green, p.blue, p.opacity, k]
        })
        .collect()
}

/// Resamples to `columns x rows` with a Lanczos-3 filter.
pub fn resize(image: &Image, columns: usize, rows: usize) -> Result<Image> {
    if columns == 0 || rows == 0 {
        return Err(Error::invalid_dimensions(columns, rows, "resize target is empty"));
    }
    let (src_w, src_h) = (image.columns(), image.rows());
    let src = to_planes(image);

    let h_weights = contributions(src_w, columns);
    let mut horizontal = vec![[0.0f32; CHANNELS]; columns * src_h];
    horizontal
        .par_chunks_mut(columns)
        .enumerate()
        .for_each(|(y, row)| {
            let src_row = &src[y * src_w..(y + 1) * src_w];
            for (x, (left, weights)) in h_weights.iter().enumerate() {
                let mut acc = [0.0f32; CHANNELS];
                for (k, w) in weights.iter().enumerate() {
                    let s = &src_row[left + k];
                    for c in 0..CHANNELS {
                        acc[c] += s[c] * w;
                    }
                }
                row[x] = acc;
            }
        });

    let v_weights = contributions(src_h, rows);
    let mut vertical = vec![[0.0f32; CHANNELS]; columns * rows];
    vertical
        .par_chunks_mut(columns)
        .enumerate()
        .for_each(|(y, row)| {
            let (top, weights) = &v_weights[y];
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = [0.0f32; CHANNELS];
                for (k, w) in weights.iter().enumerate() {
                    let s = &horizontal[(top + k) * columns + x];
                    for c in 0..CHANNELS {
                        acc[c] += s[c] * w;
                    }
                }
                *out = acc;
            }
        });

    let mut out = image.clone_with_extent(columns, rows)?;
    out.set_direct_class();
    let cmyk = out.colorspace() == Colorspace::Cmyk;
    for (dst, v) in out.pixels_mut().iter_mut().zip(&vertical) {
        *dst = PixelPacket::rgbo(
            clamp(v[0]),
            clamp(v[1]),
            clamp(v[2]),
            clamp(v[3]),
        );
    }
    if cmyk {
        for (dst, v) in out.indexes_mut().iter_mut().zip(&vertical) {
            *dst = clamp(v[4]);
        }
    }
    out.page = RectangleInfo::new(columns, rows, 0, 0);
    Ok(out)
}

#[inline]
fn clamp(value: f32) -> Quantum {
    value.clamp(0.0, QUANTUM_RANGE)
}

/// Flattens a sequence onto a common canvas so every frame has the same
/// extent and a zero page offset. Each frame is composited over the
/// previous result at its page offset.
pub fn coalesce(list: &ImageList) -> Result<ImageList> {
    let Some(first) = list.first() else {
        return Ok(ImageList::new());
    };
    let canvas_w = if first.page.width != 0 { first.page.width } else { first.columns() };
    let canvas_h = if first.page.height != 0 { first.page.height } else { first.rows() };
    let mut out = ImageList::new();
    let mut canvas = first.clone_with_extent(canvas_w, canvas_h)?;
    canvas.set_direct_class();
    canvas.matte = list.iter().any(|i| i.matte);
    canvas.set_opacity(if canvas.matte { QUANTUM_RANGE } else { 0.0 });

    for frame in list {
        let mut next = canvas.clone();
        next.scene = frame.scene;
        next.delay = frame.delay;
        next.ticks_per_second = frame.ticks_per_second;
        for y in 0..frame.rows() {
            let cy = frame.page.y + y as i64;
            if cy < 0 || cy >= canvas_h as i64 {
                continue;
            }
            for x in 0..frame.columns() {
                let cx = frame.page.x + x as i64;
                if cx < 0 || cx >= canvas_w as i64 {
                    continue;
                }
                let src = frame.pixel_row(y)[x];
                let i = cy as usize * canvas_w + cx as usize;
                let dst = next.pixels()[i];
                next.pixels_mut()[i] = if frame.matte { over(src, dst) } else { src };
            }
        }
        next.page = RectangleInfo::new(canvas_w, canvas_h, 0, 0);
        canvas = next.clone();
        out.append(next);
    }
    Ok(out)
}

fn over(src: PixelPacket, dst: PixelPacket) -> PixelPacket {
    let sa = src.alpha() / QUANTUM_RANGE;
    let da = dst.alpha() / QUANTUM_RANGE;
    let oa = sa + da * (1.0 - sa);
    if oa <= 0.0 {
        return PixelPacket::rgbo(0.0, 0.0, 0.0, QUANTUM_RANGE);
    }
    let mix = |s: f32, d: f32| (s * sa + d * da * (1.0 - sa)) / oa;
    PixelPacket::rgbo(
        mix(src.red, dst.red),
        mix(src.green, dst.green),
        mix(src.blue, dst.blue),
        QUANTUM_RANGE - oa * QUANTUM_RANGE,
    )
}
