//! Normalized cross-correlation template matching (zero-mean, all three channels).

use std::thread;

use image::RgbImage;

use super::catalog::ElementTemplate;
use crate::logger;
use crate::platform::WindowHandle;
use crate::types::LocateResult;

/// Variance below this is treated as a flat patch that cannot correlate.
const FLAT_EPS: f64 = 1e-6;

/// Top-left corner and score of the best placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Summed-area tables over the three channels and the squared sum.
struct Integral {
    stride: usize,
    sums: [Vec<u64>; 3],
    squares: Vec<u64>,
}

impl Integral {
    fn new(img: &RgbImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let stride = w + 1;
        let size = stride * (h + 1);
        let mut sums = [vec![0u64; size], vec![0u64; size], vec![0u64; size]];
        let mut squares = vec![0u64; size];
        let raw = img.as_raw();

        for y in 0..h {
            let mut row = [0u64; 3];
            let mut row_sq = 0u64;
            for x in 0..w {
                let px = &raw[(y * w + x) * 3..(y * w + x) * 3 + 3];
                for c in 0..3 {
                    let v = px[c] as u64;
                    row[c] += v;
                    row_sq += v * v;
                }
                let at = (y + 1) * stride + x + 1;
                let above = y * stride + x + 1;
                for c in 0..3 {
                    sums[c][at] = sums[c][above] + row[c];
                }
                squares[at] = squares[above] + row_sq;
            }
        }
        Self { stride, sums, squares }
    }

    fn rect(table: &[u64], stride: usize, x: usize, y: usize, w: usize, h: usize) -> u64 {
        let a = table[y * stride + x];
        let b = table[y * stride + x + w];
        let c = table[(y + h) * stride + x];
        let d = table[(y + h) * stride + x + w];
        d + a - b - c
    }

    /// Sum of squared deviations from the per-channel window mean.
    fn variance_sum(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let n = (w * h) as f64;
        let sq = Self::rect(&self.squares, self.stride, x, y, w, h) as f64;
        let mut mean_part = 0.0;
        for c in 0..3 {
            let s = Self::rect(&self.sums[c], self.stride, x, y, w, h) as f64;
            mean_part += s * s / n;
        }
        (sq - mean_part).max(0.0)
    }
}

/// Best placement of `needle` inside `haystack` by TM_CCOEFF_NORMED score.
///
/// Returns None when the needle is empty, larger than the haystack, or flat.
/// Ties keep the first placement in row-major order.
pub fn best_match(haystack: &RgbImage, needle: &RgbImage) -> Option<Match> {
    let (hw, hh) = (haystack.width() as usize, haystack.height() as usize);
    let (nw, nh) = (needle.width() as usize, needle.height() as usize);
    if nw == 0 || nh == 0 || nw > hw || nh > hh {
        return None;
    }

    let n = (nw * nh) as f64;
    let mut means = [0f64; 3];
    for px in needle.pixels() {
        for c in 0..3 {
            means[c] += px[c] as f64;
        }
    }
    for m in &mut means {
        *m /= n;
    }
    let centered: Vec<f32> = needle
        .pixels()
        .flat_map(|px| (0..3).map(move |c| (px[c] as f64 - means[c]) as f32))
        .collect();
    let needle_var: f64 = centered.iter().map(|v| (*v as f64) * (*v as f64)).sum();
    if needle_var <= FLAT_EPS {
        return None;
    }

    let integral = Integral::new(haystack);
    let out_w = hw - nw + 1;
    let out_h = hh - nh + 1;
    let raw = haystack.as_raw();

    let score_at = |x: usize, y: usize| -> f32 {
        let window_var = integral.variance_sum(x, y, nw, nh);
        if window_var <= FLAT_EPS {
            return 0.0;
        }
        let mut num = 0f64;
        for j in 0..nh {
            let row_start = ((y + j) * hw + x) * 3;
            let hay_row = &raw[row_start..row_start + nw * 3];
            let tpl_row = &centered[j * nw * 3..(j + 1) * nw * 3];
            let mut acc = 0f32;
            for (t, i) in tpl_row.iter().zip(hay_row) {
                acc += t * (*i as f32);
            }
            num += acc as f64;
        }
        (num / (needle_var * window_var).sqrt()) as f32
    };

    let scan_rows = |rows: std::ops::Range<usize>| -> Option<Match> {
        let mut best: Option<Match> = None;
        for y in rows {
            for x in 0..out_w {
                let score = score_at(x, y);
                if best.map_or(true, |b| score > b.score) {
                    best = Some(Match { x: x as u32, y: y as u32, score });
                }
            }
        }
        best
    };

    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(out_h)
        .max(1);
    if workers == 1 || out_w * out_h * nw * nh < 1 << 16 {
        return scan_rows(0..out_h);
    }

    let chunk = out_h.div_ceil(workers);
    let partials: Vec<Option<Match>> = thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|i| {
                let rows = (i * chunk).min(out_h)..((i + 1) * chunk).min(out_h);
                let scan = &scan_rows;
                s.spawn(move || scan(rows))
            })
            .collect();
        handles.into_iter().map(|h| h.join().ok().flatten()).collect()
    });

    // chunks are in row order, so strict > keeps the earliest tie
    partials.into_iter().flatten().fold(None, |best: Option<Match>, m| match best {
        Some(b) if b.score >= m.score => Some(b),
        _ => Some(m),
    })
}

/// Match a template against an RGB capture of a window.
pub fn locate_in(template: &ElementTemplate, capture: &RgbImage) -> Option<LocateResult> {
    let (tw, th) = template.image.dimensions();
    if tw > capture.width() || th > capture.height() {
        logger::debug(&format!(
            "{} template {}x{} exceeds capture {}x{}",
            template.element,
            tw,
            th,
            capture.width(),
            capture.height()
        ));
        return None;
    }
    let m = best_match(capture, &template.image)?;
    if m.score < template.min_confidence {
        return None;
    }
    Some(LocateResult {
        x: m.x as i32 + tw as i32 / 2 + template.offset.0,
        y: m.y as i32 + th as i32 / 2 + template.offset.1,
        confidence: m.score,
    })
}

/// Capture the window once and report the best match at or above the template's confidence.
pub fn locate(template: &ElementTemplate, window: &mut dyn WindowHandle) -> Option<LocateResult> {
    let region = window.region()?;
    if region.is_empty() {
        return None;
    }
    let capture = window.capture(None)?;
    if capture.width == 0 || capture.height == 0 {
        return None;
    }
    locate_in(template, &capture.to_rgb())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::Element;
    use image::{imageops, Rgb};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noise(w: u32, h: u32, seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        RgbImage::from_fn(w, h, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
    }

    fn canvas_with(patch: &RgbImage, x: i64, y: i64) -> RgbImage {
        let mut canvas = RgbImage::from_pixel(96, 64, Rgb([40, 40, 40]));
        imageops::replace(&mut canvas, patch, x, y);
        canvas
    }

    #[test]
    fn finds_exact_placement() {
        let patch = noise(10, 8, 1);
        let canvas = canvas_with(&patch, 37, 21);
        let m = best_match(&canvas, &patch).unwrap();
        assert_eq!((m.x, m.y), (37, 21));
        assert!(m.score > 0.999);
    }

    #[test]
    fn result_only_at_or_above_confidence() {
        let patch = noise(10, 8, 2);
        let mut canvas = canvas_with(&patch, 5, 5);
        // damage the placed copy so the best score sits well below 1
        for x in 5..10 {
            canvas.put_pixel(x, 6, Rgb([0, 0, 0]));
            canvas.put_pixel(x, 9, Rgb([255, 255, 255]));
        }
        let score = best_match(&canvas, &patch).unwrap().score;
        assert!(score < 0.99);

        let at = ElementTemplate::new(Element::Carry, patch.clone()).with_confidence(score);
        let hit = locate_in(&at, &canvas).unwrap();
        assert_eq!((hit.x, hit.y), (5 + 5, 5 + 4));

        let above = ElementTemplate::new(Element::Carry, patch).with_confidence(score + 0.01);
        assert!(locate_in(&above, &canvas).is_none());
    }

    #[test]
    fn offset_shifts_click_target() {
        let patch = noise(8, 8, 3);
        let canvas = canvas_with(&patch, 20, 10);
        let tpl = ElementTemplate::new(Element::Slot(0), patch);
        let hit = locate_in(&tpl, &canvas).unwrap();
        assert_eq!((hit.x, hit.y), (20 + 4 + 20, 10 + 4));
    }

    #[test]
    fn oversized_template_is_absent() {
        let canvas = noise(16, 16, 4);
        let tpl = ElementTemplate::new(Element::Bag, noise(20, 8, 5)).with_confidence(0.0);
        assert!(locate_in(&tpl, &canvas).is_none());
    }

    #[test]
    fn unrelated_noise_stays_below_threshold() {
        let canvas = canvas_with(&noise(10, 8, 6), 30, 30);
        let tpl = ElementTemplate::new(Element::Bag, noise(10, 8, 7));
        assert!(locate_in(&tpl, &canvas).is_none());
    }

    #[test]
    fn flat_needle_never_matches() {
        let canvas = noise(32, 32, 8);
        let flat = RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]));
        assert!(best_match(&canvas, &flat).is_none());
    }

    #[test]
    fn parallel_scan_agrees_with_exact_position() {
        let patch = noise(24, 16, 9);
        let mut canvas = noise(320, 200, 10);
        imageops::replace(&mut canvas, &patch, 250, 150);
        let m = best_match(&canvas, &patch).unwrap();
        assert_eq!((m.x, m.y), (250, 150));
    }
}
