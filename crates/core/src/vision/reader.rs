//! Numeric reader: preprocess a captured region several ways, recognize digits
//! in each, and keep the value most variants agree on.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use regex::Regex;

use crate::logger;

/// Turns one preprocessed image into text. Digits are all that matter.
pub trait DigitRecognizer: Send + Sync {
    fn recognize(&self, image: &GrayImage) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Grayscale,
    Binary,
    Inverted,
    Otsu,
}

pub const BINARY_THRESHOLD: u8 = 128;

fn threshold(gray: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] >= level { Luma([255]) } else { Luma([0]) }
    })
}

/// Threshold maximizing between-class variance of the histogram.
pub fn otsu_level(gray: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for px in gray.pixels() {
        hist[px[0] as usize] += 1;
    }
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return BINARY_THRESHOLD;
    }
    let sum_all: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let (mut sum_bg, mut weight_bg) = (0f64, 0u64);
    let (mut best, mut best_var) = (0u8, -1f64);
    for t in 0..256usize {
        weight_bg += hist[t];
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += t as f64 * hist[t] as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let between = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);
        if between > best_var {
            best_var = between;
            best = t as u8;
        }
    }
    // pixels above the split are foreground
    best.saturating_add(1)
}

/// The four preprocessing variants, in a fixed order.
pub fn variants(region: &RgbImage) -> Vec<(Variant, GrayImage)> {
    let gray = imageops::grayscale(region);
    let binary = threshold(&gray, BINARY_THRESHOLD);
    let mut inverted = binary.clone();
    imageops::invert(&mut inverted);
    let otsu = threshold(&gray, otsu_level(&gray));
    vec![
        (Variant::Grayscale, gray),
        (Variant::Binary, binary),
        (Variant::Inverted, inverted),
        (Variant::Otsu, otsu),
    ]
}

fn digit_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{3,}").expect("static regex"))
}

/// Every run of three or more digits in `text`.
pub fn candidates(text: &str) -> Vec<u64> {
    digit_run()
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// Most frequent value; ties go to whichever was seen first.
pub fn vote(values: &[u64]) -> Option<u64> {
    let mut counts: HashMap<u64, (usize, usize)> = HashMap::new();
    for (order, &v) in values.iter().enumerate() {
        counts.entry(v).or_insert((0, order)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
        .map(|(v, _)| v)
}

pub struct NumericReader {
    recognizer: Box<dyn DigitRecognizer>,
}

impl NumericReader {
    pub fn new(recognizer: Box<dyn DigitRecognizer>) -> Self {
        Self { recognizer }
    }

    /// Read a number from `region`, or None when no variant yields a candidate.
    pub fn read_number(&self, region: &RgbImage) -> Option<u64> {
        let mut seen = Vec::new();
        for (variant, img) in variants(region) {
            let text = self.recognizer.recognize(&img);
            let found = candidates(&text);
            logger::debug(&format!("ocr {:?}: {:?} -> {:?}", variant, text, found));
            seen.extend(found);
        }
        vote(&seen)
    }
}

const INK: u8 = 128;
const NORM_W: u32 = 12;
const NORM_H: u32 = 16;
const GLYPH_MIN_SCORE: f32 = 0.5;

/// Column-segmenting recognizer for the client's bitmap digit font.
///
/// Ink is bright (>= 128). Blobs much shorter than the tallest one are treated
/// as separators (thousands commas) and dropped.
pub struct GlyphRecognizer {
    glyphs: Vec<(char, GrayImage)>,
}

impl GlyphRecognizer {
    pub fn new(templates: Vec<(char, GrayImage)>) -> Self {
        let glyphs = templates
            .into_iter()
            .filter_map(|(c, img)| normalize(&img).map(|n| (c, n)))
            .collect();
        Self { glyphs }
    }

    /// Load `0.png` .. `9.png` from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut templates = Vec::with_capacity(10);
        for d in 0..10u32 {
            let path = dir.join(format!("{}.png", d));
            let img = image::open(&path)
                .with_context(|| format!("missing digit template {}", path.display()))?
                .to_luma8();
            let c = char::from_digit(d, 10).unwrap_or('?');
            templates.push((c, img));
        }
        Ok(Self::new(templates))
    }

    fn classify(&self, glyph: &GrayImage) -> char {
        let Some(norm) = normalize(glyph) else { return '?' };
        self.glyphs
            .iter()
            .map(|(c, t)| (*c, correlate(&norm, t)))
            .filter(|(_, s)| *s >= GLYPH_MIN_SCORE)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map_or('?', |(c, _)| c)
    }
}

impl DigitRecognizer for GlyphRecognizer {
    fn recognize(&self, image: &GrayImage) -> String {
        let spans = column_spans(image);
        let blobs: Vec<GrayImage> = spans
            .iter()
            .filter_map(|&(x0, x1)| ink_crop(image, x0, x1))
            .collect();
        let tallest = blobs.iter().map(|b| b.height()).max().unwrap_or(0);
        blobs
            .iter()
            .filter(|b| b.height() * 2 > tallest)
            .map(|b| self.classify(b))
            .collect()
    }
}

fn has_ink(img: &GrayImage, x: u32) -> bool {
    (0..img.height()).any(|y| img.get_pixel(x, y)[0] >= INK)
}

/// Half-open column ranges containing ink, split by empty columns.
fn column_spans(img: &GrayImage) -> Vec<(u32, u32)> {
    let mut spans = Vec::new();
    let mut start = None;
    for x in 0..img.width() {
        match (has_ink(img, x), start) {
            (true, None) => start = Some(x),
            (false, Some(s)) => {
                spans.push((s, x));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, img.width()));
    }
    spans
}

/// Crop columns `x0..x1` to their inked rows.
fn ink_crop(img: &GrayImage, x0: u32, x1: u32) -> Option<GrayImage> {
    let rows: Vec<u32> = (0..img.height())
        .filter(|&y| (x0..x1).any(|x| img.get_pixel(x, y)[0] >= INK))
        .collect();
    let (top, bottom) = (*rows.first()?, *rows.last()?);
    Some(imageops::crop_imm(img, x0, top, x1 - x0, bottom - top + 1).to_image())
}

/// Trim to the ink box, scale to the fixed height, and center horizontally.
fn normalize(img: &GrayImage) -> Option<GrayImage> {
    let spans = column_spans(img);
    let (x0, x1) = (spans.first()?.0, spans.last()?.1);
    let crop = ink_crop(img, x0, x1)?;
    let scaled_w = ((crop.width() * NORM_H) as f32 / crop.height() as f32).round() as u32;
    let scaled = imageops::resize(&crop, scaled_w.clamp(1, NORM_W), NORM_H, FilterType::Nearest);
    let mut canvas = GrayImage::new(NORM_W, NORM_H);
    let left = (NORM_W - scaled.width()) / 2;
    imageops::replace(&mut canvas, &scaled, left as i64, 0);
    Some(canvas)
}

/// Zero-mean correlation of two equally sized images.
fn correlate(a: &GrayImage, b: &GrayImage) -> f32 {
    let n = (a.width() * a.height()) as f64;
    let mean = |img: &GrayImage| img.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    let (ma, mb) = (mean(a), mean(b));
    let (mut num, mut da, mut db) = (0f64, 0f64, 0f64);
    for (pa, pb) in a.pixels().zip(b.pixels()) {
        let (va, vb) = (pa[0] as f64 - ma, pb[0] as f64 - mb);
        num += va * vb;
        da += va * va;
        db += vb * vb;
    }
    if da <= 0.0 || db <= 0.0 {
        return if da == db { 1.0 } else { 0.0 };
    }
    (num / (da * db).sqrt()) as f32
}
