//! Dominant color extraction.
//!
//! The picture is downsampled to a fixed canvas, pixels are histogrammed in HSL
//! space and the most populous vivid buckets are blended into one color. The
//! result is fully determined by the pixel data.

use std::collections::BTreeMap;

use galleria_core::DominantColor;
use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::ProcessingError;

#[derive(Debug, Clone)]
pub struct ColorExtractorConfig {
    pub canvas_size: u32,
    pub saturation_buckets: u32,
    pub lightness_buckets: u32,
    pub min_saturation: f32,
    pub min_lightness: f32,
    pub max_lightness: f32,
    /// How many surviving buckets are blended.
    pub top_buckets: usize,
    pub gamma: f32,
}

impl Default for ColorExtractorConfig {
    fn default() -> Self {
        Self {
            canvas_size: 64,
            saturation_buckets: 5,
            lightness_buckets: 5,
            min_saturation: 0.15,
            min_lightness: 0.12,
            max_lightness: 0.88,
            top_buckets: 5,
            gamma: 1.1,
        }
    }
}

/// `(hue / 10deg, saturation bin, lightness bin)`
type BucketKey = (u16, u16, u16);

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    count: u32,
    hue_sin: f64,
    hue_cos: f64,
    saturation: f64,
    lightness: f64,
}

impl Bucket {
    fn add(&mut self, hsl: Hsl) {
        let radians = (hsl.hue as f64).to_radians();
        self.count += 1;
        self.hue_sin += radians.sin();
        self.hue_cos += radians.cos();
        self.saturation += hsl.saturation as f64;
        self.lightness += hsl.lightness as f64;
    }

    fn average(&self) -> Hsl {
        let n = self.count.max(1) as f64;
        Hsl {
            hue: circular_degrees(self.hue_sin, self.hue_cos),
            saturation: (self.saturation / n) as f32,
            lightness: (self.lightness / n) as f32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Hsl {
    hue: f32,
    saturation: f32,
    lightness: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ColorExtractor {
    config: ColorExtractorConfig,
}

impl ColorExtractor {
    pub fn new(config: ColorExtractorConfig) -> Self {
        Self { config }
    }

    /// Decode `bytes` (typically the thumbnail derivative) and extract.
    pub fn extract_from_bytes(&self, bytes: &[u8]) -> Result<Option<DominantColor>, ProcessingError> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| ProcessingError::Decode(e.to_string()))?;
        Ok(self.extract(&image))
    }

    /// `None` only when every pixel is fully transparent.
    pub fn extract(&self, image: &DynamicImage) -> Option<DominantColor> {
        let histogram = self.histogram(image);
        let blended = self.blend(&histogram)?;
        Some(self.finish(blended))
    }

    fn histogram(&self, image: &DynamicImage) -> BTreeMap<BucketKey, Bucket> {
        let size = self.config.canvas_size;
        let canvas = image.resize_exact(size, size, FilterType::Triangle).to_rgba8();
        let s_buckets = self.config.saturation_buckets.max(1);
        let l_buckets = self.config.lightness_buckets.max(1);

        let mut buckets: BTreeMap<BucketKey, Bucket> = BTreeMap::new();
        for pixel in canvas.pixels() {
            let [r, g, b, a] = pixel.0;
            if a == 0 {
                continue;
            }
            let hsl = rgb_to_hsl(r, g, b);
            let key = (
                ((hsl.hue / 10.0).floor() as u16).min(35),
                bin(hsl.saturation, s_buckets),
                bin(hsl.lightness, l_buckets),
            );
            buckets.entry(key).or_default().add(hsl);
        }
        buckets
    }

    fn blend(&self, histogram: &BTreeMap<BucketKey, Bucket>) -> Option<Hsl> {
        // BTreeMap iteration is key-ascending, and the sort is stable, so equal
        // counts keep key order.
        let mut ranked: Vec<(&BucketKey, &Bucket)> = histogram.iter().collect();
        ranked.sort_by(|a, b| b.1.count.cmp(&a.1.count));

        let survivors: Vec<&Bucket> = ranked
            .iter()
            .map(|(_, bucket)| *bucket)
            .filter(|bucket| {
                let avg = bucket.average();
                avg.saturation >= self.config.min_saturation
                    && avg.lightness >= self.config.min_lightness
                    && avg.lightness <= self.config.max_lightness
            })
            .take(self.config.top_buckets)
            .collect();

        if survivors.is_empty() {
            return ranked.first().map(|(_, bucket)| bucket.average());
        }

        let mut weight_sum = 0.0f64;
        let mut hue_sin = 0.0f64;
        let mut hue_cos = 0.0f64;
        let mut saturation = 0.0f64;
        let mut lightness = 0.0f64;
        for bucket in &survivors {
            let avg = bucket.average();
            let weight = bucket.count as f64
                * avg.saturation as f64
                * (1.0 - (avg.lightness as f64 - 0.5).abs());
            let radians = (avg.hue as f64).to_radians();
            weight_sum += weight;
            hue_sin += weight * radians.sin();
            hue_cos += weight * radians.cos();
            saturation += weight * avg.saturation as f64;
            lightness += weight * avg.lightness as f64;
        }

        if weight_sum <= f64::EPSILON {
            return survivors.first().map(|bucket| bucket.average());
        }

        Some(Hsl {
            hue: circular_degrees(hue_sin, hue_cos),
            saturation: (saturation / weight_sum) as f32,
            lightness: (lightness / weight_sum) as f32,
        })
    }

    fn finish(&self, hsl: Hsl) -> DominantColor {
        let (r, g, b) = hsl_to_rgb(hsl);
        let exponent = 1.0 / self.config.gamma;
        let channel = |c: f32| (c.clamp(0.0, 1.0).powf(exponent) * 255.0).round() as u8;
        let (red, green, blue) = (channel(r), channel(g), channel(b));

        let (hue, saturation, value) = rgb_to_hsv(red, green, blue);
        DominantColor {
            red,
            green,
            blue,
            hue,
            saturation,
            value,
            hue_bucket: ((hue / 10.0).floor() as u8).min(35),
            saturation_bucket: bin(saturation, 10) as u8,
            value_bucket: bin(value, 10) as u8,
        }
    }
}

fn bin(unit: f32, buckets: u32) -> u16 {
    ((unit * buckets as f32).floor() as u32).min(buckets - 1) as u16
}

fn circular_degrees(sin: f64, cos: f64) -> f32 {
    if sin.abs() < 1e-12 && cos.abs() < 1e-12 {
        return 0.0;
    }
    let degrees = sin.atan2(cos).to_degrees();
    let normalized = if degrees < 0.0 { degrees + 360.0 } else { degrees };
    (normalized as f32) % 360.0
}

fn rgb_to_hsl(r: u8, g: u8, b: u8) -> Hsl {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let lightness = (max + min) / 2.0;
    let delta = max - min;

    if delta <= f32::EPSILON {
        return Hsl {
            hue: 0.0,
            saturation: 0.0,
            lightness,
        };
    }

    let saturation = delta / (1.0 - (2.0 * lightness - 1.0).abs());
    Hsl {
        hue: hue_degrees(r, g, b, max, delta),
        saturation: saturation.clamp(0.0, 1.0),
        lightness,
    }
}

fn hsl_to_rgb(hsl: Hsl) -> (f32, f32, f32) {
    let chroma = (1.0 - (2.0 * hsl.lightness - 1.0).abs()) * hsl.saturation;
    let sector = hsl.hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = hsl.lightness - chroma / 2.0;
    (r + m, g + m, b + m)
}

fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta <= f32::EPSILON {
        0.0
    } else {
        hue_degrees(r, g, b, max, delta)
    };
    let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };
    (hue, saturation, max)
}

fn hue_degrees(r: f32, g: f32, b: f32, max: f32, delta: f32) -> f32 {
    let hue = if max == r {
        60.0 * (((g - b) / delta) % 6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    if hue < 0.0 {
        hue + 360.0
    } else {
        hue
    }
}
