// core/perception.rs

// Turns raw sensor replies into agent observations. Color frames arrive as PNG and are
// rescaled to [-1, 1]; depth frames arrive as a numpy array and are cropped to the
// central band, downsampled with linear interpolation and quantized into depth classes.
// Everything here is pure: the bytes were already fetched by the command gateway.

// Dependencies
use crate::UcvError;
use crate::sim_interface::protocol::{GET_DEPTH_NPY, GET_LIT_PNG};
use image::{ImageFormat, RgbaImage};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Rows of an 84-row depth frame kept before downsampling
pub const DEPTH_CROP_ROWS: Range<usize> = 21..63;
/// Vertical and horizontal zoom applied to the cropped band
pub const DEPTH_ZOOM: (f64, f64) = (0.095, 0.19);
/// Lower bin edges for depth classes
pub const DEPTH_BINS: [f32; 8] = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];

/// Which camera sensor to read
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Rendered color frame
    #[default]
    Lit,
    /// Depth buffer
    Depth,
}

impl ViewMode {
    /// Command fetching this sensor
    pub fn command(self) -> &'static str {
        match self {
            ViewMode::Lit => GET_LIT_PNG,
            ViewMode::Depth => GET_DEPTH_NPY,
        }
    }
}

/// Agent-consumable observation
#[derive(Clone, Debug, PartialEq)]
pub enum Observation {
    /// Row-major height x width x 3 values in [-1, 1]
    Color {
        /// Rows
        height: usize,
        /// Columns
        width: usize,
        /// Interleaved RGB values
        data: Vec<f32>,
    },
    /// Channel mean of the rescaled color frame
    Gray(DMatrix<f32>),
    /// Depth classes, -1 below the first bin edge
    Depth(DMatrix<i8>),
}

impl Observation {
    /// Array shape of the observation
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Observation::Color { height, width, .. } => vec![*height, *width, 3],
            Observation::Gray(plane) => vec![plane.nrows(), plane.ncols()],
            Observation::Depth(classes) => vec![classes.nrows(), classes.ncols()],
        }
    }
}

/// Decodes a sensor reply for the given view mode
pub fn decode(view_mode: ViewMode, bytes: &[u8], grayscale: bool) -> Result<Observation, UcvError> {
    match view_mode {
        ViewMode::Lit => color_observation(bytes, grayscale),
        ViewMode::Depth => depth_observation(bytes),
    }
}

/// PNG bytes to an RGBA buffer
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, UcvError> {
    image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map(|img| img.to_rgba8())
        .map_err(|err| UcvError::Decode(format!("png: {}", err)))
}

/// Drops alpha and maps every channel from [0, 255] to [-1, 1]
pub fn normalize_rgb(rgba: &RgbaImage) -> Vec<f32> {
    rgba.pixels()
        .flat_map(|px| [px[0], px[1], px[2]])
        .map(|v| (v as f32 - 127.5) / 127.5)
        .collect()
}

/// Color path of the pipeline
pub fn color_observation(bytes: &[u8], grayscale: bool) -> Result<Observation, UcvError> {
    let rgba = decode_png(bytes)?;
    let (width, height) = (rgba.width() as usize, rgba.height() as usize);
    let data = normalize_rgb(&rgba);

    if grayscale {
        let plane = DMatrix::from_fn(height, width, |r, c| {
            let i = (r * width + c) * 3;
            (data[i] + data[i + 1] + data[i + 2]) / 3.0
        });
        Ok(Observation::Gray(plane))
    } else {
        Ok(Observation::Color { height, width, data })
    }
}

/// Depth path of the pipeline
pub fn depth_observation(bytes: &[u8]) -> Result<Observation, UcvError> {
    let depth = read_npy(bytes)?;
    let resized = crop_and_resize(&depth)?;
    Ok(Observation::Depth(quantize_depth(&resized)))
}

/// Crops the central band and downsamples it to 4 x 16 for an 84 x 84 frame
pub fn crop_and_resize(depth: &DMatrix<f32>) -> Result<DMatrix<f32>, UcvError> {
    if depth.nrows() < DEPTH_CROP_ROWS.end || depth.ncols() == 0 {
        return Err(UcvError::Decode(format!(
            "depth frame of {}x{} is too small to crop rows {:?}",
            depth.nrows(),
            depth.ncols(),
            DEPTH_CROP_ROWS
        )));
    }
    let band = depth.rows(DEPTH_CROP_ROWS.start, DEPTH_CROP_ROWS.len()).into_owned();
    Ok(zoom_linear(&band, DEPTH_ZOOM))
}

/// Resamples by per-axis zoom factors with linear interpolation.
/// Corner samples of input and output coincide.
pub fn zoom_linear(input: &DMatrix<f32>, zoom: (f64, f64)) -> DMatrix<f32> {
    let rows = zoomed_len(input.nrows(), zoom.0);
    let cols = zoomed_len(input.ncols(), zoom.1);
    let row_taps: Vec<_> = (0..rows).map(|i| taps(i, rows, input.nrows())).collect();
    let col_taps: Vec<_> = (0..cols).map(|j| taps(j, cols, input.ncols())).collect();

    DMatrix::from_fn(rows, cols, |i, j| {
        let (r0, r1, tr) = row_taps[i];
        let (c0, c1, tc) = col_taps[j];
        let at = |r: usize, c: usize| input[(r, c)] as f64;
        let top = at(r0, c0) * (1.0 - tc) + at(r0, c1) * tc;
        let bottom = at(r1, c0) * (1.0 - tc) + at(r1, c1) * tc;
        (top * (1.0 - tr) + bottom * tr) as f32
    })
}

fn zoomed_len(len: usize, factor: f64) -> usize {
    (len as f64 * factor).round_ties_even() as usize
}

// Neighbouring source indices and weight of the upper one for output index `i`
fn taps(i: usize, out_len: usize, in_len: usize) -> (usize, usize, f64) {
    let scale = if out_len > 1 {
        (in_len - 1) as f64 / (out_len - 1) as f64
    } else {
        1.0
    };
    let coord = i as f64 * scale;
    let lower = (coord.floor() as usize).min(in_len - 1);
    let upper = (lower + 1).min(in_len - 1);
    (lower, upper, coord - lower as f64)
}

/// Depth class of every value: the number of bin edges at or below it, minus one.
/// Values below 0 map to -1, values at or above 7 to 7.
/// This is numpy `digitize` parity, so 7.5 lands in class 7 rather than 6.
pub fn quantize_depth(depth: &DMatrix<f32>) -> DMatrix<i8> {
    depth.map(depth_class)
}

fn depth_class(value: f32) -> i8 {
    if value.is_nan() {
        // NaN sorts past every edge
        return DEPTH_BINS.len() as i8 - 1;
    }
    DEPTH_BINS.iter().filter(|&&edge| value >= edge).count() as i8 - 1
}

/// Parses a version 1-3 `.npy` payload holding a little-endian float array.
/// A trailing channel axis keeps its first channel.
pub fn read_npy(bytes: &[u8]) -> Result<DMatrix<f32>, UcvError> {
    const MAGIC: &[u8] = b"\x93NUMPY";
    let bad = |msg: String| UcvError::Decode(format!("npy: {}", msg));

    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(bad("missing magic".to_string()));
    }
    let (header_len, offset) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 if bytes.len() >= 12 => (
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            12,
        ),
        version => return Err(bad(format!("unsupported version {}", version))),
    };
    let header = bytes
        .get(offset..offset + header_len)
        .and_then(|h| std::str::from_utf8(h).ok())
        .ok_or_else(|| bad("truncated header".to_string()))?;
    let body = &bytes[offset + header_len..];

    let descr = header_field(header, "descr").ok_or_else(|| bad("no descr".to_string()))?;
    let fortran = header_field(header, "fortran_order") == Some("True");
    let shape = header_field(header, "shape")
        .map(parse_shape)
        .ok_or_else(|| bad("no shape".to_string()))??;

    let values: Vec<f32> = match descr.trim_matches(|c| c == '\'' || c == '"') {
        "<f4" => body.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect(),
        "<f8" => body
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect(),
        "|u1" => body.iter().map(|&b| b as f32).collect(),
        other => return Err(bad(format!("unsupported dtype {}", other))),
    };

    let (rows, cols, channels) = match shape.as_slice() {
        [rows, cols] => (*rows, *cols, 1),
        [rows, cols, channels] if *channels > 0 => (*rows, *cols, *channels),
        other => return Err(bad(format!("unsupported shape {:?}", other))),
    };
    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| bad(format!("shape {:?} overflows", shape)))?;
    if values.len() < expected {
        return Err(bad(format!("{} values for shape {:?}", values.len(), shape)));
    }
    if fortran && channels != 1 {
        return Err(bad("fortran order with channels".to_string()));
    }

    if fortran {
        Ok(DMatrix::from_column_slice(rows, cols, &values[..rows * cols]))
    } else {
        Ok(DMatrix::from_fn(rows, cols, |r, c| values[(r * cols + c) * channels]))
    }
}

// Raw text of `key` in a python dict literal like {'descr': '<f4', 'shape': (84, 84), }
fn header_field<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{}':", key);
    let start = header.find(&pattern)? + pattern.len();
    let rest = header[start..].trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')')? + 1
    } else if let Some(quoted) = rest.strip_prefix('\'') {
        quoted.find('\'')? + 2
    } else {
        rest.find(|c| c == ',' || c == '}')?
    };
    Some(rest[..end].trim())
}

fn parse_shape(raw: &str) -> Result<Vec<usize>, UcvError> {
    raw.trim_matches(|c| c == '(' || c == ')')
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            dim.parse()
                .map_err(|_| UcvError::Decode(format!("npy: bad shape {}", raw)))
        })
        .collect()
}
