// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Dense point cloud built from a complete scan.
//!
//! The cloud keeps one point per scan pixel, including pixels without a
//! return, so it always has `width × height` points in the same row-major
//! order as the lookup table (`i = pixel * width + column`).
//!
//! # Memory Layout
//!
//! Points are stored as a structure of arrays, allocated once and
//! overwritten in place for every frame:
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬────────────┬─────────┬─────────────────┬─────────┬──────────┬────────────┐
//! │ x: [f32] │ y: [f32] │ z: [f32] │ signal:u16 │ t: u32  │ reflectivity:u16│ ring: u8│ nir: u16 │ range: u32 │
//! └──────────┴──────────┴──────────┴────────────┴─────────┴─────────────────┴─────────┴──────────┴────────────┘
//! ```

use crate::{
    lidar::{stamp, Error},
    scan::LidarScan,
    xyz_lut::XyzLut,
};
use tracing::instrument;

/// Structure-of-arrays point cloud for one revolution.
#[derive(Clone, Debug, PartialEq)]
pub struct PointCloud {
    width: usize,
    height: usize,
    x: Vec<f32>,
    y: Vec<f32>,
    z: Vec<f32>,
    signal: Vec<u16>,
    /// Column capture time relative to the frame timestamp, in nanoseconds.
    t: Vec<u32>,
    reflectivity: Vec<u16>,
    ring: Vec<u8>,
    nir: Vec<u16>,
    range: Vec<u32>,
    timestamp: u64,
    frame_id: String,
}

impl PointCloud {
    /// Allocate a zeroed cloud of `width` columns by `height` rings.
    pub fn new(width: usize, height: usize, frame_id: impl Into<String>) -> Self {
        let n = width * height;
        Self {
            width,
            height,
            x: vec![0.0; n],
            y: vec![0.0; n],
            z: vec![0.0; n],
            signal: vec![0; n],
            t: vec![0; n],
            reflectivity: vec![0; n],
            ring: vec![0; n],
            nir: vec![0; n],
            range: vec![0; n],
            timestamp: 0,
            frame_id: frame_id.into(),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of points, always `width * height`.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    #[inline]
    pub fn x(&self) -> &[f32] {
        &self.x
    }

    #[inline]
    pub fn y(&self) -> &[f32] {
        &self.y
    }

    #[inline]
    pub fn z(&self) -> &[f32] {
        &self.z
    }

    #[inline]
    pub fn signal(&self) -> &[u16] {
        &self.signal
    }

    #[inline]
    pub fn t(&self) -> &[u32] {
        &self.t
    }

    #[inline]
    pub fn reflectivity(&self) -> &[u16] {
        &self.reflectivity
    }

    #[inline]
    pub fn ring(&self) -> &[u8] {
        &self.ring
    }

    #[inline]
    pub fn nir(&self) -> &[u16] {
        &self.nir
    }

    /// Range in millimeters.
    #[inline]
    pub fn range(&self) -> &[u32] {
        &self.range
    }

    /// Frame timestamp in nanoseconds.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[inline]
    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    /// Point `i` as `[x, y, z]`.
    #[inline]
    pub fn point(&self, i: usize) -> [f32; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }
}

/// Converts ready scans into point clouds using a fixed lookup table.
#[derive(Clone, Debug)]
pub struct CloudBuilder {
    lut: XyzLut,
    frame_id: String,
}

impl CloudBuilder {
    pub fn new(lut: XyzLut, frame_id: impl Into<String>) -> Self {
        Self {
            lut,
            frame_id: frame_id.into(),
        }
    }

    #[inline]
    pub fn lut(&self) -> &XyzLut {
        &self.lut
    }

    #[inline]
    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    /// Allocate a cloud sized for this builder's lookup table.
    pub fn new_cloud(&self) -> PointCloud {
        PointCloud::new(self.lut.width(), self.lut.height(), self.frame_id.clone())
    }

    /// Fill `cloud` from a complete scan.
    ///
    /// The scan must come from a preprocessor that reported ready.  Every
    /// point is written, zero-range pixels as the origin.  A non-zero
    /// `override_ts` replaces `timestamp` on the cloud.  The cloud is
    /// reallocated only if its shape differs from the lookup table.
    #[instrument(skip_all, level = "trace")]
    pub fn build(
        &self,
        scan: &LidarScan,
        timestamp: u64,
        override_ts: u64,
        cloud: &mut PointCloud,
    ) -> Result<(), Error> {
        let (w, h) = (self.lut.width(), self.lut.height());
        if scan.width() != w || scan.height() != h {
            return Err(Error::Config(format!(
                "scan is {}x{} but lookup table is {}x{}",
                scan.width(),
                scan.height(),
                w,
                h
            )));
        }

        if cloud.width != w || cloud.height != h {
            *cloud = PointCloud::new(w, h, self.frame_id.clone());
        } else if cloud.frame_id != self.frame_id {
            cloud.frame_id.clone_from(&self.frame_id);
        }
        cloud.timestamp = stamp(timestamp, override_ts);

        let direction = self.lut.direction();
        let offset = self.lut.offset();
        let range = scan.range();
        let signal = scan.signal();
        let reflectivity = scan.reflectivity();
        let nir = scan.nir();

        for u in 0..h {
            for v in 0..w {
                let i = u * w + v;
                let r = range[[u, v]];

                if r == 0 {
                    cloud.x[i] = 0.0;
                    cloud.y[i] = 0.0;
                    cloud.z[i] = 0.0;
                } else {
                    let r = r as f64;
                    cloud.x[i] = (r * direction[[i, 0]] + offset[[i, 0]]) as f32;
                    cloud.y[i] = (r * direction[[i, 1]] + offset[[i, 1]]) as f32;
                    cloud.z[i] = (r * direction[[i, 2]] + offset[[i, 2]]) as f32;
                }

                let col_ts = scan.header(v).timestamp;
                cloud.t[i] = col_ts.saturating_sub(timestamp).min(u32::MAX as u64) as u32;
                cloud.range[i] = r;
                cloud.signal[i] = signal[[u, v]];
                cloud.reflectivity[i] = reflectivity[[u, v]];
                cloud.nir[i] = nir[[u, v]];
                cloud.ring[i] = u.min(u8::MAX as usize) as u8;
            }
        }

        Ok(())
    }
}
