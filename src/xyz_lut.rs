// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-pixel geometry lookup table.
//!
//! Converting a range sample to a Cartesian point needs the direction of the
//! beam that produced it, which depends on the column (encoder angle) and
//! the pixel (beam altitude and azimuth offset), plus a small offset because
//! the beams originate off the lidar axis.  All of that is folded into a
//! table computed once from the sensor calibration:
//!
//! ```text
//! point[i] = range[i] * direction[i] + offset[i]      i = pixel * width + column
//! ```
//!
//! Both `direction` and `offset` are pre-scaled from millimeters to meters.

use crate::{lidar::Error, ouster::Parameters};
use ndarray::Array2;
use std::f64::consts::PI;

/// Range samples are reported in millimeters.
pub const RANGE_UNIT: f64 = 0.001;

/// Precomputed unit direction vectors and offsets for every pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct XyzLut {
    width: usize,
    height: usize,
    direction: Array2<f64>,
    offset: Array2<f64>,
}

impl XyzLut {
    /// Build the table for a sensor from its metadata.
    pub fn new(params: &Parameters) -> Result<Self, Error> {
        params.validate()?;

        let fmt = &params.lidar_data_format;
        let beams = &params.beam_intrinsics;
        let azimuth: Vec<f64> = beams.beam_azimuth_angles.iter().map(|&a| a as f64).collect();
        let altitude: Vec<f64> = beams.beam_altitude_angles.iter().map(|&a| a as f64).collect();

        let mut transform = [0.0; 16];
        for (dst, &src) in transform
            .iter_mut()
            .zip(params.lidar_intrinsics.lidar_to_sensor_transform.iter())
        {
            *dst = src as f64;
        }

        make_xyz_lut(
            fmt.columns_per_frame,
            fmt.pixels_per_column,
            RANGE_UNIT,
            params.beam_origin_mm(),
            &transform,
            &azimuth,
            &altitude,
        )
    }

    /// Assemble a table from precomputed `(width * height, 3)` arrays.
    ///
    /// The vectors are used as-is: a range sample `r` at pixel `i` maps to
    /// `r * direction[i] + offset[i]`.
    pub fn from_parts(
        width: usize,
        height: usize,
        direction: Array2<f64>,
        offset: Array2<f64>,
    ) -> Result<Self, Error> {
        let shape = [width * height, 3];
        if width == 0 || height == 0 || direction.shape() != shape || offset.shape() != shape {
            return Err(Error::Config(format!(
                "lookup table shapes {:?}/{:?} do not match a {}x{} scan",
                direction.shape(),
                offset.shape(),
                width,
                height
            )));
        }

        Ok(Self {
            width,
            height,
            direction,
            offset,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn direction(&self) -> &Array2<f64> {
        &self.direction
    }

    #[inline]
    pub fn offset(&self) -> &Array2<f64> {
        &self.offset
    }
}

/// Compute the lookup table from beam calibration.
///
/// # Arguments
///
/// * `width`, `height` - Columns per frame and pixels per column
/// * `range_unit` - Meters per range unit
/// * `beam_origin_mm` - Distance from the lidar origin to the beam origin
/// * `transform` - Row-major 4x4 lidar to sensor transform (millimeters)
/// * `azimuth_deg`, `altitude_deg` - Per-beam angles in degrees
pub fn make_xyz_lut(
    width: usize,
    height: usize,
    range_unit: f64,
    beam_origin_mm: f64,
    transform: &[f64; 16],
    azimuth_deg: &[f64],
    altitude_deg: &[f64],
) -> Result<XyzLut, Error> {
    if width == 0 || height == 0 {
        return Err(Error::Config(format!(
            "invalid scan dimensions {}x{}",
            width, height
        )));
    }

    if azimuth_deg.len() != height || altitude_deg.len() != height {
        return Err(Error::Config(format!(
            "expected {} beam angles, got {} azimuth and {} altitude",
            height,
            azimuth_deg.len(),
            altitude_deg.len()
        )));
    }

    let rotation = |v: [f64; 3]| -> [f64; 3] {
        [
            transform[0] * v[0] + transform[1] * v[1] + transform[2] * v[2],
            transform[4] * v[0] + transform[5] * v[1] + transform[6] * v[2],
            transform[8] * v[0] + transform[9] * v[1] + transform[10] * v[2],
        ]
    };
    let translation = [transform[3], transform[7], transform[11]];

    let azimuth_radians = 2.0 * PI / width as f64;
    let mut direction = Array2::<f64>::zeros((width * height, 3));
    let mut offset = Array2::<f64>::zeros((width * height, 3));

    for u in 0..height {
        let azimuth = -azimuth_deg[u].to_radians();
        let altitude = altitude_deg[u].to_radians();

        for v in 0..width {
            let i = u * width + v;
            let encoder = 2.0 * PI - v as f64 * azimuth_radians;

            let dir = [
                (encoder + azimuth).cos() * altitude.cos(),
                (encoder + azimuth).sin() * altitude.cos(),
                altitude.sin(),
            ];
            let off = [
                (encoder.cos() - dir[0]) * beam_origin_mm,
                (encoder.sin() - dir[1]) * beam_origin_mm,
                -dir[2] * beam_origin_mm,
            ];

            let dir = rotation(dir);
            let off = rotation(off);
            for k in 0..3 {
                direction[[i, k]] = dir[k] * range_unit;
                offset[[i, k]] = (off[k] + translation[k]) * range_unit;
            }
        }
    }

    XyzLut::from_parts(width, height, direction, offset)
}
