// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Planar laser scan extracted from the most horizontal ring.

use crate::{
    lidar::{stamp, Error},
    ouster::Parameters,
    scan::LidarScan,
};
use std::f32::consts::PI;

/// Minimum reported range in meters.
pub const RANGE_MIN: f32 = 0.1;
/// Maximum reported range in meters.
pub const RANGE_MAX: f32 = 120.0;

/// One planar scan, laid out like a ROS `sensor_msgs/LaserScan`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LaserScan {
    pub timestamp: u64,
    pub frame_id: String,
    pub angle_min: f32,
    pub angle_max: f32,
    pub angle_increment: f32,
    /// Seconds between measurements.
    pub time_increment: f32,
    /// Seconds between scans.
    pub scan_time: f32,
    pub range_min: f32,
    pub range_max: f32,
    /// Ranges in meters, zero where there was no return.
    pub ranges: Vec<f32>,
    pub intensities: Vec<f32>,
}

/// Index of the beam whose altitude angle is closest to horizontal.
///
/// Ties resolve to the lowest index.
pub fn horizontal_ring(altitude_deg: &[f32]) -> usize {
    let mut ring = 0;
    let mut best = f32::INFINITY;
    for (i, alt) in altitude_deg.iter().enumerate() {
        if alt.abs() < best {
            best = alt.abs();
            ring = i;
        }
    }
    ring
}

/// Builds laser scans from one ring of complete scans.
#[derive(Clone, Debug)]
pub struct LaserScanBuilder {
    ring: usize,
    rate_hz: u32,
    frame_id: String,
}

impl LaserScanBuilder {
    pub fn new(params: &Parameters, frame_id: impl Into<String>) -> Result<Self, Error> {
        params.validate()?;
        let ring = horizontal_ring(&params.beam_intrinsics.beam_altitude_angles);
        Self::with_ring(ring, params.rotation_rate()?, frame_id)
    }

    pub fn with_ring(ring: usize, rate_hz: u32, frame_id: impl Into<String>) -> Result<Self, Error> {
        if rate_hz == 0 {
            return Err(Error::Config("rotation rate must be non-zero".to_string()));
        }

        Ok(Self {
            ring,
            rate_hz,
            frame_id: frame_id.into(),
        })
    }

    #[inline]
    pub fn ring(&self) -> usize {
        self.ring
    }

    #[inline]
    pub fn rate_hz(&self) -> u32 {
        self.rate_hz
    }

    /// Fill `msg` from the configured ring of a complete scan.
    ///
    /// Columns are written in reverse so that angles increase
    /// counter-clockwise from `angle_min`.
    pub fn build(
        &self,
        scan: &LidarScan,
        timestamp: u64,
        override_ts: u64,
        msg: &mut LaserScan,
    ) -> Result<(), Error> {
        if self.ring >= scan.height() {
            return Err(Error::Config(format!(
                "ring {} out of range for a scan of {} pixels",
                self.ring,
                scan.height()
            )));
        }

        let width = scan.width();
        let rate = self.rate_hz as f32;

        msg.timestamp = stamp(timestamp, override_ts);
        msg.frame_id.clone_from(&self.frame_id);
        msg.angle_min = -PI;
        msg.angle_max = PI;
        msg.angle_increment = 2.0 * PI / width as f32;
        msg.scan_time = 1.0 / rate;
        msg.time_increment = 1.0 / rate / width as f32;
        msg.range_min = RANGE_MIN;
        msg.range_max = RANGE_MAX;

        let range = scan.range().row(self.ring);
        let signal = scan.signal().row(self.ring);

        msg.ranges.clear();
        msg.ranges
            .extend(range.iter().rev().map(|&r| r as f32 / 1000.0));
        msg.intensities.clear();
        msg.intensities
            .extend(signal.iter().rev().map(|&s| s as f32));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizontal_ring() {
        assert_eq!(horizontal_ring(&[15.0, 5.0, -0.5, -10.0]), 2);
        assert_eq!(horizontal_ring(&[1.0, -1.0]), 0);
        assert_eq!(horizontal_ring(&[]), 0);
    }

    #[test]
    fn test_reversed_columns() {
        let builder = LaserScanBuilder::with_ring(1, 10, "laser").unwrap();
        let mut scan = LidarScan::new(4, 3);
        for v in 0..4 {
            scan.range_mut()[[1, v]] = 1_000 * (v as u32 + 1);
            scan.signal_mut()[[1, v]] = v as u16;
        }
        scan.range_mut()[[0, 0]] = 99_000;

        let mut msg = LaserScan::default();
        builder.build(&scan, 500, 0, &mut msg).unwrap();

        assert_eq!(msg.ranges, vec![4.0, 3.0, 2.0, 1.0]);
        assert_eq!(msg.intensities, vec![3.0, 2.0, 1.0, 0.0]);
        assert_eq!(msg.timestamp, 500);
        assert_eq!(msg.frame_id, "laser");
        assert_eq!(msg.angle_min, -PI);
        assert_eq!(msg.angle_max, PI);
        assert!((msg.angle_increment - PI / 2.0).abs() < 1e-6);
        assert!((msg.scan_time - 0.1).abs() < 1e-6);
        assert!((msg.time_increment - 0.025).abs() < 1e-6);

        builder.build(&scan, 500, 42, &mut msg).unwrap();
        assert_eq!(msg.timestamp, 42);
        assert_eq!(msg.ranges.len(), 4);
    }

    #[test]
    fn test_ring_out_of_range() {
        let builder = LaserScanBuilder::with_ring(5, 10, "laser").unwrap();
        let mut msg = LaserScan::default();
        assert!(matches!(
            builder.build(&LidarScan::new(4, 3), 0, 0, &mut msg),
            Err(Error::Config(_))
        ));
        assert!(LaserScanBuilder::with_ring(0, 0, "laser").is_err());
    }
}
