// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Point cloud formatting for PointCloud2 messages.
//!
//! Converts a [`PointCloud`] into the packed little-endian binary layout of a
//! ROS PointCloud2 message.  The cloud is organized: `height` is the number
//! of rings and `width` the number of columns, so every scan pixel maps to
//! exactly one point, including pixels without a return.
//!
//! # Format
//!
//! ## 29-byte point
//! ```text
//! ┌───────┬───────┬───────┬───────────┬───────┬──────────────┬──────┬─────────┬────────────┐
//! │ x:f32 │ y:f32 │ z:f32 │ intensity │ t:u32 │ reflectivity │ ring │ ambient │ range:u32  │
//! │ 4B    │ 4B    │ 4B    │ f32 4B    │ 4B    │ u16 2B       │ u8 1B│ u16 2B  │ 4B         │
//! └───────┴───────┴───────┴───────────┴───────┴──────────────┴──────┴─────────┴────────────┘
//! ```
//!
//! `intensity` carries the signal photon count, `ambient` the near-infrared
//! photon count, `t` the column time relative to the frame and `range` the
//! raw range in millimeters.

use crate::cloud::PointCloud;
use edgefirst_schemas::{
    builtin_interfaces::Time,
    sensor_msgs::{PointCloud2, PointField},
    std_msgs::Header,
};

/// Size of one packed point in bytes.
pub const POINT_STEP: usize = 29;

/// Point field data types for PointCloud2 messages.
///
/// These values correspond to the ROS sensor_msgs/PointField datatype field.
/// All variants are defined for completeness, even if not all are currently
/// used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(dead_code)]
pub enum PointFieldType {
    INT8 = 1,
    UINT8 = 2,
    INT16 = 3,
    UINT16 = 4,
    INT32 = 5,
    UINT32 = 6,
    FLOAT32 = 7,
    FLOAT64 = 8,
}

fn field(name: &str, offset: u32, datatype: PointFieldType) -> PointField {
    PointField {
        name: String::from(name),
        offset,
        datatype: datatype as u8,
        count: 1,
    }
}

/// Build the point fields of the 29-byte layout.
pub fn point_fields() -> Vec<PointField> {
    vec![
        field("x", 0, PointFieldType::FLOAT32),
        field("y", 4, PointFieldType::FLOAT32),
        field("z", 8, PointFieldType::FLOAT32),
        field("intensity", 12, PointFieldType::FLOAT32),
        field("t", 16, PointFieldType::UINT32),
        field("reflectivity", 20, PointFieldType::UINT16),
        field("ring", 22, PointFieldType::UINT8),
        field("ambient", 23, PointFieldType::UINT16),
        field("range", 25, PointFieldType::UINT32),
    ]
}

/// Format a cloud into packed 29-byte points.
#[inline(never)]
pub fn format_points(cloud: &PointCloud) -> Vec<u8> {
    let mut data = vec![0u8; POINT_STEP * cloud.len()];
    format_points_into(cloud, &mut data);
    data
}

/// Format a cloud into a pre-allocated buffer.
///
/// # Panics
///
/// Panics if `out` is smaller than `POINT_STEP * cloud.len()` bytes.
#[inline(never)]
pub fn format_points_into(cloud: &PointCloud, out: &mut [u8]) {
    let n_points = cloud.len();
    assert!(out.len() >= POINT_STEP * n_points);

    let (x, y, z) = (cloud.x(), cloud.y(), cloud.z());
    let (signal, t, reflectivity) = (cloud.signal(), cloud.t(), cloud.reflectivity());
    let (ring, nir, range) = (cloud.ring(), cloud.nir(), cloud.range());

    for (index, p) in out[..POINT_STEP * n_points]
        .chunks_exact_mut(POINT_STEP)
        .enumerate()
    {
        p[0..4].copy_from_slice(&x[index].to_le_bytes());
        p[4..8].copy_from_slice(&y[index].to_le_bytes());
        p[8..12].copy_from_slice(&z[index].to_le_bytes());
        p[12..16].copy_from_slice(&(signal[index] as f32).to_le_bytes());
        p[16..20].copy_from_slice(&t[index].to_le_bytes());
        p[20..22].copy_from_slice(&reflectivity[index].to_le_bytes());
        p[22] = ring[index];
        p[23..25].copy_from_slice(&nir[index].to_le_bytes());
        p[25..29].copy_from_slice(&range[index].to_le_bytes());
    }
}

/// Convert a nanosecond timestamp to a message time.
///
/// The message carries seconds as an `i32`, so timestamps past
/// `i32::MAX` seconds (2038 for epoch time) saturate.
pub fn time_from_nanos(ns: u64) -> Time {
    let sec = ns / 1_000_000_000;
    if sec > i32::MAX as u64 {
        return Time {
            sec: i32::MAX,
            nanosec: 999_999_999,
        };
    }

    Time {
        sec: sec as i32,
        nanosec: (ns % 1_000_000_000) as u32,
    }
}

/// Build an organized PointCloud2 message from a cloud.
pub fn to_point_cloud2(cloud: &PointCloud) -> PointCloud2 {
    let width = cloud.width() as u32;

    PointCloud2 {
        header: Header {
            stamp: time_from_nanos(cloud.timestamp()),
            frame_id: cloud.frame_id().to_string(),
        },
        height: cloud.height() as u32,
        width,
        fields: point_fields(),
        is_bigendian: false,
        point_step: POINT_STEP as u32,
        row_step: POINT_STEP as u32 * width,
        data: format_points(cloud),
        is_dense: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cloud::CloudBuilder, scan::LidarScan, xyz_lut::XyzLut};
    use ndarray::Array2;

    fn sample_cloud() -> PointCloud {
        let (w, h) = (3, 2);
        let mut direction = Array2::zeros((w * h, 3));
        for i in 0..w * h {
            direction[[i, 0]] = 0.001;
            direction[[i, 2]] = -0.001;
        }
        let lut = XyzLut::from_parts(w, h, direction, Array2::zeros((w * h, 3))).unwrap();
        let builder = CloudBuilder::new(lut, "lidar");

        let mut scan = LidarScan::new(w, h);
        for (i, r) in scan.range_mut().iter_mut().enumerate() {
            *r = 1_000 * (i as u32 + 1);
        }
        for (i, s) in scan.signal_mut().iter_mut().enumerate() {
            *s = 10 + i as u16;
        }
        for (v, hdr) in scan.headers_mut().iter_mut().enumerate() {
            hdr.timestamp = 5_000_000_000 + v as u64 * 100;
        }

        let mut cloud = builder.new_cloud();
        builder
            .build(&scan, 5_000_000_000, 0, &mut cloud)
            .unwrap();
        cloud
    }

    #[test]
    fn test_point_fields() {
        let fields = point_fields();
        assert_eq!(fields.len(), 9);
        assert_eq!(fields[0].name, "x");
        assert_eq!(fields[3].name, "intensity");
        assert_eq!(fields[3].datatype, PointFieldType::FLOAT32 as u8);
        assert_eq!(fields[6].name, "ring");
        assert_eq!(fields[6].offset, 22);
        assert_eq!(fields[7].name, "ambient");
        assert_eq!(fields[7].offset, 23);
        assert_eq!(fields[8].offset as usize + 4, POINT_STEP);
    }

    #[test]
    fn test_format_points() {
        let cloud = sample_cloud();
        let data = format_points(&cloud);
        assert_eq!(data.len(), POINT_STEP * 6);

        // pixel 1, column 2
        let p = &data[5 * POINT_STEP..6 * POINT_STEP];
        let x = f32::from_le_bytes([p[0], p[1], p[2], p[3]]);
        let z = f32::from_le_bytes([p[8], p[9], p[10], p[11]]);
        let intensity = f32::from_le_bytes([p[12], p[13], p[14], p[15]]);
        let t = u32::from_le_bytes([p[16], p[17], p[18], p[19]]);
        let range = u32::from_le_bytes([p[25], p[26], p[27], p[28]]);

        assert_eq!(x, 6.0);
        assert_eq!(z, -6.0);
        assert_eq!(intensity, 15.0);
        assert_eq!(t, 200);
        assert_eq!(p[22], 1);
        assert_eq!(range, 6_000);
    }

    #[test]
    fn test_format_into_preallocated() {
        let cloud = sample_cloud();
        let mut buffer = vec![0xffu8; POINT_STEP * cloud.len() + 7];
        format_points_into(&cloud, &mut buffer);

        assert_eq!(&buffer[..POINT_STEP * cloud.len()], &format_points(&cloud)[..]);
        assert!(buffer[POINT_STEP * cloud.len()..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn test_to_point_cloud2() {
        let cloud = sample_cloud();
        let msg = to_point_cloud2(&cloud);

        assert_eq!(msg.height, 2);
        assert_eq!(msg.width, 3);
        assert_eq!(msg.row_step, 3 * POINT_STEP as u32);
        assert_eq!(msg.data.len(), 6 * POINT_STEP);
        assert!(msg.is_dense);
        assert!(!msg.is_bigendian);
        assert_eq!(msg.header.frame_id, "lidar");
        assert_eq!(msg.header.stamp.sec, 5);
        assert_eq!(msg.header.stamp.nanosec, 0);
    }

    #[test]
    fn test_time_from_nanos() {
        let t = time_from_nanos(1_500_000_123);
        assert_eq!(t.sec, 1);
        assert_eq!(t.nanosec, 500_000_123);

        let t = time_from_nanos(i32::MAX as u64 * 1_000_000_000 + 7);
        assert_eq!(t.sec, i32::MAX);
        assert_eq!(t.nanosec, 7);

        // 2040-01-01 in epoch nanoseconds
        let t = time_from_nanos(2_208_988_800 * 1_000_000_000);
        assert_eq!(t.sec, i32::MAX);
        assert_eq!(t.nanosec, 999_999_999);
    }
}
