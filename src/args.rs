// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{Parser, ValueEnum};
use std::{fmt, path::PathBuf};
use tracing::level_filters::LevelFilter;

/// Source of the timestamps stamped on published artifacts.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TimestampMode {
    /// Column timestamps reported by the sensor.
    Sensor,
    /// Host receive time: the capture time of a recorded packet, or the
    /// monotonic clock when the capture has none.
    Host,
}

impl fmt::Display for TimestampMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampMode::Sensor => write!(f, "sensor"),
            TimestampMode::Host => write!(f, "host"),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Pcap or pcapng recording of the sensor's UDP traffic.
    #[arg(env)]
    pub target: PathBuf,

    /// Sensor metadata JSON saved alongside the recording.
    #[arg(long, env)]
    pub metadata: PathBuf,

    /// UDP port of lidar packets.
    #[arg(long, env, default_value = "7502")]
    pub lidar_port: u16,

    /// UDP port of IMU packets.
    #[arg(long, env, default_value = "7503")]
    pub imu_port: u16,

    /// The name of the lidar frame
    #[arg(long, env, default_value = "lidar")]
    pub frame_id: String,

    /// Timestamp source of published point clouds, laser scans and IMU
    /// samples.
    #[arg(long, env, value_enum, default_value = "sensor")]
    pub timestamp_mode: TimestampMode,

    /// Also build a planar laser scan from the most horizontal ring.
    #[arg(long, env, default_value = "false")]
    pub laser_scan: bool,

    /// Write each CDR encoded PointCloud2 message into this directory.
    #[arg(long, env)]
    pub output_dir: Option<PathBuf>,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,
}
