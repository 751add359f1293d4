// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst LiDAR Scan Library
//!
//! Turns the packet stream of an Ouster lidar into complete scans, point
//! clouds, laser scans and IMU samples.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────────┐     ┌──────────────────┐
//! │  PacketSource   │ ──► │  PreprocessorManager │ ──► │  DataProcessor   │
//! │  (pcap/test)    │     │  scan batching, IMU  │     │  cloud/scan/imu  │
//! └─────────────────┘     └──────────────────────┘     └──────────────────┘
//!                                                               │
//!                                                               ▼
//!                                         ┌─────────────────────────────────┐
//!                                         │  formats::to_point_cloud2       │
//!                                         └─────────────────────────────────┘
//! ```
//!
//! Scans are assembled in a buffer owned by the lidar scan preprocessor and
//! overwritten in place for every revolution.  A processor only reads that
//! buffer between a successful readiness check and the next packet:
//!
//! 1. The driver hands a packet to the manager, which fans it out to every
//!    preprocessor
//! 2. The scan preprocessor batches it and flags a complete revolution
//! 3. Each active processor polls readiness and builds its artifact
//! 4. The artifact is passed to the processor's publish callback
//!
//! # Modules
//!
//! - [`lidar`]: Error handling and clock helpers
//! - [`ouster`]: Sensor metadata and packet layout
//! - [`scan`]: Scan buffer and packet batching
//! - [`preprocessor`]: Activation and readiness gating, packet fan-out
//! - [`imu`]: IMU packet preprocessing
//! - [`xyz_lut`]: Per-pixel geometry lookup table
//! - [`cloud`]: Point cloud construction
//! - [`formats`]: PointCloud2 packing
//! - [`laser_scan`]: Planar laser scans
//! - [`processor`]: Artifact builders and publish callbacks
//! - [`driver`]: Packet-driven pipeline
//! - [`packet_source`]: Packet source abstraction for testing and replay
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_lidarscan::{
//!     driver::Driver, ouster::Parameters, processor::PointcloudProcessor,
//! };
//!
//! let params = Parameters::from_file("os1.json")?;
//! let mut driver = Driver::new(&params)?;
//! driver.add_processor(PointcloudProcessor::new(
//!     &params,
//!     "lidar",
//!     Box::new(|cloud| println!("{} points", cloud.len())),
//! )?);
//! driver.activate();
//!
//! loop {
//!     let info = source.recv(&mut buf).await?;
//!     driver.handle_packet(&buf[..info.len], 0);
//! }
//! ```

pub mod cloud;
pub mod driver;
pub mod formats;
pub mod imu;
pub mod laser_scan;
pub mod lidar;
pub mod ouster;
pub mod packet_source;
#[cfg(feature = "pcap")]
pub mod pcap_source;
pub mod preprocessor;
pub mod processor;
pub mod scan;
pub mod xyz_lut;

// Re-exports for convenience
pub use cloud::{CloudBuilder, PointCloud};
pub use driver::Driver;
pub use formats::PointFieldType;
pub use lidar::Error;
pub use ouster::{PacketFormat, Parameters};
pub use packet_source::PacketSource;
#[cfg(feature = "pcap")]
pub use pcap_source::PcapSource;
pub use preprocessor::{DataPreprocessor, PreprocessorManager};
pub use processor::DataProcessor;
pub use scan::{LidarScan, ScanBatcher};
pub use xyz_lut::XyzLut;
