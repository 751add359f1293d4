// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Processors turn ready preprocessor output into published artifacts.
//!
//! Each processor is polled once per packet.  An active processor asks its
//! preprocessor whether data is ready, which also activates that
//! preprocessor on the first poll.  When data is ready it builds its
//! artifact and hands it to a publish callback.  Processors start inactive so a pipeline
//! does no work until the host activates it.

use crate::{
    cloud::{CloudBuilder, PointCloud},
    imu::ImuSample,
    laser_scan::{LaserScan, LaserScanBuilder},
    lidar::{stamp, Error},
    ouster::{PacketFormat, Parameters},
    preprocessor::{DataPreprocessor, PreprocessorManager},
    xyz_lut::XyzLut,
};
use tracing::debug;

/// Callback receiving each artifact a processor produces.
pub type Publisher<T> = Box<dyn FnMut(&T) + Send>;

/// Common interface of all processors.
pub trait DataProcessor: Send {
    fn name(&self) -> &'static str;

    /// Publish an artifact if the preprocessor has one ready.
    ///
    /// Returns `Ok(true)` when an artifact was published.
    fn process(
        &mut self,
        manager: &mut PreprocessorManager,
        override_ts: u64,
    ) -> Result<bool, Error>;

    fn on_activate(&mut self);

    fn on_deactivate(&mut self);

    fn is_active(&self) -> bool;
}

fn missing(kind: &str) -> Error {
    Error::Config(format!("no {} preprocessor registered", kind))
}

/// Publishes a [`PointCloud`] for every complete scan.
pub struct PointcloudProcessor {
    active: bool,
    builder: CloudBuilder,
    cloud: PointCloud,
    publisher: Publisher<PointCloud>,
}

impl PointcloudProcessor {
    pub fn new(
        params: &Parameters,
        frame_id: impl Into<String>,
        publisher: Publisher<PointCloud>,
    ) -> Result<Self, Error> {
        let format = PacketFormat::from_data_format(&params.lidar_data_format)?;
        let builder = CloudBuilder::new(XyzLut::new(params)?, frame_id);
        Self::with_builder(builder, &format, publisher)
    }

    /// Build from an existing cloud builder, which must match the scans
    /// produced for `format`.
    pub fn with_builder(
        builder: CloudBuilder,
        format: &PacketFormat,
        publisher: Publisher<PointCloud>,
    ) -> Result<Self, Error> {
        let lut = builder.lut();
        if lut.width() != format.columns_per_frame || lut.height() != format.pixels_per_column {
            return Err(Error::Config(format!(
                "lookup table is {}x{} but scans are {}x{}",
                lut.width(),
                lut.height(),
                format.columns_per_frame,
                format.pixels_per_column
            )));
        }

        let cloud = builder.new_cloud();
        Ok(Self {
            active: false,
            builder,
            cloud,
            publisher,
        })
    }

    /// The most recently built cloud.
    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }
}

impl DataProcessor for PointcloudProcessor {
    fn name(&self) -> &'static str {
        "pointcloud"
    }

    fn process(
        &mut self,
        manager: &mut PreprocessorManager,
        override_ts: u64,
    ) -> Result<bool, Error> {
        if !self.active {
            return Ok(false);
        }

        let pre = manager
            .lidar_scan_preprocessor_mut()
            .ok_or_else(|| missing("lidar scan"))?;
        if !pre.is_data_ready() {
            return Ok(false);
        }

        let timestamp = pre.timestamp()?;
        self.builder
            .build(pre.data()?, timestamp, override_ts, &mut self.cloud)?;
        (self.publisher)(&self.cloud);
        Ok(true)
    }

    fn on_activate(&mut self) {
        debug!("pointcloud processor activated");
        self.active = true;
    }

    fn on_deactivate(&mut self) {
        debug!("pointcloud processor deactivated");
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Publishes a [`LaserScan`] from the most horizontal ring of each scan.
pub struct ScanProcessor {
    active: bool,
    builder: LaserScanBuilder,
    msg: LaserScan,
    publisher: Publisher<LaserScan>,
}

impl ScanProcessor {
    pub fn new(
        params: &Parameters,
        frame_id: impl Into<String>,
        publisher: Publisher<LaserScan>,
    ) -> Result<Self, Error> {
        Ok(Self::with_builder(
            LaserScanBuilder::new(params, frame_id)?,
            publisher,
        ))
    }

    pub fn with_builder(builder: LaserScanBuilder, publisher: Publisher<LaserScan>) -> Self {
        Self {
            active: false,
            builder,
            msg: LaserScan::default(),
            publisher,
        }
    }

    pub fn ring(&self) -> usize {
        self.builder.ring()
    }
}

impl DataProcessor for ScanProcessor {
    fn name(&self) -> &'static str {
        "scan"
    }

    fn process(
        &mut self,
        manager: &mut PreprocessorManager,
        override_ts: u64,
    ) -> Result<bool, Error> {
        if !self.active {
            return Ok(false);
        }

        let pre = manager
            .lidar_scan_preprocessor_mut()
            .ok_or_else(|| missing("lidar scan"))?;
        if !pre.is_data_ready() {
            return Ok(false);
        }

        let timestamp = pre.timestamp()?;
        self.builder
            .build(pre.data()?, timestamp, override_ts, &mut self.msg)?;
        (self.publisher)(&self.msg);
        Ok(true)
    }

    fn on_activate(&mut self) {
        self.active = true;
    }

    fn on_deactivate(&mut self) {
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Publishes every IMU sample.
pub struct ImuProcessor {
    active: bool,
    publisher: Publisher<ImuSample>,
}

impl ImuProcessor {
    pub fn new(publisher: Publisher<ImuSample>) -> Self {
        Self {
            active: false,
            publisher,
        }
    }
}

impl DataProcessor for ImuProcessor {
    fn name(&self) -> &'static str {
        "imu"
    }

    fn process(
        &mut self,
        manager: &mut PreprocessorManager,
        override_ts: u64,
    ) -> Result<bool, Error> {
        if !self.active {
            return Ok(false);
        }

        let pre = manager
            .imu_preprocessor_mut()
            .ok_or_else(|| missing("imu"))?;
        if !pre.is_data_ready() {
            return Ok(false);
        }

        let mut sample = *pre.data()?;
        sample.timestamp = stamp(sample.timestamp, override_ts);
        (self.publisher)(&sample);
        Ok(true)
    }

    fn on_activate(&mut self) {
        self.active = true;
    }

    fn on_deactivate(&mut self) {
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}
