// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Packet-driven pipeline tying preprocessors and processors together.
//!
//! ```text
//! packet ──► PreprocessorManager ──► LidarScanPreprocessor ─┐
//!                     │          └─► ImuPreprocessor ───────┤
//!                     ▼                                     │
//!               processors (pointcloud, scan, imu) ◄────────┘
//!                     │
//!                     ▼
//!               publish callbacks
//! ```
//!
//! Every packet is handled to completion before `handle_packet` returns, so
//! a scan buffer is never overwritten while a processor is reading it.

use crate::{
    lidar::Error, ouster::Parameters, preprocessor::PreprocessorManager,
    processor::DataProcessor,
};
use tracing::{debug, info, warn};

pub struct Driver {
    manager: PreprocessorManager,
    processors: Vec<Box<dyn DataProcessor>>,
    active: bool,
    packets: u64,
    published: u64,
}

impl Driver {
    /// Driver with the standard preprocessors for a sensor and no
    /// processors.
    pub fn new(params: &Parameters) -> Result<Self, Error> {
        info!(
            prod_line = %params.sensor_info.prod_line,
            prod_sn = %params.sensor_info.prod_sn,
            profile = %params.lidar_data_format.udp_profile_lidar,
            columns = params.lidar_data_format.columns_per_frame,
            pixels = params.lidar_data_format.pixels_per_column,
            "creating driver"
        );
        Ok(Self::with_manager(PreprocessorManager::new(params)?))
    }

    pub fn with_manager(manager: PreprocessorManager) -> Self {
        Self {
            manager,
            processors: Vec::new(),
            active: false,
            packets: 0,
            published: 0,
        }
    }

    /// Add a processor.  Processors added to an active driver are activated
    /// immediately.
    pub fn add_processor(&mut self, processor: impl DataProcessor + 'static) {
        let mut processor = Box::new(processor);
        if self.active {
            processor.on_activate();
        }
        debug!(processor = processor.name(), "processor added");
        self.processors.push(processor);
    }

    pub fn activate(&mut self) {
        info!("activating {} processors", self.processors.len());
        self.active = true;
        for processor in self.processors.iter_mut() {
            processor.on_activate();
        }
    }

    pub fn deactivate(&mut self) {
        info!("deactivating {} processors", self.processors.len());
        self.active = false;
        for processor in self.processors.iter_mut() {
            processor.on_deactivate();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn manager(&self) -> &PreprocessorManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut PreprocessorManager {
        &mut self.manager
    }

    /// Number of packets handled so far.
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Number of artifacts published so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Handle one packet and run every processor.
    ///
    /// A non-zero `override_ts` replaces the packet-derived timestamp of
    /// published artifacts.  Processor errors are logged and do not stop the
    /// remaining processors.  Returns the number of artifacts published.
    pub fn handle_packet(&mut self, packet: &[u8], override_ts: u64) -> usize {
        self.packets += 1;
        self.manager.preprocess(packet, override_ts);

        let mut published = 0;
        for processor in self.processors.iter_mut() {
            match processor.process(&mut self.manager, override_ts) {
                Ok(true) => published += 1,
                Ok(false) => {}
                Err(err) => warn!(processor = processor.name(), "processing failed: {}", err),
            }
        }

        self.published += published as u64;
        published
    }
}
