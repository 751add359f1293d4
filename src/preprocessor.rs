// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Packet preprocessors and the manager that fans packets out to them.
//!
//! A preprocessor turns a stream of raw packets into a sequence of ready
//! data items (a complete [`LidarScan`], an
//! [`ImuSample`](crate::imu::ImuSample)).  It is gated by
//! two flags:
//!
//! - `activated` is set by the first call to
//!   [`DataPreprocessor::is_data_ready`] and never cleared.  Until then every
//!   packet is dropped, so a consumer that attaches mid-revolution never sees
//!   a half-written buffer.
//! - `data_ready` is set when a packet completes an item and cleared as soon
//!   as the next packet starts a new cycle.
//!
//! Data is only readable while `data_ready` holds; the buffer it points to is
//! overwritten by the next call to [`DataPreprocessor::preprocess`].

use crate::{
    imu::ImuPreprocessor,
    lidar::Error,
    ouster::{PacketFormat, Parameters},
    scan::{LidarScan, ScanBatcher},
};
use tracing::trace;

/// Common interface of all packet preprocessors.
pub trait DataPreprocessor {
    type Data;

    /// Report whether a complete item is ready.  The first call activates the
    /// preprocessor.
    fn is_data_ready(&mut self) -> bool;

    fn is_activated(&self) -> bool;

    /// Ingest one packet.
    ///
    /// `override_ts` is accepted for symmetry with the outbound artifacts but
    /// never replaces the timestamp derived from packet contents.
    fn preprocess(&mut self, packet: &[u8], override_ts: u64) -> bool;

    /// The ready item, or [`Error::NotReady`].
    fn data(&self) -> Result<&Self::Data, Error>;

    /// Timestamp of the ready item in nanoseconds, or [`Error::NotReady`].
    fn timestamp(&self) -> Result<u64, Error>;
}

/// Reassembles lidar packets into complete scans.
#[derive(Debug)]
pub struct LidarScanPreprocessor {
    activated: bool,
    data_ready: bool,
    timestamp: u64,
    batcher: ScanBatcher,
    scan: LidarScan,
}

impl LidarScanPreprocessor {
    pub fn new(params: &Parameters) -> Result<Self, Error> {
        params.validate()?;
        let format = PacketFormat::from_data_format(&params.lidar_data_format)?;
        Ok(Self::with_format(format))
    }

    /// Build a preprocessor directly from a packet layout.
    pub fn with_format(format: PacketFormat) -> Self {
        let scan = LidarScan::new(format.columns_per_frame, format.pixels_per_column);
        Self {
            activated: false,
            data_ready: false,
            timestamp: 0,
            batcher: ScanBatcher::new(format),
            scan,
        }
    }

    pub fn format(&self) -> &PacketFormat {
        self.batcher.format()
    }

    fn activate_if_needed(&mut self) {
        if !self.activated {
            trace!("lidar scan preprocessor activated");
            self.activated = true;
        }
    }
}

impl DataPreprocessor for LidarScanPreprocessor {
    type Data = LidarScan;

    fn is_data_ready(&mut self) -> bool {
        self.activate_if_needed();
        self.data_ready
    }

    fn is_activated(&self) -> bool {
        self.activated
    }

    /// Always returns `true`; malformed packets are dropped by the batcher.
    fn preprocess(&mut self, packet: &[u8], _override_ts: u64) -> bool {
        if !self.activated {
            trace!(len = packet.len(), "not activated, dropping packet");
            return true;
        }

        self.data_ready = false;

        if self.batcher.ingest(packet, &mut self.scan) {
            // keep the previous timestamp for a revolution without any
            // timestamped column
            if let Some(ts) = self.scan.first_valid_timestamp() {
                self.timestamp = ts;
            }
            self.data_ready = true;
        }

        true
    }

    fn data(&self) -> Result<&LidarScan, Error> {
        if !self.data_ready {
            return Err(Error::NotReady);
        }
        Ok(&self.scan)
    }

    fn timestamp(&self) -> Result<u64, Error> {
        if !self.data_ready {
            return Err(Error::NotReady);
        }
        Ok(self.timestamp)
    }
}

/// The closed set of preprocessors a manager can hold.
#[derive(Debug)]
pub enum Preprocessor {
    LidarScan(LidarScanPreprocessor),
    Imu(ImuPreprocessor),
}

impl Preprocessor {
    fn name(&self) -> &'static str {
        match self {
            Preprocessor::LidarScan(_) => "lidar_scan",
            Preprocessor::Imu(_) => "imu",
        }
    }

    pub fn is_data_ready(&mut self) -> bool {
        match self {
            Preprocessor::LidarScan(p) => p.is_data_ready(),
            Preprocessor::Imu(p) => p.is_data_ready(),
        }
    }

    pub fn preprocess(&mut self, packet: &[u8], override_ts: u64) -> bool {
        match self {
            Preprocessor::LidarScan(p) => p.preprocess(packet, override_ts),
            Preprocessor::Imu(p) => p.preprocess(packet, override_ts),
        }
    }
}

impl From<LidarScanPreprocessor> for Preprocessor {
    fn from(p: LidarScanPreprocessor) -> Self {
        Preprocessor::LidarScan(p)
    }
}

impl From<ImuPreprocessor> for Preprocessor {
    fn from(p: ImuPreprocessor) -> Self {
        Preprocessor::Imu(p)
    }
}

/// Owns the preprocessors and broadcasts every packet to each of them.
#[derive(Debug, Default)]
pub struct PreprocessorManager {
    preprocessors: Vec<Preprocessor>,
}

impl PreprocessorManager {
    /// Manager with the lidar scan and IMU preprocessors for a sensor.
    pub fn new(params: &Parameters) -> Result<Self, Error> {
        Ok(Self::with_preprocessors(vec![
            LidarScanPreprocessor::new(params)?.into(),
            ImuPreprocessor::new().into(),
        ]))
    }

    pub fn with_preprocessors(preprocessors: Vec<Preprocessor>) -> Self {
        Self { preprocessors }
    }

    pub fn register(&mut self, preprocessor: impl Into<Preprocessor>) {
        self.preprocessors.push(preprocessor.into());
    }

    pub fn len(&self) -> usize {
        self.preprocessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.preprocessors.is_empty()
    }

    /// Dispatch a packet to every preprocessor in registration order.
    ///
    /// A preprocessor rejecting the packet does not stop the others from
    /// seeing it.
    pub fn preprocess(&mut self, packet: &[u8], override_ts: u64) {
        for preprocessor in self.preprocessors.iter_mut() {
            if !preprocessor.preprocess(packet, override_ts) {
                trace!(
                    preprocessor = preprocessor.name(),
                    len = packet.len(),
                    "packet not accepted"
                );
            }
        }
    }

    pub fn lidar_scan_preprocessor(&self) -> Option<&LidarScanPreprocessor> {
        self.preprocessors.iter().find_map(|p| match p {
            Preprocessor::LidarScan(p) => Some(p),
            _ => None,
        })
    }

    pub fn lidar_scan_preprocessor_mut(&mut self) -> Option<&mut LidarScanPreprocessor> {
        self.preprocessors.iter_mut().find_map(|p| match p {
            Preprocessor::LidarScan(p) => Some(p),
            _ => None,
        })
    }

    pub fn imu_preprocessor(&self) -> Option<&ImuPreprocessor> {
        self.preprocessors.iter().find_map(|p| match p {
            Preprocessor::Imu(p) => Some(p),
            _ => None,
        })
    }

    pub fn imu_preprocessor_mut(&mut self) -> Option<&mut ImuPreprocessor> {
        self.preprocessors.iter_mut().find_map(|p| match p {
            Preprocessor::Imu(p) => Some(p),
            _ => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Preprocessor> {
        self.preprocessors.iter_mut()
    }
}
