// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! IMU packet preprocessing.
//!
//! The sensor streams 48-byte IMU packets alongside the lidar packets.  Each
//! one is a complete sample, so unlike the scan preprocessor there is no
//! batching: every accepted packet makes a new sample ready.

use crate::{
    lidar::Error,
    ouster::{ImuPacketSlice, IMU_PACKET_SIZE, STANDARD_G},
    preprocessor::DataPreprocessor,
};
use tracing::trace;

/// One IMU measurement in SI units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImuSample {
    /// Gyroscope read time in nanoseconds.
    pub timestamp: u64,
    /// Linear acceleration in m/s².
    pub linear_acceleration: [f64; 3],
    /// Angular velocity in rad/s.
    pub angular_velocity: [f64; 3],
}

impl ImuSample {
    fn from_packet(imu: &ImuPacketSlice) -> Self {
        let accel = imu.accel();
        let gyro = imu.gyro();

        Self {
            timestamp: imu.gyro_ts(),
            linear_acceleration: accel.map(|a| a as f64 * STANDARD_G),
            angular_velocity: gyro.map(|g| (g as f64).to_radians()),
        }
    }
}

#[derive(Debug, Default)]
pub struct ImuPreprocessor {
    activated: bool,
    data_ready: bool,
    sample: ImuSample,
}

impl ImuPreprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn activate_if_needed(&mut self) {
        self.activated = true;
    }
}

impl DataPreprocessor for ImuPreprocessor {
    type Data = ImuSample;

    fn is_data_ready(&mut self) -> bool {
        self.activate_if_needed();
        self.data_ready
    }

    fn is_activated(&self) -> bool {
        self.activated
    }

    /// Returns `false` for packets that are not IMU packets.
    fn preprocess(&mut self, packet: &[u8], _override_ts: u64) -> bool {
        if !self.activated {
            trace!("imu preprocessor not activated, dropping packet");
            return true;
        }

        self.data_ready = false;

        if packet.len() != IMU_PACKET_SIZE {
            return false;
        }

        match ImuPacketSlice::from_slice(packet) {
            Ok(imu) => {
                self.sample = ImuSample::from_packet(&imu);
                self.data_ready = true;
                true
            }
            Err(err) => {
                trace!("rejecting imu packet: {}", err);
                false
            }
        }
    }

    fn data(&self) -> Result<&ImuSample, Error> {
        if !self.data_ready {
            return Err(Error::NotReady);
        }
        Ok(&self.sample)
    }

    fn timestamp(&self) -> Result<u64, Error> {
        if !self.data_ready {
            return Err(Error::NotReady);
        }
        Ok(self.sample.timestamp)
    }
}
