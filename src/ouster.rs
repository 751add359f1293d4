// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Ouster sensor metadata and UDP packet layout.
//!
//! The sensor describes itself through a metadata JSON document (the
//! `/api/v1/sensor/metadata` endpoint, or the `.json` file saved next to a
//! recording). [`Parameters`] deserializes the parts of that document the
//! pipeline needs, and [`PacketFormat`] derives the byte layout of lidar
//! packets from it.
//!
//! # Lidar packet layout
//!
//! ```text
//! ┌───────────────┬──────────────────────────────────────┬───────────────┐
//! │ packet header │ column × columns_per_packet          │ packet footer │
//! │ (0 or 32 B)   │ ┌────────┬───────────────────┬─────┐ │ (0 or 32 B)   │
//! │               │ │ header │ pixel × pixels    │ ftr │ │               │
//! │               │ └────────┴───────────────────┴─────┘ │               │
//! └───────────────┴──────────────────────────────────────┴───────────────┘
//! ```
//!
//! All multi-byte fields are little-endian.

use crate::lidar::Error;
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};

/// Size of an IMU packet in bytes.  Identical across all lidar profiles.
pub const IMU_PACKET_SIZE: usize = 48;

/// Standard gravity used to convert IMU acceleration from g to m/s².
pub const STANDARD_G: f64 = 9.80665;

/// Mask of the valid bits of a LEGACY range sample.
const LEGACY_RANGE_MASK: u32 = 0x000f_ffff;

/// Mask of the valid bits of an RNG19 range sample.
const RNG19_RANGE_MASK: u32 = 0x0007_ffff;

/// Mask of the valid bits of an RNG15 range sample.
const RNG15_RANGE_MASK: u16 = 0x7fff;

/// RNG15 ranges are reported in units of 8mm.
const RNG15_RANGE_SCALE: u32 = 8;

/// LEGACY columns are valid only when every status bit is set.
const LEGACY_STATUS_VALID: u32 = 0xffff_ffff;

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct SensorInfo {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub build_rev: String,
    #[serde(default)]
    pub prod_sn: String,
    #[serde(default)]
    pub prod_pn: String,
    #[serde(default)]
    pub prod_line: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LidarDataFormat {
    pub udp_profile_lidar: String,
    #[serde(default = "default_udp_profile_imu")]
    pub udp_profile_imu: String,
    pub columns_per_packet: usize,
    pub columns_per_frame: usize,
    pub pixels_per_column: usize,
    #[serde(default)]
    pub column_window: [usize; 2],
    #[serde(default)]
    pub pixel_shift_by_row: Vec<i16>,
}

fn default_udp_profile_imu() -> String {
    "LEGACY".to_string()
}

impl Default for LidarDataFormat {
    fn default() -> Self {
        Self {
            udp_profile_lidar: "RNG19_RFL8_SIG16_NIR16".to_string(),
            udp_profile_imu: default_udp_profile_imu(),
            columns_per_packet: 16,
            columns_per_frame: 1024,
            pixels_per_column: 64,
            column_window: [0, 1023],
            pixel_shift_by_row: Vec::new(),
        }
    }
}

/// Per-beam calibration published by the sensor.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct BeamIntrinsics {
    /// Elevation of each beam in degrees, one per pixel row.
    pub beam_altitude_angles: Vec<f32>,
    /// Azimuth offset of each beam in degrees, one per pixel row.
    pub beam_azimuth_angles: Vec<f32>,
    /// Row-major 4x4 beam to lidar transform.  Element 3 holds the distance
    /// from the lidar origin to the beam origin in millimeters.
    #[serde(default)]
    pub beam_to_lidar_transform: Vec<f32>,
    /// Older firmware reports the beam origin offset as a separate field.
    #[serde(default)]
    pub lidar_origin_to_beam_origin_mm: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LidarIntrinsics {
    /// Row-major 4x4 lidar to sensor transform, translation in millimeters.
    pub lidar_to_sensor_transform: Vec<f32>,
}

impl Default for LidarIntrinsics {
    fn default() -> Self {
        Self {
            lidar_to_sensor_transform: identity_transform(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ConfigParams {
    #[serde(default = "default_lidar_mode")]
    pub lidar_mode: String,
    #[serde(default = "default_udp_port_lidar")]
    pub udp_port_lidar: u16,
    #[serde(default = "default_udp_port_imu")]
    pub udp_port_imu: u16,
    #[serde(default = "default_timestamp_mode")]
    pub timestamp_mode: String,
}

fn default_lidar_mode() -> String {
    "1024x10".to_string()
}

fn default_udp_port_lidar() -> u16 {
    7502
}

fn default_udp_port_imu() -> u16 {
    7503
}

fn default_timestamp_mode() -> String {
    "TIME_FROM_INTERNAL_OSC".to_string()
}

impl Default for ConfigParams {
    fn default() -> Self {
        Self {
            lidar_mode: default_lidar_mode(),
            udp_port_lidar: default_udp_port_lidar(),
            udp_port_imu: default_udp_port_imu(),
            timestamp_mode: default_timestamp_mode(),
        }
    }
}

/// Sensor metadata needed to build the pipeline.
///
/// Deserializes directly from the sensor metadata JSON.  Sections the
/// pipeline can live without (`lidar_intrinsics`, `config_params`) fall back
/// to sensible defaults when absent.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Parameters {
    #[serde(default)]
    pub sensor_info: SensorInfo,
    pub lidar_data_format: LidarDataFormat,
    pub beam_intrinsics: BeamIntrinsics,
    #[serde(default)]
    pub lidar_intrinsics: LidarIntrinsics,
    #[serde(default)]
    pub config_params: ConfigParams,
}

impl Parameters {
    /// Parse sensor metadata from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let params: Parameters = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Load sensor metadata from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Check the metadata is self-consistent.
    ///
    /// Any inconsistency here is a configuration error: the pipeline cannot
    /// be built and must not try to recover per frame.
    pub fn validate(&self) -> Result<(), Error> {
        let fmt = &self.lidar_data_format;
        if fmt.columns_per_frame == 0 || fmt.pixels_per_column == 0 {
            return Err(Error::Config(format!(
                "invalid scan dimensions {}x{}",
                fmt.columns_per_frame, fmt.pixels_per_column
            )));
        }

        if fmt.columns_per_packet == 0 {
            return Err(Error::Config("columns_per_packet must be non-zero".into()));
        }

        if fmt.columns_per_frame > u16::MAX as usize + 1 {
            return Err(Error::Config(format!(
                "too many columns per frame: {}",
                fmt.columns_per_frame
            )));
        }

        let beams = &self.beam_intrinsics;
        if beams.beam_altitude_angles.len() != fmt.pixels_per_column
            || beams.beam_azimuth_angles.len() != fmt.pixels_per_column
        {
            return Err(Error::Config(format!(
                "beam intrinsics describe {}/{} beams but the sensor has {} pixels per column",
                beams.beam_altitude_angles.len(),
                beams.beam_azimuth_angles.len(),
                fmt.pixels_per_column
            )));
        }

        if !beams.beam_to_lidar_transform.is_empty() && beams.beam_to_lidar_transform.len() != 16
        {
            return Err(Error::Config(
                "beam_to_lidar_transform must have 16 elements".into(),
            ));
        }

        if self.lidar_intrinsics.lidar_to_sensor_transform.len() != 16 {
            return Err(Error::Config(
                "lidar_to_sensor_transform must have 16 elements".into(),
            ));
        }

        UdpProfileLidar::from_str(&fmt.udp_profile_lidar)?;
        self.rotation_rate()?;

        Ok(())
    }

    /// Distance from the lidar origin to the beam origin in millimeters.
    pub fn beam_origin_mm(&self) -> f64 {
        let beams = &self.beam_intrinsics;
        match beams.beam_to_lidar_transform.get(3) {
            Some(&offset) => offset as f64,
            None => beams.lidar_origin_to_beam_origin_mm.unwrap_or(0.0) as f64,
        }
    }

    /// Rotation rate in Hz parsed from the `COLxHZ` lidar mode.
    pub fn rotation_rate(&self) -> Result<u32, Error> {
        let mode = &self.config_params.lidar_mode;
        mode.split_once('x')
            .and_then(|(_, hz)| hz.parse::<u32>().ok())
            .filter(|hz| *hz > 0)
            .ok_or_else(|| Error::Config(format!("invalid lidar mode: {}", mode)))
    }
}

/// Row-major 4x4 identity matrix.
pub fn identity_transform() -> Vec<f32> {
    vec![
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

/// UDP lidar packet profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UdpProfileLidar {
    /// Original firmware format: no packet header, per-column frame id.
    Legacy,
    /// Single return, 19-bit range with 8-bit reflectivity, 16-bit signal
    /// and near-infrared.
    Rng19Rfl8Sig16Nir16,
    /// Low data rate single return: 15-bit range in 8mm units, 8-bit
    /// reflectivity and near-infrared, no signal channel.
    Rng15Rfl8Nir8,
}

impl FromStr for UdpProfileLidar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LEGACY" => Ok(UdpProfileLidar::Legacy),
            "RNG19_RFL8_SIG16_NIR16" => Ok(UdpProfileLidar::Rng19Rfl8Sig16Nir16),
            "RNG15_RFL8_NIR8" => Ok(UdpProfileLidar::Rng15Rfl8Nir8),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for UdpProfileLidar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UdpProfileLidar::Legacy => write!(f, "LEGACY"),
            UdpProfileLidar::Rng19Rfl8Sig16Nir16 => write!(f, "RNG19_RFL8_SIG16_NIR16"),
            UdpProfileLidar::Rng15Rfl8Nir8 => write!(f, "RNG15_RFL8_NIR8"),
        }
    }
}

/// Byte layout of lidar packets for one sensor configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketFormat {
    pub profile: UdpProfileLidar,
    pub columns_per_packet: usize,
    pub pixels_per_column: usize,
    pub columns_per_frame: usize,
    pub packet_header_size: usize,
    pub col_header_size: usize,
    pub channel_data_size: usize,
    pub col_footer_size: usize,
    pub packet_footer_size: usize,
}

impl PacketFormat {
    pub fn new(
        profile: UdpProfileLidar,
        columns_per_packet: usize,
        pixels_per_column: usize,
        columns_per_frame: usize,
    ) -> Result<Self, Error> {
        if columns_per_packet == 0 || pixels_per_column == 0 || columns_per_frame == 0 {
            return Err(Error::Config(format!(
                "invalid packet format {} columns/packet, {} pixels/column, {} columns/frame",
                columns_per_packet, pixels_per_column, columns_per_frame
            )));
        }

        let (packet_header_size, col_header_size, channel_data_size, col_footer_size, packet_footer_size) =
            match profile {
                UdpProfileLidar::Legacy => (0, 16, 12, 4, 0),
                UdpProfileLidar::Rng19Rfl8Sig16Nir16 => (32, 12, 12, 0, 32),
                UdpProfileLidar::Rng15Rfl8Nir8 => (32, 12, 4, 0, 32),
            };

        Ok(Self {
            profile,
            columns_per_packet,
            pixels_per_column,
            columns_per_frame,
            packet_header_size,
            col_header_size,
            channel_data_size,
            col_footer_size,
            packet_footer_size,
        })
    }

    pub fn from_data_format(format: &LidarDataFormat) -> Result<Self, Error> {
        Self::new(
            UdpProfileLidar::from_str(&format.udp_profile_lidar)?,
            format.columns_per_packet,
            format.pixels_per_column,
            format.columns_per_frame,
        )
    }

    /// Size of one column including its header and footer.
    #[inline]
    pub fn col_size(&self) -> usize {
        self.col_header_size + self.pixels_per_column * self.channel_data_size + self.col_footer_size
    }

    /// Expected size of every lidar packet.
    #[inline]
    pub fn lidar_packet_size(&self) -> usize {
        self.packet_header_size + self.columns_per_packet * self.col_size() + self.packet_footer_size
    }

    #[inline]
    pub fn imu_packet_size(&self) -> usize {
        IMU_PACKET_SIZE
    }

    /// Packet header, present for every profile except LEGACY.
    pub fn packet_header<'a>(&self, packet: &'a [u8]) -> Option<Result<PacketHeaderSlice<'a>, Error>> {
        match self.profile {
            UdpProfileLidar::Legacy => None,
            _ => Some(PacketHeaderSlice::from_slice(packet)),
        }
    }

    /// Access the `n`th column of a packet.
    ///
    /// # Panics
    ///
    /// Panics if the packet is shorter than [`Self::lidar_packet_size`].
    pub fn nth_col<'a>(&'a self, n: usize, packet: &'a [u8]) -> ColumnSlice<'a> {
        let start = self.packet_header_size + n * self.col_size();
        ColumnSlice {
            format: self,
            slice: &packet[start..start + self.col_size()],
        }
    }

    /// Frame id of a packet of the correct size.
    pub fn frame_id(&self, packet: &[u8]) -> u16 {
        match self.profile {
            UdpProfileLidar::Legacy => u16::from_le_bytes([packet[10], packet[11]]),
            _ => u16::from_le_bytes([packet[2], packet[3]]),
        }
    }
}

/// Zero-copy view of the 32 byte packet header used by non-legacy profiles.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PacketHeaderSlice<'a> {
    slice: &'a [u8],
}

impl<'a> PacketHeaderSlice<'a> {
    /// Length of the header in bytes/octets.
    pub const LEN: usize = 32;

    pub fn from_slice(slice: &'a [u8]) -> Result<PacketHeaderSlice<'a>, Error> {
        if slice.len() < Self::LEN {
            return Err(Error::UnexpectedEnd(slice.len()));
        }

        let packet_type = u16::from_le_bytes([slice[0], slice[1]]);
        if packet_type != 1 {
            return Err(Error::UnknownPacketType(packet_type));
        }

        Ok(PacketHeaderSlice { slice })
    }

    pub fn packet_type(&self) -> u16 {
        u16::from_le_bytes([self.slice[0], self.slice[1]])
    }

    /// Index of the lidar scan, increments every time the sensor completes
    /// a rotation.
    pub fn frame_id(&self) -> u16 {
        u16::from_le_bytes([self.slice[2], self.slice[3]])
    }

    /// Updates on every reinit and every reboot of the sensor.
    pub fn init_id(&self) -> u32 {
        u32::from_le_bytes([self.slice[4], self.slice[5], self.slice[6], 0])
    }

    pub fn serial_number(&self) -> u64 {
        u64::from_le_bytes([
            self.slice[7],
            self.slice[8],
            self.slice[9],
            self.slice[10],
            self.slice[11],
            0,
            0,
            0,
        ])
    }
}

/// Zero-copy view of a single measurement column.
#[derive(Copy, Clone, Debug)]
pub struct ColumnSlice<'a> {
    format: &'a PacketFormat,
    slice: &'a [u8],
}

impl<'a> ColumnSlice<'a> {
    /// Capture time of the column in nanoseconds.
    pub fn timestamp(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.slice[0..8]);
        u64::from_le_bytes(bytes)
    }

    /// Column index within the frame.
    pub fn measurement_id(&self) -> u16 {
        u16::from_le_bytes([self.slice[8], self.slice[9]])
    }

    pub fn status(&self) -> u32 {
        match self.format.profile {
            UdpProfileLidar::Legacy => {
                let start = self.slice.len() - 4;
                u32::from_le_bytes([
                    self.slice[start],
                    self.slice[start + 1],
                    self.slice[start + 2],
                    self.slice[start + 3],
                ])
            }
            _ => u16::from_le_bytes([self.slice[10], self.slice[11]]) as u32,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self.format.profile {
            UdpProfileLidar::Legacy => self.status() == LEGACY_STATUS_VALID,
            _ => self.status() & 0x1 != 0,
        }
    }

    /// Encoder count, reported only by the LEGACY profile.
    pub fn encoder(&self) -> Option<u32> {
        match self.format.profile {
            UdpProfileLidar::Legacy => Some(u32::from_le_bytes([
                self.slice[12],
                self.slice[13],
                self.slice[14],
                self.slice[15],
            ])),
            _ => None,
        }
    }

    #[inline]
    fn pixel(&self, px: usize) -> &'a [u8] {
        let start = self.format.col_header_size + px * self.format.channel_data_size;
        &self.slice[start..start + self.format.channel_data_size]
    }

    /// Range in millimeters.
    pub fn range(&self, px: usize) -> u32 {
        let p = self.pixel(px);
        match self.format.profile {
            UdpProfileLidar::Legacy => {
                u32::from_le_bytes([p[0], p[1], p[2], p[3]]) & LEGACY_RANGE_MASK
            }
            UdpProfileLidar::Rng19Rfl8Sig16Nir16 => {
                u32::from_le_bytes([p[0], p[1], p[2], p[3]]) & RNG19_RANGE_MASK
            }
            UdpProfileLidar::Rng15Rfl8Nir8 => {
                (u16::from_le_bytes([p[0], p[1]]) & RNG15_RANGE_MASK) as u32 * RNG15_RANGE_SCALE
            }
        }
    }

    pub fn reflectivity(&self, px: usize) -> u16 {
        let p = self.pixel(px);
        match self.format.profile {
            UdpProfileLidar::Legacy => u16::from_le_bytes([p[4], p[5]]),
            UdpProfileLidar::Rng19Rfl8Sig16Nir16 => p[4] as u16,
            UdpProfileLidar::Rng15Rfl8Nir8 => p[2] as u16,
        }
    }

    pub fn signal(&self, px: usize) -> u16 {
        let p = self.pixel(px);
        match self.format.profile {
            UdpProfileLidar::Legacy | UdpProfileLidar::Rng19Rfl8Sig16Nir16 => {
                u16::from_le_bytes([p[6], p[7]])
            }
            UdpProfileLidar::Rng15Rfl8Nir8 => 0,
        }
    }

    pub fn nir(&self, px: usize) -> u16 {
        let p = self.pixel(px);
        match self.format.profile {
            UdpProfileLidar::Legacy | UdpProfileLidar::Rng19Rfl8Sig16Nir16 => {
                u16::from_le_bytes([p[8], p[9]])
            }
            UdpProfileLidar::Rng15Rfl8Nir8 => p[3] as u16,
        }
    }
}

/// Zero-copy view of an IMU packet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ImuPacketSlice<'a> {
    slice: &'a [u8],
}

impl<'a> ImuPacketSlice<'a> {
    pub fn from_slice(slice: &'a [u8]) -> Result<ImuPacketSlice<'a>, Error> {
        if slice.len() != IMU_PACKET_SIZE {
            return Err(Error::InvalidPacket(format!(
                "IMU packet size {} bytes, expected {}",
                slice.len(),
                IMU_PACKET_SIZE
            )));
        }
        Ok(ImuPacketSlice { slice })
    }

    fn u64_at(&self, offset: usize) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.slice[offset..offset + 8]);
        u64::from_le_bytes(bytes)
    }

    fn f32_at(&self, offset: usize) -> f32 {
        f32::from_le_bytes([
            self.slice[offset],
            self.slice[offset + 1],
            self.slice[offset + 2],
            self.slice[offset + 3],
        ])
    }

    pub fn sys_ts(&self) -> u64 {
        self.u64_at(0)
    }

    pub fn accel_ts(&self) -> u64 {
        self.u64_at(8)
    }

    pub fn gyro_ts(&self) -> u64 {
        self.u64_at(16)
    }

    /// Linear acceleration in g.
    pub fn accel(&self) -> [f32; 3] {
        [self.f32_at(24), self.f32_at(28), self.f32_at(32)]
    }

    /// Angular velocity in degrees per second.
    pub fn gyro(&self) -> [f32; 3] {
        [self.f32_at(36), self.f32_at(40), self.f32_at(44)]
    }
}

/// Values written for one pixel by [`PacketWriter`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pixel {
    /// Range in millimeters.
    pub range: u32,
    pub reflectivity: u16,
    pub signal: u16,
    pub nir: u16,
}

/// Encoder for synthetic lidar and IMU packets.
///
/// Produces byte-exact packets for a [`PacketFormat`], which lets tests,
/// benchmarks and simulators drive the pipeline without a sensor.
#[derive(Clone, Debug)]
pub struct PacketWriter {
    format: PacketFormat,
}

impl PacketWriter {
    pub fn new(format: PacketFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> &PacketFormat {
        &self.format
    }

    /// Encode one lidar packet holding columns `first_col..first_col +
    /// columns_per_packet`, all flagged valid.
    ///
    /// `column_ts` yields the timestamp of each column and `pixel` the
    /// samples of each `(column, pixel)` cell.
    pub fn lidar_packet<T, P>(
        &self,
        frame_id: u16,
        first_col: u16,
        mut column_ts: T,
        mut pixel: P,
    ) -> Vec<u8>
    where
        T: FnMut(u16) -> u64,
        P: FnMut(u16, usize) -> Pixel,
    {
        let fmt = &self.format;
        let mut packet = vec![0u8; fmt.lidar_packet_size()];

        if fmt.packet_header_size > 0 {
            packet[0..2].copy_from_slice(&1u16.to_le_bytes());
            packet[2..4].copy_from_slice(&frame_id.to_le_bytes());
        }

        for n in 0..fmt.columns_per_packet {
            let col = first_col.wrapping_add(n as u16);
            let start = fmt.packet_header_size + n * fmt.col_size();
            let buf = &mut packet[start..start + fmt.col_size()];

            buf[0..8].copy_from_slice(&column_ts(col).to_le_bytes());
            buf[8..10].copy_from_slice(&col.to_le_bytes());
            match fmt.profile {
                UdpProfileLidar::Legacy => {
                    buf[10..12].copy_from_slice(&frame_id.to_le_bytes());
                    let footer = buf.len() - 4;
                    buf[footer..].copy_from_slice(&LEGACY_STATUS_VALID.to_le_bytes());
                }
                _ => buf[10..12].copy_from_slice(&1u16.to_le_bytes()),
            }

            for px in 0..fmt.pixels_per_column {
                let value = pixel(col, px);
                let offset = fmt.col_header_size + px * fmt.channel_data_size;
                let p = &mut buf[offset..offset + fmt.channel_data_size];
                match fmt.profile {
                    UdpProfileLidar::Legacy => {
                        p[0..4].copy_from_slice(&(value.range & LEGACY_RANGE_MASK).to_le_bytes());
                        p[4..6].copy_from_slice(&value.reflectivity.to_le_bytes());
                        p[6..8].copy_from_slice(&value.signal.to_le_bytes());
                        p[8..10].copy_from_slice(&value.nir.to_le_bytes());
                    }
                    UdpProfileLidar::Rng19Rfl8Sig16Nir16 => {
                        p[0..4].copy_from_slice(&(value.range & RNG19_RANGE_MASK).to_le_bytes());
                        p[4] = value.reflectivity.min(u8::MAX as u16) as u8;
                        p[6..8].copy_from_slice(&value.signal.to_le_bytes());
                        p[8..10].copy_from_slice(&value.nir.to_le_bytes());
                    }
                    UdpProfileLidar::Rng15Rfl8Nir8 => {
                        let range = (value.range / RNG15_RANGE_SCALE) as u16 & RNG15_RANGE_MASK;
                        p[0..2].copy_from_slice(&range.to_le_bytes());
                        p[2] = value.reflectivity.min(u8::MAX as u16) as u8;
                        p[3] = value.nir.min(u8::MAX as u16) as u8;
                    }
                }
            }
        }

        packet
    }

    /// Encode an IMU packet.  Acceleration in g, angular velocity in deg/s.
    pub fn imu_packet(&self, gyro_ts: u64, accel: [f32; 3], gyro: [f32; 3]) -> Vec<u8> {
        let mut packet = vec![0u8; IMU_PACKET_SIZE];
        packet[0..8].copy_from_slice(&gyro_ts.to_le_bytes());
        packet[8..16].copy_from_slice(&gyro_ts.to_le_bytes());
        packet[16..24].copy_from_slice(&gyro_ts.to_le_bytes());
        for (i, v) in accel.iter().chain(gyro.iter()).enumerate() {
            let offset = 24 + i * 4;
            packet[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
        }
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"{
        "sensor_info": {
            "status": "RUNNING",
            "prod_line": "OS-1-64",
            "prod_sn": "992109000123"
        },
        "lidar_data_format": {
            "udp_profile_lidar": "RNG19_RFL8_SIG16_NIR16",
            "udp_profile_imu": "LEGACY",
            "columns_per_packet": 16,
            "columns_per_frame": 512,
            "pixels_per_column": 4,
            "column_window": [0, 511],
            "pixel_shift_by_row": [12, 4, -4, -12]
        },
        "beam_intrinsics": {
            "beam_altitude_angles": [16.6, 5.5, -5.5, -16.6],
            "beam_azimuth_angles": [3.1, 1.0, -1.0, -3.1],
            "beam_to_lidar_transform": [1, 0, 0, 15.806, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1]
        },
        "config_params": {
            "lidar_mode": "512x20",
            "udp_port_lidar": 7502
        }
    }"#;

    #[test]
    fn test_parameters_from_json() {
        let params = Parameters::from_json(METADATA).unwrap();
        assert_eq!(params.sensor_info.prod_line, "OS-1-64");
        assert_eq!(params.lidar_data_format.columns_per_frame, 512);
        assert_eq!(params.lidar_data_format.pixels_per_column, 4);
        assert_eq!(params.rotation_rate().unwrap(), 20);
        assert!((params.beam_origin_mm() - 15.806).abs() < 1e-4);
        assert_eq!(params.lidar_intrinsics, LidarIntrinsics::default());
        assert_eq!(params.config_params.udp_port_imu, 7503);
    }

    #[test]
    fn test_parameters_beam_mismatch() {
        let mut params = Parameters::from_json(METADATA).unwrap();
        params.beam_intrinsics.beam_altitude_angles.pop();
        assert!(matches!(params.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_parameters_bad_mode() {
        let mut params = Parameters::from_json(METADATA).unwrap();
        params.config_params.lidar_mode = "fast".to_string();
        assert!(matches!(params.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_parameters_unsupported_profile() {
        let json = METADATA.replace("RNG19_RFL8_SIG16_NIR16", "FUSA_RNG15_RFL8_NIR8_DUAL");
        assert!(matches!(
            Parameters::from_json(&json),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_packet_sizes() {
        let legacy = PacketFormat::new(UdpProfileLidar::Legacy, 16, 64, 1024).unwrap();
        assert_eq!(legacy.col_size(), 16 + 64 * 12 + 4);
        assert_eq!(legacy.lidar_packet_size(), 12608);

        let rng19 = PacketFormat::new(UdpProfileLidar::Rng19Rfl8Sig16Nir16, 16, 64, 1024).unwrap();
        assert_eq!(rng19.lidar_packet_size(), 32 + 16 * (12 + 64 * 12) + 32);

        let rng15 = PacketFormat::new(UdpProfileLidar::Rng15Rfl8Nir8, 16, 128, 2048).unwrap();
        assert_eq!(rng15.lidar_packet_size(), 32 + 16 * (12 + 128 * 4) + 32);
        assert_eq!(rng15.imu_packet_size(), 48);
    }

    #[test]
    fn test_packet_format_zero_dimension() {
        assert!(PacketFormat::new(UdpProfileLidar::Legacy, 0, 64, 1024).is_err());
    }

    #[test]
    fn test_column_decode_all_profiles() {
        for profile in [
            UdpProfileLidar::Legacy,
            UdpProfileLidar::Rng19Rfl8Sig16Nir16,
            UdpProfileLidar::Rng15Rfl8Nir8,
        ] {
            let fmt = PacketFormat::new(profile, 4, 8, 64).unwrap();
            let writer = PacketWriter::new(fmt.clone());
            let packet = writer.lidar_packet(
                7,
                32,
                |col| 1_000 + col as u64,
                |col, px| Pixel {
                    range: 1_000 + col as u32 * 8 + px as u32 * 16,
                    reflectivity: 10 + px as u16,
                    signal: 100 + px as u16,
                    nir: 20 + px as u16,
                },
            );
            assert_eq!(packet.len(), fmt.lidar_packet_size());
            assert_eq!(fmt.frame_id(&packet), 7);

            let col = fmt.nth_col(2, &packet);
            assert!(col.is_valid(), "{}", profile);
            assert_eq!(col.measurement_id(), 34);
            assert_eq!(col.timestamp(), 1_034);
            assert_eq!(col.range(3), 1_000 + 34 * 8 + 3 * 16);
            assert_eq!(col.reflectivity(3), 13);
            assert_eq!(col.nir(3), 23);
            match profile {
                UdpProfileLidar::Rng15Rfl8Nir8 => assert_eq!(col.signal(3), 0),
                _ => assert_eq!(col.signal(3), 103),
            }
        }
    }

    #[test]
    fn test_packet_header() {
        let fmt = PacketFormat::new(UdpProfileLidar::Rng19Rfl8Sig16Nir16, 2, 2, 8).unwrap();
        let mut packet = PacketWriter::new(fmt.clone()).lidar_packet(513, 0, |_| 0, |_, _| Pixel::default());
        packet[4..7].copy_from_slice(&[0x01, 0x02, 0x03]);
        packet[7..12].copy_from_slice(&[0x10, 0x20, 0x30, 0x40, 0x50]);

        let header = fmt.packet_header(&packet).unwrap().unwrap();
        assert_eq!(header.packet_type(), 1);
        assert_eq!(header.frame_id(), 513);
        assert_eq!(header.init_id(), 0x030201);
        assert_eq!(header.serial_number(), 0x50_4030_2010);

        packet[0] = 2;
        assert!(matches!(
            fmt.packet_header(&packet),
            Some(Err(Error::UnknownPacketType(2)))
        ));

        let legacy = PacketFormat::new(UdpProfileLidar::Legacy, 2, 2, 8).unwrap();
        assert!(legacy.packet_header(&packet).is_none());
    }

    #[test]
    fn test_legacy_invalid_status() {
        let fmt = PacketFormat::new(UdpProfileLidar::Legacy, 1, 2, 8).unwrap();
        let mut packet = PacketWriter::new(fmt.clone()).lidar_packet(0, 3, |_| 5, |_, _| Pixel::default());
        let last = packet.len() - 1;
        packet[last] = 0;
        let col = fmt.nth_col(0, &packet);
        assert!(!col.is_valid());
        assert_eq!(col.encoder(), Some(0));
    }

    #[test]
    fn test_imu_packet() {
        let fmt = PacketFormat::new(UdpProfileLidar::Legacy, 16, 64, 1024).unwrap();
        let packet = PacketWriter::new(fmt).imu_packet(99, [0.0, 0.0, 1.0], [90.0, 0.0, -45.0]);
        let imu = ImuPacketSlice::from_slice(&packet).unwrap();
        assert_eq!(imu.gyro_ts(), 99);
        assert_eq!(imu.accel(), [0.0, 0.0, 1.0]);
        assert_eq!(imu.gyro(), [90.0, 0.0, -45.0]);

        assert!(ImuPacketSlice::from_slice(&packet[..40]).is_err());
    }
}
