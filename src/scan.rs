// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Scan buffer and packet batching.
//!
//! A [`LidarScan`] holds one revolution of the sensor as a set of
//! `pixels_per_column × columns_per_frame` grids.  The [`ScanBatcher`] writes
//! packets into it column by column and detects the end of a revolution when
//! the column index wraps back towards zero.  The protocol has no explicit
//! end-of-frame marker, so the wraparound is the only frame boundary.
//!
//! ```text
//!  columns:  0 1 2 ... w-1 │ 0 1 2 ...
//!            ───────────── │ ─────────
//!            revolution N  │ wraparound packet completes N, is cached and
//!                          │ becomes the first packet of N+1
//! ```

use crate::ouster::{ColumnSlice, PacketFormat};
use ndarray::{s, Array2};
use tracing::{debug, trace};

/// Header of one measurement column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColumnHeader {
    /// Capture time in nanoseconds, zero for columns not received.
    pub timestamp: u64,
    pub measurement_id: u16,
    pub status: u32,
}

/// One revolution of lidar data.
///
/// Grids are indexed `[[pixel, column]]`.  The buffer is allocated once and
/// overwritten in place for every revolution.
#[derive(Clone, Debug, PartialEq)]
pub struct LidarScan {
    width: usize,
    height: usize,
    range: Array2<u32>,
    reflectivity: Array2<u16>,
    signal: Array2<u16>,
    nir: Array2<u16>,
    headers: Vec<ColumnHeader>,
    frame_id: Option<u16>,
}

impl LidarScan {
    /// Allocate a zeroed scan of `width` columns by `height` pixels.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            range: Array2::zeros((height, width)),
            reflectivity: Array2::zeros((height, width)),
            signal: Array2::zeros((height, width)),
            nir: Array2::zeros((height, width)),
            headers: vec![ColumnHeader::default(); width],
            frame_id: None,
        }
    }

    /// Number of columns per revolution.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of pixels per column.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Range in millimeters, zero where the sensor had no return.
    #[inline]
    pub fn range(&self) -> &Array2<u32> {
        &self.range
    }

    #[inline]
    pub fn reflectivity(&self) -> &Array2<u16> {
        &self.reflectivity
    }

    #[inline]
    pub fn signal(&self) -> &Array2<u16> {
        &self.signal
    }

    #[inline]
    pub fn nir(&self) -> &Array2<u16> {
        &self.nir
    }

    #[inline]
    pub fn headers(&self) -> &[ColumnHeader] {
        &self.headers
    }

    #[inline]
    pub fn header(&self, column: usize) -> &ColumnHeader {
        &self.headers[column]
    }

    /// Mutable column headers, for callers assembling scans by hand.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut [ColumnHeader] {
        &mut self.headers
    }

    /// Mutable range grid, for callers assembling scans by hand.
    #[inline]
    pub fn range_mut(&mut self) -> &mut Array2<u32> {
        &mut self.range
    }

    #[inline]
    pub fn signal_mut(&mut self) -> &mut Array2<u16> {
        &mut self.signal
    }

    /// Frame id of the last packet batched into this scan.
    #[inline]
    pub fn frame_id(&self) -> Option<u16> {
        self.frame_id
    }

    /// Timestamp of the first column whose header timestamp is non-zero.
    pub fn first_valid_timestamp(&self) -> Option<u64> {
        self.headers
            .iter()
            .map(|h| h.timestamp)
            .find(|&ts| ts != 0)
    }

    /// Zero the whole scan.
    pub fn reset(&mut self) {
        self.zero_columns(0, self.width);
        self.frame_id = None;
    }

    /// Zero columns `start..end`, used for columns never received.
    pub fn zero_columns(&mut self, start: usize, end: usize) {
        let end = end.min(self.width);
        if start >= end {
            return;
        }

        self.range.slice_mut(s![.., start..end]).fill(0);
        self.reflectivity.slice_mut(s![.., start..end]).fill(0);
        self.signal.slice_mut(s![.., start..end]).fill(0);
        self.nir.slice_mut(s![.., start..end]).fill(0);
        self.headers[start..end].fill(ColumnHeader::default());
    }

    fn write_column(&mut self, col: &ColumnSlice, m_id: usize) {
        self.headers[m_id] = ColumnHeader {
            timestamp: col.timestamp(),
            measurement_id: col.measurement_id(),
            status: col.status(),
        };

        for px in 0..self.height {
            self.range[[px, m_id]] = col.range(px);
            self.reflectivity[[px, m_id]] = col.reflectivity(px);
            self.signal[[px, m_id]] = col.signal(px);
            self.nir[[px, m_id]] = col.nir(px);
        }
    }
}

/// Reassembles packets into complete revolutions.
#[derive(Debug)]
pub struct ScanBatcher {
    format: PacketFormat,
    /// Next expected column, every column below it has been written or
    /// zero-filled since the last completion.
    next_m_id: usize,
    /// The packet that completed the previous revolution, replayed as the
    /// start of the next one.
    cache: Vec<u8>,
    cache_ready: bool,
}

impl ScanBatcher {
    pub fn new(format: PacketFormat) -> Self {
        let cache = vec![0u8; format.lidar_packet_size()];
        Self {
            format,
            next_m_id: 0,
            cache,
            cache_ready: false,
        }
    }

    pub fn format(&self) -> &PacketFormat {
        &self.format
    }

    /// Batch one packet into `scan`.
    ///
    /// Returns `true` exactly on the packet that completes a revolution, in
    /// which case `scan` holds that revolution and the completing packet is
    /// held back until the next call.  Packets of the wrong size or type are
    /// dropped without touching `scan`, as is every packet when `scan` does
    /// not have the dimensions of the packet format.
    pub fn ingest(&mut self, packet: &[u8], scan: &mut LidarScan) -> bool {
        if scan.width() != self.format.columns_per_frame
            || scan.height() != self.format.pixels_per_column
        {
            debug!(
                width = scan.width(),
                height = scan.height(),
                columns = self.format.columns_per_frame,
                pixels = self.format.pixels_per_column,
                "scan does not match packet format"
            );
            return false;
        }

        let expected = self.format.lidar_packet_size();
        if packet.len() != expected {
            trace!(
                len = packet.len(),
                expected,
                "dropping packet with unexpected size"
            );
            return false;
        }

        if let Some(Err(err)) = self.format.packet_header(packet) {
            debug!("dropping malformed packet: {}", err);
            return false;
        }

        if self.cache_ready {
            self.cache_ready = false;
            self.next_m_id = 0;
            scan.reset();

            let cache = std::mem::take(&mut self.cache);
            let replay_complete = self.batch(&cache, scan);
            self.cache = cache;
            debug_assert!(!replay_complete);
        }

        self.batch(packet, scan)
    }

    fn batch(&mut self, packet: &[u8], scan: &mut LidarScan) -> bool {
        let width = self.format.columns_per_frame;
        let mut first = true;

        for icol in 0..self.format.columns_per_packet {
            let col = self.format.nth_col(icol, packet);
            let m_id = col.measurement_id() as usize;

            // drop invalid or out-of-bounds columns
            if !col.is_valid() || m_id >= width {
                continue;
            }

            if m_id < self.next_m_id {
                if first {
                    scan.zero_columns(self.next_m_id, width);
                    self.cache.copy_from_slice(packet);
                    self.cache_ready = true;
                    trace!(frame_id = ?scan.frame_id(), "revolution complete");
                    return true;
                }
                // column went backwards inside a packet
                continue;
            }

            if first {
                scan.frame_id = Some(self.format.frame_id(packet));
                first = false;
            }

            scan.zero_columns(self.next_m_id, m_id);
            scan.write_column(&col, m_id);
            self.next_m_id = m_id + 1;
        }

        false
    }
}
