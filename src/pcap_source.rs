// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! PCAP file packet source for offline replay.
//!
//! [`PcapSource`] loads the UDP payloads of a recording made next to a
//! running sensor.  Lidar and IMU packets arrive on different ports, so a
//! source is usually filtered to both ports and the [`PacketInfo::port`] of
//! each packet is kept.
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_lidarscan::{packet_source::PacketSource, PcapSource};
//!
//! let mut source = PcapSource::from_file("os1.pcap", &[7502, 7503])?;
//!
//! let mut buf = [0u8; 16 * 1024];
//! while source.has_more() {
//!     let info = source.recv(&mut buf).await?;
//!     driver.handle_packet(&buf[..info.len], 0);
//! }
//! ```

use crate::{
    lidar::Error,
    packet_source::{exhausted, PacketInfo, PacketSource},
};
use pcap_parser::traits::PcapReaderIterator;
use std::{future::Future, path::Path, pin::Pin};
use tracing::debug;

/// Extracted UDP packet with metadata.
#[derive(Clone)]
struct ExtractedPacket {
    payload: Vec<u8>,
    port: u16,
    /// Capture time in nanoseconds
    timestamp: u64,
}

/// PCAP file packet source for offline replay.
///
/// Loads the entire file into memory.  Supports both legacy PCAP and PCAPNG
/// formats.
pub struct PcapSource {
    packets: Vec<ExtractedPacket>,
    index: usize,
}

impl PcapSource {
    /// Load PCAP file from disk.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to PCAP or PCAPNG file
    /// * `ports` - Ports to keep, matching source or destination.  Empty
    ///   keeps every UDP packet.
    pub fn from_file<P: AsRef<Path>>(path: P, ports: &[u16]) -> Result<Self, Error> {
        let data = std::fs::read(path.as_ref()).map_err(Error::Io)?;
        Self::from_bytes(&data, ports)
    }

    /// Load PCAP from bytes, see [`PcapSource::from_file`].
    pub fn from_bytes(data: &[u8], ports: &[u16]) -> Result<Self, Error> {
        let packets = Self::extract_packets(data, ports)?;
        Ok(Self { packets, index: 0 })
    }

    /// Extract UDP packets from PCAP data.
    fn extract_packets(data: &[u8], ports: &[u16]) -> Result<Vec<ExtractedPacket>, Error> {
        let mut packets = Vec::new();

        // Try PCAPNG first, then legacy PCAP
        if data.len() >= 4 && data[0..4] == [0x0a, 0x0d, 0x0d, 0x0a] {
            // PCAPNG format (Section Header Block magic)
            Self::extract_pcapng(data, ports, &mut packets)?;
        } else {
            // Try legacy PCAP format
            Self::extract_legacy_pcap(data, ports, &mut packets)?;
        }

        Ok(packets)
    }

    /// Extract packets from legacy PCAP format.
    fn extract_legacy_pcap(
        data: &[u8],
        ports: &[u16],
        packets: &mut Vec<ExtractedPacket>,
    ) -> Result<(), Error> {
        use pcap_parser::*;

        // Buffer size must be at least as large as the data to avoid Incomplete errors
        let mut reader = LegacyPcapReader::new(data.len(), data)
            .map_err(|e| Error::InvalidPacket(format!("Failed to create PCAP reader: {:?}", e)))?;

        // ts_usec holds nanoseconds in nanosecond precision captures
        let mut subsec_scale = 1_000;

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    match block {
                        PcapBlockOwned::Legacy(packet) => {
                            let ts = packet.ts_sec as u64 * 1_000_000_000
                                + packet.ts_usec as u64 * subsec_scale;
                            if let Some(extracted) =
                                Self::extract_udp_payload(packet.data, ports, ts)
                            {
                                packets.push(extracted);
                            }
                        }
                        PcapBlockOwned::LegacyHeader(header) => {
                            if header.is_nanosecond_precision() {
                                subsec_scale = 1;
                            }
                        }
                        _ => {}
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => {
                    // Need more data but we loaded everything, so just break
                    break;
                }
                Err(e) => {
                    return Err(Error::InvalidPacket(format!("PCAP parse error: {:?}", e)));
                }
            }
        }

        Ok(())
    }

    /// Extract packets from PCAPNG format.
    fn extract_pcapng(
        data: &[u8],
        ports: &[u16],
        packets: &mut Vec<ExtractedPacket>,
    ) -> Result<(), Error> {
        use pcap_parser::*;

        // Buffer size must be at least as large as the data to avoid Incomplete errors
        let mut reader = PcapNGReader::new(data.len(), data).map_err(|e| {
            Error::InvalidPacket(format!("Failed to create PCAPNG reader: {:?}", e))
        })?;

        // (units per second, offset in seconds) of each interface in the
        // current section, indexed by interface id
        let mut interfaces: Vec<(u64, i64)> = Vec::new();

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    match block {
                        PcapBlockOwned::NG(Block::SectionHeader(_)) => interfaces.clear(),
                        PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                            let resolution = idb.ts_resolution().unwrap_or_else(|| {
                                debug!(
                                    if_tsresol = idb.if_tsresol,
                                    "invalid timestamp resolution, assuming microseconds"
                                );
                                1_000_000
                            });
                            interfaces.push((resolution, idb.ts_offset()));
                        }
                        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                            let raw = (epb.ts_high as u64) << 32 | epb.ts_low as u64;
                            let ts = match interfaces.get(epb.if_id as usize) {
                                Some(&(resolution, ts_offset)) => {
                                    pcapng_nanos(raw, resolution, ts_offset)
                                }
                                None => pcapng_nanos(raw, 1_000_000, 0),
                            };
                            if let Some(extracted) =
                                Self::extract_udp_payload(epb.data, ports, ts)
                            {
                                packets.push(extracted);
                            }
                        }
                        PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                            if let Some(extracted) = Self::extract_udp_payload(spb.data, ports, 0)
                            {
                                packets.push(extracted);
                            }
                        }
                        _ => {
                            // Skip other block types (SHB, IDB, etc.)
                        }
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => {
                    // Need more data but we loaded everything
                    break;
                }
                Err(e) => {
                    return Err(Error::InvalidPacket(format!("PCAPNG parse error: {:?}", e)));
                }
            }
        }

        Ok(())
    }

    /// Extract UDP payload from raw packet data.
    ///
    /// Uses etherparse to handle Ethernet/IP/UDP headers.
    fn extract_udp_payload(data: &[u8], ports: &[u16], timestamp: u64) -> Option<ExtractedPacket> {
        use etherparse::SlicedPacket;

        let packet = SlicedPacket::from_ethernet(data).ok()?;

        // Check if this is a UDP packet and get the UDP slice
        let udp = match packet.transport {
            Some(etherparse::TransportSlice::Udp(udp)) => udp,
            _ => return None,
        };

        let src_port = udp.source_port();
        let dst_port = udp.destination_port();
        if !ports.is_empty() && !ports.contains(&src_port) && !ports.contains(&dst_port) {
            return None;
        }

        let payload = udp.payload().to_vec();
        if payload.is_empty() {
            return None;
        }

        // report the filtered port when only the source matched
        let port = if ports.is_empty() || ports.contains(&dst_port) {
            dst_port
        } else {
            src_port
        };

        Some(ExtractedPacket {
            payload,
            port,
            timestamp,
        })
    }

    /// Reset source to beginning for replay.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Get the total number of packets.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Check if the source contains no packets.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Get the current packet index.
    pub fn current_index(&self) -> usize {
        self.index
    }

    /// Get remaining packet count.
    pub fn remaining(&self) -> usize {
        self.packets.len().saturating_sub(self.index)
    }
}

/// Convert a pcapng timestamp in `resolution` units per second, relative to
/// `ts_offset` seconds, to nanoseconds.
fn pcapng_nanos(raw: u64, resolution: u64, ts_offset: i64) -> u64 {
    let secs = (raw / resolution) as i64 + ts_offset;
    let frac = (raw % resolution) as u128 * 1_000_000_000 / resolution as u128;
    (secs.max(0) as u64)
        .saturating_mul(1_000_000_000)
        .saturating_add(frac as u64)
}

impl PacketSource for PcapSource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<PacketInfo, Error>> + Send + 'a>> {
        Box::pin(async move {
            let packet = self
                .packets
                .get(self.index)
                .ok_or_else(|| exhausted("PCAP"))?;

            let len = packet.payload.len().min(buf.len());
            buf[..len].copy_from_slice(&packet.payload[..len]);
            self.index += 1;
            Ok(PacketInfo {
                len,
                port: packet.port,
                timestamp: packet.timestamp,
            })
        })
    }

    fn has_more(&self) -> bool {
        self.index < self.packets.len()
    }
}
