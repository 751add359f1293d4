// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Packet source abstraction feeding the scan pipeline.
//!
//! The pipeline itself never touches sockets.  A [`PacketSource`] hands it
//! raw sensor packets one at a time together with the UDP port they arrived
//! on and, when known, their capture time:
//!
//! - **Testing**: [`TestSource`] replays packets built in memory
//! - **Pcap replay**: `PcapSource` reads recordings (with the `pcap` feature)
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_lidarscan::packet_source::{PacketSource, TestSource};
//!
//! let mut source = TestSource::new(packets);
//! let mut buf = [0u8; 16 * 1024];
//! while source.has_more() {
//!     let info = source.recv(&mut buf).await?;
//!     driver.handle_packet(&buf[..info.len], 0);
//! }
//! ```

use crate::lidar::Error;
use std::{future::Future, pin::Pin};

/// Metadata of a received packet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketInfo {
    /// Number of bytes written to the receive buffer.
    pub len: usize,
    /// Destination UDP port, zero when unknown.
    pub port: u16,
    /// Capture time in nanoseconds, zero when unknown.
    pub timestamp: u64,
}

/// Trait for packet sources.
pub trait PacketSource: Send {
    /// Receive the next packet into the provided buffer.
    ///
    /// Packets larger than `buf` are truncated.  Returns an
    /// [`Error::Io`] with `UnexpectedEof` once a finite source is exhausted.
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<PacketInfo, Error>> + Send + 'a>>;

    /// Check if more packets are available.
    fn has_more(&self) -> bool;
}

pub(crate) fn exhausted(what: &str) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("no more packets in {}", what),
    ))
}

/// Test packet source replaying packets held in memory.
pub struct TestSource {
    packets: Vec<(u16, Vec<u8>)>,
    index: usize,
}

impl TestSource {
    /// Create a new test source with the given packets, all on port zero.
    pub fn new(packets: Vec<Vec<u8>>) -> Self {
        Self::with_ports(packets.into_iter().map(|p| (0, p)).collect())
    }

    /// Create a test source of `(port, packet)` pairs.
    pub fn with_ports(packets: Vec<(u16, Vec<u8>)>) -> Self {
        Self { packets, index: 0 }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Reset the source to the beginning.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.index
    }
}

impl PacketSource for TestSource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<PacketInfo, Error>> + Send + 'a>> {
        Box::pin(async move {
            let (port, packet) = self
                .packets
                .get(self.index)
                .ok_or_else(|| exhausted("test source"))?;

            let len = packet.len().min(buf.len());
            buf[..len].copy_from_slice(&packet[..len]);
            self.index += 1;
            Ok(PacketInfo {
                len,
                port: *port,
                timestamp: 0,
            })
        })
    }

    fn has_more(&self) -> bool {
        self.index < self.packets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_test_source() {
        let packets = vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8, 9, 10], vec![11, 12]];
        let mut source = TestSource::new(packets);

        assert!(source.has_more());
        assert_eq!(source.len(), 3);

        let mut buf = [0u8; 100];

        let info = source.recv(&mut buf).await.unwrap();
        assert_eq!(info.len, 4);
        assert_eq!(&buf[..info.len], &[1, 2, 3, 4]);

        let info = source.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..info.len], &[5, 6, 7, 8, 9, 10]);

        assert!(source.has_more());
        let info = source.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..info.len], &[11, 12]);

        assert!(!source.has_more());
        assert!(matches!(source.recv(&mut buf).await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_ports() {
        let mut source = TestSource::with_ports(vec![(7502, vec![1]), (7503, vec![2])]);
        let mut buf = [0u8; 8];

        assert_eq!(source.recv(&mut buf).await.unwrap().port, 7502);
        assert_eq!(source.recv(&mut buf).await.unwrap().port, 7503);
    }

    #[tokio::test]
    async fn test_test_source_reset() {
        let mut source = TestSource::new(vec![vec![1, 2], vec![3, 4]]);
        let mut buf = [0u8; 100];

        source.recv(&mut buf).await.unwrap();
        source.recv(&mut buf).await.unwrap();
        assert!(!source.has_more());

        source.reset();
        assert!(source.has_more());
        assert_eq!(source.current_index(), 0);

        let info = source.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..info.len], &[1, 2]);
    }

    #[tokio::test]
    async fn test_empty_test_source() {
        let mut source = TestSource::empty();
        assert!(!source.has_more());
        assert!(source.is_empty());

        let mut buf = [0u8; 100];
        assert!(source.recv(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_buffer_truncation() {
        let mut source = TestSource::new(vec![vec![1, 2, 3, 4, 5, 6, 7, 8]]);

        let mut buf = [0u8; 4];
        let info = source.recv(&mut buf).await.unwrap();
        assert_eq!(info.len, 4);
        assert_eq!(&buf[..info.len], &[1, 2, 3, 4]);
    }
}
