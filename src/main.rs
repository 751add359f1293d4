// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::{Args, TimestampMode};
use cdr::{CdrLe, Infinite};
use clap::Parser as _;
use edgefirst_lidarscan::{
    cloud::PointCloud,
    driver::Driver,
    formats,
    imu::ImuSample,
    laser_scan::LaserScan,
    lidar,
    ouster::Parameters,
    packet_source::PacketSource as _,
    processor::{ImuProcessor, PointcloudProcessor, ScanProcessor},
    PcapSource,
};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};
use tracing::{debug, error, info, trace};

const MAX_PACKET_SIZE: usize = 65536;

fn write_cloud(cloud: &PointCloud, output_dir: &Option<PathBuf>, index: usize) {
    let msg = formats::to_point_cloud2(cloud);
    let buf = match cdr::serialize::<_, _, CdrLe>(&msg, Infinite) {
        Ok(buf) => buf,
        Err(err) => {
            error!("failed to serialize pointcloud: {}", err);
            return;
        }
    };

    trace!(
        frame = index,
        points = cloud.len(),
        bytes = buf.len(),
        "pointcloud"
    );

    if let Some(dir) = output_dir {
        let path = dir.join(format!("cloud_{:06}.cdr", index));
        if let Err(err) = std::fs::write(&path, &buf) {
            error!("failed to write {}: {}", path.display(), err);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.rust_log)
        .init();

    let params = Parameters::from_file(&args.metadata)?;
    let mut source = PcapSource::from_file(&args.target, &[args.lidar_port, args.imu_port])?;
    info!(
        "loaded {} packets from {}",
        source.len(),
        args.target.display()
    );

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    let clouds = Arc::new(AtomicUsize::new(0));
    let scans = Arc::new(AtomicUsize::new(0));
    let imus = Arc::new(AtomicUsize::new(0));

    let mut driver = Driver::new(&params)?;

    let counter = clouds.clone();
    let output_dir = args.output_dir.clone();
    driver.add_processor(PointcloudProcessor::new(
        &params,
        args.frame_id.clone(),
        Box::new(move |cloud: &PointCloud| {
            let index = counter.fetch_add(1, Ordering::Relaxed);
            write_cloud(cloud, &output_dir, index);
        }),
    )?);

    if args.laser_scan {
        let counter = scans.clone();
        let processor = ScanProcessor::new(
            &params,
            args.frame_id.clone(),
            Box::new(move |scan: &LaserScan| {
                counter.fetch_add(1, Ordering::Relaxed);
                trace!(ranges = scan.ranges.len(), "laser scan");
            }),
        )?;
        debug!("laser scan from ring {}", processor.ring());
        driver.add_processor(processor);
    }

    let counter = imus.clone();
    driver.add_processor(ImuProcessor::new(Box::new(move |sample: &ImuSample| {
        counter.fetch_add(1, Ordering::Relaxed);
        trace!(timestamp = sample.timestamp, "imu");
    })));

    driver.activate();

    let start = Instant::now();
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    info!(timestamps = %args.timestamp_mode, "replaying");
    while source.has_more() {
        let info = source.recv(&mut buf).await?;
        let override_ts = match args.timestamp_mode {
            TimestampMode::Sensor => 0,
            TimestampMode::Host if info.timestamp != 0 => info.timestamp,
            TimestampMode::Host => lidar::timestamp()?,
        };
        driver.handle_packet(&buf[..info.len], override_ts);
    }

    info!(
        packets = driver.packets(),
        clouds = clouds.load(Ordering::Relaxed),
        scans = scans.load(Ordering::Relaxed),
        imu = imus.load(Ordering::Relaxed),
        elapsed = ?start.elapsed(),
        "replay complete"
    );

    Ok(())
}
