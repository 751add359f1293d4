// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! End-to-end tests driving the pipeline with synthetic sensor packets.

use cdr::{CdrLe, Infinite};
use edgefirst_lidarscan::{
    cloud::PointCloud,
    driver::Driver,
    formats,
    imu::ImuSample,
    laser_scan::LaserScan,
    ouster::{PacketFormat, PacketWriter, Parameters, Pixel, STANDARD_G},
    packet_source::{PacketSource, TestSource},
    processor::{ImuProcessor, PointcloudProcessor, ScanProcessor},
};
use edgefirst_schemas::sensor_msgs::PointCloud2;
use std::sync::{Arc, Mutex};

const COLS: u16 = 16;
const PER_PACKET: u16 = 4;

const METADATA: &str = r#"{
    "sensor_info": {
        "prod_line": "OS-1-64",
        "prod_sn": "122201000123",
        "status": "RUNNING"
    },
    "lidar_data_format": {
        "udp_profile_lidar": "RNG19_RFL8_SIG16_NIR16",
        "columns_per_packet": 4,
        "columns_per_frame": 16,
        "pixels_per_column": 4,
        "column_window": [0, 15]
    },
    "beam_intrinsics": {
        "beam_altitude_angles": [15.0, 5.0, 0.0, -15.0],
        "beam_azimuth_angles": [0.0, 0.0, 0.0, 0.0],
        "beam_to_lidar_transform": [
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0
        ]
    },
    "config_params": {
        "lidar_mode": "16x10"
    }
}"#;

fn params() -> Parameters {
    Parameters::from_json(METADATA).unwrap()
}

fn writer(params: &Parameters) -> PacketWriter {
    PacketWriter::new(PacketFormat::from_data_format(&params.lidar_data_format).unwrap())
}

/// Packets of one revolution, every pixel one meter away.
fn revolution(writer: &PacketWriter, frame_id: u16) -> Vec<Vec<u8>> {
    (0..COLS)
        .step_by(PER_PACKET as usize)
        .map(|c| {
            writer.lidar_packet(
                frame_id,
                c,
                |col| 1_000 * (frame_id as u64 + 1) + col as u64,
                |col, px| Pixel {
                    range: 1000,
                    reflectivity: px as u16,
                    signal: 100 + col,
                    nir: 7,
                },
            )
        })
        .collect()
}

#[derive(Default)]
struct Published {
    clouds: Vec<PointCloud>,
    scans: Vec<LaserScan>,
    imu: Vec<ImuSample>,
}

fn driver(params: &Parameters, published: &Arc<Mutex<Published>>) -> Driver {
    let mut driver = Driver::new(params).unwrap();

    let sink = published.clone();
    driver.add_processor(
        PointcloudProcessor::new(
            params,
            "lidar",
            Box::new(move |cloud: &PointCloud| sink.lock().unwrap().clouds.push(cloud.clone())),
        )
        .unwrap(),
    );

    let sink = published.clone();
    driver.add_processor(
        ScanProcessor::new(
            params,
            "laser",
            Box::new(move |scan: &LaserScan| sink.lock().unwrap().scans.push(scan.clone())),
        )
        .unwrap(),
    );

    let sink = published.clone();
    driver.add_processor(ImuProcessor::new(Box::new(move |sample: &ImuSample| {
        sink.lock().unwrap().imu.push(*sample)
    })));

    driver
}

async fn replay(driver: &mut Driver, source: &mut TestSource, override_ts: u64) {
    let mut buf = [0u8; 16 * 1024];
    while source.has_more() {
        let info = source.recv(&mut buf).await.unwrap();
        driver.handle_packet(&buf[..info.len], override_ts);
    }
}

#[tokio::test]
async fn test_replay_publishes_every_artifact() {
    let params = params();
    let writer = writer(&params);

    let mut packets = Vec::new();
    for frame in 0..4 {
        packets.extend(revolution(&writer, frame));
        if frame == 1 {
            packets.push(writer.imu_packet(1_500, [0.0, 0.0, 1.0], [0.0, 0.0, 90.0]));
        }
    }
    let mut source = TestSource::new(packets);

    let published = Arc::new(Mutex::new(Published::default()));
    let mut driver = driver(&params, &published);
    driver.activate();
    replay(&mut driver, &mut source, 0).await;

    let published = published.lock().unwrap();

    // the first packet only activates the scan preprocessor and the last
    // revolution is never closed by a following packet
    let stamps: Vec<u64> = published.clouds.iter().map(|c| c.timestamp()).collect();
    assert_eq!(stamps, vec![1_004, 2_000, 3_000]);
    assert_eq!(published.scans.len(), 3);
    assert_eq!(published.imu.len(), 1);

    let cloud = &published.clouds[1];
    assert_eq!(cloud.frame_id(), "lidar");
    assert_eq!(cloud.len(), 64);

    // the horizontal beam at column zero points along +x
    let [x, y, z] = cloud.point(2 * COLS as usize);
    assert!((x - 1.0).abs() < 1e-4, "x = {}", x);
    assert!(y.abs() < 1e-4, "y = {}", y);
    assert!(z.abs() < 1e-4, "z = {}", z);
    assert_eq!(cloud.t()[5], 5);
    assert_eq!(cloud.ring()[3 * COLS as usize], 3);

    // columns dropped before activation are empty
    let first = &published.clouds[0];
    assert_eq!(first.range()[0], 0);
    assert_eq!(first.point(0), [0.0, 0.0, 0.0]);
    assert_eq!(first.range()[4], 1000);

    let scan = &published.scans[1];
    assert_eq!(scan.timestamp, 2_000);
    assert_eq!(scan.ranges.len(), COLS as usize);
    assert!(scan.ranges.iter().all(|&r| r == 1.0));

    let imu = &published.imu[0];
    assert_eq!(imu.timestamp, 1_500);
    assert!((imu.linear_acceleration[2] - STANDARD_G).abs() < 1e-9);
    assert!((imu.angular_velocity[2] - std::f64::consts::FRAC_PI_2).abs() < 1e-6);
}

#[tokio::test]
async fn test_host_timestamps_override_sensor_time() {
    let params = params();
    let writer = writer(&params);
    let packets = (0..3).flat_map(|frame| revolution(&writer, frame)).collect();
    let mut source = TestSource::new(packets);

    let published = Arc::new(Mutex::new(Published::default()));
    let mut driver = driver(&params, &published);
    driver.activate();
    replay(&mut driver, &mut source, 42_000).await;

    let published = published.lock().unwrap();
    assert_eq!(published.clouds.len(), 2);
    assert!(published.clouds.iter().all(|c| c.timestamp() == 42_000));
    assert!(published.scans.iter().all(|s| s.timestamp == 42_000));

    // per-point times stay relative to the sensor timestamp
    assert_eq!(published.clouds[1].t()[7], 7);
}

#[tokio::test]
async fn test_nothing_published_before_activation() {
    let params = params();
    let writer = writer(&params);
    let packets = (0..3).flat_map(|frame| revolution(&writer, frame)).collect();
    let mut source = TestSource::new(packets);

    let published = Arc::new(Mutex::new(Published::default()));
    let mut driver = driver(&params, &published);
    replay(&mut driver, &mut source, 0).await;

    assert_eq!(driver.published(), 0);
    assert!(published.lock().unwrap().clouds.is_empty());

    // activation starts batching from the next packet
    driver.activate();
    source.reset();
    replay(&mut driver, &mut source, 0).await;
    assert_eq!(published.lock().unwrap().clouds.len(), 2);
}

#[tokio::test]
async fn test_pointcloud2_encoding() {
    let params = params();
    let writer = writer(&params);
    let packets = (0..3).flat_map(|frame| revolution(&writer, frame)).collect();
    let mut source = TestSource::new(packets);

    let published = Arc::new(Mutex::new(Published::default()));
    let mut driver = driver(&params, &published);
    driver.activate();
    replay(&mut driver, &mut source, 0).await;

    let published = published.lock().unwrap();
    let msg = formats::to_point_cloud2(&published.clouds[1]);
    assert_eq!(msg.header.frame_id, "lidar");
    assert_eq!(msg.width, COLS as u32);
    assert_eq!(msg.height, 4);
    assert_eq!(msg.point_step, formats::POINT_STEP as u32);
    assert_eq!(msg.data.len(), 64 * formats::POINT_STEP);

    let buf = cdr::serialize::<_, _, CdrLe>(&msg, Infinite).unwrap();
    let decoded: PointCloud2 = cdr::deserialize(&buf).unwrap();
    assert_eq!(decoded.data, msg.data);
    assert_eq!(decoded.fields.len(), msg.fields.len());
}
