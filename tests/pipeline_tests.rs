//! End-to-end tests for the pipeline stage
//!
//! Frames are fed through `Pipeline::process` and `run` exactly as a host
//! would, and only the emitted frames and snapshots are inspected.

use lyrefeed::frame::{BOLOMETER_PROPERTIES, CHANNEL_MASK, DATA, HOUSEKEEPING, STATUS, TIMESTAMP, WIRING_MAP};
use lyrefeed::metadata::DetectorPropertiesMap;
use lyrefeed::*;
use serde_json::{json, Value};
use std::collections::HashSet;

fn config(detectors: usize) -> StageConfig {
    StageConfig {
        detector_count: Some(detectors),
        announce_focal_plane: false,
        ..StageConfig::default()
    }
}

fn wiring_record(module: u32, channel: u32) -> Value {
    json!({
        "board_serial": "0137",
        "crate_serial": "5",
        "board_slot": 3,
        "module": module,
        "channel": channel
    })
}

/// 4 channels spread over 2 readout modules of one board
fn four_channel_wiring() -> Frame {
    Frame::new(FrameType::Configuration).with_field(
        WIRING_MAP,
        json!({
            "det_a": wiring_record(0, 0),
            "det_b": wiring_record(0, 1),
            "det_c": wiring_record(1, 0),
            "det_d": wiring_record(1, 1)
        }),
    )
}

fn scan_frame(rate: Option<f64>, times: Vec<f64>, channels: Value) -> Frame {
    Frame::new(FrameType::Scan).with_field(
        DATA,
        json!({"sample_rate": rate, "times": times, "channels": channels}),
    )
}

fn good_housekeeping() -> Value {
    let channel = json!({
        "dan_railed": false,
        "carrier_frequency": 1.2e6,
        "demod_frequency": 1.2e6,
        "carrier_amplitude": 0.05,
        "dan_accumulator_enable": true,
        "dan_feedback_enable": true,
        "dan_streaming_enable": true
    });
    let railed = json!({
        "dan_railed": true,
        "carrier_frequency": 1.2e6,
        "demod_frequency": 1.2e6
    });
    json!({
        "0137": {
            "timestamp": 1760882587.75,
            "fir_stage": 6,
            "temperatures": {"MOTHERBOARD_TEMPERATURE_FPGA": 55.0, "MOTHERBOARD_TEMPERATURE_ARM": 48.0},
            "voltages": {"MOTHERBOARD_RAIL_VCC3V3": 3.3, "MOTHERBOARD_RAIL_VCC12V0": 12.1},
            "mezz": {
                "1": {
                    "voltages": {"MEZZANINE_RAIL_VCC3V3": 3.31},
                    "modules": {
                        "1": {"squid_feedback": "SQUID_LOWPASS", "channels": {"1": channel, "2": channel}},
                        "2": {"squid_feedback": "SQUID_LOWPASS", "channels": {"1": railed, "2": railed, "3": railed}}
                    }
                }
            }
        }
    })
}

// ============================================================================
// Metadata synthesis
// ============================================================================

#[test]
fn test_synthesized_metadata_for_four_channels_on_two_devices() {
    let mut stage = Pipeline::new(config(4)).unwrap();

    let mut emitted = stage.process(four_channel_wiring()).unwrap().frames;
    emitted.extend(stage.process(Frame::new(FrameType::Calibration)).unwrap().frames);

    let synthesized: Vec<&Frame> = emitted
        .iter()
        .filter(|f| f.frame_type() == FrameType::Calibration && f.has(BOLOMETER_PROPERTIES))
        .collect();
    assert_eq!(synthesized.len(), 1);

    let props: DetectorPropertiesMap = synthesized[0].decode(BOLOMETER_PROPERTIES).unwrap().unwrap();
    assert_eq!(props.len(), 4);

    let positions: HashSet<(u64, u64)> = props
        .values()
        .map(|p| (p.x.to_bits(), p.y.to_bits()))
        .collect();
    assert_eq!(positions.len(), 4, "positions overlap: {props:?}");

    let devices: HashSet<&str> = props.values().map(|p| p.device_id.as_str()).collect();
    assert_eq!(devices, HashSet::from(["0137_5_3/1/1", "0137_5_3/1/2"]));
    assert!(props.values().all(|p| p.board_id == "0137_5_3"));
}

#[test]
fn test_synthesized_frame_precedes_the_configuration_frame() {
    let mut stage = Pipeline::new(config(4)).unwrap();
    let frames = stage.process(four_channel_wiring()).unwrap().frames;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].frame_type(), FrameType::Calibration);
    assert_eq!(frames[1].frame_type(), FrameType::Configuration);
    assert!(frames[1].has(WIRING_MAP));
}

#[test]
fn test_authoritative_calibration_suppresses_synthesis() {
    let mut stage = Pipeline::new(config(4)).unwrap();
    let calibration = Frame::new(FrameType::Calibration)
        .with_field(BOLOMETER_PROPERTIES, json!({"det_a": {"x": 0.0, "y": 0.0}}));
    stage.process(calibration).unwrap();

    let frames = stage.process(four_channel_wiring()).unwrap().frames;
    assert_eq!(frames.len(), 1);
    assert_eq!(stage.stats().synthesized_generations, 0);
}

#[test]
fn test_new_topology_resynthesizes() {
    let mut stage = Pipeline::new(config(4)).unwrap();
    stage.process(four_channel_wiring()).unwrap();

    let single = Frame::new(FrameType::Configuration)
        .with_field(WIRING_MAP, json!({"only": wiring_record(5, 0)}));
    let frames = stage.process(single).unwrap().frames;
    let props: DetectorPropertiesMap = frames[0].decode(BOLOMETER_PROPERTIES).unwrap().unwrap();
    assert_eq!(props.keys().collect::<Vec<_>>(), vec!["only"]);
    assert_eq!(props["only"].device_id, "0137_5_3/2/2");
    assert_eq!(stage.stats().synthesized_generations, 2);
}

// ============================================================================
// Scan remapping
// ============================================================================

#[test]
fn test_scan_downsampled_to_target_rate() {
    let mut stage = Pipeline::new(config(3)).unwrap();

    let n = 400;
    let times: Vec<f64> = (0..n).map(|i| 1000.0 + i as f64 / 200.0).collect();
    let series: Vec<f64> = (0..n).map(|i| i as f64 * 65536.0).collect();
    let frames = stage
        .process(scan_frame(Some(200.0), times.clone(), json!({"r0002": series})))
        .unwrap()
        .frames;

    // Stride 66 over 400 samples
    let expected: Vec<usize> = (0..n).step_by(66).collect();
    assert_eq!(frames.len(), expected.len());
    for (frame, &i) in frames.iter().zip(&expected) {
        assert_eq!(frame.frame_type(), FrameType::Scan);
        assert_eq!(frame.get_f64(TIMESTAMP), Some(times[i]));
        assert_eq!(frame.get_f64_seq(DATA), Some(vec![0.0, 0.0, i as f64]));
    }
}

#[test]
fn test_status_register_mask_reroutes_channels() {
    let mut stage = Pipeline::new(config(4)).unwrap();
    let register = stage.config().mask_register.clone();
    let announce = Frame::new(FrameType::Configuration)
        .with_field(STATUS, json!({ register: "[3, 2, 1, 0]" }));
    stage.process(announce).unwrap();

    let frames = stage
        .process(scan_frame(None, vec![7.0], json!({"r0000": [65536.0], "r0001": [131072.0]})))
        .unwrap()
        .frames;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].get_f64_seq(DATA), Some(vec![0.0, 0.0, 2.0, 1.0]));
}

#[test]
fn test_short_mask_skips_frame_then_recovers() {
    let mut stage = Pipeline::new(config(4)).unwrap();
    stage
        .process(Frame::new(FrameType::Configuration).with_field(CHANNEL_MASK, json!([0, 1])))
        .unwrap();

    let three_channels = json!({"r0000": [1.0], "r0001": [1.0], "r0002": [1.0]});
    let out = stage
        .process(scan_frame(Some(200.0), vec![0.0], three_channels.clone()))
        .unwrap();
    assert!(out.frames.is_empty());
    assert_eq!(
        out.warnings,
        vec![StageWarning::DegradedInput(DegradedInput::MaskTooShort {
            mask_len: 2,
            channels: 3
        })]
    );

    // The very next frame is processed normally
    let out = stage
        .process(scan_frame(Some(200.0), vec![0.0], json!({"r0001": [65536.0]})))
        .unwrap();
    assert_eq!(out.frames.len(), 1);
    assert!(out.warnings.is_empty());

    // And a corrected mask makes the wide frame usable again
    stage
        .process(Frame::new(FrameType::Configuration).with_field(CHANNEL_MASK, json!([0, 1, 2, 3])))
        .unwrap();
    let out = stage
        .process(scan_frame(Some(200.0), vec![0.0], three_channels))
        .unwrap();
    assert_eq!(out.frames.len(), 1);
    assert_eq!(stage.stats().degraded_frames, 1);
}

#[test]
fn test_scan_without_data_passes_through() {
    let mut stage = Pipeline::new(config(2)).unwrap();
    let bare = Frame::new(FrameType::Scan).with_field("note", "no samples");
    let frames = stage.process(bare.clone()).unwrap().frames;
    assert_eq!(frames, vec![bare]);
}

// ============================================================================
// Housekeeping and status
// ============================================================================

#[test]
fn test_housekeeping_produces_status_snapshot() {
    let mut stage = Pipeline::new(config(4)).unwrap();
    stage.process(four_channel_wiring()).unwrap();

    let hk = Frame::new(FrameType::Housekeeping).with_field(HOUSEKEEPING, good_housekeeping());
    let out = stage.process(hk.clone()).unwrap();
    assert_eq!(out.frames, vec![hk]);

    let status = out.status.unwrap();
    assert_eq!(status.timestamp, "19-Oct-2025:14:03:07");

    let good = &status.health["0137_5_3/1/1"];
    assert!(good.bolometer_good);
    assert!(good.voltage_good);
    assert!(good.temperature_good);
    assert!(good.fir_stage_good());
    assert!(good.feedback_on);
    assert_eq!(good.label_str(), "");

    let railed = &status.health["0137_5_3/1/2"];
    assert!(!railed.bolometer_good);
    assert_eq!(railed.label_str(), "DanRail:3");

    // Status rows start below the 7-row legend
    assert_eq!(status.positions["0137_5_3/1/1"], LayoutPosition::new(1.0, 9.0));
    assert_eq!(status.positions["0137_5_3/1/2"], LayoutPosition::new(1.0, 10.0));
}

#[test]
fn test_custom_thresholds_are_honoured() {
    let mut cfg = config(4);
    cfg.thresholds
        .temperatures
        .insert("MOTHERBOARD_TEMPERATURE_FPGA".to_string(), Range(0.0, 50.0));
    let mut stage = Pipeline::new(cfg).unwrap();
    stage.process(four_channel_wiring()).unwrap();

    let hk = Frame::new(FrameType::Housekeeping).with_field(HOUSEKEEPING, good_housekeeping());
    let status = stage.process(hk).unwrap().status.unwrap();
    assert!(!status.health["0137_5_3/1/1"].temperature_good);
}

#[test]
fn test_null_sensor_reading_fails_only_its_check() {
    let mut stage = Pipeline::new(config(4)).unwrap();
    stage.process(four_channel_wiring()).unwrap();

    let mut hk = good_housekeeping();
    hk["0137"]["temperatures"]["MOTHERBOARD_TEMPERATURE_FPGA"] = Value::Null;
    let frame = Frame::new(FrameType::Housekeeping).with_field(HOUSEKEEPING, hk);
    let status = stage.process(frame).unwrap().status.unwrap();

    let module = &status.health["0137_5_3/1/1"];
    assert!(!module.temperature_good);
    assert!(module.voltage_good);
    assert!(module.bolometer_good);
    assert_eq!(status.health["0137_5_3/1/2"].label_str(), "DanRail:3");
}

// ============================================================================
// Host loop
// ============================================================================

#[test]
fn test_run_full_stream() {
    let mut stage = Pipeline::new(StageConfig {
        detector_count: Some(4),
        focal_plane: FocalPlane {
            pixels: 1,
            ..FocalPlane::default()
        },
        ..StageConfig::default()
    })
    .unwrap();

    let frames = vec![
        four_channel_wiring(),
        Frame::new(FrameType::Calibration),
        Frame::new(FrameType::Housekeeping).with_field(HOUSEKEEPING, good_housekeeping()),
        scan_frame(Some(6.0), vec![0.0, 0.5, 1.0, 1.5], json!({"r0000": [1.0, 2.0, 3.0, 4.0]})),
        Frame::shutdown(),
        Frame::new(FrameType::Calibration),
    ];

    let mut sink: Vec<Frame> = Vec::new();
    let mut snapshots: Vec<StatusSnapshot> = Vec::new();
    let summary = run(&mut stage, &mut IterSource::new(frames), &mut sink, &mut snapshots).unwrap();

    assert_eq!(summary.stop, StopReason::Shutdown);
    assert_eq!(summary.frames_read, 5);
    assert_eq!(snapshots.len(), 1);

    let types: Vec<FrameType> = sink.iter().map(Frame::frame_type).collect();
    assert_eq!(
        types,
        vec![
            FrameType::Configuration, // focal plane
            FrameType::Calibration,   // synthesized
            FrameType::Configuration,
            FrameType::Calibration,
            FrameType::Housekeeping,
            FrameType::Scan,
            FrameType::Scan,
            FrameType::Shutdown,
        ]
    );
    assert!(sink[0].has("cname"));
    assert_eq!(summary.stats.frames_out, sink.len() as u64);
}

#[test]
fn test_json_lines_round_trip_through_stage() {
    let lines = [
        r#"{"type": "Configuration", "fields": {"ChannelMask": [1, 0]}}"#,
        r#"{"type": "Scan", "fields": {"data": {"sample_rate": null, "times": [3.0], "channels": {"r0000": [65536.0]}}}}"#,
        r#"{"type": "Shutdown"}"#,
    ];
    let mut stage = Pipeline::new(config(2)).unwrap();
    let mut out = Vec::new();
    for line in lines {
        out.extend(stage.process(Frame::from_json(line).unwrap()).unwrap().frames);
    }
    let encoded: Vec<String> = out.iter().map(|f| f.to_json().unwrap()).collect();
    assert_eq!(encoded.len(), 3);
    assert!(encoded[1].contains(r#""data":[0.0,1.0]"#));
    assert!(encoded[1].contains(r#""timestamp":3.0"#));
}
