//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 采集 → 缓冲 → 快照 → 分发 端到端测试（无需采集硬件）
//! - 窗口解析与分发隔离的跨 crate 验证

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ChannelId, EngineConfig, PhaseConfig};

    #[test]
    fn test_output_channel_naming() {
        let engine = EngineConfig {
            channels: Vec::new(),
            phases: vec![PhaseConfig {
                name: "L1".into(),
                u_channel: "u1".into(),
                i_channel: "i1".into(),
            }],
        };
        let outputs = engine.output_channels(&[ChannelId::from("u1"), ChannelId::from("i1")]);

        assert_eq!(outputs.len(), 2 * 4 + 3);
        for name in ["u1_mean", "u1_rms", "i1_min", "i1_max", "L1_u_rms", "L1_i_rms", "L1_p_avg"] {
            assert!(outputs.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_storage_plan_with_unknown_channel_rejected() {
        let config = r#"
            [source]
            kind = "synthetic"

            [[storage]]
            name = "csv"
            sink_type = "csv"
            channels = ["u1_rms", "u7_rms"]
            params = { path = "out.csv" }
        "#;
        let err = ConfigLoader::load_from_str(config, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("u7_rms"));

        let valid = config.replace("u7_rms", "i1_max");
        let blueprint = ConfigLoader::load_from_str(&valid, ConfigFormat::Toml).unwrap();
        assert_eq!(blueprint.storage[0].channels, vec!["u1_rms", "i1_max"]);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use channel_buffer::{channel_buffer, resolve, BufferReader, LiveView, Window, WindowResolution};
    use chrono::Utc;
    use contracts::{
        Cadence, ChannelId, ContractError, DataSink, DetectorConfig, DispatchMessage,
        DisplayConfig, EngineConfig, Event, EventKind, Frame, IndexRange, SinkType, Snapshot,
        SnapshotValue, StoragePlanConfig,
    };
    use dispatcher::{create_dispatcher, Dispatcher};
    use ingestion::{ChannelFrameSource, IngestionConfig, IngestionError, IngestionLoop};
    use rand::Rng;
    use snapshot_engine::{
        DerivedQuantityEngine, DetectorBank, SnapshotScheduler, SnapshotTrigger, WindowStatsEngine,
    };
    use tokio::sync::{mpsc, watch};

    const RATE: f64 = 1000.0;
    const ROWS: usize = 100;

    fn channels() -> Vec<ChannelId> {
        vec!["u1".into(), "i1".into()]
    }

    /// Frame of constant u1/i1 values, timestamped by its first sample index
    fn frame(seq: u64, first_index: u64, rows: usize, u1: f64, i1: f64) -> Frame {
        let data: Vec<f64> = (0..rows).flat_map(|_| [u1, i1]).collect();
        let timestamp_us = (first_index as f64 * 1e6 / RATE) as i64;
        Frame::from_row_slice(seq, timestamp_us, rows, 2, &data).unwrap()
    }

    fn ingestion_config() -> IngestionConfig {
        IngestionConfig {
            poll_interval: Duration::from_millis(10),
        }
    }

    async fn wait_for_index(reader: &BufferReader, target: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while reader.current_index() < target {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("buffer never reached target index");
    }

    /// 10 frames × 100 rows @ 1000 Hz, an immediate snapshot, then a gap.
    ///
    /// 验证：
    /// 1. current_index == 1000
    /// 2. 快照覆盖 [0, 1000)
    /// 3. 序号 11（期望 10）终止采集，且不写入任何数据
    #[tokio::test]
    async fn test_e2e_ingest_snapshot_then_gap() {
        let (frame_tx, source) = ChannelFrameSource::new(RATE, channels(), 32);
        let (writer, reader) = channel_buffer(channels(), RATE, 5.0).unwrap();

        let engine = WindowStatsEngine::new(reader.clone(), &EngineConfig::default()).unwrap();
        let mut scheduler = SnapshotScheduler::new(
            engine,
            DetectorBank::new(reader.clone()),
            reader.clone(),
            SnapshotTrigger::Interval(Duration::from_secs(3600)),
        );

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let ingestion = IngestionLoop::new(source, writer, ingestion_config());
        let metrics = ingestion.metrics();
        let task = tokio::spawn(ingestion.run(shutdown_rx));

        for seq in 0..10u64 {
            frame_tx
                .send(frame(seq, seq * ROWS as u64, ROWS, 230.0, 5.0))
                .await
                .unwrap();
        }
        wait_for_index(&reader, 1000).await;
        assert_eq!(reader.current_index(), 1000);

        let snapshot = scheduler.finish().unwrap().snapshot.expect("snapshot");
        assert_eq!((snapshot.range.start, snapshot.range.end), (0, 1000));
        assert!((snapshot.scalar("u1_rms").unwrap() - 230.0).abs() < 1e-9);
        assert!((snapshot.scalar("i1_mean").unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(scheduler.last_snapshot_index(), 1000);

        frame_tx
            .send(frame(11, 1000, ROWS, 999.0, 999.0))
            .await
            .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("ingestion did not halt")
            .unwrap();

        match result {
            Err(IngestionError::SequenceGap { expected, actual }) => {
                assert_eq!((expected, actual), (10, 11));
            }
            other => panic!("expected sequence gap, got {other:?}"),
        }
        assert_eq!(reader.current_index(), 1000);
        assert_eq!(metrics.snapshot().frames_appended, 10);
        let newest = reader.read("u1", 999, 999).unwrap();
        assert_eq!(newest, vec![230.0]);
    }

    /// Contiguous frames of random sizes: index equals the row sum
    #[tokio::test]
    async fn test_random_frame_sizes_accumulate() {
        let mut rng = rand::rng();
        let sizes: Vec<usize> = (0..25).map(|_| rng.random_range(1..=64)).collect();
        let total: usize = sizes.iter().sum();

        let (frame_tx, source) = ChannelFrameSource::new(RATE, channels(), 64);
        let (writer, reader) = channel_buffer(channels(), RATE, 10.0).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(IngestionLoop::new(source, writer, ingestion_config()).run(shutdown_rx));

        let mut index = 0u64;
        for (seq, rows) in sizes.iter().enumerate() {
            frame_tx
                .send(frame(seq as u64 + 100, index, *rows, 1.0, 2.0))
                .await
                .unwrap();
            index += *rows as u64;
        }
        wait_for_index(&reader, total as u64).await;

        shutdown_tx.send(true).unwrap();
        let report = task.await.unwrap().unwrap();
        assert_eq!(report.current_index, total as u64);
        assert_eq!(report.frames, sizes.len() as u64);
        assert_eq!(report.last_sequence, Some(100 + sizes.len() as u64 - 1));
    }

    /// Full task layout: ingestion + scheduler + dispatcher with a CSV sink
    #[tokio::test]
    async fn test_e2e_pipeline_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.csv");
        let events_path = dir.path().join("events.csv");

        let (frame_tx, source) = ChannelFrameSource::new(RATE, channels(), 32);
        let (writer, reader) = channel_buffer(channels(), RATE, 5.0).unwrap();

        let engine = WindowStatsEngine::new(reader.clone(), &EngineConfig::default()).unwrap();
        let outputs = engine.output_channels().clone();
        let detectors = DetectorBank::from_configs(
            reader.clone(),
            &[DetectorConfig {
                channel: "u1".into(),
                kind: EventKind::LevelLow,
                threshold: 200.0,
                hysteresis: 5.0,
                min_duration_sec: 0.02,
            }],
        )
        .unwrap();

        let plan = StoragePlanConfig {
            name: "csv".into(),
            sink_type: SinkType::Csv,
            channels: vec!["u1_rms".into()],
            cadence: None,
            events: true,
            queue_capacity: 100,
            params: HashMap::from([
                ("path".to_string(), path.display().to_string()),
                ("events_path".to_string(), events_path.display().to_string()),
            ]),
        };
        let dispatcher = create_dispatcher(vec![plan], outputs, RATE).await.unwrap();

        let (dispatch_tx, dispatch_rx) = mpsc::channel::<DispatchMessage>(16);
        let dispatch_task = dispatcher.spawn(dispatch_rx);

        let (ingest_tx, ingest_rx) = watch::channel(false);
        let ingestion_task =
            tokio::spawn(IngestionLoop::new(source, writer, ingestion_config()).run(ingest_rx));

        let (sched_tx, sched_rx) = watch::channel(false);
        let scheduler = SnapshotScheduler::new(
            engine,
            detectors,
            reader.clone(),
            SnapshotTrigger::EverySamples(500),
        );
        let scheduler_task =
            tokio::spawn(scheduler.run(Duration::from_millis(5), dispatch_tx, sched_rx));

        // 1 s of nominal voltage, 100 ms sag, then recovery
        let mut index = 0u64;
        for seq in 0..12u64 {
            let u1 = if seq == 10 { 180.0 } else { 230.0 };
            frame_tx.send(frame(seq, index, ROWS, u1, 5.0)).await.unwrap();
            index += ROWS as u64;
        }
        wait_for_index(&reader, 1200).await;

        ingest_tx.send(true).unwrap();
        ingestion_task.await.unwrap().unwrap();
        sched_tx.send(true).unwrap();
        let sched_report = scheduler_task.await.unwrap().unwrap();
        let dispatch_report = dispatch_task.await.unwrap();

        assert_eq!(sched_report.last_snapshot_index, 1200);
        assert_eq!(sched_report.events, 2);

        let (name, metrics) = &dispatch_report[0];
        assert_eq!(name, "csv");
        assert_eq!(metrics.write_count, sched_report.snapshots);
        assert_eq!(metrics.failure_count, 0);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "timestamp,u1_rms");
        assert_eq!(lines.len() as u64, 1 + sched_report.snapshots);

        let events = std::fs::read_to_string(&events_path).unwrap();
        let rows: Vec<_> = events.lines().skip(1).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].contains("u1,level_low,enter,1000,180.000"));
        assert!(rows[1].contains("u1,level_low,exit,1100,230.000"));
    }

    /// Sink that fails every write
    struct FailingSink;

    impl DataSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn write_snapshot(&mut self, _snapshot: &Snapshot) -> Result<(), ContractError> {
            Err(ContractError::sink_write("failing", "disk full"))
        }

        async fn write_events(&mut self, _events: &[Event]) -> Result<(), ContractError> {
            Err(ContractError::sink_write("failing", "disk full"))
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn snapshot(id: u64, start: u64, end: u64) -> Snapshot {
        Snapshot {
            snapshot_id: id,
            range: IndexRange::new(start, end),
            timestamp_us: end as i64 * 1000,
            wall_time: Utc::now(),
            values: [("u1_rms".into(), SnapshotValue::Scalar(230.0))]
                .into_iter()
                .collect(),
        }
    }

    /// A failing sink does not affect delivery to the others
    #[tokio::test]
    async fn test_dispatch_isolation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.csv");
        let outputs = EngineConfig::default().output_channels(&channels());

        let mut dispatcher = Dispatcher::new(outputs.clone(), RATE);
        let failing_plan = StoragePlanConfig {
            name: "failing".into(),
            sink_type: SinkType::Log,
            channels: Vec::new(),
            cadence: None,
            events: true,
            queue_capacity: 10,
            params: HashMap::new(),
        };
        dispatcher.register(FailingSink, &failing_plan).unwrap();

        let csv_plan = StoragePlanConfig {
            name: "ok".into(),
            sink_type: SinkType::Csv,
            channels: vec!["u1_rms".into()],
            cadence: Some(Cadence::Samples(1000)),
            events: false,
            queue_capacity: 10,
            params: HashMap::from([("path".to_string(), path.display().to_string())]),
        };
        let csv = dispatcher::CsvSink::from_params("ok", &csv_plan.params).unwrap();
        dispatcher.register(csv, &csv_plan).unwrap();

        for (id, start) in (0..4u64).zip((0..).step_by(500)) {
            dispatcher.dispatch_snapshot(&snapshot(id, start, start + 500));
        }
        let report = dispatcher.shutdown().await;

        let failing = &report.iter().find(|(n, _)| n == "failing").unwrap().1;
        assert_eq!(failing.failure_count, 4);
        assert_eq!(failing.write_count, 0);

        let ok = &report.iter().find(|(n, _)| n == "ok").unwrap().1;
        assert_eq!(ok.write_count, 2);
        assert_eq!(ok.decimated_count, 2);
        assert_eq!(ok.failure_count, 0);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    /// Window resolver examples and the live view built on it
    #[test]
    fn test_resolver_examples() {
        assert_eq!(
            resolve(2.0, 1000, 100.0, 500),
            WindowResolution::Ready(Window {
                start_index: 800,
                end_index: 999,
            })
        );

        let window = resolve(10.0, 1000, 100.0, 500).window().unwrap();
        assert!(window.len() <= 500);
        assert_eq!(window.end_index, 999);

        assert_eq!(resolve(2.0, 150, 100.0, 500), WindowResolution::NotReady);
        assert_eq!(resolve(2.0, 0, 100.0, 500), WindowResolution::NotReady);
    }

    #[test]
    fn test_live_view_window() {
        let (mut writer, reader) = channel_buffer(channels(), 100.0, 5.0).unwrap();
        for seq in 0..10u64 {
            writer.append(&frame(seq, seq * 100, 100, 230.0, 5.0)).unwrap();
        }

        let display = DisplayConfig {
            min_span_sec: 0.1,
            max_span_sec: 10.0,
            default_span_sec: 2.0,
            refresh_ms: 100,
        };
        let view = LiveView::new(reader, &display);
        let window = view.get_window("u1", 2.0).unwrap().unwrap();
        assert_eq!(window.len(), 200);
        assert_eq!(window.window.start_index, 800);
        assert!((window.x[0] - 8.0).abs() < 1e-9);
        assert!(view.get_window("u9", 2.0).is_err());
    }
}
