//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 广播语义场景（顺序、移除、重复添加、丢弃）
//! - 配置到写入器的端到端测试

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
        assert_eq!(contracts::TeeConfig::default().bufs_per_sink, 8);
    }
}

#[cfg(test)]
mod scenario_tests {
    use contracts::{ContractError, DataSink};
    use nbtee::{shared, MemorySink, SharedSink, TargetId, Tee, TeeConfig, TeeError};
    use tokio::time::{sleep, Duration};

    fn tee(bufs_per_sink: usize) -> Tee {
        Tee::start(TeeConfig::with_bufs_per_sink(bufs_per_sink))
    }

    /// Sink that takes a while for every write
    struct SlowSink {
        name: String,
        delay: Duration,
        data: Vec<u8>,
    }

    impl SlowSink {
        fn new(name: &str, delay: Duration) -> Self {
            Self {
                name: name.to_string(),
                delay,
                data: Vec::new(),
            }
        }
    }

    impl DataSink for SlowSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, buf: &[u8]) -> Result<(), ContractError> {
            sleep(self.delay).await;
            self.data.extend_from_slice(buf);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_close_with_no_sinks() {
        let w = tee(4);
        assert!(w.is_empty().await.unwrap());
        assert!(w.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_writes_delivered_in_order() {
        let n = 50u8;
        let b = shared(MemorySink::new("ordered"));
        let w = tee(n as usize);
        w.add(b.clone()).unwrap();
        for i in 0..n {
            w.write(&[i, i]).unwrap();
        }
        w.flush().await.unwrap();

        let expected: Vec<u8> = (0..n).flat_map(|i| [i, i]).collect();
        assert_eq!(b.lock().await.contents(), expected.as_slice());
        w.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_after_remove_not_delivered() {
        let b = shared(MemorySink::new("removed"));
        let w = tee(4);
        w.add(b.clone()).unwrap();
        w.write(&[1]).unwrap();
        let handle = w.remove(&b).await.unwrap();
        w.write(&[2]).unwrap();
        handle.close().await.unwrap();
        w.flush().await.unwrap();

        let sink = b.lock().await;
        assert_eq!(sink.contents(), &[1]);
        assert_eq!(sink.close_count(), 1);
        drop(sink);
        w.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_and_close_scenario() {
        let b = shared(MemorySink::new("b"));
        let w = tee(4);
        w.add(b.clone()).unwrap();
        w.write(&[1, 2, 3]).unwrap();
        w.remove_and_close(&b).await.unwrap();
        w.write(&[4, 5, 6]).unwrap();
        assert!(w.close().await.is_ok());
        assert_eq!(b.lock().await.contents(), &[1, 2, 3]);
    }

    /// Each sink i is added before write i, so it sees exactly the writes
    /// from i onward.
    #[tokio::test]
    async fn test_many_sinks_exact_counts() {
        let n = 100;
        let w = tee(n);
        let sinks: Vec<SharedSink<MemorySink>> = (0..n)
            .map(|i| shared(MemorySink::new(format!("sink{i}"))))
            .collect();

        for sink in &sinks {
            w.add(sink.clone()).unwrap();
            w.write(&[1]).unwrap();
        }
        w.flush().await.unwrap();

        for (i, sink) in sinks.iter().enumerate() {
            w.remove_and_close(sink).await.unwrap();
            assert_eq!(sink.lock().await.contents().len(), n - i, "sink {i}");
        }
        w.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_small_queue_depths_never_starve() {
        for depth in [0, 1, 2, 3] {
            let n = 100;
            let w = tee(depth);
            let sinks: Vec<SharedSink<MemorySink>> = (0..n)
                .map(|i| shared(MemorySink::new(format!("sink{i}"))))
                .collect();

            for sink in &sinks {
                w.add(sink.clone()).unwrap();
                w.write(&[1]).unwrap();
            }
            w.flush().await.unwrap();

            for (i, sink) in sinks.iter().enumerate() {
                w.remove_and_close(sink).await.unwrap();
                let got = sink.lock().await.contents().len();
                assert!(got > 0, "depth {depth}: sink {i} received nothing");
                assert!(got <= n - i, "depth {depth}: sink {i} received too much");
            }
            w.close().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_slow_sink_does_not_hold_back_others() {
        let fast = shared(MemorySink::new("fast"));
        let slow = shared(SlowSink::new("slow", Duration::from_millis(20)));
        let w = tee(2);
        w.add(slow.clone()).unwrap();
        w.set_bufs_per_sink(100);
        w.add(fast.clone()).unwrap();

        for i in 0..50u8 {
            w.write(&[i]).unwrap();
        }
        w.flush().await.unwrap();

        assert_eq!(fast.lock().await.contents().len(), 50);
        let slow_len = slow.lock().await.data.len();
        assert!(slow_len > 0 && slow_len < 50, "slow sink got {slow_len}");

        let metrics = w.metrics().await.unwrap();
        let slow_id = TargetId::of(&slow);
        let (_, slow_metrics) = metrics.iter().find(|(id, _)| *id == slow_id).unwrap();
        assert!(slow_metrics.dropped_count > 0);
        assert_eq!(slow_metrics.write_count, slow_len as u64);

        w.remove_and_close(&slow).await.unwrap();
        w.remove_and_close(&fast).await.unwrap();
        w.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_sink_is_isolated() {
        let good = shared(MemorySink::new("good"));
        let bad = shared(MemorySink::new("bad").fail_after(2));
        let w = tee(16);
        w.add(good.clone()).unwrap();
        w.add(bad.clone()).unwrap();

        for i in 0..5u8 {
            w.write(&[i]).unwrap();
        }
        // A failed sink counts as drained, so this does not hang.
        w.flush().await.unwrap();

        assert_eq!(good.lock().await.contents(), &[0, 1, 2, 3, 4]);
        {
            let bad = bad.lock().await;
            assert_eq!(bad.contents(), &[0, 1]);
            assert_eq!(bad.close_count(), 1);
        }

        // The failed sink stays registered until removed, and reports the
        // write error when it is.
        assert_eq!(w.len().await.unwrap(), 2);
        let err = w.remove_and_close(&bad).await.unwrap_err();
        assert!(matches!(err, TeeError::Sink(ContractError::SinkWrite { .. })));
        assert_eq!(bad.lock().await.close_count(), 1);

        w.remove_and_close(&good).await.unwrap();
        w.close().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers() {
        let producers = 4u8;
        let per_producer = 250usize;
        let b = shared(MemorySink::new("shared"));
        let w = tee(producers as usize * per_producer + 1);
        w.add(b.clone()).unwrap();

        let mut tasks = Vec::new();
        for p in 0..producers {
            let w = w.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..per_producer {
                    w.write(&[p]).unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        w.flush().await.unwrap();

        let sink = b.lock().await;
        assert_eq!(sink.contents().len(), producers as usize * per_producer);
        for p in 0..producers {
            let count = sink.contents().iter().filter(|&&x| x == p).count();
            assert_eq!(count, per_producer, "producer {p}");
        }
        drop(sink);
        w.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_operations_after_close() {
        let b = shared(MemorySink::new("late"));
        let w = tee(4);
        w.close().await.unwrap();

        assert!(matches!(w.add(b.clone()), Err(TeeError::Closed)));
        assert!(matches!(w.write(&[1]), Err(TeeError::Closed)));
        assert!(matches!(w.flush().await, Err(TeeError::Closed)));
        assert!(matches!(w.remove(&b).await, Err(TeeError::Closed)));
        assert!(w.close().await.is_ok());
    }
}

#[cfg(test)]
mod e2e_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use nbtee::TeeBuilder;
    use tempfile::tempdir;

    /// End-to-end test: config text -> ConfigLoader -> TeeBuilder -> files
    #[tokio::test]
    async fn test_e2e_config_to_files() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("primary.bin");
        let mirror = dir.path().join("nested").join("mirror.bin");

        let content = format!(
            r#"
[tee]
bufs_per_sink = 64

[[sinks]]
name = "primary"
sink_type = "file"
[sinks.params]
path = "{}"

[[sinks]]
name = "mirror"
sink_type = "file"
bufs_per_sink = 256
[sinks.params]
path = "{}"

[[sinks]]
name = "trace"
sink_type = "log"
"#,
            primary.display(),
            mirror.display()
        );

        let blueprint = ConfigLoader::load_from_str(&content, ConfigFormat::Toml).unwrap();
        let configured = TeeBuilder::new(blueprint).build().await.unwrap();
        assert_eq!(configured.tee.len().await.unwrap(), 3);

        let mut expected = Vec::new();
        for i in 0..20u8 {
            let chunk = [i; 3];
            configured.tee.write(&chunk).unwrap();
            expected.extend_from_slice(&chunk);
        }

        let results = configured.shutdown().await.unwrap();
        assert_eq!(results.len(), 3);
        for (name, result) in &results {
            assert!(result.is_ok(), "sink {name} failed: {result:?}");
        }

        assert_eq!(std::fs::read(&primary).unwrap(), expected);
        assert_eq!(std::fs::read(&mirror).unwrap(), expected);
    }

    #[test]
    fn test_e2e_invalid_config_rejected() {
        let content = r#"
[[sinks]]
name = "net"
sink_type = "tcp"
"#;
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("addr"), "got: {err}");
    }

    #[test]
    fn test_delivery_summary() {
        let mut aggregator = observability::DeliveryAggregator::new();
        aggregator.record_buffer(3);
        aggregator.set_sink_error("net", "connection refused");
        let summary = aggregator.summary().to_string();
        assert!(summary.contains("net"));
        assert!(summary.contains("connection refused"));
    }
}
