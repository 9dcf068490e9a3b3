//! Metrics Module Tests
//!
//! ## Test Scopes
//! - **MetricsRecord**: phase ordering, abort monotonicity, JSON shape.
//! - **MetricsRegistry**: registration, per-node handles, concurrent writers and readers.

#[cfg(test)]
mod tests {
    use crate::dsort::types::SortUuid;
    use crate::membership::types::NodeId;
    use crate::metrics::registry::{MetricsRegistry, NodeMetrics};
    use crate::metrics::types::{MetricsRecord, Phase, SortMetrics};
    use std::collections::BTreeMap;

    fn nodes(count: usize) -> Vec<NodeId> {
        (0..count).map(NodeId::target).collect()
    }

    // ============================================================
    // METRICS RECORD
    // ============================================================

    #[test]
    fn test_phases_run_in_order() {
        let mut record = MetricsRecord::default();

        assert!(!record.begin(Phase::MetaSorting), "Cannot skip extraction");
        assert!(record.begin(Phase::LocalExtraction));
        assert!(!record.begin(Phase::LocalExtraction), "Already started");
        assert_eq!(record.current_phase(), Some(Phase::LocalExtraction));

        assert!(!record.finish(Phase::MetaSorting));
        assert!(record.finish(Phase::LocalExtraction));
        assert!(record.local_extraction.end_time.is_some());

        assert!(record.begin(Phase::MetaSorting));
        assert!(record.finish(Phase::MetaSorting));
        assert!(record.begin(Phase::ShardCreation));
        assert!(record.finish(Phase::ShardCreation));

        assert!(record.all_finished());
        assert!(record.phases_ordered());
        assert_eq!(record.current_phase(), None);
    }

    #[test]
    fn test_abort_freezes_record() {
        let mut record = MetricsRecord::default();
        record.begin(Phase::LocalExtraction);
        record.finish(Phase::LocalExtraction);
        record.begin(Phase::MetaSorting);

        record.abort();
        assert!(record.aborted);
        assert!(!record.meta_sorting.finished);
        assert!(record.meta_sorting.end_time.is_some());

        assert!(!record.finish(Phase::MetaSorting));
        assert!(!record.begin(Phase::ShardCreation));

        // Idempotent
        record.abort();
        assert!(record.aborted);
    }

    #[test]
    fn test_record_json_shape() {
        let record = MetricsRecord::default();
        let json = serde_json::to_value(&record).unwrap();

        for phase in ["local_extraction", "meta_sorting", "shard_creation"] {
            assert_eq!(json[phase]["started"], false);
            assert_eq!(json[phase]["finished"], false);
        }
        assert_eq!(json["aborted"], false);
        assert!(json.get("errors").is_none(), "Empty lists are omitted");

        let back: MetricsRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_sort_metrics_aggregation() {
        let mut finished = MetricsRecord::default();
        for phase in Phase::ALL {
            finished.begin(phase);
            finished.finish(phase);
        }
        let mut aborted = MetricsRecord::default();
        aborted.abort();

        let mut map = BTreeMap::new();
        map.insert("t0".to_string(), finished.clone());
        map.insert("t1".to_string(), finished.clone());
        let all_done = SortMetrics(map.clone());
        assert!(all_done.all_finished());
        assert!(!all_done.any_aborted());
        assert!(all_done.settled());

        map.insert("t2".to_string(), aborted);
        let one_aborted = SortMetrics(map);
        assert!(!one_aborted.all_finished());
        assert!(one_aborted.any_aborted());
        assert!(!one_aborted.all_aborted());
        assert!(one_aborted.settled());

        assert!(!SortMetrics::default().all_finished());
    }

    // ============================================================
    // REGISTRY
    // ============================================================

    #[test]
    fn test_register_creates_unfinished_slots() {
        let registry = MetricsRegistry::new();
        let uuid = SortUuid::new();
        registry.register(&uuid, &nodes(3));

        let snapshot = registry.snapshot(&uuid).unwrap();
        assert_eq!(snapshot.len(), 3);
        for record in snapshot.values() {
            assert!(!record.aborted);
            for phase in Phase::ALL {
                assert!(!record.phase(phase).finished);
            }
        }

        assert!(registry.snapshot(&SortUuid::new()).is_none());
        assert!(registry.remove(&uuid));
        assert!(registry.snapshot(&uuid).is_none());
        assert!(!registry.remove(&uuid));
    }

    #[test]
    fn test_node_handle_touches_only_its_slot() {
        let registry = MetricsRegistry::new();
        let uuid = SortUuid::new();
        let operation = registry.register(&uuid, &nodes(2));

        let handle = NodeMetrics::new(operation.clone(), NodeId::target(1));
        handle.begin(Phase::LocalExtraction);
        handle.add(Phase::LocalExtraction, 2, 200, 2400);
        handle.warn("input-7.tar missing");
        handle.abort();

        let snapshot = registry.snapshot(&uuid).unwrap();
        let t0 = snapshot.get("t0").unwrap();
        let t1 = snapshot.get("t1").unwrap();
        assert_eq!(t0, &MetricsRecord::default());
        assert!(t1.aborted);
        assert_eq!(t1.local_extraction.records, 200);
        assert_eq!(t1.warnings.len(), 1);
    }

    #[test]
    fn test_handle_for_unknown_node_is_noop() {
        let registry = MetricsRegistry::new();
        let uuid = SortUuid::new();
        let operation = registry.register(&uuid, &nodes(1));

        let stranger = NodeMetrics::new(operation, NodeId::from("ghost"));
        assert!(!stranger.begin(Phase::LocalExtraction));
        stranger.abort();
        let snapshot = registry.snapshot(&uuid).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("ghost").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_and_readers() {
        let registry = MetricsRegistry::new();
        let uuid = SortUuid::new();
        let ids = nodes(8);
        let operation = registry.register(&uuid, &ids);

        let mut handles = Vec::new();
        for id in ids {
            let metrics = NodeMetrics::new(operation.clone(), id);
            handles.push(tokio::spawn(async move {
                for phase in Phase::ALL {
                    metrics.begin(phase);
                    for _ in 0..100 {
                        metrics.add(phase, 0, 1, 12);
                        tokio::task::yield_now().await;
                    }
                    metrics.finish(phase);
                }
            }));
        }

        let reader = {
            let registry = registry.clone();
            let uuid = uuid.clone();
            tokio::spawn(async move {
                loop {
                    let snapshot = registry.snapshot(&uuid).unwrap();
                    assert!(snapshot.values().all(MetricsRecord::phases_ordered));
                    if snapshot.all_finished() {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        for handle in handles {
            handle.await.unwrap();
        }
        reader.await.unwrap();

        let snapshot = registry.snapshot(&uuid).unwrap();
        for record in snapshot.values() {
            assert_eq!(record.shard_creation.records, 100);
            assert_eq!(record.local_extraction.bytes, 1200);
        }
    }
}
