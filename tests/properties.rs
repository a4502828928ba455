//! Accounting invariants under randomized admit/release/gossip
//! interleavings, checked through the introspection views:
//!
//! - per-host admitted memory always equals the sum over running queries
//!   touching that host;
//! - running/queued counts never go negative;
//! - releasing everything returns every eager counter to baseline.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{outcome, request, TestCoordinator, GIB};
use proptest::prelude::*;
use querygate::{QueryRequest, StatsTopicDelta};

const POOLS: [&str; 2] = ["alpha", "beta"];
const HOSTS: usize = 4;

#[derive(Clone, Debug)]
struct AdmitOp {
    pool: usize,
    hosts: usize,
    mem_gib: i64,
}

fn admit_ops() -> impl Strategy<Value = Vec<AdmitOp>> {
    prop::collection::vec(
        (0..POOLS.len(), 1..=HOSTS, 1i64..8).prop_map(|(pool, hosts, mem_gib)| AdmitOp {
            pool,
            hosts,
            mem_gib,
        }),
        1..12,
    )
}

/// Expected per-host admitted bytes, recomputed from the still-running
/// set.
fn expected_hosts(running: &[(Arc<QueryRequest>, i64)]) -> HashMap<String, i64> {
    let mut hosts: HashMap<String, i64> = HashMap::new();
    for (req, per_host) in running {
        for executor in &req.executors {
            *hosts.entry(executor.id.clone()).or_default() += per_host;
        }
    }
    hosts.retain(|_, v| *v > 0);
    hosts
}

async fn assert_invariants(
    coord: &TestCoordinator,
    running: &[(Arc<QueryRequest>, i64)],
) {
    let hosts_json = coord.controller.host_mem_to_json().await;
    let hosts_json = hosts_json.as_object().expect("host map is an object");
    let expected = expected_hosts(running);

    for (host, bytes) in &expected {
        let actual = hosts_json
            .get(host)
            .and_then(|entry| entry["mem_admitted"].as_i64())
            .unwrap_or(0);
        assert_eq!(actual, *bytes, "host {host} admitted mismatch");
    }
    for (host, entry) in hosts_json {
        let actual = entry["mem_admitted"].as_i64().unwrap_or(0);
        assert_eq!(
            actual,
            expected.get(host).copied().unwrap_or(0),
            "host {host} has stray admitted memory"
        );
    }

    for pool in POOLS {
        if let Some(json) = coord.controller.pool_to_json(pool).await {
            assert!(json["agg_num_running"].as_i64().unwrap() >= 0);
            assert!(json["agg_num_queued"].as_i64().unwrap() >= 0);
            // Pool-level admitted memory equals the sum over its running
            // queries.
            let expected_pool: i64 = running
                .iter()
                .filter(|(req, _)| req.pool_name == pool)
                .map(|(req, per_host)| per_host * req.executors.len() as i64)
                .sum();
            assert_eq!(json["local_mem_admitted"].as_i64().unwrap(), expected_pool);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn accounting_survives_random_admit_release_gossip(
        ops in admit_ops(),
        release_order in prop::collection::vec(any::<prop::sample::Index>(), 0..12),
        gossip_every in 1usize..4,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        rt.block_on(async move {
            let coord = TestCoordinator::start(
                "coord1:21000",
                POOLS[0],
                querygate::PoolConfig::default(),
            );
            coord.resolver.set_pool(POOLS[1], querygate::PoolConfig::default());

            let mut running: Vec<(Arc<QueryRequest>, i64)> = Vec::new();
            for (i, op) in ops.iter().enumerate() {
                let req = request(
                    &format!("q{i}"),
                    POOLS[op.pool],
                    op.hosts,
                    op.mem_gib * GIB,
                    0,
                );
                let grant = coord
                    .controller
                    .submit_for_admission(Arc::clone(&req), outcome())
                    .await
                    .expect("unlimited pool admits everything");
                running.push((req, grant.per_backend_mem_to_admit));

                if i % gossip_every == 0 {
                    coord
                        .controller
                        .process_topic_delta(&StatsTopicDelta::default())
                        .await;
                }
                assert_invariants(&coord, &running).await;
            }

            for index in release_order {
                if running.is_empty() {
                    break;
                }
                let (req, _) = running.remove(index.index(running.len()));
                coord.controller.release_query(&req, GIB).await;
                assert_invariants(&coord, &running).await;
            }
            // Drain whatever the random order left behind.
            while let Some((req, _)) = running.pop() {
                coord.controller.release_query(&req, GIB).await;
            }
            assert_invariants(&coord, &running).await;

            for pool in POOLS {
                if let Some(json) = coord.controller.pool_to_json(pool).await {
                    assert_eq!(json["agg_num_running"].as_i64().unwrap(), 0);
                    assert_eq!(json["local_mem_admitted"].as_i64().unwrap(), 0);
                }
            }
        });
    }
}
