use async_trait::async_trait;
use futures::future::join_all;
use shardplane::config::{ControlPlaneConfig, RouterConfig};
use shardplane::control_plane::ControlPlane;
use shardplane::core::{
    ConsistencyMode, NodeRole, Operation, Region, Result, ShardError, ShardMapEntry,
};
use shardplane::failover::FailoverCommand;
use shardplane::placement::PlacementRequest;
use shardplane::router::{RouteRequest, RouterCache, ShardMapSource, TopologySource};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Serves a shared topology, counting fetches and failing on demand.
struct FlakySource {
    inner: TopologySource,
    fetches: AtomicUsize,
    failing: AtomicBool,
    hanging: AtomicBool,
    delay: Duration,
}

impl FlakySource {
    fn new(control: &ControlPlane) -> Self {
        Self::with_delay(control, Duration::ZERO)
    }

    fn with_delay(control: &ControlPlane, delay: Duration) -> Self {
        Self {
            inner: TopologySource::new(control.topology.clone()),
            fetches: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            hanging: AtomicBool::new(false),
            delay,
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }
}

#[async_trait]
impl ShardMapSource for FlakySource {
    async fn fetch_shard_map(&self) -> Result<Vec<ShardMapEntry>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.hanging.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ShardError::UpstreamUnavailable(
                "control plane unreachable".to_string(),
            ));
        }
        self.inner.fetch_shard_map().await
    }
}

async fn seeded() -> ControlPlane {
    ControlPlane::bootstrap(&ControlPlaneConfig::new().seed_demo(true))
        .await
        .unwrap()
}

fn cache(source: Arc<FlakySource>, ttl: Duration) -> RouterCache {
    RouterCache::new(source, ttl, Duration::from_millis(200))
}

#[tokio::test]
async fn writes_go_to_the_primary() {
    let control = seeded().await;
    let cache = cache(Arc::new(FlakySource::new(&control)), Duration::from_secs(5));

    let decision = cache
        .route(
            RouteRequest::new("t-acme", "f-acme-ny", Operation::Write)
                .consistency(ConsistencyMode::Eventual)
                .region_hint(Region::UsWest2),
        )
        .await
        .unwrap();
    assert_eq!(decision.shard_id, "shard-a1");
    assert_eq!(decision.target_node_id, "n-a1-primary");
    assert_eq!(decision.role, NodeRole::Primary);
    assert!(decision.request_id.starts_with("req-"));
    assert!(!decision.cache_stale);
}

#[tokio::test]
async fn caller_request_id_is_echoed() {
    let control = seeded().await;
    let cache = cache(Arc::new(FlakySource::new(&control)), Duration::from_secs(5));

    let mut request = RouteRequest::new("t-globex", "f-globex-west", Operation::Read);
    request.request_id = Some("trace-42".to_string());
    let decision = cache.route(request).await.unwrap();
    assert_eq!(decision.request_id, "trace-42");
    assert_eq!(decision.shard_id, "shard-b1");
}

#[tokio::test]
async fn unknown_fleet_is_fleet_not_found() {
    let control = seeded().await;
    let cache = cache(Arc::new(FlakySource::new(&control)), Duration::from_secs(5));

    let err = cache
        .route(RouteRequest::new("t-acme", "f-missing", Operation::Read))
        .await
        .unwrap_err();
    assert_eq!(err, ShardError::FleetNotFound("f-missing".to_string()));
}

#[tokio::test]
async fn fresh_cache_hides_new_placements_until_ttl() {
    let control = seeded().await;
    let source = Arc::new(FlakySource::new(&control));
    let cache = cache(source.clone(), Duration::from_millis(150));

    cache
        .route(RouteRequest::new("t-acme", "f-acme-ny", Operation::Read))
        .await
        .unwrap();
    assert_eq!(source.fetches(), 1);

    control
        .placement
        .plan_placement(PlacementRequest::new("f-late", 10))
        .await
        .unwrap();

    let err = cache
        .route(RouteRequest::new("t-acme", "f-late", Operation::Read))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
    assert_eq!(source.fetches(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let decision = cache
        .route(RouteRequest::new("t-acme", "f-late", Operation::Read))
        .await
        .unwrap();
    assert_eq!(decision.shard_id, "shard-us-west-2-10");
    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn invalidate_forces_a_refetch() {
    let control = seeded().await;
    let source = Arc::new(FlakySource::new(&control));
    let cache = cache(source.clone(), Duration::from_secs(60));

    cache.shard_map().await.unwrap();
    cache.shard_map().await.unwrap();
    assert_eq!(source.fetches(), 1);

    cache.invalidate().await;
    cache.shard_map().await.unwrap();
    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn failed_refresh_serves_the_stale_copy() {
    let control = seeded().await;
    let source = Arc::new(FlakySource::new(&control));
    let cache = cache(source.clone(), Duration::from_millis(50));

    cache
        .route(RouteRequest::new("t-acme", "f-acme-eu", Operation::Read))
        .await
        .unwrap();

    source.set_failing(true);
    tokio::time::sleep(Duration::from_millis(80)).await;

    let decision = cache
        .route(RouteRequest::new("t-acme", "f-acme-eu", Operation::Read))
        .await
        .unwrap();
    assert!(decision.cache_stale);
    assert!(decision.cache_age_ms >= 50);
    assert_eq!(decision.shard_id, "shard-b1");
    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn cold_cache_with_unreachable_upstream_fails() {
    let control = seeded().await;
    let source = Arc::new(FlakySource::new(&control));
    source.set_failing(true);
    let cache = cache(source, Duration::from_secs(5));

    let err = cache
        .route(RouteRequest::new("t-acme", "f-acme-ny", Operation::Read))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "upstream_unavailable");
    assert!(cache.cache_age().await.is_none());
}

#[tokio::test]
async fn slow_fetch_times_out_as_upstream_unavailable() {
    let control = seeded().await;
    let source = Arc::new(FlakySource::with_delay(&control, Duration::from_millis(500)));
    let cache = RouterCache::from_config(
        source,
        &RouterConfig::new()
            .cache_ttl(Duration::from_secs(5))
            .fetch_timeout(Duration::from_millis(30)),
    );

    let err = cache.shard_map().await.unwrap_err();
    assert_eq!(err.kind(), "upstream_unavailable");
}

#[tokio::test]
async fn relaxed_reads_follow_the_region_hint() {
    let control = seeded().await;
    let cache = cache(Arc::new(FlakySource::new(&control)), Duration::from_secs(5));

    let hinted = cache
        .route(
            RouteRequest::new("t-acme", "f-acme-eu", Operation::Read)
                .consistency(ConsistencyMode::Eventual)
                .region_hint(Region::EuWest1),
        )
        .await
        .unwrap();
    assert_eq!(hinted.target_node_id, "n-b1-primary");

    let strong = cache
        .route(
            RouteRequest::new("t-acme", "f-acme-eu", Operation::Read)
                .consistency(ConsistencyMode::Strong)
                .region_hint(Region::UsEast1),
        )
        .await
        .unwrap();
    assert_eq!(strong.role, NodeRole::Primary);
}

#[tokio::test]
async fn event_watcher_invalidates_on_topology_change() {
    let control = seeded().await;
    let source = Arc::new(FlakySource::new(&control));
    let cache = Arc::new(cache(source.clone(), Duration::from_secs(60)));
    let watcher = cache.clone().watch_events(control.events.subscribe());

    cache.shard_map().await.unwrap();
    assert_eq!(source.fetches(), 1);

    control
        .failover
        .advance(
            "shard-a1",
            FailoverCommand::Declare {
                promote_region: Region::UsWest2,
            },
        )
        .await
        .unwrap();
    control
        .failover
        .advance("shard-a1", FailoverCommand::Promote)
        .await
        .unwrap();
    control
        .failover
        .advance("shard-a1", FailoverCommand::UpdateMap)
        .await
        .unwrap();

    // Let the watcher drain the broadcast channel.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let decision = cache
        .route(RouteRequest::new("t-acme", "f-acme-ny", Operation::Write))
        .await
        .unwrap();
    assert_eq!(decision.target_node_id, "n-a1-standby");
    assert_eq!(decision.region, Region::UsWest2);
    assert_eq!(source.fetches(), 2);

    watcher.abort();
}

#[tokio::test]
async fn hanging_upstream_never_queues_requests_behind_the_fetch() {
    let control = seeded().await;
    let source = Arc::new(FlakySource::new(&control));
    let cache = RouterCache::new(
        source.clone(),
        Duration::from_millis(10),
        Duration::from_millis(100),
    );
    cache.shard_map().await.unwrap();

    source.set_hanging(true);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let cache = &cache;
    let routes = join_all((0..8).map(|_| async move {
        let started = Instant::now();
        let decision = cache
            .route(RouteRequest::new("t-acme", "f-acme-ny", Operation::Read))
            .await
            .unwrap();
        (decision, started.elapsed())
    }))
    .await;

    for (decision, elapsed) in &routes {
        assert!(decision.cache_stale);
        assert!(
            *elapsed < Duration::from_millis(300),
            "route waited {elapsed:?}"
        );
    }
    assert_eq!(source.fetches(), 2);

    // Right after the failure the cache backs off instead of refetching.
    let decision = cache
        .route(RouteRequest::new("t-acme", "f-acme-ny", Operation::Read))
        .await
        .unwrap();
    assert!(decision.cache_stale);
    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn refetches_once_the_failure_backoff_expires() {
    let control = seeded().await;
    let source = Arc::new(FlakySource::new(&control));
    let cache = cache(source.clone(), Duration::from_millis(40));
    cache.shard_map().await.unwrap();

    source.set_failing(true);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(cache.shard_map().await.unwrap().stale);
    assert_eq!(source.fetches(), 2);

    source.set_failing(false);
    tokio::time::sleep(Duration::from_millis(60)).await;
    let view = cache.shard_map().await.unwrap();
    assert!(!view.stale);
    assert_eq!(source.fetches(), 3);
}
