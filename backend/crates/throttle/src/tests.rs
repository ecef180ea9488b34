//! Unit tests for the throttle crate
//!
//! Everything runs against the in-memory store with a manual clock.

#[cfg(test)]
mod support {
    use crate::application::clock::{Clock, ManualClock};
    use crate::application::evaluate::EvaluateUseCase;
    use crate::domain::entities::CounterRecord;
    use crate::domain::repository::{CounterFilter, CounterRepository, Page};
    use crate::infra::memory::InMemoryCounterRepository;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{HeaderMap, Request, StatusCode};
    use chrono::{DateTime, TimeZone, Utc};
    use std::net::IpAddr;
    use std::sync::Arc;
    use tower::ServiceExt;

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 10, 0, 0).unwrap()
    }

    pub fn ip() -> IpAddr {
        "203.0.113.9".parse().unwrap()
    }

    pub struct Engine {
        pub repo: InMemoryCounterRepository,
        pub clock: Arc<ManualClock>,
        pub use_case: Arc<EvaluateUseCase<InMemoryCounterRepository>>,
    }

    impl Engine {
        pub fn new() -> Self {
            let repo = InMemoryCounterRepository::new();
            let clock = Arc::new(ManualClock::new(t0()));
            let use_case = Arc::new(EvaluateUseCase::new(
                Arc::new(repo.clone()),
                clock.clone() as Arc<dyn Clock>,
            ));
            Self {
                repo,
                clock,
                use_case,
            }
        }

        pub fn dyn_clock(&self) -> Arc<dyn Clock> {
            self.clock.clone()
        }

        pub fn clock_now(&self) -> DateTime<Utc> {
            self.clock.now()
        }
    }

    /// The record for `identifier`, which must be the only match
    pub async fn record_of(
        repo: &InMemoryCounterRepository,
        identifier: &str,
    ) -> CounterRecord {
        let filter = CounterFilter {
            identifier: Some(identifier.to_string()),
            ..Default::default()
        };
        let (mut records, total) = repo
            .list(&filter, Page { page: 1, limit: 10 })
            .await
            .unwrap();
        assert_eq!(total, 1, "expected one record for {identifier}");
        records.remove(0)
    }

    pub async fn send(
        app: &Router,
        req: Request<Body>,
    ) -> (StatusCode, HeaderMap, serde_json::Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, headers, body)
    }
}

#[cfg(test)]
mod engine_tests {
    use super::support::*;
    use crate::application::admin::AdminUseCase;
    use crate::application::config::ThrottleConfig;
    use crate::domain::value_objects::{BlockKind, Decision, Quota};
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_quota_enforcement() {
        let engine = Engine::new();
        let quota = Quota::per_minutes(3, 10).unwrap();

        for _ in 0..3 {
            let decision = engine
                .use_case
                .execute("user-7", ip(), "checkout", &quota)
                .await
                .unwrap();
            assert!(decision.is_allowed());
        }

        let decision = engine
            .use_case
            .execute("user-7", ip(), "checkout", &quota)
            .await
            .unwrap();
        let denial = decision.denial().unwrap();
        assert_eq!(denial.kind, BlockKind::Temporary);
        assert_eq!(denial.violation_count, 1);
        assert_eq!(denial.expires_at, Some(t0() + Duration::minutes(10)));
    }

    #[tokio::test]
    async fn test_window_reset() {
        let engine = Engine::new();
        let quota = Quota::per_minutes(3, 10).unwrap();

        for _ in 0..3 {
            engine
                .use_case
                .execute("user-7", ip(), "checkout", &quota)
                .await
                .unwrap();
        }
        engine
            .clock
            .advance(Duration::minutes(10) + Duration::seconds(1));

        let decision = engine
            .use_case
            .execute("user-7", ip(), "checkout", &quota)
            .await
            .unwrap();
        assert!(decision.is_allowed());

        let record = record_of(&engine.repo, "user-7").await;
        assert_eq!(record.requests_in_window, 1);
        assert_eq!(record.window_start_at, engine.clock_now());
    }

    #[tokio::test]
    async fn test_escalation_and_sticky_permanent_block() {
        let engine = Engine::new();
        let quota = Quota::per_minutes(1, 1).unwrap();
        let blocks = [
            Some(Duration::minutes(10)),
            Some(Duration::hours(1)),
            Some(Duration::hours(6)),
            Some(Duration::days(1)),
            None,
        ];

        for (i, block) in blocks.iter().enumerate() {
            let first = engine
                .use_case
                .execute("guest-z", ip(), "search", &quota)
                .await
                .unwrap();
            assert!(first.is_allowed(), "round {i} should start allowed");

            let second = engine
                .use_case
                .execute("guest-z", ip(), "search", &quota)
                .await
                .unwrap();
            let denial = second.denial().unwrap();
            assert_eq!(denial.violation_count, i as u32 + 1);

            match block {
                Some(duration) => {
                    assert_eq!(denial.kind, BlockKind::Temporary);
                    assert_eq!(denial.expires_at, Some(engine.clock_now() + *duration));
                    engine.clock.advance(*duration + Duration::minutes(2));
                }
                None => assert_eq!(denial.kind, BlockKind::Permanent),
            }
        }

        engine.clock.advance(Duration::days(365));
        let decision = engine
            .use_case
            .execute("guest-z", ip(), "search", &quota)
            .await
            .unwrap();
        assert_eq!(decision.denial().unwrap().kind, BlockKind::Permanent);
    }

    #[tokio::test]
    async fn test_decay_makes_next_overage_a_first_offense() {
        let engine = Engine::new();
        let quota = Quota::per_minutes(1, 1).unwrap();

        engine
            .use_case
            .execute("user-3", ip(), "search", &quota)
            .await
            .unwrap();
        let denial = engine
            .use_case
            .execute("user-3", ip(), "search", &quota)
            .await
            .unwrap();
        assert_eq!(denial.denial().unwrap().violation_count, 1);

        engine.clock.advance(Duration::days(7) + Duration::minutes(1));
        assert!(
            engine
                .use_case
                .execute("user-3", ip(), "search", &quota)
                .await
                .unwrap()
                .is_allowed()
        );

        let decision = engine
            .use_case
            .execute("user-3", ip(), "search", &quota)
            .await
            .unwrap();
        let denial = decision.denial().unwrap();
        assert_eq!(denial.violation_count, 1);
        assert_eq!(
            denial.expires_at,
            Some(engine.clock_now() + Duration::minutes(10))
        );
    }

    #[tokio::test]
    async fn test_endpoints_are_counted_independently() {
        let engine = Engine::new();
        let quota = Quota::per_minutes(1, 10).unwrap();

        for endpoint in ["login", "search", "checkout"] {
            let decision = engine
                .use_case
                .execute("user-1", ip(), endpoint, &quota)
                .await
                .unwrap();
            assert!(decision.is_allowed());
        }
        assert_eq!(engine.repo.len(), 3);
    }

    #[tokio::test]
    async fn test_manual_block_then_reset() {
        let engine = Engine::new();
        let admin = AdminUseCase::new(
            Arc::new(engine.repo.clone()),
            Arc::new(ThrottleConfig::development()),
            engine.dyn_clock(),
        );
        let quota = Quota::per_minutes(2, 10).unwrap();

        engine
            .use_case
            .execute("user-8", ip(), "login", &quota)
            .await
            .unwrap();
        let id = record_of(&engine.repo, "user-8").await.id;

        admin.block(id, false).await.unwrap();
        engine.clock.advance(Duration::hours(23));
        let decision = engine
            .use_case
            .execute("user-8", ip(), "login", &quota)
            .await
            .unwrap();
        assert_eq!(decision.denial().unwrap().kind, BlockKind::Temporary);
        assert_eq!(
            decision.denial().unwrap().expires_at,
            Some(t0() + Duration::days(1))
        );

        // Block expired: normal window logic again
        engine.clock.advance(Duration::hours(1) + Duration::seconds(1));
        let decision = engine
            .use_case
            .execute("user-8", ip(), "login", &quota)
            .await
            .unwrap();
        assert!(decision.is_allowed());

        admin.block(id, true).await.unwrap();
        let reset = admin.reset(id).await.unwrap();
        assert_eq!(reset.violation_count, 0);

        // Behaves like a fresh record: full quota, then a first offense
        let Decision::Allow(allowance) = engine
            .use_case
            .execute("user-8", ip(), "login", &quota)
            .await
            .unwrap()
        else {
            panic!("reset record must allow");
        };
        assert_eq!(allowance.remaining, 1);
        engine
            .use_case
            .execute("user-8", ip(), "login", &quota)
            .await
            .unwrap();
        let decision = engine
            .use_case
            .execute("user-8", ip(), "login", &quota)
            .await
            .unwrap();
        let denial = decision.denial().unwrap();
        assert_eq!(denial.violation_count, 1);
        assert_eq!(denial.kind, BlockKind::Temporary);
    }

    #[tokio::test]
    async fn test_admin_validates_pagination_and_existence() {
        let engine = Engine::new();
        let admin = AdminUseCase::new(
            Arc::new(engine.repo.clone()),
            Arc::new(ThrottleConfig::default()),
            engine.dyn_clock(),
        );

        assert!(admin.list(Default::default(), Some(0), None).await.is_err());
        assert!(admin.list(Default::default(), None, Some(0)).await.is_err());
        assert!(admin.list(Default::default(), None, Some(101)).await.is_err());

        let page = admin.list(Default::default(), None, None).await.unwrap();
        assert_eq!((page.page, page.limit, page.total), (1, 20, 0));

        let missing = kernel::id::CounterRecordId::new();
        assert!(matches!(
            admin.unblock(missing).await,
            Err(crate::error::ThrottleError::RecordNotFound)
        ));
        assert!(engine.repo.is_empty());
    }
}

#[cfg(test)]
mod concurrency_tests {
    use super::support::*;
    use crate::domain::value_objects::Quota;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_burst_yields_exactly_one_violation() {
        const N: u32 = 32;
        let engine = Engine::new();
        let quota = Quota::per_minutes(N - 1, 10).unwrap();

        let handles: Vec<_> = (0..N)
            .map(|_| {
                let use_case = engine.use_case.clone();
                tokio::spawn(async move {
                    use_case
                        .execute("guest-burst", ip(), "checkout", &quota)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut denied = 0;
        for handle in handles {
            if !handle.await.unwrap().is_allowed() {
                denied += 1;
            }
        }
        assert_eq!(denied, 1);

        let record = record_of(&engine.repo, "guest-burst").await;
        assert_eq!(record.violation_count, 1);
        assert_eq!(record.requests_in_window, 0);
    }
}

/// Runs against a real database; `DATABASE_URL=... cargo test -- --ignored`
#[cfg(test)]
mod postgres_tests {
    use super::support::*;
    use crate::application::clock::{Clock, ManualClock};
    use crate::application::evaluate::EvaluateUseCase;
    use crate::domain::entities::CounterRecord;
    use crate::domain::repository::{CounterFilter, CounterRepository, Page};
    use crate::domain::value_objects::{BlockStatusCode, Quota};
    use crate::infra::postgres::PgCounterRepository;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    async fn repository() -> PgCounterRepository {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(&url)
            .await
            .unwrap();
        sqlx::migrate!("../../../database/migrations")
            .run(&pool)
            .await
            .unwrap();
        PgCounterRepository::new(pool)
    }

    fn unique_identifier() -> String {
        format!("guest-{}", uuid::Uuid::new_v4())
    }

    async fn list(repo: &PgCounterRepository, needle: &str) -> (Vec<CounterRecord>, u64) {
        let filter = CounterFilter {
            identifier: Some(needle.to_string()),
            ..Default::default()
        };
        repo.list(&filter, Page { page: 1, limit: 10 }).await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires DATABASE_URL"]
    async fn test_concurrent_burst_yields_exactly_one_violation() {
        const N: u32 = 32;
        let repo = Arc::new(repository().await);
        let clock = Arc::new(ManualClock::new(t0()));
        let use_case = Arc::new(EvaluateUseCase::new(
            repo.clone(),
            clock.clone() as Arc<dyn Clock>,
        ));
        let quota = Quota::per_minutes(N - 1, 10).unwrap();
        let identifier = unique_identifier();

        let handles: Vec<_> = (0..N)
            .map(|_| {
                let use_case = use_case.clone();
                let identifier = identifier.clone();
                tokio::spawn(async move {
                    use_case
                        .execute(&identifier, ip(), "checkout", &quota)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut denied = 0;
        for handle in handles {
            if !handle.await.unwrap().is_allowed() {
                denied += 1;
            }
        }
        assert_eq!(denied, 1);

        let (records, total) = list(&repo, &identifier).await;
        assert_eq!(total, 1);
        assert_eq!(records[0].violation_count, 1);
        assert_eq!(records[0].requests_in_window, 0);
        assert_eq!(records[0].block_status.code(), BlockStatusCode::Temporary);
        assert_eq!(records[0].ip, ip());

        let stats = repo.stats(clock.now()).await.unwrap();
        assert!(stats.total >= 1);
        assert!(stats.temporarily_blocked >= 1);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_list_filter_is_case_insensitive_and_literal() {
        let repo = Arc::new(repository().await);
        let use_case = EvaluateUseCase::new(
            repo.clone(),
            Arc::new(ManualClock::new(t0())) as Arc<dyn Clock>,
        );
        let quota = Quota::per_minutes(5, 10).unwrap();
        let identifier = unique_identifier();
        use_case
            .execute(&identifier, ip(), "checkout", &quota)
            .await
            .unwrap();

        let (records, total) = list(&repo, &identifier.to_uppercase()).await;
        assert_eq!(total, 1);
        assert_eq!(records[0].identifier, identifier);

        let found = repo.find_by_id(records[0].id).await.unwrap().unwrap();
        assert_eq!(found.requests_in_window, 1);

        // LIKE wildcards in the needle match literally
        let (_, total) = list(&repo, &format!("{identifier}%")).await;
        assert_eq!(total, 0);
        let (_, total) = list(&repo, &identifier.replace('-', "_")).await;
        assert_eq!(total, 0);
    }
}

#[cfg(test)]
mod guard_tests {
    use super::support::*;
    use crate::application::admin::AdminUseCase;
    use crate::application::config::ThrottleConfig;
    use crate::domain::value_objects::Quota;
    use crate::presentation::middleware::{AuthenticatedCaller, RateLimitGuardState, governed};
    use axum::Router;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode, header};
    use axum::routing::get;
    use std::net::{IpAddr, SocketAddr};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn app(engine: &Engine, quota: Quota, hits: Arc<AtomicUsize>) -> Router {
        app_with(engine, quota, hits, ThrottleConfig::development())
    }

    fn app_with(
        engine: &Engine,
        quota: Quota,
        hits: Arc<AtomicUsize>,
        config: ThrottleConfig,
    ) -> Router {
        let state = RateLimitGuardState::new(
            Arc::new(engine.repo.clone()),
            Arc::new(config),
            engine.dyn_clock(),
            "ping",
            quota,
        );
        let router = Router::new().route(
            "/ping",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "pong"
                }
            }),
        );
        governed(router, state)
    }

    /// Request arriving from `ip()` on the socket
    fn request() -> axum::http::request::Builder {
        Request::builder()
            .uri("/ping")
            .extension(ConnectInfo(SocketAddr::new(ip(), 40000)))
    }

    #[tokio::test]
    async fn test_guest_gets_token_and_keeps_identity() {
        let engine = Engine::new();
        let app = app(&engine, Quota::per_minutes(2, 10).unwrap(), Arc::default());

        let (status, headers, body) = send(&app, request().body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "pong");
        assert_eq!(headers["x-ratelimit-limit"], "2");
        assert_eq!(headers["x-ratelimit-remaining"], "1");
        assert!(headers.contains_key("x-ratelimit-reset"));

        let set_cookie = headers[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.contains("HttpOnly"));
        let pair = set_cookie.split(';').next().unwrap();
        let token = pair.strip_prefix("guest_id=").unwrap().to_string();

        // The minting request is counted against the address
        let by_ip = record_of(&engine.repo, "ip-203.0.113.9").await;
        assert_eq!(by_ip.endpoint, "ping");

        let req = request()
            .header(header::COOKIE, format!("theme=dark; guest_id={token}"))
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!headers.contains_key(header::SET_COOKIE));

        let guest_id = token.split([':', '.']).next().unwrap();
        let by_guest = record_of(&engine.repo, &format!("guest-{guest_id}")).await;
        assert_eq!(by_guest.requests_in_window, 1);
    }

    #[tokio::test]
    async fn test_cookieless_clients_share_the_address_counter() {
        let engine = Engine::new();
        let app = app(&engine, Quota::per_minutes(2, 10).unwrap(), Arc::default());

        for _ in 0..2 {
            let (status, _, _) = send(&app, request().body(Body::empty()).unwrap()).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, headers, _) = send(&app, request().body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(!headers.contains_key(header::SET_COOKIE));
    }

    #[tokio::test]
    async fn test_spoofed_forwarded_headers_are_ignored() {
        let engine = Engine::new();
        let app = app(&engine, Quota::per_minutes(2, 10).unwrap(), Arc::default());

        let mut allowed = 0;
        for i in 0..50u32 {
            let req = request()
                .header("x-forwarded-for", format!("10.0.{}.{}", i / 256, i % 256))
                .header("x-real-ip", format!("10.1.0.{i}"))
                .body(Body::empty())
                .unwrap();
            let (status, _, _) = send(&app, req).await;
            if status == StatusCode::OK {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 2);
        assert_eq!(engine.repo.len(), 1);
        let record = record_of(&engine.repo, "ip-203.0.113.9").await;
        assert_eq!(record.violation_count, 1);
    }

    #[tokio::test]
    async fn test_forwarded_address_used_behind_trusted_proxy() {
        let engine = Engine::new();
        let config = ThrottleConfig {
            trust_forwarded_headers: true,
            ..ThrottleConfig::development()
        };
        let app = app_with(&engine, Quota::per_minutes(2, 10).unwrap(), Arc::default(), config);

        let req = request()
            .header("x-forwarded-for", "198.51.100.4, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);

        let record = record_of(&engine.repo, "ip-198.51.100.4").await;
        assert_eq!(record.ip, "198.51.100.4".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_authenticated_caller_is_denied_over_quota() {
        let engine = Engine::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(&engine, Quota::per_minutes(1, 10).unwrap(), hits.clone());
        let authed = || {
            request()
                .extension(AuthenticatedCaller {
                    user_id: "42".to_string(),
                })
                .body(Body::empty())
                .unwrap()
        };

        let (status, headers, _) = send(&app, authed()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!headers.contains_key(header::SET_COOKIE));

        let (status, headers, body) = send(&app, authed()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(headers[header::RETRY_AFTER], "600");
        assert_eq!(body["blockKind"], "temporary");
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .contains("temporarily blocked")
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let record = record_of(&engine.repo, "user-42").await;
        assert_eq!(record.violation_count, 1);
        assert_eq!(record.ip, ip());
    }

    #[tokio::test]
    async fn test_permanent_block_response() {
        let engine = Engine::new();
        let app = app(&engine, Quota::per_minutes(5, 10).unwrap(), Arc::default());
        let authed = || {
            request()
                .extension(AuthenticatedCaller {
                    user_id: "9".to_string(),
                })
                .body(Body::empty())
                .unwrap()
        };

        send(&app, authed()).await;
        let id = record_of(&engine.repo, "user-9").await.id;
        AdminUseCase::new(
            Arc::new(engine.repo.clone()),
            Arc::new(ThrottleConfig::default()),
            engine.dyn_clock(),
        )
        .block(id, true)
        .await
        .unwrap();

        let (status, headers, body) = send(&app, authed()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(!headers.contains_key(header::RETRY_AFTER));
        assert_eq!(body["blockKind"], "permanent");
    }
}

#[cfg(test)]
mod admin_http_tests {
    use super::support::*;
    use crate::application::config::ThrottleConfig;
    use crate::domain::value_objects::Quota;
    use crate::presentation::router::admin_router_generic;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use kernel::id::CounterRecordId;

    async fn seeded() -> (Engine, Router) {
        let engine = Engine::new();
        let quota = Quota::per_minutes(10, 10).unwrap();
        let seeds = [("user-1", "login"), ("user-2", "login"), ("guest-x", "search")];
        for (identifier, endpoint) in seeds {
            engine
                .use_case
                .execute(identifier, ip(), endpoint, &quota)
                .await
                .unwrap();
        }
        let app = admin_router_generic(
            engine.repo.clone(),
            ThrottleConfig::development(),
            engine.dyn_clock(),
        );
        (engine, app)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_records() {
        let (_, app) = seeded().await;

        let (status, _, body) = send(&app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["page"], 1);
        assert_eq!(body["limit"], 20);
        assert_eq!(body["records"].as_array().unwrap().len(), 3);
        assert_eq!(body["records"][0]["blockStatus"], "none");
        assert_eq!(body["records"][0]["ip"], "203.0.113.9");

        let (status, _, body) = send(&app, get("/?endpoint=login&limit=1&page=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["records"].as_array().unwrap().len(), 1);

        let (_, _, body) = send(&app, get("/?identifier=GUEST")).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["records"][0]["identifier"], "guest-x");
    }

    #[tokio::test]
    async fn test_list_rejects_bad_input() {
        let (_, app) = seeded().await;

        for uri in ["/?status=blocked", "/?limit=101", "/?limit=0", "/?page=0"] {
            let (status, _, body) = send(&app, get(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["status"], 400);
        }
    }

    #[tokio::test]
    async fn test_get_record() {
        let (engine, app) = seeded().await;
        let id = record_of(&engine.repo, "user-1").await.id;

        let (status, _, body) = send(&app, get(&format!("/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["identifier"], "user-1");
        assert_eq!(body["requestsInWindow"], 1);

        let missing = get(&format!("/{}", CounterRecordId::new()));
        let (status, _, body) = send(&app, missing).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);

        let (status, _, _) = send(&app, get("/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_block_unblock_reset_and_stats() {
        let (engine, app) = seeded().await;
        let id = record_of(&engine.repo, "user-2").await.id;

        let block = post(&format!("/{id}/block"), r#"{"permanent":true}"#);
        let (status, _, body) = send(&app, block).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["blockStatus"], "permanent");
        assert_eq!(body["violationCount"], 1);
        assert_eq!(body["blockExpiresAt"], serde_json::Value::Null);

        let other = record_of(&engine.repo, "user-1").await.id;
        let (_, _, body) = send(&app, post(&format!("/{other}/block"), "{}")).await;
        assert_eq!(body["blockStatus"], "temporary");
        assert!(body["blockExpiresAt"].is_string());

        let (status, _, body) = send(&app, get("/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["temporarilyBlocked"], 1);
        assert_eq!(body["permanentlyBlocked"], 1);
        assert_eq!(body["activeBlocked"], 2);

        let (_, _, body) = send(&app, get("/?status=permanent")).await;
        assert_eq!(body["total"], 1);

        let (status, _, body) = send(&app, post(&format!("/{id}/unblock"), "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["blockStatus"], "none");
        assert_eq!(body["violationCount"], 1);
        assert_eq!(body["requestsInWindow"], 0);

        let (status, _, body) = send(&app, post(&format!("/{id}/reset"), "")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, serde_json::Value::Null);

        let (_, _, body) = send(&app, get(&format!("/{id}"))).await;
        assert_eq!(body["violationCount"], 0);
        assert_eq!(body["violationCountResetAt"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_mutations_on_missing_record() {
        let (engine, app) = seeded().await;
        let missing = CounterRecordId::new();

        let (status, _, _) = send(&app, post(&format!("/{missing}/block"), "{}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = send(&app, post(&format!("/{missing}/unblock"), "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = send(&app, post(&format!("/{missing}/reset"), "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Admin actions never create records
        assert_eq!(engine.repo.len(), 3);
    }
}

#[cfg(test)]
mod models_tests {
    use crate::domain::value_objects::{BlockKind, Denial};
    use crate::presentation::dto::*;

    #[test]
    fn test_rate_limited_response_serialization() {
        let response = RateLimitedResponse::from(Denial::permanent(5));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""blockKind":"permanent""#));
        assert!(json.contains("permanently blocked"));
        assert_eq!(response.block_kind, BlockKind::Permanent);
    }

    #[test]
    fn test_block_request_defaults_to_temporary() {
        let request: BlockRequest = serde_json::from_str("{}").unwrap();
        assert!(!request.permanent);

        let request: BlockRequest = serde_json::from_str(r#"{"permanent":true}"#).unwrap();
        assert!(request.permanent);
    }

    #[test]
    fn test_list_query_deserialization() {
        let query: ListRecordsQuery =
            serde_json::from_str(r#"{"identifier":"guest","page":2}"#).unwrap();
        assert_eq!(query.identifier.as_deref(), Some("guest"));
        assert_eq!(query.page, Some(2));
        assert!(query.limit.is_none());
        assert!(query.status.is_none());
    }
}

#[cfg(test)]
mod error_tests {
    use crate::domain::value_objects::{Decision, Denial};
    use crate::error::*;
    use axum::http::{StatusCode, header};
    use axum::response::IntoResponse;
    use chrono::{Duration, Utc};
    use kernel::error::app_error::AppError;

    #[test]
    fn test_error_into_response_status_codes() {
        let test_cases: Vec<(ThrottleError, StatusCode)> = vec![
            (
                ThrottleError::RateLimited(Denial::permanent(5)),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (ThrottleError::RecordNotFound, StatusCode::NOT_FOUND),
            (
                ThrottleError::InvalidRequest("limit".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ThrottleError::Database(sqlx::Error::PoolTimedOut),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ThrottleError::Internal("test".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected_status) in test_cases {
            assert_eq!(error.status_code(), expected_status);
            let response = error.into_response();
            assert_eq!(
                response.status(),
                expected_status,
                "Error should return correct status code"
            );
        }
    }

    #[test]
    fn test_temporary_denial_sets_retry_after() {
        let now = Utc::now();
        let denial = Denial::temporary(now + Duration::seconds(90), 1, now);
        let response = ThrottleError::RateLimited(denial).into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "90");
    }

    #[test]
    fn test_into_result() {
        let denied = Decision::Deny(Denial::permanent(6));
        assert!(matches!(
            denied.into_result(),
            Err(ThrottleError::RateLimited(_))
        ));
    }

    #[test]
    fn test_database_details_are_not_exposed() {
        let app_error = AppError::from(ThrottleError::Database(sqlx::Error::PoolTimedOut));
        assert_eq!(app_error.status_code(), 500);
        assert_eq!(app_error.message(), "Database error");

        let app_error = AppError::from(ThrottleError::RecordNotFound);
        assert_eq!(app_error.status_code(), 404);
    }

    #[tokio::test]
    async fn test_database_error_renders_problem_details() {
        let response = ThrottleError::Database(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], 500);
        assert_eq!(body["title"], "Internal Server Error");
        assert_eq!(body["detail"], "Database error");
        assert_eq!(body["action"], "Retry the request");
        assert!(!String::from_utf8_lossy(&bytes).contains("pool"));
    }
}
