// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use activity_sync::config::Config;
use activity_sync::db::{FirestoreDb, MemoryStore};
use activity_sync::models::{SyncCursor, SyncMode, TokenBundle};
use activity_sync::routes::create_router;
use activity_sync::services::gateway::http_client;
use activity_sync::services::{
    KmsService, NoTimezoneLookup, ProgressReporter, ProviderGateway, QuotaWindow,
    RateLimitGovernor, RecordTransformer, StravaApi, SyncOrchestrator, SyncReport, SyncRequest,
    TokenVault, UsageStore,
};
use activity_sync::time_utils::{format_utc_rfc3339, from_unix};
use activity_sync::AppState;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const API_PREFIX: &str = "/api/v3";
pub const USER: &str = "user-1";
pub const VALID_TOKEN: &str = "valid-access";
/// Start time of the newest fake activity (2023-11-14T22:13:20Z)
pub const NEWEST: i64 = 1_700_000_000;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Config pointing at the mock provider, with quota high enough to stay out
/// of the way unless a test narrows it.
#[allow(dead_code)]
pub fn test_config(server: &MockServer) -> Config {
    let mut config = Config::test_default();
    config.provider_api_base = format!("{}{}", server.uri(), API_PREFIX);
    config.provider_token_url = format!("{}/oauth/token", server.uri());
    config.rate_limit_windows = vec![QuotaWindow::new("short", 10_000, 15 * 60 * 1000)];
    config
}

/// A credential that is valid for the mock provider and not near expiry.
#[allow(dead_code)]
pub fn fresh_bundle() -> TokenBundle {
    bundle_with(VALID_TOKEN)
}

#[allow(dead_code)]
pub fn bundle_with(access_token: &str) -> TokenBundle {
    TokenBundle {
        access_token: access_token.to_string(),
        refresh_token: "refresh-1".to_string(),
        expires_at: chrono::Utc::now().timestamp() + 6 * 3600,
    }
}

/// Sync engine assembled by hand so tests can reach the governor.
#[allow(dead_code)]
pub struct Engine {
    pub orchestrator: SyncOrchestrator,
    pub governor: RateLimitGovernor,
    pub vault: TokenVault,
    pub store: Arc<MemoryStore>,
}

#[allow(dead_code)]
impl Engine {
    pub async fn run(&self, mode: SyncMode, cursor: Option<SyncCursor>) -> SyncReport {
        self.run_with(mode, cursor, fresh_bundle()).await
    }

    pub async fn run_with(
        &self,
        mode: SyncMode,
        cursor: Option<SyncCursor>,
        credential: TokenBundle,
    ) -> SyncReport {
        self.orchestrator
            .run(
                SyncRequest {
                    user_id: USER.to_string(),
                    mode,
                    credential,
                    cursor,
                },
                &ProgressReporter::silent(),
            )
            .await
    }
}

#[allow(dead_code)]
pub fn engine(config: &Config, store: Arc<MemoryStore>) -> Engine {
    let http = http_client().unwrap();
    let vault = TokenVault::new(http.clone(), config, Arc::new(KmsService::new_mock()));
    let governor = RateLimitGovernor::new(
        config.rate_limit_windows.clone(),
        Arc::new(UsageStore::new(config.usage_store_capacity)),
    );
    let gateway = ProviderGateway::new(
        http,
        config.provider_api_base.clone(),
        vault.clone(),
        governor.clone(),
    );
    let orchestrator = SyncOrchestrator::new(
        StravaApi::new(gateway),
        RecordTransformer::default(),
        store.clone(),
        config.sync.clone(),
    );

    Engine {
        orchestrator,
        governor,
        vault,
        store,
    }
}

/// Create a test app backed by a memory store and the mock KMS.
#[allow(dead_code)]
pub fn create_test_app(config: Config) -> (axum::Router, Arc<AppState>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(
        AppState::build(
            config,
            store.clone(),
            Arc::new(KmsService::new_mock()),
            Arc::new(NoTimezoneLookup),
        )
        .unwrap(),
    );

    (create_router(state.clone()), state, store)
}

// ─── Fake provider ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct FakeActivity {
    pub id: u64,
    pub start: i64,
    pub photo_count: u32,
}

/// `n` activities one hour apart, newest first. Every third has two photos.
#[allow(dead_code)]
pub fn activities(n: usize) -> Vec<FakeActivity> {
    (0..n)
        .map(|i| FakeActivity {
            id: 1000 + i as u64,
            start: NEWEST - (i as i64) * 3600,
            photo_count: if i % 3 == 0 { 2 } else { 0 },
        })
        .collect()
}

pub fn summary_json(activity: &FakeActivity) -> Value {
    json!({
        "id": activity.id,
        "name": format!("Activity {}", activity.id),
        "sport_type": "Run",
        "start_date": format_utc_rfc3339(from_unix(activity.start)),
        "distance": 5000.0,
        "moving_time": 1500,
        "elapsed_time": 1600,
        "total_elevation_gain": 42.0,
        "kudos_count": 1,
        "total_photo_count": activity.photo_count,
        "start_latlng": [37.7749, -122.4194],
        "end_latlng": [37.78, -122.42],
        "map": {"summary_polyline": "_p~iF~ps|U"}
    })
}

pub fn detail_json(activity: &FakeActivity) -> Value {
    let mut detail = summary_json(activity);
    detail["description"] = json!("Detailed description");
    detail["map"] = json!({
        "polyline": "_p~iF~ps|U_ulLnnqC_mqNvxq`@",
        "summary_polyline": "_p~iF~ps|U"
    });
    detail
}

fn authorized(request: &Request) -> bool {
    request
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", VALID_TOKEN))
        .unwrap_or(false)
}

fn query_map(request: &Request) -> HashMap<String, String> {
    request
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn path_id(request: &Request, segment_from_end: usize) -> Option<u64> {
    let segments: Vec<&str> = request.url.path().split('/').collect();
    segments
        .len()
        .checked_sub(1 + segment_from_end)
        .and_then(|i| segments[i].parse().ok())
}

/// Paginated list honouring `page`, `per_page`, `before` and `after`.
struct ListResponder {
    activities: Vec<FakeActivity>,
}

impl Respond for ListResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if !authorized(request) {
            return ResponseTemplate::new(401).set_body_json(json!({"message": "Authorization Error"}));
        }

        let query = query_map(request);
        let num = |key: &str| query.get(key).and_then(|v| v.parse::<i64>().ok());
        let page = num("page").unwrap_or(1).max(1) as usize;
        let per_page = num("per_page").unwrap_or(30).max(1) as usize;
        let before = num("before");
        let after = num("after");

        let matching: Vec<Value> = self
            .activities
            .iter()
            .filter(|a| before.map_or(true, |b| a.start < b))
            .filter(|a| after.map_or(true, |t| a.start > t))
            .skip((page - 1) * per_page)
            .take(per_page)
            .map(summary_json)
            .collect();

        ResponseTemplate::new(200).set_body_json(Value::Array(matching))
    }
}

struct DetailResponder {
    activities: HashMap<u64, FakeActivity>,
    failing: HashSet<u64>,
}

impl Respond for DetailResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if !authorized(request) {
            return ResponseTemplate::new(401);
        }
        match path_id(request, 0) {
            Some(id) if self.failing.contains(&id) => ResponseTemplate::new(500),
            Some(id) => match self.activities.get(&id) {
                Some(activity) => ResponseTemplate::new(200).set_body_json(detail_json(activity)),
                None => ResponseTemplate::new(404),
            },
            None => ResponseTemplate::new(404),
        }
    }
}

struct PhotosResponder {
    activities: HashMap<u64, FakeActivity>,
}

impl Respond for PhotosResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if !authorized(request) {
            return ResponseTemplate::new(401);
        }
        let Some(activity) = path_id(request, 1).and_then(|id| self.activities.get(&id)) else {
            return ResponseTemplate::new(404);
        };

        let photos: Vec<Value> = (0..activity.photo_count)
            .map(|n| {
                json!({
                    "unique_id": format!("{}-{}", activity.id, n),
                    "urls": {
                        "100": format!("https://photos.example/{}-{}/100.jpg", activity.id, n),
                        "2048": format!("https://photos.example/{}-{}/2048.jpg", activity.id, n)
                    },
                    "caption": "",
                    "location": [37.7, -122.4],
                    "created_at": format_utc_rfc3339(from_unix(activity.start + 60))
                })
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(Value::Array(photos))
    }
}

/// Mount list, detail and photo endpoints. Detail fetches for `failing`
/// ids return HTTP 500.
#[allow(dead_code)]
pub async fn mount_provider(server: &MockServer, activities: &[FakeActivity], failing: &[u64]) {
    let by_id: HashMap<u64, FakeActivity> = activities.iter().map(|a| (a.id, *a)).collect();

    Mock::given(method("GET"))
        .and(path(format!("{}/athlete/activities", API_PREFIX)))
        .respond_with(ListResponder {
            activities: activities.to_vec(),
        })
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/api/v3/activities/\d+$"))
        .respond_with(DetailResponder {
            activities: by_id.clone(),
            failing: failing.iter().copied().collect(),
        })
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/api/v3/activities/\d+/photos$"))
        .respond_with(PhotosResponder { activities: by_id })
        .mount(server)
        .await;
}

/// Mount a token endpoint that grants `access_token`.
#[allow(dead_code)]
pub async fn mount_token_grant(server: &MockServer, access_token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "access_token": access_token,
            "refresh_token": "refresh-2",
            "expires_at": chrono::Utc::now().timestamp() + 6 * 3600,
            "expires_in": 21600
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Query parameters of every list request the provider received.
#[allow(dead_code)]
pub async fn list_queries(server: &MockServer) -> Vec<HashMap<String, String>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == format!("{}/athlete/activities", API_PREFIX))
        .map(query_map)
        .collect()
}

/// Number of requests that hit any endpoint under `path_suffix`.
#[allow(dead_code)]
pub async fn request_count(server: &MockServer, predicate: impl Fn(&str) -> bool) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| predicate(r.url.path()))
        .count()
}
