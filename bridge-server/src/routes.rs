//! HTTP routes: thin translation from requests to cache operations
//!
//! Readers never trigger a rebuild and never block - they serve the last
//! committed snapshot, which may be empty before the first rebuild. Only
//! the command and commission endpoints require an established mesh
//! connection and report service-unavailable until one exists.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use bridge_state::{resolve_and_send, DeviceId, Error, SensorView};

use crate::context::AppContext;

// ==================== Request/response bodies ====================

#[derive(Debug, Deserialize)]
pub struct AliasRequest {
    pub device: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub device: String,
    pub script: String,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub device: String,
    #[serde(default)]
    pub brightness: Option<f64>,
    #[serde(default)]
    pub temperature_kelvin: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CommissionRequest {
    pub code: String,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Serialize)]
struct AliasResponse {
    device: DeviceId,
    aliases: Vec<String>,
}

#[derive(Serialize)]
struct AckResponse {
    device: DeviceId,
    ok: bool,
}

#[derive(Serialize)]
struct CommissionResponse {
    ok: bool,
}

/// Sensor reading plus the human-readable occupancy timestamp. The store
/// keeps a raw epoch second; rendering is purely a read-boundary concern.
#[derive(Serialize)]
struct SensorResponse {
    id: DeviceId,
    name: String,
    value: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_active: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_active_human: Option<String>,
}

impl From<SensorView> for SensorResponse {
    fn from(view: SensorView) -> Self {
        let last_active_human = view.last_active.map(|secs| {
            humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(secs)).to_string()
        });
        Self {
            id: view.id,
            name: view.name,
            value: view.value,
            last_active: view.last_active,
            last_active_human,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

// ==================== Rejections ====================

/// A bridge error crossing the HTTP boundary.
#[derive(Debug)]
struct ApiError(Error);

impl warp::reject::Reject for ApiError {}

/// Request was syntactically valid JSON but semantically unusable.
#[derive(Debug)]
struct BadRequest(String);

impl warp::reject::Reject for BadRequest {}

fn api_reject(err: Error) -> Rejection {
    warp::reject::custom(ApiError(err))
}

// ==================== Filter composition ====================

/// Build the full route tree over a shared context.
pub fn routes(
    ctx: Arc<AppContext>,
) -> impl Filter<Extract = (impl Reply,), Error = std::convert::Infallible> + Clone {
    let lights = warp::path!("api" / "lights")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .map(|ctx: Arc<AppContext>| warp::reply::json(&ctx.cache.light_view()));

    let devices = warp::path!("api" / "devices")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .map(|ctx: Arc<AppContext>| warp::reply::json(&ctx.cache.snapshot()));

    let sensors = warp::path!("api" / "sensors")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .map(|ctx: Arc<AppContext>| {
            let views: Vec<SensorResponse> = ctx
                .cache
                .sensor_view(&ctx.history)
                .into_iter()
                .map(SensorResponse::from)
                .collect();
            warp::reply::json(&views)
        });

    let sensor_by_id = warp::path!("api" / "sensors" / String)
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(handle_sensor_by_id);

    let alias = warp::path!("api" / "alias")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(handle_alias);

    let callback = warp::path!("api" / "callback")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(handle_callback);

    let command = warp::path!("api" / "command")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx.clone()))
        .and_then(handle_command);

    let commission = warp::path!("api" / "commission")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_ctx(ctx))
        .and_then(handle_commission);

    lights
        .or(devices)
        .or(sensors)
        .or(sensor_by_id)
        .or(alias)
        .or(callback)
        .or(command)
        .or(commission)
        .recover(handle_rejection)
}

fn with_ctx(
    ctx: Arc<AppContext>,
) -> impl Filter<Extract = (Arc<AppContext>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

// ==================== Handlers ====================

async fn handle_sensor_by_id(
    identifier: String,
    ctx: Arc<AppContext>,
) -> Result<impl Reply, Rejection> {
    let resolved = ctx.aliases.resolve(&identifier);
    let id: DeviceId = resolved
        .parse()
        .map_err(|_| api_reject(Error::NotFound(identifier.clone())))?;

    if ctx.cache.device(&id).is_none() {
        return Err(api_reject(Error::NotFound(identifier)));
    }

    let views: Vec<SensorResponse> = ctx
        .cache
        .sensor_view_for(&id, &ctx.history)
        .into_iter()
        .map(SensorResponse::from)
        .collect();
    Ok(warp::reply::json(&views))
}

async fn handle_alias(
    body: AliasRequest,
    ctx: Arc<AppContext>,
) -> Result<impl Reply, Rejection> {
    let id = parse_device(&ctx, &body.device)?;
    let aliases = ctx.aliases.assign(id, &body.name).map_err(api_reject)?;
    Ok(warp::reply::json(&AliasResponse {
        device: id,
        aliases,
    }))
}

async fn handle_callback(
    body: CallbackRequest,
    ctx: Arc<AppContext>,
) -> Result<impl Reply, Rejection> {
    let id = parse_device(&ctx, &body.device)?;
    ctx.callbacks
        .register(id, body.script.into())
        .map_err(api_reject)?;
    Ok(warp::reply::json(&AckResponse { device: id, ok: true }))
}

async fn handle_command(
    body: CommandRequest,
    ctx: Arc<AppContext>,
) -> Result<impl Reply, Rejection> {
    if body.brightness.is_none() && body.temperature_kelvin.is_none() {
        return Err(warp::reject::custom(BadRequest(
            "provide brightness and/or temperature_kelvin".to_string(),
        )));
    }
    if let Some(b) = body.brightness {
        if !(0.0..=1.0).contains(&b) {
            return Err(warp::reject::custom(BadRequest(
                "brightness must be within [0, 1]".to_string(),
            )));
        }
    }

    let device = resolve_and_send(
        ctx.client.as_ref(),
        &ctx.aliases,
        &body.device,
        body.brightness,
        body.temperature_kelvin,
    )
    .await
    .map_err(api_reject)?;

    Ok(warp::reply::json(&AckResponse { device, ok: true }))
}

async fn handle_commission(
    body: CommissionRequest,
    ctx: Arc<AppContext>,
) -> Result<impl Reply, Rejection> {
    if !ctx.client.is_connected() {
        return Err(api_reject(Error::NotReady));
    }

    let ip: Option<IpAddr> = match &body.ip {
        Some(raw) => Some(
            raw.parse()
                .map_err(|_| warp::reject::custom(BadRequest(format!("invalid ip: {raw}"))))?,
        ),
        None => None,
    };

    ctx.client
        .commission(&body.code, ip)
        .await
        .map_err(|e| api_reject(Error::from(e)))?;
    Ok(warp::reply::json(&CommissionResponse { ok: true }))
}

/// Resolve a write-endpoint device field to a canonical id.
fn parse_device(ctx: &AppContext, identifier: &str) -> Result<DeviceId, Rejection> {
    let resolved = ctx.aliases.resolve(identifier);
    resolved
        .parse()
        .map_err(|_| api_reject(Error::MalformedIdentifier(identifier.to_string())))
}

// ==================== Rejection handling ====================

/// Map rejections onto the bridge's error taxonomy.
async fn handle_rejection(err: Rejection) -> Result<impl Reply, std::convert::Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "no such route".to_string())
    } else if let Some(ApiError(e)) = err.find::<ApiError>() {
        let code = match e {
            Error::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::InvalidReference(_) | Error::MalformedIdentifier(_) => StatusCode::BAD_REQUEST,
            Error::Mesh(_) => StatusCode::BAD_GATEWAY,
            Error::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (code, e.to_string())
    } else if let Some(BadRequest(msg)) = err.find::<BadRequest>() {
        (StatusCode::BAD_REQUEST, msg.clone())
    } else if err
        .find::<warp::filters::body::BodyDeserializeError>()
        .is_some()
    {
        (StatusCode::BAD_REQUEST, "invalid request body".to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        )
    };

    let body = warp::reply::json(&ErrorBody { error: message });
    Ok(warp::reply::with_status(body, code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    use bridge_state::{ActionExecutor, IngestContext};
    use matter_client::{DeviceCommand, EndpointId, MeshClient, Node, NodeId};

    struct FakeMesh {
        connected: AtomicBool,
        nodes: parking_lot::Mutex<Vec<Node>>,
        commands: parking_lot::Mutex<Vec<(NodeId, EndpointId, DeviceCommand)>>,
    }

    impl FakeMesh {
        fn new() -> Self {
            Self {
                connected: AtomicBool::new(true),
                nodes: parking_lot::Mutex::new(Vec::new()),
                commands: parking_lot::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MeshClient for FakeMesh {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn nodes(&self) -> Vec<Node> {
            self.nodes.lock().clone()
        }

        async fn send_device_command(
            &self,
            node: NodeId,
            endpoint: EndpointId,
            command: DeviceCommand,
        ) -> matter_client::Result<()> {
            self.commands.lock().push((node, endpoint, command));
            Ok(())
        }

        async fn commission(
            &self,
            _code: &str,
            _ip: Option<std::net::IpAddr>,
        ) -> matter_client::Result<()> {
            Ok(())
        }
    }

    struct NullExecutor;

    #[async_trait]
    impl ActionExecutor for NullExecutor {
        async fn execute(
            &self,
            _action: &std::path::Path,
            _device: DeviceId,
        ) -> Result<(), String> {
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        mesh: Arc<FakeMesh>,
        ctx: Arc<AppContext>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mesh = Arc::new(FakeMesh::new());
        let ctx = Arc::new(AppContext::hydrate(
            dir.path(),
            mesh.clone(),
            Arc::new(NullExecutor),
        ));
        Fixture {
            _dir: dir,
            mesh,
            ctx,
        }
    }

    /// Seed the mesh with a dimmable light and an occupancy sensor, then
    /// rebuild so the cache has a committed snapshot.
    fn seed(f: &Fixture) {
        let mut node = Node::new(1);
        node.set_attribute_path("1/6/0", json!(true));
        node.set_attribute_path("1/8/0", json!(127));
        node.set_attribute_path("2/1030/0", json!(1));
        f.mesh.nodes.lock().push(node);
        f.ctx
            .cache
            .rebuild(f.ctx.client.as_ref(), &f.ctx.history);
    }

    #[tokio::test]
    async fn test_lights_view() {
        let f = fixture();
        seed(&f);

        let resp = warp::test::request()
            .method("GET")
            .path("/api/lights")
            .reply(&routes(f.ctx.clone()))
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body[0]["id"], "node1-ep1");
        assert_eq!(body[0]["state"], true);
        assert_eq!(body[0]["brightness"], 0.5);
    }

    #[tokio::test]
    async fn test_lights_empty_before_first_rebuild() {
        let f = fixture();
        let resp = warp::test::request()
            .method("GET")
            .path("/api/lights")
            .reply(&routes(f.ctx.clone()))
            .await;

        // Never an error for "not yet populated".
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.body(), "[]");
    }

    #[tokio::test]
    async fn test_sensor_by_alias() {
        let f = fixture();
        seed(&f);
        f.ctx
            .aliases
            .assign("node1-ep2".parse().unwrap(), "hallway")
            .unwrap();

        let resp = warp::test::request()
            .method("GET")
            .path("/api/sensors/hallway")
            .reply(&routes(f.ctx.clone()))
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body[0]["name"], "occupancy");
        assert_eq!(body[0]["value"], 1);
        assert!(body[0]["last_active_human"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_sensor_is_404() {
        let f = fixture();
        let resp = warp::test::request()
            .method("GET")
            .path("/api/sensors/nowhere")
            .reply(&routes(f.ctx.clone()))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_alias_conflict_is_409() {
        let f = fixture();
        let filter = routes(f.ctx.clone());

        let resp = warp::test::request()
            .method("POST")
            .path("/api/alias")
            .json(&json!({"device": "node1-ep1", "name": "kitchen"}))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/alias")
            .json(&json!({"device": "node2-ep1", "name": "kitchen"}))
            .reply(&filter)
            .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        // The original owner is untouched.
        assert_eq!(f.ctx.aliases.resolve("kitchen"), "node1-ep1");
    }

    #[tokio::test]
    async fn test_alias_malformed_device_is_400() {
        let f = fixture();
        let resp = warp::test::request()
            .method("POST")
            .path("/api/alias")
            .json(&json!({"device": "not-an-id", "name": "kitchen"}))
            .reply(&routes(f.ctx.clone()))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_callback_invalid_reference_is_400() {
        let f = fixture();
        let resp = warp::test::request()
            .method("POST")
            .path("/api/callback")
            .json(&json!({"device": "node1-ep1", "script": "/does/not/exist.sh"}))
            .reply(&routes(f.ctx.clone()))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_callback_registration() {
        let f = fixture();
        let script = f._dir.path().join("notify.sh");
        std::fs::write(&script, "").unwrap();

        let resp = warp::test::request()
            .method("POST")
            .path("/api/callback")
            .json(&json!({"device": "node1-ep1", "script": script.to_str().unwrap()}))
            .reply(&routes(f.ctx.clone()))
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            f.ctx.callbacks.lookup(&"node1-ep1".parse().unwrap()),
            Some(script)
        );
    }

    #[tokio::test]
    async fn test_command_translates_brightness() {
        let f = fixture();
        let resp = warp::test::request()
            .method("POST")
            .path("/api/command")
            .json(&json!({"device": "node1-ep1", "brightness": 0.4}))
            .reply(&routes(f.ctx.clone()))
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let commands = f.mesh.commands.lock();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0], (1, 1, DeviceCommand::MoveToLevel { level: 102 }));
    }

    #[tokio::test]
    async fn test_command_not_ready_is_503() {
        let f = fixture();
        f.mesh.connected.store(false, Ordering::SeqCst);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/command")
            .json(&json!({"device": "node1-ep1", "brightness": 1.0}))
            .reply(&routes(f.ctx.clone()))
            .await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_command_requires_some_parameter() {
        let f = fixture();
        let resp = warp::test::request()
            .method("POST")
            .path("/api/command")
            .json(&json!({"device": "node1-ep1"}))
            .reply(&routes(f.ctx.clone()))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_commission_not_ready_is_503() {
        let f = fixture();
        f.mesh.connected.store(false, Ordering::SeqCst);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/commission")
            .json(&json!({"code": "MT:XYZ"}))
            .reply(&routes(f.ctx.clone()))
            .await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_commission_bad_ip_is_400() {
        let f = fixture();
        let resp = warp::test::request()
            .method("POST")
            .path("/api/commission")
            .json(&json!({"code": "MT:XYZ", "ip": "not-an-ip"}))
            .reply(&routes(f.ctx.clone()))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ingest_context_wiring() {
        // The context must hand the ingestion loop the same collaborators
        // the handlers use, or edges and reads would diverge.
        let f = fixture();
        seed(&f);
        let ingest: IngestContext = f.ctx.ingest_context();
        assert!(Arc::ptr_eq(&ingest.cache, &f.ctx.cache));
        assert!(Arc::ptr_eq(&ingest.history, &f.ctx.history));
    }
}
