use crate::error::{ProxyError, Result};
use crate::nodes::NodeRegistry;
use crate::user_manager::{User, UserManager};
use axum::{
    Router,
    body::Bytes,
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};
use traffic::{TrafficManager, Usage};

#[derive(Clone)]
pub struct AppState {
    pub nodes: Arc<NodeRegistry>,
    pub users: Arc<UserManager>,
    pub traffic: Arc<TrafficManager>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserObject {
    username: String,
    #[serde(rename = "uPSK", skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    downlink_bytes: u64,
    uplink_bytes: u64,
}

impl UserObject {
    fn new(user: User, usage: Usage) -> Self {
        Self {
            username: user.username,
            password: Some(user.secret).filter(|secret| !secret.is_empty()),
            downlink_bytes: usage.downlink,
            uplink_bytes: usage.uplink,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddUserRequest {
    username: String,
    #[serde(rename = "uPSK", default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct UpdateUserRequest {
    #[serde(rename = "uPSK", default)]
    password: String,
}

#[derive(Debug, Serialize)]
struct NodesResponse {
    protocols: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tunnel: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct UsersResponse {
    users: Vec<UserObject>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DataUsageResponse {
    downlink_bytes: u64,
    uplink_bytes: u64,
    users: Vec<UserObject>,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::InvalidRequest(_)
            | ProxyError::InvalidUser(_)
            | ProxyError::UserExists(_) => StatusCode::BAD_REQUEST,
            ProxyError::UserNotFound(_) | ProxyError::NodeNotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ProxyError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ProxyError::Io(_) | ProxyError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/info", get(get_server_info))
        .route("/nodes", get(get_nodes).post(add_node))
        .route(
            "/nodes/{id}",
            get(get_node).put(update_node).delete(delete_node),
        )
        .route("/users", get(get_users).post(add_user))
        .route(
            "/users/{username}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/stats/data-usage", get(get_data_usage))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Pairs every user with its traffic totals, read in one pass.
fn users_with_usage(state: &AppState) -> Vec<UserObject> {
    let users = state.users.list();
    let names: Vec<&str> = users.iter().map(|user| user.username.as_str()).collect();
    let usage = state.traffic.read_users(&names);
    users
        .into_iter()
        .zip(usage)
        .map(|(user, usage)| UserObject::new(user, usage))
        .collect()
}

/// Decodes a JSON body regardless of its Content-Type; every decode
/// failure is a bad request.
fn decode_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| ProxyError::InvalidRequest(e.to_string()))
}

async fn get_server_info() -> String {
    format!("traffic-proxy/{}", env!("CARGO_PKG_VERSION"))
}

async fn get_nodes(State(state): State<AppState>) -> Json<NodesResponse> {
    let protocols = state
        .nodes
        .protocols()
        .into_iter()
        .map(|protocol| protocol.to_string())
        .collect();
    let tunnel = state.nodes.iter().map(|node| node.descriptor()).collect();
    Json(NodesResponse { protocols, tunnel })
}

async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Map<String, Value>>> {
    let node = state
        .nodes
        .get(&id)
        .ok_or_else(|| ProxyError::NodeNotFound(id.clone()))?;
    let mut object = Map::new();
    object.insert(node.protocol.to_string(), node.descriptor());
    Ok(Json(object))
}

async fn add_node() -> ProxyError {
    ProxyError::NotImplemented("node creation")
}

async fn update_node() -> ProxyError {
    ProxyError::NotImplemented("node update")
}

async fn delete_node() -> ProxyError {
    ProxyError::NotImplemented("node deletion")
}

async fn get_users(State(state): State<AppState>) -> Json<UsersResponse> {
    Json(UsersResponse {
        users: users_with_usage(&state),
    })
}

#[instrument(skip_all)]
async fn add_user(State(state): State<AppState>, body: Bytes) -> Result<StatusCode> {
    let request: AddUserRequest = decode_body(&body)?;
    state.users.add(&request.username, &request.password)?;
    Ok(StatusCode::CREATED)
}

async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserObject>> {
    let secret = state
        .users
        .get(&username)
        .ok_or_else(|| ProxyError::UserNotFound(username.clone()))?;
    let usage = state.traffic.read_user(&username);
    Ok(Json(UserObject::new(User { username, secret }, usage)))
}

#[instrument(skip_all, fields(username = %username))]
async fn update_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    body: Bytes,
) -> Result<StatusCode> {
    let request: UpdateUserRequest = decode_body(&body)?;
    state.users.update(&username, &request.password)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all, fields(username = %username))]
async fn delete_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<StatusCode> {
    state.users.delete(&username)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_data_usage(State(state): State<AppState>) -> Json<DataUsageResponse> {
    let users = users_with_usage(&state)
        .into_iter()
        .map(|user| UserObject {
            password: None,
            ..user
        })
        .collect();
    let global = state.traffic.read_global();
    Json(DataUsageResponse {
        downlink_bytes: global.downlink,
        uplink_bytes: global.uplink,
        users,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NodeNetwork, NodeProtocol, UserConfig};
    use crate::nodes::Node;
    use axum::body::Body;
    use axum::http::{Method, Request, header};
    use http_body_util::BodyExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    use tower::ServiceExt;
    use traffic::InboundMetadata;

    fn state() -> AppState {
        let nodes = NodeRegistry::new(vec![Node {
            tag: "in-ss".to_string(),
            protocol: NodeProtocol::Tunnel,
            network: NodeNetwork::Tcp,
            listen: "127.0.0.1:8388".parse().unwrap(),
            forward: "127.0.0.1:5201".to_string(),
        }]);
        let traffic = Arc::new(TrafficManager::new(nodes.tags()));
        let users = UserManager::new(
            &[UserConfig {
                username: "alice".to_string(),
                secret: "alice-psk".to_string(),
            }],
            traffic.clone(),
        );
        AppState {
            nodes: Arc::new(nodes),
            users: Arc::new(users),
            traffic,
        }
    }

    async fn send(
        state: &AppState,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn get_json(state: &AppState, uri: &str) -> (StatusCode, Value) {
        let (status, body) = send(state, Method::GET, uri, None).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn simulate_traffic(state: &AppState, user: &str, up: usize, down: usize) {
        let metadata = InboundMetadata::new("in-ss", Some(user.to_string()));
        let (mut client, server) = duplex(4096);
        let mut conn = state.traffic.route_connection(&metadata, server);
        client.write_all(&vec![0u8; up]).await.unwrap();
        conn.read_exact(&mut vec![0u8; up]).await.unwrap();
        conn.write_all(&vec![0u8; down]).await.unwrap();
        client.read_exact(&mut vec![0u8; down]).await.unwrap();
    }

    #[tokio::test]
    async fn info_reports_version() {
        let (status, body) = send(&state(), Method::GET, "/info", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().starts_with("traffic-proxy/"));
    }

    #[tokio::test]
    async fn lists_and_gets_nodes() {
        let state = state();
        let (status, body) = get_json(&state, "/nodes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["protocols"], serde_json::json!(["tunnel"]));
        assert_eq!(body["tunnel"][0]["tag"], "in-ss");

        let (status, body) = get_json(&state, "/nodes/in-ss").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tunnel"]["forward"], "127.0.0.1:5201");

        let (status, _) = get_json(&state, "/nodes/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn node_mutation_is_not_implemented() {
        let state = state();
        let (status, _) = send(&state, Method::POST, "/nodes", None).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        let (status, _) = send(&state, Method::PUT, "/nodes/in-ss", None).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        let (status, _) = send(&state, Method::DELETE, "/nodes/in-ss", None).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn user_traffic_is_reported() {
        let state = state();
        simulate_traffic(&state, "alice", 50, 100).await;

        let (status, body) = get_json(&state, "/users/alice").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");
        assert_eq!(body["uPSK"], "alice-psk");
        assert_eq!(body["uplinkBytes"], 50);
        assert_eq!(body["downlinkBytes"], 100);

        let (status, _) = get_json(&state, "/users/nobody").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn user_lifecycle() {
        let state = state();
        let (status, _) = send(
            &state,
            Method::POST,
            "/users",
            Some(serde_json::json!({"username": "bob", "uPSK": "bob-psk"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(state.traffic.is_user_metered("bob"));

        let (status, _) = send(
            &state,
            Method::POST,
            "/users",
            Some(serde_json::json!({"username": "bob", "uPSK": "again"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &state,
            Method::PUT,
            "/users/bob",
            Some(serde_json::json!({"uPSK": "rotated"})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, body) = get_json(&state, "/users/bob").await;
        assert_eq!(body["uPSK"], "rotated");
        assert_eq!(body["uplinkBytes"], 0);

        let (status, _) = send(
            &state,
            Method::PUT,
            "/users/carol",
            Some(serde_json::json!({"uPSK": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&state, Method::DELETE, "/users/bob", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!state.traffic.is_user_metered("bob"));
        let (status, _) = send(&state, Method::DELETE, "/users/bob", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    async fn send_raw(
        state: &AppState,
        method: Method,
        uri: &str,
        content_type: Option<&str>,
        body: &'static str,
    ) -> StatusCode {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let request = builder.body(Body::from(body)).unwrap();
        router(state.clone()).oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn undecodable_bodies_are_bad_requests() {
        let state = state();
        let json = Some("application/json");

        let status = send_raw(&state, Method::POST, "/users", json, r#"{"uPSK":"x"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let status = send_raw(
            &state,
            Method::POST,
            "/users",
            json,
            r#"{"username":42,"uPSK":"x"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let status = send_raw(&state, Method::POST, "/users", json, "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let status = send_raw(&state, Method::PUT, "/users/alice", json, r#"{"uPSK":7}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.users.authenticate("alice", "alice-psk"));
        assert_eq!(state.users.list().len(), 1);
    }

    #[tokio::test]
    async fn content_type_is_not_required() {
        let state = state();
        let status = send_raw(
            &state,
            Method::POST,
            "/users",
            None,
            r#"{"username":"bob","uPSK":"bob-psk"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let status = send_raw(&state, Method::PUT, "/users/alice", None, r#"{"uPSK":"new"}"#).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.users.authenticate("alice", "new"));
        assert!(state.users.authenticate("bob", "bob-psk"));
    }

    #[tokio::test]
    async fn data_usage_reports_totals_without_secrets() {
        let state = state();
        state.users.add("bob", "bob-psk").unwrap();
        simulate_traffic(&state, "alice", 50, 100).await;
        simulate_traffic(&state, "mallory", 30, 40).await;

        let (status, body) = get_json(&state, "/stats/data-usage").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["uplinkBytes"], 80);
        assert_eq!(body["downlinkBytes"], 140);

        let users = body["users"].as_array().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0]["username"], "alice");
        assert_eq!(users[0]["uplinkBytes"], 50);
        assert!(users[0].get("uPSK").is_none());
        assert_eq!(users[1]["username"], "bob");
        assert_eq!(users[1]["downlinkBytes"], 0);

        let (_, body) = get_json(&state, "/users").await;
        assert_eq!(body["users"][0]["uPSK"], "alice-psk");
        assert_eq!(body["users"].as_array().unwrap().len(), 2);
    }
}
