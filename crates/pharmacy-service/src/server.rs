//! HTTP server for the pharmacy API.
//!
//! Routes are thin: they authenticate the bearer token, call into the
//! engine's handlers and map failures to [`APIError`].

use axum::{
	extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State},
	http::{header, request::Parts, HeaderValue, StatusCode},
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use pharmacy_config::{ApiConfig, CorsConfig};
use pharmacy_core::PharmacyEngine;
use pharmacy_types::{
	APIError, AccountResponse, CredentialsRequest, OrderRow, PrescriptionLinkResponse, Product,
	Session, SessionResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<PharmacyEngine>,
}

/// The session behind a request's `Authorization: Bearer` token.
pub struct AuthSession(pub Session);

impl FromRequestParts<AppState> for AuthSession {
	type Rejection = APIError;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
		let token = bearer_token(parts)?;
		match state.engine.auth().current_session(token).await {
			Ok(Some(session)) => Ok(AuthSession(session)),
			Ok(None) => Err(APIError::unauthorized("Session expired or unknown")),
			Err(e) => Err(crate::apis::auth_error(e)),
		}
	}
}

/// The raw bearer token, for sign-out.
pub struct BearerToken(pub String);

impl FromRequestParts<AppState> for BearerToken {
	type Rejection = APIError;

	async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
		bearer_token(parts).map(|token| BearerToken(token.to_string()))
	}
}

fn bearer_token(parts: &Parts) -> Result<&str, APIError> {
	let value = parts
		.headers
		.get(header::AUTHORIZATION)
		.ok_or_else(|| APIError::unauthorized("Missing Authorization header"))?;
	value
		.to_str()
		.ok()
		.and_then(|v| v.strip_prefix("Bearer "))
		.map(str::trim)
		.filter(|token| !token.is_empty())
		.ok_or_else(|| APIError::unauthorized("Expected a bearer token"))
}

pub fn router(state: AppState, api_config: &ApiConfig) -> Router {
	let api = Router::new()
		.route("/auth/signup", post(handle_sign_up))
		.route("/auth/signin", post(handle_sign_in))
		.route("/auth/signout", post(handle_sign_out))
		.route("/auth/session", get(handle_session))
		.route("/products", get(handle_products))
		.route("/orders", get(handle_list_orders).post(handle_create_order))
		.route("/orders/{id}", get(handle_get_order))
		.route("/orders/{id}/prescription", get(handle_prescription_link))
		.route("/staff/orders", get(handle_staff_orders))
		.route("/staff/orders/{id}/actions/{action}", post(handle_staff_action));

	Router::new()
		.nest("/api", api)
		.route("/media/{bucket}/{*key}", get(handle_media))
		.route("/health", get(handle_health))
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(cors_layer(api_config.cors.as_ref()))
				.layer(TimeoutLayer::new(Duration::from_secs(api_config.timeout_seconds)))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(state)
}

fn cors_layer(cors: Option<&CorsConfig>) -> CorsLayer {
	let Some(cors) = cors else {
		return CorsLayer::permissive();
	};
	let origins: Vec<HeaderValue> = cors
		.allowed_origins
		.iter()
		.filter_map(|origin| match origin.parse() {
			Ok(value) => Some(value),
			Err(_) => {
				tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
				None
			},
		})
		.collect();
	CorsLayer::new()
		.allow_origin(origins)
		.allow_methods(Any)
		.allow_headers(Any)
}

pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<PharmacyEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(AppState { engine }, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Pharmacy API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

async fn handle_health() -> Json<serde_json::Value> {
	Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_sign_up(
	State(state): State<AppState>,
	Json(request): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), APIError> {
	let account = crate::apis::auth::sign_up(&state.engine, request).await?;
	Ok((StatusCode::CREATED, Json(account)))
}

async fn handle_sign_in(
	State(state): State<AppState>,
	Json(request): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>, APIError> {
	crate::apis::auth::sign_in(&state.engine, request).await.map(Json)
}

async fn handle_sign_out(
	State(state): State<AppState>,
	BearerToken(token): BearerToken,
) -> Result<StatusCode, APIError> {
	crate::apis::auth::sign_out(&state.engine, &token).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn handle_session(AuthSession(session): AuthSession) -> Json<SessionResponse> {
	Json(session.into())
}

async fn handle_products(State(state): State<AppState>) -> Json<Vec<Product>> {
	Json(state.engine.catalog().list_products().await)
}

async fn handle_list_orders(
	State(state): State<AppState>,
	AuthSession(session): AuthSession,
) -> Result<Json<Vec<OrderRow>>, APIError> {
	crate::apis::orders::list_own(&state.engine, &session).await.map(Json)
}

async fn handle_create_order(
	State(state): State<AppState>,
	AuthSession(session): AuthSession,
	multipart: Multipart,
) -> Result<(StatusCode, Json<OrderRow>), APIError> {
	match crate::apis::orders::create(&state.engine, &session, multipart).await {
		Ok(row) => Ok((StatusCode::CREATED, Json(row))),
		Err(e) => {
			tracing::warn!("Order submission failed: {}", e);
			Err(e)
		},
	}
}

async fn handle_get_order(
	State(state): State<AppState>,
	AuthSession(session): AuthSession,
	Path(id): Path<String>,
) -> Result<Json<OrderRow>, APIError> {
	crate::apis::orders::get(&state.engine, &session, &id).await.map(Json)
}

async fn handle_prescription_link(
	State(state): State<AppState>,
	AuthSession(session): AuthSession,
	Path(id): Path<String>,
) -> Result<Json<PrescriptionLinkResponse>, APIError> {
	crate::apis::orders::prescription_link(&state.engine, &session, &id)
		.await
		.map(Json)
}

async fn handle_staff_orders(
	State(state): State<AppState>,
	AuthSession(session): AuthSession,
) -> Result<Json<Vec<OrderRow>>, APIError> {
	crate::apis::staff::list_all(&state.engine, &session).await.map(Json)
}

async fn handle_staff_action(
	State(state): State<AppState>,
	AuthSession(session): AuthSession,
	Path((id, action)): Path<(String, String)>,
) -> Result<Json<OrderRow>, APIError> {
	match crate::apis::staff::apply_action(&state.engine, &session, &id, &action).await {
		Ok(row) => Ok(Json(row)),
		Err(e) => {
			tracing::warn!("Staff action failed: {}", e);
			Err(e)
		},
	}
}

#[derive(Debug, Deserialize)]
struct SignedQuery {
	expires: u64,
	signature: String,
}

async fn handle_media(
	State(state): State<AppState>,
	Path((bucket, key)): Path<(String, String)>,
	Query(query): Query<SignedQuery>,
) -> Result<Response, APIError> {
	let object =
		crate::apis::media::fetch_signed(&state.engine, &bucket, &key, query.expires, &query.signature)
			.await?;
	Ok(([(header::CONTENT_TYPE, object.content_type)], object.bytes).into_response())
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::Request;
	use pharmacy_config::builders::ConfigBuilder;
	use pharmacy_config::ProductSeed;
	use pharmacy_core::{PharmacyBuilder, PharmacyFactories};
	use serde_json::{json, Value};
	use tower::ServiceExt;

	const BOUNDARY: &str = "XPHARMACYBOUNDARY";

	async fn test_app() -> Router {
		let config = ConfigBuilder::new()
			.product(ProductSeed {
				id: "p1".into(),
				name: "Aspirin".into(),
				description: String::new(),
				price: "4.20".parse().unwrap(),
				image_ref: None,
				requires_prescription: false,
			})
			.build();
		let factories = PharmacyFactories {
			storage_factories: pharmacy_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			auth_factories: pharmacy_auth::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			media_factories: pharmacy_media::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		};
		let engine = PharmacyBuilder::new(config).build(factories).unwrap();
		engine.initialize().await.unwrap();

		let api_config = ApiConfig {
			enabled: true,
			host: "127.0.0.1".into(),
			port: 0,
			timeout_seconds: 30,
			max_request_size: 2 * 1024 * 1024,
			cors: None,
		};
		router(
			AppState {
				engine: Arc::new(engine),
			},
			&api_config,
		)
	}

	async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
		let response = app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let body = if bytes.is_empty() {
			Value::Null
		} else {
			serde_json::from_slice(&bytes).unwrap_or(Value::Null)
		};
		(status, body)
	}

	fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
		let mut builder = Request::builder()
			.method(method)
			.uri(uri)
			.header(header::CONTENT_TYPE, "application/json");
		if let Some(token) = token {
			builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
		}
		builder.body(Body::from(body.to_string())).unwrap()
	}

	fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
		let mut builder = Request::builder().uri(uri);
		if let Some(token) = token {
			builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
		}
		builder.body(Body::empty()).unwrap()
	}

	async fn sign_in(app: &Router, email: &str) -> String {
		let credentials = json!({ "email": email, "password": "secret-pw" });
		let (status, _) = send(app, json_request("POST", "/api/auth/signup", None, credentials.clone())).await;
		assert_eq!(status, StatusCode::CREATED);
		let (status, body) = send(app, json_request("POST", "/api/auth/signin", None, credentials)).await;
		assert_eq!(status, StatusCode::OK);
		body["token"].as_str().unwrap().to_string()
	}

	fn order_form(token: &str, file: Option<(&str, &str, &[u8])>, notes: &str) -> Request<Body> {
		let mut body = Vec::new();
		if let Some((name, content_type, bytes)) = file {
			body.extend_from_slice(
				format!(
					"--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: {content_type}\r\n\r\n"
				)
				.as_bytes(),
			);
			body.extend_from_slice(bytes);
			body.extend_from_slice(b"\r\n");
		}
		body.extend_from_slice(
			format!(
				"--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"notes\"\r\n\r\n{notes}\r\n--{BOUNDARY}--\r\n"
			)
			.as_bytes(),
		);

		Request::builder()
			.method("POST")
			.uri("/api/orders")
			.header(header::AUTHORIZATION, format!("Bearer {}", token))
			.header(
				header::CONTENT_TYPE,
				format!("multipart/form-data; boundary={}", BOUNDARY),
			)
			.body(Body::from(body))
			.unwrap()
	}

	#[tokio::test]
	async fn test_health_and_products() {
		let app = test_app().await;
		let (status, body) = send(&app, get_request("/health", None)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["status"], "ok");

		let (status, body) = send(&app, get_request("/api/products", None)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body[0]["name"], "Aspirin");
	}

	#[tokio::test]
	async fn test_orders_require_session() {
		let app = test_app().await;
		let (status, body) = send(&app, get_request("/api/orders", None)).await;
		assert_eq!(status, StatusCode::UNAUTHORIZED);
		assert_eq!(body["error"], "UNAUTHORIZED");

		let (status, _) = send(&app, get_request("/api/orders", Some("bogus"))).await;
		assert_eq!(status, StatusCode::UNAUTHORIZED);
	}

	#[tokio::test]
	async fn test_order_flow_with_prescription() {
		let app = test_app().await;
		let customer = sign_in(&app, "alice@example.com").await;
		let staff = sign_in(&app, "staff@pharmacy.test").await;

		let form = order_form(&customer, Some(("scan.png", "image/png", b"png-bytes")), "Aspirin x2");
		let (status, created) = send(&app, form).await;
		assert_eq!(status, StatusCode::CREATED);
		assert_eq!(created["status"], "pending");
		assert_eq!(created["badge"]["label"], "Pending");
		assert_eq!(created["hasPrescription"], true);
		let id = created["id"].as_str().unwrap().to_string();

		// Customers cannot reach the staff listing.
		let (status, _) = send(&app, get_request("/api/staff/orders", Some(&customer))).await;
		assert_eq!(status, StatusCode::FORBIDDEN);

		let (status, rows) = send(&app, get_request("/api/staff/orders", Some(&staff))).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(rows[0]["actions"], json!(["reject", "accept"]));

		let uri = format!("/api/staff/orders/{}/actions/accept", id);
		let (status, row) = send(&app, json_request("POST", &uri, Some(&staff), Value::Null)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(row["status"], "accepted");
		assert_eq!(row["actions"], json!(["reject", "call_rider"]));

		let (status, _) = send(&app, json_request("POST", &uri, Some(&staff), Value::Null)).await;
		assert_eq!(status, StatusCode::CONFLICT);

		let link_uri = format!("/api/orders/{}/prescription", id);
		let (status, link) = send(&app, get_request(&link_uri, Some(&customer))).await;
		assert_eq!(status, StatusCode::OK);
		let url = link["url"].as_str().unwrap();
		let path = &url[url.find("/media/").unwrap()..];

		let response = app.clone().oneshot(get_request(path, None)).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		assert_eq!(&bytes[..], b"png-bytes");

		let tampered = path.replace("signature=", "signature=00");
		let (status, _) = send(&app, get_request(&tampered, None)).await;
		assert_eq!(status, StatusCode::FORBIDDEN);
	}

	#[tokio::test]
	async fn test_order_without_prescription_has_no_link() {
		let app = test_app().await;
		let customer = sign_in(&app, "bob@example.com").await;
		let (status, created) = send(&app, order_form(&customer, None, "Vitamin C")).await;
		assert_eq!(status, StatusCode::CREATED);
		assert_eq!(created["notes"], "Vitamin C");

		let id = created["id"].as_str().unwrap();
		let (status, link) =
			send(&app, get_request(&format!("/api/orders/{}/prescription", id), Some(&customer))).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(link["url"], Value::Null);

		let other = sign_in(&app, "carol@example.com").await;
		let (status, _) = send(&app, get_request(&format!("/api/orders/{}", id), Some(&other))).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		let (status, rows) = send(&app, get_request("/api/orders", Some(&other))).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(rows, json!([]));
	}

	#[tokio::test]
	async fn test_rejects_unsupported_upload() {
		let app = test_app().await;
		let customer = sign_in(&app, "dave@example.com").await;
		let form = order_form(&customer, Some(("notes.txt", "text/plain", b"hello")), "");
		let (status, body) = send(&app, form).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "INVALID_UPLOAD");
	}

	#[tokio::test]
	async fn test_sign_out_ends_session() {
		let app = test_app().await;
		let token = sign_in(&app, "erin@example.com").await;

		let (status, session) = send(&app, get_request("/api/auth/session", Some(&token))).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(session["email"], "erin@example.com");

		let (status, _) =
			send(&app, json_request("POST", "/api/auth/signout", Some(&token), Value::Null)).await;
		assert_eq!(status, StatusCode::NO_CONTENT);

		let (status, _) = send(&app, get_request("/api/auth/session", Some(&token))).await;
		assert_eq!(status, StatusCode::UNAUTHORIZED);
	}

	#[tokio::test]
	async fn test_unknown_action_is_bad_request() {
		let app = test_app().await;
		let staff = sign_in(&app, "staff@pharmacy.test").await;
		let (status, body) = send(
			&app,
			json_request("POST", "/api/staff/orders/x/actions/teleport", Some(&staff), Value::Null),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "UNKNOWN_ACTION");
	}
}
