//! HTTP handlers

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use minemap_core::{ListingFilter, ListingQuery, ListingRecord, NewListing};

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /listings`
///
/// Unparsable or partial proximity parameters are ignored, not rejected.
pub async fn list_listings(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListingQuery>, QueryRejection>,
) -> Result<Json<Vec<ListingRecord>>, ApiError> {
    let Query(query) = query?;
    let filter = ListingFilter::from(&query);
    let listings = state.repository.query(&filter).await?;
    Ok(Json(listings.iter().map(ListingRecord::from).collect()))
}

/// `POST /listings`
pub async fn create_listing(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewListing>, JsonRejection>,
) -> Result<(StatusCode, Json<ListingRecord>), ApiError> {
    let Json(draft) = body?;
    let listing = state.repository.create(&draft).await?;
    Ok((StatusCode::CREATED, Json(ListingRecord::from(&listing))))
}

/// Health check
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "minemap-web",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.repository.backend(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_router;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use axum::Router;
    use minemap_core::{Listing, ListingRecord};
    use minemap_postgis::MemoryListingStore;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        create_router(Arc::new(AppState::new(Arc::new(MemoryListingStore::new()))))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn site_a() -> Value {
        json!({
            "title": "Site A",
            "description": "Hydro site north of the city",
            "electricityRate": 0.05,
            "longitude": -79.37,
            "latitude": 43.71,
            "powerSource": "Hydro",
            "coolingType": "Immersion"
        })
    }

    #[tokio::test]
    async fn test_create_then_query_nearby() {
        let app = app();
        let (status, created) = send(&app, post("/listings", site_a())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["location"], "POINT(-79.37 43.71)");
        assert_eq!(created["power_source"], "Hydro");

        let (status, body) = send(&app, get("/listings?lat=43.71&lng=-79.37&radius=1000")).await;
        assert_eq!(status, StatusCode::OK);

        let records: Vec<ListingRecord> = serde_json::from_value(body).unwrap();
        assert_eq!(records.len(), 1);
        let listing = Listing::try_from(records[0].clone()).unwrap();
        assert_eq!(listing.title, "Site A");
        assert_eq!(listing.longitude(), -79.37);
        assert_eq!(listing.latitude(), 43.71);
    }

    #[tokio::test]
    async fn test_filters_over_http() {
        let app = app();
        send(&app, post("/api/listings", site_a())).await;

        let (_, body) = send(&app, get("/listings?powerSource=Solar")).await;
        assert_eq!(body, json!([]));

        let (_, body) = send(&app, get("/listings?powerSource=ALL&coolingType=all")).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        // Partial proximity is ignored, so the listing far away still shows
        let (_, body) = send(&app, get("/api/listings?lat=10&lng=&radius=5")).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = send(&app, get("/listings?maxRate=0.01")).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_radius_with_unit_suffix_still_filters() {
        let app = app();
        let mut far = site_a();
        far["title"] = json!("Far");
        far["longitude"] = json!(100.0);
        far["latitude"] = json!(10.0);
        send(&app, post("/listings", far)).await;

        let (status, body) = send(&app, get("/listings?lat=43.71&lng=-79.37&radius=1000m")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_bad_query_string_is_json_400() {
        let (status, body) = send(&app(), get("/listings?lat=1&lat=2")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("lat"));
    }

    #[tokio::test]
    async fn test_validation_is_400() {
        let app = app();
        let mut draft = site_a();
        draft.as_object_mut().unwrap().remove("title");
        let (status, body) = send(&app, post("/listings", draft)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("title"));
    }

    #[tokio::test]
    async fn test_bad_coordinate_is_400() {
        let app = app();
        let mut draft = site_a();
        draft["latitude"] = json!(123.0);
        let (status, body) = send(&app, post("/listings", draft)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("latitude"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let app = app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/listings")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"title\": "))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_store_error_is_generic_500() {
        let err = crate::ApiError(minemap_core::Error::Store("password auth failed for postgres".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": "Internal Server Error" }));
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["store"], "memory");
    }
}
