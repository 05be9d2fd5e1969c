//! `StudioApi` against an in-process axum server.

use std::collections::HashMap;

use assert_matches::assert_matches;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use shotcraft_client::api::{ApiError, StudioApi};
use shotcraft_client::backend::StudioBackend;
use shotcraft_client::session::AuthStatus;
use shotcraft_core::generation::{GenerateRequest, ImageStatus, JobStatus, RefineRequest};
use shotcraft_core::product::{CreateProductRequest, ProductStage};
use shotcraft_core::search::SearchRequest;

/// Serve `app` on an ephemeral port and return a client pointed at it.
async fn serve(app: Router) -> StudioApi {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    StudioApi::new(format!("http://{addr}/api"))
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generate_sends_body_and_token() {
    let app = Router::new().route(
        "/api/product/{id}/generate",
        post(
            |Path(id): Path<String>, headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(id, "prod-1");
                assert_eq!(headers["authorization"], "Bearer t0ken");
                assert_eq!(body, json!({"prompt": "red shoes", "count": 4}));
                Json(json!({"generation_job_id": "job-1", "image_group_ids": ["g1", "g2"]}))
            },
        ),
    );
    let api = serve(app).await.with_token("t0ken");

    let request = GenerateRequest::new("red shoes", 4).unwrap();
    let response = api.generate("prod-1", &request).await.unwrap();

    assert_eq!(response.generation_job_id, "job-1");
    assert_eq!(response.image_group_ids, vec!["g1", "g2"]);
}

#[tokio::test]
async fn generation_snapshot_decodes_naive_timestamps() {
    let app = Router::new().route(
        "/api/generation/{id}",
        get(|Path(id): Path<String>| async move {
            Json(json!({
                "generation_job": {"id": id, "status": "in_progress"},
                "image_groups": [{
                    "id": "g1",
                    "created_at": "2024-09-12T10:00:00.123456",
                    "updated_at": "2024-09-12T10:00:05+00:00",
                    "default_image_id": null,
                    "images": [
                        {"id": "i1", "url": null, "status": "pending", "created_at": "2024-09-12T10:00:00"}
                    ]
                }]
            }))
        }),
    );
    let api = serve(app).await;

    let snapshot = api.get_generation("job-7").await.unwrap();

    assert_eq!(snapshot.generation_job.id, "job-7");
    assert_eq!(snapshot.status(), JobStatus::InProgress);
    assert!(snapshot.has_updates());
    assert_eq!(snapshot.groups()[0].images[0].status, ImageStatus::Pending);
}

#[tokio::test]
async fn snapshot_without_groups_has_no_updates() {
    let app = Router::new().route(
        "/api/generation/{id}",
        get(|| async { Json(json!({"generation_job": {"id": "job-1", "status": "pending"}})) }),
    );
    let api = serve(app).await;

    let snapshot = api.get_generation("job-1").await.unwrap();
    assert!(!snapshot.has_updates());
}

#[tokio::test]
async fn refine_posts_default_parameters() {
    let app = Router::new().route(
        "/api/image_group/{group_id}/image/{image_id}/refine",
        post(
            |Path((group_id, image_id)): Path<(String, String)>, Json(body): Json<Value>| async move {
                assert_eq!(body["prompt"], "warmer");
                assert_eq!(body["noise_strength"], 0.0);
                assert!((body["denoise_amount"].as_f64().unwrap() - 0.9).abs() < 1e-6);
                Json(json!({
                    "generation_job_id": "job-r",
                    "image_group_id": group_id,
                    "image_id": format!("{image_id}-next"),
                }))
            },
        ),
    );
    let api = serve(app).await;

    let response = api
        .refine("g1", "v1", &RefineRequest::new("warmer"))
        .await
        .unwrap();

    assert_eq!(response.image_group_id, "g1");
    assert_eq!(response.image_id, "v1-next");
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_2xx_carries_status_and_detail() {
    let app = Router::new().route(
        "/api/product/{id}/generate",
        post(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"detail": "Product not found"})),
            )
        }),
    );
    let api = serve(app).await;

    let err = api
        .generate("nope", &GenerateRequest::new("x", 1).unwrap())
        .await
        .unwrap_err();

    assert_matches!(err, ApiError::Status { status: 404, ref message } if message == "Product not found");
    assert!(err.is_transport());
}

#[tokio::test]
async fn failed_job_surfaces_server_detail() {
    let app = Router::new().route(
        "/api/generation/{id}",
        get(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "Generation failed: upstream timeout"})),
            )
        }),
    );
    let api = serve(app).await;

    let err = api.get_generation("job-1").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("upstream timeout"));
}

#[tokio::test]
async fn unexpected_shape_is_a_decode_error() {
    let app = Router::new().route(
        "/api/generation/{id}",
        get(|| async { Json(json!({"status": "completed"})) }),
    );
    let api = serve(app).await;

    let err = api.get_generation("job-1").await.unwrap_err();
    assert_matches!(err, ApiError::Decode(_));
    assert!(!err.is_transport());
}

#[tokio::test]
async fn unreachable_backend_is_a_request_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let api = StudioApi::new(format!("http://{addr}/api"));

    let err = api.list_organizations().await.unwrap_err();
    assert_matches!(err, ApiError::Request(_));
}

// ---------------------------------------------------------------------------
// Image groups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn image_group_listing_infers_status() {
    let app = Router::new().route(
        "/api/product/{id}/image-groups",
        get(|| async {
            Json(json!({"image_groups": [{
                "id": "g1",
                "created_at": "2024-09-12T10:00:00",
                "updated_at": "2024-09-12T10:00:00",
                "default_image_id": "i1",
                "images": [
                    {"id": "i1", "url": "https://cdn/i1.png", "created_at": "2024-09-12T10:00:00"},
                    {"id": "i2", "url": null, "created_at": "2024-09-12T10:01:00"}
                ]
            }]}))
        }),
    );
    let api = serve(app).await;

    let groups = api.list_image_groups("prod-1").await.unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].images[0].status, ImageStatus::Generated);
    assert_eq!(groups[0].images[1].status, ImageStatus::Pending);
}

#[tokio::test]
async fn set_default_and_delete_hit_their_routes() {
    let app = Router::new()
        .route(
            "/api/image_group/{group_id}/set_default_image/{image_id}",
            post(|Path((g, i)): Path<(String, String)>| async move {
                assert_eq!((g.as_str(), i.as_str()), ("g1", "i2"));
                Json(json!({"message": "Default image updated"}))
            }),
        )
        .route(
            "/api/product/{id}/image-group/{group_id}",
            delete(|Path((p, g)): Path<(String, String)>| async move {
                assert_eq!((p.as_str(), g.as_str()), ("prod-1", "g1"));
                StatusCode::OK
            }),
        );
    let api = serve(app).await;

    api.set_default_image("g1", "i2").await.unwrap();
    api.delete_image_group("prod-1", "g1").await.unwrap();
}

#[tokio::test]
async fn download_returns_raw_bytes() {
    let app = Router::new().route(
        "/api/image/{id}/download",
        get(|| async { ([("content-type", "image/png")], vec![0x89u8, b'P', b'N', b'G']) }),
    );
    let api = serve(app).await;

    let bytes = api.download_image("i1").await.unwrap();
    assert_eq!(bytes, vec![0x89, b'P', b'N', b'G']);
}

// ---------------------------------------------------------------------------
// Search / products / auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn search_posts_to_organization_route() {
    let app = Router::new().route(
        "/api/{org}/image/search",
        post(|Path(org): Path<String>, Json(body): Json<Value>| async move {
            assert_eq!(org, "org-1");
            assert_eq!(body["text"], "bottle");
            assert_eq!(body["page"], 2);
            Json(json!({
                "images": [{
                    "_id": "lib-1",
                    "creation_method": "generated",
                    "url": "https://cdn/lib-1.png",
                    "dimensions": {"width": 1024, "height": 1024, "aspect_ratio": 1.0},
                    "resolution": 72,
                    "format": "png",
                    "caption": "amber bottle"
                }],
                "total": 21, "page": 2, "page_size": 20, "total_pages": 2
            }))
        }),
    );
    let api = serve(app).await;

    let response = api
        .search_images("org-1", &SearchRequest::text("bottle").with_page(2))
        .await
        .unwrap();

    assert_eq!(response.images[0].id, "lib-1");
    assert!(!response.has_next_page());
}

#[tokio::test]
async fn products_are_listed_by_organization() {
    let app = Router::new().route(
        "/api/product",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            assert_eq!(params["organization_id"], "org-1");
            Json(json!({"products": [{
                "id": "p1",
                "name": "Amber Bottle",
                "organization_id": "org-1",
                "primary_image_url": "https://cdn/p1.png",
                "stage": "completed",
                "created_at": "2024-09-12T10:00:00",
                "updated_at": "2024-09-12T10:00:00"
            }]}))
        }),
    );
    let api = serve(app).await;

    let products = api.list_products("org-1").await.unwrap();
    assert_eq!(products.len(), 1);
    assert!(products[0].is_ready());
}

#[tokio::test]
async fn create_product_posts_image_references() {
    let app = Router::new().route(
        "/api/product",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["name"], "Amber Bottle");
            assert_eq!(body["organization_id"], "org-1");
            assert_eq!(body["primary_image_url"], "https://cdn/p1.png");
            assert_eq!(body["primary_image_id"], "img-1");
            assert_eq!(body["additional_image_urls"], json!([]));
            Json(json!({"product": {
                "id": "p9",
                "name": body["name"],
                "organization_id": "org-1",
                "primary_image_url": "https://cdn/p1.png",
                "stage": "queued",
                "created_at": "2024-09-12T10:00:00",
                "updated_at": "2024-09-12T10:00:00"
            }}))
        }),
    );
    let api = serve(app).await;

    let request = CreateProductRequest::new("Amber Bottle", "org-1", "https://cdn/p1.png")
        .with_primary_image_id("img-1");
    let product = api.create_product(&request).await.unwrap();

    assert_eq!(product.id, "p9");
    assert_eq!(product.stage, ProductStage::Queued);
}

#[tokio::test]
async fn avatars_are_listed_by_organization() {
    let app = Router::new().route(
        "/api/organization/{id}/avatar",
        get(|Path(id): Path<String>| async move {
            assert_eq!(id, "org-1");
            Json(json!({"avatars": [{
                "id": "a1",
                "name": "Mia",
                "gender": "female",
                "preview_images": {
                    "preview_image_16_9": "https://cdn/a1-wide.png",
                    "preview_image_1_1": "https://cdn/a1-square.png",
                    "preview_image_9_16": null
                }
            }]}))
        }),
    );
    let api = serve(app).await;

    let avatars = api.list_avatars("org-1").await.unwrap();

    assert_eq!(avatars.len(), 1);
    assert_eq!(avatars[0].preview_url(), Some("https://cdn/a1-square.png"));
}

#[tokio::test]
async fn auth_status_maps_401_to_signed_out() {
    let app = Router::new()
        .route(
            "/api/auth/status",
            get(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"detail": "User not authenticated"})),
                )
                    .into_response()
            }),
        )
        .route("/api/auth/sign_out", post(|| async { StatusCode::OK }));
    let api = serve(app).await;

    assert_eq!(api.auth_status().await.unwrap(), AuthStatus::Unauthenticated);
    api.sign_out().await.unwrap();
}

#[tokio::test]
async fn organizations_are_unwrapped() {
    let app = Router::new().route(
        "/api/user/organization",
        get(|| async {
            Json(json!({"organizations": [{"id": "o1", "name": "Acme", "role": "admin"}]}))
        }),
    );
    let api = serve(app).await;

    let orgs = api.list_organizations().await.unwrap();
    assert_eq!(orgs[0].name, "Acme");
}
