//! HTTP handlers for redemption-code management.
//!
//! Every body is the `{success, message, data}` envelope; failures are
//! rendered by `AppError`.

use crate::{
    errors::AppError,
    handlers::extract::{ApiJson, ApiPath, ApiQuery},
    models::redemption::{CodeSpec, Redemption, RedemptionStatus},
    services::lifecycle::{Page, UpdateRequest},
    state::AppState,
};
use axum::{Json, extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

/// Header carrying the calling account id. Authentication happens upstream.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: String::new(),
            data: Some(data),
        })
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub p: i64,
    #[serde(default)]
    pub page_size: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub p: i64,
    #[serde(default)]
    pub page_size: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct NameQuery {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateQuery {
    pub status_only: Option<String>,
}

/// `POST /api/redemption/` body. A non-empty `key` creates that exact code;
/// otherwise `count` codes are generated.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateRedemptionReq {
    pub name: String,
    pub key: String,
    pub count: i64,
    pub quota: i64,
    pub is_gift: bool,
    pub max_uses: i64,
    pub valid_from: i64,
    pub valid_until: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RandomQuotaReq {
    pub name: String,
    pub count: i64,
    pub min_quota: i64,
    pub max_quota: i64,
    pub is_gift: bool,
    pub max_uses: i64,
    pub valid_from: i64,
    pub valid_until: i64,
}

/// `PUT /api/redemption/` body. Which fields apply depends on `status_only`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateRedemptionReq {
    pub id: i64,
    pub name: String,
    pub quota: i64,
    pub valid_from: i64,
    pub valid_until: i64,
    pub status: Option<RedemptionStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchDisableReq {
    #[serde(default)]
    pub ids: Vec<i64>,
}

fn owner_id(headers: &HeaderMap) -> i64 {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

/// Negative counts fall outside the accepted range like zero does.
fn batch_count(count: i64) -> usize {
    usize::try_from(count).unwrap_or(0)
}

/// GET `/api/redemption/`: list codes, `?p=&page_size=`
pub async fn list_redemptions(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<ListQuery>,
) -> ApiResult<Page> {
    let page = state.lifecycle.list(q.p, q.page_size).await?;
    Ok(ApiResponse::ok(page))
}

/// GET `/api/redemption/search`: substring search on name, `?keyword=&p=&page_size=`
pub async fn search_redemptions(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<SearchQuery>,
) -> ApiResult<Page> {
    let page = state.lifecycle.search(&q.keyword, q.p, q.page_size).await?;
    Ok(ApiResponse::ok(page))
}

/// GET `/api/redemption/{id}`
pub async fn get_redemption(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Redemption> {
    Ok(ApiResponse::ok(state.lifecycle.get(id).await?))
}

/// POST `/api/redemption/`: create an explicit code or a batch.
pub async fn create_redemptions(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<CreateRedemptionReq>,
) -> ApiResult<Vec<String>> {
    let spec = CodeSpec {
        name: req.name,
        is_gift: req.is_gift,
        max_uses: req.max_uses,
        valid_from: req.valid_from,
        valid_until: req.valid_until,
        owner_id: owner_id(&headers),
    };

    let codes = if req.key.is_empty() {
        state
            .generator
            .generate_batch(&spec, batch_count(req.count), req.quota)
            .await?
    } else {
        let rec = state
            .generator
            .generate_explicit(&spec, &req.key, req.quota)
            .await?;
        vec![rec.code]
    };
    Ok(ApiResponse::ok(codes))
}

/// POST `/api/redemption/random-quota`: batch with per-code random quota.
pub async fn create_random_quota_redemptions(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<RandomQuotaReq>,
) -> ApiResult<Vec<String>> {
    let spec = CodeSpec {
        name: req.name,
        is_gift: req.is_gift,
        max_uses: req.max_uses,
        valid_from: req.valid_from,
        valid_until: req.valid_until,
        owner_id: owner_id(&headers),
    };

    let codes = state
        .generator
        .generate_random_quota_batch(&spec, batch_count(req.count), req.min_quota, req.max_quota)
        .await?;
    Ok(ApiResponse::ok(codes))
}

/// PUT `/api/redemption/`: `?status_only=true` changes only the status.
pub async fn update_redemption(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<UpdateQuery>,
    ApiJson(req): ApiJson<UpdateRedemptionReq>,
) -> ApiResult<Redemption> {
    let status_only = q.status_only.is_some_and(|v| !v.is_empty());
    let request = if status_only {
        let status = req
            .status
            .ok_or_else(|| AppError::bad_request("status is required for a status update"))?;
        UpdateRequest::Status { id: req.id, status }
    } else {
        UpdateRequest::Fields {
            id: req.id,
            name: req.name,
            quota: req.quota,
            valid_from: req.valid_from,
            valid_until: req.valid_until,
        }
    };

    Ok(ApiResponse::ok(state.lifecycle.update(request).await?))
}

/// DELETE `/api/redemption/{id}`
pub async fn delete_redemption(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<()> {
    state.lifecycle.delete(id).await?;
    Ok(ApiResponse::ok(()))
}

/// GET `/api/redemption/count-by-name?name=`: exact match.
pub async fn count_by_name(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<NameQuery>,
) -> ApiResult<i64> {
    Ok(ApiResponse::ok(state.lifecycle.count_by_name(&q.name).await?))
}

/// DELETE `/api/redemption/delete-by-name?name=`: exact match.
pub async fn delete_by_name(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<NameQuery>,
) -> ApiResult<u64> {
    Ok(ApiResponse::ok(state.lifecycle.delete_by_name(&q.name).await?))
}

/// PUT `/api/redemption/batch-disable`: body `{"ids": [...]}`.
pub async fn batch_disable(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BatchDisableReq>,
) -> ApiResult<u64> {
    Ok(ApiResponse::ok(state.lifecycle.disable(&req.ids).await?))
}

/// DELETE `/api/redemption/delete-disabled`
pub async fn delete_disabled(State(state): State<AppState>) -> ApiResult<u64> {
    Ok(ApiResponse::ok(state.lifecycle.delete_disabled().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::redemption_store::testing::memory_store;
    use axum::{
        http::{HeaderValue, StatusCode},
        response::IntoResponse,
    };

    async fn state() -> AppState {
        let store = memory_store().await;
        AppState::new(store.db.clone(), 10)
    }

    fn user(id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_str(id).unwrap());
        headers
    }

    #[tokio::test]
    async fn explicit_key_creates_one_code_for_caller() {
        let state = state().await;
        let req = CreateRedemptionReq {
            name: "launch".into(),
            key: "LAUNCH-1".into(),
            quota: 500,
            max_uses: 1,
            ..Default::default()
        };
        let Json(resp) = create_redemptions(State(state.clone()), user("42"), ApiJson(req))
            .await
            .unwrap();
        assert!(resp.success);
        assert!(resp.message.is_empty());
        assert_eq!(resp.data, Some(vec!["LAUNCH-1".to_string()]));

        let page = state.lifecycle.search("launch", 0, 10).await.unwrap();
        assert_eq!(page.items[0].owner_id, 42);
    }

    #[tokio::test]
    async fn batch_without_key_uses_count() {
        let state = state().await;
        let req = CreateRedemptionReq {
            name: "bulk".into(),
            count: 3,
            quota: 10,
            ..Default::default()
        };
        let Json(resp) = create_redemptions(State(state), HeaderMap::new(), ApiJson(req))
            .await
            .unwrap();
        assert_eq!(resp.data.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn invalid_count_is_a_bad_request() {
        let state = state().await;
        let req = CreateRedemptionReq {
            name: "bulk".into(),
            count: -4,
            ..Default::default()
        };
        let err = create_redemptions(State(state), HeaderMap::new(), ApiJson(req))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.data, Some(serde_json::json!([])));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_only_update_requires_status() {
        let state = state().await;
        let rec = state
            .generator
            .generate_explicit(
                &CodeSpec {
                    name: "toggle".into(),
                    is_gift: false,
                    max_uses: 1,
                    valid_from: 0,
                    valid_until: 0,
                    owner_id: 1,
                },
                "TOGGLE",
                9,
            )
            .await
            .unwrap();

        let q = UpdateQuery {
            status_only: Some("true".into()),
        };
        let req = UpdateRedemptionReq {
            id: rec.id,
            name: "ignored".into(),
            quota: 1_000_000,
            ..Default::default()
        };
        let err = update_redemption(State(state.clone()), ApiQuery(q), ApiJson(req))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let q = UpdateQuery {
            status_only: Some("true".into()),
        };
        let req = UpdateRedemptionReq {
            id: rec.id,
            name: "ignored".into(),
            quota: 1_000_000,
            status: Some(RedemptionStatus::Disabled),
            ..Default::default()
        };
        let Json(resp) = update_redemption(State(state), ApiQuery(q), ApiJson(req))
            .await
            .unwrap();
        let updated = resp.data.unwrap();
        assert_eq!(updated.status, RedemptionStatus::Disabled);
        assert_eq!(updated.name, "toggle");
        assert_eq!(updated.quota, 9);
    }

    #[tokio::test]
    async fn bulk_endpoints_reject_empty_input() {
        let state = state().await;
        let err = count_by_name(State(state.clone()), ApiQuery(NameQuery::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = delete_by_name(State(state.clone()), ApiQuery(NameQuery::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = batch_disable(State(state.clone()), ApiJson(BatchDisableReq::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let Json(resp) = delete_disabled(State(state)).await.unwrap();
        assert_eq!(resp.data, Some(0));
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let state = state().await;
        let err = get_redemption(State(state.clone()), ApiPath(77)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        let err = delete_redemption(State(state), ApiPath(77)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn random_quota_endpoint_rejects_inverted_range() {
        let state = state().await;
        let req = RandomQuotaReq {
            name: "lucky".into(),
            count: 2,
            min_quota: 9,
            max_quota: 1,
            ..Default::default()
        };
        let err = create_random_quota_redemptions(State(state.clone()), HeaderMap::new(), ApiJson(req))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let req = RandomQuotaReq {
            name: "lucky".into(),
            count: 2,
            min_quota: 1,
            max_quota: 9,
            ..Default::default()
        };
        let Json(resp) = create_random_quota_redemptions(State(state), HeaderMap::new(), ApiJson(req))
            .await
            .unwrap();
        assert_eq!(resp.data.unwrap().len(), 2);
    }
}
