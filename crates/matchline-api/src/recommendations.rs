use axum::{
    Extension, Json,
    extract::{Query, State, rejection::JsonRejection},
    response::IntoResponse,
};

use matchline_gateway::run_blocking;
use matchline_match::Filters;
use matchline_types::api::{
    Identity, RecommendationQuery, RecommendationsResponse, RequestIdBody, StatusResponse,
};

use crate::error::{ApiResult, json_body};
use crate::state::AppState;

pub async fn get_recommendations(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<RecommendationQuery>,
) -> ApiResult<impl IntoResponse> {
    let filters = Filters::from_query(&query)?;
    let st = state.clone();
    let recommendations =
        run_blocking(move || st.recommender.recommend(identity.user_id, &filters)).await?;
    Ok(Json(RecommendationsResponse { recommendations }))
}

/// Hide a recommended user from the caller for good.
pub async fn decline_recommendation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<RequestIdBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = json_body(payload)?;
    let st = state.clone();
    run_blocking(move || st.recommender.decline(identity.user_id, body.request_id)).await?;
    Ok(Json(StatusResponse::new("user declined")))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::test_support::TestApp;

    #[tokio::test]
    async fn ranks_and_grants_profile_access() {
        let app = TestApp::new();
        let viewer = app.user("viewer");
        let close = app.user("close");
        let mut far = app.profile("far");
        far.age = 60;
        app.state.db.upsert_user(&far).unwrap();

        let (status, body) = app.call(Method::GET, "/recommendations", viewer.id, None).await;
        assert_eq!(status, StatusCode::OK);
        let recs = body["recommendations"].as_array().unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0]["id"], close.id.to_string());
        assert!(recs[0]["score"].as_i64().unwrap() > recs[1]["score"].as_i64().unwrap());

        let (status, _) = app.call(Method::GET, &format!("/users/{}", far.id), viewer.id, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn incomplete_profile_is_bad_request() {
        let app = TestApp::new();
        let mut viewer = app.profile("viewer");
        viewer.interests.clear();
        app.state.db.upsert_user(&viewer).unwrap();

        let (status, body) = app.call(Method::GET, "/recommendations", viewer.id, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("profile"));
    }

    #[tokio::test]
    async fn unknown_mode_and_bad_age_are_rejected() {
        let app = TestApp::new();
        let viewer = app.user("viewer");
        let (status, _) = app.call(Method::GET, "/recommendations?mode=zodiac", viewer.id, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app.call(Method::GET, "/recommendations?mode=age&age=old", viewer.id, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn declined_user_disappears() {
        let app = TestApp::new();
        let viewer = app.user("viewer");
        let other = app.user("other");

        let body = json!({ "request_id": other.id });
        let (status, _) = app
            .call(Method::POST, "/recommendations/decline", viewer.id, Some(body))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = app.call(Method::GET, "/recommendations", viewer.id, None).await;
        assert!(body["recommendations"].as_array().unwrap().is_empty());

        // the other side no longer sees the decliner either
        let (_, body) = app.call(Method::GET, "/recommendations", other.id, None).await;
        assert!(body["recommendations"].as_array().unwrap().is_empty());
    }
}
