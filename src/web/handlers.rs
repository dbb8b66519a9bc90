//! Route handlers.
//!
//! The CRUD handlers are generic over [`Resource`] and registered once per
//! entity kind by [`resource_routes`].

use super::identity::{CurrentIdentity, expired_session_cookie, session_cookie, session_token};
use super::response::{ApiError, ApiResult, FormView};
use crate::service::{Resource, TaskManager};
use crate::types::{HomeView, Id, Page};
use axum::Router;
use axum::extract::{Form, Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn home(
    State(tm): State<TaskManager>,
    CurrentIdentity(identity): CurrentIdentity,
) -> ApiResult<Json<HomeView>> {
    Ok(Json(tm.home(&identity)?))
}

pub async fn login_form() -> Json<LoginForm> {
    Json(LoginForm::default())
}

pub async fn login(State(tm): State<TaskManager>, Form(form): Form<LoginForm>) -> ApiResult<Response> {
    let session = tm.login(&form.username, &form.password)?;
    let max_age = (session.expires_at - session.created_at) / 1000;
    Ok((
        [(SET_COOKIE, session_cookie(&session.token, max_age))],
        Redirect::to("/"),
    )
        .into_response())
}

pub async fn logout(State(tm): State<TaskManager>, headers: HeaderMap) -> ApiResult<Response> {
    if let Some(token) = session_token(&headers) {
        tm.logout(&token)?;
    }
    Ok(([(SET_COOKIE, expired_session_cookie())], Redirect::to("/")).into_response())
}

pub async fn complete_task(
    State(tm): State<TaskManager>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<Id>,
) -> ApiResult<Redirect> {
    tm.complete_task(&identity, id)?;
    Ok(Redirect::to(&format!("/tasks/{}", id)))
}

async fn list<R: Resource>(
    State(tm): State<TaskManager>,
    CurrentIdentity(identity): CurrentIdentity,
    Query(page): Query<PageQuery>,
    Query(filter): Query<R::Filter>,
) -> ApiResult<Json<Page<R::Record>>> {
    Ok(Json(tm.list::<R>(&identity, &filter, page.page)?))
}

async fn detail<R: Resource>(
    State(tm): State<TaskManager>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<Id>,
) -> ApiResult<Json<R::Detail>> {
    Ok(Json(tm.detail::<R>(&identity, id)?))
}

async fn create_form<R: Resource>(
    State(tm): State<TaskManager>,
    CurrentIdentity(identity): CurrentIdentity,
) -> ApiResult<Json<FormView<R::Input>>> {
    Ok(Json(FormView {
        kind: R::KIND,
        action: "create",
        values: tm.create_form::<R>(&identity)?,
        errors: None,
    }))
}

async fn create<R: Resource>(
    State(tm): State<TaskManager>,
    CurrentIdentity(identity): CurrentIdentity,
    Form(input): Form<R::Input>,
) -> ApiResult<Redirect> {
    tm.create::<R>(&identity, &input)
        .map_err(|e| ApiError::with_form(e, R::KIND, "create", &input))?;
    Ok(Redirect::to(R::KIND.route()))
}

async fn update_form<R: Resource>(
    State(tm): State<TaskManager>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<Id>,
) -> ApiResult<Json<FormView<R::Input>>> {
    Ok(Json(FormView {
        kind: R::KIND,
        action: "update",
        values: tm.update_form::<R>(&identity, id)?,
        errors: None,
    }))
}

async fn update<R: Resource>(
    State(tm): State<TaskManager>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<Id>,
    Form(input): Form<R::Input>,
) -> ApiResult<Redirect> {
    tm.update::<R>(&identity, id, &input)
        .map_err(|e| ApiError::with_form(e, R::KIND, "update", &input))?;
    Ok(Redirect::to(R::KIND.route()))
}

async fn delete_confirmation<R: Resource>(
    State(tm): State<TaskManager>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<Id>,
) -> ApiResult<Json<R::Record>> {
    Ok(Json(tm.delete_confirmation::<R>(&identity, id)?))
}

async fn delete<R: Resource>(
    State(tm): State<TaskManager>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<Id>,
) -> ApiResult<Redirect> {
    tm.delete::<R>(&identity, id)?;
    Ok(Redirect::to(R::KIND.route()))
}

/// List, detail, create, update and delete routes for one kind.
pub fn resource_routes<R: Resource>(router: Router<TaskManager>) -> Router<TaskManager> {
    let base = R::KIND.route();
    router
        .route(base, get(list::<R>))
        .route(&format!("{}/create", base), get(create_form::<R>).post(create::<R>))
        .route(&format!("{}/{{id}}", base), get(detail::<R>))
        .route(
            &format!("{}/{{id}}/update", base),
            get(update_form::<R>).post(update::<R>),
        )
        .route(
            &format!("{}/{{id}}/delete", base),
            get(delete_confirmation::<R>).post(delete::<R>),
        )
}

pub fn session_routes(router: Router<TaskManager>) -> Router<TaskManager> {
    router
        .route("/", get(home))
        .route("/login", get(login_form).post(login))
        .route("/logout", post(logout))
        .route("/tasks/{id}/complete", post(complete_task))
        .route("/api/health", get(health))
}
