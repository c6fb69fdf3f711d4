//! HTTP adapter over the user services.

pub mod error;
mod handlers;
mod middleware;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::users::UserServices;

pub use handlers::{
    BatchProfilesRequest, BatchProfilesResponse, FollowRequest, FollowResponse, ProfileQuery,
    RegisterUserRequest, UpdateUserRequest,
};

#[derive(Clone)]
pub struct HttpState {
    pub users: UserServices,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/users", post(handlers::register_user))
        .route(
            "/v1/users/{id}",
            get(handlers::get_user).patch(handlers::update_user),
        )
        .route("/v1/users/{id}/profile", get(handlers::get_profile))
        .route(
            "/v1/users/{id}/follow",
            post(handlers::follow).delete(handlers::unfollow),
        )
        .route("/v1/profiles/batch", post(handlers::batch_profiles))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
