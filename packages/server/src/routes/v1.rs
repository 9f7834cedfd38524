use axum::{
    Router,
    routing::{get, patch, post, put},
};

use crate::handlers;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/course-units/{id}/activities", unit_activity_routes())
        .nest("/activities", activity_routes())
        .nest("/deposits", deposit_routes())
}

fn unit_activity_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::activity::list_activities).post(handlers::activity::create_activity),
        )
        .layer(handlers::activity::activity_upload_body_limit())
}

fn activity_routes() -> Router<AppState> {
    let crud = Router::new()
        .route(
            "/{id}",
            get(handlers::activity::get_activity)
                .patch(handlers::activity::update_activity)
                .delete(handlers::activity::delete_activity),
        )
        .route(
            "/{id}/category",
            put(handlers::activity::reclassify_activity),
        )
        .route("/{id}/complete", post(handlers::completion::mark_complete))
        .route(
            "/{id}/completion-rate",
            get(handlers::completion::completion_rate),
        )
        .route(
            "/{id}/deposits/archive",
            get(handlers::deposit::export_all_deposits),
        );

    let file_upload = Router::new()
        .route("/{id}/file", put(handlers::activity::replace_activity_file))
        .layer(handlers::activity::activity_upload_body_limit());

    let deposits = Router::new()
        .route(
            "/{id}/deposits",
            get(handlers::deposit::list_deposits).post(handlers::deposit::submit_deposit),
        )
        .route(
            "/{id}/deposits/mine",
            get(handlers::deposit::get_my_deposit)
                .put(handlers::deposit::replace_deposit)
                .delete(handlers::deposit::withdraw_deposit),
        )
        .layer(handlers::deposit::deposit_upload_body_limit());

    crud.merge(file_upload).merge(deposits)
}

fn deposit_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/{id}/evaluation",
            patch(handlers::deposit::grade_deposit),
        )
        .route("/{id}/archive", get(handlers::deposit::export_deposit))
}
