//! HTTP surface: an axum router over a shared [`AppState`].

pub mod actor;
pub mod error;
pub mod ingredients;
pub mod pagination;
pub mod recipes;
pub mod state;
pub mod tags;
pub mod users;
pub mod views;

#[cfg(test)]
mod testing;

use std::{io, time::Duration};

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, post},
    Router,
};
use tokio::{
    net::TcpListener,
    signal::{
        ctrl_c,
        unix::{signal, SignalKind},
    },
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let api = Router::new()
        .route("/recipes/", get(recipes::list).post(recipes::create))
        .route("/recipes/download_shopping_cart/", get(recipes::download_shopping_cart))
        .route(
            "/recipes/{id}/",
            get(recipes::retrieve)
                .patch(recipes::update)
                .delete(recipes::destroy),
        )
        .route(
            "/recipes/{id}/favorite/",
            post(recipes::add_favorite).delete(recipes::remove_favorite),
        )
        .route(
            "/recipes/{id}/shopping_cart/",
            post(recipes::add_to_cart).delete(recipes::remove_from_cart),
        )
        .route("/tags/", get(tags::list))
        .route("/tags/{id}/", get(tags::retrieve))
        .route("/ingredients/", get(ingredients::list))
        .route("/ingredients/{id}/", get(ingredients::retrieve))
        .route("/users/me/", get(users::me))
        .route("/users/subscriptions/", get(users::subscriptions))
        .route("/users/{id}/", get(users::retrieve))
        .route(
            "/users/{id}/subscribe/",
            post(users::subscribe).delete(users::unsubscribe),
        );

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> io::Result<()> {
    let address = format!("0.0.0.0:{port}");
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install terminate handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
