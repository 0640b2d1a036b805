use axum::{
    Router,
    routing::{MethodRouter, delete, get, post, put},
};

pub mod auth;
pub mod expenses;
pub mod system;

/// Serve `path` both with and without a trailing slash.
fn route_both(router: Router, path: &str, method_router: MethodRouter) -> Router {
    router
        .route(path, method_router.clone())
        .route(&format!("{path}/"), method_router)
}

/// Endpoints reachable without a token.
pub fn public_router() -> Router {
    let router = Router::new().route("/health", get(system::health));
    let router = route_both(router, "/register", post(auth::register));
    let router = route_both(router, "/login", post(auth::login));
    let router = route_both(router, "/refresh", post(auth::refresh));
    let router = route_both(router, "/verify-email", post(auth::verify_email));
    let router = route_both(router, "/resend-email", post(auth::resend_email));
    let router = route_both(router, "/account-confirm-email/:key", get(auth::confirm_email));
    route_both(router, "/account-email-verification-sent", get(auth::verification_sent))
}

/// Endpoints behind the auth middleware.
pub fn protected_router() -> Router {
    let router = Router::new();
    let router = route_both(router, "/logout", post(auth::logout));
    let router = route_both(router, "/profile", get(auth::profile));
    let router = route_both(router, "/expenses", get(expenses::list));
    let router = route_both(router, "/expenses/create", post(expenses::create));
    let router = route_both(router, "/expenses/by-type", get(expenses::by_type));
    let router = route_both(router, "/expenses/:id", get(expenses::get_by_id));
    let router = route_both(router, "/expenses/:id/update", put(expenses::update));
    route_both(router, "/expenses/:id/delete", delete(expenses::remove))
}
