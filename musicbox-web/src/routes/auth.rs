use axum::{
    Form, Json, Router,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    response::{IntoResponse, Response},
    routing::post,
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use musicbox_database::hash_secret;
use musicbox_models::Ack;
use serde::Deserialize;
use std::sync::Arc;

use crate::{AppState, error::Error};

const COOKIE_NAME: &str = "secret";

pub(crate) fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/login", post(login))
}

/// Accepts the secret from the cookie or an `Authorization: Bearer` header.
pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
    next: axum::middleware::Next,
) -> (CookieJar, Response) {
    let Some(expected) = state.web_secret.as_deref() else {
        return (jar, next.run(request).await);
    };

    let from_cookie = jar.get(COOKIE_NAME).map(|cookie| cookie.value().to_string());
    let from_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);

    if let Some(secret) = from_cookie
        && hash_secret(&secret) == expected
    {
        return (set_auth_cookie(jar, secret), next.run(request).await);
    }

    if let Some(secret) = from_header
        && hash_secret(&secret) == expected
    {
        return (jar, next.run(request).await);
    }

    (jar, Error::BadCredentials.into_response())
}

fn set_auth_cookie(jar: CookieJar, secret: String) -> CookieJar {
    let mut cookie = Cookie::new(COOKIE_NAME, secret);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_max_age(time::Duration::weeks(1));
    jar.add(cookie)
}

#[derive(Deserialize)]
struct LoginParameters {
    secret: String,
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(parameters): Form<LoginParameters>,
) -> (CookieJar, Response) {
    match state.web_secret.as_deref() {
        None => (jar, Json(Ack::ok()).into_response()),
        Some(expected) if hash_secret(&parameters.secret) == expected => (
            set_auth_cookie(jar, parameters.secret),
            Json(Ack::ok()).into_response(),
        ),
        Some(_) => (jar, Error::BadCredentials.into_response()),
    }
}
