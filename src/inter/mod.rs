/*!
Interoperation between the client (user) and server.

(Not the application and the database; that's covered by `auth` and `store`.)

Every route lives under `/api`. Apart from the index, registration and
login, requests must carry `x-ecole-email` and `x-ecole-key` headers
naming a user and a key issued to them at login; `key_authenticate`
checks these and hands the `User` on to the handler as an `Extension`.
Anything outside `/api` is served from the static directory.
*/
use std::{path::Path, sync::Arc};

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Extension, Path as UrlPath, Query,
    },
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tower_http::services::ServeDir;

use crate::{
    auth::AuthResult,
    config::Glob,
    page::{Page, PageQuery},
    store::DbError,
    user::{Role, User},
};

pub mod admin;
pub mod attendance;
pub mod auth;
pub mod dashboard;
pub mod grades;
pub mod invoices;
pub mod payments;
pub mod students;

/// What every handler returns; the error half is already a response.
pub type Resp = Result<Response, Response>;

static TEXT_500: &str = "An internal error occurred; an appropriate response was inconstructable.";

pub const EMAIL_HEADER: &str = "x-ecole-email";
pub const KEY_HEADER: &str = "x-ecole-key";

fn respond_error(code: StatusCode, msg: &str) -> Response {
    (code, Json(json!({ "error": msg }))).into_response()
}

pub fn json_500(text: Option<String>) -> Response {
    match text {
        Some(text) => respond_error(StatusCode::INTERNAL_SERVER_ERROR, &text),
        None => respond_error(StatusCode::INTERNAL_SERVER_ERROR, TEXT_500),
    }
}

/// Log a data DB error and turn it into a generic 500.
pub fn db_500(e: DbError) -> Response {
    log::error!("Data DB error: {}", &e);
    json_500(None)
}

pub fn respond_bad_request(msg: String) -> Response {
    log::trace!("respond_bad_request( {:?} ) called.", &msg);
    respond_error(StatusCode::BAD_REQUEST, &msg)
}

pub fn respond_unauthorized(msg: &str) -> Response {
    log::trace!("respond_unauthorized( {:?} ) called.", msg);
    respond_error(StatusCode::UNAUTHORIZED, msg)
}

pub fn respond_forbidden() -> Response {
    respond_error(
        StatusCode::FORBIDDEN,
        "Your role doesn't permit this action.",
    )
}

pub fn respond_not_found(what: &str) -> Response {
    respond_error(StatusCode::NOT_FOUND, &format!("{} not found.", what))
}

/// Serialize `data` as the JSON body of a `code` response.
pub fn respond_json<T: Serialize>(code: StatusCode, data: &T) -> Response {
    (code, Json(data)).into_response()
}

/// Deserialize a required JSON request body.
pub fn parse_body<T: DeserializeOwned>(body: Option<String>) -> Result<T, Response> {
    let body = match body {
        Some(body) if !body.trim().is_empty() => body,
        _ => {
            return Err(respond_bad_request("Request requires a JSON body.".to_owned()));
        },
    };

    serde_json::from_str(&body).map_err(|e| {
        log::debug!("Error deserializing request body {:?}: {}", &body, &e);
        respond_bad_request(format!("Unable to parse request body: {}", &e))
    })
}

pub fn parse_query<T>(q: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    match q {
        Ok(Query(t)) => Ok(t),
        Err(e) => Err(respond_bad_request(format!("Invalid query parameters: {}", &e))),
    }
}

pub fn parse_page(q: Result<Query<PageQuery>, QueryRejection>) -> Result<Page, Response> {
    Page::from_query(parse_query(q)?).map_err(respond_bad_request)
}

/// Record ids in the path.
pub fn parse_id(p: Result<UrlPath<i64>, PathRejection>) -> Result<i64, Response> {
    match p {
        Ok(UrlPath(id)) => Ok(id),
        Err(e) => Err(respond_bad_request(format!("Invalid id: {}", &e))),
    }
}

pub fn require_role(user: &User, roles: &[Role]) -> Result<(), Response> {
    if roles.contains(&user.role) {
        Ok(())
    } else {
        log::debug!(
            "{} ({}) refused; needs one of {:?}.",
            &user.email, &user.role, roles
        );
        Err(respond_forbidden())
    }
}

pub const STAFF: &[Role] = &[Role::Admin, Role::Teacher];
pub const ADMIN: &[Role] = &[Role::Admin];

fn header_string<B>(req: &Request<B>, name: &str) -> Result<String, Response> {
    match req.headers().get(name) {
        Some(val) => match val.to_str() {
            Ok(s) => Ok(s.trim().to_owned()),
            Err(e) => {
                log::debug!("Failed converting {} value {:?} to &str: {}", name, val, &e);
                Err(respond_unauthorized(&format!("{} value unrecognizable.", name)))
            },
        },
        None => Err(respond_unauthorized("Authentication required.")),
    }
}

/// Middleware function to ensure the request comes from a user with a
/// valid key. The `User` is added to the request's extensions.
pub async fn key_authenticate<B>(
    mut req: Request<B>,
    next: Next<B>,
) -> Response {
    let email = match header_string(&req, EMAIL_HEADER) {
        Ok(s) => crate::user::normalize_email(&s),
        Err(r) => { return r; },
    };
    let key = match header_string(&req, KEY_HEADER) {
        Ok(s) => s,
        Err(r) => { return r; },
    };

    let glob: Arc<RwLock<Glob>> = match req.extensions().get::<Arc<RwLock<Glob>>>() {
        Some(glob) => glob.clone(),
        None => {
            log::error!("Global state missing from request extensions.");
            return json_500(None);
        },
    };

    // Return the result, then match on the returned value, so the locks
    // release.
    let res = glob.read().await.auth().read().await.check_key(
        &email, &key
    ).await;

    match res {
        Err(e) => {
            log::error!(
                "auth::Db::check_key( {:?}, {:?} ) returned error: {}",
                &email, &key, &e
            );
            return json_500(None);
        },
        Ok(AuthResult::InvalidKey) => {
            return respond_unauthorized("Invalid or expired authorization key.");
        },
        Ok(AuthResult::Ok) => {
            // The good path; carry on below.
        },
        Ok(x) => {
            log::warn!(
                "auth::Db::check_key() returned {:?}, which should never happen.",
                &x
            );
            return json_500(None);
        },
    }

    let res = glob.read().await.data().read().await.get_user_by_email(&email).await;
    let user = match res {
        Err(e) => { return db_500(e); },
        Ok(None) => {
            log::warn!("Valid key presented for nonexistent user {:?}.", &email);
            return respond_unauthorized("Invalid or expired authorization key.");
        },
        Ok(Some(u)) => u,
    };
    if !user.active {
        return respond_unauthorized("Account disabled.");
    }

    req.extensions_mut().insert(user);
    next.run(req).await
}

async fn index() -> Response {
    respond_json(StatusCode::OK, &json!({
        "message": "École Smart API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// The whole application.
pub fn router<P: AsRef<Path>>(glob: Arc<RwLock<Glob>>, static_dir: P) -> Router {
    let public = Router::new()
        .route("/", get(index))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/users", post(auth::create_user))
        .route("/students", get(students::list).post(students::create))
        .route(
            "/students/:id",
            get(students::get_one)
                .put(students::update)
                .delete(students::withdraw)
        )
        .route("/students/:id/grades", get(grades::for_student))
        .route("/students/:id/report-card", get(grades::report_card))
        .route("/invoices", get(invoices::list).post(invoices::create))
        .route("/invoices/:id", get(invoices::get_one))
        .route("/payments", get(payments::list))
        .route("/payments/initiate", post(payments::initiate))
        .route("/payments/:id", get(payments::get_one))
        .route("/payments/:id/simulate-success", post(payments::simulate_success))
        .route("/payments/:id/simulate-failure", post(payments::simulate_failure))
        .route("/attendance", get(attendance::list).post(attendance::record))
        .route("/attendance/batch", post(attendance::record_batch))
        .route("/subjects", get(grades::subjects))
        .route("/grades", post(grades::record))
        .route("/dashboard/stats", get(dashboard::stats))
        .route("/admin/kpi", get(admin::kpi))
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/users/active", put(admin::set_active))
        .route_layer(middleware::from_fn(key_authenticate));

    Router::new()
        .nest("/api", public.merge(protected))
        .fallback_service(ServeDir::new(static_dir))
        .layer(Extension(glob))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Cfg;
    use crate::grade::default_subjects;
    use crate::tests::ensure_logging;

    use axum::body::Body;
    use tower::ServiceExt;

    /// An application whose databases are never reached.
    pub fn test_app() -> Router {
        ensure_logging();
        let glob = Glob::from_cfg(Cfg::default(), default_subjects());
        router(Arc::new(RwLock::new(glob)), "static")
    }

    pub async fn body_json(r: Response) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(r.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn index_is_public() {
        let r = test_app()
            .oneshot(Request::builder().uri("/api/").body(Body::empty()).unwrap())
            .await.unwrap();
        assert_eq!(r.status(), StatusCode::OK);
        let v = body_json(r).await;
        assert_eq!(v["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn protected_routes_need_credentials() {
        for uri in ["/api/students", "/api/admin/kpi", "/api/dashboard/stats", "/api/auth/me"] {
            let r = test_app()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await.unwrap();
            assert_eq!(r.status(), StatusCode::UNAUTHORIZED, "{}", uri);
            assert!(body_json(r).await["error"].is_string());
        }

        // Email without a key.
        let req = Request::builder()
            .uri("/api/students")
            .header(EMAIL_HEADER, "admin@ecole-smart.gn")
            .body(Body::empty())
            .unwrap();
        let r = test_app().oneshot(req).await.unwrap();
        assert_eq!(r.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let r = test_app().oneshot(post_json("/api/auth/login", "{\"email\":")).await.unwrap();
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);

        let r = test_app().oneshot(post_json("/api/auth/login", "")).await.unwrap();
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(r).await["error"], "Request requires a JSON body.");
    }

    #[tokio::test]
    async fn registration_is_validated_before_storage() {
        let body = r#"{
            "email": "directeur@ecole.gn",
            "password": "secret123",
            "last_name": "Touré",
            "first_names": "Sékou",
            "role": "admin"
        }"#;
        let r = test_app().oneshot(post_json("/api/auth/register", body)).await.unwrap();
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);

        let body = r#"{
            "email": "parent@ecole.gn",
            "password": "12345",
            "last_name": "Touré",
            "first_names": "Sékou"
        }"#;
        let r = test_app().oneshot(post_json("/api/auth/register", body)).await.unwrap();
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn pages_and_ids_from_requests() {
        let q: Result<Query<PageQuery>, QueryRejection> = Ok(Query(PageQuery {
            page: Some(0),
            limit: None,
        }));
        assert!(parse_page(q).is_err());

        let q: Result<Query<PageQuery>, QueryRejection> = Ok(Query(PageQuery {
            page: Some(2),
            limit: Some(50),
        }));
        assert_eq!(parse_page(q).unwrap(), Page { page: 2, limit: 50 });

        let q: Result<Query<PageQuery>, QueryRejection> = Ok(Query(PageQuery {
            page: Some(i64::MAX),
            limit: Some(100),
        }));
        match parse_page(q) {
            Err(r) => assert_eq!(r.status(), StatusCode::BAD_REQUEST),
            Ok(p) => panic!("page {:?} should have been refused", &p),
        }
    }
}
