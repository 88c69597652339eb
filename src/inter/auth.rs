/*!
Registration, login, and user creation.
*/
use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::Response};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::*;
use crate::{
    auth::AuthResult,
    config::Glob,
    user::{normalize_email, NewUser, Role, User},
};

/// Data type to read the body of a login request.
#[derive(Deserialize, Debug)]
pub struct LoginData {
    pub email: String,
    pub password: String,
}

/// What a successful login or registration gets back.
#[derive(Serialize)]
struct Session {
    key: String,
    user: User,
}

/// Store a user in both databases. Returns `None` if the email is taken.
async fn create(
    glob: &Arc<RwLock<Glob>>,
    nu: &NewUser,
    role: Role,
) -> Result<Option<User>, Response> {
    let res = glob.read().await.data().read().await.insert_user(nu, role).await;
    let user = match res.map_err(db_500)? {
        Some(u) => u,
        None => { return Ok(None); },
    };

    let res = glob.read().await.auth().read().await.add_user(
        &user.email, &nu.password
    ).await;
    if let Err(e) = res {
        log::error!("Error adding password for {:?} to auth DB: {}", &user.email, &e);
        let res = glob.read().await.data().read().await.delete_user(&user.email).await;
        if let Err(e) = res {
            log::error!(
                "Unable to back out user {:?}; profile left without a password: {}",
                &user.email, &e
            );
        }
        return Err(json_500(None));
    }

    log::info!("Created {} user {:?}.", &user.role, &user.email);
    Ok(Some(user))
}

async fn issue_key(glob: &Arc<RwLock<Glob>>, email: &str) -> Result<String, Response> {
    let res = glob.read().await.auth().read().await.issue_key(email).await;
    res.map_err(|e| {
        log::error!("auth::Db::issue_key( {:?} ) returned error: {}", email, &e);
        json_500(None)
    })
}

pub async fn register(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    body: Option<String>,
) -> Resp {
    let nu: NewUser = parse_body(body)?;
    log::trace!("register( {:?} ) called.", &nu.email);

    nu.validate().map_err(respond_bad_request)?;
    let role = nu.role();
    if !role.self_registrable() {
        return Err(respond_bad_request(format!(
            "Accounts with role {} must be created by an administrator.", &role
        )));
    }

    let user = match create(&glob, &nu, role).await? {
        Some(u) => u,
        None => {
            return Err(respond_bad_request("Email address already registered.".to_owned()));
        },
    };
    let key = issue_key(&glob, &user.email).await?;

    Ok(respond_json(StatusCode::CREATED, &Session { key, user }))
}

pub async fn login(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    body: Option<String>,
) -> Resp {
    let form: LoginData = parse_body(body)?;
    let email = normalize_email(&form.email);
    log::trace!("login( {:?} ) called.", &email);

    let res = glob.read().await.auth().read().await.check_password(
        &email, &form.password
    ).await;
    match res {
        Err(e) => {
            log::error!("auth::Db::check_password( {:?}, ... ) returned error: {}", &email, &e);
            return Err(json_500(None));
        },
        Ok(AuthResult::Ok) => {},
        Ok(AuthResult::BadPassword) | Ok(AuthResult::NoSuchUser) => {
            return Err(respond_unauthorized("Invalid email or password."));
        },
        Ok(x) => {
            log::warn!(
                "auth::Db::check_password( {:?}, ... ) returned {:?}, which shouldn't happen.",
                &email, &x
            );
            return Err(respond_unauthorized("Invalid email or password."));
        },
    }

    let res = glob.read().await.data().read().await.get_user_by_email(&email).await;
    let user = match res.map_err(db_500)? {
        Some(u) => u,
        None => {
            log::warn!("{:?} has a password but no user record.", &email);
            return Err(respond_unauthorized("Invalid email or password."));
        },
    };
    if !user.active {
        return Err(respond_unauthorized("Account disabled."));
    }

    let key = issue_key(&glob, &user.email).await?;
    Ok(respond_json(StatusCode::OK, &Session { key, user }))
}

pub async fn me(Extension(user): Extension<User>) -> Resp {
    log::trace!("me( {:?} ) called.", &user.email);
    Ok(respond_json(StatusCode::OK, &user))
}

/// Administrators may create users of any role.
pub async fn create_user(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Extension(user): Extension<User>,
    body: Option<String>,
) -> Resp {
    require_role(&user, ADMIN)?;
    let nu: NewUser = parse_body(body)?;
    log::trace!("create_user( {:?} ) called by {:?}.", &nu.email, &user.email);

    nu.validate().map_err(respond_bad_request)?;
    match create(&glob, &nu, nu.role()).await? {
        Some(u) => Ok(respond_json(StatusCode::CREATED, &u)),
        None => Err(respond_bad_request("Email address already registered.".to_owned())),
    }
}
