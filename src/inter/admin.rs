/*!
Subcrate for interoperation with Admin users: reporting and account
management.
*/
use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Extension, Query},
    http::StatusCode,
};
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::*;
use crate::{
    config::Glob,
    report::PeriodQuery,
    user::User,
};

pub async fn kpi(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Extension(user): Extension<User>,
    q: Result<Query<PeriodQuery>, QueryRejection>,
) -> Resp {
    require_role(&user, ADMIN)?;
    let period = parse_query(q)?.period;
    log::trace!("admin::kpi( {:?} ) called by {:?}.", &period, &user.email);

    let now = OffsetDateTime::now_utc();
    let res = glob.read().await.data().read().await.kpi(period, now).await;
    let kpi = res.map_err(db_500)?;

    Ok(respond_json(StatusCode::OK, &kpi))
}

pub async fn dashboard(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Extension(user): Extension<User>,
    q: Result<Query<PeriodQuery>, QueryRejection>,
) -> Resp {
    require_role(&user, ADMIN)?;
    let period = parse_query(q)?.period;
    log::trace!("admin::dashboard( {:?} ) called by {:?}.", &period, &user.email);

    let now = OffsetDateTime::now_utc();
    let res = glob.read().await.data().read().await.admin_dashboard(period, now).await;
    let dash = res.map_err(db_500)?;

    Ok(respond_json(StatusCode::OK, &dash))
}

#[derive(Debug, Deserialize)]
pub struct Activation {
    pub email: String,
    pub active: bool,
}

/// Enable or disable somebody's account. Disabled users can't log in and
/// their keys stop working.
pub async fn set_active(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Extension(user): Extension<User>,
    body: Option<String>,
) -> Resp {
    require_role(&user, ADMIN)?;
    let act: Activation = parse_body(body)?;
    log::trace!("admin::set_active( {:?} ) called by {:?}.", &act, &user.email);

    if !act.active && crate::user::normalize_email(&act.email) == user.email {
        return Err(respond_bad_request("You can't disable your own account.".to_owned()));
    }

    let res = glob.read().await.data().read().await.set_user_active(
        &act.email, act.active
    ).await;
    match res.map_err(db_500)? {
        Some(u) => {
            log::info!(
                "{} {} by {}.",
                &u.email, if u.active { "enabled" } else { "disabled" }, &user.email
            );
            Ok(respond_json(StatusCode::OK, &u))
        },
        None => Err(respond_not_found("User")),
    }
}
