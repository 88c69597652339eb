/*!
General statistics, for anyone logged in.
*/
use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::*;
use crate::config::Glob;

pub async fn stats(Extension(glob): Extension<Arc<RwLock<Glob>>>) -> Resp {
    log::trace!("dashboard::stats() called.");

    let today = OffsetDateTime::now_utc().date();
    let res = glob.read().await.data().read().await.dashboard_stats(today).await;
    let stats = res.map_err(db_500)?;

    Ok(respond_json(StatusCode::OK, &stats))
}
