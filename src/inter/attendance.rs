/*!
Taking and reviewing attendance.
*/
use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Extension, Query},
    http::StatusCode,
};
use serde_json::json;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::*;
use crate::{
    attendance::{AttendanceFilter, NewAttendance, RollCall},
    config::Glob,
    page::PageQuery,
    store::RollOutcome,
    user::User,
};

fn id_list(ids: &[i64]) -> String {
    ids.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", ")
}

pub async fn record(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Extension(user): Extension<User>,
    body: Option<String>,
) -> Resp {
    require_role(&user, STAFF)?;
    let na: NewAttendance = parse_body(body)?;
    log::trace!(
        "attendance::record( student {}, {:?}, {:?}, {} ) called by {:?}.",
        na.student_id, &na.day, &na.subject, na.present, &user.email
    );

    na.validate().map_err(respond_bad_request)?;

    let res = glob.read().await.data().read().await.get_student(na.student_id).await;
    if res.map_err(db_500)?.is_none() {
        return Err(respond_not_found("Student"));
    }

    let day = na.day.unwrap_or_else(|| OffsetDateTime::now_utc().date());
    let res = glob.read().await.data().read().await.insert_attendance(
        &na, day, user.id
    ).await;
    match res.map_err(db_500)? {
        Some(a) => Ok(respond_json(StatusCode::CREATED, &a)),
        None => Err(respond_bad_request(format!(
            "Attendance for student {} in {} on {} has already been recorded.",
            na.student_id, na.subject.trim(), day
        ))),
    }
}

pub async fn record_batch(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Extension(user): Extension<User>,
    body: Option<String>,
) -> Resp {
    require_role(&user, STAFF)?;
    let rc: RollCall = parse_body(body)?;
    log::trace!(
        "attendance::record_batch( {:?}, {:?}, [ {} entries ] ) called by {:?}.",
        &rc.day, &rc.subject, rc.entries.len(), &user.email
    );

    rc.validate().map_err(respond_bad_request)?;

    let day = rc.day.unwrap_or_else(|| OffsetDateTime::now_utc().date());
    let res = glob.read().await.data().read().await.insert_roll_call(
        &rc, day, user.id
    ).await;
    match res.map_err(db_500)? {
        RollOutcome::Inserted(n) => Ok(respond_json(StatusCode::CREATED, &json!({
            "message": format!("{} attendance records saved.", n),
            "inserted": n,
        }))),
        RollOutcome::UnknownStudents(ids) => Err(respond_not_found(
            &format!("Students {}", id_list(&ids))
        )),
        RollOutcome::AlreadyRecorded(ids) => Err(respond_bad_request(format!(
            "Attendance in {} on {} already recorded for students {}.",
            rc.subject.trim(), day, id_list(&ids)
        ))),
    }
}

pub async fn list(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    filter: Result<Query<AttendanceFilter>, QueryRejection>,
    page: Result<Query<PageQuery>, QueryRejection>,
) -> Resp {
    let filter = parse_query(filter)?;
    let page = parse_page(page)?;
    log::trace!("attendance::list( {:?}, {:?} ) called.", &filter, &page);

    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(respond_bad_request(format!(
                "from ({}) is after to ({}).", from, to
            )));
        }
    }

    let res = glob.read().await.data().read().await.get_attendance(&filter, page).await;
    let (records, total) = res.map_err(db_500)?;

    Ok(respond_json(StatusCode::OK, &page.wrap(records, total)))
}
