/*!
Enrollment and student records.
*/
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Extension, Path as UrlPath, Query,
    },
    http::StatusCode,
};
use serde_json::json;
use tokio::sync::RwLock;

use super::*;
use crate::{
    config::Glob,
    page::PageQuery,
    student::{NewStudent, StudentFilter, StudentUpdate},
    user::User,
};

pub async fn list(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    filter: Result<Query<StudentFilter>, QueryRejection>,
    page: Result<Query<PageQuery>, QueryRejection>,
) -> Resp {
    let filter = parse_query(filter)?;
    let page = parse_page(page)?;
    log::trace!("students::list( {:?}, {:?} ) called.", &filter, &page);

    let res = glob.read().await.data().read().await.get_students(&filter, page).await;
    let (students, total) = res.map_err(db_500)?;

    Ok(respond_json(StatusCode::OK, &page.wrap(students, total)))
}

pub async fn create(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Extension(user): Extension<User>,
    body: Option<String>,
) -> Resp {
    require_role(&user, STAFF)?;
    let ns: NewStudent = parse_body(body)?;
    log::trace!(
        "students::create( {:?} {:?} ) called by {:?}.",
        &ns.last_name, &ns.first_names, &user.email
    );

    ns.validate().map_err(respond_bad_request)?;

    let student = {
        let glob = glob.read().await;
        let data = glob.data();
        let res = data.read().await.insert_student(&ns, &glob.school_year).await;
        res.map_err(db_500)?
    };
    log::info!("Enrolled {} as {}.", &student.full_name(), &student.matricule);

    Ok(respond_json(StatusCode::CREATED, &json!({
        "message": format!("Student enrolled with matricule {}.", &student.matricule),
        "student": student,
    })))
}

pub async fn get_one(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    id: Result<UrlPath<i64>, PathRejection>,
) -> Resp {
    let id = parse_id(id)?;
    log::trace!("students::get_one( {} ) called.", id);

    let res = glob.read().await.data().read().await.get_student(id).await;
    match res.map_err(db_500)? {
        Some(s) => Ok(respond_json(StatusCode::OK, &s)),
        None => Err(respond_not_found("Student")),
    }
}

pub async fn update(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Extension(user): Extension<User>,
    id: Result<UrlPath<i64>, PathRejection>,
    body: Option<String>,
) -> Resp {
    require_role(&user, STAFF)?;
    let id = parse_id(id)?;
    let su: StudentUpdate = parse_body(body)?;
    log::trace!("students::update( {}, {:?} ) called by {:?}.", id, &su, &user.email);

    su.validate().map_err(respond_bad_request)?;
    if su.is_empty() {
        return Err(respond_bad_request("Nothing to update.".to_owned()));
    }

    let res = glob.read().await.data().read().await.update_student(id, &su).await;
    match res.map_err(db_500)? {
        Some(s) => Ok(respond_json(StatusCode::OK, &s)),
        None => Err(respond_not_found("Student")),
    }
}

pub async fn withdraw(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Extension(user): Extension<User>,
    id: Result<UrlPath<i64>, PathRejection>,
) -> Resp {
    require_role(&user, ADMIN)?;
    let id = parse_id(id)?;
    log::trace!("students::withdraw( {} ) called by {:?}.", id, &user.email);

    let res = glob.read().await.data().read().await.withdraw_student(id).await;
    match res.map_err(db_500)? {
        Some(s) => {
            log::info!("Withdrew {} ({}).", &s.full_name(), &s.matricule);
            Ok(respond_json(StatusCode::OK, &json!({
                "message": "Student withdrawn.",
                "student": s,
            })))
        },
        None => Err(respond_not_found("Student")),
    }
}
