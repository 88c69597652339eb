/*!
Subjects, grades and report cards.
*/
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Extension, Path as UrlPath, Query,
    },
    http::StatusCode,
};
use serde::Deserialize;
use tokio::sync::RwLock;

use super::*;
use crate::{
    config::Glob,
    grade::{report_card as build_report_card, NewGrade, Term},
    user::User,
};

#[derive(Debug, Default, Deserialize)]
pub struct TermQuery {
    pub term: Option<Term>,
}

pub async fn subjects(Extension(glob): Extension<Arc<RwLock<Glob>>>) -> Resp {
    log::trace!("grades::subjects() called.");
    Ok(respond_json(StatusCode::OK, &glob.read().await.subjects))
}

pub async fn record(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Extension(user): Extension<User>,
    body: Option<String>,
) -> Resp {
    require_role(&user, STAFF)?;
    let ng: NewGrade = parse_body(body)?;
    log::trace!(
        "grades::record( student {}, {:?}, {}, {} ) called by {:?}.",
        ng.student_id, &ng.subject, &ng.term, ng.score, &user.email
    );

    ng.validate(&glob.read().await.subjects).map_err(respond_bad_request)?;

    let res = glob.read().await.data().read().await.get_student(ng.student_id).await;
    if res.map_err(db_500)?.is_none() {
        return Err(respond_not_found("Student"));
    }

    let res = glob.read().await.data().read().await.insert_grade(&ng, user.id).await;
    let grade = res.map_err(db_500)?;
    Ok(respond_json(StatusCode::CREATED, &grade))
}

pub async fn for_student(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    id: Result<UrlPath<i64>, PathRejection>,
    term: Result<Query<TermQuery>, QueryRejection>,
) -> Resp {
    let id = parse_id(id)?;
    let term = parse_query(term)?.term;
    log::trace!("grades::for_student( {}, {:?} ) called.", id, &term);

    let res = glob.read().await.data().read().await.get_student(id).await;
    if res.map_err(db_500)?.is_none() {
        return Err(respond_not_found("Student"));
    }

    let res = glob.read().await.data().read().await.get_grades(id, term).await;
    let grades = res.map_err(db_500)?;
    Ok(respond_json(StatusCode::OK, &grades))
}

pub async fn report_card(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    id: Result<UrlPath<i64>, PathRejection>,
    term: Result<Query<TermQuery>, QueryRejection>,
) -> Resp {
    let id = parse_id(id)?;
    let term = match parse_query(term)?.term {
        Some(t) => t,
        None => {
            return Err(respond_bad_request(
                "A term (T1, T2 or T3) is required.".to_owned()
            ));
        },
    };
    log::trace!("grades::report_card( {}, {} ) called.", id, &term);

    let res = glob.read().await.data().read().await.get_student(id).await;
    if res.map_err(db_500)?.is_none() {
        return Err(respond_not_found("Student"));
    }

    let res = glob.read().await.data().read().await.get_grades(id, Some(term)).await;
    let grades = res.map_err(db_500)?;

    let card = build_report_card(id, term, &grades, &glob.read().await.subjects);
    Ok(respond_json(StatusCode::OK, &card))
}
