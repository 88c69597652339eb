/*!
Invoice issue and lookup.
*/
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Extension, Path as UrlPath, Query,
    },
    http::StatusCode,
};
use tokio::sync::RwLock;

use super::*;
use crate::{
    config::Glob,
    invoice::{InvoiceFilter, NewInvoice},
    page::PageQuery,
    user::User,
};

pub async fn create(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Extension(user): Extension<User>,
    body: Option<String>,
) -> Resp {
    require_role(&user, STAFF)?;
    let ni: NewInvoice = parse_body(body)?;
    log::trace!(
        "invoices::create( student {}, {:?}, {} ) called by {:?}.",
        ni.student_id, &ni.title, ni.total, &user.email
    );

    ni.validate().map_err(respond_bad_request)?;

    let res = glob.read().await.data().read().await.get_student(ni.student_id).await;
    if res.map_err(db_500)?.is_none() {
        return Err(respond_not_found("Student"));
    }

    let res = glob.read().await.data().read().await.insert_invoice(&ni).await;
    let invoice = res.map_err(db_500)?;
    log::info!(
        "Issued invoice {} for {} {} to student {}.",
        &invoice.number, invoice.total, crate::CURRENCY, invoice.student_id
    );

    Ok(respond_json(StatusCode::CREATED, &invoice))
}

pub async fn list(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    filter: Result<Query<InvoiceFilter>, QueryRejection>,
    page: Result<Query<PageQuery>, QueryRejection>,
) -> Resp {
    let filter = parse_query(filter)?;
    let page = parse_page(page)?;
    log::trace!("invoices::list( {:?}, {:?} ) called.", &filter, &page);

    let res = glob.read().await.data().read().await.get_invoices(&filter, page).await;
    let (invoices, total) = res.map_err(db_500)?;

    Ok(respond_json(StatusCode::OK, &page.wrap(invoices, total)))
}

pub async fn get_one(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    id: Result<UrlPath<i64>, PathRejection>,
) -> Resp {
    let id = parse_id(id)?;
    log::trace!("invoices::get_one( {} ) called.", id);

    let res = glob.read().await.data().read().await.get_invoice(id).await;
    match res.map_err(db_500)? {
        Some(inv) => Ok(respond_json(StatusCode::OK, &inv)),
        None => Err(respond_not_found("Invoice")),
    }
}
