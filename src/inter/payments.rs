/*!
Mobile-money payments: initiation by anyone, simulated operator
callbacks by administrators.
*/
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Extension, Path as UrlPath, Query,
    },
    http::StatusCode,
};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::*;
use crate::{
    config::Glob,
    page::PageQuery,
    payment::{instructions, Confirmed, Failure, Initiated, NewPayment, PaymentFilter},
    store::Outcome,
    user::User,
};

pub async fn initiate(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Extension(user): Extension<User>,
    body: Option<String>,
) -> Resp {
    let np: NewPayment = parse_body(body)?;
    log::trace!(
        "payments::initiate( invoice {}, {}, {:?} ) called by {:?}.",
        np.invoice_id, np.amount, &np.payer_phone, &user.email
    );

    let operator = np.validate().map_err(respond_bad_request)?;

    let res = glob.read().await.data().read().await.get_invoice(np.invoice_id).await;
    let invoice = match res.map_err(db_500)? {
        Some(inv) => inv,
        None => { return Err(respond_not_found("Invoice")); },
    };
    if let Err(refusal) = invoice.check_payable(np.amount) {
        return Err(respond_bad_request(refusal.to_string()));
    }

    let payer_name = match np.payer_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => match &invoice.student {
            Some(s) => format!("{} {}", &s.last_name, &s.first_names),
            None => user.full_name(),
        },
    };

    let now = OffsetDateTime::now_utc();
    let res = glob.read().await.data().read().await.insert_payment(
        &np, &invoice, operator, &payer_name, now
    ).await;
    let payment = res.map_err(db_500)?;
    log::info!(
        "Payment {} of {} {} initiated against invoice {} via {}.",
        &payment.reference, payment.amount, crate::CURRENCY,
        &invoice.number, &operator
    );

    let body = Initiated {
        success: true,
        reference: payment.reference,
        payment_id: payment.id,
        amount: payment.amount,
        operator,
        status: payment.status,
        instructions: instructions(operator),
    };
    Ok(respond_json(StatusCode::CREATED, &body))
}

pub async fn list(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    filter: Result<Query<PaymentFilter>, QueryRejection>,
    page: Result<Query<PageQuery>, QueryRejection>,
) -> Resp {
    let filter = parse_query(filter)?;
    let page = parse_page(page)?;
    log::trace!("payments::list( {:?}, {:?} ) called.", &filter, &page);

    let res = glob.read().await.data().read().await.get_payments(&filter, page).await;
    let (payments, total) = res.map_err(db_500)?;

    Ok(respond_json(StatusCode::OK, &page.wrap(payments, total)))
}

pub async fn get_one(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    id: Result<UrlPath<i64>, PathRejection>,
) -> Resp {
    let id = parse_id(id)?;
    log::trace!("payments::get_one( {} ) called.", id);

    let res = glob.read().await.data().read().await.get_payment(id).await;
    match res.map_err(db_500)? {
        Some(p) => Ok(respond_json(StatusCode::OK, &p)),
        None => Err(respond_not_found("Payment")),
    }
}

/// The operator reports the payer approved the payment.
pub async fn simulate_success(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Extension(user): Extension<User>,
    id: Result<UrlPath<i64>, PathRejection>,
) -> Resp {
    require_role(&user, ADMIN)?;
    let id = parse_id(id)?;
    log::trace!("payments::simulate_success( {} ) called by {:?}.", id, &user.email);

    let now = OffsetDateTime::now_utc();
    let res = glob.read().await.data().read().await.confirm_payment(id, now).await;
    match res.map_err(db_500)? {
        Outcome::Missing => Err(respond_not_found("Payment")),
        Outcome::Refused(why) => Err(respond_bad_request(why.to_string())),
        Outcome::Done((payment, balance)) => {
            let body = Confirmed {
                success: true,
                message: format!("Payment {} confirmed.", &payment.reference),
                invoice_status: balance.status,
                remaining: balance.remaining,
            };
            Ok(respond_json(StatusCode::OK, &body))
        },
    }
}

/// The operator reports the payment was declined (or never approved).
pub async fn simulate_failure(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Extension(user): Extension<User>,
    id: Result<UrlPath<i64>, PathRejection>,
    body: Option<String>,
) -> Resp {
    require_role(&user, ADMIN)?;
    let id = parse_id(id)?;
    let has_body = body.as_deref().map_or(false, |b| !b.trim().is_empty());
    let failure: Failure = if has_body {
        parse_body(body)?
    } else {
        Failure::default()
    };
    log::trace!(
        "payments::simulate_failure( {}, {:?} ) called by {:?}.",
        id, failure.reason(), &user.email
    );

    let now = OffsetDateTime::now_utc();
    let res = glob.read().await.data().read().await.fail_payment(
        id, failure.reason(), now
    ).await;
    match res.map_err(db_500)? {
        Outcome::Missing => Err(respond_not_found("Payment")),
        Outcome::Refused(why) => Err(respond_bad_request(why.to_string())),
        Outcome::Done(payment) => {
            log::info!(
                "Payment {} failed: {}.",
                &payment.reference, failure.reason()
            );
            Ok(respond_json(StatusCode::OK, &payment))
        },
    }
}
