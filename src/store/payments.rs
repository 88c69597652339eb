/*!
`Store` methods for payments, including the two that move a payment out
of the `initiated` state.

Confirming a payment is the one place an invoice's balance changes. The
payment and invoice rows are both locked for the duration, so two
confirmations can't interleave and a payment can't be applied twice.
*/
use time::OffsetDateTime;
use tokio_postgres::{Row, types::ToSql};

use super::{
    invoices::{invoice_brief_from_row, invoice_from_row, INVOICE_BRIEF_COLUMNS},
    students::{brief_from_row, BRIEF_COLUMNS},
    DbError, Filter, Store,
};
use crate::{
    invoice::{Balance, Invoice},
    page::Page,
    payment::{
        confirmation_window, generate_operator_reference, generate_reference,
        NewPayment, Payment, PaymentFilter, PaymentStatus, Unconfirmable,
    },
    phone::{self, Operator},
};

/// What came of an attempt to move a payment out of `initiated`.
#[derive(Debug)]
pub enum Outcome<T> {
    /// No payment with that id.
    Missing,
    Refused(Unconfirmable),
    Done(T),
}

fn payment_from_row(row: &Row) -> Result<Payment, DbError> {
    let status_str: &str = row.try_get("status")?;
    let operator_str: &str = row.try_get("operator")?;

    Ok(Payment {
        id: row.try_get("id")?,
        reference: row.try_get("reference")?,
        invoice_id: row.try_get("invoice_id")?,
        student_id: row.try_get("student_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        method: row.try_get("method")?,
        status: status_str.parse()?,
        payer_phone: row.try_get("payer_phone")?,
        payer_name: row.try_get("payer_name")?,
        operator: operator_str.parse()?,
        initiated: row.try_get("initiated")?,
        expires: row.try_get("expires")?,
        completed: row.try_get("completed")?,
        operator_reference: row.try_get("operator_reference")?,
        failure_reason: row.try_get("failure_reason")?,
        student: None,
        invoice: None,
    })
}

fn joined_payment_from_row(row: &Row) -> Result<Payment, DbError> {
    let mut p = payment_from_row(row)?;
    p.student = brief_from_row(row)?;
    p.invoice = invoice_brief_from_row(row)?;
    Ok(p)
}

fn joined_select() -> String {
    format!(
        "SELECT p.*, {}, {} FROM payments p
            LEFT JOIN students s ON s.id = p.student_id
            LEFT JOIN invoices i ON i.id = p.invoice_id",
        BRIEF_COLUMNS, INVOICE_BRIEF_COLUMNS
    )
}

impl Store {
    /**
    Record a newly-initiated payment of `np.amount` against `invoice`.

    Validation (amount, phone, balance) is the caller's job; this just
    stamps on a reference and the operator's confirmation deadline.
    */
    pub async fn insert_payment(
        &self,
        np: &NewPayment,
        invoice: &Invoice,
        operator: Operator,
        payer_name: &str,
        now: OffsetDateTime,
    ) -> Result<Payment, DbError> {
        log::trace!(
            "Store::insert_payment( invoice {}, {}, {}, {:?} ) called.",
            invoice.id, np.amount, &operator, payer_name
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO payments (
                reference, invoice_id, student_id, amount, currency, method,
                status, payer_phone, payer_name, operator, initiated, expires
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *",
            &[
                &generate_reference(now),
                &invoice.id,
                &invoice.student_id,
                &np.amount,
                &crate::CURRENCY,
                &operator.method(),
                &PaymentStatus::Initiated.as_str(),
                &phone::normalize(&np.payer_phone),
                &payer_name,
                &operator.to_string(),
                &now,
                &(now + confirmation_window(operator)),
            ]
        ).await.map_err(|e| DbError::from(e).annotate("Error inserting payment"))?;

        payment_from_row(&row)
    }

    pub async fn get_payment(&self, id: i64) -> Result<Option<Payment>, DbError> {
        log::trace!("Store::get_payment( {} ) called.", id);

        let client = self.connect().await?;
        let stmt = format!("{} WHERE p.id = $1", joined_select());
        match client.query_opt(stmt.as_str(), &[&id]).await? {
            Some(row) => Ok(Some(joined_payment_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// One page of payments matching `filter`, newest first, and the total
    /// number of matches.
    pub async fn get_payments(
        &self,
        filter: &PaymentFilter,
        page: Page,
    ) -> Result<(Vec<Payment>, i64), DbError> {
        log::trace!("Store::get_payments( {:?}, {:?} ) called.", filter, &page);

        let mut f = Filter::new();
        f.push_opt("p.student_id = $?", filter.student_id);
        f.push_opt("p.invoice_id = $?", filter.invoice_id);
        f.push_opt("p.status = $?", filter.status.map(|s| s.as_str().to_owned()));
        let where_clause = f.where_clause();
        let params = f.params();

        let client = self.connect().await?;
        let count_stmt = format!("SELECT COUNT(*) FROM payments p{}", &where_clause);
        let select_stmt = format!(
            "{}{} ORDER BY p.initiated DESC, p.id DESC LIMIT {} OFFSET {}",
            joined_select(), &where_clause, page.limit, page.offset()
        );

        let (count_res, rows_res) = tokio::join!(
            client.query_one(count_stmt.as_str(), &params),
            client.query(select_stmt.as_str(), &params),
        );
        let total: i64 = count_res?.try_get(0)?;
        let payments = rows_res?.iter()
            .map(joined_payment_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((payments, total))
    }

    /**
    Operator says the payment went through: apply it to its invoice.

    Refused unless the payment is still `initiated`. If its confirmation
    window has closed, it's marked `failed` instead (and still refused).
    On success returns the updated payment and the invoice's new balance.
    */
    pub async fn confirm_payment(
        &self,
        id: i64,
        now: OffsetDateTime,
    ) -> Result<Outcome<(Payment, Balance)>, DbError> {
        log::trace!("Store::confirm_payment( {}, {} ) called.", id, &now);

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e).annotate("Unable to begin transaction"))?;

        let payment = match t.query_opt(
            "SELECT * FROM payments WHERE id = $1 FOR UPDATE",
            &[&id]
        ).await? {
            Some(row) => payment_from_row(&row)?,
            None => { return Ok(Outcome::Missing); },
        };

        match payment.check_confirmable(now) {
            Ok(()) => {},
            Err(Unconfirmable::Expired) => {
                t.execute(
                    "UPDATE payments
                        SET status = $2, failure_reason = 'expired', completed = $3
                        WHERE id = $1",
                    &[&id, &PaymentStatus::Failed.as_str(), &now]
                ).await?;
                t.commit().await?;
                log::info!("Payment {} expired before confirmation.", &payment.reference);
                return Ok(Outcome::Refused(Unconfirmable::Expired));
            },
            Err(e) => { return Ok(Outcome::Refused(e)); },
        }

        let invoice = match t.query_opt(
            "SELECT * FROM invoices WHERE id = $1 FOR UPDATE",
            &[&payment.invoice_id]
        ).await? {
            Some(row) => invoice_from_row(&row)?,
            None => {
                return Err(DbError(format!(
                    "Payment {} refers to nonexistent invoice {}.",
                    &payment.reference, payment.invoice_id
                )));
            },
        };

        let balance = invoice.balance().after_payment(payment.amount);
        let operator_reference = generate_operator_reference();

        let inv_status = balance.status.as_str();
        let pay_status = PaymentStatus::Succeeded.as_str();
        let inv_params: [&(dyn ToSql + Sync); 5] = [
            &invoice.id, &balance.paid, &balance.remaining, &inv_status, &now,
        ];
        let pay_params: [&(dyn ToSql + Sync); 4] = [
            &id, &pay_status, &now, &operator_reference,
        ];

        let (inv_res, pay_res) = tokio::join!(
            t.execute(
                "UPDATE invoices
                    SET paid = $2, remaining = $3, status = $4, modified = $5
                    WHERE id = $1",
                &inv_params[..]
            ),
            t.query_one(
                "UPDATE payments
                    SET status = $2, completed = $3, operator_reference = $4
                    WHERE id = $1
                    RETURNING *",
                &pay_params[..]
            ),
        );
        inv_res.map_err(|e| DbError::from(e).annotate("Error updating invoice balance"))?;
        let payment = payment_from_row(
            &pay_res.map_err(|e| DbError::from(e).annotate("Error updating payment"))?
        )?;

        t.commit().await
            .map_err(|e| DbError::from(e).annotate("Error committing transaction"))?;

        log::info!(
            "Payment {} ({} {}) applied to invoice {}; now {}.",
            &payment.reference, payment.amount, crate::CURRENCY,
            &invoice.number, &balance.status
        );
        Ok(Outcome::Done((payment, balance)))
    }

    /// Operator says the payment didn't go through. Only `initiated`
    /// payments can fail; the invoice is untouched.
    pub async fn fail_payment(
        &self,
        id: i64,
        reason: &str,
        now: OffsetDateTime,
    ) -> Result<Outcome<Payment>, DbError> {
        log::trace!("Store::fail_payment( {}, {:?} ) called.", id, reason);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let payment = match t.query_opt(
            "SELECT * FROM payments WHERE id = $1 FOR UPDATE",
            &[&id]
        ).await? {
            Some(row) => payment_from_row(&row)?,
            None => { return Ok(Outcome::Missing); },
        };

        if payment.status != PaymentStatus::Initiated {
            return Ok(Outcome::Refused(Unconfirmable::NotPending(payment.status)));
        }

        let row = t.query_one(
            "UPDATE payments
                SET status = $2, failure_reason = $3, completed = $4
                WHERE id = $1
                RETURNING *",
            &[&id, &PaymentStatus::Failed.as_str(), &reason, &now]
        ).await?;
        let payment = payment_from_row(&row)?;
        t.commit().await?;

        Ok(Outcome::Done(payment))
    }
}
