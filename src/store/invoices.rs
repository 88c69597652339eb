/*!
`Store` methods for invoices.

Balances only ever change through `Store::confirm_payment()`, over in
`payments.rs`.
*/
use time::OffsetDateTime;
use tokio_postgres::Row;

use super::{
    is_unique_violation,
    students::{brief_from_row, BRIEF_COLUMNS},
    DbError, Filter, Store,
};
use crate::{
    invoice::{generate_number, Balance, Invoice, InvoiceBrief, InvoiceFilter, NewInvoice},
    page::Page,
};

const NUMBER_ATTEMPTS: usize = 5;

pub(super) fn invoice_from_row(row: &Row) -> Result<Invoice, DbError> {
    let status_str: &str = row.try_get("status")?;
    Ok(Invoice {
        id: row.try_get("id")?,
        number: row.try_get("number")?,
        student_id: row.try_get("student_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        total: row.try_get("total")?,
        paid: row.try_get("paid")?,
        remaining: row.try_get("remaining")?,
        currency: row.try_get("currency")?,
        issued: row.try_get("issued")?,
        due: row.try_get("due")?,
        status: status_str.parse()?,
        fee_types: row.try_get("fee_types")?,
        created: row.try_get("created")?,
        modified: row.try_get("modified")?,
        student: None,
    })
}

/// Invoice row with the student summary joined on.
fn joined_invoice_from_row(row: &Row) -> Result<Invoice, DbError> {
    let mut inv = invoice_from_row(row)?;
    inv.student = brief_from_row(row)?;
    Ok(inv)
}

/// Columns to select for a joined `InvoiceBrief`; invoices aliased `i`.
pub(super) const INVOICE_BRIEF_COLUMNS: &str = "i.id AS i_id, i.number AS i_number,
    i.title AS i_title, i.total AS i_total, i.remaining AS i_remaining,
    i.status AS i_status";

pub(super) fn invoice_brief_from_row(row: &Row) -> Result<Option<InvoiceBrief>, DbError> {
    let id: Option<i64> = row.try_get("i_id")?;
    let id = match id {
        Some(id) => id,
        None => { return Ok(None); },
    };

    let status_str: &str = row.try_get("i_status")?;
    Ok(Some(InvoiceBrief {
        id,
        number: row.try_get("i_number")?,
        title: row.try_get("i_title")?,
        total: row.try_get("i_total")?,
        remaining: row.try_get("i_remaining")?,
        status: status_str.parse()?,
    }))
}

impl Store {
    /// Issue a new invoice. The caller is responsible for checking the
    /// student exists.
    pub async fn insert_invoice(&self, ni: &NewInvoice) -> Result<Invoice, DbError> {
        log::trace!(
            "Store::insert_invoice( student {}, {:?}, {} ) called.",
            ni.student_id, &ni.title, ni.total
        );

        let balance = Balance::issued(ni.total);
        let client = self.connect().await?;

        for attempt in 1..=NUMBER_ATTEMPTS {
            let number = generate_number(OffsetDateTime::now_utc());
            let res = client.query_one(
                "INSERT INTO invoices (
                    number, student_id, title, description, total, paid,
                    remaining, currency, due, status, fee_types
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                RETURNING *",
                &[
                    &number,
                    &ni.student_id,
                    &ni.title.trim(),
                    &ni.description,
                    &balance.total,
                    &balance.paid,
                    &balance.remaining,
                    &crate::CURRENCY,
                    &ni.due,
                    &balance.status.as_str(),
                    &ni.fee_types,
                ]
            ).await;

            match res {
                Ok(row) => { return invoice_from_row(&row); },
                Err(e) if is_unique_violation(&e) => {
                    log::debug!(
                        "Invoice number {} already taken (attempt {}); retrying.",
                        &number, attempt
                    );
                },
                Err(e) => {
                    return Err(DbError::from(e).annotate("Error inserting invoice"));
                },
            }
        }

        Err(DbError(format!(
            "Unable to generate an unused invoice number after {} attempts.",
            NUMBER_ATTEMPTS
        )))
    }

    pub async fn get_invoice(&self, id: i64) -> Result<Option<Invoice>, DbError> {
        log::trace!("Store::get_invoice( {} ) called.", id);

        let client = self.connect().await?;
        let stmt = format!(
            "SELECT i.*, {} FROM invoices i
                LEFT JOIN students s ON s.id = i.student_id
                WHERE i.id = $1",
            BRIEF_COLUMNS
        );
        match client.query_opt(stmt.as_str(), &[&id]).await? {
            Some(row) => Ok(Some(joined_invoice_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// One page of invoices matching `filter`, most recently issued first,
    /// and the total number of matches.
    pub async fn get_invoices(
        &self,
        filter: &InvoiceFilter,
        page: Page,
    ) -> Result<(Vec<Invoice>, i64), DbError> {
        log::trace!("Store::get_invoices( {:?}, {:?} ) called.", filter, &page);

        let mut f = Filter::new();
        f.push_opt("i.student_id = $?", filter.student_id);
        f.push_opt(
            "i.status = ANY($?)",
            filter.statuses().map(|v| {
                v.iter().map(|s| s.as_str().to_owned()).collect::<Vec<String>>()
            })
        );
        let where_clause = f.where_clause();
        let params = f.params();

        let client = self.connect().await?;
        let count_stmt = format!("SELECT COUNT(*) FROM invoices i{}", &where_clause);
        let select_stmt = format!(
            "SELECT i.*, {} FROM invoices i
                LEFT JOIN students s ON s.id = i.student_id
                {}
                ORDER BY i.issued DESC, i.id DESC LIMIT {} OFFSET {}",
            BRIEF_COLUMNS, &where_clause, page.limit, page.offset()
        );

        let (count_res, rows_res) = tokio::join!(
            client.query_one(count_stmt.as_str(), &params),
            client.query(select_stmt.as_str(), &params),
        );
        let total: i64 = count_res?.try_get(0)?;
        let invoices = rows_res?.iter()
            .map(joined_invoice_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((invoices, total))
    }
}
