/*!
Aggregate queries behind the dashboards.

Each query function here takes an open `Client` so the dashboard methods
can run them side by side over one connection; the arithmetic on their
results is in `crate::report`.
*/
use time::{Date, Duration, Month, OffsetDateTime};
use tokio_postgres::{Client, types::ToSql};

use super::{DbError, Store};
use crate::{
    report::{
        self, Activity, ActivityKind, AdminDashboard, AttendanceStats,
        ClassAttendance, ClassCount, DashboardInputs, DashboardStats, DueDate,
        FinanceStats, Kpi, KpiInputs, OverdueInvoice, PendingPayment, Period,
        StudentStats, CALENDAR_HORIZON_DAYS, MAX_RECENT_ACTIVITY, TREND_MONTHS,
    },
    student::ClassLevel,
};

async fn count(client: &Client, stmt: &str, since: Option<Date>) -> Result<i64, DbError> {
    let row = match since {
        Some(d) => client.query_one(stmt, &[&d]).await?,
        None => client.query_one(stmt, &[]).await?,
    };
    Ok(row.try_get(0)?)
}

async fn enrollment_by_class(client: &Client) -> Result<Vec<ClassCount>, DbError> {
    let rows = client.query(
        "SELECT class, COUNT(*) AS n FROM students WHERE enrolled GROUP BY class",
        &[]
    ).await?;

    let mut v = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let class_str: &str = row.try_get("class")?;
        v.push(ClassCount {
            class: class_str.parse::<ClassLevel>()?,
            count: row.try_get("n")?,
        });
    }
    v.sort_by(|a, b| a.class.cmp(&b.class));
    Ok(v)
}

async fn finance_stats(client: &Client) -> Result<FinanceStats, DbError> {
    let (inv_res, pay_res) = tokio::join!(
        client.query_one(
            "SELECT
                COUNT(*) AS total_invoices,
                COUNT(*) FILTER (WHERE status <> 'fully_paid') AS unpaid_invoices,
                COALESCE(SUM(remaining) FILTER (WHERE status <> 'fully_paid'), 0)::BIGINT
                    AS total_outstanding
            FROM invoices",
            &[]
        ),
        client.query_one(
            "SELECT COUNT(*) FROM payments WHERE status = 'succeeded'",
            &[]
        ),
    );
    let inv = inv_res?;

    Ok(FinanceStats {
        total_invoices: inv.try_get("total_invoices")?,
        unpaid_invoices: inv.try_get("unpaid_invoices")?,
        total_outstanding: inv.try_get("total_outstanding")?,
        succeeded_payments: pay_res?.try_get(0)?,
    })
}

async fn kpi_inputs(client: &Client, since: Date) -> Result<KpiInputs, DbError> {
    let params: [&(dyn ToSql + Sync); 1] = [&since];
    let (enrolled_res, att_res, billed_res, paid_res) = tokio::join!(
        count(client, "SELECT COUNT(*) FROM students WHERE enrolled", None),
        client.query_one(
            "SELECT COUNT(*) FILTER (WHERE present) AS present, COUNT(*) AS total
                FROM attendance WHERE day >= $1",
            &params[..]
        ),
        client.query_one(
            "SELECT
                COALESCE(SUM(total), 0)::BIGINT AS billed,
                COALESCE(SUM(paid), 0)::BIGINT AS paid
            FROM invoices WHERE issued >= $1::DATE",
            &params[..]
        ),
        client.query_one(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM payments
                WHERE status = 'succeeded' AND completed >= $1::DATE",
            &params[..]
        ),
    );
    let att = att_res?;
    let billed = billed_res?;

    Ok(KpiInputs {
        total_enrollment: enrolled_res?,
        attendance_present: att.try_get("present")?,
        attendance_total: att.try_get("total")?,
        billed: billed.try_get("billed")?,
        billed_paid: billed.try_get("paid")?,
        payments_amount: paid_res?.try_get(0)?,
    })
}

async fn overdue_invoices(client: &Client, today: Date) -> Result<Vec<OverdueInvoice>, DbError> {
    let rows = client.query(
        "SELECT i.id, i.number, i.remaining, i.due, s.last_name, s.first_names
            FROM invoices i LEFT JOIN students s ON s.id = i.student_id
            WHERE i.status <> 'fully_paid' AND i.due < $1
            ORDER BY i.due, i.id",
        &[&today]
    ).await?;

    let mut v = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let last: Option<String> = row.try_get("last_name")?;
        let first: Option<String> = row.try_get("first_names")?;
        let student_name = match (last, first) {
            (Some(l), Some(f)) => format!("{} {}", l, f),
            _ => "Unknown student".to_owned(),
        };
        v.push(OverdueInvoice {
            invoice_id: row.try_get("id")?,
            number: row.try_get("number")?,
            student_name,
            remaining: row.try_get("remaining")?,
            due: row.try_get("due")?,
        });
    }
    Ok(v)
}

async fn class_attendance(client: &Client, since: Date) -> Result<Vec<ClassAttendance>, DbError> {
    let rows = client.query(
        "SELECT s.class,
            COUNT(DISTINCT s.id) AS enrollment,
            COUNT(a.id) FILTER (WHERE a.present) AS present,
            COUNT(a.id) AS total
        FROM students s
            LEFT JOIN attendance a ON a.student_id = s.id AND a.day >= $1
        WHERE s.enrolled
        GROUP BY s.class",
        &[&since]
    ).await?;

    let mut v = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let class_str: &str = row.try_get("class")?;
        v.push(ClassAttendance {
            class: class_str.parse()?,
            enrollment: row.try_get("enrollment")?,
            present: row.try_get("present")?,
            total: row.try_get("total")?,
        });
    }
    Ok(v)
}

async fn pending_payments(client: &Client) -> Result<Vec<PendingPayment>, DbError> {
    let rows = client.query(
        "SELECT id, reference, amount, payer_name, initiated, expires
            FROM payments WHERE status = 'initiated'
            ORDER BY initiated",
        &[]
    ).await?;

    let mut v = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        v.push(PendingPayment {
            payment_id: row.try_get("id")?,
            reference: row.try_get("reference")?,
            amount: row.try_get("amount")?,
            payer_name: row.try_get("payer_name")?,
            initiated: row.try_get("initiated")?,
            expires: row.try_get("expires")?,
        });
    }
    Ok(v)
}

async fn latest_activity(client: &Client) -> Result<Vec<Activity>, DbError> {
    let n = MAX_RECENT_ACTIVITY as i64;
    let params: [&(dyn ToSql + Sync); 1] = [&n];
    let (pay_res, enr_res) = tokio::join!(
        client.query(
            "SELECT p.amount, p.payer_name, p.completed, i.number
                FROM payments p LEFT JOIN invoices i ON i.id = p.invoice_id
                WHERE p.status = 'succeeded' AND p.completed IS NOT NULL
                ORDER BY p.completed DESC LIMIT $1",
            &params[..]
        ),
        client.query(
            "SELECT last_name, first_names, class, enrollment_date
                FROM students ORDER BY enrollment_date DESC LIMIT $1",
            &params[..]
        ),
    );

    let mut v = Vec::new();
    for row in pay_res?.iter() {
        let amount: i64 = row.try_get("amount")?;
        let payer: &str = row.try_get("payer_name")?;
        let number: Option<String> = row.try_get("number")?;
        v.push(Activity {
            kind: ActivityKind::Payment,
            description: format!(
                "{} paid {} {} on invoice {}.",
                payer, amount, crate::CURRENCY,
                number.as_deref().unwrap_or("(unknown)")
            ),
            at: row.try_get("completed")?,
        });
    }
    for row in enr_res?.iter() {
        let last: &str = row.try_get("last_name")?;
        let first: &str = row.try_get("first_names")?;
        let class: &str = row.try_get("class")?;
        v.push(Activity {
            kind: ActivityKind::Enrollment,
            description: format!("{} {} enrolled in {}.", last, first, class),
            at: row.try_get("enrollment_date")?,
        });
    }
    Ok(v)
}

async fn upcoming_due_dates(client: &Client, today: Date) -> Result<Vec<DueDate>, DbError> {
    let horizon = today + Duration::days(CALENDAR_HORIZON_DAYS);
    let rows = client.query(
        "SELECT due, COUNT(*) AS n, COALESCE(SUM(remaining), 0)::BIGINT AS outstanding
            FROM invoices
            WHERE status <> 'fully_paid' AND due >= $1 AND due <= $2
            GROUP BY due",
        &[&today, &horizon]
    ).await?;

    let mut v = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        v.push(DueDate {
            day: row.try_get("due")?,
            invoices: row.try_get("n")?,
            outstanding: row.try_get("outstanding")?,
        });
    }
    Ok(v)
}

/// `(year, month, value)` buckets from a query selecting `y`, `m` and `n`.
async fn monthly(client: &Client, stmt: &str, since: Date) -> Result<Vec<(i32, u8, i64)>, DbError> {
    let rows = client.query(stmt, &[&since]).await?;
    let mut v = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let y: i32 = row.try_get("y")?;
        let m: i32 = row.try_get("m")?;
        v.push((y, m as u8, row.try_get("n")?));
    }
    Ok(v)
}

/// First day of the oldest month the trends cover.
fn trend_start(today: Date) -> Date {
    let (y, m) = report::months_back(today, TREND_MONTHS)
        .first()
        .copied()
        .unwrap_or((today.year(), u8::from(today.month())));
    Month::try_from(m).ok()
        .and_then(|month| Date::from_calendar_date(y, month, 1).ok())
        .unwrap_or(today)
}

impl Store {
    /// General figures for the everyone-dashboard. Absences are counted
    /// from the Monday of `today`'s week.
    pub async fn dashboard_stats(&self, today: Date) -> Result<DashboardStats, DbError> {
        log::trace!("Store::dashboard_stats( {} ) called.", &today);

        let client = self.connect().await?;
        let (total, by_class, finances, absences) = tokio::try_join!(
            count(&client, "SELECT COUNT(*) FROM students WHERE enrolled", None),
            enrollment_by_class(&client),
            finance_stats(&client),
            count(
                &client,
                "SELECT COUNT(*) FROM attendance WHERE NOT present AND day >= $1",
                Some(report::week_start(today))
            ),
        )?;

        Ok(DashboardStats {
            students: StudentStats { total, by_class },
            finances,
            attendance: AttendanceStats { absences_this_week: absences },
        })
    }

    pub async fn kpi(&self, period: Period, now: OffsetDateTime) -> Result<Kpi, DbError> {
        log::trace!("Store::kpi( {:?}, {} ) called.", &period, &now);

        let today = now.date();
        let since = period.start(today);

        let client = self.connect().await?;
        let (inputs, overdue, classes) = tokio::try_join!(
            kpi_inputs(&client, since),
            overdue_invoices(&client, today),
            class_attendance(&client, since),
        )?;

        let alerts = report::alerts(&overdue, &classes, today);
        Ok(report::kpi(period, &inputs, &alerts))
    }

    pub async fn admin_dashboard(
        &self,
        period: Period,
        now: OffsetDateTime,
    ) -> Result<AdminDashboard, DbError> {
        log::trace!("Store::admin_dashboard( {:?}, {} ) called.", &period, &now);

        let today = now.date();
        let since = period.start(today);
        let trends_since = trend_start(today);

        let client = self.connect().await?;
        let (
            kpi, overdue, classes, pending, activity, due,
            enrollments_by_month, payments_by_month,
        ) = tokio::try_join!(
            kpi_inputs(&client, since),
            overdue_invoices(&client, today),
            class_attendance(&client, since),
            pending_payments(&client),
            latest_activity(&client),
            upcoming_due_dates(&client, today),
            monthly(
                &client,
                "SELECT EXTRACT(YEAR FROM enrollment_date)::INT AS y,
                        EXTRACT(MONTH FROM enrollment_date)::INT AS m,
                        COUNT(*) AS n
                    FROM students WHERE enrollment_date >= $1::DATE
                    GROUP BY y, m",
                trends_since
            ),
            monthly(
                &client,
                "SELECT EXTRACT(YEAR FROM completed)::INT AS y,
                        EXTRACT(MONTH FROM completed)::INT AS m,
                        COALESCE(SUM(amount), 0)::BIGINT AS n
                    FROM payments
                    WHERE status = 'succeeded' AND completed >= $1::DATE
                    GROUP BY y, m",
                trends_since
            ),
        )?;

        let inputs = DashboardInputs {
            kpi,
            overdue,
            classes,
            pending,
            activity,
            due,
            enrollments_by_month,
            payments_by_month,
        };

        Ok(report::admin_dashboard(period, inputs, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::NewAttendance;
    use crate::store::{
        invoices::tests::new_invoice,
        tests::{fresh_store, insert_sample_student},
        Outcome,
    };
    use crate::payment::NewPayment;
    use crate::phone::Operator;

    use float_cmp::approx_eq;
    use serial_test::serial;
    use time::macros::date;

    #[test]
    fn trends_start_on_the_first() {
        assert_eq!(trend_start(date!(2025 - 02 - 17)), date!(2024 - 09 - 01));
        assert_eq!(trend_start(date!(2024 - 06 - 30)), date!(2024 - 01 - 01));
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn dashboards_agree() {
        let db = fresh_store().await;
        let now = OffsetDateTime::now_utc();
        let today = now.date();

        let a = insert_sample_student(&db, "Bangoura", ClassLevel::Cm1).await;
        let b = insert_sample_student(&db, "Cissé", ClassLevel::Cm1).await;
        insert_sample_student(&db, "Doumbouya", ClassLevel::Terminale).await;

        for (s, present) in [(a.id, true), (b.id, false)] {
            let na = NewAttendance {
                student_id: s,
                day: None,
                subject: "MATH".to_owned(),
                present,
                absence_reason: None,
            };
            db.insert_attendance(&na, today, 1).await.unwrap().unwrap();
        }

        let mut late = new_invoice(a.id, 300_000);
        late.due = today - Duration::days(45);
        let late = db.insert_invoice(&late).await.unwrap();
        let mut soon = new_invoice(b.id, 200_000);
        soon.due = today + Duration::days(3);
        db.insert_invoice(&soon).await.unwrap();

        let np = NewPayment {
            invoice_id: late.id,
            amount: 100_000,
            payer_phone: "62123456".to_owned(),
            payer_name: None,
        };
        let p = db.insert_payment(&np, &late, Operator::Orange, "Bangoura Fatou", now)
            .await.unwrap();
        assert!(matches!(db.confirm_payment(p.id, now).await.unwrap(), Outcome::Done(_)));

        let stats = db.dashboard_stats(today).await.unwrap();
        assert_eq!(stats.students.total, 3);
        assert_eq!(stats.students.by_class[0].class, ClassLevel::Cm1);
        assert_eq!(stats.students.by_class[0].count, 2);
        assert_eq!(stats.finances.total_invoices, 2);
        assert_eq!(stats.finances.unpaid_invoices, 2);
        assert_eq!(stats.finances.total_outstanding, 400_000);
        assert_eq!(stats.finances.succeeded_payments, 1);
        assert_eq!(stats.attendance.absences_this_week, 1);

        let kpi = db.kpi(Period::Year, now).await.unwrap();
        assert_eq!(kpi.total_enrollment, 3);
        assert!(approx_eq!(f64, kpi.attendance_rate, 50.0));
        assert!(approx_eq!(f64, kpi.payments_rate, 20.0));
        assert_eq!(kpi.payments_amount, 100_000);
        // One long-overdue invoice; CM1 at 50%.
        assert_eq!(kpi.active_alerts, 2);

        let dash = db.admin_dashboard(Period::Year, now).await.unwrap();
        assert_eq!(dash.kpi, kpi);
        assert_eq!(dash.calendar_events.len(), 1);
        assert_eq!(dash.trends.payments_by_month.last().unwrap().value, 100_000);
        assert_eq!(dash.trends.enrollment_by_month.last().unwrap().value, 3);
        assert_eq!(dash.trends.classes_needing_attention.len(), 1);
        assert!(dash.required_actions.is_empty());
        assert_eq!(dash.recent_activity.len(), 4);
        assert!(dash.recent_activity.iter().any(|a| a.kind == ActivityKind::Payment));

        db.nuke_database().await.unwrap();
    }
}
