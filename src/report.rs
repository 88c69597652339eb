/*!
Dashboards and administrative reporting.

The `Store` gathers the raw counts and sums (see `store::reports`); the
functions here turn them into the figures, alerts and trends the
dashboards show. Keeping this half free of database access means the
arithmetic can be checked directly.
*/
use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month, OffsetDateTime};

use crate::{
    attendance::rate,
    student::{ClassLevel, Cycle},
};

/// Classes attending less than this (percent) get flagged.
pub const ATTENDANCE_THRESHOLD: f64 = 75.0;
/// Invoices more than this many days overdue are high priority.
pub const LONG_OVERDUE_DAYS: i64 = 30;
/// How far ahead the calendar looks for due dates.
pub const CALENDAR_HORIZON_DAYS: i64 = 30;
pub const MAX_CRITICAL_ALERTS: usize = 10;
pub const MAX_RECENT_ACTIVITY: usize = 10;
pub const TREND_MONTHS: usize = 6;
pub const TOP_CLASSES: usize = 3;

//
//
// General statistics.
//
//

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassCount {
    pub class: ClassLevel,
    pub count: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StudentStats {
    pub total: i64,
    pub by_class: Vec<ClassCount>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FinanceStats {
    pub total_invoices: i64,
    pub unpaid_invoices: i64,
    pub total_outstanding: i64,
    pub succeeded_payments: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttendanceStats {
    pub absences_this_week: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DashboardStats {
    pub students: StudentStats,
    pub finances: FinanceStats,
    pub attendance: AttendanceStats,
}

/// Monday of the week containing `today`.
pub fn week_start(today: Date) -> Date {
    let back = today.weekday().number_days_from_monday() as i64;
    today - Duration::days(back)
}

//
//
// Reporting periods.
//
//

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Week,
    #[default]
    Month,
    Term,
    Year,
}

impl Period {
    /// First day of the period containing `today`.
    ///
    /// Terms are calendar quarters; years are school years, which begin
    /// on the first of September.
    pub fn start(&self, today: Date) -> Date {
        let first_of = |year: i32, month: Month| {
            Date::from_calendar_date(year, month, 1).unwrap_or(today)
        };

        match self {
            Period::Week => week_start(today),
            Period::Month => first_of(today.year(), today.month()),
            Period::Term => {
                let m = u8::from(today.month());
                let first = ((m - 1) / 3) * 3 + 1;
                match Month::try_from(first) {
                    Ok(month) => first_of(today.year(), month),
                    Err(_) => today,
                }
            },
            Period::Year => {
                if u8::from(today.month()) >= 9 {
                    first_of(today.year(), Month::September)
                } else {
                    first_of(today.year() - 1, Month::September)
                }
            },
        }
    }
}

/// Query parameters of the admin reporting endpoints.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct PeriodQuery {
    #[serde(default)]
    pub period: Period,
}

//
//
// Key performance indicators.
//
//

/// Raw figures for a period, as gathered from the database.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KpiInputs {
    pub total_enrollment: i64,
    pub attendance_present: i64,
    pub attendance_total: i64,
    /// Sum of totals of invoices issued during the period.
    pub billed: i64,
    /// Sum of what's been paid on those same invoices.
    pub billed_paid: i64,
    /// Sum of payments that succeeded during the period.
    pub payments_amount: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Kpi {
    pub period: Period,
    pub total_enrollment: i64,
    pub attendance_rate: f64,
    pub payments_rate: f64,
    pub payments_amount: i64,
    pub active_alerts: usize,
}

pub fn kpi(period: Period, inputs: &KpiInputs, alerts: &[Alert]) -> Kpi {
    let paid = inputs.billed_paid.min(inputs.billed);
    Kpi {
        period,
        total_enrollment: inputs.total_enrollment,
        attendance_rate: rate(inputs.attendance_present, inputs.attendance_total),
        payments_rate: rate(paid, inputs.billed),
        payments_amount: inputs.payments_amount,
        active_alerts: alerts.len(),
    }
}

//
//
// Alerts.
//
//

/// An unpaid invoice past its due date.
#[derive(Clone, Debug, PartialEq)]
pub struct OverdueInvoice {
    pub invoice_id: i64,
    pub number: String,
    pub student_name: String,
    pub remaining: i64,
    pub due: Date,
}

/// Per-class enrollment and attendance over a period.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassAttendance {
    pub class: ClassLevel,
    pub enrollment: i64,
    pub present: i64,
    pub total: i64,
}

impl ClassAttendance {
    pub fn rate(&self) -> f64 { rate(self.present, self.total) }

    /// Classes with no attendance taken aren't judged.
    pub fn needs_attention(&self) -> bool {
        self.total > 0 && self.rate() < ATTENDANCE_THRESHOLD
    }
}

// Variant order is the sort order: most urgent first.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    OverdueInvoice,
    LowAttendance,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Alert {
    pub id: String,
    pub kind: AlertKind,
    pub title: String,
    pub description: String,
    #[serde(with = "crate::iso_date")]
    pub created: Date,
    pub status: &'static str,
    pub priority: Priority,
}

/// Every alert that currently applies, most urgent (then oldest) first.
pub fn alerts(
    overdue: &[OverdueInvoice],
    classes: &[ClassAttendance],
    today: Date,
) -> Vec<Alert> {
    let mut v: Vec<Alert> = Vec::with_capacity(overdue.len() + classes.len());

    for inv in overdue.iter() {
        let days = (today - inv.due).whole_days();
        let priority = if days > LONG_OVERDUE_DAYS {
            Priority::High
        } else {
            Priority::Medium
        };
        v.push(Alert {
            id: format!("overdue-{}", inv.invoice_id),
            kind: AlertKind::OverdueInvoice,
            title: format!("Invoice {} overdue", &inv.number),
            description: format!(
                "{} owes {} {}; due {} days ago.",
                &inv.student_name, inv.remaining, crate::CURRENCY, days
            ),
            created: inv.due,
            status: "active",
            priority,
        });
    }

    for c in classes.iter().filter(|c| c.needs_attention()) {
        v.push(Alert {
            id: format!("attendance-{}", c.class.code()),
            kind: AlertKind::LowAttendance,
            title: format!("Low attendance in {}", c.class),
            description: format!(
                "Attendance in {} is {:.1}%, below {:.0}%.",
                c.class, c.rate(), ATTENDANCE_THRESHOLD
            ),
            created: today,
            status: "active",
            priority: Priority::High,
        });
    }

    v.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created.cmp(&b.created)));
    v
}

//
//
// Required actions.
//
//

/// A payment still waiting on operator confirmation.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingPayment {
    pub payment_id: i64,
    pub reference: String,
    pub amount: i64,
    pub payer_name: String,
    pub initiated: OffsetDateTime,
    pub expires: OffsetDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ConfirmPayment,
    ReviewExpiredPayment,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: ActionKind,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    pub status: &'static str,
}

/// Live payments need confirming; lapsed ones need to be failed.
pub fn required_actions(pending: &[PendingPayment], now: OffsetDateTime) -> Vec<ActionItem> {
    let mut v: Vec<ActionItem> = pending.iter()
        .map(|p| {
            let (kind, title) = if now > p.expires {
                (ActionKind::ReviewExpiredPayment, format!("Review expired payment {}", &p.reference))
            } else {
                (ActionKind::ConfirmPayment, format!("Confirm payment {}", &p.reference))
            };
            ActionItem {
                id: format!("payment-{}", p.payment_id),
                title,
                description: format!(
                    "{} {} from {}.", p.amount, crate::CURRENCY, &p.payer_name
                ),
                kind,
                created: p.initiated,
                status: "pending",
            }
        }).collect();

    v.sort_by(|a, b| a.created.cmp(&b.created));
    v
}

//
//
// Recent activity and calendar.
//
//

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Payment,
    Enrollment,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Activity {
    pub kind: ActivityKind,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

/// The `MAX_RECENT_ACTIVITY` newest entries, newest first.
pub fn recent_activity(mut events: Vec<Activity>) -> Vec<Activity> {
    events.sort_by(|a, b| b.at.cmp(&a.at));
    events.truncate(MAX_RECENT_ACTIVITY);
    events
}

/// Unpaid invoices falling due on one day.
#[derive(Clone, Debug, PartialEq)]
pub struct DueDate {
    pub day: Date,
    pub invoices: i64,
    pub outstanding: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CalendarEvent {
    #[serde(with = "crate::iso_date")]
    pub date: Date,
    pub kind: &'static str,
    pub title: String,
    pub description: String,
}

pub fn calendar_events(due: &[DueDate]) -> Vec<CalendarEvent> {
    let mut v: Vec<CalendarEvent> = due.iter()
        .filter(|d| d.invoices > 0)
        .map(|d| CalendarEvent {
            date: d.day,
            kind: "invoice_due",
            title: if d.invoices == 1 {
                "1 invoice due".to_owned()
            } else {
                format!("{} invoices due", d.invoices)
            },
            description: format!("{} {} outstanding.", d.outstanding, crate::CURRENCY),
        }).collect();

    v.sort_by(|a, b| a.date.cmp(&b.date));
    v
}

//
//
// Class statistics and trends.
//
//

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassStat {
    pub class: ClassLevel,
    pub cycle: Cycle,
    pub enrollment: i64,
    pub attendance_rate: f64,
}

pub fn class_stats(classes: &[ClassAttendance]) -> Vec<ClassStat> {
    let mut v: Vec<ClassStat> = classes.iter()
        .map(|c| ClassStat {
            class: c.class,
            cycle: c.class.cycle(),
            enrollment: c.enrollment,
            attendance_rate: c.rate(),
        }).collect();
    v.sort_by(|a, b| a.class.cmp(&b.class));
    v
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthValue {
    /// "YYYY-MM"
    pub month: String,
    pub value: i64,
}

/// The `n` months up to and including `today`'s, oldest first.
pub fn months_back(today: Date, n: usize) -> Vec<(i32, u8)> {
    let mut v: Vec<(i32, u8)> = Vec::with_capacity(n);
    let (mut y, mut m) = (today.year(), u8::from(today.month()));
    for _ in 0..n {
        v.push((y, m));
        if m == 1 {
            y -= 1;
            m = 12;
        } else {
            m -= 1;
        }
    }
    v.reverse();
    v
}

/// Spread `(year, month, value)` buckets over the last `TREND_MONTHS`
/// months; months without a bucket are zero.
pub fn monthly_series(buckets: &[(i32, u8, i64)], today: Date) -> Vec<MonthValue> {
    months_back(today, TREND_MONTHS).into_iter()
        .map(|(y, m)| {
            let value = buckets.iter()
                .filter(|(by, bm, _)| *by == y && *bm == m)
                .map(|(_, _, v)| *v)
                .sum();
            MonthValue { month: format!("{:04}-{:02}", y, m), value }
        }).collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Trends {
    pub enrollment_by_month: Vec<MonthValue>,
    pub payments_by_month: Vec<MonthValue>,
    pub top_attendance_classes: Vec<ClassStat>,
    pub classes_needing_attention: Vec<ClassStat>,
}

pub fn trends(
    enrollments: &[(i32, u8, i64)],
    payments: &[(i32, u8, i64)],
    classes: &[ClassAttendance],
    today: Date,
) -> Trends {
    let mut measured: Vec<&ClassAttendance> = classes.iter()
        .filter(|c| c.total > 0)
        .collect();
    measured.sort_by(|a, b| b.rate()
        .partial_cmp(&a.rate())
        .unwrap_or(std::cmp::Ordering::Equal)
        .then(a.class.cmp(&b.class))
    );

    let to_stat = |c: &ClassAttendance| ClassStat {
        class: c.class,
        cycle: c.class.cycle(),
        enrollment: c.enrollment,
        attendance_rate: c.rate(),
    };

    let top_attendance_classes = measured.iter()
        .take(TOP_CLASSES)
        .map(|c| to_stat(c))
        .collect();
    let mut classes_needing_attention: Vec<ClassStat> = measured.iter()
        .filter(|c| c.needs_attention())
        .map(|c| to_stat(c))
        .collect();
    classes_needing_attention.reverse();

    Trends {
        enrollment_by_month: monthly_series(enrollments, today),
        payments_by_month: monthly_series(payments, today),
        top_attendance_classes,
        classes_needing_attention,
    }
}

//
//
// The whole administrator dashboard.
//
//

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AdminDashboard {
    pub kpi: Kpi,
    pub critical_alerts: Vec<Alert>,
    pub required_actions: Vec<ActionItem>,
    pub recent_activity: Vec<Activity>,
    pub calendar_events: Vec<CalendarEvent>,
    pub class_stats: Vec<ClassStat>,
    pub trends: Trends,
}

/// Everything the `Store` gathers for the administrator dashboard.
#[derive(Clone, Debug, Default)]
pub struct DashboardInputs {
    pub kpi: KpiInputs,
    pub overdue: Vec<OverdueInvoice>,
    pub classes: Vec<ClassAttendance>,
    pub pending: Vec<PendingPayment>,
    pub activity: Vec<Activity>,
    pub due: Vec<DueDate>,
    pub enrollments_by_month: Vec<(i32, u8, i64)>,
    pub payments_by_month: Vec<(i32, u8, i64)>,
}

pub fn admin_dashboard(
    period: Period,
    inputs: DashboardInputs,
    now: OffsetDateTime,
) -> AdminDashboard {
    let today = now.date();
    let all_alerts = alerts(&inputs.overdue, &inputs.classes, today);
    let kpi = kpi(period, &inputs.kpi, &all_alerts);

    let mut critical_alerts = all_alerts;
    critical_alerts.truncate(MAX_CRITICAL_ALERTS);

    AdminDashboard {
        kpi,
        critical_alerts,
        required_actions: required_actions(&inputs.pending, now),
        recent_activity: recent_activity(inputs.activity),
        calendar_events: calendar_events(&inputs.due),
        class_stats: class_stats(&inputs.classes),
        trends: trends(
            &inputs.enrollments_by_month,
            &inputs.payments_by_month,
            &inputs.classes,
            today,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;
    use time::macros::{date, datetime};

    fn class(class: ClassLevel, enrollment: i64, present: i64, total: i64) -> ClassAttendance {
        ClassAttendance { class, enrollment, present, total }
    }

    fn overdue(id: i64, due: Date) -> OverdueInvoice {
        OverdueInvoice {
            invoice_id: id,
            number: format!("FACT-20240901-{:06}", id),
            student_name: "Kaba Aissatou".to_owned(),
            remaining: 300_000,
            due,
        }
    }

    #[test]
    fn period_starts() {
        // A Wednesday.
        let today = date!(2024 - 11 - 13);
        assert_eq!(Period::Week.start(today), date!(2024 - 11 - 11));
        assert_eq!(Period::Month.start(today), date!(2024 - 11 - 01));
        assert_eq!(Period::Term.start(today), date!(2024 - 10 - 01));
        assert_eq!(Period::Year.start(today), date!(2024 - 09 - 01));

        let today = date!(2025 - 02 - 03);
        assert_eq!(Period::Term.start(today), date!(2025 - 01 - 01));
        assert_eq!(Period::Year.start(today), date!(2024 - 09 - 01));
        // Mondays start their own week.
        assert_eq!(Period::Week.start(today), today);
    }

    #[test]
    fn period_from_query() {
        let q: PeriodQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.period, Period::Month);
        let q: PeriodQuery = serde_json::from_str(r#"{"period": "term"}"#).unwrap();
        assert_eq!(q.period, Period::Term);
        assert!(serde_json::from_str::<PeriodQuery>(r#"{"period": "decade"}"#).is_err());
    }

    #[test]
    fn kpi_figures() {
        let inputs = KpiInputs {
            total_enrollment: 1247,
            attendance_present: 180,
            attendance_total: 200,
            billed: 2_000_000,
            billed_paid: 1_500_000,
            payments_amount: 3_250_000,
        };
        let k = kpi(Period::Month, &inputs, &[]);
        assert_eq!(k.total_enrollment, 1247);
        assert!(approx_eq!(f64, k.attendance_rate, 90.0));
        assert!(approx_eq!(f64, k.payments_rate, 75.0));
        assert_eq!(k.payments_amount, 3_250_000);
        assert_eq!(k.active_alerts, 0);

        let k = kpi(Period::Week, &KpiInputs::default(), &[]);
        assert!(approx_eq!(f64, k.attendance_rate, 0.0));
        assert!(approx_eq!(f64, k.payments_rate, 0.0));
    }

    #[test]
    fn overpaid_invoices_cap_payment_rate() {
        let inputs = KpiInputs { billed: 100_000, billed_paid: 150_000, ..Default::default() };
        assert!(approx_eq!(f64, kpi(Period::Month, &inputs, &[]).payments_rate, 100.0));
    }

    #[test]
    fn alerts_are_prioritised() {
        let today = date!(2024 - 11 - 13);
        let a = alerts(
            &[
                overdue(1, date!(2024 - 11 - 01)),
                overdue(2, date!(2024 - 09 - 30)),
            ],
            &[
                class(ClassLevel::Cm1, 30, 70, 100),
                class(ClassLevel::Cm2, 30, 90, 100),
                class(ClassLevel::Ce1, 30, 0, 0),
            ],
            today,
        );

        assert_eq!(a.len(), 3);
        // High priority, oldest first.
        assert_eq!(a[0].id, "overdue-2");
        assert_eq!(a[0].priority, Priority::High);
        assert_eq!(a[1].kind, AlertKind::LowAttendance);
        assert_eq!(a[1].priority, Priority::High);
        assert_eq!(a[2].id, "overdue-1");
        assert_eq!(a[2].priority, Priority::Medium);
        assert!(a.iter().all(|x| x.status == "active"));
    }

    #[test]
    fn pending_payment_actions() {
        let now = datetime!(2024-11-13 10:00 UTC);
        let pending = vec![
            PendingPayment {
                payment_id: 1,
                reference: "PAY_A".to_owned(),
                amount: 50_000,
                payer_name: "Sylla Ibrahima".to_owned(),
                initiated: datetime!(2024-11-13 09:50 UTC),
                expires: datetime!(2024-11-13 10:20 UTC),
            },
            PendingPayment {
                payment_id: 2,
                reference: "PAY_B".to_owned(),
                amount: 20_000,
                payer_name: "Camara Mariama".to_owned(),
                initiated: datetime!(2024-11-13 09:00 UTC),
                expires: datetime!(2024-11-13 09:05 UTC),
            },
        ];
        let acts = required_actions(&pending, now);
        assert_eq!(acts.len(), 2);
        assert_eq!(acts[0].kind, ActionKind::ReviewExpiredPayment);
        assert_eq!(acts[1].kind, ActionKind::ConfirmPayment);
        assert_eq!(acts[1].id, "payment-1");
    }

    #[test]
    fn activity_is_newest_first_and_bounded() {
        let base = datetime!(2024-11-01 00:00 UTC);
        let events: Vec<Activity> = (0..15)
            .map(|n| Activity {
                kind: ActivityKind::Payment,
                description: format!("event {}", n),
                at: base + Duration::hours(n),
            }).collect();
        let recent = recent_activity(events);
        assert_eq!(recent.len(), MAX_RECENT_ACTIVITY);
        assert_eq!(recent[0].description, "event 14");
        assert_eq!(recent[9].description, "event 5");
    }

    #[test]
    fn calendar() {
        let ev = calendar_events(&[
            DueDate { day: date!(2024 - 11 - 30), invoices: 3, outstanding: 900_000 },
            DueDate { day: date!(2024 - 11 - 20), invoices: 1, outstanding: 150_000 },
        ]);
        assert_eq!(ev.len(), 2);
        assert_eq!(ev[0].date, date!(2024 - 11 - 20));
        assert_eq!(ev[0].title, "1 invoice due");
        assert_eq!(ev[1].title, "3 invoices due");
    }

    #[test]
    fn months() {
        assert_eq!(
            months_back(date!(2025 - 02 - 10), 4),
            vec![(2024, 11), (2024, 12), (2025, 1), (2025, 2)]
        );

        let s = monthly_series(&[(2025, 1, 5), (2024, 9, 7), (2023, 1, 100)], date!(2025 - 02 - 10));
        assert_eq!(s.len(), TREND_MONTHS);
        assert_eq!(s[0].month, "2024-09");
        assert_eq!(s[0].value, 7);
        assert_eq!(s[4].month, "2025-01");
        assert_eq!(s[4].value, 5);
        assert_eq!(s[5].value, 0);
    }

    #[test]
    fn class_trends() {
        let classes = vec![
            class(ClassLevel::Cm1, 30, 70, 100),
            class(ClassLevel::Cm2, 25, 95, 100),
            class(ClassLevel::Ce1, 20, 0, 0),
            class(ClassLevel::Terminale, 40, 80, 100),
            class(ClassLevel::Cp1, 35, 60, 100),
        ];
        let t = trends(&[], &[], &classes, date!(2024 - 11 - 13));
        let top: Vec<ClassLevel> = t.top_attendance_classes.iter().map(|c| c.class).collect();
        assert_eq!(top, vec![ClassLevel::Cm2, ClassLevel::Terminale, ClassLevel::Cm1]);
        let attn: Vec<ClassLevel> = t.classes_needing_attention.iter().map(|c| c.class).collect();
        // Worst first.
        assert_eq!(attn, vec![ClassLevel::Cp1, ClassLevel::Cm1]);

        let stats = class_stats(&classes);
        assert_eq!(stats[0].class, ClassLevel::Cp1);
        assert_eq!(stats[0].cycle, Cycle::Primary);
        assert_eq!(stats.len(), 5);
    }

    #[test]
    fn dashboard_kpi_matches_standalone_kpi() {
        let now = datetime!(2024-11-13 10:00 UTC);
        let inputs = DashboardInputs {
            kpi: KpiInputs {
                total_enrollment: 3,
                attendance_present: 7,
                attendance_total: 10,
                billed: 500_000,
                billed_paid: 100_000,
                payments_amount: 100_000,
            },
            overdue: (1..=12).map(|n| overdue(n, date!(2024 - 11 - 01))).collect(),
            classes: vec![class(ClassLevel::Cm1, 3, 7, 10)],
            ..Default::default()
        };

        let standalone = kpi(
            Period::Month,
            &inputs.kpi,
            &alerts(&inputs.overdue, &inputs.classes, now.date()),
        );
        let d = admin_dashboard(Period::Month, inputs, now);
        assert_eq!(d.kpi, standalone);
        assert_eq!(d.kpi.active_alerts, 13);
        assert_eq!(d.critical_alerts.len(), MAX_CRITICAL_ALERTS);
        assert_eq!(d.critical_alerts[0].kind, AlertKind::LowAttendance);
    }

    #[test]
    fn week_starts_on_monday() {
        assert_eq!(week_start(date!(2024 - 11 - 17)), date!(2024 - 11 - 11));
        assert_eq!(week_start(date!(2024 - 11 - 11)), date!(2024 - 11 - 11));
    }
}
