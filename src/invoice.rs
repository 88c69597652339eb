/*!
Invoices and their balance.

An invoice starts out `Issued` with nothing paid. Each successful payment
moves money from `remaining` to `paid`:

```text
issued ──payment──> partially_paid ──payment──> fully_paid
   └──────────────payment (whole balance)───────────┘
```

The balance invariant is `remaining == max(0, total - paid)`, and the
status is `FullyPaid` exactly when `total - paid <= 0`.
*/
use rand::Rng;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, macros::format_description};

use crate::{student::StudentBrief, user::check_length};

/// Smallest amount (GNF) a single payment may be for; payments must be
/// strictly larger.
pub const MIN_PAYMENT: i64 = 100;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Issued,
    PartiallyPaid,
    FullyPaid,
}

impl InvoiceStatus {
    /// Statuses that still have money owing.
    pub const UNPAID: [InvoiceStatus; 2] = [InvoiceStatus::Issued, InvoiceStatus::PartiallyPaid];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Issued        => "issued",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::FullyPaid     => "fully_paid",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issued"         => Ok(InvoiceStatus::Issued),
            "partially_paid" => Ok(InvoiceStatus::PartiallyPaid),
            "fully_paid"     => Ok(InvoiceStatus::FullyPaid),
            _ => Err(format!("{:?} is not a valid InvoiceStatus.", s)),
        }
    }
}

/// Amounts on an invoice after some number of payments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub total: i64,
    pub paid: i64,
    pub remaining: i64,
    pub status: InvoiceStatus,
}

impl Balance {
    /// A freshly-issued invoice for `total`.
    pub fn issued(total: i64) -> Balance {
        Balance {
            total,
            paid: 0,
            remaining: total,
            status: InvoiceStatus::Issued,
        }
    }

    /// The balance once a payment of `amount` has gone through.
    pub fn after_payment(&self, amount: i64) -> Balance {
        let paid = self.paid + amount;
        let owed = self.total - paid;
        let status = if owed <= 0 {
            InvoiceStatus::FullyPaid
        } else {
            InvoiceStatus::PartiallyPaid
        };

        Balance {
            total: self.total,
            paid,
            remaining: owed.max(0),
            status,
        }
    }
}

/// Reasons a payment can't be started against an invoice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Refusal {
    TooSmall,
    AlreadyPaid,
    ExceedsBalance { remaining: i64 },
}

impl std::fmt::Display for Refusal {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Refusal::TooSmall => write!(
                f, "Payment amount must be greater than {} {}.",
                MIN_PAYMENT, crate::CURRENCY
            ),
            Refusal::AlreadyPaid => write!(f, "Invoice already fully paid."),
            Refusal::ExceedsBalance { remaining } => write!(
                f, "Amount exceeds the balance due: {} {}.",
                remaining, crate::CURRENCY
            ),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Invoice {
    pub id: i64,
    pub number: String,
    pub student_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub total: i64,
    pub paid: i64,
    pub remaining: i64,
    pub currency: String,
    #[serde(with = "time::serde::rfc3339")]
    pub issued: OffsetDateTime,
    #[serde(with = "crate::iso_date")]
    pub due: Date,
    pub status: InvoiceStatus,
    pub fee_types: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
    /// Joined at read time; `None` if the student record is gone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentBrief>,
}

impl Invoice {
    pub fn balance(&self) -> Balance {
        Balance {
            total: self.total,
            paid: self.paid,
            remaining: self.remaining,
            status: self.status,
        }
    }

    /// Whether a payment of `amount` may be initiated against this invoice.
    pub fn check_payable(&self, amount: i64) -> Result<(), Refusal> {
        if amount <= MIN_PAYMENT {
            return Err(Refusal::TooSmall);
        }
        if self.status == InvoiceStatus::FullyPaid {
            return Err(Refusal::AlreadyPaid);
        }
        if amount > self.remaining {
            return Err(Refusal::ExceedsBalance { remaining: self.remaining });
        }
        Ok(())
    }

    pub fn is_overdue(&self, today: Date) -> bool {
        self.status != InvoiceStatus::FullyPaid && self.due < today
    }
}

/// What gets joined onto payment listings.
#[derive(Clone, Debug, Serialize)]
pub struct InvoiceBrief {
    pub id: i64,
    pub number: String,
    pub title: String,
    pub total: i64,
    pub remaining: i64,
    pub status: InvoiceStatus,
}

fn default_fee_types() -> Vec<String> {
    vec!["tuition".to_owned()]
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewInvoice {
    pub student_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub total: i64,
    #[serde(with = "crate::iso_date")]
    pub due: Date,
    #[serde(default = "default_fee_types")]
    pub fee_types: Vec<String>,
}

impl NewInvoice {
    pub fn validate(&self) -> Result<(), String> {
        check_length("title", &self.title, 5, 200)?;
        if self.total <= 0 {
            return Err(format!(
                "Invoice total must be positive (got {}).", self.total
            ));
        }
        if self.fee_types.is_empty() {
            return Err("An invoice needs at least one fee type.".to_owned());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct InvoiceFilter {
    pub student_id: Option<i64>,
    pub status: Option<InvoiceStatus>,
    /// Overrides `status`.
    #[serde(default)]
    pub unpaid_only: bool,
}

impl InvoiceFilter {
    /// Statuses to restrict the listing to, or `None` for all of them.
    pub fn statuses(&self) -> Option<Vec<InvoiceStatus>> {
        if self.unpaid_only {
            Some(InvoiceStatus::UNPAID.to_vec())
        } else {
            self.status.map(|s| vec![s])
        }
    }
}

/// Generate an invoice number: `FACT-YYYYMMDD-NNNNNN`.
pub fn generate_number(now: OffsetDateTime) -> String {
    let day = now.format(format_description!("[year][month][day]"))
        .unwrap_or_else(|_| "00000000".to_owned());
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("FACT-{}-{:06}", day, n)
}
