/*!
Mobile-money payments against invoices.

The operator side is simulated: a payment is recorded as `Initiated` and
stays that way until an administrator confirms (or fails) it. Only an
initiated, unexpired payment can succeed, so no payment is ever applied
to its invoice twice.
*/
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, macros::format_description};
use uuid::Uuid;

use crate::{
    invoice::{InvoiceBrief, InvoiceStatus},
    phone::{self, Operator},
    student::StudentBrief,
};

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Initiated,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Initiated => "initiated",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed    => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" => Ok(PaymentStatus::Initiated),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed"    => Ok(PaymentStatus::Failed),
            _ => Err(format!("{:?} is not a valid PaymentStatus.", s)),
        }
    }
}

/// What the payer is told to do to confirm a payment with their operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Instructions {
    pub message: &'static str,
    pub instructions: &'static str,
    pub ussd_code: &'static str,
    pub expires_in: &'static str,
}

/// How long the payer has to confirm with `op` before the payment lapses.
pub fn confirmation_window(op: Operator) -> Duration {
    match op {
        Operator::Orange => Duration::minutes(30),
        Operator::Mtn => Duration::minutes(5),
    }
}

pub fn instructions(op: Operator) -> Instructions {
    match op {
        Operator::Orange => Instructions {
            message: "Orange Money payment initiated.",
            instructions: "You will receive a confirmation SMS. Follow its instructions to approve the payment.",
            ussd_code: "*144*4*4#",
            expires_in: "30 minutes",
        },
        Operator::Mtn => Instructions {
            message: "MTN Mobile Money payment request sent.",
            instructions: "Dial *223# and follow the instructions to confirm the payment.",
            ussd_code: "*223#",
            expires_in: "5 minutes",
        },
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Payment {
    pub id: i64,
    pub reference: String,
    pub invoice_id: i64,
    pub student_id: i64,
    pub amount: i64,
    pub currency: String,
    pub method: String,
    pub status: PaymentStatus,
    pub payer_phone: String,
    pub payer_name: String,
    pub operator: Operator,
    #[serde(with = "time::serde::rfc3339")]
    pub initiated: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed: Option<OffsetDateTime>,
    pub operator_reference: Option<String>,
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentBrief>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<InvoiceBrief>,
}

impl Payment {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expires
    }

    /// Whether this payment may still be confirmed at time `now`.
    pub fn check_confirmable(&self, now: OffsetDateTime) -> Result<(), Unconfirmable> {
        if self.status != PaymentStatus::Initiated {
            return Err(Unconfirmable::NotPending(self.status));
        }
        if self.is_expired(now) {
            return Err(Unconfirmable::Expired);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unconfirmable {
    NotPending(PaymentStatus),
    Expired,
}

impl std::fmt::Display for Unconfirmable {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Unconfirmable::NotPending(s) => write!(
                f, "Payment is already {}; only initiated payments can be confirmed.", s
            ),
            Unconfirmable::Expired => write!(
                f, "Payment confirmation window has expired."
            ),
        }
    }
}

/// Payment initiation request body.
#[derive(Clone, Debug, Deserialize)]
pub struct NewPayment {
    pub invoice_id: i64,
    pub amount: i64,
    pub payer_phone: String,
    #[serde(default)]
    pub payer_name: Option<String>,
}

impl NewPayment {
    /// Checks that don't need the invoice; returns the payer's operator.
    pub fn validate(&self) -> Result<Operator, String> {
        if self.amount <= crate::invoice::MIN_PAYMENT {
            return Err(crate::invoice::Refusal::TooSmall.to_string());
        }
        if !phone::is_valid(&self.payer_phone) {
            return Err(format!(
                "{:?} is not a valid Guinean phone number.", &self.payer_phone
            ));
        }
        phone::detect_operator(&self.payer_phone)
            .ok_or_else(|| "Phone number not recognised by any mobile-money operator.".to_owned())
    }
}

/// Body of the response to a successful initiation.
#[derive(Debug, Serialize)]
pub struct Initiated {
    pub success: bool,
    pub reference: String,
    pub payment_id: i64,
    pub amount: i64,
    pub operator: Operator,
    pub status: PaymentStatus,
    #[serde(flatten)]
    pub instructions: Instructions,
}

/// Body of the response to a confirmed payment.
#[derive(Debug, Serialize)]
pub struct Confirmed {
    pub success: bool,
    pub message: String,
    pub invoice_status: InvoiceStatus,
    pub remaining: i64,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct PaymentFilter {
    pub student_id: Option<i64>,
    pub invoice_id: Option<i64>,
    pub status: Option<PaymentStatus>,
}

/// Body of a request to fail a payment.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Failure {
    #[serde(default)]
    pub reason: Option<String>,
}

impl Failure {
    pub fn reason(&self) -> &str {
        match self.reason.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => "declined",
        }
    }
}

fn short_hex(n: usize) -> String {
    let mut s = Uuid::new_v4().simple().to_string();
    s.truncate(n);
    s.make_ascii_uppercase();
    s
}

/// Internal reference: `PAY_YYYYmmddHHMMSS_XXXXXX`.
pub fn generate_reference(now: OffsetDateTime) -> String {
    let stamp = now.format(format_description!("[year][month][day][hour][minute][second]"))
        .unwrap_or_else(|_| "00000000000000".to_owned());
    format!("PAY_{}_{}", stamp, short_hex(6))
}

/// Transaction id the (simulated) operator hands back: `TXN_XXXXXXXXXXXX`.
pub fn generate_operator_reference() -> String {
    format!("TXN_{}", short_hex(12))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn payment(status: PaymentStatus) -> Payment {
        let initiated = datetime!(2024-10-01 08:00 UTC);
        Payment {
            id: 1,
            reference: generate_reference(initiated),
            invoice_id: 1,
            student_id: 1,
            amount: 200_000,
            currency: crate::CURRENCY.to_owned(),
            method: Operator::Orange.method().to_owned(),
            status,
            payer_phone: "62123456".to_owned(),
            payer_name: "Camara Mariama".to_owned(),
            operator: Operator::Orange,
            initiated,
            expires: initiated + confirmation_window(Operator::Orange),
            completed: None,
            operator_reference: None,
            failure_reason: None,
            student: None,
            invoice: None,
        }
    }

    #[test]
    fn references() {
        let r = generate_reference(datetime!(2024-10-01 08:09:10 UTC));
        assert!(r.starts_with("PAY_20241001080910_"));
        let suffix = &r["PAY_20241001080910_".len()..];
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));

        let t = generate_operator_reference();
        assert_eq!(t.len(), 16);
        assert!(t.starts_with("TXN_"));
    }

    #[test]
    fn confirmation_rules() {
        let p = payment(PaymentStatus::Initiated);
        assert_eq!(p.check_confirmable(datetime!(2024-10-01 08:29 UTC)), Ok(()));
        assert_eq!(
            p.check_confirmable(datetime!(2024-10-01 08:31 UTC)),
            Err(Unconfirmable::Expired)
        );

        let p = payment(PaymentStatus::Succeeded);
        assert_eq!(
            p.check_confirmable(datetime!(2024-10-01 08:01 UTC)),
            Err(Unconfirmable::NotPending(PaymentStatus::Succeeded))
        );
    }

    #[test]
    fn windows_match_instructions() {
        assert_eq!(confirmation_window(Operator::Orange), Duration::minutes(30));
        assert_eq!(confirmation_window(Operator::Mtn), Duration::minutes(5));
        assert_eq!(instructions(Operator::Orange).ussd_code, "*144*4*4#");
        assert_eq!(instructions(Operator::Mtn).expires_in, "5 minutes");
    }

    #[test]
    fn new_payment_validation() {
        let np = NewPayment {
            invoice_id: 1,
            amount: 50_000,
            payer_phone: "+224 66 12 34 56".to_owned(),
            payer_name: None,
        };
        assert_eq!(np.validate(), Ok(Operator::Mtn));

        let mut bad = np.clone();
        bad.amount = 100;
        assert!(bad.validate().is_err());

        let mut bad = np.clone();
        bad.payer_phone = "123".to_owned();
        assert!(bad.validate().is_err());

        // Valid number, but no operator.
        let mut bad = np.clone();
        bad.payer_phone = "70123456".to_owned();
        assert!(bad.validate().unwrap_err().contains("not recognised"));
    }

    #[test]
    fn initiated_body_flattens_instructions() {
        let body = Initiated {
            success: true,
            reference: "PAY_20241001080910_ABCDEF".to_owned(),
            payment_id: 7,
            amount: 50_000,
            operator: Operator::Orange,
            status: PaymentStatus::Initiated,
            instructions: instructions(Operator::Orange),
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["ussd_code"], "*144*4*4#");
        assert_eq!(v["operator"], "ORANGE");
        assert_eq!(v["status"], "initiated");
    }
}
