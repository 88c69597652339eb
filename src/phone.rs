/*!
Guinean phone numbers: validation and mobile-money operator detection.
*/
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-\.]").unwrap());
static GUINEAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\+224|224)?[6-7][0-9]{7}$").unwrap());
static ORANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^6[0-5][0-9]{6}$").unwrap());
static MTN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^6[6-7][0-9]{6}$").unwrap());

/// Mobile-money operators payments can be routed through.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    Orange,
    Mtn,
}

impl Operator {
    /// Payment method label stored on the payment record.
    pub fn method(&self) -> &'static str {
        match self {
            Operator::Orange => "orange_money",
            Operator::Mtn => "mtn_money",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Operator::Orange => "ORANGE",
            Operator::Mtn    => "MTN",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORANGE" => Ok(Operator::Orange),
            "MTN"    => Ok(Operator::Mtn),
            _ => Err(format!("{:?} is not a valid Operator.", s)),
        }
    }
}

/// Strip the spaces, dashes and dots people like to type into numbers.
pub fn normalize(phone: &str) -> String {
    SEPARATORS.replace_all(phone, "").into_owned()
}

pub fn is_valid(phone: &str) -> bool {
    GUINEAN.is_match(&normalize(phone))
}

/// Validate an optional phone field, returning the error message to show
/// the caller if it's present and malformed.
pub fn check_optional(phone: Option<&str>) -> Result<(), String> {
    match phone {
        Some(p) if !is_valid(p) => Err(format!(
            "{:?} is not a valid Guinean phone number.", p
        )),
        _ => Ok(()),
    }
}

/// Determine which operator serves `phone`, if any.
pub fn detect_operator(phone: &str) -> Option<Operator> {
    let clean = normalize(phone);
    let local = if let Some(rest) = clean.strip_prefix("+224") {
        rest
    } else if let Some(rest) = clean.strip_prefix("224") {
        rest
    } else {
        clean.as_str()
    };

    if ORANGE.is_match(local) {
        Some(Operator::Orange)
    } else if MTN.is_match(local) {
        Some(Operator::Mtn)
    } else {
        None
    }
}
