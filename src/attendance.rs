/*!
Attendance records: one per student, day and subject.
*/
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::student::StudentBrief;

#[derive(Clone, Debug, Serialize)]
pub struct Attendance {
    pub id: i64,
    pub student_id: i64,
    #[serde(with = "crate::iso_date")]
    pub day: Date,
    pub subject: String,
    pub present: bool,
    pub absence_reason: Option<String>,
    pub recorded_by: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentBrief>,
}

fn default_present() -> bool { true }

#[derive(Clone, Debug, Deserialize)]
pub struct NewAttendance {
    pub student_id: i64,
    /// Defaults to today.
    #[serde(default, with = "crate::iso_date::option")]
    pub day: Option<Date>,
    pub subject: String,
    #[serde(default = "default_present")]
    pub present: bool,
    #[serde(default)]
    pub absence_reason: Option<String>,
}

impl NewAttendance {
    pub fn validate(&self) -> Result<(), String> {
        check_subject(&self.subject)?;
        if self.present && self.absence_reason.is_some() {
            return Err("A present student can't have an absence reason.".to_owned());
        }
        Ok(())
    }
}

/// One student's line in a whole-class roll call.
#[derive(Clone, Debug, Deserialize)]
pub struct RollEntry {
    pub student_id: i64,
    #[serde(default = "default_present")]
    pub present: bool,
    #[serde(default)]
    pub absence_reason: Option<String>,
}

/// A roll call: many students, one day and subject.
#[derive(Clone, Debug, Deserialize)]
pub struct RollCall {
    #[serde(default, with = "crate::iso_date::option")]
    pub day: Option<Date>,
    pub subject: String,
    pub entries: Vec<RollEntry>,
}

impl RollCall {
    pub fn validate(&self) -> Result<(), String> {
        check_subject(&self.subject)?;
        if self.entries.is_empty() {
            return Err("Roll call has no entries.".to_owned());
        }

        let mut ids: Vec<i64> = self.entries.iter().map(|e| e.student_id).collect();
        ids.sort_unstable();
        if let Some(w) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(format!("Student {} appears more than once.", w[0]));
        }

        for e in self.entries.iter() {
            if e.present && e.absence_reason.is_some() {
                return Err(format!(
                    "Student {} is present but has an absence reason.", e.student_id
                ));
            }
        }
        Ok(())
    }
}

fn check_subject(subject: &str) -> Result<(), String> {
    if subject.trim().is_empty() {
        Err("Subject must not be blank.".to_owned())
    } else {
        Ok(())
    }
}

/// Filters accepted by the attendance listing.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AttendanceFilter {
    pub student_id: Option<i64>,
    #[serde(default, with = "crate::iso_date::option")]
    pub from: Option<Date>,
    #[serde(default, with = "crate::iso_date::option")]
    pub to: Option<Date>,
    pub subject: Option<String>,
    #[serde(default)]
    pub absences_only: bool,
}

/// Percentage of `present` among `total` records, to one decimal place;
/// zero when there's nothing to go on.
pub fn rate(present: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let pct = 100.0 * present as f64 / total as f64;
    (pct * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    #[test]
    fn day_defaults_to_none() {
        let a: NewAttendance = serde_json::from_str(
            r#"{"student_id": 3, "subject": "MATH"}"#
        ).unwrap();
        assert!(a.day.is_none());
        assert!(a.present);
        a.validate().unwrap();

        let a: NewAttendance = serde_json::from_str(
            r#"{"student_id": 3, "subject": "MATH", "day": "2024-10-07", "present": false, "absence_reason": "sick"}"#
        ).unwrap();
        assert_eq!(a.day, Some(time::macros::date!(2024 - 10 - 07)));
        a.validate().unwrap();
    }

    #[test]
    fn contradictory_records_rejected() {
        let a = NewAttendance {
            student_id: 3,
            day: None,
            subject: "MATH".to_owned(),
            present: true,
            absence_reason: Some("sick".to_owned()),
        };
        assert!(a.validate().is_err());

        let a = NewAttendance { subject: "  ".to_owned(), absence_reason: None, ..a };
        assert!(a.validate().is_err());
    }

    #[test]
    fn roll_calls() {
        let rc: RollCall = serde_json::from_str(r#"{
            "subject": "FR",
            "entries": [
                {"student_id": 1},
                {"student_id": 2, "present": false, "absence_reason": "late bus"}
            ]
        }"#).unwrap();
        rc.validate().unwrap();

        let mut dup = rc.clone();
        dup.entries.push(RollEntry { student_id: 1, present: true, absence_reason: None });
        assert!(dup.validate().is_err());

        let empty = RollCall { entries: vec![], ..rc };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn rates() {
        assert!(approx_eq!(f64, rate(0, 0), 0.0));
        assert!(approx_eq!(f64, rate(3, 4), 75.0));
        assert!(approx_eq!(f64, rate(2, 3), 66.7));
        assert!(approx_eq!(f64, rate(10, 10), 100.0));
    }
}
