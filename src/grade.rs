/*!
Subjects, grades, and report cards.

Grades are scores out of 20. A report card averages each subject's
grades for a term, then weights the subject averages by the subjects'
coefficients. Subjects with no grades that term don't count.
*/
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const MAX_SCORE: f32 = 20.0;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Subject {
    pub code: String,
    pub name: String,
    pub coefficient: f32,
}

/// Subjects every installation starts out with.
pub static DEFAULT_SUBJECTS: &[(&str, &str, f32)] = &[
    ("MATH", "Mathématiques",        3.0),
    ("FR",   "Français",             3.0),
    ("ANG",  "Anglais",              2.0),
    ("PC",   "Sciences Physiques",   2.0),
    ("SVT",  "Sciences Naturelles",  2.0),
    ("HG",   "Histoire-Géographie",  2.0),
    ("EC",   "Éducation Civique",    1.0),
    ("EPS",  "Éducation Physique",   1.0),
];

pub fn default_subjects() -> Vec<Subject> {
    DEFAULT_SUBJECTS.iter()
        .map(|(code, name, coefficient)| Subject {
            code: (*code).to_owned(),
            name: (*name).to_owned(),
            coefficient: *coefficient,
        }).collect()
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Term {
    T1,
    T2,
    T3,
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Term::T1 => "T1",
            Term::T2 => "T2",
            Term::T3 => "T3",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Term {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "T1" => Ok(Term::T1),
            "T2" => Ok(Term::T2),
            "T3" => Ok(Term::T3),
            _ => Err(format!("{:?} is not a valid Term.", s)),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Grade {
    pub id: i64,
    pub student_id: i64,
    pub subject: String,
    pub term: Term,
    pub score: f32,
    pub recorded_by: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewGrade {
    pub student_id: i64,
    pub subject: String,
    pub term: Term,
    pub score: f32,
}

impl NewGrade {
    /// Checks the score range and that `subject` is one of `subjects`.
    pub fn validate(&self, subjects: &[Subject]) -> Result<(), String> {
        if !self.score.is_finite() || self.score < 0.0 || self.score > MAX_SCORE {
            return Err(format!(
                "Score must be between 0 and {} (got {}).", MAX_SCORE, self.score
            ));
        }
        if !subjects.iter().any(|s| s.code == self.subject) {
            return Err(format!("{:?} is not a known subject code.", &self.subject));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubjectAverage {
    pub subject: String,
    pub name: String,
    pub coefficient: f32,
    pub grades: usize,
    pub average: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportCard {
    pub student_id: i64,
    pub term: Term,
    pub subjects: Vec<SubjectAverage>,
    /// Coefficient-weighted mean of the subject averages.
    pub overall: Option<f32>,
}

fn round2(x: f32) -> f32 {
    (x * 100.0).round() / 100.0
}

/// Build a report card out of one student's `grades`. Grades from other
/// terms, or for subjects not in `subjects`, are ignored.
pub fn report_card(
    student_id: i64,
    term: Term,
    grades: &[Grade],
    subjects: &[Subject],
) -> ReportCard {
    let mut sums: BTreeMap<&str, (f32, usize)> = BTreeMap::new();
    for g in grades.iter().filter(|g| g.term == term && g.student_id == student_id) {
        let e = sums.entry(g.subject.as_str()).or_insert((0.0, 0));
        e.0 += g.score;
        e.1 += 1;
    }

    let mut lines: Vec<SubjectAverage> = Vec::with_capacity(sums.len());
    let mut weighted = 0.0_f32;
    let mut weights = 0.0_f32;

    for subj in subjects.iter() {
        if let Some((sum, n)) = sums.get(subj.code.as_str()) {
            let avg = sum / (*n as f32);
            weighted += avg * subj.coefficient;
            weights += subj.coefficient;
            lines.push(SubjectAverage {
                subject: subj.code.clone(),
                name: subj.name.clone(),
                coefficient: subj.coefficient,
                grades: *n,
                average: round2(avg),
            });
        }
    }

    let overall = if weights > 0.0 {
        Some(round2(weighted / weights))
    } else {
        None
    };

    ReportCard { student_id, term, subjects: lines, overall }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;
    use time::macros::datetime;

    fn grade(subject: &str, term: Term, score: f32) -> Grade {
        Grade {
            id: 0,
            student_id: 1,
            subject: subject.to_owned(),
            term,
            score,
            recorded_by: 2,
            created: datetime!(2024-11-01 10:00 UTC),
        }
    }

    #[test]
    fn weighted_by_coefficient() {
        let subjects = default_subjects();
        let grades = vec![
            grade("MATH", Term::T1, 12.0),
            grade("MATH", Term::T1, 16.0),
            grade("EPS", Term::T1, 10.0),
            grade("FR", Term::T2, 2.0),
        ];

        let rc = report_card(1, Term::T1, &grades, &subjects);
        assert_eq!(rc.subjects.len(), 2);
        assert_eq!(rc.subjects[0].subject, "MATH");
        assert_eq!(rc.subjects[0].grades, 2);
        assert!(approx_eq!(f32, rc.subjects[0].average, 14.0));
        // (14 * 3 + 10 * 1) / 4
        assert!(approx_eq!(f32, rc.overall.unwrap(), 13.0));
    }

    #[test]
    fn empty_term_has_no_overall() {
        let subjects = default_subjects();
        let rc = report_card(1, Term::T3, &[grade("MATH", Term::T1, 12.0)], &subjects);
        assert!(rc.subjects.is_empty());
        assert_eq!(rc.overall, None);
    }

    #[test]
    fn unknown_subjects_ignored() {
        let subjects = default_subjects();
        let rc = report_card(
            1, Term::T1,
            &[grade("LATIN", Term::T1, 20.0), grade("HG", Term::T1, 9.5)],
            &subjects
        );
        assert_eq!(rc.subjects.len(), 1);
        assert!(approx_eq!(f32, rc.overall.unwrap(), 9.5));
    }

    #[test]
    fn grade_validation() {
        let subjects = default_subjects();
        let g = NewGrade { student_id: 1, subject: "PC".to_owned(), term: Term::T2, score: 20.0 };
        g.validate(&subjects).unwrap();

        let bad = NewGrade { score: 20.5, ..g.clone() };
        assert!(bad.validate(&subjects).is_err());
        let bad = NewGrade { score: f32::NAN, ..g.clone() };
        assert!(bad.validate(&subjects).is_err());
        let bad = NewGrade { subject: "LATIN".to_owned(), ..g };
        assert!(bad.validate(&subjects).is_err());
    }

    #[test]
    fn terms() {
        assert_eq!("T2".parse::<Term>().unwrap(), Term::T2);
        assert!("T4".parse::<Term>().is_err());
        assert_eq!(serde_json::to_string(&Term::T3).unwrap(), r#""T3""#);
    }
}
