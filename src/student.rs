/*!
Students, the classes they're enrolled in, and matricule generation.
*/
use rand::Rng;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{phone, user::check_length};

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, PartialOrd, Ord, Serialize, Hash)]
pub enum ClassLevel {
    #[serde(rename = "CP1")]   Cp1,
    #[serde(rename = "CP2")]   Cp2,
    #[serde(rename = "CE1")]   Ce1,
    #[serde(rename = "CE2")]   Ce2,
    #[serde(rename = "CM1")]   Cm1,
    #[serde(rename = "CM2")]   Cm2,
    #[serde(rename = "6ème")]  Sixieme,
    #[serde(rename = "5ème")]  Cinquieme,
    #[serde(rename = "4ème")]  Quatrieme,
    #[serde(rename = "3ème")]  Troisieme,
    #[serde(rename = "2nde")]  Seconde,
    #[serde(rename = "1ère")]  Premiere,
    #[serde(rename = "Tle")]   Terminale,
}

/// The three stages of schooling a class belongs to.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cycle {
    Primary,
    Middle,
    High,
}

impl ClassLevel {
    pub const ALL: [ClassLevel; 13] = [
        ClassLevel::Cp1, ClassLevel::Cp2, ClassLevel::Ce1, ClassLevel::Ce2,
        ClassLevel::Cm1, ClassLevel::Cm2, ClassLevel::Sixieme,
        ClassLevel::Cinquieme, ClassLevel::Quatrieme, ClassLevel::Troisieme,
        ClassLevel::Seconde, ClassLevel::Premiere, ClassLevel::Terminale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassLevel::Cp1       => "CP1",
            ClassLevel::Cp2       => "CP2",
            ClassLevel::Ce1       => "CE1",
            ClassLevel::Ce2       => "CE2",
            ClassLevel::Cm1       => "CM1",
            ClassLevel::Cm2       => "CM2",
            ClassLevel::Sixieme   => "6ème",
            ClassLevel::Cinquieme => "5ème",
            ClassLevel::Quatrieme => "4ème",
            ClassLevel::Troisieme => "3ème",
            ClassLevel::Seconde   => "2nde",
            ClassLevel::Premiere  => "1ère",
            ClassLevel::Terminale => "Tle",
        }
    }

    /// Two-digit code used in matricules; CP1 is "01", Tle is "13".
    pub fn code(&self) -> String {
        let n = ClassLevel::ALL.iter()
            .position(|c| c == self)
            .unwrap_or(98) + 1;
        format!("{:02}", n)
    }

    pub fn cycle(&self) -> Cycle {
        match self {
            ClassLevel::Cp1 | ClassLevel::Cp2 | ClassLevel::Ce1
            | ClassLevel::Ce2 | ClassLevel::Cm1 | ClassLevel::Cm2 => Cycle::Primary,
            ClassLevel::Sixieme | ClassLevel::Cinquieme
            | ClassLevel::Quatrieme | ClassLevel::Troisieme => Cycle::Middle,
            ClassLevel::Seconde | ClassLevel::Premiere
            | ClassLevel::Terminale => Cycle::High,
        }
    }
}

impl std::fmt::Display for ClassLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ClassLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClassLevel::ALL.iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| format!("{:?} is not a valid class level.", s))
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl std::fmt::Display for Sex {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Sex::Male => write!(f, "male"),
            Sex::Female => write!(f, "female"),
        }
    }
}

impl std::str::FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Sex::Male),
            "female" => Ok(Sex::Female),
            _ => Err(format!("{:?} is not a valid sex.", s)),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Student {
    pub id: i64,
    pub matricule: String,
    pub last_name: String,
    pub first_names: String,
    #[serde(with = "crate::iso_date")]
    pub birth_date: Date,
    pub sex: Sex,
    pub class: ClassLevel,
    pub parent_phone: Option<String>,
    pub address: Option<String>,
    pub school_year: String,
    pub enrolled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub enrollment_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", &self.last_name, &self.first_names)
    }
}

/// What gets joined onto invoices, payments and attendance records.
#[derive(Clone, Debug, Serialize)]
pub struct StudentBrief {
    pub id: i64,
    pub matricule: String,
    pub last_name: String,
    pub first_names: String,
    pub class: ClassLevel,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewStudent {
    pub last_name: String,
    pub first_names: String,
    #[serde(with = "crate::iso_date")]
    pub birth_date: Date,
    pub sex: Sex,
    pub class: ClassLevel,
    #[serde(default)]
    pub parent_phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub school_year: Option<String>,
}

impl NewStudent {
    pub fn validate(&self) -> Result<(), String> {
        check_length("last_name", &self.last_name, 2, 100)?;
        check_length("first_names", &self.first_names, 2, 200)?;
        phone::check_optional(self.parent_phone.as_deref())?;
        if let Some(y) = &self.school_year {
            check_school_year(y)?;
        }
        Ok(())
    }
}

/// Fields of a student that staff may change after enrollment.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StudentUpdate {
    pub class: Option<ClassLevel>,
    pub parent_phone: Option<String>,
    pub address: Option<String>,
    pub school_year: Option<String>,
}

impl StudentUpdate {
    pub fn validate(&self) -> Result<(), String> {
        phone::check_optional(self.parent_phone.as_deref())?;
        if let Some(y) = &self.school_year {
            check_school_year(y)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.class.is_none() && self.parent_phone.is_none()
            && self.address.is_none() && self.school_year.is_none()
    }
}

/// Filters accepted by the student listing. Withdrawn students are never
/// listed.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StudentFilter {
    pub class: Option<ClassLevel>,
    pub school_year: Option<String>,
    /// Case-insensitive match on names or matricule.
    pub search: Option<String>,
}

impl StudentFilter {
    /// `search` as an `ILIKE` pattern, if there's anything to search for.
    pub fn search_pattern(&self) -> Option<String> {
        let s = self.search.as_deref()?.trim();
        if s.is_empty() {
            return None;
        }
        let escaped = s.replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        Some(format!("%{}%", escaped))
    }
}

/// School years look like "2024-2025": two consecutive years.
pub fn check_school_year(year: &str) -> Result<(), String> {
    let err = || format!("{:?} is not a valid school year (expected e.g. \"2024-2025\").", year);

    let (a, b) = year.split_once('-').ok_or_else(err)?;
    if a.len() != 4 || b.len() != 4 {
        return Err(err());
    }
    let a: i32 = a.parse().map_err(|_| err())?;
    let b: i32 = b.parse().map_err(|_| err())?;
    if b != a + 1 {
        return Err(err());
    }
    Ok(())
}

/**
Generate a matricule: the first year of the school year, the two-digit
class code, and three random digits.

```text
2024-2025, 3ème  ->  2024 10 ###
```
*/
pub fn generate_matricule(class: ClassLevel, school_year: &str) -> String {
    let year = school_year.split('-').next().unwrap_or(school_year);
    let seq: u32 = rand::thread_rng().gen_range(0..1000);
    format!("{}{}{:03}", year, class.code(), seq)
}
