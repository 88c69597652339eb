/*!
Database users.
*/
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::phone;

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Parent,
    Student,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::Admin   => "admin",
            Role::Teacher => "teacher",
            Role::Parent  => "parent",
            Role::Student => "student",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin"   => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "parent"  => Ok(Role::Parent),
            "student" => Ok(Role::Student),
            _ => Err(format!("{:?} is not a valid Role.", s)),
        }
    }
}

impl Role {
    /// Roles allowed to register themselves without an administrator.
    pub fn self_registrable(&self) -> bool {
        matches!(self, Role::Parent | Role::Student)
    }

    /// School staff, who may create and modify records.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Teacher)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub last_name: String,
    pub first_names: String,
    pub phone: Option<String>,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", &self.last_name, &self.first_names)
    }
}

/// Registration / user creation request body.
#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub last_name: String,
    pub first_names: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Checks a string's length, in characters, lies within `min..=max`.
pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let n = value.trim().chars().count();
    if n < min || n > max {
        Err(format!(
            "{} must be between {} and {} characters long (got {}).",
            field, min, max, n
        ))
    } else {
        Ok(())
    }
}

/// Emails are compared trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_email(email: &str) -> Result<(), String> {
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !email.contains(char::is_whitespace) => Ok(()),
        _ => Err(format!("{:?} is not a valid email address.", email)),
    }
}

impl NewUser {
    /// The role this user will have, `Parent` if none was requested.
    pub fn role(&self) -> Role {
        self.role.unwrap_or(Role::Parent)
    }

    pub fn validate(&self) -> Result<(), String> {
        check_email(&self.email)?;
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(format!(
                "Password must be at least {} characters long.",
                MIN_PASSWORD_LENGTH
            ));
        }
        check_length("last_name", &self.last_name, 2, 100)?;
        check_length("first_names", &self.first_names, 2, 200)?;
        phone::check_optional(self.phone.as_deref())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewUser {
        NewUser {
            email: "parent.camara@gmail.com".to_owned(),
            password: "Parent2024!".to_owned(),
            last_name: "Camara".to_owned(),
            first_names: "Mariama".to_owned(),
            role: None,
            phone: Some("+224 62 00 00 04".to_owned()),
        }
    }

    #[test]
    fn roles_round_trip_through_strings() {
        for r in [Role::Admin, Role::Teacher, Role::Parent, Role::Student] {
            assert_eq!(r, r.to_string().parse().unwrap());
        }
        assert!("Administrateur".parse::<Role>().is_err());
        assert!(Role::Parent.self_registrable());
        assert!(!Role::Admin.self_registrable());
        assert!(Role::Teacher.is_staff());
        assert!(!Role::Parent.is_staff());
    }

    #[test]
    fn good_user_validates() {
        let u = sample();
        u.validate().unwrap();
        assert_eq!(u.role(), Role::Parent);
    }

    #[test]
    fn bad_users_are_rejected() {
        let mut u = sample();
        u.email = "not-an-address".to_owned();
        assert!(u.validate().is_err());

        let mut u = sample();
        u.password = "short".to_owned();
        assert!(u.validate().is_err());

        let mut u = sample();
        u.last_name = "C".to_owned();
        assert!(u.validate().is_err());

        let mut u = sample();
        u.phone = Some("0033 1 23".to_owned());
        assert!(u.validate().is_err());
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Admin@Ecole-Smart.GN "), "admin@ecole-smart.gn");
    }

    #[test]
    fn lengths_count_characters() {
        // "Touré" is five characters but six bytes.
        assert!(check_length("name", "Touré", 2, 5).is_ok());
        assert!(check_length("name", "  a  ", 2, 5).is_err());
    }
}
