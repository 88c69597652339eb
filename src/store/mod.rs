/*!
Database interaction module.

The Postgres database to which this connects holds the school's data:

```sql
CREATE TABLE users (
    id          BIGSERIAL PRIMARY KEY,
    email       TEXT UNIQUE NOT NULL,
    role        TEXT NOT NULL,      /* admin | teacher | parent | student */
    last_name   TEXT NOT NULL,
    first_names TEXT NOT NULL,
    phone       TEXT,
    active      BOOL NOT NULL DEFAULT TRUE,
    created     TIMESTAMPTZ NOT NULL DEFAULT now(),
    modified    TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE students (
    id              BIGSERIAL PRIMARY KEY,
    matricule       TEXT UNIQUE NOT NULL,
    last_name       TEXT NOT NULL,
    first_names     TEXT NOT NULL,
    birth_date      DATE NOT NULL,
    sex             TEXT NOT NULL,
    class           TEXT NOT NULL,
    parent_phone    TEXT,
    address         TEXT,
    school_year     TEXT NOT NULL,
    enrolled        BOOL NOT NULL DEFAULT TRUE,
    enrollment_date TIMESTAMPTZ NOT NULL DEFAULT now(),
    created         TIMESTAMPTZ NOT NULL DEFAULT now(),
    modified        TIMESTAMPTZ NOT NULL DEFAULT now()
);
```

Invoices, payments, attendance, subjects and grades follow in `SCHEMA`;
the methods that deal with each are in the submodules of the same names.

Passwords and session keys are not here; see `crate::auth`.
*/
use std::fmt::Write;

use tokio_postgres::{Client, NoTls, types::ToSql};

mod attendance;
mod grades;
mod invoices;
mod payments;
mod reports;
mod students;
mod users;

pub use payments::Outcome;
pub use attendance::RollOutcome;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'users'",
        "CREATE TABLE users (
            id          BIGSERIAL PRIMARY KEY,
            email       TEXT UNIQUE NOT NULL,
            role        TEXT NOT NULL,
            last_name   TEXT NOT NULL,
            first_names TEXT NOT NULL,
            phone       TEXT,
            active      BOOL NOT NULL DEFAULT TRUE,
            created     TIMESTAMPTZ NOT NULL DEFAULT now(),
            modified    TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE users",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'students'",
        "CREATE TABLE students (
            id              BIGSERIAL PRIMARY KEY,
            matricule       TEXT UNIQUE NOT NULL,
            last_name       TEXT NOT NULL,
            first_names     TEXT NOT NULL,
            birth_date      DATE NOT NULL,
            sex             TEXT NOT NULL,
            class           TEXT NOT NULL,
            parent_phone    TEXT,
            address         TEXT,
            school_year     TEXT NOT NULL,
            enrolled        BOOL NOT NULL DEFAULT TRUE,
            enrollment_date TIMESTAMPTZ NOT NULL DEFAULT now(),
            created         TIMESTAMPTZ NOT NULL DEFAULT now(),
            modified        TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE students",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'invoices'",
        "CREATE TABLE invoices (
            id          BIGSERIAL PRIMARY KEY,
            number      TEXT UNIQUE NOT NULL,
            student_id  BIGINT NOT NULL,    /* joined, not enforced */
            title       TEXT NOT NULL,
            description TEXT,
            total       BIGINT NOT NULL,
            paid        BIGINT NOT NULL DEFAULT 0,
            remaining   BIGINT NOT NULL,
            currency    TEXT NOT NULL DEFAULT 'GNF',
            issued      TIMESTAMPTZ NOT NULL DEFAULT now(),
            due         DATE NOT NULL,
            status      TEXT NOT NULL,      /* issued | partially_paid | fully_paid */
            fee_types   TEXT[] NOT NULL,
            created     TIMESTAMPTZ NOT NULL DEFAULT now(),
            modified    TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE invoices",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'payments'",
        "CREATE TABLE payments (
            id                 BIGSERIAL PRIMARY KEY,
            reference          TEXT UNIQUE NOT NULL,
            invoice_id         BIGINT NOT NULL REFERENCES invoices(id),
            student_id         BIGINT NOT NULL,
            amount             BIGINT NOT NULL,
            currency           TEXT NOT NULL DEFAULT 'GNF',
            method             TEXT NOT NULL,   /* orange_money | mtn_money */
            status             TEXT NOT NULL,   /* initiated | succeeded | failed */
            payer_phone        TEXT NOT NULL,
            payer_name         TEXT NOT NULL,
            operator           TEXT NOT NULL,   /* ORANGE | MTN */
            initiated          TIMESTAMPTZ NOT NULL,
            expires            TIMESTAMPTZ NOT NULL,
            completed          TIMESTAMPTZ,
            operator_reference TEXT,
            failure_reason     TEXT
        )",
        "DROP TABLE payments",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'attendance'",
        "CREATE TABLE attendance (
            id             BIGSERIAL PRIMARY KEY,
            student_id     BIGINT NOT NULL REFERENCES students(id),
            day            DATE NOT NULL,
            subject        TEXT NOT NULL,
            present        BOOL NOT NULL,
            absence_reason TEXT,
            recorded_by    BIGINT NOT NULL,
            created        TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (student_id, day, subject)
        )",
        "DROP TABLE attendance",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'subjects'",
        "CREATE TABLE subjects (
            code        TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            coefficient REAL NOT NULL
        )",
        "DROP TABLE subjects",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'grades'",
        "CREATE TABLE grades (
            id          BIGSERIAL PRIMARY KEY,
            student_id  BIGINT NOT NULL REFERENCES students(id),
            subject     TEXT NOT NULL REFERENCES subjects(code),
            term        TEXT NOT NULL,
            score       REAL NOT NULL,
            recorded_by BIGINT NOT NULL,
            created     TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE grades",
    ),
];

#[derive(Debug, PartialEq)]
pub struct DbError(String);

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    pub(crate) fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl From<tokio_postgres::error::Error> for DbError {
    fn from(e: tokio_postgres::error::Error) -> DbError {
        let mut s = format!("DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            // Writing to a String can't fail.
            let _ = write!(&mut s, "; {}", dbe);
        }
        DbError(s)
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError(s) }
}

/// Whether `e` is Postgres complaining about a `UNIQUE` constraint.
fn is_unique_violation(e: &tokio_postgres::Error) -> bool {
    e.code() == Some(&tokio_postgres::error::SqlState::UNIQUE_VIOLATION)
}

/**
Accumulates the `WHERE` clause of a listing query along with its
parameters.

Each clause is written with `$?` where its parameter goes; that gets
replaced with the right `$n`.
*/
#[derive(Default)]
struct Filter {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql + Sync + Send>>,
}

impl Filter {
    fn new() -> Self { Self::default() }

    /// A clause with no parameter.
    fn fixed(&mut self, clause: &str) {
        self.clauses.push(clause.to_owned());
    }

    fn push<T>(&mut self, clause: &str, value: T)
    where
        T: ToSql + Sync + Send + 'static
    {
        self.params.push(Box::new(value));
        let placeholder = format!("${}", self.params.len());
        self.clauses.push(clause.replace("$?", &placeholder));
    }

    fn push_opt<T>(&mut self, clause: &str, value: Option<T>)
    where
        T: ToSql + Sync + Send + 'static
    {
        if let Some(value) = value {
            self.push(clause, value);
        }
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }
}

pub struct Store {
    connection_string: String,
}

impl Store {
    pub fn new(connection_string: String) -> Self {
        log::trace!("Store::new( {:?} ) called.", &connection_string);

        Self { connection_string }
    }

    async fn connect(&self) -> Result<Client, DbError> {
        log::trace!(
            "Store::connect() called w/connection string {:?}",
            &self.connection_string
        );

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Data DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let dberr = DbError::from(e);
                log::trace!("    ...connection failed: {:?}", &dberr);
                Err(dberr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("Store::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Data DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(*test_stmt, &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(*create_stmt, &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to look at
    the ERROR level log output when testing to ensure this method did its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("Store::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(*drop_stmt, &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        log::trace!("    ....nuking complete.");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    /*!
    These tests assume you have a Postgres instance running on your local
    machine with resources named according to what you see in the
    `static TEST_CONNECTION &str`:

    ```text
    user: ecole_test
    password: ecole_test

    with write access to:

    database: ecole_test
    ```

    They're ignored by default; run them with

    ```bash
    cargo test -- --ignored --test-threads=1
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;
    use time::macros::date;

    use crate::student::{ClassLevel, NewStudent, Sex, Student};

    pub static TEST_CONNECTION: &str = "host=localhost user=ecole_test password='ecole_test' dbname=ecole_test";

    /// A fresh, empty store.
    pub async fn fresh_store() -> Store {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.nuke_database().await.unwrap();
        db.ensure_db_schema().await.unwrap();
        db
    }

    pub fn new_student(last_name: &str, class: ClassLevel) -> NewStudent {
        NewStudent {
            last_name: last_name.to_owned(),
            first_names: "Mariama".to_owned(),
            birth_date: date!(2012 - 05 - 04),
            sex: Sex::Female,
            class,
            parent_phone: Some("62000001".to_owned()),
            address: None,
            school_year: None,
        }
    }

    pub async fn insert_sample_student(db: &Store, last_name: &str, class: ClassLevel) -> Student {
        db.insert_student(&new_student(last_name, class), "2024-2025").await.unwrap()
    }

    /**
    This function is for getting the database back in a blank slate state if
    a test panics partway through and leaves it munged.

    ```bash
    cargo test reset_store -- --ignored
    ```
    */
    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_store() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn create_store() {
        let db = fresh_store().await;
        // Twice should be fine.
        db.ensure_db_schema().await.unwrap();
        db.nuke_database().await.unwrap();
    }

    #[test]
    fn filters_number_their_parameters() {
        let mut f = Filter::new();
        assert_eq!(f.where_clause(), "");

        f.fixed("s.enrolled");
        f.push("s.class = $?", "CM1".to_owned());
        f.push_opt::<String>("s.school_year = $?", None);
        f.push_opt("(s.last_name ILIKE $? OR s.matricule ILIKE $?)", Some("%ka%".to_owned()));

        assert_eq!(
            f.where_clause(),
            " WHERE s.enrolled AND s.class = $1 AND (s.last_name ILIKE $2 OR s.matricule ILIKE $2)"
        );
        assert_eq!(f.params().len(), 2);
    }
}
