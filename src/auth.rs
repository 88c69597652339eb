/*!
Password and session key storage.

This lives in its own database, apart from the school data, with two
tables:

```sql
CREATE TABLE passwords (
    email TEXT PRIMARY KEY,
    salt  TEXT NOT NULL,
    hash  TEXT NOT NULL     /* hex SHA-256 of salt + password */
);

CREATE TABLE keys (
    key     TEXT PRIMARY KEY,
    email   TEXT NOT NULL,
    expires TIMESTAMPTZ NOT NULL
);
```
*/
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tokio_postgres::{Client, NoTls, types::ToSql};

use crate::store::DbError;

const SALT_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'passwords'",
        "CREATE TABLE passwords (
            email TEXT PRIMARY KEY,
            salt  TEXT NOT NULL,
            hash  TEXT NOT NULL
        )",
        "DROP TABLE passwords",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'keys'",
        "CREATE TABLE keys (
            key     TEXT PRIMARY KEY,
            email   TEXT NOT NULL,
            expires TIMESTAMPTZ NOT NULL
        )",
        "DROP TABLE keys",
    ),
];

#[derive(Debug, PartialEq, Eq)]
pub enum AuthResult {
    Ok,
    BadPassword,
    NoSuchUser,
    InvalidKey,
}

fn random_string(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}

/// Hex digest of `salt` followed by `password`.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut h = Sha256::new();
    h.update(salt.as_bytes());
    h.update(password.as_bytes());
    format!("{:x}", h.finalize())
}

pub struct Db {
    connection_string: String,
    key_lifetime: Duration,
}

impl Db {
    pub fn new(connection_string: String) -> Self {
        log::trace!("auth::Db::new( {:?} ) called.", &connection_string);

        Self {
            connection_string,
            key_lifetime: Duration::hours(24),
        }
    }

    /// How long issued keys stay good for. Non-positive values are ignored.
    pub fn set_key_lifetime(&mut self, lifetime: Duration) {
        if lifetime.is_positive() {
            self.key_lifetime = lifetime;
        }
    }

    async fn connect(&self) -> Result<Client, DbError> {
        log::trace!("auth::Db::connect() called.");

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("Auth DB connection error: {}", &e);
                    }
                });
                Ok(client)
            },
            Err(e) => Err(DbError::from(e).annotate("Unable to connect to auth DB")),
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("auth::Db::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("Auth DB unable to begin transaction"))?;

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

    /// Drop the auth tables. Only for cleaning up after tests.
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("auth::Db::nuke_database() called.");

        let client = self.connect().await?;
        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(*drop_stmt, &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }
        Ok(())
    }

    /// Store a password for `email`, replacing any existing one.
    pub async fn add_user(&self, email: &str, password: &str) -> Result<(), DbError> {
        log::trace!("auth::Db::add_user( {:?}, [ password ] ) called.", email);

        let salt = random_string(SALT_LENGTH);
        let hash = hash_password(password, &salt);

        let client = self.connect().await?;
        client.execute(
            "INSERT INTO passwords (email, salt, hash) VALUES ($1, $2, $3)
                ON CONFLICT (email) DO UPDATE
                SET salt = EXCLUDED.salt, hash = EXCLUDED.hash",
            &[&email, &salt, &hash]
        ).await?;

        Ok(())
    }

    pub async fn check_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthResult, DbError> {
        log::trace!("auth::Db::check_password( {:?}, [ password ] ) called.", email);

        let client = self.connect().await?;
        let row = match client.query_opt(
            "SELECT salt, hash FROM passwords WHERE email = $1",
            &[&email]
        ).await? {
            Some(row) => row,
            None => { return Ok(AuthResult::NoSuchUser); },
        };

        let salt: &str = row.try_get("salt")?;
        let hash: &str = row.try_get("hash")?;

        if hash_password(password, salt) == hash {
            Ok(AuthResult::Ok)
        } else {
            Ok(AuthResult::BadPassword)
        }
    }

    /// Generate a fresh key for `email`; expired keys are cleared out on
    /// the way.
    pub async fn issue_key(&self, email: &str) -> Result<String, DbError> {
        log::trace!("auth::Db::issue_key( {:?} ) called.", email);

        let key = random_string(KEY_LENGTH);
        let expires = OffsetDateTime::now_utc() + self.key_lifetime;

        let client = self.connect().await?;
        let params: [&(dyn ToSql + Sync); 3] = [&key, &email, &expires];
        let (purged, inserted) = tokio::join!(
            client.execute("DELETE FROM keys WHERE expires < now()", &[]),
            client.execute(
                "INSERT INTO keys (key, email, expires) VALUES ($1, $2, $3)",
                &params[..]
            ),
        );
        match purged {
            Ok(0) => {},
            Ok(n) => { log::debug!("Purged {} expired keys.", n); },
            Err(e) => { log::warn!("Error purging expired keys: {}", &e); },
        }
        inserted?;

        Ok(key)
    }

    pub async fn check_key(&self, email: &str, key: &str) -> Result<AuthResult, DbError> {
        log::trace!("auth::Db::check_key( {:?}, {:?} ) called.", email, key);

        let client = self.connect().await?;
        let res = client.query_opt(
            "SELECT FROM keys WHERE key = $1 AND email = $2 AND expires > now()",
            &[&key, &email]
        ).await?;

        match res {
            Some(_) => Ok(AuthResult::Ok),
            None => Ok(AuthResult::InvalidKey),
        }
    }
}

#[cfg(test)]
mod tests {
    /*!
    The database tests need a local Postgres with

    ```text
    user: ecole_test
    password: ecole_test
    database: ecole_auth_test
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    static TEST_CONNECTION: &str = "host=localhost user=ecole_test password='ecole_test' dbname=ecole_auth_test";

    #[test]
    fn hashes_depend_on_salt() {
        let a = hash_password("Admin2024!", "abcd");
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, hash_password("Admin2024!", "abcd"));
        assert_ne!(a, hash_password("Admin2024!", "abce"));
        assert_ne!(a, hash_password("admin2024!", "abcd"));
    }

    #[test]
    fn random_strings() {
        let k = random_string(KEY_LENGTH);
        assert_eq!(k.len(), KEY_LENGTH);
        assert!(k.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(k, random_string(KEY_LENGTH));
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_auth() {
        ensure_logging();
        Db::new(TEST_CONNECTION.to_owned()).nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn passwords_and_keys() {
        ensure_logging();
        let db = Db::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        db.add_user("parent@ecole.test", "secret1").await.unwrap();
        assert_eq!(
            db.check_password("parent@ecole.test", "secret1").await.unwrap(),
            AuthResult::Ok
        );
        assert_eq!(
            db.check_password("parent@ecole.test", "secret2").await.unwrap(),
            AuthResult::BadPassword
        );
        assert_eq!(
            db.check_password("nobody@ecole.test", "secret1").await.unwrap(),
            AuthResult::NoSuchUser
        );

        let key = db.issue_key("parent@ecole.test").await.unwrap();
        assert_eq!(db.check_key("parent@ecole.test", &key).await.unwrap(), AuthResult::Ok);
        assert_eq!(
            db.check_key("other@ecole.test", &key).await.unwrap(),
            AuthResult::InvalidKey
        );

        // Changing the password keeps working keys but not the old password.
        db.add_user("parent@ecole.test", "secret2").await.unwrap();
        assert_eq!(
            db.check_password("parent@ecole.test", "secret1").await.unwrap(),
            AuthResult::BadPassword
        );

        db.nuke_database().await.unwrap();
    }
}
