/*!
`Store` methods for user accounts.

Only the profile lives here; passwords are in the auth DB, keyed by the
same (normalized) email address.
*/
use tokio_postgres::Row;

use super::{is_unique_violation, DbError, Store};
use crate::user::{normalize_email, NewUser, Role, User};

fn user_from_row(row: &Row) -> Result<User, DbError> {
    let role_str: &str = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        role: role_str.parse()?,
        last_name: row.try_get("last_name")?,
        first_names: row.try_get("first_names")?,
        phone: row.try_get("phone")?,
        active: row.try_get("active")?,
        created: row.try_get("created")?,
        modified: row.try_get("modified")?,
    })
}

impl Store {
    /// Insert a new user with the given `role`.
    ///
    /// Returns `None` if the email address is already taken.
    pub async fn insert_user(
        &self,
        u: &NewUser,
        role: Role,
    ) -> Result<Option<User>, DbError> {
        log::trace!("Store::insert_user( {:?}, {} ) called.", &u.email, &role);

        let email = normalize_email(&u.email);
        let client = self.connect().await?;

        let res = client.query_one(
            "INSERT INTO users (email, role, last_name, first_names, phone)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *",
            &[
                &email,
                &role.to_string(),
                &u.last_name.trim(),
                &u.first_names.trim(),
                &u.phone.as_deref().map(crate::phone::normalize),
            ]
        ).await;

        match res {
            Ok(row) => Ok(Some(user_from_row(&row)?)),
            Err(e) if is_unique_violation(&e) => {
                log::trace!("    ...email {:?} already in use.", &email);
                Ok(None)
            },
            Err(e) => Err(DbError::from(e).annotate("Error inserting user")),
        }
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user_by_email( {:?} ) called.", email);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM users WHERE email = $1",
            &[&normalize_email(email)]
        ).await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Enable or disable a user's account. Returns `None` if there's no
    /// such user.
    pub async fn set_user_active(
        &self,
        email: &str,
        active: bool,
    ) -> Result<Option<User>, DbError> {
        log::trace!("Store::set_user_active( {:?}, {} ) called.", email, active);

        let client = self.connect().await?;
        match client.query_opt(
            "UPDATE users SET active = $2, modified = now()
                WHERE email = $1
                RETURNING *",
            &[&normalize_email(email), &active]
        ).await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Remove a user's profile. Returns whether there was one to remove.
    ///
    /// Only used to back out an account whose password couldn't be stored;
    /// users with history are disabled instead.
    pub async fn delete_user(&self, email: &str) -> Result<bool, DbError> {
        log::trace!("Store::delete_user( {:?} ) called.", email);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM users WHERE email = $1",
            &[&normalize_email(email)]
        ).await
            .map_err(|e| DbError::from(e).annotate("Error deleting user"))?;

        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::fresh_store;

    use serial_test::serial;

    fn teacher() -> NewUser {
        NewUser {
            email: "Prof.Diallo@ecole-smart.gn".to_owned(),
            password: "Teacher2024!".to_owned(),
            last_name: "Diallo".to_owned(),
            first_names: "Alpha Oumar".to_owned(),
            role: None,
            phone: Some("+224 62 00 00 01".to_owned()),
        }
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn insert_and_get_users() {
        let db = fresh_store().await;

        let u = db.insert_user(&teacher(), Role::Teacher).await.unwrap().unwrap();
        assert_eq!(u.email, "prof.diallo@ecole-smart.gn");
        assert_eq!(u.role, Role::Teacher);
        assert_eq!(u.phone.as_deref(), Some("+22462000001"));
        assert!(u.active);

        // Same address, different case.
        let mut dup = teacher();
        dup.email = "PROF.DIALLO@ecole-smart.gn".to_owned();
        assert!(db.insert_user(&dup, Role::Parent).await.unwrap().is_none());

        let got = db.get_user_by_email(" prof.diallo@ECOLE-SMART.gn").await.unwrap().unwrap();
        assert_eq!(got.id, u.id);
        assert!(db.get_user_by_email("nobody@ecole-smart.gn").await.unwrap().is_none());

        let off = db.set_user_active(&u.email, false).await.unwrap().unwrap();
        assert!(!off.active);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn backed_out_users_free_their_email() {
        let db = fresh_store().await;

        let u = db.insert_user(&teacher(), Role::Teacher).await.unwrap().unwrap();
        assert!(db.delete_user("PROF.DIALLO@ecole-smart.gn").await.unwrap());
        assert!(db.get_user_by_email(&u.email).await.unwrap().is_none());
        assert!(!db.delete_user(&u.email).await.unwrap());

        assert!(db.insert_user(&teacher(), Role::Teacher).await.unwrap().is_some());

        db.nuke_database().await.unwrap();
    }
}
