/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use time::Duration;
use tokio::sync::RwLock;

use crate::{
    auth, auth::AuthResult,
    grade::{default_subjects, Subject},
    store::Store,
    student::check_school_year,
    user::{NewUser, Role},
};

#[derive(Deserialize)]
struct ConfigFile {
    auth_db_connect_string: Option<String>,
    data_db_connect_string: Option<String>,
    admin_email: Option<String>,
    admin_password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    school_year: Option<String>,
    static_dir: Option<String>,
    key_lifetime_hours: Option<i64>,
}

#[derive(Debug)]
pub struct Cfg {
    pub auth_db_connect_string: String,
    pub data_db_connect_string: String,
    pub default_admin_email: String,
    pub default_admin_password: String,
    pub addr: SocketAddr,
    pub school_year: String,
    pub static_dir: PathBuf,
    pub key_lifetime: Duration,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            auth_db_connect_string: "host=localhost user=ecole_test password='ecole_test' dbname=ecole_auth_test".to_owned(),
            data_db_connect_string: "host=localhost user=ecole_test password='ecole_test' dbname=ecole_test".to_owned(),
            default_admin_email: "admin@ecole-smart.gn".to_owned(),
            default_admin_password: "Admin2024!".to_owned(),
            addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            school_year: "2024-2025".to_owned(),
            static_dir: PathBuf::from("static"),
            key_lifetime: Duration::hours(24),
        }
    }
}

impl Cfg {
    /// Parse the contents of a config file; missing keys keep their
    /// defaults.
    pub fn from_toml(file_contents: &str) -> Result<Self, String> {
        let cf: ConfigFile = toml::from_str(file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.auth_db_connect_string {
            c.auth_db_connect_string = s;
        }
        if let Some(s) = cf.data_db_connect_string {
            c.data_db_connect_string = s;
        }
        if let Some(s) = cf.admin_email {
            c.default_admin_email = crate::user::normalize_email(&s);
        }
        if let Some(s) = cf.admin_password {
            c.default_admin_password = s;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }
        if let Some(s) = cf.school_year {
            check_school_year(&s)?;
            c.school_year = s;
        }
        if let Some(s) = cf.static_dir {
            c.static_dir = PathBuf::from(s);
        }
        if let Some(n) = cf.key_lifetime_hours {
            if n < 1 {
                return Err(format!(
                    "key_lifetime_hours must be at least 1 (got {}).", n
                ));
            }
            c.key_lifetime = Duration::hours(n);
        }

        Ok(c)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file {}: {}", path.display(), &e))?;
        Self::from_toml(&file_contents)
    }
}

/**
This guy will haul around some global variables and be passed in an
`axum::Extension` to the handlers who need him.
*/
pub struct Glob {
    auth: Arc<RwLock<auth::Db>>,
    data: Arc<RwLock<Store>>,
    /// Cached at startup; subjects don't change while running.
    pub subjects: Vec<Subject>,
    pub school_year: String,
    pub static_dir: PathBuf,
    pub addr: SocketAddr,
}

impl Glob {
    /// Global state straight from a `Cfg`, without touching either database.
    pub fn from_cfg(cfg: Cfg, subjects: Vec<Subject>) -> Glob {
        let mut auth_db = auth::Db::new(cfg.auth_db_connect_string);
        auth_db.set_key_lifetime(cfg.key_lifetime);

        Glob {
            auth: Arc::new(RwLock::new(auth_db)),
            data: Arc::new(RwLock::new(Store::new(cfg.data_db_connect_string))),
            subjects,
            school_year: cfg.school_year,
            static_dir: cfg.static_dir,
            addr: cfg.addr,
        }
    }

    pub fn auth(&self) -> Arc<RwLock<auth::Db>> { self.auth.clone() }

    pub fn data(&self) -> Arc<RwLock<Store>> { self.data.clone() }

    pub fn subject(&self, code: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.code == code)
    }
}

/// Makes sure the default administrator exists in both databases.
async fn ensure_default_admin(
    cfg: &Cfg,
    auth_db: &auth::Db,
    data_db: &Store,
) -> Result<(), String> {
    log::trace!("Checking existence of default Admin in data DB...");
    match data_db.get_user_by_email(&cfg.default_admin_email).await {
        Err(e) => {
            let estr = format!(
                "Error attempting to check existence of default Admin ({}) in data DB: {}",
                &cfg.default_admin_email, &e
            );
            return Err(estr);
        },
        Ok(None) => {
            log::info!(
                "Default Admin ({}) doesn't exist in data DB; inserting.",
                &cfg.default_admin_email
            );
            let nu = NewUser {
                email: cfg.default_admin_email.clone(),
                password: cfg.default_admin_password.clone(),
                last_name: "Administrateur".to_owned(),
                first_names: "Principal".to_owned(),
                role: Some(Role::Admin),
                phone: None,
            };
            match data_db.insert_user(&nu, Role::Admin).await {
                Err(e) => {
                    let estr = format!("Error inserting default Admin into data DB: {}", &e);
                    return Err(estr);
                },
                Ok(None) => {
                    log::warn!("Default Admin appeared in data DB during insertion.");
                },
                Ok(Some(_)) => {},
            }
        },
        Ok(Some(u)) => {
            if u.role != Role::Admin {
                log::warn!(
                    "Default Admin email ({}) belongs to a user with role {}.",
                    &u.email, &u.role
                );
            }
        },
    }
    log::trace!("Default admin OK in data DB.");

    log::trace!("Checking existence of default Admin in auth DB...");
    match auth_db.check_password(
        &cfg.default_admin_email,
        &cfg.default_admin_password,
    ).await {
        Err(e) => {
            let estr = format!("Error checking existence of default Admin in auth DB: {}", &e);
            return Err(estr);
        },
        Ok(AuthResult::BadPassword) => {
            log::warn!("Default Admin ({}) not using default password.", &cfg.default_admin_email);
        },
        Ok(AuthResult::NoSuchUser) => {
            log::info!(
                "Default Admin ({}) doesn't exist in auth DB; inserting.",
                &cfg.default_admin_email
            );
            if let Err(e) = auth_db.add_user(
                &cfg.default_admin_email,
                &cfg.default_admin_password,
            ).await {
                let estr = format!("Error inserting default Admin into auth DB: {}", &e);
                return Err(estr);
            };
            log::trace!("Default Admin inserted into auth DB.");
        },
        Ok(AuthResult::Ok) => {
            log::trace!("Default Admin password check OK.");
        },
        Ok(x) => {
            let estr = format!(
                "Default Admin password check resulted in {:?}, which just doesn't make sense.",
                &x
            );
            return Err(estr);
        },
    }
    log::trace!("Default Admin OK in auth DB.");

    Ok(())
}

/// Loads system configuration and ensures all appropriate database tables
/// exist.
///
/// Also assures existence of the default admin and the default subjects.
pub async fn load_configuration<P: AsRef<Path>>(path: P) -> Result<Glob, String> {
    let cfg = Cfg::from_file(path.as_ref())?;
    log::info!("Configuration file read:\n{:#?}", &cfg);

    log::trace!("Checking state of auth DB...");
    let mut auth_db = auth::Db::new(cfg.auth_db_connect_string.clone());
    auth_db.set_key_lifetime(cfg.key_lifetime);
    if let Err(e) = auth_db.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of auth DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...auth DB okay.");

    log::trace!("Checking state of data DB...");
    let data_db = Store::new(cfg.data_db_connect_string.clone());
    if let Err(e) = data_db.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of data DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...data DB okay.");

    ensure_default_admin(&cfg, &auth_db, &data_db).await?;

    data_db.ensure_subjects(&default_subjects()).await
        .map_err(|e| format!("Error ensuring default subjects: {}", &e))?;
    let subjects = data_db.get_subjects().await
        .map_err(|e| format!("Error retrieving subjects from data DB: {}", &e))?;
    log::info!("Retrieved {} subjects from data DB.", subjects.len());

    let glob = Glob {
        auth: Arc::new(RwLock::new(auth_db)),
        data: Arc::new(RwLock::new(data_db)),
        subjects,
        school_year: cfg.school_year,
        static_dir: cfg.static_dir,
        addr: cfg.addr,
    };

    Ok(glob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    #[test]
    fn empty_file_gives_defaults() {
        ensure_logging();
        let c = Cfg::from_toml("").unwrap();
        assert_eq!(c.addr, SocketAddr::from(([0, 0, 0, 0], 8001)));
        assert_eq!(c.school_year, "2024-2025");
        assert_eq!(c.static_dir, PathBuf::from("static"));
        assert_eq!(c.key_lifetime, Duration::hours(24));
        assert_eq!(c.default_admin_email, "admin@ecole-smart.gn");
    }

    #[test]
    fn file_values_override_defaults() {
        let c = Cfg::from_toml(r#"
            data_db_connect_string = "host=db user=ecole dbname=ecole"
            admin_email = " Direction@Ecole.GN "
            host = "127.0.0.1"
            port = 8080
            school_year = "2025-2026"
            static_dir = "frontend/dist"
            key_lifetime_hours = 8
        "#).unwrap();

        assert_eq!(c.data_db_connect_string, "host=db user=ecole dbname=ecole");
        assert_eq!(c.default_admin_email, "direction@ecole.gn");
        assert_eq!(c.addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(c.school_year, "2025-2026");
        assert_eq!(c.static_dir, PathBuf::from("frontend/dist"));
        assert_eq!(c.key_lifetime, Duration::hours(8));
    }

    #[test]
    fn bad_values_are_refused() {
        assert!(Cfg::from_toml(r#"host = "localhost""#).is_err());
        assert!(Cfg::from_toml(r#"school_year = "2024-2026""#).is_err());
        assert!(Cfg::from_toml("key_lifetime_hours = 0").is_err());
        assert!(Cfg::from_toml("port = \"eighty\"").is_err());
    }

    #[test]
    fn subjects_are_found_by_code() {
        let g = Glob::from_cfg(Cfg::default(), default_subjects());
        assert_eq!(g.subject("MATH").map(|s| s.coefficient), Some(3.0));
        assert!(g.subject("LATIN").is_none());
    }
}
