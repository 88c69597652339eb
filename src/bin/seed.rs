/*!
Populating a local environment with enough sample data to allow some
experimentation: a few teachers and parents, a couple of dozen students,
and a tuition invoice for each student.

Running it more than once is harmless; users are skipped by email and
students by name.

```bash
cargo run --bin seed -- ecole.toml
```
*/
use simplelog::{ColorChoice, TerminalMode, TermLogger};
use time::{macros::date, Date, OffsetDateTime};

use ecole::{
    config::{self, Glob},
    invoice::NewInvoice,
    page::Page,
    student::{ClassLevel, NewStudent, Sex, StudentFilter},
    user::{NewUser, Role},
};

static STAFF: &[(&str, &str, &str, Role)] = &[
    ("m.camara@ecole-smart.gn", "Camara", "Mamadou", Role::Teacher),
    ("f.diallo@ecole-smart.gn", "Diallo", "Fatoumata", Role::Teacher),
    ("i.sylla@ecole-smart.gn", "Sylla", "Ibrahima", Role::Teacher),
    ("parent.bah@gmail.com", "Bah", "Alpha Oumar", Role::Parent),
    ("parent.kaba@gmail.com", "Kaba", "Mariama", Role::Parent),
];

static SAMPLE_PASSWORD: &str = "Ecole2024!";

static LAST_NAMES: &[&str] = &[
    "Bah", "Barry", "Camara", "Condé", "Diallo", "Keita",
    "Kaba", "Soumah", "Sylla", "Touré", "Bangoura", "Cissé",
];

static FIRST_NAMES: &[(&str, Sex)] = &[
    ("Aissatou", Sex::Female),
    ("Mamadou", Sex::Male),
    ("Fatoumata", Sex::Female),
    ("Ousmane", Sex::Male),
    ("Mariama", Sex::Female),
    ("Sékou", Sex::Male),
];

static CLASSES: &[ClassLevel] = &[
    ClassLevel::Cp1, ClassLevel::Ce2, ClassLevel::Cm2,
    ClassLevel::Sixieme, ClassLevel::Troisieme, ClassLevel::Terminale,
];

/// Yearly tuition for a class, in GNF.
fn tuition(class: ClassLevel) -> i64 {
    match class.code().as_str() {
        "01" | "02" | "03" | "04" | "05" | "06" => 1_500_000,
        "07" | "08" | "09" | "10" => 2_000_000,
        _ => 2_500_000,
    }
}

async fn seed_users(glob: &Glob) -> Result<usize, String> {
    let mut n_inserted = 0;
    for (email, last_name, first_names, role) in STAFF.iter() {
        let nu = NewUser {
            email: (*email).to_owned(),
            password: SAMPLE_PASSWORD.to_owned(),
            last_name: (*last_name).to_owned(),
            first_names: (*first_names).to_owned(),
            role: Some(*role),
            phone: None,
        };

        let res = glob.data().read().await.insert_user(&nu, *role).await;
        match res.map_err(|e| format!("Error inserting user {:?}: {}", email, &e))? {
            None => {
                log::info!("User {:?} already present; skipping.", email);
                continue;
            },
            Some(u) => {
                glob.auth().read().await.add_user(&u.email, SAMPLE_PASSWORD).await
                    .map_err(|e| format!("Error setting password for {:?}: {}", email, &e))?;
                n_inserted += 1;
            },
        }
    }
    Ok(n_inserted)
}

async fn student_exists(glob: &Glob, last_name: &str, first_names: &str) -> Result<bool, String> {
    let filter = StudentFilter {
        search: Some(last_name.to_owned()),
        ..Default::default()
    };
    let page = Page { page: 1, limit: ecole::page::MAX_LIMIT };
    let (found, _) = glob.data().read().await.get_students(&filter, page).await
        .map_err(|e| format!("Error searching for students: {}", &e))?;

    Ok(found.iter().any(|s| s.last_name == last_name && s.first_names == first_names))
}

async fn seed_students(glob: &Glob, due: Date) -> Result<usize, String> {
    let mut n_inserted = 0;
    for (n, last_name) in LAST_NAMES.iter().enumerate() {
        for (m, (first_names, sex)) in FIRST_NAMES.iter().enumerate().skip(n % 2).step_by(2) {
            if student_exists(glob, last_name, first_names).await? {
                continue;
            }

            let class = CLASSES[(n + m) % CLASSES.len()];
            let ns = NewStudent {
                last_name: (*last_name).to_owned(),
                first_names: (*first_names).to_owned(),
                birth_date: date!(2010 - 01 - 15),
                sex: *sex,
                class,
                parent_phone: Some(format!("62{}{:05}", n % 6, 100 + n * 10 + m)),
                address: Some("Conakry".to_owned()),
                school_year: None,
            };
            let student = glob.data().read().await.insert_student(&ns, &glob.school_year).await
                .map_err(|e| format!("Error inserting student {} {}: {}", last_name, first_names, &e))?;

            let ni = NewInvoice {
                student_id: student.id,
                title: format!("Frais de scolarité {}", &glob.school_year),
                description: Some(format!("Scolarité annuelle, classe de {}", class)),
                total: tuition(class),
                due,
                fee_types: vec!["tuition".to_owned()],
            };
            glob.data().read().await.insert_invoice(&ni).await
                .map_err(|e| format!("Error invoicing {}: {}", &student.matricule, &e))?;

            n_inserted += 1;
        }
    }
    Ok(n_inserted)
}

#[tokio::main]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("ecole")
        .add_filter_allow_str("seed")
        .build();
    if let Err(e) = TermLogger::init(
        ecole::log_level_from_env().max(simplelog::LevelFilter::Info),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ) {
        eprintln!("Unable to start logging: {}", &e);
    }

    let path = std::env::args().nth(1).unwrap_or_else(|| "ecole.toml".to_owned());
    let glob = match config::load_configuration(&path).await {
        Ok(glob) => glob,
        Err(e) => {
            log::error!("Error loading configuration from {:?}: {}", &path, &e);
            std::process::exit(1);
        },
    };

    match seed_users(&glob).await {
        Ok(n) => { log::info!("Inserted {} sample users.", n); },
        Err(e) => {
            log::error!("{}", &e);
            std::process::exit(1);
        },
    }

    let due = OffsetDateTime::now_utc().date() + time::Duration::days(45);
    match seed_students(&glob, due).await {
        Ok(n) => { log::info!("Enrolled and invoiced {} sample students.", n); },
        Err(e) => {
            log::error!("{}", &e);
            std::process::exit(1);
        },
    }
}
