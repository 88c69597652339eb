/*!
École Smart: school management backend.

Students, invoices, simulated mobile-money payments, attendance, grades
and the dashboards built on top of them, served as a JSON API.
*/
pub mod attendance;
pub mod auth;
pub mod config;
pub mod grade;
pub mod inter;
pub mod invoice;
pub mod page;
pub mod payment;
pub mod phone;
pub mod report;
pub mod store;
pub mod student;
pub mod user;

/// Currency every amount in the system is denominated in.
pub const CURRENCY: &str = "GNF";

// Generates the `iso_date` module for `#[serde(with = "...")]` on `Date` fields.
#[allow(unused_imports)]
use time::Date;
time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

pub fn log_level_from_env() -> simplelog::LevelFilter {
    use simplelog::LevelFilter;

    let mut level_string = match std::env::var("LOG_LEVEL") {
        Err(_) => { return LevelFilter::Warn; },
        Ok(s) => s,
    };

    level_string.make_ascii_lowercase();
    match level_string.as_str() {
        "max" => LevelFilter::max(),
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn ensure_logging() {
        use simplelog::{TermLogger, TerminalMode, ColorChoice};
        let log_cfg = simplelog::ConfigBuilder::new()
            .add_filter_allow_str("ecole")
            .build();
        let res = TermLogger::init(
            log_level_from_env(),
            log_cfg,
            TerminalMode::Stdout,
            ColorChoice::Auto
        );

        match res {
            Ok(_) => { log::info!("Test logging started."); },
            Err(_) => { log::info!("Test logging already started."); },
        }
    }

    #[test]
    fn iso_dates_round_trip_through_serde() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Holder {
            #[serde(with = "iso_date")]
            day: time::Date,
        }

        let h: Holder = serde_json::from_str(r#"{"day":"2024-10-01"}"#).unwrap();
        assert_eq!(h.day, time::macros::date!(2024 - 10 - 01));
        assert_eq!(
            serde_json::to_string(&h).unwrap(),
            r#"{"day":"2024-10-01"}"#
        );
        assert!(serde_json::from_str::<Holder>(r#"{"day":"01/10/2024"}"#).is_err());
    }
}
