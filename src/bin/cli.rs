use log::info;
use std::env;
use std::fs;

use telecaller_dashboard::analytics::{self, TimeRange};
use telecaller_dashboard::auth::{Actor, Authenticator};
use telecaller_dashboard::clock::{Clock, SystemClock, parse_date};
use telecaller_dashboard::config::Config;
use telecaller_dashboard::downloader;
use telecaller_dashboard::error::DashboardError;
use telecaller_dashboard::models::Role;
use telecaller_dashboard::reports::{HistoryFilter, ReportFilter, ReportService};
use telecaller_dashboard::store::{FallbackStore, open_store};
use telecaller_dashboard::users::{NewUser, UserService, ensure_default_admin};

const USAGE: &str = "Usage: dashboard-cli <command> [args]

Commands:
  status
  reports [--telecaller NAME] [--from YYYY-MM-DD] [--to YYYY-MM-DD] [--search TEXT]
  stats [today|yesterday|week|month|all]
  export <reports.csv|reports.xlsx|history.csv> <output path>
  add-user <username> <password> <admin|telecaller> [display name]
  deactivate <username>
  passwd <username> <new password>

Credentials are read from DASHBOARD_USER and DASHBOARD_PASSWORD.";

/// Command-line administration of the dashboard data
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let config = Config::from_env();
    let store = open_store(&config)?;
    let clock = SystemClock;
    ensure_default_admin(&store, &clock, &config.admin_password)?;

    if command == "status" {
        let status = store.status();
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let actor = sign_in(&store)?;
    let rest = &args[1..];

    match command.as_str() {
        "reports" => {
            let filter = report_filter(rest)?;
            let reports = ReportService::new(&store, &clock).list_reports(&actor, &filter)?;
            for report in &reports {
                println!(
                    "{}  {:<12} calls {:>4}  new {:>3}  crm {:>3}  video {}",
                    report.date,
                    report.telecaller,
                    report.metrics.total_calls,
                    report.metrics.new_data,
                    report.metrics.crm_data,
                    if report.metrics.video { "yes" } else { "no" }
                );
            }
            println!("{} report(s)", reports.len());
        }
        "stats" => {
            let range = match rest.first() {
                Some(raw) => TimeRange::parse(raw)
                    .ok_or_else(|| DashboardError::Validation(format!("Unknown range {}", raw)))?,
                None => TimeRange::Today,
            };
            if !actor.can_view_analytics() {
                return Err(DashboardError::PermissionDenied(format!(
                    "{} may not view analytics",
                    actor.username
                ))
                .into());
            }
            let reports = ReportService::new(&store, &clock).list_reports(&actor, &ReportFilter::default())?;
            let stats = analytics::dashboard_stats(&reports, range, clock.today());
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        "export" => {
            let [what, path] = rest else {
                eprintln!("{}", USAGE);
                return Ok(());
            };
            downloader::check_export(&actor)?;
            let reports = ReportService::new(&store, &clock);
            let bytes = match what.as_str() {
                "reports.csv" => {
                    downloader::reports_to_csv(&reports.list_reports(&actor, &ReportFilter::default())?)
                        .into_bytes()
                }
                "reports.xlsx" => {
                    downloader::reports_to_xlsx(&reports.list_reports(&actor, &ReportFilter::default())?)?
                }
                "history.csv" => {
                    downloader::history_to_csv(&reports.edit_history(&actor, &HistoryFilter::default())?)
                        .into_bytes()
                }
                other => {
                    return Err(DashboardError::Validation(format!("Unknown export {}", other)).into());
                }
            };
            fs::write(path, &bytes)?;
            info!("Wrote {} bytes to {}", bytes.len(), path);
        }
        "add-user" => {
            let (username, password, role) = match rest {
                [username, password, role, ..] => (username, password, role),
                _ => {
                    eprintln!("{}", USAGE);
                    return Ok(());
                }
            };
            let role = Role::parse(role)
                .ok_or_else(|| DashboardError::Validation(format!("Unknown role {}", role)))?;
            let new_user = NewUser {
                username: username.clone(),
                password: password.clone(),
                role,
                name: rest.get(3..).map(|words| words.join(" ")).unwrap_or_default(),
                telecaller_name: None,
            };
            let user = UserService::new(&store, &clock).create_user(&actor, new_user)?;
            println!("Created {} account {}", user.role, user.username);
        }
        "deactivate" => {
            let [username] = rest else {
                eprintln!("{}", USAGE);
                return Ok(());
            };
            UserService::new(&store, &clock).deactivate_user(&actor, username)?;
            println!("Deactivated {}", username);
        }
        "passwd" => {
            let [username, password] = rest else {
                eprintln!("{}", USAGE);
                return Ok(());
            };
            UserService::new(&store, &clock).change_password(&actor, username, password)?;
            println!("Password changed for {}", username);
        }
        _ => eprintln!("{}", USAGE),
    }

    Ok(())
}

fn sign_in(store: &FallbackStore) -> Result<Actor, DashboardError> {
    let username = env::var("DASHBOARD_USER").unwrap_or_default();
    let password = env::var("DASHBOARD_PASSWORD").unwrap_or_default();
    Authenticator::new(store).authenticate(&username, &password)?.into_actor()
}

fn report_filter(args: &[String]) -> Result<ReportFilter, DashboardError> {
    let mut filter = ReportFilter::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .ok_or_else(|| DashboardError::Validation(format!("{} needs a value", flag)))?;
        match flag.as_str() {
            "--telecaller" => filter.telecaller = Some(value.clone()),
            "--from" => filter.start_date = Some(date_arg(value)?),
            "--to" => filter.end_date = Some(date_arg(value)?),
            "--search" => filter.search = Some(value.clone()),
            other => return Err(DashboardError::Validation(format!("Unknown option {}", other))),
        }
    }
    Ok(filter)
}

fn date_arg(raw: &str) -> Result<chrono::NaiveDate, DashboardError> {
    parse_date(raw).ok_or_else(|| DashboardError::Validation(format!("Bad date {}", raw)))
}
