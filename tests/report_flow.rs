use chrono::NaiveDate;

use telecaller_dashboard::auth::{Actor, AuthOutcome, Authenticator};
use telecaller_dashboard::clock::{FixedClock, parse_timestamp};
use telecaller_dashboard::error::DashboardError;
use telecaller_dashboard::models::{ReportMetrics, Role};
use telecaller_dashboard::reports::{HistoryFilter, ReportFilter, ReportService};
use telecaller_dashboard::schema::Table;
use telecaller_dashboard::store::{FallbackStore, LocalFileStore, RecordStore};
use telecaller_dashboard::users::{NewUser, UserService, ensure_default_admin};

struct Fixture {
    _dir: tempfile::TempDir,
    store: FallbackStore,
    clock: FixedClock,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = FallbackStore::local_only(LocalFileStore::open(dir.path()).unwrap());
        let clock = FixedClock(parse_timestamp("2024-01-06 10:00:00").unwrap());
        ensure_default_admin(&store, &clock, "secret").unwrap();
        Fixture {
            _dir: dir,
            store,
            clock,
        }
    }

    fn login(&self, username: &str, password: &str) -> Actor {
        Authenticator::new(&self.store)
            .authenticate(username, password)
            .unwrap()
            .into_actor()
            .unwrap()
    }

    fn add_telecaller(&self, username: &str, telecaller: &str) {
        let admin = self.login("admin", "secret");
        UserService::new(&self.store, &self.clock)
            .create_user(
                &admin,
                NewUser {
                    username: username.to_string(),
                    password: "pw".to_string(),
                    role: Role::Telecaller,
                    name: telecaller.to_string(),
                    telecaller_name: Some(telecaller.to_string()),
                },
            )
            .unwrap();
    }
}

fn jan(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

fn calls(n: i64) -> ReportMetrics {
    ReportMetrics {
        total_calls: n,
        ..ReportMetrics::default()
    }
}

#[test]
fn same_day_resubmission_keeps_one_row_and_one_history_entry() {
    let fx = Fixture::new();
    fx.add_telecaller("t1", "T1");
    let t1 = fx.login("t1", "pw");
    let service = ReportService::new(&fx.store, &fx.clock);

    service.submit_report(&t1, "T1", jan(5), calls(20)).unwrap();
    service.submit_report(&t1, "T1", jan(5), calls(25)).unwrap();

    let rows = service.list_reports(&t1, &ReportFilter::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].metrics.total_calls, 25);
    assert_eq!(rows[0].submitted_by, "t1");

    let admin = fx.login("admin", "secret");
    let history = service.edit_history(&admin, &HistoryFilter::default()).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].original.total_calls, 20);
    assert_eq!(history[0].telecaller, "T1");
    assert_eq!(history[0].report_date, jan(5));
}

#[test]
fn login_yields_stored_role_only_for_correct_password() {
    let fx = Fixture::new();
    fx.add_telecaller("t1", "T1");
    let auth = Authenticator::new(&fx.store);

    assert_eq!(auth.authenticate("admin", "secret").unwrap().role(), Some(Role::Admin));
    assert_eq!(auth.authenticate("t1", "pw").unwrap().role(), Some(Role::Telecaller));
    assert_eq!(auth.authenticate("t1", "PW").unwrap(), AuthOutcome::Denied);
    assert_eq!(auth.authenticate("nobody", "pw").unwrap(), AuthOutcome::Denied);
}

#[test]
fn deactivation_leaves_reports_in_place() {
    let fx = Fixture::new();
    fx.add_telecaller("t1", "T1");
    let t1 = fx.login("t1", "pw");
    let service = ReportService::new(&fx.store, &fx.clock);
    service.submit_report(&t1, "T1", jan(4), calls(12)).unwrap();
    service.submit_report(&t1, "T1", jan(5), calls(15)).unwrap();
    let before = fx.store.get_rows(Table::Reports).unwrap();

    let admin = fx.login("admin", "secret");
    UserService::new(&fx.store, &fx.clock)
        .deactivate_user(&admin, "t1")
        .unwrap();

    assert_eq!(fx.store.get_rows(Table::Reports).unwrap(), before);
    let filter = ReportFilter {
        telecaller: Some("T1".to_string()),
        ..ReportFilter::default()
    };
    assert_eq!(service.list_reports(&admin, &filter).unwrap().len(), 2);
    assert!(!Authenticator::new(&fx.store).authenticate("t1", "pw").unwrap().is_granted());
}

#[test]
fn telecaller_cannot_overwrite_someone_elses_day() {
    let fx = Fixture::new();
    fx.add_telecaller("t1", "T1");
    fx.add_telecaller("t2", "T2");
    let admin = fx.login("admin", "secret");
    let t2 = fx.login("t2", "pw");
    let service = ReportService::new(&fx.store, &fx.clock);

    service.submit_report(&admin, "T1", jan(5), calls(20)).unwrap();
    let err = service.submit_report(&t2, "T1", jan(5), calls(1)).unwrap_err();
    assert!(matches!(err, DashboardError::PermissionDenied(_)));

    let rows = service.list_reports(&admin, &ReportFilter::default()).unwrap();
    assert_eq!(rows[0].metrics.total_calls, 20);
    assert!(service.edit_history(&admin, &HistoryFilter::default()).unwrap().is_empty());
}
