use assiduity_core::types::{NewEvent, NewGroup, NewMember};
use assiduity_core::{Database, Registry};
use chrono::{Duration, Local};
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::Arc;
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("assiduity/assiduity.db")
    }

    /// Two members in "Choir", one of them registered long ago, and one
    /// event where only the recent member attended.
    fn seed(&self) {
        let db = Database::open(&self.db_path()).expect("failed to open db");
        db.migrate().expect("failed to migrate db");
        let registry = Registry::new(Arc::new(db));

        let choir = registry
            .add_group(&NewGroup {
                name: "Choir".to_string(),
                color: "#16A34A".to_string(),
                ..Default::default()
            })
            .unwrap();

        let now = Local::now().naive_local();
        let recent = registry
            .add_member(&NewMember {
                last_name: "Diallo".to_string(),
                given_names: "Awa".to_string(),
                school: "Lycée Classique".to_string(),
                registered_at: Some(now - Duration::days(3)),
                ..Default::default()
            })
            .unwrap();
        let veteran = registry
            .add_member(&NewMember {
                last_name: "Yao".to_string(),
                given_names: "Koffi".to_string(),
                registered_at: Some(now - Duration::days(400)),
                ..Default::default()
            })
            .unwrap();
        registry.add_member_to_group(choir, recent).unwrap();
        registry.add_member_to_group(choir, veteran).unwrap();

        let day = Local::now().date_naive() - Duration::days(1);
        let rehearsal = registry
            .add_event(&NewEvent {
                name: "Rehearsal".to_string(),
                date: day,
                time: "17:00".to_string(),
                location: String::new(),
                description: String::new(),
                group_id: Some(choir),
            })
            .unwrap();
        registry.record_attendance(recent, Some(rehearsal), true, day).unwrap();
        registry.record_attendance(veteran, Some(rehearsal), false, day).unwrap();
    }
}

fn run_stats(env: &CliTestEnv, args: &[&str]) -> Output {
    Command::new(PathBuf::from(assert_cmd::cargo::cargo_bin!("assiduity-stats")))
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute assiduity-stats: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }
    panic!(
        "assiduity-stats {} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        args.join(" "),
        output.status,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn json_stdout(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be valid JSON")
}

#[test]
fn empty_database_prints_zero_summary() {
    let env = CliTestEnv::new();

    let output = run_stats(&env, &[]);
    assert_success(&[], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ATTENDANCE STATISTICS"));
    assert!(stdout.contains("Members:  0"), "got:\n{stdout}");
    assert!(stdout.contains("Mean attendance: 0.0%"));
    assert!(env.db_path().exists(), "database should be created");
}

#[test]
fn terminal_summary_lists_rankings() {
    let env = CliTestEnv::new();
    env.seed();

    let output = run_stats(&env, &[]);
    assert_success(&[], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("TOP PERFORMERS"));
    assert!(stdout.contains("Diallo Awa"));
    assert!(stdout.contains("GROUPS"));
    assert!(stdout.contains("Choir"));
    assert!(stdout.contains("RECENT EVENTS"));
}

#[test]
fn json_export_carries_every_view() {
    let env = CliTestEnv::new();
    env.seed();

    let args = ["--export", "json"];
    let output = run_stats(&env, &args);
    assert_success(&args, &output);

    let json = json_stdout(&output);
    assert_eq!(json["totals"]["members"], 2);
    assert_eq!(json["totals"]["groups"], 1);
    assert_eq!(json["mean_attendance_rate"], 50.0);
    assert_eq!(json["group_comparison"][0]["name"], "Choir");
    assert_eq!(json["event_trend"][0]["rate"], 50.0);
    assert_eq!(json["degraded"], serde_json::json!([]));
}

#[test]
fn group_and_period_filters_apply() {
    let env = CliTestEnv::new();
    env.seed();

    let args = ["--group", "Choir", "--period", "30d", "--export", "json"];
    let output = run_stats(&env, &args);
    assert_success(&args, &output);

    let json = json_stdout(&output);
    assert_eq!(json["totals"]["members"], 1);
    assert_eq!(json["filter"]["period"], "30d");
    assert_eq!(json["rate_distribution"], serde_json::json!([100.0]));
}

#[test]
fn export_to_file() {
    let env = CliTestEnv::new();
    env.seed();
    let target = env.home.join("stats.json");
    let target_arg = target.to_string_lossy().into_owned();

    let args = ["--export", "json", "--output", target_arg.as_str()];
    let output = run_stats(&env, &args);
    assert_success(&args, &output);

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&target).expect("export file")).unwrap();
    assert_eq!(written["totals"]["members"], 2);
}

#[test]
fn explicit_database_path_is_used() {
    let env = CliTestEnv::new();
    env.seed();
    let db_arg = env.db_path().to_string_lossy().into_owned();
    let elsewhere = env.home.join("other.db");
    let elsewhere_arg = elsewhere.to_string_lossy().into_owned();

    let args = ["--database", db_arg.as_str(), "--export", "json"];
    let output = run_stats(&env, &args);
    assert_success(&args, &output);
    assert_eq!(json_stdout(&output)["totals"]["members"], 2);

    let args = ["--database", elsewhere_arg.as_str(), "--export", "json"];
    let output = run_stats(&env, &args);
    assert_success(&args, &output);
    assert_eq!(json_stdout(&output)["totals"]["members"], 0);
}

#[test]
fn unknown_group_fails_with_message() {
    let env = CliTestEnv::new();
    env.seed();

    let output = run_stats(&env, &["--group", "Orchestra"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no group with id or name 'Orchestra'"), "got:\n{stderr}");
}

#[test]
fn invalid_arguments_are_rejected() {
    let env = CliTestEnv::new();

    let output = run_stats(&env, &["--period", "fortnight"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown period"));

    let output = run_stats(&env, &["--export", "csv"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown export format"));
}
