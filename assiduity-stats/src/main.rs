//! assiduity-stats - attendance statistics for the terminal
//!
//! Computes the statistics dashboard for the whole organization, one group,
//! or recently registered members, and prints it or exports it as JSON.

use anyhow::{anyhow, Context, Result};
use assiduity_core::analytics::{Period, RankedMember, StatsFilter, StatsHost, StatsSnapshot};
use assiduity_core::{Config, Database, Group, Registry};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "assiduity-stats")]
#[command(about = "Attendance statistics for your organization")]
#[command(version)]
struct Args {
    /// Restrict to one group (id or exact name)
    #[arg(long)]
    group: Option<String>,

    /// Restrict to members registered recently (all, 30d, 90d, 365d)
    #[arg(long, default_value = "all")]
    period: Period,

    /// Export format (json)
    #[arg(long)]
    export: Option<String>,

    /// Write the export to this file instead of stdout
    #[arg(long, requires = "export")]
    output: Option<PathBuf>,

    /// Database file (default: from config, then XDG data dir)
    #[arg(long)]
    database: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = assiduity_core::logging::init(&config.logging).ok();

    if let Some(other) = args.export.as_deref().filter(|f| *f != "json") {
        anyhow::bail!("Unknown export format: {}. Use 'json'", other);
    }

    let db_path = args
        .database
        .clone()
        .unwrap_or_else(|| config.resolved_database_path());
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    db.migrate().context("failed to run database migrations")?;
    let registry = Registry::new(Arc::new(db));

    let group = args
        .group
        .as_deref()
        .map(|g| resolve_group(registry.database(), g))
        .transpose()?;
    let filter = StatsFilter::new(group.as_ref().map(|g| g.id), args.period);

    let host = StatsHost::for_registry(&registry, config.stats.clone());
    let snapshot = run_with_spinner(&host, filter)?;

    tracing::info!(
        members = snapshot.totals.as_ref().map_or(0, |t| t.members),
        degraded = snapshot.degraded.len(),
        "assiduity-stats complete"
    );

    match args.export.as_deref() {
        Some(_) => print_json(&snapshot, args.output.as_deref())?,
        None => print_terminal(&snapshot, group.as_ref()),
    }

    Ok(())
}

/// Look a group up by id first, then by name.
fn resolve_group(db: &Database, value: &str) -> Result<Group> {
    if let Ok(id) = value.trim().parse::<i64>() {
        if let Some(group) = db.get_group(id)? {
            return Ok(group);
        }
    }
    db.get_group_by_name(value.trim())?
        .ok_or_else(|| anyhow!("no group with id or name '{}'", value))
}

/// Submit one run and wait for it, showing each stage on a spinner.
fn run_with_spinner(host: &StatsHost, filter: StatsFilter) -> Result<Arc<StatsSnapshot>> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("invalid progress template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = host
        .submit(filter)
        .context("failed to start statistics run")?
        .wait_with_progress(|stage| pb.set_message(stage.label()));

    pb.finish_and_clear();
    result.context("statistics run failed")
}

fn print_json(snapshot: &StatsSnapshot, output: Option<&Path>) -> Result<()> {
    let json = snapshot.to_json_pretty()?;
    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Statistics written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

const UNAVAILABLE: &str = "unavailable";

fn rate_display(rate: f64) -> String {
    format!("{:.1}%", rate)
}

fn count_display(count: Option<usize>) -> String {
    count.map_or_else(|| UNAVAILABLE.to_string(), |c| c.to_string())
}

fn print_terminal(snapshot: &StatsSnapshot, group: Option<&Group>) {
    let scope = match group {
        Some(g) => format!("{} · {}", g.name, snapshot.filter.period.display_name()),
        None => format!("All members · {}", snapshot.filter.period.display_name()),
    };

    // Header
    println!();
    println!("╭{}╮", "─".repeat(60));
    println!("│{:^60}│", "ATTENDANCE STATISTICS");
    println!("│{:^60}│", scope);
    println!("╰{}╯", "─".repeat(60));
    println!();

    // Cards
    println!("SUMMARY");
    match &snapshot.totals {
        Some(t) => {
            println!(
                "   Members:  {:<12} Groups:   {}",
                t.members,
                count_display(t.groups)
            );
            println!(
                "   Events:   {:<12} Upcoming: {}",
                count_display(t.events),
                count_display(t.upcoming_events)
            );
        }
        None => println!("   Totals {}", UNAVAILABLE),
    }
    println!(
        "   Mean attendance: {}",
        snapshot
            .mean_attendance_rate
            .map_or_else(|| UNAVAILABLE.to_string(), rate_display)
    );
    println!();

    if snapshot.totals.as_ref().is_some_and(|t| t.members == 0) {
        println!("  No members match this filter.");
        println!();
    }

    print_ranked("TOP PERFORMERS", snapshot.top_performers.as_deref());
    print_ranked("AT RISK", snapshot.at_risk.as_deref());

    if let Some(ranking) = &snapshot.school_ranking {
        if !ranking.is_empty() {
            println!("SCHOOLS");
            for (i, school) in ranking.iter().enumerate() {
                println!(
                    "   {:>2}. {:<30} {:>7}  ({} member{})",
                    i + 1,
                    school.school,
                    rate_display(school.mean_rate),
                    school.members,
                    if school.members == 1 { "" } else { "s" }
                );
            }
            println!();
        }
    }

    if let Some(groups) = &snapshot.group_comparison {
        if !groups.is_empty() {
            println!("GROUPS");
            for g in groups {
                println!(
                    "   {:<20} {:>7}  {} member{}",
                    g.name,
                    rate_display(g.mean_rate),
                    g.size,
                    if g.size == 1 { "" } else { "s" }
                );
            }
            println!();
        }
    }

    if let Some(trend) = &snapshot.event_trend {
        if !trend.is_empty() {
            println!("RECENT EVENTS");
            for e in trend {
                println!(
                    "   {}  {:<15} {:>7}  {}/{}",
                    e.date.format("%Y-%m-%d"),
                    e.label,
                    rate_display(e.rate),
                    e.present,
                    e.total
                );
            }
            println!();
        }
    }

    if let Some(series) = &snapshot.registration_evolution {
        if !series.is_empty() {
            println!("REGISTRATIONS");
            for point in series.iter().rev().take(6).rev() {
                println!("   {:<8} {:>5}", point.label, point.cumulative);
            }
            if series.len() > 6 {
                println!("   (since {})", series[0].label);
            }
            println!();
        }
    }

    print_distribution(snapshot.rate_distribution.as_deref());

    if snapshot.is_degraded() {
        let names: Vec<&str> = snapshot.degraded.iter().map(|v| v.as_str()).collect();
        println!("Some statistics are unavailable: {}", names.join(", "));
        println!();
    }

    println!(
        "Generated {}",
        snapshot.generated_at.format("%Y-%m-%d %H:%M")
    );
    println!();
}

fn print_ranked(title: &str, list: Option<&[RankedMember]>) {
    match list {
        Some(list) if !list.is_empty() => {
            println!("{}", title);
            for (i, member) in list.iter().enumerate() {
                println!(
                    "   {:>2}. {:<25} {:>7}",
                    i + 1,
                    member.name,
                    rate_display(member.rate)
                );
            }
            println!();
        }
        Some(_) => {}
        None => {
            println!("{}", title);
            println!("   {}", UNAVAILABLE);
            println!();
        }
    }
}

/// Members per 20-point rate band.
fn print_distribution(rates: Option<&[f64]>) {
    let Some(rates) = rates.filter(|r| !r.is_empty()) else {
        return;
    };

    let mut bands = [0usize; 5];
    for &rate in rates {
        let band = ((rate / 20.0) as usize).min(4);
        bands[band] += 1;
    }
    let max = bands.iter().copied().max().unwrap_or(0).max(1);

    println!("DISTRIBUTION");
    for (i, count) in bands.iter().enumerate() {
        let lower = i * 20;
        let upper = if i == 4 { 100 } else { lower + 19 };
        let bar = "█".repeat(count * 30 / max);
        println!("   {:>3}-{:<3}% {:<30} {}", lower, upper, bar, count);
    }
    println!();
}
