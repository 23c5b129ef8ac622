//! # Quran Companion CLI Entry Point
//!
//! Small host around the core library: loads configuration, computes
//! today's prayer times for the configured location, and prints them as a
//! plain table. Useful for development and for cron-style scheduling
//! scripts; the full application embeds the library behind a UI instead.

use anyhow::Context;
use chrono::{Local, NaiveDate};
use quran_companion_lib::config::Config;
use quran_companion_lib::prayer::{compute_prayer_times, GeoTime, PrayerTime};
use std::env;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut config_path = "companion-config.toml".to_string();
    let mut date_override: Option<NaiveDate> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = args.next().context("--config requires a path")?;
            }
            "--date" => {
                let raw = args.next().context("--date requires YYYY-MM-DD")?;
                date_override =
                    Some(NaiveDate::parse_from_str(&raw, "%Y-%m-%d").context("invalid --date")?);
            }
            "--help" | "-h" => {
                println!("usage: quran-companion [--config PATH] [--date YYYY-MM-DD]");
                return Ok(());
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    let config = Config::load_from_path(&config_path);

    let (Some(latitude), Some(longitude)) =
        (config.location.latitude, config.location.longitude)
    else {
        eprintln!("No location configured; prayer times unavailable.");
        eprintln!("Set [location] latitude/longitude/timezone in {config_path}.");
        return Ok(());
    };

    let date = date_override.unwrap_or_else(|| Local::now().date_naive());
    let geo = GeoTime {
        latitude,
        longitude,
        date,
        timezone: config.location.timezone.clone(),
    };

    let result = compute_prayer_times(
        &geo,
        config.prayer.method,
        config.prayer.asr_method,
        config.prayer.high_latitude_rule,
        &config.prayer.adjustments_minutes,
    )?;

    let place = config
        .location
        .city
        .clone()
        .unwrap_or_else(|| format!("{latitude:.2}, {longitude:.2}"));
    println!(
        "Prayer times — {place} — {date} [{}]",
        config.prayer.method.display_name()
    );

    for prayer in PrayerTime::ALL {
        match result.time(prayer) {
            Some(time) => println!(
                "  {:<8} {}  {}",
                prayer.english_name(),
                time.format("%H:%M"),
                prayer.arabic_name()
            ),
            None => println!(
                "  {:<8} --:--  (no solution at this latitude; pick a high-latitude rule)",
                prayer.english_name()
            ),
        }
    }

    if let Some(midnight) = result.midnight() {
        println!("  {:<8} {}", "Midnight", midnight.format("%H:%M"));
    }

    let now = Local::now().with_timezone(
        &result
            .time(PrayerTime::Dhuhr)
            .map(|t| t.timezone())
            .unwrap_or(chrono_tz::UTC),
    );
    if let Some(until) = result.time_until_next_prayer(now) {
        let next = result.next_prayer(now);
        println!(
            "\nNext: {} in {}h {:02}m",
            next.english_name(),
            until.num_hours(),
            until.num_minutes() % 60
        );
    }

    Ok(())
}
