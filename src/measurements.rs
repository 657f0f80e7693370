//! Synthetic `station;temperature` data for the aggregation challenge.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use rand::Rng;

pub const MAX_NAME_LEN: usize = 100;
pub const GAUSSIAN_SAMPLES: usize = 10_000;
pub const GAUSSIAN_STD: f64 = 7.0;
/// The output file is flushed and reopened after this many records.
pub const ROTATE_EVERY: u64 = 10_000_000;

pub const USAGE: &str = "Usage: turbo4 measurements <number of records to create>";

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherStation {
    pub name: String,
    pub mean_temp: f64,
}

/// Record count from the raw positional argument.
pub fn parse_count(arg: Option<&str>) -> Result<u64, String> {
    let raw = arg.ok_or_else(|| USAGE.to_string())?;
    raw.trim()
        .parse::<u64>()
        .map_err(|_| format!("Invalid value for <number of records to create>\n{USAGE}"))
}

/// `(name, latitude)` pairs from a `;`-separated station list. Lines starting
/// with `#` are comments.
pub fn parse_station_rows(csv: &str) -> anyhow::Result<Vec<(String, f64)>> {
    csv.lines()
        .enumerate()
        .filter(|(_, l)| !l.starts_with('#') && !l.trim().is_empty())
        .map(|(i, line)| {
            let mut cols = line.split(';');
            let name = cols.next().unwrap_or_default().to_string();
            let lat = cols
                .next()
                .ok_or_else(|| anyhow::anyhow!("line {}: missing latitude", i + 1))?
                .trim()
                .parse::<f64>()
                .map_err(|e| anyhow::anyhow!("line {}: bad latitude: {e}", i + 1))?;
            Ok((name, lat))
        })
        .collect()
}

/// Mean temperature for a latitude in degrees.
pub fn mean_temperature(lat: f64) -> f64 {
    30.0 * lat.to_radians().cos() - 10.0
}

fn ensure_non_space(name: &str) -> String {
    let mut name = name.to_string();
    if let Some(rest) = name.strip_prefix(' ') {
        name = format!("{rest}A");
    }
    if let Some(rest) = name.strip_suffix(' ') {
        name = format!("A{rest}");
    }
    name
}

/// Replaces the tail of `name` with a random-length prefix of another name.
fn modify_name<R: Rng>(name: &str, names: &[String], rng: &mut R) -> String {
    let donor: Vec<char> = names[rng.gen_range(0..names.len())].chars().collect();
    let part_len = if donor.is_empty() { 0 } else { rng.gen_range(0..donor.len()) };
    let chars: Vec<char> = name.chars().collect();
    let keep = chars.len().saturating_sub(part_len);
    chars[..keep].iter().chain(donor[..part_len].iter()).collect()
}

/// One station per row: a randomly drawn, de-duplicated name paired with the
/// row's latitude-derived mean temperature.
pub fn generate_stations<R: Rng>(rows: &[(String, f64)], rng: &mut R) -> anyhow::Result<Vec<WeatherStation>> {
    if rows.is_empty() {
        anyhow::bail!("no weather stations to draw names from");
    }
    let names: Vec<String> = rows.iter().map(|(n, _)| n.clone()).collect();
    let mut seen = HashSet::new();
    let mut stations = Vec::with_capacity(rows.len());
    let (mut min_len, mut max_len) = (usize::MAX, 0usize);

    for (_, lat) in rows {
        let mut name = ensure_non_space(&names[rng.gen_range(0..names.len())]);
        while seen.contains(&name) {
            name = modify_name(&name, &names, rng);
        }
        while name.len() > MAX_NAME_LEN {
            name = modify_name(&name, &names, rng);
        }
        if name.contains(';') {
            anyhow::bail!("station name contains a semicolon: {name}");
        }
        min_len = min_len.min(name.len());
        max_len = max_len.max(name.len());
        seen.insert(name.clone());
        stations.push(WeatherStation { name, mean_temp: mean_temperature(*lat) });
    }

    tracing::info!(stations = stations.len(), min_len, max_len, "generated station names");
    Ok(stations)
}

/// Box-Muller draw.
fn random_gaussian<R: Rng>(mean: f64, std: f64, rng: &mut R) -> f64 {
    let u: f64 = 1.0 - rng.r#gen::<f64>();
    let v: f64 = 1.0 - rng.r#gen::<f64>();
    mean + (-2.0 * u.ln()).sqrt() * (2.0 * std::f64::consts::PI * v).cos() * std
}

/// Zero-mean samples drawn once and shifted per station.
pub struct GaussianTable {
    samples: Vec<f64>,
}

impl GaussianTable {
    pub fn new<R: Rng>(std: f64, len: usize, rng: &mut R) -> Self {
        Self { samples: (0..len).map(|_| random_gaussian(0.0, std, rng)).collect() }
    }

    pub fn sample<R: Rng>(&self, mean: f64, rng: &mut R) -> f64 {
        self.samples[rng.gen_range(0..self.samples.len())] + mean
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

fn round_tenth(t: f64) -> f64 {
    let r = (t * 10.0).round() / 10.0;
    if r == 0.0 { 0.0 } else { r }
}

/// Writes `count` lines to `out`, truncating it first.
pub fn write_measurements<R: Rng>(
    out: &Path,
    stations: &[WeatherStation],
    count: u64,
    rng: &mut R,
) -> anyhow::Result<u64> {
    if stations.is_empty() {
        anyhow::bail!("no weather stations");
    }
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let start = Instant::now();
    let table = GaussianTable::new(GAUSSIAN_STD, GAUSSIAN_SAMPLES, rng);
    let mut writer = BufWriter::new(File::create(out)?);

    for i in 1..=count {
        let station = &stations[rng.gen_range(0..stations.len())];
        let temp = round_tenth(table.sample(station.mean_temp, rng));
        writeln!(writer, "{};{}", station.name, temp)?;

        if i % ROTATE_EVERY == 0 {
            tracing::info!(written = i, elapsed_ms = start.elapsed().as_millis() as u64, "wrote measurements");
            writer.flush()?;
            writer = BufWriter::new(OpenOptions::new().append(true).open(out)?);
        }
    }
    writer.flush()?;
    Ok(count)
}
