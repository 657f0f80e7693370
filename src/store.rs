use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{ConnectOptions, Pool, Row, Sqlite};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Tables the page reader is allowed to serve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Brc,
    Measurements,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Brc => "brc",
            Table::Measurements => "measurements",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brc" => Ok(Table::Brc),
            "measurements" => Ok(Table::Measurements),
            other => anyhow::bail!("unknown table: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationStats {
    pub station: String,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Measurement {
    pub station: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PageRow {
    Station(StationStats),
    Measurement(Measurement),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub table: Table,
    pub page: u32,
    pub items_per_page: u32,
    pub rows: Vec<PageRow>,
}

/// Reads one page of `table`. Opens its own read-only connection; rows come back
/// in storage order since no ordering is applied.
pub async fn read_page(db_path: &Path, table: Table, page: u32, items_per_page: u32) -> anyhow::Result<Page> {
    if page < 1 {
        anyhow::bail!("page must be >= 1, got {page}");
    }
    if items_per_page < 1 {
        anyhow::bail!("items_per_page must be >= 1, got {items_per_page}");
    }
    let offset = (i64::from(page) - 1) * i64::from(items_per_page);
    let mut conn = SqliteConnectOptions::new().filename(db_path).read_only(true).connect().await?;

    let sql = format!("SELECT * FROM {} LIMIT ?1 OFFSET ?2", table.as_str());
    let rows = sqlx::query(&sql)
        .bind(i64::from(items_per_page))
        .bind(offset)
        .fetch_all(&mut conn)
        .await?;

    let rows = rows
        .into_iter()
        .map(|r| match table {
            Table::Brc => PageRow::Station(StationStats {
                station: r.get("station"),
                min: r.get("min"),
                max: r.get("max"),
                mean: r.get("mean"),
            }),
            Table::Measurements => PageRow::Measurement(Measurement {
                station: r.get("station"),
                temperature: r.get("temperature"),
            }),
        })
        .collect();

    metrics::counter!("turbo4_pages_served_total", "table" => table.as_str()).increment(1);
    Ok(Page { table, page, items_per_page, rows })
}

/// Opens (creating if needed) the store and applies migrations.
pub async fn open(db_path: &Path) -> anyhow::Result<Pool<Sqlite>> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete)
        .synchronous(SqliteSynchronous::Full);
    let pool = Pool::<Sqlite>::connect_with(options).await?;
    sqlx::query("PRAGMA busy_timeout = 5000;").execute(&pool).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub measurements: u64,
    pub stations: u64,
}

/// Replaces both tables with the contents of a `station;temperature` file and
/// recomputes the per-station aggregates.
pub async fn import_measurements(db_path: &Path, source: &Path) -> anyhow::Result<ImportSummary> {
    let pool = open(db_path).await?;
    let file = tokio::fs::File::open(source).await?;
    let mut lines = BufReader::new(file).lines();

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM measurements").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM brc").execute(&mut *tx).await?;

    let mut measurements = 0u64;
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let (station, temp) = line
            .rsplit_once(';')
            .ok_or_else(|| anyhow::anyhow!("line {line_no}: expected station;temperature"))?;
        let temp: f64 = temp
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("line {line_no}: bad temperature {temp:?}: {e}"))?;
        sqlx::query("INSERT INTO measurements (station, temperature) VALUES (?1, ?2)")
            .bind(station)
            .bind(temp)
            .execute(&mut *tx)
            .await?;
        measurements += 1;
    }

    let res = sqlx::query(
        "INSERT INTO brc (station, \"min\", \"max\", mean) \
         SELECT station, MIN(temperature), MAX(temperature), ROUND(AVG(temperature), 1) \
         FROM measurements GROUP BY station ORDER BY station",
    )
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    pool.close().await;

    let summary = ImportSummary { measurements, stations: res.rows_affected() };
    tracing::info!(measurements = summary.measurements, stations = summary.stations, "imported measurements");
    Ok(summary)
}
