use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use tracing::{info, debug, warn};
use crate::cfg::DatabaseConfig;
use crate::error::PipelineError;
use crate::metadata::{AirportDirectory, RecordMetadata, RecordSet};

const COL_IDENTIFIER: &str = "Nro. Identificação";
const COL_AIRPORT_ID: &str = "id_aeroportos";
const COL_START_DATE: &str = "Data_Inicio";
const COL_ICAO: &str = "ICAO";

/// The collection database. One connection for the whole run.
pub struct Database {
    pool: MySqlPool,
    airport_query: String,
}

impl Database {
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self, PipelineError> {
        info!("Connecting to database {} on {}:{}", cfg.name, cfg.host, cfg.port);

        let options = MySqlConnectOptions::new()
            .host(&cfg.host)
            .port(cfg.port)
            .username(&cfg.user)
            .password(&cfg.password)
            .database(&cfg.name);

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            airport_query: cfg.airport_query.clone(),
        })
    }

    pub async fn load_records(&self, records_query: &str) -> Result<RecordSet, PipelineError> {
        debug!("Loading record table");
        let rows = sqlx::query(records_query).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match record_from_row(row) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable record row: {}", e),
            }
        }

        let set = RecordSet::new(records);
        info!("Loaded {} records ({} rows)", set.len(), rows.len());
        Ok(set)
    }

    pub async fn close(self) {
        self.pool.close().await;
        debug!("Database connection closed");
    }
}

impl AirportDirectory for Database {
    async fn icao(&self, airport_id: i64) -> Result<String, PipelineError> {
        let row = if self.airport_query.contains('?') {
            sqlx::query(&self.airport_query)
                .bind(airport_id)
                .fetch_optional(&self.pool)
                .await?
        } else {
            let sql = format!("{}{};", self.airport_query, airport_id);
            sqlx::query(&sql).fetch_optional(&self.pool).await?
        };

        let row = row.ok_or_else(|| {
            PipelineError::Lookup(format!("airport {} not found", airport_id))
        })?;
        Ok(row.try_get::<String, _>(COL_ICAO)?)
    }
}

fn record_from_row(row: &MySqlRow) -> Result<RecordMetadata, PipelineError> {
    Ok(RecordMetadata {
        identifier: integer_column(row, COL_IDENTIFIER)?,
        airport_id: integer_column(row, COL_AIRPORT_ID)?,
        collection_start: date_column(row, COL_START_DATE)?,
    })
}

fn integer_column(row: &MySqlRow, column: &str) -> Result<i64, PipelineError> {
    if let Ok(value) = row.try_get::<i64, _>(column) {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<u64, _>(column) {
        return i64::try_from(value)
            .map_err(|_| PipelineError::Lookup(format!("{} out of range: {}", column, value)));
    }
    let text = row.try_get::<String, _>(column)?;
    text.trim()
        .parse::<i64>()
        .map_err(|_| PipelineError::Lookup(format!("{} is not an integer: {}", column, text)))
}

fn date_column(row: &MySqlRow, column: &str) -> Result<NaiveDate, PipelineError> {
    if let Ok(date) = row.try_get::<NaiveDate, _>(column) {
        return Ok(date);
    }
    if let Ok(datetime) = row.try_get::<NaiveDateTime, _>(column) {
        return Ok(datetime.date());
    }
    let text = row.try_get::<String, _>(column)?;
    parse_date_text(&text)
        .ok_or_else(|| PipelineError::Lookup(format!("{} is not a date: {}", column, text)))
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").ok().map(|dt| dt.date()))
        .or_else(|| NaiveDate::parse_from_str(text, "%d/%m/%Y").ok())
}
