use chrono::{Datelike, Locale, NaiveDate};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use crate::error::PipelineError;

/// A row of the collection table, keyed by the recording identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    pub identifier: i64,
    pub airport_id: i64,
    pub collection_start: NaiveDate,
}

/// The full collection table, loaded once per run.
#[derive(Debug, Default, Clone)]
pub struct RecordSet {
    records: HashMap<i64, RecordMetadata>,
}

impl RecordSet {
    pub fn new(rows: impl IntoIterator<Item = RecordMetadata>) -> Self {
        let mut records = HashMap::new();
        for row in rows {
            // first row wins when the table repeats an identifier
            records.entry(row.identifier).or_insert(row);
        }
        Self { records }
    }

    pub fn get(&self, identifier: i64) -> Option<&RecordMetadata> {
        self.records.get(&identifier)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Resolves an airport id to its ICAO code.
pub trait AirportDirectory {
    async fn icao(&self, airport_id: i64) -> Result<String, PipelineError>;
}

/// `<airport>/<year>/<month-name>` under the destination root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalDir {
    pub airport: String,
    pub year: i32,
    pub month_name: String,
}

impl CanonicalDir {
    pub fn under(&self, root: &Path) -> PathBuf {
        root.join(&self.airport)
            .join(self.year.to_string())
            .join(&self.month_name)
    }
}

pub struct MetadataResolver<'a, A: AirportDirectory> {
    records: &'a RecordSet,
    airports: &'a A,
    locale: Locale,
}

impl<'a, A: AirportDirectory> MetadataResolver<'a, A> {
    pub fn new(records: &'a RecordSet, airports: &'a A, locale: Locale) -> Self {
        Self { records, airports, locale }
    }

    pub fn record(&self, identifier: i64) -> Result<&'a RecordMetadata, PipelineError> {
        self.records.get(identifier).ok_or_else(|| {
            PipelineError::Lookup(format!("identifier {} not in record table", identifier))
        })
    }

    pub async fn resolve(&self, identifier: i64) -> Result<CanonicalDir, PipelineError> {
        let record = self.record(identifier)?;
        let airport = self.airports.icao(record.airport_id).await?;
        let dir = CanonicalDir {
            airport,
            year: record.collection_start.year(),
            month_name: month_name(record.collection_start, self.locale),
        };
        debug!("Resolved {} to {:?}", identifier, dir);
        Ok(dir)
    }
}

/// Full month name in `locale`, first letter upper-cased.
pub fn month_name(date: NaiveDate, locale: Locale) -> String {
    let name = date.format_localized("%B", locale).to_string();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name,
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// In-memory airport table.
    pub struct StaticAirports(pub HashMap<i64, String>);

    impl AirportDirectory for StaticAirports {
        async fn icao(&self, airport_id: i64) -> Result<String, PipelineError> {
            self.0
                .get(&airport_id)
                .cloned()
                .ok_or_else(|| PipelineError::Lookup(format!("airport {} not found", airport_id)))
        }
    }

    pub fn sbsp_fixture() -> (RecordSet, StaticAirports) {
        let records = RecordSet::new([RecordMetadata {
            identifier: 1023,
            airport_id: 7,
            collection_start: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        }]);
        let airports = StaticAirports(HashMap::from([(7, "SBSP".to_string())]));
        (records, airports)
    }

    #[test]
    fn month_names_are_localized_and_capitalized() {
        let march = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(month_name(march, Locale::pt_BR), "Março");
        assert_eq!(month_name(march, Locale::en_US), "March");
        let december = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        assert_eq!(month_name(december, Locale::pt_BR), "Dezembro");
    }

    #[tokio::test]
    async fn resolves_airport_year_and_month() {
        let (records, airports) = sbsp_fixture();
        let resolver = MetadataResolver::new(&records, &airports, Locale::pt_BR);
        let dir = resolver.resolve(1023).await.unwrap();
        assert_eq!(dir.airport, "SBSP");
        assert_eq!(dir.year, 2024);
        assert_eq!(
            dir.under(Path::new("/audio/out")),
            PathBuf::from("/audio/out/SBSP/2024/Março")
        );
    }

    #[tokio::test]
    async fn unknown_identifier_or_airport_is_a_lookup_failure() {
        let (records, airports) = sbsp_fixture();
        let resolver = MetadataResolver::new(&records, &airports, Locale::pt_BR);
        assert!(matches!(resolver.resolve(9999).await, Err(PipelineError::Lookup(_))));

        let orphan = RecordSet::new([RecordMetadata {
            identifier: 5,
            airport_id: 42,
            collection_start: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        }]);
        let resolver = MetadataResolver::new(&orphan, &airports, Locale::pt_BR);
        assert!(matches!(resolver.resolve(5).await, Err(PipelineError::Lookup(_))));
    }
}
