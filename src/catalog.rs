//! Crawl index catalog and balancing.
//!
//! The catalog (`collinfo.json`) lists every crawl index with the start of its
//! crawl period. Indices are grouped by year and ordered by a [`Balance`]
//! policy:
//!
//! | Policy | Order |
//! |--------|-------|
//! | `even` | round-robin across years, newest first: 2024a, 2023a, 2022a, 2024b, 2023b, 2024c |
//! | `ascending` | oldest first |
//! | `descending` | newest first |
//!
//! With `even`, consuming only the first *k* indices samples breadth across
//! years before depth within any one year.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, instrument, warn};

use crate::error::{IngestError, Result};
use crate::http::HttpClient;
use crate::models::CrawlIndex;
use crate::utils::truncate_for_log;

/// Default catalog location.
pub const COLLINFO_URL: &str = "https://index.commoncrawl.org/collinfo.json";

/// How crawl indices are ordered across time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Balance {
    #[default]
    Even,
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

impl FromStr for Balance {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "even" => Ok(Balance::Even),
            "asc" | "ascending" => Ok(Balance::Ascending),
            "desc" | "descending" => Ok(Balance::Descending),
            other => Err(format!(
                "balance must be one of 'even', 'ascending' or 'descending', got {other:?}"
            )),
        }
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Balance::Even => "even",
            Balance::Ascending => "ascending",
            Balance::Descending => "descending",
        })
    }
}

#[derive(Debug, Deserialize)]
struct CollInfo {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "cdx-api")]
    cdx_api: String,
    from: String,
}

/// Loads and orders the crawl indices.
#[derive(Debug, Clone)]
pub struct IndexCatalog {
    http: HttpClient,
    url: String,
    balance: Balance,
}

impl IndexCatalog {
    pub fn new(http: HttpClient, url: impl Into<String>, balance: Balance) -> Self {
        Self {
            http,
            url: url.into(),
            balance,
        }
    }

    /// Fetch the listing and order it by the balancing policy.
    ///
    /// Any failure here is [`IngestError::CatalogUnavailable`]: without
    /// indices there is no work.
    #[instrument(level = "info", skip_all, fields(url = %self.url, balance = %self.balance))]
    pub async fn load(&self) -> Result<Vec<CrawlIndex>> {
        let response = self
            .http
            .get(&self.url, &[])
            .await
            .map_err(|e| IngestError::CatalogUnavailable {
                reason: e.to_string(),
            })?;

        if response.status >= 300 {
            return Err(IngestError::CatalogUnavailable {
                reason: format!("HTTP status {}", response.status),
            });
        }

        let indices = parse_listing(&response.text())?;
        let ordered = order(indices, self.balance);
        info!(
            count = ordered.len(),
            first = ordered.first().map(|i| i.id.as_str()).unwrap_or(""),
            "Loaded crawl index catalog"
        );
        Ok(ordered)
    }
}

/// Parse a `collinfo.json` body. Entries whose `from` is not a date are skipped.
pub fn parse_listing(body: &str) -> Result<Vec<CrawlIndex>> {
    let raw: Vec<CollInfo> =
        serde_json::from_str(body).map_err(|e| IngestError::CatalogUnavailable {
            reason: format!(
                "unparseable listing ({e}): {}",
                truncate_for_log(body.trim(), 120)
            ),
        })?;

    let indices: Vec<CrawlIndex> = raw
        .into_iter()
        .filter_map(|entry| match parse_timestamp(&entry.from) {
            Some(ts) => Some(CrawlIndex {
                name: if entry.name.is_empty() {
                    entry.id.clone()
                } else {
                    entry.name
                },
                id: entry.id,
                cdx_api: entry.cdx_api,
                year: ts.year(),
                from: entry.from,
            }),
            None => {
                warn!(id = %entry.id, from = %entry.from, "Skipping index with unparseable period");
                None
            }
        })
        .collect();

    if indices.is_empty() {
        return Err(IngestError::CatalogUnavailable {
            reason: "listing contains no usable indices".to_string(),
        });
    }
    Ok(indices)
}

/// Order indices by `balance`. Deterministic for a given input set.
pub fn order(mut indices: Vec<CrawlIndex>, balance: Balance) -> Vec<CrawlIndex> {
    // Newest first, ties by id, regardless of listing order.
    indices.sort_by(|a, b| {
        sort_key(b)
            .cmp(&sort_key(a))
            .then_with(|| b.id.cmp(&a.id))
    });

    match balance {
        Balance::Descending => indices,
        Balance::Ascending => {
            indices.reverse();
            indices
        }
        Balance::Even => {
            let total = indices.len();
            let by_year = indices.into_iter().chunk_by(|index| index.year);
            let mut piles: Vec<std::vec::IntoIter<CrawlIndex>> = (&by_year)
                .into_iter()
                .map(|(_, group)| group.collect::<Vec<_>>().into_iter())
                .collect();

            let mut dealt = Vec::with_capacity(total);
            while dealt.len() < total {
                for pile in piles.iter_mut() {
                    if let Some(index) = pile.next() {
                        dealt.push(index);
                    }
                }
            }
            dealt
        }
    }
}

fn sort_key(index: &CrawlIndex) -> NaiveDateTime {
    parse_timestamp(&index.from).unwrap_or(NaiveDateTime::MIN)
}

/// Accepts RFC 3339, naive ISO datetimes and plain ISO dates.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use crate::testing::{ScriptedTransport, fast_policy};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn listing() -> String {
        // Listing order as served: newest first.
        let entries = [
            ("CC-MAIN-2024-33", "2024-08-02T00:00:00"),
            ("CC-MAIN-2024-30", "2024-07-12T00:00:00"),
            ("CC-MAIN-2024-26", "2024-06-12T00:00:00"),
            ("CC-MAIN-2023-50", "2023-11-28T00:00:00"),
            ("CC-MAIN-2023-40", "2023-09-21T00:00:00"),
            ("CC-MAIN-2022-49", "2022-11-26T00:00:00"),
        ];
        let json: Vec<_> = entries
            .iter()
            .map(|(id, from)| {
                serde_json::json!({
                    "id": id,
                    "name": format!("{id} Index"),
                    "timegate": format!("https://index.commoncrawl.org/{id}/"),
                    "cdx-api": format!("https://index.commoncrawl.org/{id}-index"),
                    "from": from,
                    "to": from,
                })
            })
            .collect();
        serde_json::to_string(&json).unwrap()
    }

    fn ids(indices: &[CrawlIndex]) -> Vec<&str> {
        indices.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_parse_listing() {
        let indices = parse_listing(&listing()).unwrap();
        assert_eq!(indices.len(), 6);
        assert_eq!(indices[0].year, 2024);
        assert_eq!(indices[0].cdx_api, "https://index.commoncrawl.org/CC-MAIN-2024-33-index");
        assert_eq!(indices[5].year, 2022);
    }

    #[test]
    fn test_even_deals_across_years() {
        let ordered = order(parse_listing(&listing()).unwrap(), Balance::Even);
        assert_eq!(
            ids(&ordered),
            vec![
                "CC-MAIN-2024-33",
                "CC-MAIN-2023-50",
                "CC-MAIN-2022-49",
                "CC-MAIN-2024-30",
                "CC-MAIN-2023-40",
                "CC-MAIN-2024-26",
            ]
        );
    }

    #[test]
    fn test_even_first_y_cover_every_year() {
        let ordered = order(parse_listing(&listing()).unwrap(), Balance::Even);
        let years: HashSet<i32> = ordered.iter().map(|i| i.year).collect();
        let first: Vec<i32> = ordered.iter().take(years.len()).map(|i| i.year).collect();
        let distinct: HashSet<i32> = first.iter().copied().collect();
        assert_eq!(distinct, years);
    }

    #[test]
    fn test_ascending_and_descending() {
        let indices = parse_listing(&listing()).unwrap();
        let asc = order(indices.clone(), Balance::Ascending);
        let desc = order(indices, Balance::Descending);
        assert_eq!(asc.first().unwrap().id, "CC-MAIN-2022-49");
        assert_eq!(desc.first().unwrap().id, "CC-MAIN-2024-33");
        let mut reversed = asc.clone();
        reversed.reverse();
        assert_eq!(reversed, desc);
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let indices = parse_listing(&listing()).unwrap();
        let mut shuffled = indices.clone();
        shuffled.reverse();
        shuffled.swap(1, 3);
        for balance in [Balance::Even, Balance::Ascending, Balance::Descending] {
            assert_eq!(order(indices.clone(), balance), order(shuffled.clone(), balance));
        }
    }

    #[test]
    fn test_unparseable_period_is_skipped() {
        let body = r#"[
            {"id": "A", "name": "A", "cdx-api": "https://x/A-index", "from": "not a date"},
            {"id": "B", "name": "B", "cdx-api": "https://x/B-index", "from": "2021-01-05"}
        ]"#;
        let indices = parse_listing(body).unwrap();
        assert_eq!(ids(&indices), vec!["B"]);
    }

    #[test]
    fn test_empty_or_garbage_listing_is_unavailable() {
        assert!(matches!(
            parse_listing("[]"),
            Err(IngestError::CatalogUnavailable { .. })
        ));
        assert!(matches!(
            parse_listing("<html>maintenance</html>"),
            Err(IngestError::CatalogUnavailable { .. })
        ));
    }

    #[test]
    fn test_balance_from_str() {
        assert_eq!("asc".parse::<Balance>().unwrap(), Balance::Ascending);
        assert_eq!("DESC".parse::<Balance>().unwrap(), Balance::Descending);
        assert_eq!("even".parse::<Balance>().unwrap(), Balance::Even);
        assert!("random".parse::<Balance>().is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-08-02T21:14:13").is_some());
        assert!(parse_timestamp("2024-08-02T21:14:13Z").is_some());
        assert!(parse_timestamp("2024-08-02").is_some());
        assert!(parse_timestamp("August").is_none());
    }

    #[tokio::test]
    async fn test_load_orders_listing() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set(COLLINFO_URL, HttpResponse::new(200, listing()));
        let http = HttpClient::new(transport, fast_policy(0));

        let catalog = IndexCatalog::new(http, COLLINFO_URL, Balance::Even);
        let first = catalog.load().await.unwrap();
        let second = catalog.load().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[1].id, "CC-MAIN-2023-50");
    }

    #[tokio::test]
    async fn test_load_fails_on_server_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set(COLLINFO_URL, HttpResponse::new(503, ""));
        let http = HttpClient::new(transport, fast_policy(1));

        let err = IndexCatalog::new(http, COLLINFO_URL, Balance::Even)
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::CatalogUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_load_fails_on_not_found() {
        let transport = Arc::new(ScriptedTransport::new());
        let http = HttpClient::new(transport, fast_policy(0));

        let err = IndexCatalog::new(http, COLLINFO_URL, Balance::Even)
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::CatalogUnavailable { .. }));
    }
}
