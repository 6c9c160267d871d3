use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Months, NaiveTime, TimeZone, Utc};
use log::trace;
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::*;

/// Anything that can answer a [`PredictionQuery`]: the SQLite table on the
/// server, the HTTP client on the other end.
#[async_trait]
pub trait PredictionSource {
    async fn query_predictions(&self, query: &PredictionQuery) -> Result<Vec<Prediction>>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DateBucket {
    Today,
    Tomorrow,
    Week,
    Month,
}
impl DateBucket {
    /// Unknown names impose no date constraint, so they parse to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "today" => Some(Self::Today),
            "tomorrow" => Some(Self::Tomorrow),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }
    /// Inclusive `[now, end]` window for the bucket.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = match self {
            Self::Today => end_of_day(now),
            Self::Tomorrow => end_of_day(now + ChronoDuration::days(1)),
            Self::Week => now + ChronoDuration::days(7),
            Self::Month => now
                .checked_add_months(Months::new(1))
                .unwrap_or(now + ChronoDuration::days(30)),
        };
        // now may already be the last millisecond of the day
        if end <= now {
            return (now, now + ChronoDuration::milliseconds(1));
        }
        (now, end)
    }
}
/// Accepts any casing and turns names it does not know into no bucket.
fn lenient_bucket<'de, D>(deserializer: D) -> std::result::Result<Option<DateBucket>, D::Error>
where
    D: Deserializer<'de>,
{
    let name = Option::<String>::deserialize(deserializer)?;
    Ok(name.as_deref().and_then(DateBucket::parse))
}

fn end_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = Utc.from_utc_datetime(&t.date_naive().and_time(NaiveTime::MIN));
    midnight + ChronoDuration::days(1) - ChronoDuration::milliseconds(1)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PredictionFilters {
    pub sport: Option<String>,
    pub league: Option<String>,
    #[serde(default, deserialize_with = "lenient_bucket")]
    pub date_bucket: Option<DateBucket>,
    pub min_confidence: Option<u8>,
    pub search: Option<String>,
}
impl PredictionFilters {
    pub fn effective_min_confidence(&self) -> u8 {
        effective_min_confidence(self.min_confidence)
    }
    /// The part of the filters the prediction table evaluates itself.
    pub fn to_query(&self, now: DateTime<Utc>) -> PredictionQuery {
        let (from, to) = match self.date_bucket.map(|bucket| bucket.window(now)) {
            Some((from, to)) => (Some(from), Some(to)),
            None => (None, None),
        };
        PredictionQuery {
            sport: self.sport.clone(),
            league: self.league.clone(),
            min_confidence: self.effective_min_confidence(),
            from,
            to,
        }
    }
    fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }
}

/// Callers can raise the confidence floor but never lower it.
pub fn effective_min_confidence(requested: Option<u8>) -> u8 {
    MIN_CONFIDENCE.max(requested.unwrap_or(0))
}

pub fn matches_search(prediction: &Prediction, term: &str) -> bool {
    let term = term.to_lowercase();
    [
        &prediction.team_a,
        &prediction.team_b,
        &prediction.competition,
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&term))
}

/// In-memory passes over rows returned by the table: the confidence floor
/// again, then the free-text search.
pub fn apply_client_filters(
    predictions: Vec<Prediction>,
    filters: &PredictionFilters,
) -> Vec<Prediction> {
    let floor = filters.effective_min_confidence();
    let term = filters.search_term();
    predictions
        .into_iter()
        .filter(|prediction| prediction.confidence >= floor)
        .filter(|prediction| term.map_or(true, |term| matches_search(prediction, term)))
        .collect()
}

pub async fn fetch_predictions<S>(
    source: &S,
    filters: &PredictionFilters,
    now: DateTime<Utc>,
) -> Result<Vec<Prediction>>
where
    S: PredictionSource + ?Sized + Sync,
{
    let query = filters.to_query(now);
    trace!("Querying predictions with {:?}", query);
    let rows = source.query_predictions(&query).await?;
    Ok(apply_client_filters(rows, filters))
}

pub fn total_pages(count: usize) -> usize {
    (count + PAGE_SIZE - 1) / PAGE_SIZE
}

/// Pages start at 1. Anything out of range is an empty page.
pub fn paginate<T: Clone>(items: &[T], page: usize) -> Vec<T> {
    if page == 0 {
        return vec![];
    }
    items
        .iter()
        .skip((page - 1).saturating_mul(PAGE_SIZE))
        .take(PAGE_SIZE)
        .cloned()
        .collect()
}

/// Client-side view over a [`PredictionSource`]: current filters, current
/// page and a short-lived cache of result sets per filter set.
pub struct PredictionFeed<S> {
    source: S,
    filters: PredictionFilters,
    page: usize,
    ttl: Duration,
    cache: HashMap<PredictionFilters, (Instant, Vec<Prediction>)>,
}
impl<S> PredictionFeed<S>
where
    S: PredictionSource + Send + Sync,
{
    pub fn new(source: S, ttl: Duration) -> Self {
        Self {
            source,
            filters: PredictionFilters::default(),
            page: 1,
            ttl,
            cache: HashMap::new(),
        }
    }
    pub fn filters(&self) -> &PredictionFilters {
        &self.filters
    }
    pub fn current_page(&self) -> usize {
        self.page
    }
    pub fn set_filters(&mut self, filters: PredictionFilters) {
        self.filters = filters;
        self.page = 1;
    }
    pub fn set_page(&mut self, page: usize) {
        self.page = page;
    }
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }
    pub async fn predictions(&mut self) -> Result<Vec<Prediction>> {
        if let Some((fetched, predictions)) = self.cache.get(&self.filters) {
            if fetched.elapsed() < self.ttl {
                trace!("Serving {} cached predictions", predictions.len());
                return Ok(predictions.clone());
            }
        }
        let predictions = fetch_predictions(&self.source, &self.filters, Utc::now()).await?;
        self.cache
            .insert(self.filters.clone(), (Instant::now(), predictions.clone()));
        Ok(predictions)
    }
    pub async fn page(&mut self) -> Result<PredictionPage> {
        let predictions = self.predictions().await?;
        Ok(PredictionPage {
            predictions: paginate(&predictions, self.page),
            page: self.page,
            total_pages: total_pages(predictions.len()),
            total: predictions.len(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixtureSource {
        rows: Vec<Prediction>,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }
    #[async_trait]
    impl PredictionSource for FixtureSource {
        async fn query_predictions(&self, query: &PredictionQuery) -> Result<Vec<Prediction>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("backend unavailable");
            }
            Ok(self
                .rows
                .iter()
                .filter(|p| query.sport.as_ref().map_or(true, |s| &p.sport == s))
                .filter(|p| query.league.as_ref().map_or(true, |l| &p.competition == l))
                .filter(|p| p.confidence >= query.min_confidence)
                .filter(|p| query.from.map_or(true, |from| p.match_date >= from))
                .filter(|p| query.to.map_or(true, |to| p.match_date <= to))
                .cloned()
                .collect())
        }
    }
    fn prediction(id: RowId, sport: &str, confidence: u8) -> Prediction {
        Prediction {
            id,
            sport: sport.into(),
            competition: "Premier League".into(),
            match_date: Utc::now() + ChronoDuration::hours(id),
            team_a: format!("Home {}", id),
            team_b: format!("Away {}", id),
            predicted_outcome: "Home win".into(),
            confidence,
            explanation: String::new(),
            price: dec!(1.5),
            is_free: false,
            match_id: None,
            league_id: None,
            created_at: Utc::now(),
        }
    }
    fn source(rows: Vec<Prediction>) -> (FixtureSource, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            FixtureSource {
                rows,
                calls: calls.clone(),
                fail: false,
            },
            calls,
        )
    }

    #[test]
    fn confidence_floor_is_never_lowered() {
        assert_eq!(effective_min_confidence(None), 85);
        assert_eq!(effective_min_confidence(Some(0)), 85);
        assert_eq!(effective_min_confidence(Some(50)), 85);
        assert_eq!(effective_min_confidence(Some(85)), 85);
        assert_eq!(effective_min_confidence(Some(90)), 90);
        assert_eq!(effective_min_confidence(Some(100)), 100);
    }

    #[test]
    fn bucket_windows_start_now_and_end_later() {
        let instants = [
            Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap()
                + ChronoDuration::microseconds(999_500),
        ];
        for now in instants {
            for bucket in [
                DateBucket::Today,
                DateBucket::Tomorrow,
                DateBucket::Week,
                DateBucket::Month,
            ] {
                let (start, end) = bucket.window(now);
                assert_eq!(start, now);
                assert!(end > start, "{:?} at {}", bucket, now);
            }
        }
    }

    #[test]
    fn today_ends_with_the_day() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 18, 0, 0).unwrap();
        let (_, end) = DateBucket::Today.window(now);
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2024, 5, 10, 23, 59, 59).unwrap()
                + ChronoDuration::milliseconds(999)
        );
        let (_, end) = DateBucket::Tomorrow.window(now);
        assert_eq!(end.date_naive(), now.date_naive().succ_opt().unwrap());
        let (_, end) = DateBucket::Month.window(
            Utc.with_ymd_and_hms(2024, 1, 31, 10, 0, 0).unwrap(),
        );
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 2, 29, 10, 0, 0).unwrap());
    }

    #[test]
    fn unknown_bucket_means_no_window() {
        assert_eq!(DateBucket::parse("Week"), Some(DateBucket::Week));
        assert_eq!(DateBucket::parse("fortnight"), None);
        let filters = PredictionFilters {
            date_bucket: DateBucket::parse("someday"),
            ..Default::default()
        };
        let query = filters.to_query(Utc::now());
        assert_eq!(query.from, None);
        assert_eq!(query.to, None);
    }

    #[test]
    fn filters_accept_any_bucket_name() {
        let filters: PredictionFilters =
            serde_json::from_str(r#"{"date_bucket":"Week"}"#).unwrap();
        assert_eq!(filters.date_bucket, Some(DateBucket::Week));
        let filters: PredictionFilters =
            serde_json::from_str(r#"{"date_bucket":"fortnight","sport":"tennis"}"#).unwrap();
        assert_eq!(filters.date_bucket, None);
        assert_eq!(filters.sport.as_deref(), Some("tennis"));
        let filters: PredictionFilters = serde_json::from_str("{}").unwrap();
        assert_eq!(filters, PredictionFilters::default());
        let round = serde_json::to_string(&PredictionFilters {
            date_bucket: Some(DateBucket::Tomorrow),
            ..Default::default()
        })
        .unwrap();
        let back: PredictionFilters = serde_json::from_str(&round).unwrap();
        assert_eq!(back.date_bucket, Some(DateBucket::Tomorrow));
    }

    #[tokio::test]
    async fn today_skips_past_matches() {
        let mut past = prediction(1, "football", 90);
        past.match_date = Utc::now() - ChronoDuration::minutes(5);
        let mut later = prediction(2, "football", 90);
        later.match_date = Utc::now() + ChronoDuration::seconds(1);
        let (source, _) = source(vec![past, later]);
        let filters = PredictionFilters {
            date_bucket: Some(DateBucket::Today),
            ..Default::default()
        };
        let found = fetch_predictions(&source, &filters, Utc::now()).await.unwrap();
        assert!(found.iter().all(|p| p.id != 1));
    }

    #[tokio::test]
    async fn sport_and_confidence_filter() {
        let (source, _) = source(vec![
            prediction(1, "football", 80),
            prediction(2, "football", 88),
            prediction(3, "football", 92),
            prediction(4, "football", 95),
            prediction(5, "tennis", 97),
        ]);
        let filters = PredictionFilters {
            sport: Some("football".into()),
            min_confidence: Some(90),
            ..Default::default()
        };
        let found = fetch_predictions(&source, &filters, Utc::now()).await.unwrap();
        let confidences: Vec<u8> = found.iter().map(|p| p.confidence).collect();
        assert_eq!(confidences, vec![92, 95]);
    }

    #[tokio::test]
    async fn confidence_floor_applies_even_if_source_ignores_it() {
        // hands back everything
        struct Leaky(Vec<Prediction>);
        #[async_trait]
        impl PredictionSource for Leaky {
            async fn query_predictions(&self, _: &PredictionQuery) -> Result<Vec<Prediction>> {
                Ok(self.0.clone())
            }
        }
        let leaky = Leaky(vec![
            prediction(1, "football", 40),
            prediction(2, "football", 86),
        ]);
        let found = fetch_predictions(&leaky, &PredictionFilters::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let mut p = prediction(1, "football", 90);
        p.team_a = "Manchester United".into();
        p.team_b = "Arsenal".into();
        p.competition = "FA Cup".into();
        assert!(matches_search(&p, "chester"));
        assert!(matches_search(&p, "ARSEN"));
        assert!(matches_search(&p, "fa c"));
        assert!(!matches_search(&p, "chelsea"));
    }

    #[tokio::test]
    async fn blank_search_matches_everything() {
        let (source, _) = source(vec![prediction(1, "football", 90)]);
        let filters = PredictionFilters {
            search: Some("   ".into()),
            ..Default::default()
        };
        let found = fetch_predictions(&source, &filters, Utc::now()).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn pagination() {
        assert_eq!(total_pages(0), 0);
        assert_eq!(total_pages(1), 1);
        assert_eq!(total_pages(6), 1);
        assert_eq!(total_pages(7), 2);
        assert_eq!(total_pages(13), 3);

        let items: Vec<u32> = (1..=13).collect();
        assert_eq!(paginate(&items, 1), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(paginate(&items, 3), vec![13]);
        assert!(paginate(&items, 4).is_empty());
        assert!(paginate(&items, 0).is_empty());
        assert!(paginate(&items, usize::MAX).is_empty());
        assert!(paginate::<u32>(&[], 1).is_empty());
    }

    #[tokio::test]
    async fn feed_pages_and_caches() {
        let rows = (1..=8).map(|id| prediction(id, "football", 90)).collect();
        let (source, calls) = source(rows);
        let mut feed = PredictionFeed::new(source, Duration::from_secs(60));

        let page = feed.page().await.unwrap();
        assert_eq!(page.total, 8);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.predictions.len(), 6);

        feed.set_page(2);
        let page = feed.page().await.unwrap();
        assert_eq!(page.predictions.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        feed.set_filters(PredictionFilters {
            search: Some("home 3".into()),
            ..Default::default()
        });
        assert_eq!(feed.current_page(), 1);
        let page = feed.page().await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        feed.invalidate();
        feed.page().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn feed_with_zero_ttl_always_refetches() {
        let (source, calls) = source(vec![]);
        let mut feed = PredictionFeed::new(source, Duration::ZERO);
        let page = feed.page().await.unwrap();
        assert_eq!(page.total_pages, 0);
        assert!(page.predictions.is_empty());
        feed.page().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn feed_propagates_source_errors() {
        let (mut source, _) = source(vec![prediction(1, "football", 90)]);
        source.fail = true;
        let mut feed = PredictionFeed::new(source, Duration::from_secs(60));
        assert!(feed.page().await.is_err());
    }
}
