use std::{sync::Arc, time::Duration};

use chrono::{Days, NaiveDate, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    entities::daily_picture::{BackfillReport, DailyPicture, NewDailyPicture, FIRST_APOD_DATE},
    errors::AppError,
    repositories::{daily_picture::PictureRepository, picture_source::PictureSource},
    settings::ApodSettings,
};

/// Timeouts and backfill thresholds used by [`ApodHandler`].
#[derive(Debug, Clone)]
pub struct ResolverPolicy {
    pub fetch_timeout: Duration,
    pub backfill_timeout: Duration,
    pub minimum_listing: usize,
    pub backfill_window_days: u32,
    pub max_backfill_days: u32,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        ResolverPolicy::from(&ApodSettings::default())
    }
}

impl From<&ApodSettings> for ResolverPolicy {
    fn from(settings: &ApodSettings) -> Self {
        ResolverPolicy {
            fetch_timeout: settings.fetch_timeout(),
            backfill_timeout: settings.backfill_timeout(),
            minimum_listing: settings.minimum_listing,
            backfill_window_days: settings.backfill_window_days,
            max_backfill_days: settings.max_backfill_days,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    AlreadyCached(NaiveDate),
    Stored(NaiveDate),
    Unavailable,
}

/// Serves pictures of the day out of the local store, falling back to the
/// upstream provider.
///
/// Read operations never fail: store and upstream errors are logged and
/// surface as `None` or an empty page.
#[derive(Clone)]
pub struct ApodHandler {
    pub picture_repo: Arc<dyn PictureRepository>,
    pub picture_source: Arc<dyn PictureSource>,
    pub policy: ResolverPolicy,
}

impl ApodHandler {
    pub fn new(
        picture_repo: Arc<dyn PictureRepository>,
        picture_source: Arc<dyn PictureSource>,
        policy: ResolverPolicy,
    ) -> Self {
        ApodHandler { picture_repo, picture_source, policy }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Resolves the picture for `requested`, or for today when `None`.
    pub async fn resolve(&self, requested: Option<NaiveDate>) -> Option<DailyPicture> {
        self.resolve_at(requested, Self::today()).await
    }

    pub(crate) async fn resolve_at(&self, requested: Option<NaiveDate>, today: NaiveDate) -> Option<DailyPicture> {
        let date = requested.unwrap_or(today);

        if let Some(existing) = self.lookup(date).await {
            return Some(existing);
        }

        if requested.is_some() {
            return self.fetch_and_store(date, self.policy.fetch_timeout).await;
        }

        // Today is missing: serve the newest row we have and refresh behind it.
        let latest = match self.picture_repo.get_latest_picture().await {
            Ok(latest) => latest,
            Err(e) => {
                error!("Error fetching latest picture: {}", e);
                None
            }
        };

        let refresh = self.spawn_refresh(date);

        match latest {
            Some(stale) => {
                info!(served = %stale.date, wanted = %date, "Serving stale picture while refreshing");
                // Detached: the refresh keeps running after the handle is dropped.
                drop(refresh);
                Some(stale)
            }
            None => match refresh.await {
                Ok(fetched) => fetched,
                Err(e) => {
                    error!("Refresh task for {} failed: {}", date, e);
                    None
                }
            },
        }
    }

    /// Exact-date lookup without touching the upstream provider.
    pub async fn get_picture_by_date(&self, date: NaiveDate) -> Option<DailyPicture> {
        self.lookup(date).await
    }

    /// Pages through stored pictures, newest first. A short first page
    /// triggers a best-effort backfill of the last few days.
    pub async fn list_pictures(&self, limit: u32, offset: u32) -> Vec<DailyPicture> {
        self.list_pictures_at(limit, offset, Self::today()).await
    }

    pub(crate) async fn list_pictures_at(&self, limit: u32, offset: u32, today: NaiveDate) -> Vec<DailyPicture> {
        let pictures = match self.picture_repo.list_pictures(limit, offset).await {
            Ok(pictures) => pictures,
            Err(e) => {
                error!("Error fetching pictures: {}", e);
                return Vec::new();
            }
        };

        if offset != 0 || pictures.len() >= self.policy.minimum_listing {
            return pictures;
        }

        info!(
            found = pictures.len(),
            minimum = self.policy.minimum_listing,
            "Backfilling recent pictures"
        );
        let start = today
            .checked_sub_days(Days::new(self.policy.backfill_window_days as u64))
            .unwrap_or(FIRST_APOD_DATE)
            .max(FIRST_APOD_DATE);

        match self.picture_source.fetch_range(start, today, self.policy.backfill_timeout).await {
            Ok(fetched) => {
                if let Err(e) = self.picture_repo.upsert_pictures(&fetched).await {
                    error!("Error batch storing pictures: {}", e);
                }
            }
            Err(e) => warn!("Quick backfill skipped: {}", e),
        }

        match self.picture_repo.list_pictures(limit, offset).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                error!("Error re-reading pictures after backfill: {}", e);
                pictures
            }
        }
    }

    /// Fetches and stores an explicit date range. Unlike the read paths,
    /// failures are reported to the caller.
    pub async fn backfill(&self, start: NaiveDate, end: NaiveDate) -> Result<BackfillReport, AppError> {
        if start > end {
            return Err(AppError::BadRequest("start_date must not be after end_date".into()));
        }
        if start < FIRST_APOD_DATE {
            return Err(AppError::BadRequest(format!("start_date must not be earlier than {}", FIRST_APOD_DATE)));
        }
        let span = (end - start).num_days() + 1;
        if span > self.policy.max_backfill_days as i64 {
            return Err(AppError::BadRequest(format!(
                "Range covers {} days, at most {} allowed",
                span, self.policy.max_backfill_days
            )));
        }

        let fetched = self.picture_source
            .fetch_range(start, end, self.policy.fetch_timeout)
            .await?;
        let stored = self.picture_repo.upsert_pictures(&fetched).await?;

        info!(%start, %end, stored, "Backfill complete");
        Ok(BackfillReport { start_date: start, end_date: end, stored })
    }

    /// Makes sure today's picture is stored. Called periodically.
    pub async fn refresh_today(&self) -> RefreshOutcome {
        self.refresh_at(Self::today()).await
    }

    pub(crate) async fn refresh_at(&self, today: NaiveDate) -> RefreshOutcome {
        if self.lookup(today).await.is_some() {
            return RefreshOutcome::AlreadyCached(today);
        }

        match self.fetch_and_store(today, self.policy.fetch_timeout).await {
            Some(picture) => RefreshOutcome::Stored(picture.date),
            None => RefreshOutcome::Unavailable,
        }
    }

    /// Store reachability, for health reporting.
    pub async fn check_store(&self) -> Result<(), AppError> {
        self.picture_repo.check_connection().await
    }

    pub async fn latest_picture_date(&self) -> Option<NaiveDate> {
        self.picture_repo.get_latest_picture().await.ok().flatten().map(|p| p.date)
    }

    async fn lookup(&self, date: NaiveDate) -> Option<DailyPicture> {
        match self.picture_repo.get_picture_by_date(date).await {
            Ok(found) => found,
            Err(e) => {
                error!("Error fetching picture for {}: {}", date, e);
                None
            }
        }
    }

    async fn fetch_and_store(&self, date: NaiveDate, timeout: Duration) -> Option<DailyPicture> {
        fetch_and_store(self.picture_repo.clone(), self.picture_source.clone(), date, timeout).await
    }

    /// Detached upstream fetch for `date`. Its failure is only logged.
    fn spawn_refresh(&self, date: NaiveDate) -> JoinHandle<Option<DailyPicture>> {
        let repo = self.picture_repo.clone();
        let source = self.picture_source.clone();
        let timeout = self.policy.fetch_timeout;

        tokio::spawn(async move { fetch_and_store(repo, source, date, timeout).await })
    }
}

async fn fetch_and_store(
    repo: Arc<dyn PictureRepository>,
    source: Arc<dyn PictureSource>,
    date: NaiveDate,
    timeout: Duration,
) -> Option<DailyPicture> {
    let fetched: NewDailyPicture = match source.fetch_day(date, timeout).await {
        Ok(picture) => picture,
        Err(e) => {
            warn!("APOD fetch failed for {}: {}", date, e);
            return None;
        }
    };

    match repo.upsert_picture(&fetched).await {
        Ok(stored) => Some(stored),
        Err(e) => {
            error!("Error storing picture for {}: {}", fetched.date, e);
            Some(fetched.stamped(Utc::now()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use mockall::{mock, predicate::eq};
    use tokio::sync::{mpsc, Notify};

    use super::*;
    use crate::{errors::FetchError, repositories::memory::InMemoryPictureRepo};

    mock! {
        pub Source {}

        #[async_trait]
        impl PictureSource for Source {
            async fn fetch_day(&self, date: NaiveDate, timeout: Duration) -> Result<NewDailyPicture, FetchError>;
            async fn fetch_range(
                &self,
                start: NaiveDate,
                end: NaiveDate,
                timeout: Duration,
            ) -> Result<Vec<NewDailyPicture>, FetchError>;
        }
    }

    mock! {
        pub Repo {}

        #[async_trait]
        impl PictureRepository for Repo {
            async fn check_connection(&self) -> Result<(), AppError>;
            async fn get_picture_by_date(&self, date: NaiveDate) -> Result<Option<DailyPicture>, AppError>;
            async fn get_latest_picture(&self) -> Result<Option<DailyPicture>, AppError>;
            async fn list_pictures(&self, limit: u32, offset: u32) -> Result<Vec<DailyPicture>, AppError>;
            async fn upsert_picture(&self, picture: &NewDailyPicture) -> Result<DailyPicture, AppError>;
            async fn upsert_pictures(&self, pictures: &[NewDailyPicture]) -> Result<u64, AppError>;
        }
    }

    /// Blocks every fetch until released, then serves a picture for the
    /// requested date.
    struct GatedSource {
        gate: Arc<Notify>,
        calls: AtomicUsize,
        fetched: mpsc::UnboundedSender<NaiveDate>,
    }

    #[async_trait]
    impl PictureSource for GatedSource {
        async fn fetch_day(&self, date: NaiveDate, _timeout: Duration) -> Result<NewDailyPicture, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            let _ = self.fetched.send(date);
            Ok(picture_for(date, "fresh"))
        }

        async fn fetch_range(
            &self,
            _start: NaiveDate,
            _end: NaiveDate,
            _timeout: Duration,
        ) -> Result<Vec<NewDailyPicture>, FetchError> {
            Err(FetchError::Timeout)
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn picture_for(date: NaiveDate, title: &str) -> NewDailyPicture {
        NewDailyPicture {
            date,
            title: title.to_string(),
            explanation: Some("explanation".into()),
            image_url: Some(format!("https://apod.nasa.gov/apod/image/{}.jpg", date)),
            hd_image_url: None,
            media_kind: None,
            service_version: Some("v1".into()),
            attribution: None,
        }
    }

    fn handler(repo: &InMemoryPictureRepo, source: impl PictureSource + 'static) -> ApodHandler {
        ApodHandler::new(Arc::new(repo.clone()), Arc::new(source), ResolverPolicy::default())
    }

    #[tokio::test]
    async fn stored_date_is_served_without_upstream_call() {
        let repo = InMemoryPictureRepo::new();
        repo.upsert_picture(&picture_for(day(2024, 1, 1), "cached")).await.unwrap();

        let mut source = MockSource::new();
        source.expect_fetch_day().never();

        let picture = handler(&repo, source)
            .resolve_at(Some(day(2024, 1, 1)), day(2024, 6, 1))
            .await
            .unwrap();

        assert_eq!(picture.title, "cached");
    }

    #[tokio::test]
    async fn missing_specific_date_is_fetched_once_and_stored() {
        let repo = InMemoryPictureRepo::new();
        let date = day(2023, 12, 25);

        let mut source = MockSource::new();
        source.expect_fetch_day()
            .with(eq(date), eq(Duration::from_secs(20)))
            .times(1)
            .returning(|d, _| Ok(picture_for(d, "fetched")));

        let apod = handler(&repo, source);
        let first = apod.resolve_at(Some(date), day(2024, 6, 1)).await.unwrap();
        let second = apod.resolve_at(Some(date), day(2024, 6, 1)).await.unwrap();

        assert_eq!(first.title, "fetched");
        assert_eq!(second.date, date);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_for_specific_date_returns_none_and_stores_nothing() {
        let repo = InMemoryPictureRepo::new();

        let mut source = MockSource::new();
        source.expect_fetch_day()
            .times(1)
            .returning(|_, _| Err(FetchError::Status(400, "Date must be between".into())));

        let picture = handler(&repo, source)
            .resolve_at(Some(day(2024, 1, 1)), day(2024, 6, 1))
            .await;

        assert!(picture.is_none());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn today_serves_stale_row_without_waiting_for_refresh() {
        let repo = InMemoryPictureRepo::new();
        let stale_day = day(2024, 5, 28);
        let today = day(2024, 6, 1);
        repo.upsert_picture(&picture_for(stale_day, "stale")).await.unwrap();

        let gate = Arc::new(Notify::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = Arc::new(GatedSource { gate: gate.clone(), calls: AtomicUsize::new(0), fetched: tx });
        let apod = ApodHandler::new(Arc::new(repo.clone()), source.clone(), ResolverPolicy::default());

        // The gate is still closed, so this only returns if the refresh is not awaited.
        let served = tokio::time::timeout(Duration::from_secs(1), apod.resolve_at(None, today))
            .await
            .expect("resolve must not wait for upstream")
            .unwrap();
        assert_eq!(served.date, stale_day);

        gate.notify_one();
        let fetched = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(fetched, Some(today));

        for _ in 0..50 {
            if repo.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(repo.len(), 2);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cold_start_waits_for_a_single_upstream_call() {
        let repo = InMemoryPictureRepo::new();
        let today = day(2024, 6, 1);

        let mut source = MockSource::new();
        source.expect_fetch_day()
            .with(eq(today), mockall::predicate::always())
            .times(1)
            .returning(|d, _| Ok(picture_for(d, "first light")));

        let picture = handler(&repo, source).resolve_at(None, today).await.unwrap();

        assert_eq!(picture.title, "first light");
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn cold_start_with_failing_upstream_returns_none() {
        let repo = InMemoryPictureRepo::new();

        let mut source = MockSource::new();
        source.expect_fetch_day().times(1).returning(|_, _| Err(FetchError::Timeout));

        let picture = handler(&repo, source).resolve_at(None, day(2024, 6, 1)).await;

        assert!(picture.is_none());
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn fetched_picture_is_returned_even_when_store_write_fails() {
        let date = day(2024, 2, 2);

        let mut repo = MockRepo::new();
        repo.expect_get_picture_by_date().returning(|_| Ok(None));
        repo.expect_upsert_picture()
            .times(1)
            .returning(|_| Err(AppError::InternalError("connection reset".into())));

        let mut source = MockSource::new();
        source.expect_fetch_day().times(1).returning(|d, _| Ok(picture_for(d, "unsaved")));

        let apod = ApodHandler::new(Arc::new(repo), Arc::new(source), ResolverPolicy::default());
        let picture = apod.resolve_at(Some(date), day(2024, 6, 1)).await.unwrap();

        assert_eq!(picture.title, "unsaved");
    }

    #[tokio::test]
    async fn store_read_errors_are_treated_as_missing() {
        let mut repo = MockRepo::new();
        repo.expect_get_picture_by_date()
            .returning(|_| Err(AppError::InternalError("down".into())));

        let apod = ApodHandler::new(Arc::new(repo), Arc::new(MockSource::new()), ResolverPolicy::default());

        assert!(apod.get_picture_by_date(day(2024, 1, 1)).await.is_none());
    }

    #[tokio::test]
    async fn short_first_page_triggers_recent_backfill() {
        let repo = InMemoryPictureRepo::new();
        let today = day(2024, 6, 10);
        for d in [1, 2, 3] {
            repo.upsert_picture(&picture_for(day(2024, 6, d), "old")).await.unwrap();
        }

        let mut source = MockSource::new();
        source.expect_fetch_range()
            .with(eq(day(2024, 6, 7)), eq(today), eq(Duration::from_secs(5)))
            .times(1)
            .returning(|start, end, _| {
                Ok(start.iter_days().take_while(|d| *d <= end).map(|d| picture_for(d, "new")).collect())
            });

        let page = handler(&repo, source).list_pictures_at(10, 0, today).await;

        assert_eq!(page.len(), 7);
        assert_eq!(page[0].date, today);
    }

    #[tokio::test]
    async fn backfill_failure_still_returns_cached_page() {
        let repo = InMemoryPictureRepo::new();
        repo.upsert_picture(&picture_for(day(2024, 6, 1), "only")).await.unwrap();

        let mut source = MockSource::new();
        source.expect_fetch_range().times(1).returning(|_, _, _| Err(FetchError::Timeout));

        let page = handler(&repo, source).list_pictures_at(10, 0, day(2024, 6, 10)).await;

        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn later_pages_and_full_pages_skip_backfill() {
        let repo = InMemoryPictureRepo::new();
        for d in 1..=6 {
            repo.upsert_picture(&picture_for(day(2024, 6, d), "p")).await.unwrap();
        }

        let mut source = MockSource::new();
        source.expect_fetch_range().never();
        let apod = handler(&repo, source);

        assert_eq!(apod.list_pictures_at(10, 0, day(2024, 6, 10)).await.len(), 6);
        assert_eq!(apod.list_pictures_at(10, 20, day(2024, 6, 10)).await.len(), 0);
    }

    #[tokio::test]
    async fn backfill_rejects_bad_ranges_without_calling_upstream() {
        let repo = InMemoryPictureRepo::new();
        let mut source = MockSource::new();
        source.expect_fetch_range().never();
        let apod = handler(&repo, source);

        assert!(matches!(
            apod.backfill(day(2024, 2, 1), day(2024, 1, 1)).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            apod.backfill(day(2024, 1, 1), day(2024, 3, 1)).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            apod.backfill(day(1995, 6, 1), day(1995, 6, 20)).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn backfill_stores_range_and_reports_upstream_errors() {
        let repo = InMemoryPictureRepo::new();
        let mut source = MockSource::new();
        let mut seq = mockall::Sequence::new();
        source.expect_fetch_range()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|start, end, _| {
                Ok(start.iter_days().take_while(|d| *d <= end).map(|d| picture_for(d, "bf")).collect())
            });
        source.expect_fetch_range()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(FetchError::Status(503, "unavailable".into())));
        let apod = handler(&repo, source);

        let report = apod.backfill(day(2024, 1, 1), day(2024, 1, 10)).await.unwrap();
        assert_eq!(report.stored, 10);
        assert_eq!(repo.len(), 10);

        let err = apod.backfill(day(2024, 2, 1), day(2024, 2, 2)).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamError(_)));
    }

    #[tokio::test]
    async fn refresh_skips_upstream_when_today_is_cached() {
        let repo = InMemoryPictureRepo::new();
        let today = day(2024, 6, 1);
        repo.upsert_picture(&picture_for(today, "today")).await.unwrap();

        let mut source = MockSource::new();
        source.expect_fetch_day().never();

        let outcome = handler(&repo, source).refresh_at(today).await;

        assert_eq!(outcome, RefreshOutcome::AlreadyCached(today));
    }

    #[tokio::test]
    async fn refresh_stores_missing_today() {
        let repo = InMemoryPictureRepo::new();
        let today = day(2024, 6, 1);

        let mut source = MockSource::new();
        source.expect_fetch_day().times(1).returning(|d, _| Ok(picture_for(d, "new")));

        let apod = handler(&repo, source);

        assert_eq!(apod.refresh_at(today).await, RefreshOutcome::Stored(today));
        assert_eq!(apod.latest_picture_date().await, Some(today));
    }

    #[tokio::test]
    async fn refresh_reports_unavailable_when_upstream_fails() {
        let repo = InMemoryPictureRepo::new();
        let today = day(2024, 6, 1);

        let mut source = MockSource::new();
        source
            .expect_fetch_day()
            .with(eq(today), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Err(FetchError::Status(429, "rate limited".into())));

        let apod = handler(&repo, source);

        assert_eq!(apod.refresh_at(today).await, RefreshOutcome::Unavailable);
        assert!(repo.is_empty());
    }
}
