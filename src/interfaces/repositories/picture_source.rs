use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{entities::daily_picture::NewDailyPicture, errors::FetchError};

/// The external picture-of-the-day provider. Every call is a single
/// attempt bounded by `timeout`.
#[async_trait]
pub trait PictureSource: Send + Sync {
    async fn fetch_day(&self, date: NaiveDate, timeout: Duration) -> Result<NewDailyPicture, FetchError>;
    async fn fetch_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        timeout: Duration,
    ) -> Result<Vec<NewDailyPicture>, FetchError>;
    fn is_configured(&self) -> bool {
        true
    }
}
