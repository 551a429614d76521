use std::{fmt, time::Duration};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Response};
use tracing::debug;
use zeroize::Zeroizing;

use crate::{
    entities::daily_picture::{ApodPayload, ApodRangeBody, NewDailyPicture, DATE_FORMAT},
    errors::FetchError,
    repositories::picture_source::PictureSource,
    settings::ApodSettings,
};

pub const DEMO_API_KEY: &str = "DEMO_KEY";

/// Longest slice of an error body kept in `FetchError::Status`.
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Clone)]
pub struct NasaApodClient {
    http: Client,
    endpoint: String,
    api_key: Zeroizing<String>,
}

impl NasaApodClient {
    pub fn new(settings: &ApodSettings) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(concat!("cosmoview-backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::from)?;

        let api_key = if settings.api_key.trim().is_empty() {
            DEMO_API_KEY.to_string()
        } else {
            settings.api_key.trim().to_string()
        };

        Ok(NasaApodClient {
            http,
            endpoint: format!("{}/apod", settings.base_url.trim_end_matches('/')),
            api_key: Zeroizing::new(api_key),
        })
    }

    async fn get(&self, params: &[(&str, String)], timeout: Duration) -> Result<Response, FetchError> {
        let response = self.http
            .get(&self.endpoint)
            .query(&[("api_key", self.api_key.as_str()), ("thumbs", "true")])
            .query(params)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(FetchError::Status(status.as_u16(), excerpt));
        }

        Ok(response)
    }
}

#[async_trait]
impl PictureSource for NasaApodClient {
    async fn fetch_day(&self, date: NaiveDate, timeout: Duration) -> Result<NewDailyPicture, FetchError> {
        debug!(%date, "Fetching APOD entry");

        let payload: ApodPayload = self
            .get(&[("date", date.format(DATE_FORMAT).to_string())], timeout)
            .await?
            .json()
            .await?;

        Ok(NewDailyPicture::from(payload))
    }

    async fn fetch_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        timeout: Duration,
    ) -> Result<Vec<NewDailyPicture>, FetchError> {
        debug!(%start, %end, "Fetching APOD range");

        let body: ApodRangeBody = self
            .get(
                &[
                    ("start_date", start.format(DATE_FORMAT).to_string()),
                    ("end_date", end.format(DATE_FORMAT).to_string()),
                ],
                timeout,
            )
            .await?
            .json()
            .await?;

        Ok(body.into_vec().into_iter().map(NewDailyPicture::from).collect())
    }

    fn is_configured(&self) -> bool {
        self.api_key.as_str() != DEMO_API_KEY
    }
}

impl fmt::Debug for NasaApodClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NasaApodClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
