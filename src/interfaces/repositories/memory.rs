use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::RwLock;

use crate::{
    entities::daily_picture::{DailyPicture, NewDailyPicture},
    errors::AppError,
    repositories::daily_picture::PictureRepository,
};

/// Process-local picture store for development and tests. Same upsert
/// semantics as the Postgres table: one entry per date, last writer wins.
#[derive(Clone, Default)]
pub struct InMemoryPictureRepo {
    pictures: Arc<RwLock<BTreeMap<NaiveDate, DailyPicture>>>,
}

impl InMemoryPictureRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pictures.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pictures.read().is_empty()
    }

    fn store(&self, picture: &NewDailyPicture) -> DailyPicture {
        let stored = picture.clone().stamped(Utc::now());
        self.pictures.write().insert(stored.date, stored.clone());
        stored
    }
}

#[async_trait]
impl PictureRepository for InMemoryPictureRepo {
    async fn check_connection(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn get_picture_by_date(&self, date: NaiveDate) -> Result<Option<DailyPicture>, AppError> {
        Ok(self.pictures.read().get(&date).cloned())
    }

    async fn get_latest_picture(&self) -> Result<Option<DailyPicture>, AppError> {
        Ok(self.pictures.read().values().next_back().cloned())
    }

    async fn list_pictures(&self, limit: u32, offset: u32) -> Result<Vec<DailyPicture>, AppError> {
        Ok(self.pictures
            .read()
            .values()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn upsert_picture(&self, picture: &NewDailyPicture) -> Result<DailyPicture, AppError> {
        Ok(self.store(picture))
    }

    async fn upsert_pictures(&self, pictures: &[NewDailyPicture]) -> Result<u64, AppError> {
        let mut written = BTreeMap::new();
        for picture in pictures {
            written.insert(picture.date, self.store(picture));
        }
        Ok(written.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn picture(day: u32, title: &str) -> NewDailyPicture {
        NewDailyPicture {
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            title: title.to_string(),
            explanation: None,
            image_url: None,
            hd_image_url: None,
            media_kind: None,
            service_version: None,
            attribution: None,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_existing_date() {
        let repo = InMemoryPictureRepo::new();

        repo.upsert_picture(&picture(1, "first")).await.unwrap();
        repo.upsert_picture(&picture(1, "second")).await.unwrap();

        assert_eq!(repo.len(), 1);
        let stored = repo.get_picture_by_date(picture(1, "").date).await.unwrap().unwrap();
        assert_eq!(stored.title, "second");
    }

    #[tokio::test]
    async fn lists_newest_first_with_offset() {
        let repo = InMemoryPictureRepo::new();
        let batch: Vec<_> = (1..=5).map(|d| picture(d, "p")).collect();
        assert_eq!(repo.upsert_pictures(&batch).await.unwrap(), 5);

        let page = repo.list_pictures(2, 1).await.unwrap();
        let days: Vec<_> = page.iter().map(|p| p.date).collect();

        assert_eq!(days, vec![picture(4, "").date, picture(3, "").date]);
        assert_eq!(repo.get_latest_picture().await.unwrap().unwrap().date, picture(5, "").date);
    }
}
