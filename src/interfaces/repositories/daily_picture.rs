use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, QueryBuilder};

use crate::{
    entities::daily_picture::{DailyPicture, DailyPictureRow, NewDailyPicture},
    errors::AppError,
    repositories::sqlx_repo::SqlxPictureRepo,
};

const PICTURE_COLUMNS: &str =
    "date, title, explanation, url, hdurl, media_type, service_version, copyright, last_updated_at";

const UPSERT_CONFLICT_CLAUSE: &str = r#"
    ON CONFLICT (date) DO UPDATE SET
        title = EXCLUDED.title,
        explanation = EXCLUDED.explanation,
        url = EXCLUDED.url,
        hdurl = EXCLUDED.hdurl,
        media_type = EXCLUDED.media_type,
        service_version = EXCLUDED.service_version,
        copyright = EXCLUDED.copyright,
        last_updated_at = NOW()
"#;

#[async_trait]
pub trait PictureRepository: Send + Sync {
    async fn check_connection(&self) -> Result<(), AppError>;
    async fn get_picture_by_date(&self, date: NaiveDate) -> Result<Option<DailyPicture>, AppError>;
    async fn get_latest_picture(&self) -> Result<Option<DailyPicture>, AppError>;
    async fn list_pictures(&self, limit: u32, offset: u32) -> Result<Vec<DailyPicture>, AppError>;
    async fn upsert_picture(&self, picture: &NewDailyPicture) -> Result<DailyPicture, AppError>;
    async fn upsert_pictures(&self, pictures: &[NewDailyPicture]) -> Result<u64, AppError>;
}

impl SqlxPictureRepo {
    pub fn new(pool: PgPool) -> Self {
        SqlxPictureRepo { pool }
    }
}

#[async_trait]
impl PictureRepository for SqlxPictureRepo {
    async fn check_connection(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(AppError::from)
    }

    async fn get_picture_by_date(&self, date: NaiveDate) -> Result<Option<DailyPicture>, AppError> {
        let row = sqlx::query_as::<_, DailyPictureRow>(
            &format!("SELECT {PICTURE_COLUMNS} FROM nasa_posts WHERE date = $1")
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DailyPicture::from))
    }

    async fn get_latest_picture(&self) -> Result<Option<DailyPicture>, AppError> {
        let row = sqlx::query_as::<_, DailyPictureRow>(
            &format!("SELECT {PICTURE_COLUMNS} FROM nasa_posts ORDER BY date DESC LIMIT 1")
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DailyPicture::from))
    }

    async fn list_pictures(&self, limit: u32, offset: u32) -> Result<Vec<DailyPicture>, AppError> {
        let mut builder = QueryBuilder::new(format!("SELECT {PICTURE_COLUMNS} FROM nasa_posts"));

        builder.push(" ORDER BY date DESC");
        builder.push(" LIMIT ").push_bind(limit as i64);
        builder.push(" OFFSET ").push_bind(offset as i64);

        let rows: Vec<DailyPictureRow> = builder
            .build_query_as::<DailyPictureRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(DailyPicture::from).collect())
    }

    async fn upsert_picture(&self, picture: &NewDailyPicture) -> Result<DailyPicture, AppError> {
        let row = sqlx::query_as::<_, DailyPictureRow>(&format!(
            r#"
            INSERT INTO nasa_posts ({PICTURE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            {UPSERT_CONFLICT_CLAUSE}
            RETURNING {PICTURE_COLUMNS}
            "#
        ))
        .bind(picture.date)
        .bind(&picture.title)
        .bind(&picture.explanation)
        .bind(&picture.image_url)
        .bind(&picture.hd_image_url)
        .bind(picture.media_kind.map(|k| k.as_str()))
        .bind(&picture.service_version)
        .bind(&picture.attribution)
        .fetch_one(&self.pool)
        .await?;

        Ok(DailyPicture::from(row))
    }

    async fn upsert_pictures(&self, pictures: &[NewDailyPicture]) -> Result<u64, AppError> {
        // Postgres rejects one statement touching the same conflict key twice.
        let unique: BTreeMap<NaiveDate, &NewDailyPicture> =
            pictures.iter().map(|p| (p.date, p)).collect();

        if unique.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::new(format!("INSERT INTO nasa_posts ({PICTURE_COLUMNS}) "));

        builder.push_values(unique.values(), |mut row, picture| {
            row.push_bind(picture.date)
                .push_bind(picture.title.clone())
                .push_bind(picture.explanation.clone())
                .push_bind(picture.image_url.clone())
                .push_bind(picture.hd_image_url.clone())
                .push_bind(picture.media_kind.map(|k| k.as_str()))
                .push_bind(picture.service_version.clone())
                .push_bind(picture.attribution.clone())
                .push("NOW()");
        });
        builder.push(UPSERT_CONFLICT_CLAUSE);

        let result = builder.build().execute(&self.pool).await?;

        Ok(result.rows_affected())
    }
}
