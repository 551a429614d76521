use sqlx::PgPool;

#[derive(Clone)]
pub struct SqlxPictureRepo {
    pub pool: PgPool,
}
