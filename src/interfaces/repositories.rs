pub mod daily_picture;
pub mod memory;
pub mod picture_source;
pub mod sqlx_repo;
