pub mod daily_picture;
