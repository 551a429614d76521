pub mod apod;
pub mod extractors;
