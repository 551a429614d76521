pub mod apod_client;
