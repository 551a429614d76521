pub mod apod;
pub mod home;
pub mod system;
