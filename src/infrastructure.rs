pub mod db;
pub mod nasa;
pub mod utils;
