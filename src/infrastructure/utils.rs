pub mod valid_date;
