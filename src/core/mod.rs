pub mod db;
pub mod errors;
pub mod helpers;
pub mod images;
pub mod validation;
