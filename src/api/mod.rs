pub mod models;
pub mod overlay;
