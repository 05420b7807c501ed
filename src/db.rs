pub mod kobo;
pub mod prod_db;
