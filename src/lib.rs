pub mod config;
pub mod db;
pub mod fetcher;
pub mod parser;
pub mod run;
pub mod sitemap;
