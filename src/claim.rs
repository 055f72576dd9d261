pub mod cache;
pub mod groups;
pub mod model;
pub mod position;
pub mod regions;
pub mod service;
