pub mod domain;
pub mod middleware;
pub mod model;
pub mod state;
pub mod store;
pub mod web;
