pub mod aggregate;
pub mod config;
pub mod domain;
pub mod error;
pub mod harvest;
pub mod openalex;
pub mod output;
pub mod paginate;
pub mod resolver;
pub mod roster;
pub mod rules;
