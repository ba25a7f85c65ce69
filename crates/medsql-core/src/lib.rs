// Library root: configuration, practice database access, schema discovery
// and the SQL helpers shared by the agent and the front ends.

pub mod cache;
pub mod config;
pub mod db;
pub mod insights;
pub mod schema;
pub mod seed;
pub mod sql;
pub mod store;
