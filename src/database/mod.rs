// Database module
// LanceDB holds the scoped document collections, SQLite holds the project directory

pub mod lancedb;
pub mod sqlite;

pub use sqlite::ProjectDirectory;
