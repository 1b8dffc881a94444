//! Access-controlled query surface over the record index.

pub mod engine;
pub mod error;

pub use engine::{
    QueryEngine, RecordDetail, SearchRequest, SearchResults, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use error::{QueryError, QueryResult};
