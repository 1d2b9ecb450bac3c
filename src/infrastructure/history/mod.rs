pub mod http;

pub use http::HttpHistoryService;
