pub mod client;
pub mod get;
pub mod post;

pub use get::HttpGetTool;
pub use post::HttpPostTool;
