mod common;
mod dispatch;
mod web_search;
mod wikipedia;

pub use common::LookupTools;
pub use dispatch::dispatch_tool_call;
pub use web_search::SearchHit;
