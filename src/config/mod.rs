pub mod params;
pub mod schema;

pub use params::{ParamDef, Params};
pub use schema::{
    BrowserConfig, CompletionConfig, Config, InboxConfig, Protocol, TargetUrl, Timing, Viewport,
};
