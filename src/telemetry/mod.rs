pub mod config;
pub mod ctx;
pub mod emit;
pub mod ops;

use ctx::LogCtx;

// Factory helpers, one per op
pub fn sync() -> LogCtx<ops::sync::Sync> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
pub fn status() -> LogCtx<ops::status::Status> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
