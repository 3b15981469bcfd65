pub mod analysis;
pub mod clang;
pub mod cli;
pub mod compilation;
pub mod config;
pub mod ctu;
pub mod dispatch;
pub mod error;
pub mod exit;
pub mod intercept;
pub mod invocation;
pub mod report;
pub mod shell;
