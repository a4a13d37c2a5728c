#![doc = include_str!("../../../README.md")]

mod eval;
mod evaluate;
mod exception;
mod expressions;
pub mod host;
mod io;
mod parse;
mod repl;
mod repl_error;
mod value;

pub use crate::{
    evaluate::{Evaluation, ExceptionReport, evaluate},
    exception::{ExcClass, Exception},
    host::{ENV_PROFILE_VAR, EvalOutcome, EvalWrapper, HostError, HostRuntime, NullHost, environment_profile},
    io::{CollectConsole, ConsoleWriter, NoConsole, StdConsole},
    parse::ParseError,
    repl::ReplSession,
    repl_error::ReplError,
    value::Value,
};
