//! # spy
//!
//! Pipe data through a chain of small code fragments.
//!
//! Each fragment is called once per element flowing through the chain and
//! its result is passed on. Two marker values change that: [`Value::Drop`]
//! removes the element, and [`Value::many`] emits every element of an
//! iterable in its place. Decorators ([`decorators`]) wrap fragments to turn
//! them into filters, accumulators, format strings and the like, and
//! [`catcher`] turns a failure deep inside the chain into a traceback that
//! names the fragment and the value it was processing.
//!
//! ## Example
//!
//! ```
//! use spy::{Chain, Fragment, Value};
//!
//! let chain = Chain::new(vec![
//!     Box::new(Fragment::map(|v| Ok(Value::many(v)))),
//!     Box::new(Fragment::map(|v| Ok(Value::from(v.to_string().to_uppercase())))),
//! ]);
//!
//! let out: Vec<Value> = chain
//!     .apply(vec![Value::from("ab")])
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//!
//! assert_eq!(out, vec![Value::from("A"), Value::from("B")]);
//! ```

pub mod catcher;
pub mod cli;
pub mod core;
pub mod decorators;
pub mod error;
pub mod fragments;
pub mod input;
pub mod lang;
pub mod value;

pub use crate::core::{
    Body, Callee, Chain, DebugInfo, FnBody, Fragment, IterContext, Rescope, Stage, collect,
    fragment,
};
pub use catcher::{Caught, Report, ReportOptions, catch, format_exc, format_raw};
pub use decorators::{Binding, CallBody, Decorator, DecoratorDef, Registry, decorate};
pub use error::{Error, Exception, ExceptionKind, Frame, FragmentError, Location, SyntaxError};
pub use value::{Function, Module, Stream, Value};
