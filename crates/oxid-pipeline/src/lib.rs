//! # oxid-pipeline
//!
//! The request-processing engine of the oxid authorization server
//! framework:
//!
//! - [`Transaction`]: the per-request state bag
//! - the context hierarchy: marker-typed endpoint phases
//!   ([`ExtractRequest`], [`ValidateRequest`], [`HandleRequest`],
//!   [`ApplyResponse`]) and the cross-cutting process contexts
//! - [`HandlerDescriptor`] / [`HandlerRegistry`]: ordered, filtered
//!   handler registration per context type
//! - [`Dispatcher`]: walks the sorted handlers for a context, applying
//!   filters and obeying the short-circuit flags
//! - [`ServiceScope`]: the explicit replacement for an ambient service
//!   provider, owning transaction-scoped services

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod context;
pub mod descriptor;
pub mod dispatcher;
pub mod message;
pub mod registry;
pub mod services;
pub mod transaction;

pub use context::{
    ApplyResponse, Context, ContextState, EndpointMarker, ExtractRequest, HandleRequest,
    ProcessAuthentication, ProcessChallenge, ProcessError, ProcessRequest, ProcessSignIn,
    ProcessSignOut, Rejection, ValidateRequest,
};
pub use context::endpoints;
pub use descriptor::{Filter, Handler, HandlerDescriptor, HandlerProvenance, ImplementationKind};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use message::{params, Request, Response};
pub use registry::HandlerRegistry;
pub use services::{Localizer, ServiceCollection, ServiceScope};
pub use transaction::Transaction;
